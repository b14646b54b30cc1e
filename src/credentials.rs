use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::User;

/// TokenType
///
/// Discriminates the two kinds of signed credentials so that a confirmation code can
/// never be presented as an access token and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Confirmation,
}

/// Claims
///
/// Payload of every credential this service signs.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the account id, as a string.
    pub sub: String,
    /// Expiration Time (exp): seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat): seconds since the epoch.
    pub iat: usize,
    pub token_type: TokenType,
    /// Confirmation codes are bound to the email address they were mailed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub jti: Uuid,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("token expired")]
    Expired,

    #[error("token invalid")]
    Invalid,

    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// CredentialIssuer
///
/// Issues and checks the two credentials of the signup flow: the mailed confirmation
/// code and the bearer access token.
pub trait CredentialIssuer: Send + Sync {
    fn make_confirmation_code(&self, user: &User) -> Result<String, CredentialError>;

    /// True only if `code` was issued for this account and this email and has not expired.
    fn check_confirmation_code(&self, user: &User, code: &str) -> bool;

    fn issue_access_token(&self, user: &User) -> Result<String, CredentialError>;

    /// Returns the account id the token was issued for.
    fn verify_access_token(&self, token: &str) -> Result<i64, CredentialError>;
}

pub type CredentialState = Arc<dyn CredentialIssuer>;

/// JwtCredentialIssuer
///
/// HS256-signed JWTs for both credential kinds, keyed by the configured secret.
pub struct JwtCredentialIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    confirmation_ttl_secs: i64,
}

impl JwtCredentialIssuer {
    pub fn new(secret: &str, access_ttl_secs: i64, confirmation_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            confirmation_ttl_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.confirmation_code_ttl_secs,
        )
    }

    fn sign(
        &self,
        user: &User,
        token_type: TokenType,
        ttl_secs: i64,
        email: Option<String>,
    ) -> Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            iat: now.max(0) as usize,
            exp: (now + ttl_secs).max(0) as usize,
            token_type,
            email,
            jti: Uuid::new_v4(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(CredentialError::Signing)
    }

    fn open(&self, token: &str, expected: TokenType) -> Result<Claims, CredentialError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        // Expiry is exact; no clock-skew allowance.
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::Invalid,
            }
        })?;

        if data.claims.token_type != expected {
            return Err(CredentialError::Invalid);
        }
        Ok(data.claims)
    }
}

impl CredentialIssuer for JwtCredentialIssuer {
    fn make_confirmation_code(&self, user: &User) -> Result<String, CredentialError> {
        self.sign(
            user,
            TokenType::Confirmation,
            self.confirmation_ttl_secs,
            Some(user.email.clone()),
        )
    }

    fn check_confirmation_code(&self, user: &User, code: &str) -> bool {
        match self.open(code, TokenType::Confirmation) {
            Ok(claims) => {
                claims.sub == user.id.to_string() && claims.email.as_deref() == Some(&user.email)
            }
            Err(e) => {
                tracing::debug!("confirmation code rejected for {}: {}", user.username, e);
                false
            }
        }
    }

    fn issue_access_token(&self, user: &User) -> Result<String, CredentialError> {
        self.sign(user, TokenType::Access, self.access_ttl_secs, None)
    }

    fn verify_access_token(&self, token: &str) -> Result<i64, CredentialError> {
        let claims = self.open(token, TokenType::Access)?;
        claims.sub.parse().map_err(|_| CredentialError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(id: i64, email: &str) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: email.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            role: Role::User,
            is_superuser: false,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    fn issuer() -> JwtCredentialIssuer {
        JwtCredentialIssuer::new("unit-test-secret", 3600, 3600)
    }

    #[test]
    fn test_confirmation_code_bound_to_user_and_email() {
        let issuer = issuer();
        let alice = user(1, "alice@example.com");
        let code = issuer.make_confirmation_code(&alice).unwrap();

        assert!(issuer.check_confirmation_code(&alice, &code));
        assert!(!issuer.check_confirmation_code(&user(2, "alice@example.com"), &code));
        assert!(!issuer.check_confirmation_code(&user(1, "changed@example.com"), &code));
        assert!(!issuer.check_confirmation_code(&alice, "garbage"));
    }

    #[test]
    fn test_credentials_are_not_interchangeable() {
        let issuer = issuer();
        let alice = user(1, "alice@example.com");

        let code = issuer.make_confirmation_code(&alice).unwrap();
        assert!(matches!(
            issuer.verify_access_token(&code),
            Err(CredentialError::Invalid)
        ));

        let token = issuer.issue_access_token(&alice).unwrap();
        assert!(!issuer.check_confirmation_code(&alice, &token));
        assert_eq!(issuer.verify_access_token(&token).unwrap(), 1);
    }

    #[test]
    fn test_expired_access_token() {
        let issuer = JwtCredentialIssuer::new("unit-test-secret", -120, 3600);
        let token = issuer.issue_access_token(&user(1, "a@example.com")).unwrap();
        assert!(matches!(
            issuer.verify_access_token(&token),
            Err(CredentialError::Expired)
        ));
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let token = JwtCredentialIssuer::new("other-secret", 3600, 3600)
            .issue_access_token(&user(1, "a@example.com"))
            .unwrap();
        assert!(issuer().verify_access_token(&token).is_err());
    }
}
