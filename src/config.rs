use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared immutably through the application state via FromRef.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Database connection string (Postgres). `None` runs the in-memory store (local only).
    pub db_url: Option<String>,
    // Runtime environment marker. Controls feature activation (e.g., Dev Bypass).
    pub env: Env,
    // Secret used to sign access tokens and confirmation codes.
    pub jwt_secret: String,
    // Lifetime of an issued access token, in seconds.
    pub access_token_ttl_secs: i64,
    // Lifetime of a mailed confirmation code, in seconds.
    pub confirmation_code_ttl_secs: i64,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Outgoing mail server. Absent in local mode, where mail goes to the log.
    pub smtp: Option<SmtpConfig>,
    // Sender address for confirmation mails.
    pub mail_from: String,
    // Superuser ensured at startup, if configured.
    pub bootstrap_admin: Option<BootstrapAdmin>,
    // Domain settings handed to the validators.
    pub api: ApiSettings,
}

/// Env
///
/// Defines the runtime context, switching between development conveniences
/// (in-memory store, logged mail, header bypass) and production infrastructure.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
}

/// ApiSettings
///
/// Explicit domain constants consumed by validation, routing and pagination.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiSettings {
    pub min_score: i32,
    pub max_score: i32,
    /// Reserved path token addressing the authenticated principal's own profile.
    pub me_alias: String,
    pub page_size: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            min_score: 1,
            max_score: 10,
            me_alias: "me".to_string(),
            page_size: 10,
        }
    }
}

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

impl Default for AppConfig {
    /// Safe, non-panicking configuration for tests and state scaffolding.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            access_token_ttl_secs: 86_400,
            confirmation_code_ttl_secs: 86_400,
            bind_addr: "0.0.0.0:3000".to_string(),
            smtp: None,
            mail_from: "noreply@yamdb.local".to_string(),
            bootstrap_admin: None,
            api: ApiSettings::default(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables and fails fast.
    ///
    /// # Panics
    /// Panics if a variable required by the current environment is missing or if a
    /// numeric variable cannot be parsed. The service must not start half-configured.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let defaults = AppConfig::default();

        let api = ApiSettings {
            min_score: parse_var("MIN_SCORE", defaults.api.min_score),
            max_score: parse_var("MAX_SCORE", defaults.api.max_score),
            me_alias: defaults.api.me_alias.clone(),
            page_size: parse_var("PAGE_SIZE", defaults.api.page_size),
        };
        assert!(
            api.min_score <= api.max_score,
            "FATAL: MIN_SCORE must not exceed MAX_SCORE."
        );

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_USERNAME"),
            env::var("BOOTSTRAP_ADMIN_EMAIL"),
        ) {
            (Ok(username), Ok(email)) => Some(BootstrapAdmin { username, email }),
            _ => None,
        };

        let access_token_ttl_secs =
            parse_var("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl_secs);
        let confirmation_code_ttl_secs = parse_var(
            "CONFIRMATION_CODE_TTL_SECS",
            defaults.confirmation_code_ttl_secs,
        );
        let bind_addr = env::var("BIND_ADDR").unwrap_or(defaults.bind_addr);

        match env {
            Env::Local => Self {
                env: Env::Local,
                // Without a database the service runs on the in-memory store.
                db_url: env::var("DATABASE_URL").ok(),
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
                access_token_ttl_secs,
                confirmation_code_ttl_secs,
                bind_addr,
                smtp: smtp_from_env(),
                mail_from: env::var("MAIL_FROM").unwrap_or(defaults.mail_from),
                bootstrap_admin,
                api,
            },
            Env::Production => {
                let smtp = SmtpConfig {
                    server: env::var("SMTP_SERVER")
                        .expect("FATAL: SMTP_SERVER required in prod"),
                    port: parse_var("SMTP_PORT", 587),
                    username: env::var("SMTP_USERNAME")
                        .expect("FATAL: SMTP_USERNAME required in prod"),
                    password: env::var("SMTP_PASSWORD")
                        .expect("FATAL: SMTP_PASSWORD required in prod"),
                };
                let mail_from = env::var("MAIL_FROM").unwrap_or_else(|_| smtp.username.clone());

                Self {
                    env: Env::Production,
                    db_url: Some(
                        env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                    ),
                    jwt_secret: env::var("JWT_SECRET")
                        .expect("FATAL: JWT_SECRET must be set in production."),
                    access_token_ttl_secs,
                    confirmation_code_ttl_secs,
                    bind_addr,
                    smtp: Some(smtp),
                    mail_from,
                    bootstrap_admin,
                    api,
                }
            }
        }
    }
}

fn smtp_from_env() -> Option<SmtpConfig> {
    let server = env::var("SMTP_SERVER").ok()?;
    Some(SmtpConfig {
        server,
        port: parse_var("SMTP_PORT", 587),
        username: env::var("SMTP_USERNAME").unwrap_or_default(),
        password: env::var("SMTP_PASSWORD").unwrap_or_default(),
    })
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} has an invalid value: {raw}")),
        Err(_) => default,
    }
}
