use crate::{
    AppState,
    config::BootstrapAdmin,
    error::ApiError,
    handlers::auth::send_confirmation_code,
    models::{NewUser, Role, UserChanges},
};

/// ensure_superuser
///
/// Makes sure the configured bootstrap account exists as an admin superuser and
/// mails it a confirmation code, so the first admin signs in through the regular
/// token exchange. An existing account with that username is promoted; its email is
/// left as stored.
pub async fn ensure_superuser(state: &AppState, admin: &BootstrapAdmin) -> Result<(), ApiError> {
    let user = match state.repo.get_user_by_username(&admin.username).await? {
        Some(existing) if existing.is_superuser && existing.role == Role::Admin => existing,
        Some(existing) => {
            tracing::warn!("Promoting existing account {} to admin superuser", existing.username);
            let promoted = state
                .repo
                .update_user(
                    existing.id,
                    UserChanges {
                        role: Some(Role::Admin),
                        is_superuser: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            promoted.ok_or_else(|| ApiError::not_found("bootstrap account vanished"))?
        }
        None => {
            let created = state
                .repo
                .create_user(NewUser {
                    username: admin.username.clone(),
                    email: admin.email.clone(),
                    role: Role::Admin,
                    is_superuser: true,
                    ..Default::default()
                })
                .await?;
            tracing::info!("Bootstrap superuser {} created", created.username);
            created
        }
    };

    send_confirmation_code(state, &user).await
}
