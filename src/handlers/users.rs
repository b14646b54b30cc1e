use axum::{
    Json,
    extract::{OriginalUri, State},
    http::StatusCode,
};
use validator::Validate;

use crate::{
    AppState,
    auth::Actor,
    error::{ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
    models::{CreateUserRequest, NewUser, Role, UpdateUserRequest, User, UserChanges, UserResponse},
    pagination::{Page, PageParams, SearchParams},
    permissions::{Resource, Verb, authorize},
    validation::{Report, validate_username_not_alias},
};

const NO_USER: &str = "No User matches the given query.";

/// Records field errors for a username or email already held by another account.
async fn check_unique(
    state: &AppState,
    exclude: Option<i64>,
    username: Option<&str>,
    email: Option<&str>,
    report: &mut Report,
) -> ApiResult<()> {
    if let Some(username) = username {
        if let Some(other) = state.repo.get_user_by_username(username).await? {
            if Some(other.id) != exclude {
                report.add("username", "A user with that username already exists.");
            }
        }
    }
    if let Some(email) = email {
        if let Some(other) = state.repo.get_user_by_email(email).await? {
            if Some(other.id) != exclude {
                report.add("email", "A user with that email already exists.");
            }
        }
    }
    Ok(())
}

/// Resolves `{username}` (or the alias) to an account after the request-level check.
/// Returns whether the alias was used.
async fn resolve_target(
    state: &AppState,
    actor: &Actor,
    username: &str,
    verb: Verb,
) -> ApiResult<(bool, User)> {
    let alias = username == state.config.api.me_alias;
    let resource = if alias {
        Resource::OwnProfile
    } else {
        Resource::Users
    };
    authorize(resource, verb, actor.0.as_ref())?;

    let user = if alias {
        let me = actor.0.as_ref().ok_or_else(ApiError::unauthenticated)?;
        state.repo.get_user(me.id).await?
    } else {
        state.repo.get_user_by_username(username).await?
    };
    let user = user.ok_or_else(|| ApiError::not_found(NO_USER))?;
    Ok((alias, user))
}

/// list_users
///
/// [Admin Route] Lists accounts ordered by username. `search` matches a username substring.
#[utoipa::path(
    get,
    path = "/v1/users/",
    params(PageParams, SearchParams),
    responses(
        (status = 200, description = "Accounts", body = Page<UserResponse>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    actor: Actor,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(search): AppQuery<SearchParams>,
) -> ApiResult<Json<Page<UserResponse>>> {
    authorize(Resource::Users, Verb::Read, actor.0.as_ref())?;
    let request = page.request(&state.config.api)?;
    let users = state.repo.list_users(search.search, request).await?;
    Ok(Json(Page::build(users, request, &uri)?))
}

/// create_user
///
/// [Admin Route] Creates an account with any role. The account is active immediately
/// and obtains a token through the usual signup/token exchange.
#[utoipa::path(
    post,
    path = "/v1/users/",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserResponse),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn create_user(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    authorize(Resource::Users, Verb::Create, actor.0.as_ref())?;

    let mut report = Report::new();
    report.merge(payload.validate());
    report.check(validate_username_not_alias(&payload.username, &state.config.api));
    check_unique(
        &state,
        None,
        Some(&payload.username),
        Some(&payload.email),
        &mut report,
    )
    .await?;
    report.finish()?;

    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            first_name: payload.first_name,
            last_name: payload.last_name,
            bio: payload.bio,
            role: payload.role,
            is_superuser: false,
        })
        .await?;

    tracing::info!("Account {} created with role {}", user.username, user.role);
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// get_user
///
/// [Authenticated Route] `me` returns the caller's own profile; any other username
/// requires admin rights.
#[utoipa::path(
    get,
    path = "/v1/users/{username}/",
    params(("username" = String, Path, description = "Username, or `me` for the caller")),
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
) -> ApiResult<Json<UserResponse>> {
    let (_, user) = resolve_target(&state, &actor, &username, Verb::Read).await?;
    Ok(Json(user.into()))
}

/// update_user
///
/// [Authenticated Route] Partial update. Editing through `me`, only admins and
/// superusers may change their own role; a base-role account is forced back to `user`.
#[utoipa::path(
    patch,
    path = "/v1/users/{username}/",
    params(("username" = String, Path, description = "Username, or `me` for the caller")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let (alias, target) = resolve_target(&state, &actor, &username, Verb::Update).await?;

    let mut report = Report::new();
    report.merge(payload.validate());
    if let Some(new_username) = &payload.username {
        report.check(validate_username_not_alias(new_username, &state.config.api));
    }
    check_unique(
        &state,
        Some(target.id),
        payload.username.as_deref(),
        payload.email.as_deref(),
        &mut report,
    )
    .await?;
    report.finish()?;

    // Through the alias only admins and superusers may change their own role.
    // Base-role accounts are pinned to `user`; moderators keep their role.
    let may_set_role = !alias || target.capabilities().is_admin || target.is_superuser;
    let role = if may_set_role {
        payload.role
    } else {
        if payload.role.is_some_and(|r| r != target.role) {
            tracing::warn!("Ignoring self role change requested by {}", target.username);
        }
        target.capabilities().is_user.then_some(Role::User)
    };

    let changes = UserChanges {
        username: payload.username,
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        bio: payload.bio,
        role,
        is_superuser: None,
    };

    let user = state
        .repo
        .update_user(target.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_USER))?;
    Ok(Json(user.into()))
}

/// delete_user
///
/// [Admin Route] Removes an account with its reviews and comments. Requires an admin
/// who is also a superuser. `me` cannot be deleted (405).
#[utoipa::path(
    delete,
    path = "/v1/users/{username}/",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin superuser"),
        (status = 404, description = "Not Found"),
        (status = 405, description = "Deleting `me` is not allowed")
    )
)]
pub async fn delete_user(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(username): AppPath<String>,
) -> ApiResult<StatusCode> {
    let (_, target) = resolve_target(&state, &actor, &username, Verb::Delete).await?;

    if state.repo.delete_user(target.id).await? {
        tracing::info!("Account {} deleted", target.username);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(NO_USER))
    }
}
