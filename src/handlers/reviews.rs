use axum::{
    Json,
    extract::{OriginalUri, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{Actor, AuthUser},
    error::{ApiError, ApiResult, NON_FIELD_ERRORS},
    extract::{AppJson, AppPath, AppQuery},
    models::{
        CommentResponse, CommentWriteRequest, NewComment, NewReview, Review, ReviewResponse,
        ReviewWriteRequest,
    },
    pagination::{Page, PageParams},
    permissions::{Resource, Verb, authorize, authorize_object},
    validation::{Report, validate_not_blank, validate_required_text, validate_score},
};

const NO_TITLE: &str = "No Title matches the given query.";
const NO_REVIEW: &str = "No Review matches the given query.";
const NO_COMMENT: &str = "No Comment matches the given query.";

async fn ensure_title(state: &AppState, title_id: i64) -> ApiResult<()> {
    match state.repo.get_title(title_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(NO_TITLE)),
    }
}

/// Loads a review through its title; a review under another title is not found.
async fn load_review(state: &AppState, title_id: i64, review_id: i64) -> ApiResult<Review> {
    ensure_title(state, title_id).await?;
    state
        .repo
        .get_review(title_id, review_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_REVIEW))
}

/// The request-level phase guarantees an actor for every non-read verb.
fn require_actor(actor: &Actor) -> ApiResult<&AuthUser> {
    actor.0.as_ref().ok_or_else(ApiError::unauthenticated)
}

// --- Reviews ---

/// list_reviews
///
/// [Public Route] Reviews of a title, oldest first.
#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/",
    params(("title_id" = i64, Path, description = "Title ID"), PageParams),
    responses(
        (status = 200, description = "Reviews", body = Page<ReviewResponse>),
        (status = 404, description = "Unknown title")
    )
)]
pub async fn list_reviews(
    actor: Actor,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AppPath(title_id): AppPath<i64>,
    AppQuery(page): AppQuery<PageParams>,
) -> ApiResult<Json<Page<ReviewResponse>>> {
    authorize(Resource::Reviews, Verb::Read, actor.0.as_ref())?;
    ensure_title(&state, title_id).await?;
    let request = page.request(&state.config.api)?;
    let reviews = state.repo.list_reviews(title_id, request).await?;
    Ok(Json(Page::build(reviews, request, &uri)?))
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/{review_id}/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses((status = 200, description = "Review", body = ReviewResponse), (status = 404, description = "Not Found"))
)]
pub async fn get_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
) -> ApiResult<Json<ReviewResponse>> {
    authorize(Resource::Reviews, Verb::Read, actor.0.as_ref())?;
    let review = load_review(&state, title_id, review_id).await?;
    Ok(Json(review.into()))
}

/// create_review
///
/// [Authenticated Route] One review per author per title. A duplicate that races
/// past the pre-check is rejected by the store's unique constraint with the same error.
#[utoipa::path(
    post,
    path = "/v1/titles/{title_id}/reviews/",
    params(("title_id" = i64, Path, description = "Title ID")),
    request_body = ReviewWriteRequest,
    responses(
        (status = 201, description = "Created", body = ReviewResponse),
        (status = 400, description = "Invalid payload or already reviewed"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown title")
    )
)]
pub async fn create_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(title_id): AppPath<i64>,
    AppJson(payload): AppJson<ReviewWriteRequest>,
) -> ApiResult<(StatusCode, Json<ReviewResponse>)> {
    authorize(Resource::Reviews, Verb::Create, actor.0.as_ref())?;
    let author = require_actor(&actor)?;
    ensure_title(&state, title_id).await?;

    let mut report = Report::new();
    report.check(validate_required_text("text", payload.text.as_deref()));
    match payload.score {
        Some(score) => report.check(validate_score(score, &state.config.api)),
        None => report.add("score", "This field is required."),
    }
    if state.repo.review_exists(title_id, author.id).await? {
        report.add(NON_FIELD_ERRORS, "You have already reviewed this title.");
    }
    report.finish()?;

    let review = state
        .repo
        .create_review(NewReview {
            title_id,
            author_id: author.id,
            text: payload.text.unwrap_or_default(),
            score: payload.score.unwrap_or_default(),
        })
        .await?;

    tracing::info!("Review {} on title {} by {}", review.id, title_id, author.username);
    Ok((StatusCode::CREATED, Json(review.into())))
}

/// update_review
///
/// [Authenticated Route] Author or moderator only. Partial update of text and score.
#[utoipa::path(
    patch,
    path = "/v1/titles/{title_id}/reviews/{review_id}/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = ReviewWriteRequest,
    responses(
        (status = 200, description = "Updated", body = ReviewResponse),
        (status = 403, description = "Neither author nor moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
    AppJson(payload): AppJson<ReviewWriteRequest>,
) -> ApiResult<Json<ReviewResponse>> {
    authorize(Resource::Reviews, Verb::Update, actor.0.as_ref())?;
    let review = load_review(&state, title_id, review_id).await?;
    authorize_object(Resource::Reviews, Verb::Update, actor.0.as_ref(), review.author_id)?;

    let mut report = Report::new();
    if let Some(text) = &payload.text {
        report.check(validate_not_blank("text", text));
    }
    if let Some(score) = payload.score {
        report.check(validate_score(score, &state.config.api));
    }
    report.finish()?;

    let review = state
        .repo
        .update_review(review.id, payload.text, payload.score)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_REVIEW))?;
    Ok(Json(review.into()))
}

/// delete_review
///
/// [Authenticated Route] Author or moderator only. Comments go with the review.
#[utoipa::path(
    delete,
    path = "/v1/titles/{title_id}/reviews/{review_id}/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Neither author nor moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_review(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
) -> ApiResult<StatusCode> {
    authorize(Resource::Reviews, Verb::Delete, actor.0.as_ref())?;
    let review = load_review(&state, title_id, review_id).await?;
    authorize_object(Resource::Reviews, Verb::Delete, actor.0.as_ref(), review.author_id)?;

    if state.repo.delete_review(review.id).await? {
        tracing::info!("Review {} deleted", review.id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(NO_REVIEW))
    }
}

// --- Comments ---

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        PageParams
    ),
    responses(
        (status = 200, description = "Comments", body = Page<CommentResponse>),
        (status = 404, description = "Unknown title or review")
    )
)]
pub async fn list_comments(
    actor: Actor,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
    AppQuery(page): AppQuery<PageParams>,
) -> ApiResult<Json<Page<CommentResponse>>> {
    authorize(Resource::Comments, Verb::Read, actor.0.as_ref())?;
    load_review(&state, title_id, review_id).await?;
    let request = page.request(&state.config.api)?;
    let comments = state.repo.list_comments(review_id, request).await?;
    Ok(Json(Page::build(comments, request, &uri)?))
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses((status = 200, description = "Comment", body = CommentResponse), (status = 404, description = "Not Found"))
)]
pub async fn get_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id, comment_id)): AppPath<(i64, i64, i64)>,
) -> ApiResult<Json<CommentResponse>> {
    authorize(Resource::Comments, Verb::Read, actor.0.as_ref())?;
    load_review(&state, title_id, review_id).await?;
    let comment = state
        .repo
        .get_comment(review_id, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_COMMENT))?;
    Ok(Json(comment.into()))
}

#[utoipa::path(
    post,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID")
    ),
    request_body = CommentWriteRequest,
    responses(
        (status = 201, description = "Created", body = CommentResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown title or review")
    )
)]
pub async fn create_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id)): AppPath<(i64, i64)>,
    AppJson(payload): AppJson<CommentWriteRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    authorize(Resource::Comments, Verb::Create, actor.0.as_ref())?;
    let author = require_actor(&actor)?;
    load_review(&state, title_id, review_id).await?;

    let mut report = Report::new();
    report.check(validate_required_text("text", payload.text.as_deref()));
    report.finish()?;

    let comment = state
        .repo
        .create_comment(NewComment {
            review_id,
            author_id: author.id,
            text: payload.text.unwrap_or_default(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

#[utoipa::path(
    patch,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = CommentWriteRequest,
    responses(
        (status = 200, description = "Updated", body = CommentResponse),
        (status = 403, description = "Neither author nor moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id, comment_id)): AppPath<(i64, i64, i64)>,
    AppJson(payload): AppJson<CommentWriteRequest>,
) -> ApiResult<Json<CommentResponse>> {
    authorize(Resource::Comments, Verb::Update, actor.0.as_ref())?;
    load_review(&state, title_id, review_id).await?;
    let comment = state
        .repo
        .get_comment(review_id, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_COMMENT))?;
    authorize_object(Resource::Comments, Verb::Update, actor.0.as_ref(), comment.author_id)?;

    let Some(text) = payload.text else {
        // Nothing to change.
        return Ok(Json(comment.into()));
    };
    validate_not_blank("text", &text)?;

    let comment = state
        .repo
        .update_comment(comment.id, text)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_COMMENT))?;
    Ok(Json(comment.into()))
}

#[utoipa::path(
    delete,
    path = "/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}/",
    params(
        ("title_id" = i64, Path, description = "Title ID"),
        ("review_id" = i64, Path, description = "Review ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Neither author nor moderator"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    actor: Actor,
    State(state): State<AppState>,
    AppPath((title_id, review_id, comment_id)): AppPath<(i64, i64, i64)>,
) -> ApiResult<StatusCode> {
    authorize(Resource::Comments, Verb::Delete, actor.0.as_ref())?;
    load_review(&state, title_id, review_id).await?;
    let comment = state
        .repo
        .get_comment(review_id, comment_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_COMMENT))?;
    authorize_object(Resource::Comments, Verb::Delete, actor.0.as_ref(), comment.author_id)?;

    if state.repo.delete_comment(comment.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(NO_COMMENT))
    }
}
