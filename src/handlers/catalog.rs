use axum::{
    Json,
    extract::{OriginalUri, State},
    http::{StatusCode, Uri},
};
use validator::Validate;

use crate::{
    AppState,
    auth::Actor,
    error::{ApiError, ApiResult},
    extract::{AppJson, AppPath, AppQuery},
    models::{
        CreateTermRequest, NewTerm, NewTitle, Taxonomy, TermResponse, TitleChanges, TitleFilter,
        TitleResponse, TitleWriteRequest,
    },
    pagination::{Page, PageParams, SearchParams},
    permissions::{Resource, Verb, authorize},
    validation::{Report, validate_not_blank, validate_year},
};

const NO_TITLE: &str = "No Title matches the given query.";

fn resource_of(taxonomy: Taxonomy) -> Resource {
    match taxonomy {
        Taxonomy::Category => Resource::Categories,
        Taxonomy::Genre => Resource::Genres,
    }
}

// --- Categories & Genres (shared implementation) ---

async fn list_terms(
    taxonomy: Taxonomy,
    actor: Actor,
    state: AppState,
    uri: Uri,
    page: PageParams,
    search: SearchParams,
) -> ApiResult<Json<Page<TermResponse>>> {
    authorize(resource_of(taxonomy), Verb::Read, actor.0.as_ref())?;
    let request = page.request(&state.config.api)?;
    let terms = state.repo.list_terms(taxonomy, search.search, request).await?;
    Ok(Json(Page::build(terms, request, &uri)?))
}

async fn create_term(
    taxonomy: Taxonomy,
    actor: Actor,
    state: AppState,
    payload: CreateTermRequest,
) -> ApiResult<(StatusCode, Json<TermResponse>)> {
    authorize(resource_of(taxonomy), Verb::Create, actor.0.as_ref())?;

    let mut report = Report::new();
    report.merge(payload.validate());
    if state.repo.get_term(taxonomy, &payload.slug).await?.is_some() {
        report.add(
            "slug",
            format!("{} with this slug already exists.", taxonomy.label()),
        );
    }
    report.finish()?;

    let term = state
        .repo
        .create_term(
            taxonomy,
            NewTerm {
                name: payload.name,
                slug: payload.slug,
            },
        )
        .await?;
    tracing::info!("{} created: {}", taxonomy.label(), term.slug);
    Ok((StatusCode::CREATED, Json(term.into())))
}

async fn delete_term(
    taxonomy: Taxonomy,
    actor: Actor,
    state: AppState,
    slug: String,
) -> ApiResult<StatusCode> {
    authorize(resource_of(taxonomy), Verb::Delete, actor.0.as_ref())?;

    if state.repo.delete_term(taxonomy, &slug).await? {
        tracing::info!("{} deleted: {}", taxonomy.label(), slug);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!(
            "No {} matches the given query.",
            taxonomy.label()
        )))
    }
}

/// list_categories
///
/// [Public Route] Categories ordered by name; `search` matches a name substring.
#[utoipa::path(
    get,
    path = "/v1/categories/",
    params(PageParams, SearchParams),
    responses((status = 200, description = "Categories", body = Page<TermResponse>))
)]
pub async fn list_categories(
    actor: Actor,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(search): AppQuery<SearchParams>,
) -> ApiResult<Json<Page<TermResponse>>> {
    list_terms(Taxonomy::Category, actor, state, uri, page, search).await
}

#[utoipa::path(
    post,
    path = "/v1/categories/",
    request_body = CreateTermRequest,
    responses(
        (status = 201, description = "Created", body = TermResponse),
        (status = 400, description = "Invalid payload or duplicate slug")
    )
)]
pub async fn create_category(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTermRequest>,
) -> ApiResult<(StatusCode, Json<TermResponse>)> {
    create_term(Taxonomy::Category, actor, state, payload).await
}

/// delete_category
///
/// [Admin Route] Titles in the category are kept and lose their category.
#[utoipa::path(
    delete,
    path = "/v1/categories/{slug}/",
    params(("slug" = String, Path, description = "Category slug")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_category(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> ApiResult<StatusCode> {
    delete_term(Taxonomy::Category, actor, state, slug).await
}

#[utoipa::path(
    get,
    path = "/v1/genres/",
    params(PageParams, SearchParams),
    responses((status = 200, description = "Genres", body = Page<TermResponse>))
)]
pub async fn list_genres(
    actor: Actor,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(search): AppQuery<SearchParams>,
) -> ApiResult<Json<Page<TermResponse>>> {
    list_terms(Taxonomy::Genre, actor, state, uri, page, search).await
}

#[utoipa::path(
    post,
    path = "/v1/genres/",
    request_body = CreateTermRequest,
    responses(
        (status = 201, description = "Created", body = TermResponse),
        (status = 400, description = "Invalid payload or duplicate slug")
    )
)]
pub async fn create_genre(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateTermRequest>,
) -> ApiResult<(StatusCode, Json<TermResponse>)> {
    create_term(Taxonomy::Genre, actor, state, payload).await
}

/// delete_genre
///
/// [Admin Route] Titles are kept; only their membership in the genre is removed.
#[utoipa::path(
    delete,
    path = "/v1/genres/{slug}/",
    params(("slug" = String, Path, description = "Genre slug")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_genre(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
) -> ApiResult<StatusCode> {
    delete_term(Taxonomy::Genre, actor, state, slug).await
}

// --- Titles ---

/// Resolves the slug references of a title payload to ids. Unknown slugs are 404.
async fn resolve_category(state: &AppState, slug: &str) -> ApiResult<i64> {
    state
        .repo
        .get_term(Taxonomy::Category, slug)
        .await?
        .map(|c| c.id)
        .ok_or_else(|| ApiError::not_found(format!("Category \"{slug}\" does not exist.")))
}

async fn resolve_genres(state: &AppState, slugs: &[String]) -> ApiResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let genre = state
            .repo
            .get_term(Taxonomy::Genre, slug)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Genre \"{slug}\" does not exist.")))?;
        if !ids.contains(&genre.id) {
            ids.push(genre.id);
        }
    }
    Ok(ids)
}

fn check_title_fields(payload: &TitleWriteRequest, report: &mut Report) {
    if let Some(name) = &payload.name {
        report.check(validate_not_blank("name", name));
        if name.chars().count() > 256 {
            report.add("name", "Ensure this field has no more than 256 characters.");
        }
    }
    if let Some(year) = payload.year {
        report.check(validate_year(year));
    }
}

/// list_titles
///
/// [Public Route] Titles ordered by name, each with its aggregated rating.
#[utoipa::path(
    get,
    path = "/v1/titles/",
    params(PageParams, TitleFilter),
    responses((status = 200, description = "Titles", body = Page<TitleResponse>))
)]
pub async fn list_titles(
    actor: Actor,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    AppQuery(page): AppQuery<PageParams>,
    AppQuery(filter): AppQuery<TitleFilter>,
) -> ApiResult<Json<Page<TitleResponse>>> {
    authorize(Resource::Titles, Verb::Read, actor.0.as_ref())?;
    let request = page.request(&state.config.api)?;
    let titles = state.repo.list_titles(filter, request).await?;
    Ok(Json(Page::build(titles, request, &uri)?))
}

#[utoipa::path(
    get,
    path = "/v1/titles/{title_id}/",
    params(("title_id" = i64, Path, description = "Title ID")),
    responses((status = 200, description = "Title", body = TitleResponse), (status = 404, description = "Not Found"))
)]
pub async fn get_title(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(title_id): AppPath<i64>,
) -> ApiResult<Json<TitleResponse>> {
    authorize(Resource::Titles, Verb::Read, actor.0.as_ref())?;
    let title = state
        .repo
        .get_title(title_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NO_TITLE))?;
    Ok(Json(title.into()))
}

/// create_title
///
/// [Admin Route] `name` and `year` are required; `category` and `genre` reference
/// existing slugs. The response is the read representation.
#[utoipa::path(
    post,
    path = "/v1/titles/",
    request_body = TitleWriteRequest,
    responses(
        (status = 201, description = "Created", body = TitleResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Unknown category or genre slug")
    )
)]
pub async fn create_title(
    actor: Actor,
    State(state): State<AppState>,
    AppJson(payload): AppJson<TitleWriteRequest>,
) -> ApiResult<(StatusCode, Json<TitleResponse>)> {
    authorize(Resource::Titles, Verb::Create, actor.0.as_ref())?;

    let mut report = Report::new();
    if payload.name.is_none() {
        report.add("name", "This field is required.");
    }
    if payload.year.is_none() {
        report.add("year", "This field is required.");
    }
    check_title_fields(&payload, &mut report);
    report.finish()?;

    let category_id = match &payload.category {
        Some(slug) => Some(resolve_category(&state, slug).await?),
        None => None,
    };
    let genre_ids = resolve_genres(&state, payload.genre.as_deref().unwrap_or_default()).await?;

    let title = state
        .repo
        .create_title(NewTitle {
            name: payload.name.unwrap_or_default(),
            year: payload.year.unwrap_or_default(),
            description: payload.description.unwrap_or_default(),
            category_id,
            genre_ids,
        })
        .await?;

    tracing::info!("Title created: {} ({})", title.name, title.id);
    Ok((StatusCode::CREATED, Json(title.into())))
}

/// update_title
///
/// [Admin Route] Partial update; a provided `genre` list replaces the current genres.
#[utoipa::path(
    patch,
    path = "/v1/titles/{title_id}/",
    params(("title_id" = i64, Path, description = "Title ID")),
    request_body = TitleWriteRequest,
    responses(
        (status = 200, description = "Updated", body = TitleResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_title(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(title_id): AppPath<i64>,
    AppJson(payload): AppJson<TitleWriteRequest>,
) -> ApiResult<Json<TitleResponse>> {
    authorize(Resource::Titles, Verb::Update, actor.0.as_ref())?;

    if state.repo.get_title(title_id).await?.is_none() {
        return Err(ApiError::not_found(NO_TITLE));
    }

    let mut report = Report::new();
    check_title_fields(&payload, &mut report);
    report.finish()?;

    let category_id = match &payload.category {
        Some(slug) => Some(Some(resolve_category(&state, slug).await?)),
        None => None,
    };
    let genre_ids = match &payload.genre {
        Some(slugs) => Some(resolve_genres(&state, slugs).await?),
        None => None,
    };

    let title = state
        .repo
        .update_title(
            title_id,
            TitleChanges {
                name: payload.name,
                year: payload.year,
                description: payload.description,
                category_id,
                genre_ids,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found(NO_TITLE))?;
    Ok(Json(title.into()))
}

/// delete_title
///
/// [Admin Route] Removes the title with its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/v1/titles/{title_id}/",
    params(("title_id" = i64, Path, description = "Title ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_title(
    actor: Actor,
    State(state): State<AppState>,
    AppPath(title_id): AppPath<i64>,
) -> ApiResult<StatusCode> {
    authorize(Resource::Titles, Verb::Delete, actor.0.as_ref())?;

    if state.repo.delete_title(title_id).await? {
        tracing::info!("Title {} deleted", title_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(NO_TITLE))
    }
}
