use sqlx::PgPool;
use uuid::Uuid;
use yamdb_api::{
    models::{
        NewComment, NewReview, NewTerm, NewTitle, NewUser, Role, Taxonomy, TitleChanges,
        TitleFilter, User, UserChanges,
    },
    repository::{
        InMemoryRepository, PageRequest, PostgresRepository, Repository, RepositoryError,
    },
};

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Per-run suffix so repeated runs against one database do not collide.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8])
}

async fn create_test_user(repo: &dyn Repository, role: Role) -> User {
    let username = unique(role.as_str());
    repo.create_user(NewUser {
        email: format!("{username}@test.com"),
        username,
        role,
        ..Default::default()
    })
    .await
    .expect("create user")
}

// --- Shared Contract ---
// Each check runs against any backend; the Postgres variants are #[ignore]d.

async fn check_user_uniqueness(repo: &dyn Repository) {
    let user = create_test_user(repo, Role::User).await;

    let duplicate = repo
        .create_user(NewUser {
            username: user.username.clone(),
            email: format!("other-{}", user.email),
            ..Default::default()
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(RepositoryError::UniqueViolation(ref c)) if c == "users_username_key"
    ));

    let duplicate = repo
        .create_user(NewUser {
            username: unique("fresh"),
            email: user.email.clone(),
            ..Default::default()
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(RepositoryError::UniqueViolation(ref c)) if c == "users_email_key"
    ));
}

async fn check_user_partial_update(repo: &dyn Repository) {
    let user = create_test_user(repo, Role::User).await;
    assert!(user.is_active);
    assert!(!user.is_superuser);

    let updated = repo
        .update_user(
            user.id,
            UserChanges {
                bio: Some("About me".to_string()),
                role: Some(Role::Moderator),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("user exists");
    assert_eq!(updated.bio, "About me");
    assert_eq!(updated.role, Role::Moderator);
    assert_eq!(updated.email, user.email);

    let missing = repo.update_user(-1, UserChanges::default()).await.unwrap();
    assert!(missing.is_none());
}

async fn check_title_rating_and_cascades(repo: &dyn Repository) {
    let category = repo
        .create_term(
            Taxonomy::Category,
            NewTerm {
                name: "Film".to_string(),
                slug: unique("film"),
            },
        )
        .await
        .unwrap();
    let genre = repo
        .create_term(
            Taxonomy::Genre,
            NewTerm {
                name: "Noir".to_string(),
                slug: unique("noir"),
            },
        )
        .await
        .unwrap();

    let title = repo
        .create_title(NewTitle {
            name: unique("Chinatown"),
            year: 1974,
            description: String::new(),
            category_id: Some(category.id),
            genre_ids: vec![genre.id],
        })
        .await
        .unwrap();
    assert_eq!(title.category.as_ref().map(|c| c.id), Some(category.id));
    assert_eq!(title.genres.len(), 1);
    assert_eq!(title.rating, None);

    let first = create_test_user(repo, Role::User).await;
    let second = create_test_user(repo, Role::User).await;
    let review = repo
        .create_review(NewReview {
            title_id: title.id,
            author_id: first.id,
            text: "Sharp".to_string(),
            score: 7,
        })
        .await
        .unwrap();
    assert_eq!(review.author, first.username);
    repo.create_review(NewReview {
        title_id: title.id,
        author_id: second.id,
        text: "Perfect".to_string(),
        score: 10,
    })
    .await
    .unwrap();

    let duplicate = repo
        .create_review(NewReview {
            title_id: title.id,
            author_id: first.id,
            text: "Again".to_string(),
            score: 1,
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(RepositoryError::UniqueViolation(ref c)) if c == "unique_title_author"
    ));
    assert!(repo.review_exists(title.id, first.id).await.unwrap());

    let rated = repo.get_title(title.id).await.unwrap().unwrap();
    assert_eq!(rated.rating, Some(8.5));

    // Filters by slug.
    let filtered = repo
        .list_titles(
            TitleFilter {
                genre: Some(genre.slug.clone()),
                ..Default::default()
            },
            PageRequest::new(1, 50),
        )
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);
    assert_eq!(filtered.items[0].id, title.id);

    // Deleting the genre drops the membership only.
    assert!(repo.delete_term(Taxonomy::Genre, &genre.slug).await.unwrap());
    let without_genre = repo.get_title(title.id).await.unwrap().unwrap();
    assert!(without_genre.genres.is_empty());

    // Deleting the category nullifies the reference.
    assert!(repo.delete_term(Taxonomy::Category, &category.slug).await.unwrap());
    let without_category = repo.get_title(title.id).await.unwrap().unwrap();
    assert!(without_category.category.is_none());
    assert!(!repo.delete_term(Taxonomy::Category, &category.slug).await.unwrap());

    // Deleting a user removes their review and the rating follows.
    let comment = repo
        .create_comment(NewComment {
            review_id: review.id,
            author_id: second.id,
            text: "Agreed".to_string(),
        })
        .await
        .unwrap();
    assert!(repo.delete_user(first.id).await.unwrap());
    assert!(repo.get_review(title.id, review.id).await.unwrap().is_none());
    assert!(repo.get_comment(review.id, comment.id).await.unwrap().is_none());
    let rerated = repo.get_title(title.id).await.unwrap().unwrap();
    assert_eq!(rerated.rating, Some(10.0));

    // Deleting the title takes the remaining reviews with it.
    assert!(repo.delete_title(title.id).await.unwrap());
    let reviews = repo.list_reviews(title.id, PageRequest::new(1, 50)).await.unwrap();
    assert_eq!(reviews.total, 0);
}

async fn check_title_update_replaces_genres(repo: &dyn Repository) {
    let genres: Vec<i64> = {
        let mut ids = Vec::new();
        for name in ["a", "b"] {
            let genre = repo
                .create_term(
                    Taxonomy::Genre,
                    NewTerm {
                        name: name.to_string(),
                        slug: unique(name),
                    },
                )
                .await
                .unwrap();
            ids.push(genre.id);
        }
        ids
    };

    let title = repo
        .create_title(NewTitle {
            name: unique("Heat"),
            year: 1995,
            description: "Crime".to_string(),
            category_id: None,
            genre_ids: vec![genres[0]],
        })
        .await
        .unwrap();

    let updated = repo
        .update_title(
            title.id,
            TitleChanges {
                year: Some(1996),
                genre_ids: Some(vec![genres[1]]),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.year, 1996);
    assert_eq!(updated.description, "Crime");
    assert_eq!(
        updated.genres.iter().map(|g| g.id).collect::<Vec<_>>(),
        vec![genres[1]]
    );

    let untouched = repo
        .update_title(title.id, TitleChanges::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.genres.len(), 1);
}

async fn check_term_pagination(repo: &dyn Repository) {
    let marker = unique("pg");
    for i in 0..5 {
        repo.create_term(
            Taxonomy::Category,
            NewTerm {
                name: format!("{marker} {i}"),
                slug: format!("{marker}-{i}"),
            },
        )
        .await
        .unwrap();
    }

    let page = repo
        .list_terms(Taxonomy::Category, Some(marker.clone()), PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(
        page.items.iter().map(|t| t.name.clone()).collect::<Vec<_>>(),
        vec![format!("{marker} 2"), format!("{marker} 3")]
    );
}

async fn check_search_is_literal(repo: &dyn Repository) {
    let marker = unique("lit");
    for name in ["Solaris", "Stalker", "Mir_ror"] {
        repo.create_title(NewTitle {
            name: format!("{marker} {name}"),
            year: 1975,
            description: String::new(),
            category_id: None,
            genre_ids: vec![],
        })
        .await
        .unwrap();
    }

    let count = |needle: String| async move {
        repo.list_titles(
            TitleFilter {
                name: Some(needle),
                ..Default::default()
            },
            PageRequest::new(1, 50),
        )
        .await
        .unwrap()
        .total
    };

    assert_eq!(count(marker.clone()).await, 3);
    assert_eq!(count(format!("{marker}_")).await, 0);
    assert_eq!(count(format!("{marker}%")).await, 0);
    assert_eq!(count(format!("{marker} s_l")).await, 0);
    assert_eq!(count(format!("{marker} mir_")).await, 1);

    repo.create_term(
        Taxonomy::Genre,
        NewTerm {
            name: format!("{marker} 100% noir"),
            slug: unique("noir"),
        },
    )
    .await
    .unwrap();
    let literal = repo
        .list_terms(Taxonomy::Genre, Some(format!("{marker} 100%")), PageRequest::new(1, 50))
        .await
        .unwrap();
    assert_eq!(literal.total, 1);
    let wildcard = repo
        .list_terms(Taxonomy::Genre, Some(format!("{marker}%noir")), PageRequest::new(1, 50))
        .await
        .unwrap();
    assert_eq!(wildcard.total, 0);
}

// --- In-memory backend ---

#[tokio::test]
async fn test_memory_user_uniqueness() {
    check_user_uniqueness(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_user_partial_update() {
    check_user_partial_update(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_title_rating_and_cascades() {
    check_title_rating_and_cascades(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_title_update_replaces_genres() {
    check_title_update_replaces_genres(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_term_pagination() {
    check_term_pagination(&InMemoryRepository::new()).await;
}

#[tokio::test]
async fn test_memory_search_is_literal() {
    check_search_is_literal(&InMemoryRepository::new()).await;
}

// --- Postgres backend (needs DATABASE_URL) ---

#[tokio::test]
#[ignore = "requires a Postgres database at DATABASE_URL"]
async fn test_postgres_user_uniqueness() {
    let ctx = DbTestContext::setup().await;
    check_user_uniqueness(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a Postgres database at DATABASE_URL"]
async fn test_postgres_user_partial_update() {
    let ctx = DbTestContext::setup().await;
    check_user_partial_update(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a Postgres database at DATABASE_URL"]
async fn test_postgres_title_rating_and_cascades() {
    let ctx = DbTestContext::setup().await;
    check_title_rating_and_cascades(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a Postgres database at DATABASE_URL"]
async fn test_postgres_title_update_replaces_genres() {
    let ctx = DbTestContext::setup().await;
    check_title_update_replaces_genres(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a Postgres database at DATABASE_URL"]
async fn test_postgres_term_pagination() {
    let ctx = DbTestContext::setup().await;
    check_term_pagination(&ctx.repository()).await;
}

#[tokio::test]
#[ignore = "requires a Postgres database at DATABASE_URL"]
async fn test_postgres_search_is_literal() {
    let ctx = DbTestContext::setup().await;
    check_search_is_literal(&ctx.repository()).await;
}
