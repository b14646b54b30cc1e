use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{PageRequest, Paged, RepoResult, Repository, RepositoryError};
use crate::models::{
    Comment, NewComment, NewReview, NewTerm, NewTitle, NewUser, Review, Taxonomy, Term, Title,
    TitleChanges, TitleFilter, User, UserChanges,
};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, bio, role, is_superuser, is_active, date_joined";

/// Title columns with the category joined in and the rating aggregated by the database.
const TITLE_SELECT: &str = r#"
    SELECT t.id, t.name, t.year, t.description,
           c.id AS category_id, c.name AS category_name, c.slug AS category_slug,
           (SELECT AVG(r.score)::float8 FROM reviews r WHERE r.title_id = t.id) AS rating
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    WHERE TRUE
"#;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id, r.author_id, u.username AS author, r.text, r.score, r.pub_date
    FROM reviews r
    JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id, c.author_id, u.username AS author, c.text, c.pub_date
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

#[derive(FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: String,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_slug: Option<String>,
    rating: Option<f64>,
}

#[derive(FromRow)]
struct TitleGenreRow {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Constraint and cascade semantics
/// come from the schema in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Attaches genres to a batch of title rows with a single query.
    async fn hydrate_titles(&self, rows: Vec<TitleRow>) -> RepoResult<Vec<Title>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let genre_rows = sqlx::query_as::<_, TitleGenreRow>(
            r#"
            SELECT gt.title_id, g.id, g.name, g.slug
            FROM genre_titles gt
            JOIN genres g ON g.id = gt.genre_id
            WHERE gt.title_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut genres: HashMap<i64, Vec<Term>> = HashMap::new();
        for row in genre_rows {
            genres.entry(row.title_id).or_default().push(Term {
                id: row.id,
                name: row.name,
                slug: row.slug,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let category = match (row.category_id, row.category_name, row.category_slug) {
                    (Some(id), Some(name), Some(slug)) => Some(Term { id, name, slug }),
                    _ => None,
                };
                Title {
                    id: row.id,
                    genres: genres.remove(&row.id).unwrap_or_default(),
                    name: row.name,
                    year: row.year,
                    description: row.description,
                    category,
                    rating: row.rating,
                }
            })
            .collect())
    }

    async fn fetch_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
        builder.push(" AND t.id = ").push_bind(id);
        let row = builder
            .build_query_as::<TitleRow>()
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate_titles(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

/// Wraps user text as an ILIKE substring pattern. `%`, `_` and `\` match literally.
fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Appends the title filters to a query that already ends in a WHERE clause.
fn push_title_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TitleFilter) {
    if let Some(name) = &filter.name {
        builder
            .push(" AND t.name ILIKE ")
            .push_bind(contains_pattern(name))
            .push(r" ESCAPE '\'");
    }
    if let Some(year) = filter.year {
        builder.push(" AND t.year = ").push_bind(year);
    }
    if let Some(category) = &filter.category {
        builder.push(" AND c.slug = ").push_bind(category.clone());
    }
    if let Some(genre) = &filter.genre {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM genre_titles gt JOIN genres g ON g.id = gt.genre_id \
                 WHERE gt.title_id = t.id AND g.slug = ",
            )
            .push_bind(genre.clone())
            .push(")");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_users
    ///
    /// Uses QueryBuilder for the optional username search so values stay parameterized.
    async fn list_users(&self, search: Option<String>, page: PageRequest) -> RepoResult<Paged<User>> {
        let pattern = search.as_deref().map(contains_pattern);

        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users WHERE TRUE");
        if let Some(p) = &pattern {
            count
                .push(" AND username ILIKE ")
                .push_bind(p.clone())
                .push(r" ESCAPE '\'");
        }
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        if let Some(p) = pattern {
            builder
                .push(" AND username ILIKE ")
                .push_bind(p)
                .push(r" ESCAPE '\'");
        }
        builder
            .push(" ORDER BY username LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Paged { items, total })
    }

    /// create_user
    ///
    /// New accounts are always active. Superusers additionally get the superuser flag.
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let sql = format!(
            "INSERT INTO users (username, email, first_name, last_name, bio, role, is_superuser, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user.username)
            .bind(user.email)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.bio)
            .bind(user.role.as_str())
            .bind(user.is_superuser)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_user
    ///
    /// COALESCE keeps every column whose change is `None`.
    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                bio = COALESCE($6, bio),
                role = COALESCE($7, role),
                is_superuser = COALESCE($8, is_superuser)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.bio)
            .bind(changes.role.map(|r| r.as_str()))
            .bind(changes.is_superuser)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_user(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- CATEGORIES & GENRES ---

    async fn list_terms(
        &self,
        taxonomy: Taxonomy,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<Paged<Term>> {
        let table = taxonomy.table();
        let pattern = search.as_deref().map(contains_pattern);

        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE TRUE"));
        if let Some(p) = &pattern {
            count
                .push(" AND name ILIKE ")
                .push_bind(p.clone())
                .push(r" ESCAPE '\'");
        }
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT id, name, slug FROM {table} WHERE TRUE"));
        if let Some(p) = pattern {
            builder
                .push(" AND name ILIKE ")
                .push_bind(p)
                .push(r" ESCAPE '\'");
        }
        builder
            .push(" ORDER BY name, id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let items = builder
            .build_query_as::<Term>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Paged { items, total })
    }

    async fn get_term(&self, taxonomy: Taxonomy, slug: &str) -> RepoResult<Option<Term>> {
        let sql = format!("SELECT id, name, slug FROM {} WHERE slug = $1", taxonomy.table());
        Ok(sqlx::query_as::<_, Term>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_term(&self, taxonomy: Taxonomy, term: NewTerm) -> RepoResult<Term> {
        let sql = format!(
            "INSERT INTO {} (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
            taxonomy.table()
        );
        Ok(sqlx::query_as::<_, Term>(&sql)
            .bind(term.name)
            .bind(term.slug)
            .fetch_one(&self.pool)
            .await?)
    }

    /// delete_term
    ///
    /// The foreign keys do the rest: `titles.category_id` is SET NULL and
    /// `genre_titles` rows CASCADE.
    async fn delete_term(&self, taxonomy: Taxonomy, slug: &str) -> RepoResult<bool> {
        let sql = format!("DELETE FROM {} WHERE slug = $1", taxonomy.table());
        let res = sqlx::query(&sql).bind(slug).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    // --- TITLES ---

    async fn list_titles(&self, filter: TitleFilter, page: PageRequest) -> RepoResult<Paged<Title>> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM titles t LEFT JOIN categories c ON c.id = t.category_id WHERE TRUE",
        );
        push_title_filters(&mut count, &filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
        push_title_filters(&mut builder, &filter);
        builder
            .push(" ORDER BY t.name, t.id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = builder
            .build_query_as::<TitleRow>()
            .fetch_all(&self.pool)
            .await?;

        let items = self.hydrate_titles(rows).await?;
        Ok(Paged { items, total })
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        self.fetch_title(id).await
    }

    /// create_title
    ///
    /// Inserts the title and its genre links in one transaction.
    async fn create_title(&self, title: NewTitle) -> RepoResult<Title> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(title.name)
        .bind(title.year)
        .bind(title.description)
        .bind(title.category_id)
        .fetch_one(&mut *tx)
        .await?;

        for genre_id in title.genre_ids {
            sqlx::query(
                "INSERT INTO genre_titles (genre_id, title_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(genre_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.fetch_title(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("title {id}")))
    }

    /// update_title
    ///
    /// Partial update; a provided genre list replaces the existing links.
    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Option<Title>> {
        let mut tx = self.pool.begin().await?;

        let (set_category, category_id) = match changes.category_id {
            Some(category_id) => (true, category_id),
            None => (false, None),
        };

        let res = sqlx::query(
            r#"
            UPDATE titles
            SET name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = COALESCE($4, description),
                category_id = CASE WHEN $5 THEN $6 ELSE category_id END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.year)
        .bind(changes.description)
        .bind(set_category)
        .bind(category_id)
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(genre_ids) = changes.genre_ids {
            sqlx::query("DELETE FROM genre_titles WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for genre_id in genre_ids {
                sqlx::query(
                    "INSERT INTO genre_titles (genre_id, title_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(genre_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        self.fetch_title(id).await
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64, page: PageRequest) -> RepoResult<Paged<Review>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;
        let sql = format!("{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.pub_date, r.id LIMIT $2 OFFSET $3");
        let items = sqlx::query_as::<_, Review>(&sql)
            .bind(title_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(Paged { items, total })
    }

    async fn get_review(&self, title_id: i64, id: i64) -> RepoResult<Option<Review>> {
        let sql = format!("{REVIEW_SELECT} WHERE r.title_id = $1 AND r.id = $2");
        Ok(sqlx::query_as::<_, Review>(&sql)
            .bind(title_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn review_exists(&self, title_id: i64, author_id: i64) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE title_id = $1 AND author_id = $2)",
        )
        .bind(title_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// create_review
    ///
    /// Insert and author join in one statement (CTE). The `unique_title_author`
    /// constraint settles concurrent duplicates.
    async fn create_review(&self, review: NewReview) -> RepoResult<Review> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id, i.author_id, u.username AS author, i.text, i.score, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review.title_id)
        .bind(review.author_id)
        .bind(review.text)
        .bind(review.score)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_review(
        &self,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($2, text), score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT u2.id, u2.title_id, u2.author_id, u.username AS author, u2.text, u2.score, u2.pub_date
            FROM updated u2 JOIN users u ON u.id = u2.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(score)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_review(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64, page: PageRequest) -> RepoResult<Paged<Comment>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&self.pool)
            .await?;
        let sql = format!("{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.pub_date, c.id LIMIT $2 OFFSET $3");
        let items = sqlx::query_as::<_, Comment>(&sql)
            .bind(review_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(Paged { items, total })
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> RepoResult<Option<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.review_id = $1 AND c.id = $2");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(review_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id, i.author_id, u.username AS author, i.text, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(comment.review_id)
        .bind(comment.author_id)
        .bind(comment.text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = $2 WHERE id = $1
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT u2.id, u2.review_id, u2.author_id, u.username AS author, u2.text, u2.pub_date
            FROM updated u2 JOIN users u ON u.id = u2.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn test_pattern_escapes_like_metacharacters() {
        assert_eq!(contains_pattern("sol"), "%sol%");
        assert_eq!(contains_pattern("s_l"), r"%s\_l%");
        assert_eq!(contains_pattern("100%"), r"%100\%%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }
}
