use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PageRequest, Paged, RepoResult, Repository, RepositoryError};
use crate::models::{
    Comment, NewComment, NewReview, NewTerm, NewTitle, NewUser, Review, Taxonomy, Term, Title,
    TitleChanges, TitleFilter, User, UserChanges,
};

#[derive(Debug, Clone)]
struct TitleRecord {
    id: i64,
    name: String,
    year: i32,
    description: String,
    category_id: Option<i64>,
}

#[derive(Debug, Clone)]
struct ReviewRecord {
    id: i64,
    title_id: i64,
    author_id: i64,
    text: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: i64,
    review_id: i64,
    author_id: i64,
    text: String,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    next_id: i64,
    users: BTreeMap<i64, User>,
    categories: BTreeMap<i64, Term>,
    genres: BTreeMap<i64, Term>,
    titles: BTreeMap<i64, TitleRecord>,
    // (title_id, genre_id)
    genre_titles: BTreeSet<(i64, i64)>,
    reviews: BTreeMap<i64, ReviewRecord>,
    comments: BTreeMap<i64, CommentRecord>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn terms(&self, taxonomy: Taxonomy) -> &BTreeMap<i64, Term> {
        match taxonomy {
            Taxonomy::Category => &self.categories,
            Taxonomy::Genre => &self.genres,
        }
    }

    fn terms_mut(&mut self, taxonomy: Taxonomy) -> &mut BTreeMap<i64, Term> {
        match taxonomy {
            Taxonomy::Category => &mut self.categories,
            Taxonomy::Genre => &mut self.genres,
        }
    }

    fn username_of(&self, user_id: i64) -> String {
        self.users
            .get(&user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn title(&self, record: &TitleRecord) -> Title {
        let category = record
            .category_id
            .and_then(|id| self.categories.get(&id))
            .cloned();
        let mut genres: Vec<Term> = self
            .genre_titles
            .range((record.id, i64::MIN)..=(record.id, i64::MAX))
            .filter_map(|(_, genre_id)| self.genres.get(genre_id).cloned())
            .collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));

        let scores: Vec<i32> = self
            .reviews
            .values()
            .filter(|r| r.title_id == record.id)
            .map(|r| r.score)
            .collect();
        let rating = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64)
        };

        Title {
            id: record.id,
            name: record.name.clone(),
            year: record.year,
            description: record.description.clone(),
            category,
            genres,
            rating,
        }
    }

    fn review(&self, record: &ReviewRecord) -> Review {
        Review {
            id: record.id,
            title_id: record.title_id,
            author_id: record.author_id,
            author: self.username_of(record.author_id),
            text: record.text.clone(),
            score: record.score,
            pub_date: record.pub_date,
        }
    }

    fn comment(&self, record: &CommentRecord) -> Comment {
        Comment {
            id: record.id,
            review_id: record.review_id,
            author_id: record.author_id,
            author: self.username_of(record.author_id),
            text: record.text.clone(),
            pub_date: record.pub_date,
        }
    }

    fn check_user_unique(
        &self,
        exclude: Option<i64>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> RepoResult<()> {
        for user in self.users.values().filter(|u| Some(u.id) != exclude) {
            if username == Some(user.username.as_str()) {
                return Err(RepositoryError::UniqueViolation("users_username_key".into()));
            }
            if email == Some(user.email.as_str()) {
                return Err(RepositoryError::UniqueViolation("users_email_key".into()));
            }
        }
        Ok(())
    }

    fn remove_reviews_where(&mut self, predicate: impl Fn(&ReviewRecord) -> bool) {
        let doomed: BTreeSet<i64> = self
            .reviews
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.id)
            .collect();
        self.reviews.retain(|id, _| !doomed.contains(id));
        self.comments.retain(|_, c| !doomed.contains(&c.review_id));
    }
}

fn page_of<T>(items: Vec<T>, page: PageRequest) -> Paged<T> {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.page_size as usize)
        .collect();
    Paged { items, total }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. Enforces the same uniqueness
/// constraints (with the same constraint names) and the same delete semantics as the
/// PostgreSQL schema. Used for local runs without a database and throughout the tests.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.store.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let store = self.store.read().await;
        Ok(store.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, search: Option<String>, page: PageRequest) -> RepoResult<Paged<User>> {
        let store = self.store.read().await;
        let mut users: Vec<User> = store
            .users
            .values()
            .filter(|u| search.as_deref().is_none_or(|s| contains_ci(&u.username, s)))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(page_of(users, page))
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut store = self.store.write().await;
        store.check_user_unique(None, Some(&user.username), Some(&user.email))?;
        let id = store.next_id();
        let record = User {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
            is_superuser: user.is_superuser,
            is_active: true,
            date_joined: Utc::now(),
        };
        store.users.insert(id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> RepoResult<Option<User>> {
        let mut store = self.store.write().await;
        if !store.users.contains_key(&id) {
            return Ok(None);
        }
        store.check_user_unique(Some(id), changes.username.as_deref(), changes.email.as_deref())?;

        let Some(user) = store.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        if let Some(bio) = changes.bio {
            user.bio = bio;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(is_superuser) = changes.is_superuser {
            user.is_superuser = is_superuser;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.users.remove(&id).is_none() {
            return Ok(false);
        }
        store.remove_reviews_where(|r| r.author_id == id);
        store.comments.retain(|_, c| c.author_id != id);
        Ok(true)
    }

    // --- CATEGORIES & GENRES ---

    async fn list_terms(
        &self,
        taxonomy: Taxonomy,
        search: Option<String>,
        page: PageRequest,
    ) -> RepoResult<Paged<Term>> {
        let store = self.store.read().await;
        let mut terms: Vec<Term> = store
            .terms(taxonomy)
            .values()
            .filter(|t| search.as_deref().is_none_or(|s| contains_ci(&t.name, s)))
            .cloned()
            .collect();
        terms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page_of(terms, page))
    }

    async fn get_term(&self, taxonomy: Taxonomy, slug: &str) -> RepoResult<Option<Term>> {
        let store = self.store.read().await;
        Ok(store.terms(taxonomy).values().find(|t| t.slug == slug).cloned())
    }

    async fn create_term(&self, taxonomy: Taxonomy, term: NewTerm) -> RepoResult<Term> {
        let mut store = self.store.write().await;
        if store.terms(taxonomy).values().any(|t| t.slug == term.slug) {
            return Err(RepositoryError::UniqueViolation(format!(
                "{}_slug_key",
                taxonomy.table()
            )));
        }
        let id = store.next_id();
        let record = Term {
            id,
            name: term.name,
            slug: term.slug,
        };
        store.terms_mut(taxonomy).insert(id, record.clone());
        Ok(record)
    }

    async fn delete_term(&self, taxonomy: Taxonomy, slug: &str) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        let Some(id) = store
            .terms(taxonomy)
            .values()
            .find(|t| t.slug == slug)
            .map(|t| t.id)
        else {
            return Ok(false);
        };
        store.terms_mut(taxonomy).remove(&id);
        match taxonomy {
            Taxonomy::Category => {
                for title in store.titles.values_mut() {
                    if title.category_id == Some(id) {
                        title.category_id = None;
                    }
                }
            }
            Taxonomy::Genre => store.genre_titles.retain(|(_, genre_id)| *genre_id != id),
        }
        Ok(true)
    }

    // --- TITLES ---

    async fn list_titles(&self, filter: TitleFilter, page: PageRequest) -> RepoResult<Paged<Title>> {
        let store = self.store.read().await;
        let mut titles: Vec<Title> = store
            .titles
            .values()
            .map(|record| store.title(record))
            .filter(|t| filter.name.as_deref().is_none_or(|n| contains_ci(&t.name, n)))
            .filter(|t| filter.year.is_none_or(|y| t.year == y))
            .filter(|t| {
                filter.category.as_deref().is_none_or(|slug| {
                    t.category.as_ref().is_some_and(|c| c.slug == slug)
                })
            })
            .filter(|t| {
                filter
                    .genre
                    .as_deref()
                    .is_none_or(|slug| t.genres.iter().any(|g| g.slug == slug))
            })
            .collect();
        titles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page_of(titles, page))
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let store = self.store.read().await;
        Ok(store.titles.get(&id).map(|record| store.title(record)))
    }

    async fn create_title(&self, title: NewTitle) -> RepoResult<Title> {
        let mut store = self.store.write().await;
        let id = store.next_id();
        let record = TitleRecord {
            id,
            name: title.name,
            year: title.year,
            description: title.description,
            category_id: title.category_id,
        };
        for genre_id in title.genre_ids {
            store.genre_titles.insert((id, genre_id));
        }
        store.titles.insert(id, record.clone());
        Ok(store.title(&record))
    }

    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Option<Title>> {
        let mut store = self.store.write().await;
        let Some(record) = store.titles.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            record.name = name;
        }
        if let Some(year) = changes.year {
            record.year = year;
        }
        if let Some(description) = changes.description {
            record.description = description;
        }
        if let Some(category_id) = changes.category_id {
            record.category_id = category_id;
        }
        let record = record.clone();

        if let Some(genre_ids) = changes.genre_ids {
            store.genre_titles.retain(|(title_id, _)| *title_id != id);
            for genre_id in genre_ids {
                store.genre_titles.insert((id, genre_id));
            }
        }
        Ok(Some(store.title(&record)))
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if store.titles.remove(&id).is_none() {
            return Ok(false);
        }
        store.genre_titles.retain(|(title_id, _)| *title_id != id);
        store.remove_reviews_where(|r| r.title_id == id);
        Ok(true)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64, page: PageRequest) -> RepoResult<Paged<Review>> {
        let store = self.store.read().await;
        let reviews = store
            .reviews
            .values()
            .filter(|r| r.title_id == title_id)
            .map(|r| store.review(r))
            .collect();
        Ok(page_of(reviews, page))
    }

    async fn get_review(&self, title_id: i64, id: i64) -> RepoResult<Option<Review>> {
        let store = self.store.read().await;
        Ok(store
            .reviews
            .get(&id)
            .filter(|r| r.title_id == title_id)
            .map(|r| store.review(r)))
    }

    async fn review_exists(&self, title_id: i64, author_id: i64) -> RepoResult<bool> {
        let store = self.store.read().await;
        Ok(store
            .reviews
            .values()
            .any(|r| r.title_id == title_id && r.author_id == author_id))
    }

    async fn create_review(&self, review: NewReview) -> RepoResult<Review> {
        let mut store = self.store.write().await;
        if store
            .reviews
            .values()
            .any(|r| r.title_id == review.title_id && r.author_id == review.author_id)
        {
            return Err(RepositoryError::UniqueViolation("unique_title_author".into()));
        }
        let id = store.next_id();
        let record = ReviewRecord {
            id,
            title_id: review.title_id,
            author_id: review.author_id,
            text: review.text,
            score: review.score,
            pub_date: Utc::now(),
        };
        store.reviews.insert(id, record.clone());
        Ok(store.review(&record))
    }

    async fn update_review(
        &self,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> RepoResult<Option<Review>> {
        let mut store = self.store.write().await;
        let Some(record) = store.reviews.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(text) = text {
            record.text = text;
        }
        if let Some(score) = score {
            record.score = score;
        }
        let record = record.clone();
        Ok(Some(store.review(&record)))
    }

    async fn delete_review(&self, id: i64) -> RepoResult<bool> {
        let mut store = self.store.write().await;
        if !store.reviews.contains_key(&id) {
            return Ok(false);
        }
        store.remove_reviews_where(|r| r.id == id);
        Ok(true)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64, page: PageRequest) -> RepoResult<Paged<Comment>> {
        let store = self.store.read().await;
        let comments = store
            .comments
            .values()
            .filter(|c| c.review_id == review_id)
            .map(|c| store.comment(c))
            .collect();
        Ok(page_of(comments, page))
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> RepoResult<Option<Comment>> {
        let store = self.store.read().await;
        Ok(store
            .comments
            .get(&id)
            .filter(|c| c.review_id == review_id)
            .map(|c| store.comment(c)))
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        let mut store = self.store.write().await;
        if !store.reviews.contains_key(&comment.review_id) {
            return Err(RepositoryError::NotFound(format!("review {}", comment.review_id)));
        }
        let id = store.next_id();
        let record = CommentRecord {
            id,
            review_id: comment.review_id,
            author_id: comment.author_id,
            text: comment.text,
            pub_date: Utc::now(),
        };
        store.comments.insert(id, record.clone());
        Ok(store.comment(&record))
    }

    async fn update_comment(&self, id: i64, text: String) -> RepoResult<Option<Comment>> {
        let mut store = self.store.write().await;
        let Some(record) = store.comments.get_mut(&id) else {
            return Ok(None);
        };
        record.text = text;
        let record = record.clone();
        Ok(Some(store.comment(&record)))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        Ok(self.store.write().await.comments.remove(&id).is_some())
    }
}
