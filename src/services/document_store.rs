//! SQLite-backed document store.
//!
//! Every entity lives in a logical collection inside one `documents` table;
//! bodies are camelCase JSON. A sibling `unique_keys` table enforces the
//! uniqueness invariants (usernames, emails, like and subscription keys) so
//! that racing check-then-create sequences are arbitrated by the database,
//! not by handler code. Filtered reads compile to SQL through
//! `QueryBuilder` + `json_extract`; aggregation pipelines are evaluated by
//! [`super::pipeline`] over prefetched collections.

use crate::models::ObjectId;
use crate::services::pipeline::{self, Cond, Filter, Stage};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Collection names used across the backend.
pub mod collections {
    pub const USERS: &str = "users";
    pub const VIDEOS: &str = "videos";
    pub const COMMENTS: &str = "comments";
    pub const LIKES: &str = "likes";
    pub const PLAYLISTS: &str = "playlists";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const TWEETS: &str = "tweets";
    pub const SESSIONS: &str = "sessions";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate value for unique key `{0}`")]
    Duplicate(String),
    #[error("document for `{0}` is missing a string `id` field")]
    MissingId(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of pipeline results plus the pagination bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub docs: Vec<T>,
    /// Matching documents before pagination was applied.
    pub total_docs: i64,
    pub limit: i64,
    pub page: i64,
    pub total_pages: i64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);
CREATE INDEX IF NOT EXISTS idx_documents_created ON documents (collection, created_at);
CREATE TABLE IF NOT EXISTS unique_keys (
    collection TEXT NOT NULL,
    ukey TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    PRIMARY KEY (collection, ukey)
);
CREATE INDEX IF NOT EXISTS idx_unique_keys_doc ON unique_keys (collection, doc_id);
";

/// The storage collaborator: per-collection CRUD, filtered finds, and the
/// aggregation pipeline executor.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<SqlitePool>,
}

impl DocumentStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Shared pool, exposed for readiness probes.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema. Idempotent; runs at startup.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Insert a document, registering its unique keys in the same
    /// transaction. A key collision rolls everything back and surfaces as
    /// [`StoreError::Duplicate`].
    pub async fn insert<T: Serialize>(
        &self,
        collection: &str,
        doc: &T,
        unique_keys: &[String],
    ) -> StoreResult<()> {
        let body = serde_json::to_value(doc)?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::MissingId(collection.to_string()))?
            .to_string();
        let created_at = body
            .get("createdAt")
            .and_then(Value::as_str)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp_micros())
            .unwrap_or_else(|| Utc::now().timestamp_micros());

        let mut tx = self.db.begin().await?;
        sqlx::query("INSERT INTO documents (collection, id, body, created_at) VALUES (?, ?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(body.to_string())
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_unique(err, "id"))?;
        for key in unique_keys {
            sqlx::query("INSERT INTO unique_keys (collection, ukey, doc_id) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(key)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(|err| map_unique(err, key))?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: ObjectId,
    ) -> StoreResult<Option<T>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id.to_string())
                .fetch_optional(&*self.db)
                .await?;
        decode_opt(body)
    }

    pub async fn find_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<T>> {
        let mut builder = self.select_filtered(collection, filter);
        builder.push(" LIMIT 1");
        let body: Option<String> = builder
            .build_query_scalar()
            .fetch_optional(&*self.db)
            .await?;
        decode_opt(body)
    }

    /// Filtered find, ordered by creation time (`newest_first` flips the
    /// direction).
    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: &Filter,
        newest_first: bool,
    ) -> StoreResult<Vec<T>> {
        let mut builder = self.select_filtered(collection, filter);
        builder.push(if newest_first {
            " ORDER BY created_at DESC, id DESC"
        } else {
            " ORDER BY created_at ASC, id ASC"
        });
        let bodies: Vec<String> = builder.build_query_scalar().fetch_all(&*self.db).await?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b))
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    pub async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<i64> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        push_filter(&mut builder, filter);
        let total: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(total)
    }

    /// RFC 7386 merge-patch update via SQLite `json_patch`: object fields
    /// merge, `null` removes a field. `updatedAt` is bumped automatically.
    pub async fn update_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: ObjectId,
        patch: &Value,
    ) -> StoreResult<Option<T>> {
        let mut patch = patch.clone();
        if let Some(obj) = patch.as_object_mut() {
            obj.entry("updatedAt")
                .or_insert_with(|| serde_json::to_value(Utc::now()).unwrap_or(Value::Null));
        }
        let body: Option<String> = sqlx::query_scalar(
            "UPDATE documents SET body = json_patch(body, ?) \
             WHERE collection = ? AND id = ? RETURNING body",
        )
        .bind(patch.to_string())
        .bind(collection)
        .bind(id.to_string())
        .fetch_optional(&*self.db)
        .await?;
        decode_opt(body)
    }

    /// Delete a document and free its unique keys.
    pub async fn delete_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: ObjectId,
    ) -> StoreResult<Option<T>> {
        let mut tx = self.db.begin().await?;
        let body: Option<String> = sqlx::query_scalar(
            "DELETE FROM documents WHERE collection = ? AND id = ? RETURNING body",
        )
        .bind(collection)
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM unique_keys WHERE collection = ? AND doc_id = ?")
            .bind(collection)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        decode_opt(body)
    }

    /// Replace a document's registered unique keys. Used when a uniquely
    /// keyed field (email) changes; a collision leaves the old keys intact.
    pub async fn reset_unique_keys(
        &self,
        collection: &str,
        id: ObjectId,
        unique_keys: &[String],
    ) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM unique_keys WHERE collection = ? AND doc_id = ?")
            .bind(collection)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        for key in unique_keys {
            sqlx::query("INSERT INTO unique_keys (collection, ukey, doc_id) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(key)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|err| map_unique(err, key))?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Execute an aggregation pipeline against one collection. Lookup
    /// sources are prefetched so the evaluator stays pure.
    pub async fn run_pipeline(
        &self,
        collection: &str,
        stages: &[Stage],
    ) -> StoreResult<Vec<Value>> {
        let base = self.fetch_collection(collection).await?;
        let mut foreign = HashMap::new();
        for stage in stages {
            if let Stage::Lookup(lookup) = stage {
                if !foreign.contains_key(lookup.from) {
                    foreign.insert(lookup.from.to_string(), self.fetch_collection(lookup.from).await?);
                }
            }
        }
        Ok(pipeline::run(base, stages, &foreign))
    }

    /// Execute a pipeline and paginate its output. `stages` must not
    /// contain skip/limit stages of its own; the total is counted first,
    /// then `(page-1)*limit` documents are skipped and `limit` taken.
    pub async fn run_paginated_pipeline(
        &self,
        collection: &str,
        stages: &[Stage],
        page: i64,
        limit: i64,
    ) -> StoreResult<Page<Value>> {
        let matched = self.run_pipeline(collection, stages).await?;
        let total_docs = matched.len() as i64;
        let total_pages = if limit > 0 {
            (total_docs + limit - 1) / limit
        } else {
            0
        };
        let skip = ((page - 1) * limit).max(0) as usize;
        let docs = pipeline::run(
            matched,
            &[Stage::Skip(skip), Stage::Limit(limit.max(0) as usize)],
            &HashMap::new(),
        );
        Ok(Page {
            docs,
            total_docs,
            limit,
            page,
            total_pages,
            has_prev_page: page > 1,
            has_next_page: page < total_pages,
        })
    }

    fn select_filtered(&self, collection: &str, filter: &Filter) -> QueryBuilder<'static, Sqlite> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_string());
        push_filter(&mut builder, filter);
        builder
    }

    async fn fetch_collection(&self, collection: &str) -> StoreResult<Vec<Value>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(collection)
        .fetch_all(&*self.db)
        .await?;
        bodies
            .iter()
            .map(|b| serde_json::from_str(b))
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }
}

/// Translate filter clauses into SQL conditions over the JSON body.
/// Field names are code-controlled constants, never request input.
fn push_filter(builder: &mut QueryBuilder<'static, Sqlite>, filter: &Filter) {
    for (field, cond) in filter.clauses() {
        match cond {
            Cond::Eq(value) => {
                builder.push(format!(" AND json_extract(body, '$.{field}') = "));
                match value {
                    Value::String(s) => builder.push_bind(s.clone()),
                    Value::Bool(b) => builder.push_bind(*b as i64),
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => builder.push_bind(i),
                        None => builder.push_bind(n.as_f64().unwrap_or(0.0)),
                    },
                    // Non-scalar equality has no SQL form here.
                    _ => builder.push("NULL"),
                };
            }
            Cond::Exists => {
                builder.push(format!(" AND json_extract(body, '$.{field}') IS NOT NULL"));
            }
            Cond::ContainsCi(needle) => {
                builder.push(format!(
                    " AND instr(lower(json_extract(body, '$.{field}')), lower("
                ));
                builder.push_bind(needle.clone());
                builder.push(")) > 0");
            }
        }
    }
}

fn decode_opt<T: DeserializeOwned>(body: Option<String>) -> StoreResult<Option<T>> {
    body.map(|b| serde_json::from_str(&b))
        .transpose()
        .map_err(Into::into)
}

/// Return true if a SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

fn map_unique(err: sqlx::Error, key: &str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate(key.to_string())
    } else {
        StoreError::Sqlx(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectId, Tweet, User};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> DocumentStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = DocumentStore::new(Arc::new(pool));
        store.ensure_schema().await.expect("schema");
        store
    }

    fn tweet(owner: ObjectId, content: &str, offset_secs: i64) -> Tweet {
        let at = Utc::now() - Duration::hours(1) + Duration::seconds(offset_secs);
        Tweet {
            id: ObjectId::new(),
            owner,
            content: content.to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    fn user(username: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: ObjectId::new(),
            fullname: username.to_uppercase(),
            email: email.to_string(),
            username: username.to_string(),
            password: "argon2-hash".to_string(),
            avatar: "http://localhost/media/aa/bb/x.png".to_string(),
            cover_image: None,
            refresh_token: Some("tok".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = memory_store().await;
        let doc = tweet(ObjectId::new(), "hello", 0);
        store.insert(collections::TWEETS, &doc, &[]).await.unwrap();

        let loaded: Tweet = store
            .find_by_id(collections::TWEETS, doc.id)
            .await
            .unwrap()
            .expect("present");
        assert_eq!(loaded.content, "hello");
        assert_eq!(loaded.owner, doc.owner);
    }

    #[tokio::test]
    async fn duplicate_unique_key_is_rejected() {
        let store = memory_store().await;
        let first = user("alice", "alice@example.com");
        store
            .insert(
                collections::USERS,
                &first,
                &User::unique_keys(&first.username, &first.email),
            )
            .await
            .unwrap();

        let second = user("alice", "other@example.com");
        let err = store
            .insert(
                collections::USERS,
                &second,
                &User::unique_keys(&second.username, &second.email),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        // The losing insert must not leave a document behind.
        assert_eq!(
            store.count(collections::USERS, &Filter::new()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn delete_frees_unique_keys() {
        let store = memory_store().await;
        let doc = user("bob", "bob@example.com");
        let keys = User::unique_keys(&doc.username, &doc.email);
        store.insert(collections::USERS, &doc, &keys).await.unwrap();
        let removed: Option<User> = store.delete_by_id(collections::USERS, doc.id).await.unwrap();
        assert!(removed.is_some());

        let again = user("bob", "bob@example.com");
        store
            .insert(collections::USERS, &again, &keys)
            .await
            .expect("keys released after delete");
    }

    #[tokio::test]
    async fn merge_patch_updates_and_removes_fields() {
        let store = memory_store().await;
        let doc = user("carol", "carol@example.com");
        store.insert(collections::USERS, &doc, &[]).await.unwrap();

        let updated: User = store
            .update_by_id(
                collections::USERS,
                doc.id,
                &json!({"fullname": "Carol C", "refreshToken": null}),
            )
            .await
            .unwrap()
            .expect("present");
        assert_eq!(updated.fullname, "Carol C");
        assert_eq!(updated.refresh_token, None);
        assert!(updated.updated_at >= doc.updated_at);
        // Untouched fields survive the merge.
        assert_eq!(updated.email, "carol@example.com");
    }

    #[tokio::test]
    async fn filtered_find_and_count() {
        let store = memory_store().await;
        let owner = ObjectId::new();
        let other = ObjectId::new();
        for i in 0..3 {
            store
                .insert(collections::TWEETS, &tweet(owner, "mine", i), &[])
                .await
                .unwrap();
        }
        store
            .insert(collections::TWEETS, &tweet(other, "theirs", 10), &[])
            .await
            .unwrap();

        let filter = Filter::new().eq("owner", owner);
        assert_eq!(store.count(collections::TWEETS, &filter).await.unwrap(), 3);

        let mine: Vec<Tweet> = store.find(collections::TWEETS, &filter, true).await.unwrap();
        assert_eq!(mine.len(), 3);
        assert!(mine.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let one: Option<Tweet> = store
            .find_one(collections::TWEETS, &Filter::new().eq("content", "theirs"))
            .await
            .unwrap();
        assert_eq!(one.unwrap().owner, other);
    }

    #[tokio::test]
    async fn paginated_pipeline_obeys_the_page_formula() {
        let store = memory_store().await;
        let owner = ObjectId::new();
        let n: i64 = 25;
        for i in 0..n {
            store
                .insert(collections::TWEETS, &tweet(owner, &format!("t{i}"), i), &[])
                .await
                .unwrap();
        }
        let stages = [Stage::Sort(crate::services::pipeline::SortSpec {
            field: "createdAt".into(),
            descending: true,
        })];

        for (page, limit) in [(1, 10), (2, 10), (3, 10), (4, 10), (1, 25), (2, 25), (1, 7), (4, 7)]
        {
            let result = store
                .run_paginated_pipeline(collections::TWEETS, &stages, page, limit)
                .await
                .unwrap();
            let expected = (n - limit * (page - 1)).max(0).min(limit);
            assert_eq!(result.docs.len() as i64, expected, "page={page} limit={limit}");
            assert_eq!(result.total_docs, n);
            assert_eq!(result.total_pages, (n + limit - 1) / limit);
        }

        // Newest first: the last inserted tweet leads page one.
        let first = store
            .run_paginated_pipeline(collections::TWEETS, &stages, 1, 10)
            .await
            .unwrap();
        assert_eq!(first.docs[0]["content"], "t24");
        assert!(first.has_next_page);
        assert!(!first.has_prev_page);
    }
}
