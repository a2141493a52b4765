//! Analysis persistence.
//!
//! Writes are best effort from the caller's point of view: `save_analysis` returns a
//! typed error and the handler decides whether it matters.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::analysis::{AnalysisRecord, NewAnalysisRecord};

/// SQLSTATE `feature_not_supported`.
const SQLSTATE_FEATURE_NOT_SUPPORTED: &str = "0A000";

/// Creates and returns a PostgreSQL connection pool, applying pending migrations.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Refusing to write a record without an owner")]
    MissingOwner,

    /// The store cannot return records in the requested order.
    #[error("Ordered query unavailable: {0}")]
    SortUnavailable(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.code().as_deref() == Some(SQLSTATE_FEATURE_NOT_SUPPORTED) =>
            {
                StoreError::SortUnavailable(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    NewestFirst,
    Unordered,
}

/// Document store for analyses. Swappable for tests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, record: &NewAnalysisRecord) -> Result<Uuid, StoreError>;

    /// `limit: None` returns every record for the owner.
    async fn query_by_owner(
        &self,
        owner_subject: &str,
        limit: Option<i64>,
        order: QueryOrder,
    ) -> Result<Vec<AnalysisRecord>, StoreError>;
}

/// Stores `record` for its owner. An empty owner is refused without touching the store.
pub async fn save_analysis(
    store: &dyn DocumentStore,
    record: &NewAnalysisRecord,
) -> Result<Uuid, StoreError> {
    if record.owner_subject.trim().is_empty() {
        return Err(StoreError::MissingOwner);
    }
    let id = store.insert(record).await?;
    info!("Saved analysis {} for {}", id, record.owner_subject);
    Ok(id)
}

/// Returns the owner's most recent analyses, newest first.
///
/// Stores that cannot sort are read unordered and sorted in memory.
pub async fn recent_for_owner(
    store: &dyn DocumentStore,
    owner_subject: &str,
    limit: i64,
) -> Result<Vec<AnalysisRecord>, StoreError> {
    match store
        .query_by_owner(owner_subject, Some(limit), QueryOrder::NewestFirst)
        .await
    {
        Err(StoreError::SortUnavailable(reason)) => {
            warn!("Ordered history query unavailable ({reason}); sorting in memory");
            let mut records = store
                .query_by_owner(owner_subject, None, QueryOrder::Unordered)
                .await?;
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(usize::try_from(limit).unwrap_or(0));
            Ok(records)
        }
        other => other,
    }
}

/// PostgreSQL-backed store.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, record: &NewAnalysisRecord) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO analyses
                (id, owner_subject, owner_email, resume_file_name, job_description, result, model)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&record.owner_subject)
        .bind(&record.owner_email)
        .bind(&record.resume_file_name)
        .bind(&record.job_description)
        .bind(Json(&record.result))
        .bind(&record.model)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn query_by_owner(
        &self,
        owner_subject: &str,
        limit: Option<i64>,
        order: QueryOrder,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let sql = match order {
            QueryOrder::NewestFirst => {
                "SELECT * FROM analyses WHERE owner_subject = $1 ORDER BY created_at DESC LIMIT $2"
            }
            QueryOrder::Unordered => "SELECT * FROM analyses WHERE owner_subject = $1 LIMIT $2",
        };
        // LIMIT NULL is LIMIT ALL in PostgreSQL.
        let records = sqlx::query_as::<_, AnalysisRecord>(sql)
            .bind(owner_subject)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{Duration, TimeZone, Utc};

    use crate::analysis::contract::AnalysisResult;

    /// In-memory store. `sortable: false` mimics a backend without an ordering index.
    pub(crate) struct MemoryStore {
        pub records: Mutex<Vec<AnalysisRecord>>,
        pub inserts: AtomicUsize,
        pub sortable: bool,
        /// Every insert fails with a backend error when set.
        pub fail_inserts: bool,
    }

    impl MemoryStore {
        pub(crate) fn new(sortable: bool) -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                inserts: AtomicUsize::new(0),
                sortable,
                fail_inserts: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail_inserts: true,
                ..Self::new(true)
            }
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn insert(&self, record: &NewAnalysisRecord) -> Result<Uuid, StoreError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_inserts {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            let id = Uuid::new_v4();
            self.records.lock().unwrap().push(AnalysisRecord {
                id,
                owner_subject: record.owner_subject.clone(),
                owner_email: record.owner_email.clone(),
                resume_file_name: record.resume_file_name.clone(),
                job_description: record.job_description.clone(),
                result: Json(record.result.clone()),
                model: record.model.clone(),
                created_at: Utc::now(),
            });
            Ok(id)
        }

        async fn query_by_owner(
            &self,
            owner_subject: &str,
            limit: Option<i64>,
            order: QueryOrder,
        ) -> Result<Vec<AnalysisRecord>, StoreError> {
            if order == QueryOrder::NewestFirst && !self.sortable {
                return Err(StoreError::SortUnavailable("no index".to_string()));
            }
            let mut records: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.owner_subject == owner_subject)
                .cloned()
                .collect();
            if order == QueryOrder::NewestFirst {
                records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
            if let Some(limit) = limit {
                records.truncate(limit as usize);
            }
            Ok(records)
        }
    }

    pub(crate) fn sample_result() -> AnalysisResult {
        AnalysisResult {
            match_score: 80,
            missing_skills: vec!["Go".to_string()],
            score_explanation: vec!["a".to_string(), "b".to_string()],
            resume_improvements: vec!["1".to_string(), "2".to_string(), "3".to_string()],
            cover_letter: "Dear team".to_string(),
            interview_questions: (1..=5).map(|i| format!("Q{i}")).collect(),
        }
    }

    fn new_record(owner: &str) -> NewAnalysisRecord {
        NewAnalysisRecord {
            owner_subject: owner.to_string(),
            owner_email: None,
            resume_file_name: "cv.pdf".to_string(),
            job_description: "Rust role".to_string(),
            result: sample_result(),
            model: "gemini-1.5-flash".to_string(),
        }
    }

    fn stored(owner: &str, age_minutes: i64) -> AnalysisRecord {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        AnalysisRecord {
            id: Uuid::new_v4(),
            owner_subject: owner.to_string(),
            owner_email: None,
            resume_file_name: format!("cv-{age_minutes}.pdf"),
            job_description: "Rust role".to_string(),
            result: Json(sample_result()),
            model: "gemini-1.5-flash".to_string(),
            created_at: base - Duration::minutes(age_minutes),
        }
    }

    #[tokio::test]
    async fn test_empty_owner_refused_without_store_call() {
        let store = MemoryStore::new(true);
        for owner in ["", "   "] {
            let err = save_analysis(&store, &new_record(owner)).await.unwrap_err();
            assert!(matches!(err, StoreError::MissingOwner));
        }
        assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let store = MemoryStore::failing();
        let err = save_analysis(&store, &new_record("user-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_returns_store_id() {
        let store = MemoryStore::new(true);
        let id = save_analysis(&store, &new_record("user-1")).await.unwrap();
        assert_eq!(store.records.lock().unwrap()[0].id, id);
    }

    #[tokio::test]
    async fn test_history_falls_back_to_in_memory_sort() {
        let store = MemoryStore::new(false);
        {
            let mut records = store.records.lock().unwrap();
            records.push(stored("user-1", 30));
            records.push(stored("user-1", 5));
            records.push(stored("user-2", 1));
            records.push(stored("user-1", 60));
        }

        let history = recent_for_owner(&store, "user-1", 2).await.unwrap();
        let names: Vec<_> = history.iter().map(|r| r.resume_file_name.as_str()).collect();
        assert_eq!(names, vec!["cv-5.pdf", "cv-30.pdf"]);
    }

    #[tokio::test]
    async fn test_history_uses_ordered_query_when_available() {
        let store = MemoryStore::new(true);
        {
            let mut records = store.records.lock().unwrap();
            records.push(stored("user-1", 10));
            records.push(stored("user-1", 1));
        }

        let history = recent_for_owner(&store, "user-1", 10).await.unwrap();
        assert_eq!(history[0].resume_file_name, "cv-1.pdf");
        assert_eq!(history.len(), 2);
    }
}
