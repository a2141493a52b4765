use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::analysis::contract::AnalysisResult;

/// A stored analysis, owned by one verified subject.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub owner_subject: String,
    pub owner_email: Option<String>,
    pub resume_file_name: String,
    pub job_description: String,
    pub result: Json<AnalysisResult>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. `id` and `created_at` are assigned on write.
#[derive(Debug, Clone)]
pub struct NewAnalysisRecord {
    pub owner_subject: String,
    pub owner_email: Option<String>,
    pub resume_file_name: String,
    pub job_description: String,
    pub result: AnalysisResult,
    pub model: String,
}
