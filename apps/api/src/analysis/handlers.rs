//! Axum route handlers for the Analysis API.

use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::contract::AnalysisResult;
use crate::auth::MaybeIdentity;
use crate::db::{recent_for_owner, save_analysis, StoreError};
use crate::errors::AppError;
use crate::extraction::UploadedDocument;
use crate::models::analysis::{AnalysisRecord, NewAnalysisRecord};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// How the caller wants the result stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Skip,
    /// Failure is reported as a warning alongside the result.
    BestEffort,
    /// Failure fails the request.
    Required,
}

impl SaveMode {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "no" => Ok(SaveMode::Skip),
            "true" | "yes" => Ok(SaveMode::BestEffort),
            "required" => Ok(SaveMode::Required),
            other => Err(AppError::Validation(format!(
                "save must be one of true, false, required (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug)]
struct AnalyzeForm {
    resume: UploadedDocument,
    job_description: String,
    save: SaveMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub analyses: Vec<AnalysisRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/analyze
///
/// Multipart fields: `resume` (file), `jobDescription` (text), `save` (optional).
/// Extracts resume text, runs the analysis, and optionally stores the result for
/// the authenticated caller.
pub async fn handle_analyze(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let form = read_analyze_form(multipart).await?;

    if form.save == SaveMode::Required {
        if identity.is_none() {
            return Err(AppError::Unauthorized);
        }
        if state.store.is_none() {
            return Err(AppError::Persistence(StoreError::Backend(
                "persistence is not configured".to_string(),
            )));
        }
    }

    let resume_file_name = form.resume.file_name.clone();
    let resume_text = state.extractor.extract(form.resume).await?;
    info!(
        "Analyzing resume '{}' ({} chars) against a {}-char job description",
        resume_file_name,
        resume_text.chars().count(),
        form.job_description.chars().count()
    );

    let outcome = state
        .analyzer
        .analyze(&resume_text, &form.job_description)
        .await?;

    let mut response = AnalyzeResponse {
        result: outcome.result,
        model: outcome.model,
        analysis_id: None,
        persistence_warning: None,
    };

    if form.save != SaveMode::Skip {
        let saved = persist(
            &state,
            NewAnalysisRecord {
                owner_subject: identity
                    .as_ref()
                    .map(|i| i.subject.clone())
                    .unwrap_or_default(),
                owner_email: identity.as_ref().and_then(|i| i.email.clone()),
                resume_file_name,
                job_description: form.job_description,
                result: response.result.clone(),
                model: response.model.clone(),
            },
        )
        .await;

        match saved {
            Ok(id) => response.analysis_id = Some(id),
            Err(e) if form.save == SaveMode::Required => return Err(AppError::Persistence(e)),
            Err(e) => {
                warn!("Analysis not saved: {e}");
                response.persistence_warning = Some(e.to_string());
            }
        }
    }

    Ok(Json(response))
}

/// GET /api/v1/analyses?limit=N
///
/// Returns the caller's saved analyses, newest first.
pub async fn handle_history(
    State(state): State<AppState>,
    MaybeIdentity(identity): MaybeIdentity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let identity = identity.ok_or(AppError::Unauthorized)?;
    let store = state.store.as_deref().ok_or_else(|| {
        AppError::Persistence(StoreError::Backend(
            "persistence is not configured".to_string(),
        ))
    })?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let analyses = recent_for_owner(store, &identity.subject, limit).await?;

    Ok(Json(HistoryResponse { analyses }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Anonymous callers reach `save_analysis` with an empty owner and are refused there.
async fn persist(state: &AppState, record: NewAnalysisRecord) -> Result<Uuid, StoreError> {
    let store = state
        .store
        .as_deref()
        .ok_or_else(|| StoreError::Backend("persistence is not configured".to_string()))?;
    save_analysis(store, &record).await
}

async fn read_analyze_form(mut multipart: Multipart) -> Result<AnalyzeForm, AppError> {
    let mut resume = None;
    let mut job_description = None;
    let mut save = SaveMode::Skip;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                let file_name = field.file_name().unwrap_or("resume").to_string();
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid resume upload: {e}")))?;
                resume = Some(UploadedDocument {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            "jobDescription" => {
                job_description = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Invalid jobDescription field: {e}"))
                })?);
            }
            "save" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid save field: {e}")))?;
                save = SaveMode::parse(&value)?;
            }
            _ => {}
        }
    }

    let job_description = job_description
        .map(|jd| jd.trim().to_string())
        .filter(|jd| !jd.is_empty())
        .ok_or_else(|| AppError::Validation("jobDescription cannot be empty".to_string()))?;
    let resume = resume
        .ok_or_else(|| AppError::Validation("resume file is required".to_string()))?;

    Ok(AnalyzeForm {
        resume,
        job_description,
        save,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
