//! Analysis pipeline: truncate → resolve model → generate → enforce contract.
//!
//! A "model not found" failure from the provider invalidates the cached model and
//! triggers exactly one more full cycle. Everything else surfaces immediately.

use std::sync::Arc;

use tracing::{info, warn};

use crate::analysis::contract::{extract_and_validate, AnalysisResult};
use crate::analysis::resolver::ModelResolver;
use crate::errors::AppError;
use crate::llm_client::prompts::build_analysis_prompt;
use crate::llm_client::{GenerationParams, InferenceProvider};

/// Inputs longer than this many characters are truncated before prompting.
pub const MAX_INPUT_CHARS: usize = 15_000;
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";
/// Total inference cycles, including the single retry.
const MAX_ATTEMPTS: usize = 2;

/// A validated analysis and the model that produced it.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub model: String,
}

pub struct Analyzer {
    provider: Arc<dyn InferenceProvider>,
    resolver: ModelResolver,
    params: GenerationParams,
}

impl Analyzer {
    pub fn new(provider: Arc<dyn InferenceProvider>, resolver: ModelResolver) -> Self {
        Self {
            provider,
            resolver,
            params: GenerationParams::default(),
        }
    }

    /// The model currently pinned by the resolver, if one has been resolved.
    pub fn current_model(&self) -> Option<String> {
        self.resolver.current()
    }

    pub async fn analyze(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<AnalysisOutcome, AppError> {
        // Built once so a retry sends exactly the same prompt.
        let prompt = build_analysis_prompt(
            &truncate_input(resume_text),
            &truncate_input(job_description),
        );

        let mut attempted: Vec<String> = Vec::with_capacity(MAX_ATTEMPTS);
        loop {
            // Models that already failed here are skipped; the error names them.
            let model = self
                .resolver
                .resolve(self.provider.as_ref(), &attempted)
                .await?;
            attempted.push(model.clone());

            match self.provider.generate(&model, &prompt, &self.params).await {
                Ok(raw) => {
                    let result = extract_and_validate(&raw)?;
                    info!(
                        "Analysis complete: model={}, match_score={}",
                        model, result.match_score
                    );
                    return Ok(AnalysisOutcome { result, model });
                }
                Err(e) if e.is_model_not_found() && attempted.len() < MAX_ATTEMPTS => {
                    warn!("Model {} not found upstream; re-resolving and retrying once", model);
                    self.resolver.invalidate(&model);
                }
                Err(e) => {
                    return Err(AppError::Llm(format!(
                        "Analysis failed: {e} (models tried: {})",
                        attempted.join(", ")
                    )));
                }
            }
        }
    }
}

/// Truncates to `MAX_INPUT_CHARS` characters, appending a visible marker.
pub fn truncate_input(text: &str) -> String {
    match text.char_indices().nth(MAX_INPUT_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::analysis::contract::ContractError;
    use crate::analysis::resolver::tests::model;
    use crate::llm_client::{LlmError, ModelInfo, ProviderErrorKind, GENERATE_METHOD};

    pub(crate) fn valid_response() -> String {
        json!({
            "matchScore": 64.4,
            "missingSkills": ["Terraform"],
            "scoreExplanation": ["Good backend depth.", "Little infrastructure work."],
            "resumeImprovements": ["One", "Two", "Three"],
            "coverLetter": "Dear Hiring Manager,",
            "interviewQuestions": ["1", "2", "3", "4", "5"]
        })
        .to_string()
    }

    fn api_error(kind: ProviderErrorKind, status: u16) -> LlmError {
        LlmError::Api {
            kind,
            status,
            message: "upstream said no".to_string(),
        }
    }

    /// Provider that replays scripted `generate` outcomes and records each call.
    pub(crate) struct ScriptedProvider {
        listing: Vec<ModelInfo>,
        outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(
            listing: Vec<ModelInfo>,
            outcomes: Vec<Result<String, LlmError>>,
        ) -> Self {
            Self {
                listing,
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
            Ok(self.listing.clone())
        }

        async fn generate(
            &self,
            model: &str,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyContent))
        }
    }

    fn two_model_listing() -> Vec<ModelInfo> {
        vec![
            model("gemini-1.5-flash", &[GENERATE_METHOD]),
            model("gemini-1.5-pro", &[GENERATE_METHOD]),
        ]
    }

    fn analyzer(provider: &Arc<ScriptedProvider>) -> Analyzer {
        Analyzer::new(
            provider.clone(),
            ModelResolver::new(None, vec!["gemini-1.0-pro".to_string()]),
        )
    }

    #[test]
    fn test_truncate_short_input_unchanged() {
        assert_eq!(truncate_input("short"), "short");
        let exact = "a".repeat(MAX_INPUT_CHARS);
        assert_eq!(truncate_input(&exact), exact);
    }

    #[test]
    fn test_truncate_long_input_appends_marker() {
        let long = "é".repeat(MAX_INPUT_CHARS + 10);
        let truncated = truncate_input(&long);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            truncated.chars().count(),
            MAX_INPUT_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[tokio::test]
    async fn test_success_returns_rounded_result_and_model() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![Ok(valid_response())],
        ));
        let outcome = analyzer(&provider).analyze("resume", "jd").await.unwrap();

        assert_eq!(outcome.model, "gemini-1.5-flash");
        assert_eq!(outcome.result.match_score, 64);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_triggers_exactly_one_retry_with_new_model() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![
                Err(api_error(ProviderErrorKind::NotFound, 404)),
                Ok(valid_response()),
            ],
        ));
        let outcome = analyzer(&provider).analyze("resume", "jd").await.unwrap();

        assert_eq!(outcome.model, "gemini-1.5-pro");
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "gemini-1.5-flash");
        assert_eq!(calls[1].0, "gemini-1.5-pro");
        assert_eq!(calls[0].1, calls[1].1, "retry must send the identical prompt");
    }

    #[tokio::test]
    async fn test_second_not_found_surfaces_without_third_attempt() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![
                Err(api_error(ProviderErrorKind::NotFound, 404)),
                Err(api_error(ProviderErrorKind::NotFound, 404)),
                Ok(valid_response()),
            ],
        ));
        let err = analyzer(&provider).analyze("resume", "jd").await.unwrap_err();

        assert_eq!(provider.call_count(), 2);
        match err {
            AppError::Llm(msg) => {
                assert!(msg.contains("gemini-1.5-flash, gemini-1.5-pro"), "{msg}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_resolution_failure_names_failed_model() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![model("gemini-1.5-flash", &[GENERATE_METHOD])],
            vec![Err(api_error(ProviderErrorKind::NotFound, 404))],
        ));
        let analyzer = Analyzer::new(
            provider.clone(),
            ModelResolver::new(None, vec!["gemini-1.5-flash".to_string()]),
        );

        let err = analyzer.analyze("resume", "jd").await.unwrap_err();
        match err {
            AppError::ModelResolution(e) => {
                assert_eq!(e.skipped, vec!["gemini-1.5-flash".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_model_is_used_again_by_next_analysis() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![model("gemini-1.5-flash", &[GENERATE_METHOD])],
            vec![
                Err(api_error(ProviderErrorKind::NotFound, 404)),
                Ok(valid_response()),
            ],
        ));
        let analyzer = Analyzer::new(
            provider.clone(),
            ModelResolver::new(None, vec!["gemini-1.5-flash".to_string()]),
        );

        assert!(analyzer.analyze("resume", "jd").await.is_err());
        let outcome = analyzer.analyze("resume", "jd").await.unwrap();

        assert_eq!(outcome.model, "gemini-1.5-flash");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_other_provider_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![
                Err(api_error(ProviderErrorKind::RateLimited, 429)),
                Ok(valid_response()),
            ],
        ));
        let err = analyzer(&provider).analyze("resume", "jd").await.unwrap_err();

        assert!(matches!(err, AppError::Llm(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_contract_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![Ok("no json here".to_string()), Ok(valid_response())],
        ));
        let err = analyzer(&provider).analyze("resume", "jd").await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Contract(ContractError::MalformedResponse { .. })
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_cached_across_analyses() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![Ok(valid_response()), Ok(valid_response())],
        ));
        let analyzer = analyzer(&provider);
        analyzer.analyze("resume", "jd").await.unwrap();
        analyzer.analyze("resume", "jd").await.unwrap();

        let calls = provider.calls.lock().unwrap();
        assert!(calls.iter().all(|(m, _)| m == "gemini-1.5-flash"));
    }

    #[tokio::test]
    async fn test_long_inputs_truncated_in_prompt() {
        let provider = Arc::new(ScriptedProvider::new(
            two_model_listing(),
            vec![Ok(valid_response())],
        ));
        let resume = "x".repeat(MAX_INPUT_CHARS + 500);
        analyzer(&provider).analyze(&resume, "jd").await.unwrap();

        let calls = provider.calls.lock().unwrap();
        assert!(calls[0].1.contains(TRUNCATION_MARKER));
        assert!(!calls[0].1.contains(&resume));
    }
}
