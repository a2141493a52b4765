//! Model Resolver — pins the upstream model identifier used for inference.
//!
//! Resolution order: configured override → live model listing → static fallback list.
//! The choice itself is the pure function [`choose_model`]; [`ModelResolver`] adds the
//! process-lifetime cache and the single network probe.

use std::collections::HashSet;
use std::sync::RwLock;

use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::{InferenceProvider, ModelInfo, GENERATE_METHOD};

/// Marker of the fast/cheap model family, preferred first.
const FAST_MARKER: &str = "flash";
/// Marker of the general-purpose model family, preferred second.
const GENERAL_MARKER: &str = "pro";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "No usable model found (fallbacks: [{}], skipped after failing in this request: [{}])",
    fallbacks.join(", "),
    skipped.join(", ")
)]
pub struct ModelResolutionError {
    /// The configured fallback list, as considered.
    pub fallbacks: Vec<String>,
    /// Identifiers excluded because they already failed during the current request.
    pub skipped: Vec<String>,
}

/// Where a resolved model identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Override,
    Listing,
    Fallback,
}

/// Process-wide cached model choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelection {
    pub model_name: Option<String>,
}

/// Picks a model identifier without any I/O.
///
/// `listing` is `None` when the listing query failed. Excluded identifiers are never
/// chosen from the listing or fallback list; an override is adopted unconditionally.
pub fn choose_model(
    override_model: Option<&str>,
    listing: Option<&[ModelInfo]>,
    fallbacks: &[String],
    excluded: &HashSet<String>,
) -> Result<(String, ModelSource), ModelResolutionError> {
    if let Some(model) = override_model.map(str::trim).filter(|m| !m.is_empty()) {
        return Ok((model.to_string(), ModelSource::Override));
    }

    let eligible: Vec<&str> = listing
        .unwrap_or_default()
        .iter()
        .filter(|m| m.supports(GENERATE_METHOD) && is_well_formed(&m.id))
        .map(|m| m.id.as_str())
        .filter(|id| !excluded.contains(*id))
        .collect();

    let preferred = eligible
        .iter()
        .find(|id| id.contains(FAST_MARKER))
        .or_else(|| eligible.iter().find(|id| id.contains(GENERAL_MARKER)))
        .or_else(|| eligible.first());
    if let Some(model) = preferred {
        return Ok((model.to_string(), ModelSource::Listing));
    }

    fallbacks
        .iter()
        .map(|m| m.trim())
        .find(|m| is_well_formed(m) && !excluded.contains(*m))
        .map(|m| (m.to_string(), ModelSource::Fallback))
        .ok_or_else(|| {
            let mut skipped: Vec<String> = excluded.iter().cloned().collect();
            skipped.sort();
            ModelResolutionError {
                fallbacks: fallbacks.to_vec(),
                skipped,
            }
        })
}

fn is_well_formed(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(char::is_whitespace)
}

/// Owns the cached [`ModelSelection`]. One instance per process (or per test).
pub struct ModelResolver {
    override_model: Option<String>,
    fallbacks: Vec<String>,
    selection: RwLock<ModelSelection>,
}

impl ModelResolver {
    pub fn new(override_model: Option<String>, fallbacks: Vec<String>) -> Self {
        Self {
            override_model,
            fallbacks,
            selection: RwLock::new(ModelSelection::default()),
        }
    }

    /// Returns the cached model, resolving it first if necessary.
    ///
    /// `excluded` holds identifiers that already failed for the caller; they are
    /// skipped for this resolution only and never remembered.
    ///
    /// Concurrent callers racing on an empty cache may each list models; the last
    /// write wins and every candidate is equally valid.
    pub async fn resolve(
        &self,
        provider: &dyn InferenceProvider,
        excluded: &[String],
    ) -> Result<String, ModelResolutionError> {
        if let Some(model) = self.current() {
            if !excluded.contains(&model) {
                return Ok(model);
            }
        }
        let excluded: HashSet<String> = excluded.iter().cloned().collect();

        let listing = if self.override_model.is_some() {
            None
        } else {
            match provider.list_models().await {
                Ok(models) => Some(models),
                Err(e) => {
                    warn!("Model listing failed, using fallback list: {e}");
                    None
                }
            }
        };

        let (model, source) = choose_model(
            self.override_model.as_deref(),
            listing.as_deref(),
            &self.fallbacks,
            &excluded,
        )?;
        info!("Resolved model {} ({:?})", model, source);

        self.write().model_name = Some(model.clone());
        Ok(model)
    }

    /// Clears the cached model so the next `resolve` probes again.
    ///
    /// A no-op when another request already replaced `failed_model`.
    pub fn invalidate(&self, failed_model: &str) {
        let mut selection = self.write();
        if selection.model_name.as_deref() == Some(failed_model) {
            selection.model_name = None;
        }
    }

    pub fn current(&self) -> Option<String> {
        self.read().model_name.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ModelSelection> {
        // A poisoned lock still holds a consistent selection.
        self.selection.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ModelSelection> {
        self.selection.write().unwrap_or_else(|e| e.into_inner())
    }
}
