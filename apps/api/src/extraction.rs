//! Text extraction from uploaded resumes.
//!
//! PDFs are spooled to a transient file in the upload directory and parsed with
//! `pdf-extract` on the blocking pool. The transient file is removed once parsing
//! finishes, whatever the outcome.

use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

/// An uploaded resume, held in memory until extraction.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl UploadedDocument {
    /// Classifies by declared content type, then by file extension.
    pub fn kind(&self) -> Option<DocumentKind> {
        let name = self.file_name.to_lowercase();
        match self.content_type.as_deref() {
            Some("application/pdf") => Some(DocumentKind::Pdf),
            Some("text/plain") => Some(DocumentKind::PlainText),
            _ if name.ends_with(".pdf") => Some(DocumentKind::Pdf),
            _ if name.ends_with(".txt") => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type for '{0}'. Upload a PDF or plain-text resume.")]
    UnsupportedType(String),

    #[error("The uploaded file is empty")]
    EmptyFile,

    #[error("Could not read the document: {0}")]
    Unreadable(String),

    #[error(
        "No text could be extracted. The PDF may be scanned, image-only, or password-protected."
    )]
    NoText,

    #[error("Upload spool error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text extraction capability. Swappable for tests.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: UploadedDocument) -> Result<String, ExtractionError>;
}

/// Production extractor: PDF via `pdf-extract`, plain text via UTF-8 decode.
pub struct DocumentTextExtractor {
    upload_dir: PathBuf,
}

impl DocumentTextExtractor {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract(&self, document: UploadedDocument) -> Result<String, ExtractionError> {
        if document.bytes.is_empty() {
            return Err(ExtractionError::EmptyFile);
        }

        let text = match document.kind() {
            Some(DocumentKind::PlainText) => String::from_utf8(document.bytes.to_vec())
                .map_err(|e| ExtractionError::Unreadable(e.to_string()))?,
            Some(DocumentKind::Pdf) => {
                let upload_dir = self.upload_dir.clone();
                tokio::task::spawn_blocking(move || extract_pdf(&upload_dir, &document.bytes))
                    .await
                    .map_err(|e| ExtractionError::Unreadable(format!("extraction task failed: {e}")))??
            }
            None => return Err(ExtractionError::UnsupportedType(document.file_name)),
        };

        let text = normalize_whitespace(&text);
        if text.is_empty() {
            return Err(ExtractionError::NoText);
        }
        debug!("Extracted {} characters of resume text", text.chars().count());
        Ok(text)
    }
}

/// Spools `bytes` to a transient file and extracts its text.
///
/// The spool lives in the configured upload directory so uploads never sit in an
/// unmanaged location, and it is removed before returning.
fn extract_pdf(upload_dir: &std::path::Path, bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut spool = tempfile::Builder::new()
        .prefix("resume-")
        .suffix(".pdf")
        .tempfile_in(upload_dir)?;
    spool.write_all(bytes)?;
    spool.flush()?;

    let result = pdf_extract::extract_text(spool.path())
        .map_err(|e| ExtractionError::Unreadable(e.to_string()));

    let path = spool.path().to_path_buf();
    if let Err(e) = spool.close() {
        warn!("Failed to remove upload spool {}: {e}", path.display());
    }
    result
}

/// Collapses runs of blank lines and trailing spaces left by PDF text layout.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
