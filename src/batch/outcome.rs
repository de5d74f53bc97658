//! Per-item input and outcome types

use serde::{Deserialize, Serialize};

/// Maximum number of characters kept in a result preview
pub const PREVIEW_CHAR_LIMIT: usize = 100;

/// Appended to a preview when the recognized text was cut
pub const PREVIEW_TRUNCATION_MARKER: &str = "...";

/// One uploaded file as handed to the orchestrator
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Position of the file in the original upload
    pub index: usize,
    /// Filename as supplied by the client
    pub filename: String,
    /// Raw, undecoded file contents
    pub bytes: Vec<u8>,
}

impl BatchInput {
    pub fn new(index: usize, filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Why a single item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    /// Bytes could not be recognized or decoded as an image
    DecodeError,
    /// The recognition engine reported an error (or its worker died)
    EngineError,
    /// The per-item or batch deadline elapsed
    Timeout,
    /// The batch was cancelled before the item finished
    Cancelled,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::DecodeError => "decode-error",
            FailureCategory::EngineError => "engine-error",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of processing one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognitionOutcome {
    Success {
        recognized_text: String,
        line_count: usize,
        preview_text: String,
        /// Name of the persisted result file, when persistence succeeded
        output_file: Option<String>,
    },
    Failure {
        category: FailureCategory,
        message: String,
    },
}

impl RecognitionOutcome {
    /// Build a success outcome; the preview is derived from the text
    pub fn success(recognized_text: String, line_count: usize) -> Self {
        let preview_text = make_preview(&recognized_text);
        RecognitionOutcome::Success {
            recognized_text,
            line_count,
            preview_text,
            output_file: None,
        }
    }

    pub fn failure(category: FailureCategory, message: impl Into<String>) -> Self {
        RecognitionOutcome::Failure {
            category,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecognitionOutcome::Success { .. })
    }

    /// Failure category, `None` for successes
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            RecognitionOutcome::Success { .. } => None,
            RecognitionOutcome::Failure { category, .. } => Some(*category),
        }
    }

    /// Number of recognized lines, zero for failures
    pub fn line_count(&self) -> usize {
        match self {
            RecognitionOutcome::Success { line_count, .. } => *line_count,
            RecognitionOutcome::Failure { .. } => 0,
        }
    }

    /// Label used for metrics: `success` or the failure category
    pub fn label(&self) -> &'static str {
        match self {
            RecognitionOutcome::Success { .. } => "success",
            RecognitionOutcome::Failure { category, .. } => category.as_str(),
        }
    }
}

/// Build the short preview shown for a recognized text
///
/// Keeps the first [`PREVIEW_CHAR_LIMIT`] characters and appends
/// [`PREVIEW_TRUNCATION_MARKER`] only when something was cut. Counting is by
/// `char`, so multi-byte text is never split inside a character.
///
/// # Examples
///
/// ```rust
/// use ocr_batch::batch::make_preview;
///
/// assert_eq!(make_preview("short text"), "short text");
///
/// let long = "a".repeat(150);
/// let preview = make_preview(&long);
/// assert_eq!(preview.len(), 103);
/// assert!(preview.ends_with("..."));
/// ```
pub fn make_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHAR_LIMIT) {
        Some((cut, _)) => format!("{}{}", &text[..cut], PREVIEW_TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
