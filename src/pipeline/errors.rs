//! Structured error records for experiment validation and stage failures.
//!
//! Two record types cover the run lifecycle:
//!
//! - [`ValidationError`]: precondition problems found before any module runs
//!   (empty test set, missing event drivers, distance pairing mismatch).
//! - [`StageError`]: a single module failing while a stage executes. These
//!   are usually recoverable and end up in the run's warning message.
//!
//! Both carry a stable [`ErrorCode`], a location, a human-readable message,
//! and (for validation) an optional hint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error_code::ErrorCode;

// ─── Validation (pre-run) errors ────────────────────────────────────────────

/// A precondition violation found before the experiment touches any module.
///
/// # Display format
///
/// ```text
/// [empty_test_set] /documents/unknown: No documents in the test set
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {path}: {message}")]
pub struct ValidationError {
    /// Stable error code for programmatic matching.
    pub code: ErrorCode,

    /// Pointer into the experiment request identifying the problem,
    /// e.g. `"/modules/analysis_methods/0"`.
    pub path: String,

    /// Human-readable description; this is the text reported to the caller.
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a hint suggesting how to fix the problem.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ─── Stage (execution-time) errors ──────────────────────────────────────────

/// A failure raised by one module while a stage was running.
///
/// # Display format
///
/// ```text
/// [module_failed] EventDrivers/CharacterNGrams: text shorter than n=3
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {stage}/{module}: {message}")]
pub struct StageError {
    pub code: ErrorCode,

    /// Stage label, e.g. `"Canonicizers"` or `"AnalysisMethods"`.
    pub stage: String,

    /// Display name of the failing module.
    pub module: String,

    pub message: String,
}

impl StageError {
    pub fn new(
        code: ErrorCode,
        stage: impl Into<String>,
        module: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            stage: stage.into(),
            module: module.into(),
            message: message.into(),
        }
    }

    /// A recoverable per-module failure.
    pub fn module_failed(
        stage: impl Into<String>,
        module: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCode::ModuleFailed, stage, module, message)
    }
}
