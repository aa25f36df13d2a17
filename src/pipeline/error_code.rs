//! Stable error codes shared by validation findings and stage failures.
//!
//! Codes serialize as `snake_case` strings so callers (GUI, CLI, scripts)
//! can match on them without parsing human-readable messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable classification of a pipeline problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A document file could not be read.
    DocumentRead,
    /// No unknown (test) documents were supplied.
    EmptyTestSet,
    /// No known (training) documents were supplied.
    EmptyTrainSet,
    /// A known document has no text.
    EmptyKnownText,
    /// A required module kind has no configured instance.
    MissingStage,
    /// An analysis method and its distance slot disagree.
    DistanceMismatch,
    /// A module name is not present in the registry.
    UnknownModule,
    /// A parameter name or value was rejected.
    InvalidParameter,
    /// Two modules of one kind share a display name.
    DuplicateModule,
    /// A module raised an error while processing.
    ModuleFailed,
    /// Every configured event driver failed.
    AllEventDriversFailed,
    /// A document ended a stage with no events.
    EmptyEventSet,
    /// No embedding produced a usable analysis result.
    NoSuccessfulAnalysis,
    /// Failure outside any module (worker crash, protocol fault).
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DocumentRead => "document_read",
            ErrorCode::EmptyTestSet => "empty_test_set",
            ErrorCode::EmptyTrainSet => "empty_train_set",
            ErrorCode::EmptyKnownText => "empty_known_text",
            ErrorCode::MissingStage => "missing_stage",
            ErrorCode::DistanceMismatch => "distance_mismatch",
            ErrorCode::UnknownModule => "unknown_module",
            ErrorCode::InvalidParameter => "invalid_parameter",
            ErrorCode::DuplicateModule => "duplicate_module",
            ErrorCode::ModuleFailed => "module_failed",
            ErrorCode::AllEventDriversFailed => "all_event_drivers_failed",
            ErrorCode::EmptyEventSet => "empty_event_set",
            ErrorCode::NoSuccessfulAnalysis => "no_successful_analysis",
            ErrorCode::Internal => "internal",
        }
    }

    /// Whether this code always terminates a run with `status=1`.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorCode::ModuleFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for code in [
            ErrorCode::DocumentRead,
            ErrorCode::DistanceMismatch,
            ErrorCode::AllEventDriversFailed,
            ErrorCode::NoSuccessfulAnalysis,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
            assert_eq!(code.to_string(), code.as_str());
        }
    }

    #[test]
    fn test_only_module_failures_are_recoverable() {
        assert!(!ErrorCode::ModuleFailed.is_fatal());
        assert!(ErrorCode::EmptyEventSet.is_fatal());
        assert!(ErrorCode::DocumentRead.is_fatal());
    }
}
