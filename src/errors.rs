//! Error types for gaap_engine
//!
//! Module implementations return [`GaapError`] from their processing methods;
//! the orchestrator decides per stage whether an error is recoverable or
//! terminates the run.

use thiserror::Error;

use crate::pipeline::errors::ValidationError;
use crate::pipeline::params::ParameterValidationError;
use crate::types::ModuleKind;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GaapError>;

/// Main error type for gaap_engine
#[derive(Error, Debug, Clone)]
pub enum GaapError {
    /// A document's file could not be read
    #[error("Error reading file at:\n{path}")]
    DocumentRead { path: String },

    /// A precondition check failed before any module ran
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A parameter name or value was rejected by a module's schema
    #[error(transparent)]
    ParameterValidation(#[from] ParameterValidationError),

    /// Two registrations of one kind share a display name
    #[error("Duplicate {kind} module name: {name}")]
    DuplicateModuleName { kind: ModuleKind, name: String },

    /// A requested module name is not registered for its kind
    #[error("Unknown {kind} module: {name}")]
    UnknownModule { kind: ModuleKind, name: String },

    /// Every plugin providing modules of a kind failed to load
    #[error("No {kind} modules available; plugin load errors:\n{errors}")]
    RegistryUnavailable { kind: ModuleKind, errors: String },

    /// Documents ended a stage with no events
    #[error("{} docs had no event sets after {stage}:\n{}", paths.len(), paths.join("\n"))]
    EmptyEventSet { stage: String, paths: Vec<String> },

    /// Error raised from inside a module's processing method
    #[error("{module}: {message}")]
    Module { module: String, message: String },

    /// Malformed batch or corpus descriptor
    #[error("Descriptor error at line {line}: {message}")]
    Descriptor { line: usize, message: String },

    /// Invalid engine configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// JSON/TOML serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Filesystem or pipe error outside document loading
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Internal error (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GaapError {
    /// Create a document read error
    pub fn document_read(path: impl Into<String>) -> Self {
        Self::DocumentRead { path: path.into() }
    }

    /// Create a module failure attributed to `module`
    pub fn module(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Module {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create an empty event set error listing the affected paths
    pub fn empty_event_set(stage: impl Into<String>, paths: Vec<String>) -> Self {
        Self::EmptyEventSet {
            stage: stage.into(),
            paths,
        }
    }

    /// Create a descriptor parse error
    pub fn descriptor(line: usize, message: impl Into<String>) -> Self {
        Self::Descriptor {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Setup-time errors: raised before any module executes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ParameterValidation(_)
                | Self::DuplicateModuleName { .. }
                | Self::UnknownModule { .. }
                | Self::RegistryUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for GaapError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for GaapError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for GaapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_read_display() {
        let err = GaapError::document_read("/tmp/missing.txt");
        assert_eq!(err.to_string(), "Error reading file at:\n/tmp/missing.txt");
    }

    #[test]
    fn test_empty_event_set_names_every_path() {
        let err = GaapError::empty_event_set(
            "event culling",
            vec!["a/one.txt".to_string(), "b/two.txt".to_string()],
        );
        let text = err.to_string();
        assert!(text.starts_with("2 docs had no event sets after event culling"));
        assert!(text.contains("a/one.txt"));
        assert!(text.contains("b/two.txt"));
    }

    #[test]
    fn test_configuration_errors() {
        let err = GaapError::UnknownModule {
            kind: ModuleKind::Canonicizer,
            name: "Nope".into(),
        };
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("Nope"));
        assert!(!GaapError::module("X", "boom").is_configuration_error());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: GaapError = io.into();
        assert!(err.to_string().contains("pipe closed"));
    }
}
