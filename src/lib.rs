//! # gaap_engine
//!
//! Authorship attribution experiments: a registry of pluggable modules, a
//! staged orchestrator, and a process bridge with progress reporting.
//!
//! An experiment runs six kinds of module in order:
//!
//! 1. **Canonicizers** normalize document text
//! 2. **Event drivers** extract events (n-grams, words, ...)
//! 3. **Event culling** filters the event sets
//! 4. **Embeddings** turn event sets into numeric rows
//! 5. **Analysis methods** train on known authors and score unknown documents,
//!    using a paired **distance function** where they need one
//!
//! Module failures inside a stage are recorded as warnings and the stage
//! continues; document read errors, failed preconditions, and empty event
//! sets end the run with `status=1`.
//!
//! ```no_run
//! use gaap_engine::{run_request, DocumentSource, ExperimentRequest, ModuleRegistry,
//!     ModuleKind, ModuleSpec, NoopObserver};
//!
//! let registry = ModuleRegistry::with_builtin();
//! let request = ExperimentRequest::new()
//!     .with_document(DocumentSource::known("Alice", "alice1.txt"))
//!     .with_document(DocumentSource::unknown("unknown.txt"))
//!     .with_module(ModuleSpec::new(ModuleKind::EventDriver, "CharacterNGrams"))
//!     .with_module(ModuleSpec::new(ModuleKind::Embedding, "Frequency"))
//!     .with_analysis(
//!         ModuleSpec::new(ModuleKind::AnalysisMethod, "CentroidDriver"),
//!         ModuleSpec::new(ModuleKind::DistanceFunction, "EuclideanDistance"),
//!     );
//! let result = run_request(&registry, request, &mut NoopObserver);
//! println!("{}", result.results_text);
//! ```

pub mod batch;
pub mod bridge;
pub mod errors;
pub mod modules;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use errors::{GaapError, Result};
pub use types::{AuthorScores, Document, EngineConfig, EventSet, GlobalParameters, Matrix, ModuleKind};

// Re-export main functionality
pub use batch::{BatchExperiment, BatchOutcome, BatchRunner};
pub use bridge::{ExperimentBridge, ExperimentHandle, ExperimentOutcome, WorkerCommand};
pub use modules::BuiltinModules;
pub use pipeline::error_code::ErrorCode;
pub use pipeline::errors::{StageError, ValidationError};
pub use pipeline::validation::{ValidationEngine, ValidationReport};
pub use pipeline::{
    run_request, DocumentSource, DumpEntry, Experiment, ExperimentObserver, ExperimentRequest,
    ExperimentResult, IntermediateSnapshot, ModuleRegistry, ModuleSpec, NoopObserver, ParamValue,
    ProgressEvent, RecordingObserver, Status, Workbench,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
