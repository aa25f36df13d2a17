//! Experiment pipeline: module contracts, registry, orchestration, results.
//!
//! ## Submodules
//!
//! - [`traits`] — The six module capability contracts
//! - [`params`] — Declarative parameter schemas and validated setters
//! - [`registry`] — Per-instance registration tables and plugin providers
//! - [`request`] — Serializable experiment request
//! - [`workbench`] — Caller-side mutable experiment setup
//! - [`validation`] — Precondition rules checked before any module runs
//! - [`runner`] — The staged orchestrator
//! - [`observer`] — Progress notifications
//! - [`artifacts`] — Result records, dump entries, snapshots
//! - [`report`] — Human-readable result blocks and ranking

pub mod artifacts;
pub mod error_code;
pub mod errors;
pub mod observer;
pub mod params;
pub mod pool;
pub mod registry;
pub mod report;
pub mod request;
pub mod runner;
pub mod traits;
pub mod validation;
pub mod workbench;

pub use artifacts::{
    DocumentState, DumpEntry, ExperimentResult, IntermediateSnapshot, ModuleRecord, Status,
};
pub use observer::{ExperimentObserver, NoopObserver, ProgressEvent, RecordingObserver};
pub use params::{ParamKind, ParamSpec, ParamValue, ParameterSet, Widget};
pub use registry::{AnyFactory, ModuleRegistry, PluginProvider, RegistryBuilder};
pub use request::{DocumentSource, ExperimentRequest, ModuleSpec};
pub use runner::{run_request, Experiment};
pub use traits::{
    AnalysisMethod, Canonicizer, Described, DistanceFunction, DistanceSlot, Embedding,
    EventCulling, EventDriver, ExecutionMode, Module, StageContext, NO_DISTANCE,
};
pub use workbench::Workbench;
