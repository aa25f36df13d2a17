//! Capability contracts for the six pluggable module kinds.
//!
//! Every module implements [`Module`] (identity, parameter schema, execution
//! mode) plus exactly one kind trait:
//!
//! | Kind | Reads | Writes |
//! |------|-------|--------|
//! | [`Canonicizer`] | `text` / running `canonicized` | `canonicized` |
//! | [`EventDriver`] | `canonicized` | events (orchestrator appends) |
//! | [`EventCulling`] | `event_set` of the whole batch | filtered events |
//! | [`Embedding`] | `event_set` of the whole batch | `numbers` + matrix |
//! | [`AnalysisMethod`] | known/unknown matrix slices | author scores |
//! | [`DistanceFunction`] | two matrices | pairwise distances |
//!
//! Kind traits return fresh values instead of mutating documents wherever
//! possible. The orchestrator commits the output only when the whole call
//! succeeded, so a module that fails halfway leaves no partial state.

use std::sync::Arc;

use super::observer::ExperimentObserver;
use super::params::{ParamValue, ParameterSet, ParameterValidationError};
use super::pool::WorkerPool;
use crate::errors::{GaapError, Result};
use crate::types::{AuthorScores, Document, EventSet, GlobalParameters, Matrix};

// ============================================================================
// Shared module shape
// ============================================================================

/// Whether a module's unit of work may fan out across the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Pure function per document; safe to parallelize.
    PerDocument,
    /// Needs corpus-wide state; runs sequentially over the batch.
    WholeBatch,
}

/// Static identity of a module type, available without an instance.
///
/// The registry indexes factories by `NAME`, so it must be unique within
/// the module's kind.
pub trait Described {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
}

/// Behaviour shared by all six module kinds.
pub trait Module: Send + Sync {
    fn display_name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    fn params(&self) -> &ParameterSet;

    fn params_mut(&mut self) -> &mut ParameterSet;

    /// Validated setter; on rejection the previous value is kept.
    fn set_param(
        &mut self,
        name: &str,
        value: ParamValue,
    ) -> std::result::Result<(), ParameterValidationError> {
        self.params_mut().set(name, value)
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::WholeBatch
    }
}

/// What a stage hands to a module besides the documents.
pub struct StageContext<'a> {
    pub pool: &'a WorkerPool,
    pub progress: &'a mut dyn ExperimentObserver,
    pub globals: &'a GlobalParameters,
}

// ============================================================================
// Canonicizer
// ============================================================================

/// Text normalization applied before event extraction.
///
/// # Contract
///
/// - **Input**: each document's working text (the previous canonicizer's
///   output, or the raw text for the first one).
/// - **Output**: the new canonicized text for every document.
/// - Never touches `event_set`.
pub trait Canonicizer: Module {
    fn canonicize(&self, text: &str) -> Result<String>;

    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<String>> {
        ctx.pool
            .map_documents(self.execution_mode(), docs, &mut *ctx.progress, |doc| {
                self.canonicize(doc.working_text())
            })
    }
}

// ============================================================================
// EventDriver
// ============================================================================

/// Feature extraction from canonicized text.
///
/// # Contract
///
/// - **Input**: `canonicized` of every document.
/// - **Output**: one event list per document, in document order. The
///   orchestrator replaces the event set for the first driver and appends
///   for later ones.
/// - An empty event list for any document is an error.
pub trait EventDriver: Module {
    fn extract(&self, text: &str) -> Result<EventSet>;

    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<EventSet>> {
        ctx.pool
            .map_documents(self.execution_mode(), docs, &mut *ctx.progress, |doc| {
                let events = self.extract(&doc.canonicized)?;
                if events.is_empty() {
                    return Err(GaapError::module(
                        self.display_name(),
                        format!("no events extracted from {}", doc.filepath),
                    ));
                }
                Ok(events)
            })
    }
}

// ============================================================================
// EventCulling
// ============================================================================

/// Event filtering; receives the whole batch so it can use corpus statistics.
///
/// # Contract
///
/// - **Output**: the filtered event set for every document, in order.
/// - Emptying a document's event set is not an error here; the orchestrator
///   treats it as fatal after the stage.
pub trait EventCulling: Module {
    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<EventSet>>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Conversion of event sets into a shared numeric matrix.
///
/// # Contract
///
/// - **Input**: all documents, known first then unknown.
/// - **Output**: a matrix with exactly one row per document, in the same
///   order, and uniform width.
pub trait Embedding: Module {
    fn embed(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Matrix>;

    /// Embed, check the shape, and assign each row to `document.numbers`.
    fn process(&self, docs: &mut [Document], ctx: &mut StageContext<'_>) -> Result<Matrix> {
        let matrix = self.embed(docs, ctx)?;
        if matrix.rows() != docs.len() {
            return Err(GaapError::module(
                self.display_name(),
                format!(
                    "produced {} rows for {} documents",
                    matrix.rows(),
                    docs.len()
                ),
            ));
        }
        for (i, doc) in docs.iter_mut().enumerate() {
            doc.numbers = matrix.row(i).to_vec();
        }
        Ok(matrix)
    }
}

// ============================================================================
// DistanceFunction
// ============================================================================

/// Name occupying a distance slot whose analysis method needs none.
pub const NO_DISTANCE: &str = "NA";

/// Pairwise distance between matrix rows.
pub trait DistanceFunction: Module {
    /// Distance between two equal-length vectors.
    fn pair(&self, a: &[f64], b: &[f64]) -> Result<f64>;

    /// `result[i][j]` is the distance from `unknown` row i to `reference` row j.
    fn distance(&self, unknown: &Matrix, reference: &Matrix) -> Result<Matrix> {
        if unknown.cols() != reference.cols() {
            return Err(GaapError::module(
                self.display_name(),
                format!(
                    "dimension mismatch: {} vs {}",
                    unknown.cols(),
                    reference.cols()
                ),
            ));
        }
        let mut out = Matrix::zeros(unknown.rows(), reference.rows());
        for (i, u) in unknown.iter_rows().enumerate() {
            for (j, r) in reference.iter_rows().enumerate() {
                out.set(i, j, self.pair(u, r)?);
            }
        }
        Ok(out)
    }
}

/// The distance function bound to an analysis method, or the `NA` sentinel.
#[derive(Clone)]
pub enum DistanceSlot {
    Function(Arc<dyn DistanceFunction>),
    NotApplicable,
}

impl DistanceSlot {
    pub fn name(&self) -> &str {
        match self {
            DistanceSlot::Function(df) => df.display_name(),
            DistanceSlot::NotApplicable => NO_DISTANCE,
        }
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, DistanceSlot::Function(_))
    }

    /// The bound function, or an error attributed to `module`.
    pub fn require(&self, module: &str) -> Result<&dyn DistanceFunction> {
        match self {
            DistanceSlot::Function(df) => Ok(df.as_ref()),
            DistanceSlot::NotApplicable => Err(GaapError::module(
                module,
                "no distance function bound before train/analyze",
            )),
        }
    }
}

impl std::fmt::Debug for DistanceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DistanceSlot({})", self.name())
    }
}

// ============================================================================
// AnalysisMethod
// ============================================================================

/// Two-phase classifier: fit on known documents, score unknown ones.
///
/// # Contract
///
/// - `set_distance_function` is called before `train` and `analyze`.
/// - `analyze` returns one score map per unknown document, in order.
/// - **Lower score means more likely author.** Ranking relies on this;
///   tie-breaking beyond it is up to each method.
pub trait AnalysisMethod: Module {
    /// `false` means the paired slot must be the `NA` sentinel.
    fn needs_distance_function(&self) -> bool {
        true
    }

    fn set_distance_function(&mut self, slot: DistanceSlot);

    fn train(&mut self, known: &[Document], numbers: &Matrix) -> Result<()>;

    fn analyze(&self, unknown: &[Document], numbers: &Matrix) -> Result<Vec<AuthorScores>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::observer::NoopObserver;

    struct Upper {
        params: ParameterSet,
    }

    impl Module for Upper {
        fn display_name(&self) -> &'static str {
            "Upper"
        }
        fn params(&self) -> &ParameterSet {
            &self.params
        }
        fn params_mut(&mut self) -> &mut ParameterSet {
            &mut self.params
        }
    }

    impl Canonicizer for Upper {
        fn canonicize(&self, text: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }
    }

    struct Nothing {
        params: ParameterSet,
    }

    impl Module for Nothing {
        fn display_name(&self) -> &'static str {
            "Nothing"
        }
        fn params(&self) -> &ParameterSet {
            &self.params
        }
        fn params_mut(&mut self) -> &mut ParameterSet {
            &mut self.params
        }
    }

    impl EventDriver for Nothing {
        fn extract(&self, _text: &str) -> Result<EventSet> {
            Ok(Vec::new())
        }
    }

    struct Absolute {
        params: ParameterSet,
    }

    impl Module for Absolute {
        fn display_name(&self) -> &'static str {
            "Absolute"
        }
        fn params(&self) -> &ParameterSet {
            &self.params
        }
        fn params_mut(&mut self) -> &mut ParameterSet {
            &mut self.params
        }
    }

    impl DistanceFunction for Absolute {
        fn pair(&self, a: &[f64], b: &[f64]) -> Result<f64> {
            Ok(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum())
        }
    }

    fn ctx_parts() -> (WorkerPool, NoopObserver, GlobalParameters) {
        (
            WorkerPool::sequential(),
            NoopObserver,
            GlobalParameters::default(),
        )
    }

    #[test]
    fn test_canonicizer_reads_working_text() {
        let (pool, mut obs, globals) = ctx_parts();
        let mut ctx = StageContext {
            pool: &pool,
            progress: &mut obs,
            globals: &globals,
        };
        let mut doc = Document::unknown("a.txt").with_text("raw");
        doc.canonicized = "already".into();
        let up = Upper {
            params: ParameterSet::empty("Upper"),
        };
        let out = up.process(&[doc], &mut ctx).unwrap();
        assert_eq!(out, vec!["ALREADY".to_string()]);
    }

    #[test]
    fn test_event_driver_rejects_empty_output() {
        let (pool, mut obs, globals) = ctx_parts();
        let mut ctx = StageContext {
            pool: &pool,
            progress: &mut obs,
            globals: &globals,
        };
        let driver = Nothing {
            params: ParameterSet::empty("Nothing"),
        };
        let doc = Document::unknown("a.txt").with_text("x");
        let err = driver.process(&[doc], &mut ctx).unwrap_err();
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn test_default_distance_matrix_shape() {
        let df = Absolute {
            params: ParameterSet::empty("Absolute"),
        };
        let unknown = Matrix::from_rows(vec![vec![0.0, 0.0]]).unwrap();
        let reference = Matrix::from_rows(vec![vec![1.0, 1.0], vec![0.0, 3.0]]).unwrap();
        let d = df.distance(&unknown, &reference).unwrap();
        assert_eq!((d.rows(), d.cols()), (1, 2));
        assert_eq!(d.row(0), &[2.0, 3.0]);
        let wide = Matrix::from_rows(vec![vec![0.0]]).unwrap();
        assert!(df.distance(&wide, &reference).is_err());
    }

    #[test]
    fn test_distance_slot_names() {
        let slot = DistanceSlot::Function(Arc::new(Absolute {
            params: ParameterSet::empty("Absolute"),
        }));
        assert_eq!(slot.name(), "Absolute");
        assert!(slot.require("Centroid").is_ok());
        assert_eq!(DistanceSlot::NotApplicable.name(), NO_DISTANCE);
        assert!(DistanceSlot::NotApplicable.require("Centroid").is_err());
    }

    #[test]
    fn test_trait_objects() {
        let boxed: Box<dyn Canonicizer> = Box::new(Upper {
            params: ParameterSet::empty("Upper"),
        });
        assert_eq!(boxed.display_name(), "Upper");
        assert_eq!(boxed.execution_mode(), ExecutionMode::WholeBatch);
    }
}
