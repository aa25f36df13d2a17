//! Result records produced by an experiment run.
//!
//! These are plain serde values: they cross the process boundary as JSON
//! and are the only thing a caller ever receives from a run.
//!
//! - [`ExperimentResult`]: the terminal record (`resultsText`, `message`,
//!   `status`, `fullExperimentDump`, `experimentTime`).
//! - [`DumpEntry`]: one (embedding, analysis method, distance function)
//!   combination with module parameters and per-document scores.
//! - [`IntermediateSnapshot`]: document state plus dump-so-far, refreshed
//!   after each module so an aborted run still yields something.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::params::ParamValue;
use crate::types::{AuthorScores, Document, GlobalParameters, ModuleKind};

// ============================================================================
// Status
// ============================================================================

/// Terminal run status; serializes as `0` (usable results) or `1` (fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    Success,
    Failure,
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        match status {
            Status::Success => 0,
            Status::Failure => 1,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Success),
            1 => Ok(Status::Failure),
            other => Err(format!("status must be 0 or 1, got {other}")),
        }
    }
}

/// `bool` as `0`/`1`.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(d)? != 0)
    }
}

// ============================================================================
// Dump records
// ============================================================================

/// A configured module as recorded in the dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub name: String,
    pub params: BTreeMap<String, ParamValue>,
    /// The pipeline has moved past this module's step.
    #[serde(with = "flag")]
    pub completed: bool,
    /// Error text when the step failed and was skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleRecord {
    pub fn pending(name: impl Into<String>, params: BTreeMap<String, ParamValue>) -> Self {
        Self {
            name: name.into(),
            params,
            completed: false,
            error: None,
        }
    }
}

/// Identity of a document in the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub author: String,
    pub title: String,
    pub filepath: String,
}

impl From<&Document> for DocumentMeta {
    fn from(doc: &Document) -> Self {
        Self {
            author: doc.author.clone(),
            title: doc.title.clone(),
            filepath: doc.filepath.clone(),
        }
    }
}

/// One (embedding, analysis method, distance function) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpEntry {
    pub modules: BTreeMap<ModuleKind, Vec<ModuleRecord>>,
    pub experiment_time: String,
    #[serde(with = "flag")]
    pub success: bool,
    pub documents: Vec<DocumentMeta>,
    pub global_parameters: GlobalParameters,
    /// Unknown document filepath -> author -> score.
    pub doc_results: Option<BTreeMap<String, AuthorScores>>,
}

impl DumpEntry {
    /// `true` when no module is marked completed after an incomplete one,
    /// walking kinds in stage order and modules in list order.
    pub fn completion_is_monotonic(&self) -> bool {
        let mut seen_incomplete = false;
        for kind in ModuleKind::ALL {
            for record in self.modules.get(&kind).into_iter().flatten() {
                if record.completed && seen_incomplete {
                    return false;
                }
                if !record.completed {
                    seen_incomplete = true;
                }
            }
        }
        true
    }

    pub fn module_names(&self, kind: ModuleKind) -> Vec<&str> {
        self.modules
            .get(&kind)
            .map(|records| records.iter().map(|r| r.name.as_str()).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Intermediate snapshot
// ============================================================================

/// Document state captured in a snapshot (raw text omitted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub author: String,
    pub title: String,
    pub filepath: String,
    pub canonicized: String,
    pub event_set: Vec<String>,
    pub numbers: Vec<f64>,
}

impl From<&Document> for DocumentState {
    fn from(doc: &Document) -> Self {
        Self {
            author: doc.author.clone(),
            title: doc.title.clone(),
            filepath: doc.filepath.clone(),
            canonicized: doc.canonicized.clone(),
            event_set: doc.event_set.clone(),
            numbers: doc.numbers.clone(),
        }
    }
}

/// Most recent complete state of a run in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateSnapshot {
    /// Label of the step just finished, e.g. `"EventDrivers/CharacterNGrams"`.
    pub stage: String,
    pub documents: Vec<DocumentState>,
    /// Every planned combination, with per-module `completed` flags.
    pub dump: Vec<DumpEntry>,
}

impl IntermediateSnapshot {
    pub fn completion_is_monotonic(&self) -> bool {
        self.dump.iter().all(DumpEntry::completion_is_monotonic)
    }
}

// ============================================================================
// Experiment result
// ============================================================================

/// The record every run ends with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    pub results_text: String,
    /// Accumulated warnings; also the failure reason when `status` is 1.
    pub message: String,
    pub status: Status,
    pub full_experiment_dump: Vec<DumpEntry>,
    pub experiment_time: String,
}

impl ExperimentResult {
    /// A terminal failure with no usable results.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            results_text: String::new(),
            message: message.into(),
            status: Status::Failure,
            full_experiment_dump: Vec::new(),
            experiment_time: timestamp(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Success with at least one skipped module.
    pub fn is_partial(&self) -> bool {
        self.is_success() && !self.message.is_empty()
    }
}

/// ISO-8601 local time.
pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}
