//! Core types for gaap_engine
//!
//! This module defines the fundamental data structures used throughout the library:
//! module kinds, the document model, the shared feature matrix, global run
//! parameters, and engine configuration.

use crate::errors::{GaapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Module kinds
// ============================================================================

/// The six pluggable capability categories, in pipeline stage order.
///
/// The derived `Ord` follows stage order, so maps keyed by `ModuleKind`
/// iterate canonicizers first and distance functions last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKind {
    #[serde(rename = "Canonicizers")]
    Canonicizer,
    #[serde(rename = "EventDrivers")]
    EventDriver,
    #[serde(rename = "EventCulling")]
    EventCulling,
    #[serde(rename = "Embeddings")]
    Embedding,
    #[serde(rename = "AnalysisMethods")]
    AnalysisMethod,
    #[serde(rename = "DistanceFunctions")]
    DistanceFunction,
}

impl ModuleKind {
    /// All kinds in stage order.
    pub const ALL: [ModuleKind; 6] = [
        ModuleKind::Canonicizer,
        ModuleKind::EventDriver,
        ModuleKind::EventCulling,
        ModuleKind::Embedding,
        ModuleKind::AnalysisMethod,
        ModuleKind::DistanceFunction,
    ];

    /// Plural key used in result dumps and in-use listings.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Canonicizer => "Canonicizers",
            ModuleKind::EventDriver => "EventDrivers",
            ModuleKind::EventCulling => "EventCulling",
            ModuleKind::Embedding => "Embeddings",
            ModuleKind::AnalysisMethod => "AnalysisMethods",
            ModuleKind::DistanceFunction => "DistanceFunctions",
        }
    }

    /// Singular label for messages.
    pub fn label(&self) -> &'static str {
        match self {
            ModuleKind::Canonicizer => "canonicizer",
            ModuleKind::EventDriver => "event driver",
            ModuleKind::EventCulling => "event culler",
            ModuleKind::Embedding => "embedder",
            ModuleKind::AnalysisMethod => "analysis method",
            ModuleKind::DistanceFunction => "distance function",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ModuleKind {
    type Err = GaapError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "canonicizer" | "canonicizers" => Ok(ModuleKind::Canonicizer),
            "eventdriver" | "eventdrivers" => Ok(ModuleKind::EventDriver),
            "eventculling" | "eventculler" | "eventcullers" => Ok(ModuleKind::EventCulling),
            "embedding" | "embeddings" | "embedder" => Ok(ModuleKind::Embedding),
            "analysismethod" | "analysismethods" => Ok(ModuleKind::AnalysisMethod),
            "distancefunction" | "distancefunctions" => Ok(ModuleKind::DistanceFunction),
            _ => Err(GaapError::invalid_config(format!("unknown module kind '{s}'"))),
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// Events extracted from one document, in extraction order.
pub type EventSet = Vec<String>;

/// Per-author scores for one unknown document. Lower is more likely.
pub type AuthorScores = BTreeMap<String, f64>;

/// The unit of data flowing through the pipeline.
///
/// An empty `author` marks an unknown (test) document; every other document
/// belongs to the training set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub author: String,
    pub title: String,
    /// Raw file content, filled by the load step.
    #[serde(default)]
    pub text: String,
    /// Output of the canonicize stage; falls back to `text`.
    #[serde(default)]
    pub canonicized: String,
    #[serde(default)]
    pub event_set: EventSet,
    /// One row of the shared feature matrix, valid after an embedding ran.
    #[serde(default)]
    pub numbers: Vec<f64>,
    pub filepath: String,
}

impl Document {
    pub fn new(
        author: impl Into<String>,
        title: impl Into<String>,
        filepath: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            title: title.into(),
            filepath: filepath.into(),
            ..Default::default()
        }
    }

    /// A training document titled after its file name.
    pub fn known(author: impl Into<String>, filepath: impl Into<String>) -> Self {
        let filepath = filepath.into();
        Self::new(author, title_from_path(&filepath), filepath)
    }

    /// A test document titled after its file name.
    pub fn unknown(filepath: impl Into<String>) -> Self {
        Self::known("", filepath)
    }

    /// Builder method: attach already-loaded text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.author.is_empty()
    }

    /// Text the next canonicizer should read: the running canonicized
    /// output when present, otherwise the raw text.
    pub fn working_text(&self) -> &str {
        if self.canonicized.is_empty() {
            &self.text
        } else {
            &self.canonicized
        }
    }

    /// Load `text` from `filepath`.
    pub fn read_text(&mut self) -> Result<()> {
        let bytes =
            std::fs::read(&self.filepath).map_err(|_| GaapError::document_read(&self.filepath))?;
        self.text = decode_text(bytes);
        Ok(())
    }
}

/// The path component after the last `/`.
pub fn title_from_path(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Decode file bytes as UTF-8, falling back to Latin-1 for anything else.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

// ============================================================================
// Feature matrix
// ============================================================================

/// Dense row-major matrix; one row per document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// A zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from rows; every row must have the same width.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(GaapError::internal(format!(
                "matrix row {bad} has width {}, expected {cols}",
                rows[bad].len()
            )));
        }
        let n = rows.len();
        Ok(Self {
            rows: n,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// Copy rows `[start, end)` into a new matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.rows);
        let start = start.min(end);
        Matrix {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }
}

// ============================================================================
// Global parameters
// ============================================================================

/// Run-wide key/value settings visible to every module (e.g. language).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalParameters(BTreeMap<String, String>);

impl GlobalParameters {
    pub const LANGUAGE: &'static str = "language";

    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn language(&self) -> &str {
        self.get(Self::LANGUAGE).unwrap_or("English")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl Default for GlobalParameters {
    fn default() -> Self {
        let mut params = Self::empty();
        params.set(Self::LANGUAGE, "English");
        params
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Engine-level settings shared by the orchestrator, pool, and bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fan per-document work out to the worker pool
    pub multiprocessing: bool,
    /// Worker pool size (None = available cores - 1, at least 1)
    pub worker_threads: Option<usize>,
    /// How long an abort waits for a pending snapshot before killing the worker
    pub abort_drain_timeout_ms: u64,
    /// Where the batch runner writes reports
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            multiprocessing: true,
            worker_threads: None,
            abort_drain_timeout_ms: 100,
            output_dir: PathBuf::from("tmp"),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; absent keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GaapError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == Some(0) {
            return Err(GaapError::invalid_config("worker_threads must be > 0"));
        }
        if self.abort_drain_timeout_ms > 60_000 {
            return Err(GaapError::invalid_config(
                "abort_drain_timeout_ms must be <= 60000",
            ));
        }
        Ok(())
    }

    /// Pool size after applying the cores - 1 default.
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Builder method: enable or disable the worker pool
    pub fn with_multiprocessing(mut self, enabled: bool) -> Self {
        self.multiprocessing = enabled;
        self
    }

    /// Builder method: set worker pool size
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Builder method: set abort drain window
    pub fn with_abort_drain_timeout_ms(mut self, ms: u64) -> Self {
        self.abort_drain_timeout_ms = ms;
        self
    }

    /// Builder method: set report output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_kind_order_is_stage_order() {
        let mut kinds = ModuleKind::ALL.to_vec();
        kinds.reverse();
        kinds.sort();
        assert_eq!(kinds, ModuleKind::ALL.to_vec());
    }

    #[test]
    fn test_module_kind_parse() {
        assert_eq!(
            "EventDrivers".parse::<ModuleKind>().unwrap(),
            ModuleKind::EventDriver
        );
        assert_eq!(
            "analysis_method".parse::<ModuleKind>().unwrap(),
            ModuleKind::AnalysisMethod
        );
        assert!("graph".parse::<ModuleKind>().is_err());
    }

    #[test]
    fn test_module_kind_serde_key() {
        let json = serde_json::to_string(&ModuleKind::Embedding).unwrap();
        assert_eq!(json, "\"Embeddings\"");
    }

    #[test]
    fn test_document_title_from_path() {
        let doc = Document::known("Alice", "corpus/alice/one.txt");
        assert_eq!(doc.title, "one.txt");
        assert!(!doc.is_unknown());
        assert!(Document::unknown("x/y/z.txt").is_unknown());
        assert_eq!(title_from_path("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_working_text_prefers_canonicized() {
        let mut doc = Document::unknown("u.txt").with_text("Raw");
        assert_eq!(doc.working_text(), "Raw");
        doc.canonicized = "raw".into();
        assert_eq!(doc.working_text(), "raw");
    }

    #[test]
    fn test_read_text_missing_file() {
        let mut doc = Document::unknown("/definitely/not/here.txt");
        let err = doc.read_text().unwrap_err();
        assert!(matches!(err, GaapError::DocumentRead { .. }));
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode_text(b"caf\xe9".to_vec()), "café");
        assert_eq!(decode_text("naïve".as_bytes().to_vec()), "naïve");
    }

    #[test]
    fn test_matrix_rows_and_slices() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        let tail = m.slice_rows(1, 3);
        assert_eq!(tail.rows(), 2);
        assert_eq!(tail.get(1, 0), 5.0);
        assert_eq!(m.slice_rows(3, 3).rows(), 0);
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        assert!(Matrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_global_parameters_default_language() {
        let mut params = GlobalParameters::default();
        assert_eq!(params.language(), "English");
        params.set("language", "German");
        assert_eq!(params.language(), "German");
    }

    #[test]
    fn test_config_default_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.resolved_worker_threads() >= 1);
    }

    #[test]
    fn test_config_rejects_zero_threads() {
        let config = EngineConfig::default().with_worker_threads(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_toml() {
        let config: EngineConfig = toml::from_str("multiprocessing = false").unwrap();
        assert!(!config.multiprocessing);
        assert_eq!(config.abort_drain_timeout_ms, 100);
    }
}
