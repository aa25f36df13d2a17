//! Bounded worker pool for per-document stage work.
//!
//! Modules declare an [`ExecutionMode`]; the pool honours it. Per-document
//! modules fan out over a rayon pool (progress shown as indeterminate while
//! the pool runs). Whole-batch modules, or any module when multiprocessing
//! is off, run sequentially with a percentage after each document.

use rayon::prelude::*;
use tracing::debug;

use super::observer::ExperimentObserver;
use super::traits::ExecutionMode;
use crate::errors::{GaapError, Result};
use crate::types::{Document, EngineConfig};

/// Worker pool sized to (available cores - 1) unless configured otherwise.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    /// Build from config; a disabled or single-thread config yields a
    /// sequential pool.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let threads = config.resolved_worker_threads();
        if !config.multiprocessing || threads < 2 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("gaap-worker-{i}"))
            .build()
            .map_err(|e| GaapError::internal(format!("failed to build worker pool: {e}")))?;
        debug!(threads, "worker pool ready");
        Ok(Self { pool: Some(pool) })
    }

    /// A pool that never fans out.
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Apply `f` to every document, preserving order.
    ///
    /// The first error (in document order for sequential runs, any order for
    /// parallel runs) is returned and all outputs are discarded, so a failing
    /// module never leaves a partially-applied stage behind.
    pub fn map_documents<T, F>(
        &self,
        mode: ExecutionMode,
        docs: &[Document],
        progress: &mut dyn ExperimentObserver,
        f: F,
    ) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&Document) -> Result<T> + Sync + Send,
    {
        match (&self.pool, mode) {
            (Some(pool), ExecutionMode::PerDocument) if docs.len() > 1 => {
                progress.on_indeterminate(true);
                let out = pool.install(|| docs.par_iter().map(&f).collect::<Result<Vec<T>>>());
                progress.on_indeterminate(false);
                out
            }
            _ => {
                let total = docs.len().max(1) as f64;
                let mut out = Vec::with_capacity(docs.len());
                for (i, doc) in docs.iter().enumerate() {
                    out.push(f(doc)?);
                    progress.on_percent(100.0 * (i + 1) as f64 / total);
                }
                Ok(out)
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::sequential()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::observer::{ProgressEvent, RecordingObserver};

    fn docs(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| Document::unknown(format!("d{i}.txt")).with_text(format!("text {i}")))
            .collect()
    }

    #[test]
    fn test_sequential_reports_percent() {
        let pool = WorkerPool::sequential();
        let mut obs = RecordingObserver::new();
        let out = pool
            .map_documents(ExecutionMode::PerDocument, &docs(4), &mut obs, |d| {
                Ok(d.text.len())
            })
            .unwrap();
        assert_eq!(out, vec![6, 6, 6, 6]);
        assert_eq!(obs.events.last(), Some(&ProgressEvent::Percent(100.0)));
        assert_eq!(obs.events.len(), 4);
    }

    #[test]
    fn test_parallel_preserves_order() {
        let config = EngineConfig::default().with_worker_threads(3);
        let pool = WorkerPool::new(&config).unwrap();
        assert!(pool.is_parallel());
        let mut obs = RecordingObserver::new();
        let input = docs(50);
        let out = pool
            .map_documents(ExecutionMode::PerDocument, &input, &mut obs, |d| {
                Ok(d.filepath.clone())
            })
            .unwrap();
        let expected: Vec<String> = input.iter().map(|d| d.filepath.clone()).collect();
        assert_eq!(out, expected);
        assert_eq!(
            obs.events,
            vec![
                ProgressEvent::Indeterminate(true),
                ProgressEvent::Indeterminate(false)
            ]
        );
    }

    #[test]
    fn test_whole_batch_never_fans_out() {
        let config = EngineConfig::default().with_worker_threads(3);
        let pool = WorkerPool::new(&config).unwrap();
        let mut obs = RecordingObserver::new();
        pool.map_documents(ExecutionMode::WholeBatch, &docs(3), &mut obs, |_| Ok(()))
            .unwrap();
        assert!(obs
            .events
            .iter()
            .all(|e| matches!(e, ProgressEvent::Percent(_))));
    }

    #[test]
    fn test_disabled_multiprocessing_is_sequential() {
        let config = EngineConfig::default()
            .with_worker_threads(4)
            .with_multiprocessing(false);
        assert!(!WorkerPool::new(&config).unwrap().is_parallel());
    }

    #[test]
    fn test_error_discards_outputs() {
        let pool = WorkerPool::sequential();
        let mut obs = RecordingObserver::new();
        let result: Result<Vec<()>> =
            pool.map_documents(ExecutionMode::PerDocument, &docs(3), &mut obs, |d| {
                if d.filepath == "d1.txt" {
                    Err(GaapError::module("X", "bad doc"))
                } else {
                    Ok(())
                }
            });
        assert!(result.is_err());
    }
}
