//! Event cullers.
//!
//! [`NOccurrences`] filters each document on its own counts and can fan out.
//! The corpus-frequency cullers gather statistics over the whole batch first
//! and must never be split per document.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{GaapError, Result};
use crate::pipeline::params::{ParamSpec, ParameterSet};
use crate::pipeline::traits::{Described, EventCulling, ExecutionMode, Module, StageContext};
use crate::types::{Document, EventSet};

fn count_events<'a>(events: impl Iterator<Item = &'a String>) -> FxHashMap<&'a str, usize> {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for e in events {
        *counts.entry(e.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Keep only events contained in `keep`, preserving order.
fn retain_events(docs: &[Document], keep: &FxHashSet<&str>) -> Vec<EventSet> {
    docs.iter()
        .map(|d| {
            d.event_set
                .iter()
                .filter(|e| keep.contains(e.as_str()))
                .cloned()
                .collect()
        })
        .collect()
}

// ============================================================================
// N occurrences
// ============================================================================

pub struct NOccurrences {
    params: ParameterSet,
}

impl NOccurrences {
    const MODES: [&'static str; 5] = ["Greater than", "At least", "Less than", "At most", "Equal to"];
}

impl Default for NOccurrences {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![
                    ParamSpec::choice("mode", &Self::MODES, "At least"),
                    ParamSpec::int_range("frequency", 1, 9, 2),
                ],
            ),
        }
    }
}

impl Described for NOccurrences {
    const NAME: &'static str = "NOccurrences";
    const DESCRIPTION: &'static str =
        "Keep events whose count within the document satisfies the chosen comparison with N.";
}

impl_module!(NOccurrences, ExecutionMode::PerDocument);

impl EventCulling for NOccurrences {
    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<EventSet>> {
        let mode = self.params.text("mode")?.to_string();
        let n = self.params.int("frequency")? as usize;
        let keep = move |count: usize| match mode.as_str() {
            "Greater than" => count > n,
            "Less than" => count < n,
            "At most" => count <= n,
            "Equal to" => count == n,
            _ => count >= n,
        };
        ctx.pool
            .map_documents(self.execution_mode(), docs, &mut *ctx.progress, |doc| {
                let counts = count_events(doc.event_set.iter());
                Ok(doc
                    .event_set
                    .iter()
                    .filter(|e| counts.get(e.as_str()).is_some_and(|c| keep(*c)))
                    .cloned()
                    .collect())
            })
    }
}

// ============================================================================
// Corpus-frequency cullers
// ============================================================================

/// Events ranked by corpus frequency (most frequent first, ties by text).
fn ranked_by_frequency(docs: &[Document]) -> Vec<(&str, usize)> {
    let counts = count_events(docs.iter().flat_map(|d| d.event_set.iter()));
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

pub struct MostCommonEvents {
    params: ParameterSet,
}

impl Default for MostCommonEvents {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![ParamSpec::int_range("num_events", 1, 200, 50)],
            ),
        }
    }
}

impl Described for MostCommonEvents {
    const NAME: &'static str = "MostCommonEvents";
    const DESCRIPTION: &'static str =
        "Analyze only the N most frequent events across all documents.";
}

impl_module!(MostCommonEvents);

impl EventCulling for MostCommonEvents {
    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<EventSet>> {
        let n = self.params.int("num_events")? as usize;
        let keep: FxHashSet<&str> = ranked_by_frequency(docs)
            .into_iter()
            .take(n)
            .map(|(e, _)| e)
            .collect();
        ctx.progress.on_percent(100.0);
        Ok(retain_events(docs, &keep))
    }
}

pub struct LeastCommonEvents {
    params: ParameterSet,
}

impl Default for LeastCommonEvents {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![ParamSpec::int_range("num_events", 1, 200, 50)],
            ),
        }
    }
}

impl Described for LeastCommonEvents {
    const NAME: &'static str = "LeastCommonEvents";
    const DESCRIPTION: &'static str =
        "Analyze only the N least frequent events across all documents.";
}

impl_module!(LeastCommonEvents);

impl EventCulling for LeastCommonEvents {
    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<EventSet>> {
        let n = self.params.int("num_events")? as usize;
        let mut ranked = ranked_by_frequency(docs);
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        let keep: FxHashSet<&str> = ranked.into_iter().take(n).map(|(e, _)| e).collect();
        ctx.progress.on_percent(100.0);
        Ok(retain_events(docs, &keep))
    }
}

// ============================================================================
// Extreme culler
// ============================================================================

pub struct ExtremeCuller {
    params: ParameterSet,
}

impl Default for ExtremeCuller {
    fn default() -> Self {
        Self {
            params: ParameterSet::empty(Self::NAME),
        }
    }
}

impl Described for ExtremeCuller {
    const NAME: &'static str = "ExtremeCuller";
    const DESCRIPTION: &'static str =
        "Keep only the events that appear in every document (Jockers, 2008).";
}

impl_module!(ExtremeCuller);

impl EventCulling for ExtremeCuller {
    fn process(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Vec<EventSet>> {
        let mut iter = docs.iter();
        let Some(first) = iter.next() else {
            return Ok(Vec::new());
        };
        let mut common: FxHashSet<&str> = first.event_set.iter().map(String::as_str).collect();
        for doc in iter {
            let here: FxHashSet<&str> = doc.event_set.iter().map(String::as_str).collect();
            common.retain(|e| here.contains(e));
        }
        if common.is_empty() {
            return Err(GaapError::module(
                Self::NAME,
                "no event is shared by all documents",
            ));
        }
        ctx.progress.on_percent(100.0);
        Ok(retain_events(docs, &common))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::observer::NoopObserver;
    use crate::pipeline::params::ParamValue;
    use crate::pipeline::pool::WorkerPool;
    use crate::types::GlobalParameters;

    fn doc(path: &str, events: &[&str]) -> Document {
        let mut d = Document::known("A", path);
        d.event_set = events.iter().map(|s| s.to_string()).collect();
        d
    }

    fn run(culler: &dyn EventCulling, docs: &[Document]) -> Result<Vec<EventSet>> {
        let pool = WorkerPool::sequential();
        let mut obs = NoopObserver;
        let globals = GlobalParameters::default();
        let mut ctx = StageContext {
            pool: &pool,
            progress: &mut obs,
            globals: &globals,
        };
        culler.process(docs, &mut ctx)
    }

    #[test]
    fn test_n_occurrences_at_least() {
        let docs = vec![doc("a", &["x", "y", "x", "z", "x", "y"])];
        let out = run(&NOccurrences::default(), &docs).unwrap();
        assert_eq!(out[0], vec!["x", "y", "x", "x", "y"]);
    }

    #[test]
    fn test_n_occurrences_equal_to() {
        let mut c = NOccurrences::default();
        c.set_param("mode", "Equal to".into()).unwrap();
        c.set_param("frequency", ParamValue::Int(1)).unwrap();
        let docs = vec![doc("a", &["x", "y", "x"])];
        assert_eq!(run(&c, &docs).unwrap()[0], vec!["y"]);
    }

    #[test]
    fn test_most_common_uses_corpus_counts() {
        let mut c = MostCommonEvents::default();
        c.set_param("num_events", ParamValue::Int(1)).unwrap();
        let docs = vec![doc("a", &["x", "y"]), doc("b", &["y", "z"])];
        let out = run(&c, &docs).unwrap();
        assert_eq!(out[0], vec!["y"]);
        assert_eq!(out[1], vec!["y"]);
    }

    #[test]
    fn test_least_common_ties_by_text() {
        let mut c = LeastCommonEvents::default();
        c.set_param("num_events", ParamValue::Int(2)).unwrap();
        let docs = vec![doc("a", &["x", "y", "y"]), doc("b", &["z", "y"])];
        let out = run(&c, &docs).unwrap();
        assert_eq!(out[0], vec!["x"]);
        assert_eq!(out[1], vec!["z"]);
    }

    #[test]
    fn test_extreme_culler_intersection() {
        let docs = vec![doc("a", &["x", "y", "q"]), doc("b", &["y", "x"])];
        let out = run(&ExtremeCuller::default(), &docs).unwrap();
        assert_eq!(out[0], vec!["x", "y"]);
        assert_eq!(out[1], vec!["y", "x"]);
    }

    #[test]
    fn test_extreme_culler_empty_intersection_fails() {
        let docs = vec![doc("a", &["x"]), doc("b", &["y"])];
        assert!(run(&ExtremeCuller::default(), &docs).is_err());
    }

    #[test]
    fn test_corpus_cullers_are_whole_batch() {
        assert_eq!(
            MostCommonEvents::default().execution_mode(),
            ExecutionMode::WholeBatch
        );
        assert_eq!(
            NOccurrences::default().execution_mode(),
            ExecutionMode::PerDocument
        );
    }
}
