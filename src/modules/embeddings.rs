//! Embeddings: event sets to the shared feature matrix.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

use crate::errors::{GaapError, Result};
use crate::pipeline::params::{ParamSpec, ParameterSet, Widget};
use crate::pipeline::traits::{Described, Embedding, StageContext};
use crate::types::{Document, Matrix};

/// Event frequency vectors over a lexicographically sorted vocabulary.
///
/// The vocabulary is fitted on the known documents (or on all documents),
/// optionally capped to the `max_features` most frequent events, and every
/// document is then counted against it. Unknown-only events are dropped in
/// the default mode.
pub struct Frequency {
    params: ParameterSet,
}

impl Frequency {
    const NORMALIZATION: [&'static str; 3] = ["None", "Per-document max", "Global max"];
    const VOCABULARY: [&'static str; 2] = ["Known events only", "All"];

    fn vocabulary(&self, docs: &[Document]) -> Result<Vec<String>> {
        let all = self.params.text("vocabulary")? == "All";
        let binary = self.params.flag("binary")?;
        let max_features = self.params.int("max_features")? as usize;

        let mut totals: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in docs.iter().filter(|d| all || !d.is_unknown()) {
            if binary {
                let mut seen: Vec<&str> = doc.event_set.iter().map(String::as_str).collect();
                seen.sort_unstable();
                seen.dedup();
                for e in seen {
                    *totals.entry(e).or_insert(0) += 1;
                }
            } else {
                for e in &doc.event_set {
                    *totals.entry(e.as_str()).or_insert(0) += 1;
                }
            }
        }
        if totals.is_empty() {
            return Err(GaapError::module(
                Self::NAME,
                "vocabulary is empty; no events in the fitted documents",
            ));
        }

        let mut features: Vec<&str> = if max_features > 0 && totals.len() > max_features {
            let mut ranked: Vec<(&str, usize)> = totals.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            ranked.truncate(max_features);
            ranked.into_iter().map(|(e, _)| e).collect()
        } else {
            totals.into_keys().collect()
        };
        features.sort_unstable();
        Ok(features.into_iter().map(str::to_string).collect())
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![
                    ParamSpec::choice("normalization", &Self::NORMALIZATION, "Per-document max"),
                    ParamSpec::int_range("max_features", 0, 100_000, 0).with_widget(Widget::Slider),
                    ParamSpec::choice("vocabulary", &Self::VOCABULARY, "Known events only"),
                    ParamSpec::flag("binary", false),
                ],
            ),
        }
    }
}

impl Described for Frequency {
    const NAME: &'static str = "Frequency";
    const DESCRIPTION: &'static str = "Converts events to their frequencies.\n\
        Max features: only tally the top n events by raw count; zero tallies all.\n\
        Binary: use 0/1 for event presence instead of counts.";
}

impl_module!(Frequency);

impl Embedding for Frequency {
    fn embed(&self, docs: &[Document], ctx: &mut StageContext<'_>) -> Result<Matrix> {
        let features = self.vocabulary(docs)?;
        let index: FxHashMap<&str, usize> = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect();
        let binary = self.params.flag("binary")?;

        let mut matrix = Matrix::zeros(docs.len(), features.len());
        let total = docs.len().max(1) as f64;
        for (i, doc) in docs.iter().enumerate() {
            let row = matrix.row_mut(i);
            for e in &doc.event_set {
                if let Some(&j) = index.get(e.as_str()) {
                    row[j] = if binary { 1.0 } else { row[j] + 1.0 };
                }
            }
            ctx.progress.on_percent(100.0 * (i + 1) as f64 / total);
        }

        match self.params.text("normalization")? {
            "Per-document max" => {
                for i in 0..matrix.rows() {
                    let row = matrix.row_mut(i);
                    let max = row.iter().copied().fold(0.0, f64::max);
                    if max > 0.0 {
                        row.iter_mut().for_each(|v| *v /= max);
                    }
                }
            }
            "Global max" => {
                let max = matrix
                    .iter_rows()
                    .flat_map(|r| r.iter().copied())
                    .fold(0.0, f64::max);
                if max > 0.0 {
                    for i in 0..matrix.rows() {
                        matrix.row_mut(i).iter_mut().for_each(|v| *v /= max);
                    }
                }
            }
            _ => {}
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::observer::NoopObserver;
    use crate::pipeline::params::ParamValue;
    use crate::pipeline::pool::WorkerPool;
    use crate::pipeline::traits::Module;
    use crate::types::GlobalParameters;

    fn doc(author: &str, events: &[&str]) -> Document {
        let mut d = Document::known(author, format!("{author}.txt"));
        d.event_set = events.iter().map(|s| s.to_string()).collect();
        d
    }

    fn embed(f: &Frequency, docs: &mut [Document]) -> Result<Matrix> {
        let pool = WorkerPool::sequential();
        let mut obs = NoopObserver;
        let globals = GlobalParameters::default();
        let mut ctx = StageContext {
            pool: &pool,
            progress: &mut obs,
            globals: &globals,
        };
        f.process(docs, &mut ctx)
    }

    #[test]
    fn test_raw_counts_sorted_vocabulary() {
        let mut f = Frequency::default();
        f.set_param("normalization", "None".into()).unwrap();
        let mut docs = vec![doc("A", &["b", "a", "b"]), doc("B", &["c"])];
        let m = embed(&f, &mut docs).unwrap();
        assert_eq!(m.cols(), 3);
        assert_eq!(m.row(0), &[1.0, 2.0, 0.0]);
        assert_eq!(docs[1].numbers, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_per_document_max() {
        let mut docs = vec![doc("A", &["a", "b", "b"])];
        let m = embed(&Frequency::default(), &mut docs).unwrap();
        assert_eq!(m.row(0), &[0.5, 1.0]);
    }

    #[test]
    fn test_known_vocabulary_drops_unknown_events() {
        let mut f = Frequency::default();
        f.set_param("normalization", "None".into()).unwrap();
        let mut docs = vec![doc("A", &["a"]), doc("", &["a", "z"])];
        let m = embed(&f, &mut docs).unwrap();
        assert_eq!(m.cols(), 1);
        assert_eq!(m.row(1), &[1.0]);

        f.set_param("vocabulary", "All".into()).unwrap();
        assert_eq!(embed(&f, &mut docs).unwrap().cols(), 2);
    }

    #[test]
    fn test_zero_row_stays_zero() {
        let mut docs = vec![doc("A", &["a"]), doc("", &["z"])];
        let m = embed(&Frequency::default(), &mut docs).unwrap();
        assert_eq!(m.row(1), &[0.0]);
    }

    #[test]
    fn test_max_features_and_binary() {
        let mut f = Frequency::default();
        f.set_param("normalization", "None".into()).unwrap();
        f.set_param("max_features", ParamValue::Int(1)).unwrap();
        f.set_param("binary", ParamValue::Bool(true)).unwrap();
        let mut docs = vec![doc("A", &["a", "b", "b"]), doc("B", &["b"])];
        let m = embed(&f, &mut docs).unwrap();
        assert_eq!(m.cols(), 1);
        assert_eq!(m.row(0), &[1.0]);
    }

    #[test]
    fn test_empty_vocabulary_fails() {
        let mut docs = vec![doc("A", &[])];
        assert!(embed(&Frequency::default(), &mut docs).is_err());
    }
}
