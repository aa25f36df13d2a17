//! Analysis methods. Every score map follows the same rule: lower is a
//! more likely author.

use std::collections::BTreeMap;

use crate::errors::{GaapError, Result};
use crate::pipeline::params::{ParamSpec, ParameterSet};
use crate::pipeline::traits::{AnalysisMethod, Described, DistanceSlot};
use crate::types::{AuthorScores, Document, Matrix};

fn check_rows(module: &str, docs: &[Document], numbers: &Matrix) -> Result<()> {
    if numbers.rows() != docs.len() {
        return Err(GaapError::module(
            module,
            format!(
                "got {} feature rows for {} documents",
                numbers.rows(),
                docs.len()
            ),
        ));
    }
    Ok(())
}

/// Turn a distance matrix into one score map per row.
fn scores_from_matrix(distances: &Matrix, labels: &[String]) -> Vec<AuthorScores> {
    distances
        .iter_rows()
        .map(|row| labels.iter().cloned().zip(row.iter().copied()).collect())
        .collect()
}

// ============================================================================
// Centroid
// ============================================================================

/// Distance from each unknown document to every author's mean feature row.
pub struct CentroidDriver {
    params: ParameterSet,
    distance: DistanceSlot,
    authors: Vec<String>,
    centroids: Matrix,
}

impl Default for CentroidDriver {
    fn default() -> Self {
        Self {
            params: ParameterSet::empty(Self::NAME),
            distance: DistanceSlot::NotApplicable,
            authors: Vec::new(),
            centroids: Matrix::default(),
        }
    }
}

impl Described for CentroidDriver {
    const NAME: &'static str = "CentroidDriver";
    const DESCRIPTION: &'static str =
        "Computes one centroid per author from the known documents, then the distance from each unknown document to every centroid.";
}

impl_module!(CentroidDriver);

impl AnalysisMethod for CentroidDriver {
    fn set_distance_function(&mut self, slot: DistanceSlot) {
        self.distance = slot;
    }

    fn train(&mut self, known: &[Document], numbers: &Matrix) -> Result<()> {
        check_rows(Self::NAME, known, numbers)?;
        let mut sums: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();
        for (doc, row) in known.iter().zip(numbers.iter_rows()) {
            let entry = sums
                .entry(doc.author.as_str())
                .or_insert_with(|| (vec![0.0; numbers.cols()], 0));
            entry.0.iter_mut().zip(row).for_each(|(s, v)| *s += v);
            entry.1 += 1;
        }
        self.authors = sums.keys().map(|a| a.to_string()).collect();
        self.centroids = Matrix::from_rows(
            sums.into_values()
                .map(|(sum, n)| sum.into_iter().map(|s| s / n as f64).collect())
                .collect(),
        )?;
        Ok(())
    }

    fn analyze(&self, unknown: &[Document], numbers: &Matrix) -> Result<Vec<AuthorScores>> {
        check_rows(Self::NAME, unknown, numbers)?;
        let df = self.distance.require(Self::NAME)?;
        let distances = df.distance(numbers, &self.centroids)?;
        Ok(scores_from_matrix(&distances, &self.authors))
    }
}

// ============================================================================
// K nearest neighbours
// ============================================================================

/// Majority vote among the `k` nearest known documents.
///
/// The score is `max_votes - votes + tie`, where `tie` is the average or
/// minimum neighbour distance for the author scaled into `[0, 0.5]`. The
/// tie term can therefore reorder authors only when their votes are equal.
pub struct KNearestNeighbors {
    params: ParameterSet,
    distance: DistanceSlot,
    labels: Vec<String>,
    embeddings: Matrix,
}

impl KNearestNeighbors {
    const TIE_BREAKERS: [&'static str; 2] = ["average", "minimum"];
}

impl Default for KNearestNeighbors {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![
                    ParamSpec::int_range("k", 1, 20, 5),
                    ParamSpec::choice("tie_breaker", &Self::TIE_BREAKERS, "average"),
                ],
            ),
            distance: DistanceSlot::NotApplicable,
            labels: Vec::new(),
            embeddings: Matrix::default(),
        }
    }
}

impl Described for KNearestNeighbors {
    const NAME: &'static str = "KNearestNeighbors";
    const DESCRIPTION: &'static str = "Finds the K nearest known documents and ranks authors by votes.\n\
        Tie breakers:\n\taverage: smallest average distance\n\tminimum: closest single document.";
}

impl_module!(KNearestNeighbors);

impl AnalysisMethod for KNearestNeighbors {
    fn set_distance_function(&mut self, slot: DistanceSlot) {
        self.distance = slot;
    }

    fn train(&mut self, known: &[Document], numbers: &Matrix) -> Result<()> {
        check_rows(Self::NAME, known, numbers)?;
        self.labels = known.iter().map(|d| d.author.clone()).collect();
        self.embeddings = numbers.clone();
        Ok(())
    }

    fn analyze(&self, unknown: &[Document], numbers: &Matrix) -> Result<Vec<AuthorScores>> {
        check_rows(Self::NAME, unknown, numbers)?;
        let df = self.distance.require(Self::NAME)?;
        let k = self.params.int("k")? as usize;
        let use_min = self.params.text("tie_breaker")? == "minimum";
        let distances = df.distance(numbers, &self.embeddings)?;

        let mut out = Vec::with_capacity(unknown.len());
        for row in distances.iter_rows() {
            let mut neighbours: Vec<(f64, &str)> = row
                .iter()
                .copied()
                .zip(self.labels.iter().map(String::as_str))
                .collect();
            neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            neighbours.truncate(k);

            let mut by_author: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for (d, author) in neighbours {
                by_author.entry(author).or_default().push(d);
            }
            let tallies: Vec<(&str, usize, f64)> = by_author
                .into_iter()
                .map(|(author, ds)| {
                    let tie = if use_min {
                        ds.iter().copied().fold(f64::INFINITY, f64::min)
                    } else {
                        ds.iter().sum::<f64>() / ds.len() as f64
                    };
                    (author, ds.len(), tie)
                })
                .collect();
            let max_votes = tallies.iter().map(|t| t.1).max().unwrap_or(0);
            let max_tie = tallies.iter().map(|t| t.2).fold(0.0, f64::max);

            out.push(
                tallies
                    .into_iter()
                    .map(|(author, votes, tie)| {
                        let scaled = if max_tie > 0.0 { tie / (2.0 * max_tie) } else { 0.0 };
                        (author.to_string(), (max_votes - votes) as f64 + scaled)
                    })
                    .collect(),
            );
        }
        Ok(out)
    }
}

// ============================================================================
// Cross entropy
// ============================================================================

/// Discrete cross entropy between known and unknown feature distributions.
/// Takes no distance function.
pub struct CrossEntropy {
    params: ParameterSet,
    /// One entry per author (`author` mode) or per document (`document` mode).
    profiles: Vec<(String, Vec<f64>)>,
}

impl CrossEntropy {
    const MODES: [&'static str; 2] = ["author", "document"];
}

/// Scale a row to sum 1; all-zero rows stay zero.
fn to_distribution(row: &[f64]) -> Vec<f64> {
    let total: f64 = row.iter().sum();
    if total > 0.0 {
        row.iter().map(|v| v / total).collect()
    } else {
        row.to_vec()
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![ParamSpec::choice("mode", &Self::MODES, "author")],
            ),
            profiles: Vec::new(),
        }
    }
}

impl Described for CrossEntropy {
    const NAME: &'static str = "CrossEntropy";
    const DESCRIPTION: &'static str = "Discrete cross entropy of the unknown document against each author.";
}

impl_module!(CrossEntropy);

impl AnalysisMethod for CrossEntropy {
    fn needs_distance_function(&self) -> bool {
        false
    }

    fn set_distance_function(&mut self, _slot: DistanceSlot) {}

    fn train(&mut self, known: &[Document], numbers: &Matrix) -> Result<()> {
        check_rows(Self::NAME, known, numbers)?;
        let per_document: Vec<(String, Vec<f64>)> = known
            .iter()
            .zip(numbers.iter_rows())
            .map(|(doc, row)| (doc.author.clone(), to_distribution(row)))
            .collect();

        self.profiles = if self.params.text("mode")? == "document" {
            per_document
        } else {
            let mut sums: BTreeMap<String, (Vec<f64>, usize)> = BTreeMap::new();
            for (author, dist) in per_document {
                let entry = sums
                    .entry(author)
                    .or_insert_with(|| (vec![0.0; numbers.cols()], 0));
                entry.0.iter_mut().zip(&dist).for_each(|(s, v)| *s += v);
                entry.1 += 1;
            }
            sums.into_iter()
                .map(|(author, (sum, n))| (author, sum.into_iter().map(|s| s / n as f64).collect()))
                .collect()
        };
        Ok(())
    }

    fn analyze(&self, unknown: &[Document], numbers: &Matrix) -> Result<Vec<AuthorScores>> {
        check_rows(Self::NAME, unknown, numbers)?;
        Ok(numbers
            .iter_rows()
            .map(|row| {
                let q = to_distribution(row);
                let mut scores = AuthorScores::new();
                for (author, p) in &self.profiles {
                    // events absent from the unknown document contribute nothing
                    let h: f64 = p
                        .iter()
                        .zip(&q)
                        .filter(|(pi, qi)| **pi > 0.0 && **qi > 0.0)
                        .map(|(pi, qi)| -pi * qi.ln())
                        .sum();
                    scores
                        .entry(author.clone())
                        .and_modify(|s: &mut f64| *s = s.min(h))
                        .or_insert(h);
                }
                scores
            })
            .collect())
    }
}
