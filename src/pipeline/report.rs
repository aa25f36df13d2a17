//! Human-readable result blocks.

use std::fmt::Write as _;

use super::traits::NO_DISTANCE;
use crate::types::{AuthorScores, Document};

/// One line of a ranked listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedAuthor {
    pub placement: usize,
    pub author: String,
    pub score: f64,
}

/// Sort scores ascending and assign 1-based placements.
///
/// Equal scores share a placement; the placement advances only when the
/// score strictly increases. Authors with equal scores keep name order.
pub fn rank_scores(scores: &AuthorScores) -> Vec<RankedAuthor> {
    let mut entries: Vec<(&String, f64)> = scores.iter().map(|(a, s)| (a, *s)).collect();
    entries.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut placement = 0;
    let mut prev: Option<f64> = None;
    entries
        .into_iter()
        .map(|(author, score)| {
            if prev.map_or(true, |p| p < score) {
                placement += 1;
                prev = Some(score);
            }
            RankedAuthor {
                placement,
                author: author.clone(),
                score,
            }
        })
        .collect()
}

/// Module names that ran for one (embedding, analysis, distance) combination.
#[derive(Debug, Clone, Default)]
pub struct ReportModules<'a> {
    pub canonicizers: Vec<&'a str>,
    pub event_drivers: Vec<&'a str>,
    pub event_cullers: Vec<&'a str>,
    pub embedding: &'a str,
    pub analysis_method: &'a str,
    pub distance_function: &'a str,
}

impl ReportModules<'_> {
    /// `"<am> with <df>"`, or just the method when no distance is used.
    pub fn analysis_label(&self) -> String {
        if self.distance_function == NO_DISTANCE {
            self.analysis_method.to_string()
        } else {
            format!("{} with {}", self.analysis_method, self.distance_function)
        }
    }
}

/// Format the report block for one unknown document.
pub fn format_block(doc: &Document, modules: &ReportModules<'_>, scores: &AuthorScores) -> String {
    let mut out = format!("{} {}\nCanonicizers:\n", doc.title, doc.filepath);
    for name in &modules.canonicizers {
        let _ = writeln!(out, "\t{name}");
    }
    out.push_str("Event Drivers:\n");
    for name in &modules.event_drivers {
        let _ = writeln!(out, "\t{name}");
    }
    if !modules.event_cullers.is_empty() {
        out.push_str("Event Culling:\n");
        for name in &modules.event_cullers {
            let _ = writeln!(out, "\t{name}");
        }
    }
    let _ = writeln!(out, "Embedding:\n\t{}", modules.embedding);
    let _ = writeln!(out, "Analysis Method:\n\t{}", modules.analysis_label());
    for r in rank_scores(scores) {
        let _ = writeln!(out, "{}. {} {}", r.placement, r.author, r.score);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> AuthorScores {
        pairs.iter().map(|(a, s)| (a.to_string(), *s)).collect()
    }

    #[test]
    fn test_ties_share_placement() {
        let ranked = rank_scores(&scores(&[("A", 0.1), ("B", 0.1), ("C", 0.3)]));
        let placements: Vec<usize> = ranked.iter().map(|r| r.placement).collect();
        assert_eq!(placements, vec![1, 1, 2]);
        assert_eq!(ranked[2].author, "C");
    }

    #[test]
    fn test_ascending_order() {
        let ranked = rank_scores(&scores(&[("Z", 2.0), ("Y", -1.0), ("X", 0.5)]));
        let authors: Vec<&str> = ranked.iter().map(|r| r.author.as_str()).collect();
        assert_eq!(authors, vec!["Y", "X", "Z"]);
        assert_eq!(ranked.last().map(|r| r.placement), Some(3));
    }

    #[test]
    fn test_empty_scores() {
        assert!(rank_scores(&AuthorScores::new()).is_empty());
    }

    #[test]
    fn test_block_layout() {
        let doc = Document::unknown("corpus/u1.txt");
        let modules = ReportModules {
            canonicizers: vec!["UnifyCase"],
            event_drivers: vec!["CharacterNGrams"],
            event_cullers: vec![],
            embedding: "Frequency",
            analysis_method: "CentroidDriver",
            distance_function: "EuclideanDistance",
        };
        let block = format_block(&doc, &modules, &scores(&[("Alice", 0.25), ("Bob", 1.0)]));
        assert_eq!(
            block,
            "u1.txt corpus/u1.txt\nCanonicizers:\n\tUnifyCase\nEvent Drivers:\n\tCharacterNGrams\n\
             Embedding:\n\tFrequency\nAnalysis Method:\n\tCentroidDriver with EuclideanDistance\n\
             1. Alice 0.25\n2. Bob 1\n"
        );
    }

    #[test]
    fn test_no_distance_label() {
        let modules = ReportModules {
            analysis_method: "CrossEntropy",
            distance_function: NO_DISTANCE,
            ..Default::default()
        };
        assert_eq!(modules.analysis_label(), "CrossEntropy");
    }
}
