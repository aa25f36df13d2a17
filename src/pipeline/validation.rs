//! Precondition checks run after documents load and before any module runs.
//!
//! The engine runs every registered [`ValidationRule`] against a
//! [`ValidationContext`] and collects every error into a
//! [`ValidationReport`]. The orchestrator stops at the first error, in
//! rule order, and reports its message as the run's failure reason.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use gaap_engine::pipeline::validation::ValidationEngine;
//!
//! let report = ValidationEngine::with_defaults().validate(&ctx);
//! if let Some(err) = report.first_error() {
//!     eprintln!("{}", err.message);
//! }
//! ```

use serde::Serialize;
use std::collections::BTreeSet;

use super::error_code::ErrorCode;
use super::errors::ValidationError;
use super::traits::NO_DISTANCE;
use crate::types::Document;

// ─── Report ─────────────────────────────────────────────────────────────────

/// Collected errors from running all validation rules, in rule order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// The error the orchestrator reports: the first one, in rule order.
    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

// ─── Context ────────────────────────────────────────────────────────────────

/// One analysis method and the distance slot aligned with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistancePairing {
    pub method: String,
    pub needs_distance: bool,
    /// Display name in the slot, [`NO_DISTANCE`] for the sentinel, or
    /// `None` when the distance list is shorter than the method list.
    pub distance: Option<String>,
}

/// What the rules can see: the loaded documents and the configured plan.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub known: &'a [Document],
    pub unknown: &'a [Document],
    pub event_drivers: usize,
    pub embeddings: usize,
    pub pairings: &'a [DistancePairing],
}

// ─── Rule trait ─────────────────────────────────────────────────────────────

/// A stateless check over a [`ValidationContext`].
pub trait ValidationRule: Send + Sync {
    /// Short, stable identifier for this rule (e.g., `"test_set"`).
    fn name(&self) -> &str;

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError>;
}

// ─── Engine ─────────────────────────────────────────────────────────────────

/// Runs a set of [`ValidationRule`]s and collects every error.
pub struct ValidationEngine {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The default rule set, in the order the orchestrator reports them.
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        engine.add_rule(Box::new(TestSetRule));
        engine.add_rule(Box::new(TrainSetRule));
        engine.add_rule(Box::new(EmptyKnownTextRule));
        engine.add_rule(Box::new(RequiredModulesRule));
        engine.add_rule(Box::new(DistancePairingRule));
        engine
    }

    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationReport {
        let mut report = ValidationReport::default();
        for rule in &self.rules {
            report.errors.extend(rule.validate(ctx));
        }
        report
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Concrete rules
// ═══════════════════════════════════════════════════════════════════════════

// ─── 1. at least one unknown document ───────────────────────────────────────

struct TestSetRule;

impl ValidationRule for TestSetRule {
    fn name(&self) -> &str {
        "test_set"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        if !ctx.unknown.is_empty() {
            return vec![];
        }
        vec![ValidationError::new(
            ErrorCode::EmptyTestSet,
            "/documents/unknown",
            "No documents in the test set",
        )
        .with_hint("Add at least one document with an empty author")]
    }
}

// ─── 2. at least one known document ─────────────────────────────────────────

struct TrainSetRule;

impl ValidationRule for TrainSetRule {
    fn name(&self) -> &str {
        "train_set"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        if !ctx.known.is_empty() {
            return vec![];
        }
        vec![ValidationError::new(
            ErrorCode::EmptyTrainSet,
            "/documents/known",
            "No documents in the train set",
        )
        .with_hint("Add documents for at least one known author")]
    }
}

// ─── 3. no known document is blank ──────────────────────────────────────────

struct EmptyKnownTextRule;

impl ValidationRule for EmptyKnownTextRule {
    fn name(&self) -> &str {
        "empty_known_text"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        let authors: BTreeSet<&str> = ctx
            .known
            .iter()
            .filter(|d| d.text.trim().is_empty())
            .map(|d| d.author.as_str())
            .collect();
        if authors.is_empty() {
            return vec![];
        }
        let listed: Vec<&str> = authors.into_iter().collect();
        vec![ValidationError::new(
            ErrorCode::EmptyKnownText,
            "/documents/known",
            format!(
                "\nEmpty train set for these authors:\n{}\n",
                listed.join("\n")
            ),
        )]
    }
}

// ─── 4. event driver, embedding and analysis method present ─────────────────

struct RequiredModulesRule;

impl ValidationRule for RequiredModulesRule {
    fn name(&self) -> &str {
        "required_modules"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        let missing: Vec<&str> = [
            ("event drivers", ctx.event_drivers),
            ("embeddings", ctx.embeddings),
            ("analysis methods", ctx.pairings.len()),
        ]
        .into_iter()
        .filter(|(_, n)| *n == 0)
        .map(|(kind, _)| kind)
        .collect();
        if missing.is_empty() {
            return vec![];
        }
        vec![ValidationError::new(
            ErrorCode::MissingStage,
            "/modules",
            "Missing one or more of Event drivers, embedders, or analysis methods",
        )
        .with_hint(format!("Configure: {}", missing.join(", ")))]
    }
}

// ─── 5. distance slot agrees with each analysis method ──────────────────────

struct DistancePairingRule;

impl ValidationRule for DistancePairingRule {
    fn name(&self) -> &str {
        "distance_pairing"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
        let mut out = Vec::new();
        for (i, pairing) in ctx.pairings.iter().enumerate() {
            let slot = pairing.distance.as_deref();
            let consistent = match slot {
                None => false,
                Some(NO_DISTANCE) => !pairing.needs_distance,
                Some(_) => pairing.needs_distance,
            };
            if consistent {
                continue;
            }
            let hint = if pairing.needs_distance {
                "Pair this analysis method with a distance function"
            } else {
                "This analysis method takes no distance function; use NA"
            };
            out.push(
                ValidationError::new(
                    ErrorCode::DistanceMismatch,
                    format!("/modules/distance_functions/{i}"),
                    format!(
                        "Distance functions mismatch for {}. Distance function: \"{}\"",
                        pairing.method,
                        slot.unwrap_or("")
                    ),
                )
                .with_hint(hint),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(author: &str, text: &str) -> Document {
        Document::known(author, format!("{author}.txt")).with_text(text)
    }

    fn pairing(method: &str, needs: bool, df: Option<&str>) -> DistancePairing {
        DistancePairing {
            method: method.into(),
            needs_distance: needs,
            distance: df.map(str::to_string),
        }
    }

    struct Fixture {
        known: Vec<Document>,
        unknown: Vec<Document>,
        pairings: Vec<DistancePairing>,
    }

    impl Fixture {
        fn valid() -> Self {
            Self {
                known: vec![known("Alice", "some text"), known("Bob", "other text")],
                unknown: vec![Document::unknown("u.txt").with_text("who wrote this")],
                pairings: vec![pairing("CentroidDriver", true, Some("EuclideanDistance"))],
            }
        }

        fn ctx(&self) -> ValidationContext<'_> {
            ValidationContext {
                known: &self.known,
                unknown: &self.unknown,
                event_drivers: 1,
                embeddings: 1,
                pairings: &self.pairings,
            }
        }
    }

    fn engine() -> ValidationEngine {
        ValidationEngine::with_defaults()
    }

    #[test]
    fn test_valid_context() {
        let f = Fixture::valid();
        let report = engine().validate(&f.ctx());
        assert!(report.is_valid());
        assert!(report.is_empty());
    }

    #[test]
    fn test_empty_test_set_reported_first() {
        let mut f = Fixture::valid();
        f.unknown.clear();
        f.known.clear();
        let report = engine().validate(&f.ctx());
        assert_eq!(report.errors().count(), 2);
        let first = report.first_error().unwrap();
        assert_eq!(first.code, ErrorCode::EmptyTestSet);
        assert_eq!(first.message, "No documents in the test set");
    }

    #[test]
    fn test_empty_train_set() {
        let mut f = Fixture::valid();
        f.known.clear();
        let report = engine().validate(&f.ctx());
        assert_eq!(
            report.first_error().unwrap().message,
            "No documents in the train set"
        );
    }

    #[test]
    fn test_blank_known_text_lists_authors_once() {
        let mut f = Fixture::valid();
        f.known.push(known("Carol", "  \n"));
        f.known.push(known("Carol", ""));
        let report = engine().validate(&f.ctx());
        let err = report.first_error().unwrap();
        assert_eq!(err.code, ErrorCode::EmptyKnownText);
        assert_eq!(err.message, "\nEmpty train set for these authors:\nCarol\n");
    }

    #[test]
    fn test_missing_modules() {
        let mut f = Fixture::valid();
        f.pairings.clear();
        let mut ctx = f.ctx();
        ctx.embeddings = 0;
        let report = engine().validate(&ctx);
        let err = report.first_error().unwrap();
        assert_eq!(err.code, ErrorCode::MissingStage);
        assert_eq!(
            err.message,
            "Missing one or more of Event drivers, embedders, or analysis methods"
        );
        assert!(err.hint.as_deref().unwrap().contains("embeddings"));
    }

    #[test]
    fn test_no_distance_method_with_distance() {
        let mut f = Fixture::valid();
        f.pairings = vec![pairing("CrossEntropy", false, Some("CosineDistance"))];
        let report = engine().validate(&f.ctx());
        let err = report.first_error().unwrap();
        assert_eq!(err.code, ErrorCode::DistanceMismatch);
        assert_eq!(
            err.message,
            "Distance functions mismatch for CrossEntropy. Distance function: \"CosineDistance\""
        );
        assert_eq!(err.path, "/modules/distance_functions/0");
    }

    #[test]
    fn test_distance_method_with_sentinel() {
        let mut f = Fixture::valid();
        f.pairings = vec![
            pairing("CrossEntropy", false, Some(NO_DISTANCE)),
            pairing("CentroidDriver", true, Some(NO_DISTANCE)),
        ];
        let report = engine().validate(&f.ctx());
        assert_eq!(report.errors().count(), 1);
        assert_eq!(
            report.first_error().unwrap().path,
            "/modules/distance_functions/1"
        );
    }

    #[test]
    fn test_missing_distance_slot() {
        let mut f = Fixture::valid();
        f.pairings = vec![pairing("CentroidDriver", true, None)];
        let report = engine().validate(&f.ctx());
        assert_eq!(report.first_error().unwrap().code, ErrorCode::DistanceMismatch);
    }

    #[test]
    fn test_custom_rule() {
        struct SingleAuthorRule;
        impl ValidationRule for SingleAuthorRule {
            fn name(&self) -> &str {
                "single_author"
            }
            fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<ValidationError> {
                let authors: BTreeSet<&str> =
                    ctx.known.iter().map(|d| d.author.as_str()).collect();
                if authors.len() > 1 {
                    return vec![];
                }
                vec![ValidationError::new(
                    ErrorCode::Internal,
                    "/documents/known",
                    "need two candidate authors",
                )]
            }
        }

        let mut f = Fixture::valid();
        let mut eng = ValidationEngine::with_defaults();
        eng.add_rule(Box::new(SingleAuthorRule));
        assert!(eng.validate(&f.ctx()).is_valid());

        f.known.retain(|d| d.author == "Alice");
        let report = eng.validate(&f.ctx());
        assert_eq!(report.len(), 1);
        assert_eq!(report.first_error().unwrap().message, "need two candidate authors");
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut f = Fixture::valid();
        f.unknown.clear();
        let report = engine().validate(&f.ctx());
        let json = serde_json::to_value(&report).unwrap();
        let errors = json["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["code"], "empty_test_set");
        assert_eq!(errors[0]["path"], "/documents/unknown");
    }
}
