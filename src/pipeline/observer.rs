//! Progress observation for experiment runs.
//!
//! The orchestrator reports progress through an [`ExperimentObserver`]:
//! stage status text, indeterminate/determinate mode switches, percentages,
//! intermediate snapshots, and the final result. The process bridge
//! implements the trait by writing wire frames; tests use
//! [`RecordingObserver`].
//!
//! [`ProgressEvent`] is the value that crosses process boundaries. On the
//! wire it is a bare JSON scalar: a string (status text), a boolean
//! (indeterminate on/off), a number in `[0, 100]` (percent), or `-1`
//! (the completion sentinel).

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::artifacts::{ExperimentResult, IntermediateSnapshot};

// ─── Progress events ────────────────────────────────────────────────────────

/// One message on the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireProgress", from = "WireProgress")]
pub enum ProgressEvent {
    /// Entering a named stage or sub-step.
    Status(String),
    /// `true` switches to an indeterminate spinner, `false` back to determinate.
    Indeterminate(bool),
    /// Determinate progress, clamped to `[0, 100]`.
    Percent(f64),
    /// Sent exactly once, last.
    Finished,
}

impl ProgressEvent {
    pub const SENTINEL: f64 = -1.0;

    pub fn percent(value: f64) -> Self {
        let value = if value.is_finite() { value } else { 0.0 };
        ProgressEvent::Percent(value.clamp(0.0, 100.0))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ProgressEvent::Finished)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireProgress {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl From<ProgressEvent> for WireProgress {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Status(s) => WireProgress::Text(s),
            ProgressEvent::Indeterminate(b) => WireProgress::Flag(b),
            ProgressEvent::Percent(p) => WireProgress::Number(p),
            ProgressEvent::Finished => WireProgress::Number(ProgressEvent::SENTINEL),
        }
    }
}

impl From<WireProgress> for ProgressEvent {
    fn from(wire: WireProgress) -> Self {
        match wire {
            WireProgress::Text(s) => ProgressEvent::Status(s),
            WireProgress::Flag(b) => ProgressEvent::Indeterminate(b),
            WireProgress::Number(n) if n == ProgressEvent::SENTINEL => ProgressEvent::Finished,
            WireProgress::Number(n) => ProgressEvent::percent(n),
        }
    }
}

// ─── Observer trait ─────────────────────────────────────────────────────────

/// Receives progress notifications from a running experiment.
///
/// All methods default to no-ops. `on_complete` is called exactly once per
/// run, after every other notification.
pub trait ExperimentObserver {
    fn on_status(&mut self, _text: &str) {}

    fn on_indeterminate(&mut self, _active: bool) {}

    fn on_percent(&mut self, _percent: f64) {}

    /// Whether the orchestrator should build snapshots for this observer.
    /// Snapshots clone document state, so they are opt-in.
    fn wants_snapshots(&self) -> bool {
        false
    }

    fn on_snapshot(&mut self, _snapshot: &IntermediateSnapshot) {}

    fn on_complete(&mut self, _result: &ExperimentResult) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExperimentObserver for NoopObserver {}

/// Observer that records every notification as a [`ProgressEvent`], in order.
///
/// `on_complete` appends [`ProgressEvent::Finished`] and stores the result,
/// mirroring what the process bridge delivers to a caller.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub events: Vec<ProgressEvent>,
    pub snapshots: Vec<IntermediateSnapshot>,
    pub results: Vec<ExperimentResult>,
    capture_snapshots: bool,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: also capture intermediate snapshots
    pub fn with_snapshots(mut self) -> Self {
        self.capture_snapshots = true;
        self
    }

    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            ProgressEvent::Status(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

impl ExperimentObserver for RecordingObserver {
    fn on_status(&mut self, text: &str) {
        self.events.push(ProgressEvent::Status(text.to_string()));
    }

    fn on_indeterminate(&mut self, active: bool) {
        self.events.push(ProgressEvent::Indeterminate(active));
    }

    fn on_percent(&mut self, percent: f64) {
        self.events.push(ProgressEvent::percent(percent));
    }

    fn wants_snapshots(&self) -> bool {
        self.capture_snapshots
    }

    fn on_snapshot(&mut self, snapshot: &IntermediateSnapshot) {
        self.snapshots.push(snapshot.clone());
    }

    fn on_complete(&mut self, result: &ExperimentResult) {
        self.results.push(result.clone());
        self.events.push(ProgressEvent::Finished);
    }
}

// ─── Stage timing ───────────────────────────────────────────────────────────

/// Wall-clock timer for one orchestrator stage.
pub struct StageClock {
    start: Instant,
}

impl StageClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        let events = vec![
            ProgressEvent::Status("Getting documents".into()),
            ProgressEvent::Indeterminate(true),
            ProgressEvent::Percent(50.0),
            ProgressEvent::Finished,
        ];
        let json = serde_json::to_string(&events).unwrap();
        assert_eq!(json, r#"["Getting documents",true,50.0,-1.0]"#);
        let back: Vec<ProgressEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, events);
    }

    #[test]
    fn test_integer_sentinel_decodes() {
        let event: ProgressEvent = serde_json::from_str("-1").unwrap();
        assert!(event.is_finished());
        let zero: ProgressEvent = serde_json::from_str("0").unwrap();
        assert_eq!(zero, ProgressEvent::Percent(0.0));
    }

    #[test]
    fn test_percent_clamped() {
        assert_eq!(ProgressEvent::percent(140.0), ProgressEvent::Percent(100.0));
        assert_eq!(ProgressEvent::percent(-5.0), ProgressEvent::Percent(0.0));
        assert_eq!(ProgressEvent::percent(f64::NAN), ProgressEvent::Percent(0.0));
    }

    #[test]
    fn test_recording_observer_appends_sentinel() {
        let mut obs = RecordingObserver::new();
        obs.on_status("Running canonicizers\nUnifyCase");
        obs.on_percent(10.0);
        obs.on_complete(&ExperimentResult::failure("boom"));
        assert_eq!(obs.events.last(), Some(&ProgressEvent::Finished));
        assert_eq!(obs.results.len(), 1);
        assert_eq!(obs.statuses().count(), 1);
        assert!(!obs.wants_snapshots());
    }
}
