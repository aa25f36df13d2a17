//! Child side of the bridge: run one request, stream frames to stdout.

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

use super::protocol::WorkerFrame;
use crate::errors::{GaapError, Result};
use crate::pipeline::artifacts::{ExperimentResult, IntermediateSnapshot, Status};
use crate::pipeline::observer::{ExperimentObserver, ProgressEvent};
use crate::pipeline::registry::ModuleRegistry;
use crate::pipeline::request::ExperimentRequest;
use crate::pipeline::runner::run_request;

/// Observer that writes every notification as a [`WorkerFrame`] line.
///
/// Write failures are remembered rather than propagated; the first one is
/// returned by [`WireObserver::finish`].
pub struct WireObserver<W: Write> {
    out: W,
    completed: bool,
    write_error: Option<std::io::Error>,
}

impl<W: Write> WireObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            completed: false,
            write_error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn send(&mut self, frame: WorkerFrame) {
        if self.write_error.is_some() {
            return;
        }
        let line = match frame.to_line() {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "failed to encode frame");
                return;
            }
        };
        let written = writeln!(self.out, "{line}").and_then(|()| self.out.flush());
        if let Err(err) = written {
            error!(error = %err, "failed to write frame");
            self.write_error = Some(err);
        }
    }

    fn progress(&mut self, event: ProgressEvent) {
        if self.completed {
            return;
        }
        debug!(?event, "progress");
        self.send(WorkerFrame::Progress(event));
    }

    /// Surface the first write error, if any.
    pub fn finish(self) -> Result<()> {
        match self.write_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl<W: Write> ExperimentObserver for WireObserver<W> {
    fn on_status(&mut self, text: &str) {
        self.progress(ProgressEvent::Status(text.to_string()));
    }

    fn on_indeterminate(&mut self, active: bool) {
        self.progress(ProgressEvent::Indeterminate(active));
    }

    fn on_percent(&mut self, percent: f64) {
        self.progress(ProgressEvent::percent(percent));
    }

    fn wants_snapshots(&self) -> bool {
        true
    }

    fn on_snapshot(&mut self, snapshot: &IntermediateSnapshot) {
        if self.completed {
            return;
        }
        self.send(WorkerFrame::Snapshot(Box::new(snapshot.clone())));
    }

    /// Result first, then the sentinel; nothing is written afterwards.
    fn on_complete(&mut self, result: &ExperimentResult) {
        if self.completed {
            return;
        }
        self.send(WorkerFrame::Result(Box::new(result.clone())));
        self.send(WorkerFrame::Progress(ProgressEvent::Finished));
        self.completed = true;
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Read one JSON request from `input`, run it, and stream frames to `output`.
///
/// Always emits exactly one result frame followed by one sentinel, even
/// when the request is malformed or the orchestrator panics.
pub fn run_worker<R: Read, W: Write>(
    registry: &ModuleRegistry,
    mut input: R,
    output: W,
) -> Result<Status> {
    let mut observer = WireObserver::new(output);
    let mut raw = String::new();
    let request = input
        .read_to_string(&mut raw)
        .map_err(GaapError::from)
        .and_then(|_| ExperimentRequest::from_json(&raw));

    let status = match request {
        Ok(request) => {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                run_request(registry, request, &mut observer)
            }));
            match outcome {
                Ok(result) => result.status,
                Err(payload) => {
                    let text = panic_text(payload.as_ref());
                    error!(panic = %text, "experiment panicked");
                    let result =
                        ExperimentResult::failure(format!("Experiment worker panicked:\n{text}"));
                    observer.on_complete(&result);
                    result.status
                }
            }
        }
        Err(err) => {
            let result = ExperimentResult::failure(format!("Invalid experiment request:\n{err}"));
            observer.on_complete(&result);
            result.status
        }
    };
    observer.finish()?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(output: &[u8]) -> Vec<WorkerFrame> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| WorkerFrame::parse(l).unwrap())
            .collect()
    }

    #[test]
    fn test_malformed_request_still_completes() {
        let registry = ModuleRegistry::with_builtin();
        let mut out = Vec::new();
        let status = run_worker(&registry, "{not json".as_bytes(), &mut out).unwrap();
        assert_eq!(status, Status::Failure);
        let frames = frames(&out);
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            WorkerFrame::Result(r) => assert!(r.message.starts_with("Invalid experiment request")),
            other => panic!("expected result frame, got {other:?}"),
        }
        assert_eq!(frames[1], WorkerFrame::Progress(ProgressEvent::Finished));
    }

    #[test]
    fn test_empty_request_reports_validation_failure() {
        let registry = ModuleRegistry::with_builtin();
        let mut out = Vec::new();
        run_worker(&registry, "{}".as_bytes(), &mut out).unwrap();
        let frames = frames(&out);
        assert_eq!(
            frames[0],
            WorkerFrame::Progress(ProgressEvent::Status("Getting documents".into()))
        );
        let result = frames
            .iter()
            .find_map(|f| match f {
                WorkerFrame::Result(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(result.message, "No documents in the test set");
        assert_eq!(frames.last(), Some(&WorkerFrame::Progress(ProgressEvent::Finished)));
    }

    #[test]
    fn test_complete_is_one_shot() {
        let mut out = Vec::new();
        {
            let mut obs = WireObserver::new(&mut out);
            obs.on_complete(&ExperimentResult::failure("a"));
            obs.on_complete(&ExperimentResult::failure("b"));
            obs.on_status("late");
            assert!(obs.is_completed());
        }
        let frames = frames(&out);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], WorkerFrame::Progress(ProgressEvent::Finished));
    }
}
