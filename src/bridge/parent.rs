//! Parent side of the bridge: spawn a worker process and demultiplex its frames.
//!
//! | Frame | Delivered through |
//! |-------|-------------------|
//! | progress | `mpsc` channel, read with [`ExperimentHandle::next_progress`] |
//! | snapshot | `watch` channel holding only the latest snapshot |
//! | result | `oneshot` channel, read once by [`ExperimentHandle::wait`] |
//!
//! A worker that dies without finishing still produces exactly one `-1`
//! sentinel and one `status=1` result, synthesized here from its exit
//! status and stderr.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::WorkerFrame;
use crate::errors::{GaapError, Result};
use crate::pipeline::artifacts::{ExperimentResult, IntermediateSnapshot};
use crate::pipeline::observer::ProgressEvent;
use crate::pipeline::request::ExperimentRequest;

// ─── Worker command ─────────────────────────────────────────────────────────

/// How to launch a worker process.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// `<program> worker`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["worker".to_string()],
        }
    }

    /// The running executable's own `worker` subcommand.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Builder method: replace the argument list
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

// ─── Outcome ────────────────────────────────────────────────────────────────

/// How a bridged run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentOutcome {
    Completed(ExperimentResult),
    /// The caller aborted; `intermediate` is the latest snapshot salvaged
    /// before the worker was killed.
    Aborted {
        intermediate: Option<IntermediateSnapshot>,
    },
}

impl ExperimentOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, ExperimentOutcome::Aborted { .. })
    }

    pub fn result(&self) -> Option<&ExperimentResult> {
        match self {
            ExperimentOutcome::Completed(result) => Some(result),
            ExperimentOutcome::Aborted { .. } => None,
        }
    }
}

// ─── Bridge ─────────────────────────────────────────────────────────────────

/// Launches experiments in separate worker processes.
#[derive(Debug, Clone)]
pub struct ExperimentBridge {
    command: WorkerCommand,
}

impl ExperimentBridge {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }

    /// Spawn a worker, hand it `request`, and return a handle to the run.
    pub async fn start(&self, request: &ExperimentRequest) -> Result<ExperimentHandle> {
        let payload = request.to_json()?;
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GaapError::internal(format!(
                    "failed to spawn worker {}: {e}",
                    self.command.program.display()
                ))
            })?;
        info!(pid = child.id(), "experiment worker started");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GaapError::internal("worker stdin unavailable"))?;
        tokio::spawn(async move {
            let written = async {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await
            };
            if let Err(err) = written.await {
                warn!(error = %err, "failed to send request to worker");
            }
        });

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (result_tx, result_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let channels = FrameChannels {
            progress: progress_tx,
            snapshot: snapshot_tx,
            result: Some(result_tx),
            finished: false,
        };
        let supervisor = tokio::spawn(supervise(child, channels, kill_rx));

        Ok(ExperimentHandle {
            progress: progress_rx,
            snapshot: snapshot_rx,
            result: result_rx,
            kill: Some(kill_tx),
            supervisor,
            drain_timeout: Duration::from_millis(request.engine.abort_drain_timeout_ms),
            finished: false,
        })
    }
}

// ─── Handle ─────────────────────────────────────────────────────────────────

/// A running bridged experiment.
///
/// Dropping the handle kills the worker.
pub struct ExperimentHandle {
    progress: mpsc::UnboundedReceiver<ProgressEvent>,
    snapshot: watch::Receiver<Option<IntermediateSnapshot>>,
    result: oneshot::Receiver<ExperimentResult>,
    kill: Option<oneshot::Sender<()>>,
    supervisor: JoinHandle<()>,
    drain_timeout: Duration,
    finished: bool,
}

impl ExperimentHandle {
    /// Next progress event; `None` once the sentinel has been delivered.
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        let event = self.progress.recv().await?;
        self.finished = event.is_finished();
        Some(event)
    }

    /// Non-blocking poll: `None` when nothing is pending or after the sentinel.
    pub fn try_progress(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        let event = self.progress.try_recv().ok()?;
        self.finished = event.is_finished();
        Some(event)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The most recent snapshot published so far.
    pub fn latest_snapshot(&self) -> Option<IntermediateSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Wait for the run's result.
    pub async fn wait(mut self) -> Result<ExperimentOutcome> {
        let result = (&mut self.result)
            .await
            .map_err(|_| GaapError::internal("worker supervisor exited without a result"))?;
        if let Err(err) = (&mut self.supervisor).await {
            warn!(error = %err, "worker supervisor task failed");
        }
        Ok(ExperimentOutcome::Completed(result))
    }

    /// Salvage the latest snapshot, then kill the worker.
    ///
    /// If no snapshot has arrived yet, waits up to the configured drain
    /// window for one. A result that is already available wins over the
    /// abort.
    pub async fn abort(mut self) -> Result<ExperimentOutcome> {
        if let Ok(result) = self.result.try_recv() {
            return Ok(ExperimentOutcome::Completed(result));
        }
        if self.snapshot.borrow().is_none() {
            let _ = tokio::time::timeout(self.drain_timeout, self.snapshot.changed()).await;
        }
        let intermediate = self.snapshot.borrow().clone();

        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        if let Err(err) = (&mut self.supervisor).await {
            warn!(error = %err, "worker supervisor task failed");
        }
        info!(salvaged = intermediate.is_some(), "experiment aborted");
        Ok(ExperimentOutcome::Aborted { intermediate })
    }
}

// ─── Supervisor ─────────────────────────────────────────────────────────────

struct FrameChannels {
    progress: mpsc::UnboundedSender<ProgressEvent>,
    snapshot: watch::Sender<Option<IntermediateSnapshot>>,
    result: Option<oneshot::Sender<ExperimentResult>>,
    finished: bool,
}

impl FrameChannels {
    fn dispatch(&mut self, line: &str) {
        match WorkerFrame::parse(line) {
            Ok(WorkerFrame::Progress(event)) => {
                if self.finished {
                    debug!(?event, "progress after sentinel dropped");
                    return;
                }
                self.finished = event.is_finished();
                let _ = self.progress.send(event);
            }
            Ok(WorkerFrame::Snapshot(snapshot)) => {
                debug!(stage = %snapshot.stage, "snapshot received");
                self.snapshot.send_replace(Some(*snapshot));
            }
            Ok(WorkerFrame::Result(result)) => match self.result.take() {
                Some(tx) => {
                    let _ = tx.send(*result);
                }
                None => warn!("duplicate result frame dropped"),
            },
            Err(err) => debug!(error = %err, line, "ignoring non-frame output"),
        }
    }

    /// Fill in whatever the worker failed to send before exiting.
    fn finish(&mut self, status: std::io::Result<ExitStatus>, stderr: &str) {
        if let Some(tx) = self.result.take() {
            let exit = match status {
                Ok(status) => status.to_string(),
                Err(err) => err.to_string(),
            };
            warn!(%exit, "worker exited without a result");
            let message = format!("Experiment worker exited without a result ({exit})\n{stderr}");
            let _ = tx.send(ExperimentResult::failure(message.trim_end()));
        }
        if !self.finished {
            self.finished = true;
            let _ = self.progress.send(ProgressEvent::Finished);
        }
    }
}

async fn supervise(mut child: Child, mut channels: FrameChannels, mut kill: oneshot::Receiver<()>) {
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut text).await;
        }
        text
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = &mut kill => {
                    if let Err(err) = child.kill().await {
                        warn!(error = %err, "failed to kill worker");
                    }
                    debug!("worker killed");
                    return;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => channels.dispatch(&line),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "worker stdout read failed");
                        break;
                    }
                },
            }
        }
    }

    let status = child.wait().await;
    let stderr = stderr_task.await.unwrap_or_default();
    debug!(?status, "worker exited");
    channels.finish(status, &stderr);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> (
        FrameChannels,
        mpsc::UnboundedReceiver<ProgressEvent>,
        oneshot::Receiver<ExperimentResult>,
    ) {
        let (progress, progress_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(None);
        let (result, result_rx) = oneshot::channel();
        (
            FrameChannels {
                progress,
                snapshot,
                result: Some(result),
                finished: false,
            },
            progress_rx,
            result_rx,
        )
    }

    #[test]
    fn test_dispatch_stops_after_sentinel() {
        let (mut ch, mut rx, _) = channels();
        ch.dispatch(r#"{"channel":"progress","payload":"Getting documents"}"#);
        ch.dispatch(r#"{"channel":"progress","payload":-1}"#);
        ch.dispatch(r#"{"channel":"progress","payload":50}"#);
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Status("Getting documents".into()));
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_finish_synthesizes_sentinel_and_result() {
        let (mut ch, mut rx, mut result_rx) = channels();
        ch.dispatch("garbage that is not a frame");
        ch.finish(
            Err(std::io::Error::new(std::io::ErrorKind::Other, "gone")),
            "thread 'main' panicked\n",
        );
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Finished);
        let result = result_rx.try_recv().unwrap();
        assert!(!result.is_success());
        assert!(result.message.contains("gone"));
        assert!(result.message.ends_with("panicked"));
    }

    #[test]
    fn test_finish_keeps_delivered_result() {
        let (mut ch, mut rx, mut result_rx) = channels();
        let line = WorkerFrame::Result(Box::new(ExperimentResult::failure("real")))
            .to_line()
            .unwrap();
        ch.dispatch(&line);
        ch.dispatch(r#"{"channel":"progress","payload":-1}"#);
        ch.finish(Err(std::io::Error::new(std::io::ErrorKind::Other, "x")), "");
        assert_eq!(result_rx.try_recv().unwrap().message, "real");
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Finished);
        assert!(rx.try_recv().is_err());
    }
}
