//! Running experiments in a separate worker process.
//!
//! The parent ([`ExperimentBridge`]) serializes an
//! [`ExperimentRequest`](crate::pipeline::ExperimentRequest) to the worker's
//! stdin. The worker ([`run_worker`]) streams [`WorkerFrame`] lines back on
//! stdout: progress events, snapshots, then one result and the `-1` sentinel.

pub mod parent;
pub mod protocol;
pub mod worker;

pub use parent::{ExperimentBridge, ExperimentHandle, ExperimentOutcome, WorkerCommand};
pub use protocol::WorkerFrame;
pub use worker::{run_worker, WireObserver};
