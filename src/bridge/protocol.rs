//! Line-delimited JSON frames written by the worker on stdout.
//!
//! ```text
//! {"channel":"progress","payload":"Running event drivers\nCharacterNGrams"}
//! {"channel":"progress","payload":true}
//! {"channel":"snapshot","payload":{...}}
//! {"channel":"result","payload":{...}}
//! {"channel":"progress","payload":-1.0}
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::pipeline::artifacts::{ExperimentResult, IntermediateSnapshot};
use crate::pipeline::observer::ProgressEvent;

/// One message from the worker, tagged with the channel it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "snake_case")]
pub enum WorkerFrame {
    Progress(ProgressEvent),
    Snapshot(Box<IntermediateSnapshot>),
    Result(Box<ExperimentResult>),
}

impl WorkerFrame {
    /// Serialize as a single line, without the trailing newline.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_frame_shape() {
        let frame = WorkerFrame::Progress(ProgressEvent::Status("Getting documents".into()));
        assert_eq!(
            frame.to_line().unwrap(),
            r#"{"channel":"progress","payload":"Getting documents"}"#
        );
        let sentinel = WorkerFrame::parse(r#"{"channel":"progress","payload":-1}"#).unwrap();
        assert_eq!(sentinel, WorkerFrame::Progress(ProgressEvent::Finished));
    }

    #[test]
    fn test_result_frame_roundtrip() {
        let frame = WorkerFrame::Result(Box::new(ExperimentResult::failure("boom")));
        let line = frame.to_line().unwrap();
        assert!(line.starts_with(r#"{"channel":"result","payload":{"#));
        assert!(!line.contains('\n'));
        assert_eq!(WorkerFrame::parse(&line).unwrap(), frame);
    }

    #[test]
    fn test_unknown_channel_rejected() {
        assert!(WorkerFrame::parse(r#"{"channel":"gossip","payload":1}"#).is_err());
        assert!(WorkerFrame::parse("not json").is_err());
    }
}
