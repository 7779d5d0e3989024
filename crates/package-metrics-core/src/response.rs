//! JSON response envelope.
//!
//! Every ingestion request answers with
//! `{"status": "success" | "error", "message": ...}`. Error envelopes carry
//! the `;`-joined error list and never the change count.

use serde::{Deserialize, Serialize};

use crate::batch::BatchOutcome;
use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub message: String,
}

impl Envelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

impl From<&BatchOutcome> for Envelope {
    fn from(outcome: &BatchOutcome) -> Self {
        if outcome.is_success() {
            Envelope::success(format!("Updated {} records.", outcome.total_changes))
        } else {
            Envelope::error(outcome.error_message())
        }
    }
}

impl From<&IngestError> for Envelope {
    fn from(err: &IngestError) -> Self {
        Envelope::error(err.to_string())
    }
}
