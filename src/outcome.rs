use serde::{Deserialize, Serialize};

use crate::error::FrameQaError;

/// Successful answer plus whatever the provider reported about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Answer {
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            finish_reason: None,
            model: None,
            provider: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub error: String,
    pub reason: String,
}

impl From<&FrameQaError> for Failure {
    fn from(e: &FrameQaError) -> Self {
        Self {
            error: e.user_message(),
            reason: e.reason().to_string(),
        }
    }
}

/// Either an `answer` or an `error`; serialized without a tag so artifacts
/// read as `{"answer": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Answered(Answer),
    Failed(Failure),
}

/// The one result produced for a work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    pub id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub latency_ms: u64,
}

impl ItemResult {
    pub fn answered(id: impl Into<String>, answer: Answer, latency_ms: u64) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Answered(answer),
            latency_ms,
        }
    }

    pub fn failed(id: impl Into<String>, error: &FrameQaError, latency_ms: u64) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Failed(Failure::from(error)),
            latency_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Answered(_))
    }

    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Answered(a) => Some(&a.answer),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Answered(_) => None,
            Outcome::Failed(f) => Some(&f.error),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Answered(_) => None,
            Outcome::Failed(f) => Some(&f.reason),
        }
    }
}

/// On-disk form of a result, as written by `JsonDirSink`. Tolerant of
/// artifacts that carry only one of the two fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultArtifact {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}
