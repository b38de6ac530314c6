pub mod gemini;
pub mod openai;

use crate::error::FrameQaError;

/// Text and completion marker decoded from a provider response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub text: String,
    pub finish_reason: Option<String>,
}

/// Trait for parsing a provider's JSON response body into a text answer.
/// Each API (OpenAI, Gemini) has its own response shape.
pub trait ResponseParser: Send + Sync {
    /// Parse raw body bytes into the answer text plus finish status.
    fn parse(&self, body: &[u8]) -> Result<ParsedResponse, FrameQaError>;
}
