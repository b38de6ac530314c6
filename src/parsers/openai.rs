use serde::Deserialize;

use crate::error::FrameQaError;
use crate::parsers::{ParsedResponse, ResponseParser};

/// Parses OpenAI chat completion responses.
/// Expected shape: `{"choices": [{"message": {"content": "..."}, "finish_reason": "stop"}]}`
pub struct OpenAiParser;

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl ResponseParser for OpenAiParser {
    fn parse(&self, body: &[u8]) -> Result<ParsedResponse, FrameQaError> {
        let completion: ChatCompletion = serde_json::from_slice(body)
            .map_err(|e| FrameQaError::SchemaParse(format!("openai JSON parse failed: {e}")))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| FrameQaError::SchemaParse("openai response has no choices".to_string()))?;

        let text = choice.message.content.unwrap_or_default();
        if text.is_empty() && choice.finish_reason.is_none() {
            return Err(FrameQaError::SchemaParse(
                "openai response has null content and no finish_reason".to_string(),
            ));
        }

        Ok(ParsedResponse {
            text,
            finish_reason: choice.finish_reason,
        })
    }
}
