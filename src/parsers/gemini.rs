use serde::Deserialize;

use crate::error::FrameQaError;
use crate::parsers::{ParsedResponse, ResponseParser};

/// Parses `generateContent` responses (Gemini API and Vertex AI share the shape).
/// Expected shape: `{"candidates": [{"content": {"parts": [{"text": "..."}]}, "finishReason": "STOP"}]}`
pub struct GeminiParser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
    /// Thinking models tag their reasoning parts; those are not the answer.
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl ResponseParser for GeminiParser {
    fn parse(&self, body: &[u8]) -> Result<ParsedResponse, FrameQaError> {
        let resp: GenerateContentResponse = serde_json::from_slice(body)
            .map_err(|e| FrameQaError::SchemaParse(format!("gemini JSON parse failed: {e}")))?;

        let Some(candidate) = resp.candidates.into_iter().next() else {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(FrameQaError::SchemaParse(format!(
                "gemini returned no candidates: {reason}"
            )));
        };

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() && candidate.finish_reason.is_none() {
            return Err(FrameQaError::SchemaParse(
                "gemini candidate has no text parts".to_string(),
            ));
        }

        Ok(ParsedResponse {
            text,
            finish_reason: candidate.finish_reason,
        })
    }
}
