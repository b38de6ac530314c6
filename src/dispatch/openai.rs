use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use crate::dispatch::http::HttpDispatch;
use crate::dispatch::{InferenceProvider, InferenceRequest, InferenceResult};
use crate::error::FrameQaError;
use crate::frames::MediaPart;
use crate::parsers::openai::OpenAiParser;

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat completions with images attached as base64 data URLs.
pub struct OpenAiProvider {
    http: HttpDispatch,
    url: String,
    api_key: String,
    model: String,
    /// o1-family models reject sampling parameters and use `max_completion_tokens`.
    reasoning: bool,
}

impl OpenAiProvider {
    pub fn new(
        http: HttpDispatch,
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        reasoning: bool,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            reasoning,
        }
    }

    pub fn build_body(&self, req: &InferenceRequest) -> Result<Value, FrameQaError> {
        let mut content = vec![json!({"type": "text", "text": req.prompt})];
        for part in &req.media {
            match part {
                MediaPart::InlineImage { mime_type, bytes } => {
                    let data = STANDARD.encode(bytes);
                    content.push(json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:{mime_type};base64,{data}")}
                    }));
                }
                MediaPart::RemoteVideo { .. } => {
                    return Err(FrameQaError::UnsupportedMedia {
                        provider: "openai".to_string(),
                        media: part.kind().to_string(),
                    });
                }
            }
        }

        let mut messages = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": content}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        if self.reasoning {
            if let Some(max) = req.max_tokens {
                body["max_completion_tokens"] = json!(max);
            }
        } else {
            if let Some(t) = req.temperature {
                body["temperature"] = json!(t);
            }
            if let Some(p) = req.top_p {
                body["top_p"] = json!(p);
            }
            if let Some(max) = req.max_tokens {
                body["max_tokens"] = json!(max);
            }
        }

        Ok(body)
    }
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceResult, FrameQaError> {
        let body = self.build_body(req)?;
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];

        let parsed = self
            .http
            .post_json(&self.url, &headers, &body, self.name(), &OpenAiParser)
            .await?;

        Ok(InferenceResult {
            text: parsed.text,
            finish_reason: parsed.finish_reason,
            model: self.model.clone(),
            provider: self.name().to_string(),
        })
    }
}
