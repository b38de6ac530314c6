use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};

use crate::dispatch::http::HttpDispatch;
use crate::dispatch::{InferenceProvider, InferenceRequest, InferenceResult};
use crate::error::FrameQaError;
use crate::frames::MediaPart;
use crate::parsers::gemini::GeminiParser;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Where a `generateContent` call goes and how it authenticates.
#[derive(Clone)]
pub enum GeminiEndpoint {
    /// Gemini developer API, keyed by `x-goog-api-key`.
    Direct { base_url: String, api_key: String },
    /// Vertex AI publisher model, authenticated with an OAuth access token.
    Vertex {
        base_url: String,
        project: String,
        location: String,
        access_token: String,
    },
}

impl GeminiEndpoint {
    pub fn direct(api_key: impl Into<String>) -> Self {
        Self::Direct {
            base_url: GEMINI_API_BASE.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn vertex(
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self::Vertex {
            base_url: format!("https://{location}-aiplatform.googleapis.com"),
            project: project.into(),
            location,
            access_token: access_token.into(),
        }
    }

    /// Replace the host part, e.g. to point at a local mock.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            Self::Direct { base_url, .. } | Self::Vertex { base_url, .. } => {
                *base_url = url.into().trim_end_matches('/').to_string();
            }
        }
        self
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "gemini",
            Self::Vertex { .. } => "vertex",
        }
    }

    pub fn url(&self, model: &str) -> String {
        match self {
            Self::Direct { base_url, .. } => {
                format!("{base_url}/v1beta/models/{model}:generateContent")
            }
            Self::Vertex {
                base_url,
                project,
                location,
                ..
            } => format!(
                "{base_url}/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:generateContent"
            ),
        }
    }

    fn auth_header(&self) -> (&'static str, String) {
        match self {
            Self::Direct { api_key, .. } => ("x-goog-api-key", api_key.clone()),
            Self::Vertex { access_token, .. } => {
                ("Authorization", format!("Bearer {access_token}"))
            }
        }
    }
}

impl std::fmt::Debug for GeminiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { base_url, .. } => f
                .debug_struct("Direct")
                .field("base_url", base_url)
                .field("api_key", &"[REDACTED]")
                .finish(),
            Self::Vertex {
                base_url,
                project,
                location,
                ..
            } => f
                .debug_struct("Vertex")
                .field("base_url", base_url)
                .field("project", project)
                .field("location", location)
                .field("access_token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Gemini models over either the developer API or Vertex AI.
pub struct GeminiProvider {
    http: HttpDispatch,
    endpoint: GeminiEndpoint,
    model: String,
}

impl GeminiProvider {
    pub fn new(http: HttpDispatch, endpoint: GeminiEndpoint, model: impl Into<String>) -> Self {
        Self {
            http,
            endpoint,
            model: model.into(),
        }
    }

    pub fn build_body(&self, req: &InferenceRequest) -> Value {
        let mut parts = vec![json!({"text": req.prompt})];
        for part in &req.media {
            parts.push(match part {
                MediaPart::InlineImage { mime_type, bytes } => json!({
                    "inlineData": {"mimeType": mime_type, "data": STANDARD.encode(bytes)}
                }),
                MediaPart::RemoteVideo { uri, mime_type } => json!({
                    "fileData": {"mimeType": mime_type, "fileUri": uri}
                }),
            });
        }

        let mut generation = Map::new();
        if let Some(t) = req.temperature {
            generation.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = req.top_p {
            generation.insert("topP".to_string(), json!(p));
        }
        if let Some(max) = req.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max));
        }

        let mut body = json!({
            "contents": [{"role": "user", "parts": parts}],
        });
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        if let Some(system) = &req.system_prompt {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    fn name(&self) -> &str {
        self.endpoint.provider_name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceResult, FrameQaError> {
        let body = self.build_body(req);
        let headers = [self.endpoint.auth_header()];
        let url = self.endpoint.url(&self.model);

        let parsed = self
            .http
            .post_json(&url, &headers, &body, self.name(), &GeminiParser)
            .await?;

        Ok(InferenceResult {
            text: parsed.text,
            finish_reason: parsed.finish_reason,
            model: self.model.clone(),
            provider: self.name().to_string(),
        })
    }
}
