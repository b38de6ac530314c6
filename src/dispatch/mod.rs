pub mod gemini;
pub mod http;
pub mod openai;
pub mod registry;

use async_trait::async_trait;

use crate::error::FrameQaError;
use crate::frames::MediaPart;

/// Request shape every provider accepts.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub prompt: String,
    /// Instruction sent separately from the user turn where the API supports it.
    pub system_prompt: Option<String>,
    /// Ordered attachments presented after the prompt text.
    pub media: Vec<MediaPart>,
    /// Sampling temperature (0 = deterministic). Ignored by reasoning models.
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Result shape every provider returns.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub text: String,
    /// Provider completion marker, e.g. `stop`, `length`, `STOP`.
    pub finish_reason: Option<String>,
    pub model: String,
    pub provider: String,
}

/// A multimodal model endpoint: `infer(prompt, media[]) -> (text, status)`.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name used in logs and result metadata (`openai`, `gemini`, `vertex`).
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn infer(&self, req: &InferenceRequest) -> Result<InferenceResult, FrameQaError>;
}
