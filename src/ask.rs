use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::ItemCall;
use crate::config::{DEFAULT_MAX_TOKENS, ProviderConfig};
use crate::dispatch::{InferenceProvider, InferenceRequest};
use crate::error::FrameQaError;
use crate::frames::MediaSource;
use crate::outcome::Answer;
use crate::prompt::PromptTemplate;
use crate::work::WorkItem;

/// Sampling parameters sent with every request of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: Some(0.0),
            top_p: Some(0.0),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
        }
    }
}

impl From<&ProviderConfig> for SamplingParams {
    fn from(cfg: &ProviderConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens(),
        }
    }
}

/// Asks one multiple-choice question about one clip's media.
pub struct FrameQuestion {
    provider: Arc<dyn InferenceProvider>,
    media: Arc<dyn MediaSource>,
    prompt: PromptTemplate,
    params: SamplingParams,
}

impl FrameQuestion {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        media: Arc<dyn MediaSource>,
        prompt: PromptTemplate,
        params: SamplingParams,
    ) -> Self {
        Self {
            provider,
            media,
            prompt,
            params,
        }
    }
}

#[async_trait]
impl ItemCall for FrameQuestion {
    async fn precheck(&self, item: &WorkItem) -> Result<(), FrameQaError> {
        self.media.check(&item.id).await
    }

    async fn call(&self, item: &WorkItem) -> Result<Answer, FrameQaError> {
        let media = self.media.load(&item.id).await?;
        if media.is_empty() {
            return Err(FrameQaError::missing_input(&item.id, "media source returned nothing"));
        }

        let req = InferenceRequest {
            prompt: self.prompt.render(&item.question, media.len()),
            system_prompt: None,
            media,
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            max_tokens: self.params.max_tokens,
        };

        let result = self.provider.infer(&req).await?;
        Ok(Answer {
            answer: result.text,
            finish_reason: result.finish_reason,
            model: Some(result.model),
            provider: Some(result.provider),
        })
    }
}
