use std::sync::Arc;

use crate::config::{ProviderConfig, ProviderKind};
use crate::dispatch::InferenceProvider;
use crate::dispatch::gemini::{GeminiEndpoint, GeminiProvider};
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::openai::{OPENAI_CHAT_URL, OpenAiProvider};
use crate::error::FrameQaError;

/// Build the provider a config section names, reading its credential from the
/// environment.
pub fn build_provider(cfg: &ProviderConfig) -> Result<Arc<dyn InferenceProvider>, FrameQaError> {
    let credential = cfg.credential()?;
    build_provider_with_credential(cfg, credential)
}

/// Build a provider with an explicit credential (API key or access token).
pub fn build_provider_with_credential(
    cfg: &ProviderConfig,
    credential: String,
) -> Result<Arc<dyn InferenceProvider>, FrameQaError> {
    let http = HttpDispatch::new(cfg.request_timeout())?;
    let model = cfg.model().to_string();

    let provider: Arc<dyn InferenceProvider> = match cfg.kind {
        ProviderKind::Openai => {
            let url = cfg.base_url.as_deref().unwrap_or(OPENAI_CHAT_URL);
            Arc::new(OpenAiProvider::new(http, url, credential, model, cfg.reasoning))
        }
        ProviderKind::Gemini => {
            let mut endpoint = GeminiEndpoint::direct(credential);
            if let Some(base) = &cfg.base_url {
                endpoint = endpoint.with_base_url(base.as_str());
            }
            Arc::new(GeminiProvider::new(http, endpoint, model))
        }
        ProviderKind::Vertex => {
            let project = cfg.vertex_project()?;
            let mut endpoint = GeminiEndpoint::vertex(project, cfg.location.as_str(), credential);
            if let Some(base) = &cfg.base_url {
                endpoint = endpoint.with_base_url(base.as_str());
            }
            Arc::new(GeminiProvider::new(http, endpoint, model))
        }
    };

    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "provider configured"
    );
    Ok(provider)
}
