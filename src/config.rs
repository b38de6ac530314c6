use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::http::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{FrameQaError, Result};
use crate::work::{DEFAULT_ID_WIDTH, IdRange};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "frameqa.toml";

/// Output cap for non-reasoning models when `max_tokens` is unset.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Which REST API a provider section talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Gemini,
    Vertex,
}

impl ProviderKind {
    /// Environment variable holding the credential unless `api_key_env` overrides it.
    pub fn default_key_env(&self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Vertex => "VERTEX_ACCESS_TOKEN",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Openai => "gpt-4o",
            Self::Gemini => "gemini-2.0-pro-exp-02-05",
            Self::Vertex => "gemini-2.0-flash-001",
        }
    }
}

/// What gets attached to each question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Pre-extracted frame images from `frames_dir`.
    Frames,
    /// One remote video per id from `video_uri_template`.
    Video,
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: Option<String>,
    /// Full endpoint URL for OpenAI, host base for Gemini/Vertex.
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    /// OpenAI o1-family: no sampling parameters, `max_completion_tokens`.
    pub reasoning: bool,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    /// Unset means `DEFAULT_MAX_TOKENS`, or no cap at all for reasoning
    /// models whose hidden reasoning counts against it.
    pub max_tokens: Option<u32>,
    /// Vertex AI project; falls back to `GOOGLE_CLOUD_PROJECT`.
    pub project: Option<String>,
    pub location: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openai,
            model: None,
            base_url: None,
            api_key_env: None,
            reasoning: false,
            temperature: Some(0.0),
            top_p: Some(0.0),
            max_tokens: None,
            project: None,
            location: "us-central1".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.default_model())
    }

    pub fn key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_key_env())
    }

    /// Output token cap actually sent with requests.
    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
            .or((!self.reasoning).then_some(DEFAULT_MAX_TOKENS))
    }

    /// Read the API key / access token from the environment.
    pub fn credential(&self) -> Result<String> {
        let var = self.key_env();
        env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| FrameQaError::Config(format!("{var} is not set")))
    }

    pub fn vertex_project(&self) -> Result<String> {
        self.project
            .clone()
            .or_else(|| env::var("GOOGLE_CLOUD_PROJECT").ok())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                FrameQaError::Config(
                    "vertex provider needs `project` or GOOGLE_CLOUD_PROJECT".to_string(),
                )
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("model", &self.model())
            .field("base_url", &self.base_url)
            .field("api_key_env", &self.key_env())
            .field("reasoning", &self.reasoning)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens())
            .field("project", &self.project)
            .field("location", &self.location)
            .finish()
    }
}

/// Pause the whole gate for `secs` after every `every` completed calls.
/// `every = 0` or `secs = 0` disables it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CooldownConfig {
    pub every: u64,
    pub secs: f64,
}

impl CooldownConfig {
    pub fn policy(&self) -> Option<(u64, Duration)> {
        if self.every == 0 || !self.secs.is_finite() || self.secs <= 0.0 {
            return None;
        }
        Some((self.every, Duration::from_secs_f64(self.secs)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub questions: PathBuf,
    pub media: MediaMode,
    pub frames_dir: PathBuf,
    pub frame_prefix: String,
    pub video_uri_template: Option<String>,
    pub output_dir: PathBuf,
    pub max_concurrent: usize,
    pub id_width: usize,
    pub id_range: Option<IdRange>,
    /// Prompt with `{question}` and optional `{frame_count}` placeholders.
    /// Defaults to the built-in template for the media mode.
    pub prompt_template: Option<String>,
    pub cooldown: CooldownConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            questions: PathBuf::from("all_questions.csv"),
            media: MediaMode::Frames,
            frames_dir: PathBuf::from("extracted_frames"),
            frame_prefix: "frame_".to_string(),
            video_uri_template: None,
            output_dir: PathBuf::from("results"),
            max_concurrent: 5,
            id_width: DEFAULT_ID_WIDTH,
            id_range: None,
            prompt_template: None,
            cooldown: CooldownConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Fields set here override the extraction defaults one by one.
    #[serde(deserialize_with = "extract_provider")]
    pub provider: ProviderConfig,
    pub max_concurrent: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                model: Some("gpt-4o-mini".to_string()),
                top_p: None,
                max_tokens: Some(50),
                ..ProviderConfig::default()
            },
            max_concurrent: 10,
        }
    }
}

/// A provider section where every field is optional, laid over a base config.
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProviderOverrides {
    kind: Option<ProviderKind>,
    model: Option<String>,
    base_url: Option<String>,
    api_key_env: Option<String>,
    reasoning: Option<bool>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    max_tokens: Option<u32>,
    project: Option<String>,
    location: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl ProviderOverrides {
    fn apply(self, mut base: ProviderConfig) -> ProviderConfig {
        if let Some(kind) = self.kind {
            base.kind = kind;
            // A different API means the base model name no longer applies.
            if self.model.is_none() {
                base.model = None;
            }
        }
        if let Some(v) = self.model {
            base.model = Some(v);
        }
        if let Some(v) = self.base_url {
            base.base_url = Some(v);
        }
        if let Some(v) = self.api_key_env {
            base.api_key_env = Some(v);
        }
        if let Some(v) = self.reasoning {
            base.reasoning = v;
        }
        if let Some(v) = self.temperature {
            base.temperature = Some(v);
        }
        if let Some(v) = self.top_p {
            base.top_p = Some(v);
        }
        if let Some(v) = self.max_tokens {
            base.max_tokens = Some(v);
        }
        if let Some(v) = self.project {
            base.project = Some(v);
        }
        if let Some(v) = self.location {
            base.location = v;
        }
        if let Some(v) = self.request_timeout_secs {
            base.request_timeout_secs = v;
        }
        base
    }
}

fn extract_provider<'de, D>(deserializer: D) -> std::result::Result<ProviderConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let overrides = ProviderOverrides::deserialize(deserializer)?;
    Ok(overrides.apply(ExtractConfig::default().provider))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectConfig {
    /// Ids whose answers are read from result files.
    pub range: Option<IdRange>,
    /// Ids that get `sentinel` instead of an extracted answer.
    pub sentinel_range: Option<IdRange>,
    pub sentinel: String,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            range: None,
            sentinel_range: None,
            sentinel: "X".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub provider: ProviderConfig,
    pub run: RunConfig,
    pub extract: ExtractConfig,
    pub collect: CollectConfig,
}

impl Config {
    /// Load from an explicit TOML path, or from `frameqa.toml` in the working
    /// directory when present, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FrameQaError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FrameQaError::Config(e.to_string()))
    }
}
