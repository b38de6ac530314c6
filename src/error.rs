use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameQaError {
    #[error("missing input for {id}: {message}")]
    MissingInput { id: String, message: String },

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider}: {message}")]
    AuthFailed { provider: String, message: String },

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("{provider} does not accept {media} input")]
    UnsupportedMedia { provider: String, media: String },

    #[error("no answer tag found in: {0}")]
    AnswerNotFound(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl FrameQaError {
    pub fn missing_input(id: &str, message: impl Into<String>) -> Self {
        Self::MissingInput {
            id: id.to_string(),
            message: message.into(),
        }
    }

    /// Extract provider name from structured error variants.
    /// Returns None for variants that don't carry provider context.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::RateLimited { provider } => Some(provider),
            Self::Upstream { provider, .. } => Some(provider),
            Self::AuthFailed { provider, .. } => Some(provider),
            Self::UnsupportedMedia { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Short machine-readable classification stored next to the message.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "missing_input",
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream { .. } => "upstream",
            Self::AuthFailed { .. } => "auth_failed",
            Self::SchemaParse(_) => "parse_error",
            Self::UnsupportedMedia { .. } => "unsupported_media",
            Self::AnswerNotFound(_) => "answer_not_found",
            Self::Request(_) => "request",
            Self::Io(_) => "io",
            Self::Csv(_) => "csv",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
            Self::Other(_) => "error",
        }
    }

    /// Produce a sanitized error message safe for writing into result artifacts.
    /// Does not leak request URLs (which may carry keys) or raw transport details.
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingInput { id, message } => format!("missing input for {id}: {message}"),
            Self::RateLimited { provider } => format!("rate limited by {provider}"),
            Self::Upstream {
                provider, message, ..
            } => format!("upstream error from {provider}: {message}"),
            Self::AuthFailed { provider, message } => {
                format!("authentication failed for {provider}: {message}")
            }
            Self::SchemaParse(msg) => format!("failed to parse provider response: {msg}"),
            Self::UnsupportedMedia { provider, media } => {
                format!("{provider} does not accept {media} input")
            }
            Self::AnswerNotFound(_) => "no <answer> tag with a letter A-E found".to_string(),
            Self::Request(e) => {
                if e.is_timeout() {
                    "request to provider timed out".to_string()
                } else if e.is_connect() {
                    "could not connect to provider".to_string()
                } else {
                    "request to provider failed".to_string()
                }
            }
            Self::Io(e) => format!("io error: {e}"),
            Self::Csv(e) => format!("csv error: {e}"),
            Self::Json(e) => format!("json error: {e}"),
            Self::Config(msg) => format!("config error: {msg}"),
            Self::Other(msg) => msg.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameQaError>;
