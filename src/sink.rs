use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::FrameQaError;
use crate::outcome::{ItemResult, Outcome};

/// Suffix appended to the id for each artifact file.
pub const RESULT_SUFFIX: &str = "_result.json";

/// Destination for per-item results, called once per result as it completes.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write(&self, result: &ItemResult) -> Result<(), FrameQaError>;
}

/// One pretty-printed JSON file per id: `<dir>/<id>_result.json`.
/// Re-runs overwrite the same file.
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

#[derive(Serialize)]
struct Artifact<'a> {
    #[serde(flatten)]
    outcome: &'a Outcome,
    latency_ms: u64,
}

impl JsonDirSink {
    /// Create the sink, creating `dir` if needed.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, FrameQaError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{RESULT_SUFFIX}"))
    }
}

#[async_trait]
impl ResultSink for JsonDirSink {
    async fn write(&self, result: &ItemResult) -> Result<(), FrameQaError> {
        if result.id.is_empty() || result.id.contains(['/', '\\']) || result.id.starts_with('.') {
            return Err(FrameQaError::Other(format!(
                "refusing to write artifact for unsafe id {:?}",
                result.id
            )));
        }

        let path = self.path_for(&result.id);
        let json = serde_json::to_string_pretty(&Artifact {
            outcome: &result.outcome,
            latency_ms: result.latency_ms,
        })?;

        // Atomic write: temp file + rename prevents partial reads
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(id = %result.id, path = %path.display(), "saved result");
        Ok(())
    }
}
