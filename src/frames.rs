use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{FrameQaError, Result};

/// One media attachment sent alongside the prompt.
#[derive(Clone, PartialEq, Eq)]
pub enum MediaPart {
    /// Image bytes sent inline (base64 on the wire).
    InlineImage { mime_type: String, bytes: Vec<u8> },
    /// Video the provider fetches itself (e.g. a `gs://` object).
    RemoteVideo { uri: String, mime_type: String },
}

impl MediaPart {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InlineImage { .. } => "image",
            Self::RemoteVideo { .. } => "video",
        }
    }
}

impl std::fmt::Debug for MediaPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InlineImage { mime_type, bytes } => f
                .debug_struct("InlineImage")
                .field("mime_type", mime_type)
                .field("len", &bytes.len())
                .finish(),
            Self::RemoteVideo { uri, mime_type } => f
                .debug_struct("RemoteVideo")
                .field("uri", uri)
                .field("mime_type", mime_type)
                .finish(),
        }
    }
}

/// Supplies the ordered media for an id.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Cheap existence check. Fails with `MissingInput` when the id has no media.
    async fn check(&self, id: &str) -> Result<()>;

    /// Load the media parts in the order they should be presented.
    async fn load(&self, id: &str) -> Result<Vec<MediaPart>>;
}

/// Directory tree of pre-extracted frames: `<root>/<id>/frame_*.jpg`.
#[derive(Debug, Clone)]
pub struct FrameDirStore {
    root: PathBuf,
    prefix: String,
}

impl FrameDirStore {
    pub const DEFAULT_PREFIX: &'static str = "frame_";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Frame files for `id`, sorted by file name. A missing directory yields
    /// an empty list.
    pub async fn frame_paths(&self, id: &str) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_frame = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&self.prefix));
            if !is_frame || image_mime(&path).is_none() {
                continue;
            }
            // Follows symlinks; a dangling link is not a frame.
            let is_file = tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if is_file {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl MediaSource for FrameDirStore {
    async fn check(&self, id: &str) -> Result<()> {
        if self.frame_paths(id).await?.is_empty() {
            return Err(FrameQaError::missing_input(
                id,
                format!("no frames found in {}", self.root().join(id).display()),
            ));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Vec<MediaPart>> {
        let paths = self.frame_paths(id).await?;
        if paths.is_empty() {
            return Err(FrameQaError::missing_input(
                id,
                format!("no frames found in {}", self.root().join(id).display()),
            ));
        }

        let mut parts = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = tokio::fs::read(&path).await?;
            // frame_paths only keeps files with a known image extension
            let mime_type = image_mime(&path).unwrap_or("image/jpeg").to_string();
            parts.push(MediaPart::InlineImage { mime_type, bytes });
        }
        Ok(parts)
    }
}

/// One remote video per id, addressed by a URI template containing `{id}`.
#[derive(Debug, Clone)]
pub struct VideoUriSource {
    template: String,
    mime_type: String,
}

impl VideoUriSource {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains("{id}") {
            return Err(FrameQaError::Config(format!(
                "video URI template must contain {{id}}: {template}"
            )));
        }
        Ok(Self {
            template,
            mime_type: "video/mp4".to_string(),
        })
    }

    pub fn uri_for(&self, id: &str) -> String {
        self.template.replace("{id}", id)
    }
}

#[async_trait]
impl MediaSource for VideoUriSource {
    async fn check(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(FrameQaError::missing_input(id, "empty id has no video"));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Vec<MediaPart>> {
        self.check(id).await?;
        Ok(vec![MediaPart::RemoteVideo {
            uri: self.uri_for(id),
            mime_type: self.mime_type.clone(),
        }])
    }
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
