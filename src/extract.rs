use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::ask::SamplingParams;
use crate::batch::ItemCall;
use crate::dispatch::{InferenceProvider, InferenceRequest};
use crate::error::{FrameQaError, Result};
use crate::outcome::{Answer, ResultArtifact};
use crate::prompt::EXTRACT_SYSTEM_PROMPT;
use crate::work::WorkItem;

/// `<answer>C. 27</answer>`, `<answer>C explanation</answer>`
static ANSWER_WITH_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<answer>([A-E])[.\s].*?</answer>").expect("valid regex"));

/// `<answer>C</answer>`
static ANSWER_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<answer>([A-E])</answer>").expect("valid regex"));

/// Pull the answer letter out of free-form model output.
pub fn extract_letter(text: &str) -> Result<char> {
    ANSWER_WITH_TEXT
        .captures(text)
        .or_else(|| ANSWER_BARE.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().chars().next())
        .ok_or_else(|| FrameQaError::AnswerNotFound(preview(text)))
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    let tail: String = text.chars().rev().take(MAX).collect::<Vec<_>>().into_iter().rev().collect();
    if tail.len() < text.len() {
        format!("...{tail}")
    } else {
        tail
    }
}

/// Id encoded in an artifact file name: `00051_result.json` → `00051`.
pub fn artifact_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.split('_').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

/// `*.json` files in `dir`, sorted by name.
pub fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Turn a directory of answer artifacts into work items whose question is
/// the raw answer text. Artifacts with no answer text are skipped.
pub fn load_answer_items(dir: &Path) -> Result<Vec<WorkItem>> {
    let mut items = Vec::new();
    for path in json_files(dir)? {
        let Some(id) = artifact_id(&path) else {
            tracing::warn!(path = %path.display(), "cannot derive id from file name");
            continue;
        };
        let artifact: ResultArtifact = match std::fs::read(&path)
            .map_err(FrameQaError::from)
            .and_then(|b| serde_json::from_slice(&b).map_err(FrameQaError::from))
        {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(path = %path.display(), "unreadable artifact: {e}");
                continue;
            }
        };
        match artifact.answer.filter(|a| !a.trim().is_empty()) {
            Some(answer) => items.push(WorkItem::new(id, answer)),
            None => tracing::warn!(path = %path.display(), "no answer found in artifact"),
        }
    }
    Ok(items)
}

/// Asks a small model to restate the chosen letter as `<answer>X</answer>`.
/// The work item's `question` is the free-form answer being distilled.
pub struct LetterExtraction {
    provider: Arc<dyn InferenceProvider>,
    params: SamplingParams,
}

impl LetterExtraction {
    pub fn new(provider: Arc<dyn InferenceProvider>, params: SamplingParams) -> Self {
        Self { provider, params }
    }
}

#[async_trait]
impl ItemCall for LetterExtraction {
    async fn precheck(&self, item: &WorkItem) -> Result<()> {
        if item.question.trim().is_empty() {
            return Err(FrameQaError::missing_input(&item.id, "no answer text to extract from"));
        }
        Ok(())
    }

    async fn call(&self, item: &WorkItem) -> Result<Answer> {
        let req = InferenceRequest {
            prompt: item.question.clone(),
            system_prompt: Some(EXTRACT_SYSTEM_PROMPT.to_string()),
            media: Vec::new(),
            temperature: self.params.temperature,
            top_p: self.params.top_p,
            max_tokens: self.params.max_tokens,
        };

        let result = self.provider.infer(&req).await?;
        Ok(Answer {
            answer: result.text.trim().to_string(),
            finish_reason: result.finish_reason,
            model: Some(result.model),
            provider: Some(result.provider),
        })
    }
}
