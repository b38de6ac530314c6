use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::config::CollectConfig;
use crate::error::{FrameQaError, Result};
use crate::extract::{artifact_id, extract_letter, json_files};
use crate::outcome::ResultArtifact;
use crate::work::{IdRange, normalize_id};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerRow {
    pub id: String,
    pub answer: String,
}

#[derive(Debug, Default)]
pub struct CollectReport {
    /// Sorted by numeric id.
    pub rows: Vec<AnswerRow>,
    /// Ids in the answered range with no usable answer.
    pub missing: Vec<u64>,
    /// Artifacts in range whose text had no answer tag.
    pub unparsed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub range: Option<IdRange>,
    pub sentinel_range: Option<IdRange>,
    pub sentinel: String,
    pub id_width: usize,
}

impl CollectOptions {
    pub fn from_config(cfg: &CollectConfig, id_width: usize) -> Self {
        Self {
            range: cfg.range,
            sentinel_range: cfg.sentinel_range,
            sentinel: cfg.sentinel.clone(),
            id_width,
        }
    }
}

/// Read every artifact in `dir` and build one `id,answer` row per id.
pub fn collect_answers(dir: &Path, opts: &CollectOptions) -> Result<CollectReport> {
    let mut rows: BTreeMap<u64, AnswerRow> = BTreeMap::new();
    let mut report = CollectReport::default();

    if let Some(sentinel) = opts.sentinel_range {
        for n in sentinel.iter() {
            rows.insert(
                n,
                AnswerRow {
                    id: normalize_id(&n.to_string(), opts.id_width),
                    answer: opts.sentinel.clone(),
                },
            );
        }
    }

    for path in json_files(dir)? {
        let Some(n) = artifact_id(&path).and_then(|id| id.parse::<u64>().ok()) else {
            tracing::warn!(path = %path.display(), "invalid id format in file name");
            continue;
        };
        if opts.range.is_some_and(|r| !r.contains(n)) {
            continue;
        }
        if opts.sentinel_range.is_some_and(|r| r.contains(n)) {
            continue;
        }

        let artifact = match read_artifact(&path) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(path = %path.display(), "error processing artifact: {e}");
                continue;
            }
        };

        let text = artifact.answer.unwrap_or_default();
        match extract_letter(&text) {
            Ok(letter) => {
                rows.insert(
                    n,
                    AnswerRow {
                        id: normalize_id(&n.to_string(), opts.id_width),
                        answer: letter.to_string(),
                    },
                );
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "no answer found: {e}");
                report.unparsed.push(path.display().to_string());
            }
        }
    }

    if let Some(range) = opts.range {
        report.missing = range.iter().filter(|n| !rows.contains_key(n)).collect();
        if !report.missing.is_empty() {
            tracing::warn!(
                count = report.missing.len(),
                "missing answers for ids {range}: {:?}",
                report.missing
            );
        }
    }

    report.rows = rows.into_values().collect();
    Ok(report)
}

fn read_artifact(path: &Path) -> Result<ResultArtifact> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write rows as a CSV with an `id,answer` header.
pub fn write_answers_csv(path: &Path, rows: &[AnswerRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    // serialize() only emits the header once a row exists
    if rows.is_empty() {
        writer.write_record(["id", "answer"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(FrameQaError::from)
}
