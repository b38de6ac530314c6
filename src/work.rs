use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FrameQaError, Result};

/// Default width ids are zero-padded to (`51` → `00051`).
pub const DEFAULT_ID_WIDTH: usize = 5;

/// Most ids one range may cover; ranges are expanded id by id.
pub const MAX_ID_RANGE_LEN: u64 = 1_000_000;

/// One (identifier, question) unit of work requiring one remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub question: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
        }
    }

    /// Numeric value of the id, if it has one.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }
}

/// Inclusive range of numeric ids, written `51-251` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdRange {
    pub start: u64,
    pub end: u64,
}

impl IdRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(FrameQaError::Config(format!(
                "id range start {start} is after end {end}"
            )));
        }
        if end - start >= MAX_ID_RANGE_LEN {
            return Err(FrameQaError::Config(format!(
                "id range {start}-{end} covers more than {MAX_ID_RANGE_LEN} ids"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, id: u64) -> bool {
        (self.start..=self.end).contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> {
        self.start..=self.end
    }
}

impl FromStr for IdRange {
    type Err = FrameQaError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (s, s),
        };
        let parse = |v: &str| {
            v.parse::<u64>()
                .map_err(|_| FrameQaError::Config(format!("invalid id range: {s:?}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl TryFrom<String> for IdRange {
    type Error = FrameQaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IdRange> for String {
    fn from(value: IdRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Zero-pad a numeric id to `width` digits. Non-numeric ids pass through trimmed.
pub fn normalize_id(raw: &str, width: usize) -> String {
    let raw = raw.trim();
    match raw.parse::<u64>() {
        Ok(n) => format!("{n:0width$}"),
        Err(_) => raw.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub id_width: usize,
    pub id_range: Option<IdRange>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            id_width: DEFAULT_ID_WIDTH,
            id_range: None,
        }
    }
}

#[derive(Deserialize)]
struct QuestionRow {
    id: String,
    question: String,
}

/// Read work items from a CSV with at least `id` and `question` columns.
pub fn load_work_items(path: &Path, opts: &LoadOptions) -> Result<Vec<WorkItem>> {
    let file = std::fs::File::open(path)?;
    read_work_items(file, opts)
}

pub fn read_work_items<R: std::io::Read>(reader: R, opts: &LoadOptions) -> Result<Vec<WorkItem>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for row in rdr.deserialize::<QuestionRow>() {
        let row = row?;
        let item = WorkItem::new(normalize_id(&row.id, opts.id_width), row.question);

        if let Some(range) = opts.id_range {
            match item.numeric_id() {
                Some(n) if range.contains(n) => {}
                _ => continue,
            }
        }

        if !seen.insert(item.id.clone()) {
            tracing::warn!(id = %item.id, "duplicate id in question table; outputs will collide");
        }
        items.push(item);
    }

    Ok(items)
}
