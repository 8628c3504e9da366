use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SubstrateError};

/// Hierarchy separator inside a node path.
pub const PATH_SEPARATOR: char = '/';

/// A path-addressed unit of persisted knowledge.
///
/// Nodes are value snapshots: the `with_*` mutators return a new node with the
/// same `id` and `path` and a refreshed `last_updated`, leaving `self`
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: Uuid,
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Epoch milliseconds of the last content or tag mutation.
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
}

impl KnowledgeNode {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            content: content.into(),
            tags: Vec::new(),
            last_updated: now_millis(),
        }
    }

    /// Builder-style tag assignment used while constructing a node.
    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// Builder-style timestamp override (imports, fixtures).
    pub fn at(mut self, last_updated: i64) -> Self {
        self.last_updated = last_updated;
        self
    }

    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            last_updated: refreshed_timestamp(self.last_updated),
            ..self.clone()
        }
    }

    pub fn with_tags<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: normalize_tags(tags),
            last_updated: refreshed_timestamp(self.last_updated),
            ..self.clone()
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }

    /// Non-blank path segments. Stray, leading or trailing separators are
    /// skipped, so `"Research//Map/"` yields `["Research", "Map"]`.
    pub fn segments(&self) -> Vec<&str> {
        self.path
            .split(PATH_SEPARATOR)
            .filter(|segment| !segment.trim().is_empty())
            .collect()
    }

    /// Top-level folder the node is rooted under.
    pub fn root_category(&self) -> Option<&str> {
        self.segments().first().copied()
    }

    pub fn leaf(&self) -> Option<&str> {
        self.segments().last().copied()
    }

    /// Every proper prefix of the path (ancestor folders, leaf excluded).
    ///
    /// `"A/B/C"` yields `["A", "A/B"]`.
    pub fn ancestors(&self) -> Vec<String> {
        let segments = self.segments();
        if segments.len() < 2 {
            return Vec::new();
        }
        (1..segments.len())
            .map(|depth| segments[..depth].join("/"))
            .collect()
    }

    pub fn validate_path(&self) -> Result<()> {
        validate_path(&self.path)
    }
}

/// Check the path invariants: non-empty, `/`-separated, no empty segments.
pub fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(SubstrateError::invalid(path, "path is empty"));
    }
    if path.contains('\\') {
        return Err(SubstrateError::invalid(
            path,
            "only '/' may be used as a hierarchy separator",
        ));
    }
    if path
        .split(PATH_SEPARATOR)
        .any(|segment| segment.trim().is_empty())
    {
        return Err(SubstrateError::invalid(path, "path contains an empty segment"));
    }
    Ok(())
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Next modification timestamp: wall clock, but never at or before `previous`.
fn refreshed_timestamp(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}

fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tags = tags
        .into_iter()
        .map(|t| t.into().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    tags.sort();
    tags.dedup();
    tags
}
