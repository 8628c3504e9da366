//! Substrate audit: category distribution, structural (virtual folder)
//! detection, signal/static classification and topic cluster detection.
//!
//! Everything here is a pure function of the input slice.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::KnowledgeNode;

/// Path fragments that mark a node as stale residue rather than live signal.
pub const DEFAULT_STATIC_MARKERS: [&str; 5] = ["_v", "draft", "old", "backup", "archive"];

/// Topic needle used by the phonetic consolidation.
pub const PHONETIC_NEEDLE: &str = "phonetic";

/// Caller-supplied cluster membership test (e.g. an embedding similarity
/// threshold).
pub type NodeFilter = Arc<dyn Fn(&KnowledgeNode) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
    pub categories: BTreeMap<String, usize>,
    pub signal_count: usize,
    pub static_count: usize,
    pub total_nodes: usize,
    pub structural_nodes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub stats: AuditStats,
    pub cluster: Vec<KnowledgeNode>,
}

/// Naming-convention classifier. Content is never inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticClassifier {
    markers: Vec<String>,
}

impl Default for StaticClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_STATIC_MARKERS)
    }
}

impl StaticClassifier {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn is_static(&self, node: &KnowledgeNode) -> bool {
        let path = node.path.to_lowercase();
        self.markers.iter().any(|marker| path.contains(marker.as_str()))
    }
}

#[derive(Clone)]
pub enum ClusterPredicate {
    /// Case-insensitive substring match on the node path.
    PathContains(String),
    /// Case-insensitive tag equality.
    TagMatch(String),
    Custom(NodeFilter),
}

impl ClusterPredicate {
    pub fn phonetic() -> Self {
        Self::PathContains(PHONETIC_NEEDLE.to_string())
    }

    pub fn matches(&self, node: &KnowledgeNode) -> bool {
        match self {
            Self::PathContains(needle) => node
                .path
                .to_lowercase()
                .contains(needle.to_lowercase().as_str()),
            Self::TagMatch(tag) => node.has_tag(tag),
            Self::Custom(filter) => filter(node),
        }
    }
}

impl fmt::Debug for ClusterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathContains(needle) => f.debug_tuple("PathContains").field(needle).finish(),
            Self::TagMatch(tag) => f.debug_tuple("TagMatch").field(tag).finish(),
            Self::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub classifier: StaticClassifier,
    pub cluster: ClusterPredicate,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            classifier: StaticClassifier::default(),
            cluster: ClusterPredicate::phonetic(),
        }
    }
}

pub fn audit(nodes: &[KnowledgeNode], options: &AuditOptions) -> AuditReport {
    let mut stats = AuditStats {
        total_nodes: nodes.len(),
        ..AuditStats::default()
    };

    let node_paths: HashSet<&str> = nodes.iter().map(|n| n.path.as_str()).collect();
    let mut ancestors: HashSet<String> = HashSet::new();

    for node in nodes {
        if let Some(root) = node.root_category() {
            *stats.categories.entry(root.to_string()).or_default() += 1;
        }
        ancestors.extend(node.ancestors());

        if options.classifier.is_static(node) {
            stats.static_count += 1;
        } else {
            stats.signal_count += 1;
        }
    }

    stats.structural_nodes = ancestors
        .iter()
        .filter(|ancestor| !node_paths.contains(ancestor.as_str()))
        .count();

    let cluster = nodes
        .iter()
        .filter(|node| options.cluster.matches(node))
        .cloned()
        .collect::<Vec<_>>();

    debug!(
        total = stats.total_nodes,
        signal = stats.signal_count,
        static_residue = stats.static_count,
        structural = stats.structural_nodes,
        categories = stats.categories.len(),
        cluster = cluster.len(),
        predicate = ?options.cluster,
        "substrate audit complete"
    );

    AuditReport { stats, cluster }
}

/// Audit with the default markers and the phonetic cluster predicate.
pub fn audit_phonetic(nodes: &[KnowledgeNode]) -> AuditReport {
    audit(nodes, &AuditOptions::default())
}
