use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SubstrateError};
use crate::schema::{KnowledgeNode, validate_path};

pub const PHONETIC_MASTER_PATH: &str = "Philosophy/Axioms/The_Phonetic_Key";
pub const PHONETIC_ARCHIVE_ROOT: &str = "Archive/Legacy_Fragments/Phonetics/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynthesisOperation {
    /// Collapse the cluster into one master node and archive every source.
    MergeAndArchive,
}

/// What happens to a source node when a plan is applied.
///
/// There is intentionally no delete variant: archived content stays
/// recoverable under its destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveAction {
    Move,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDisposition {
    pub original_path: String,
    pub action: ArchiveAction,
    pub destination: String,
    /// Timestamp of the source snapshot the plan was computed from.
    #[serde(rename = "lastUpdated")]
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisPlan {
    pub target_master_node: String,
    pub operation: SynthesisOperation,
    pub sources: Vec<SourceDisposition>,
}

/// Where consolidated content goes and where the originals are archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTarget {
    pub master_path: String,
    pub archive_root: String,
}

impl PlanTarget {
    pub fn new(master_path: impl Into<String>, archive_root: impl Into<String>) -> Self {
        let mut archive_root = archive_root.into();
        if !archive_root.ends_with('/') {
            archive_root.push('/');
        }
        Self {
            master_path: master_path.into(),
            archive_root,
        }
    }

    pub fn phonetic() -> Self {
        Self::new(PHONETIC_MASTER_PATH, PHONETIC_ARCHIVE_ROOT)
    }

    /// `Research/Phonetic_Map` @ 1000 → `<root>Research_Phonetic_Map_1000.json`.
    pub fn archive_destination(&self, node: &KnowledgeNode) -> String {
        format!(
            "{}{}_{}.json",
            self.archive_root,
            node.path.replace('/', "_"),
            node.last_updated
        )
    }
}

impl Default for PlanTarget {
    fn default() -> Self {
        Self::phonetic()
    }
}

/// Build the consolidation plan for `cluster`. Performs no I/O.
pub fn plan(cluster: &[KnowledgeNode], target: &PlanTarget) -> Result<SynthesisPlan> {
    if cluster.is_empty() {
        return Err(SubstrateError::EmptyCluster);
    }
    validate_path(&target.master_path)?;
    validate_path(target.archive_root.trim_end_matches('/'))?;

    let mut claimed: HashMap<String, &str> = HashMap::with_capacity(cluster.len());
    let mut sources = Vec::with_capacity(cluster.len());

    for node in cluster {
        node.validate_path()?;

        let destination = target.archive_destination(node);
        if let Some(first) = claimed.get(&destination) {
            warn!(%destination, first = %first, second = %node.path, "archive destination collision");
            return Err(SubstrateError::Collision {
                destination,
                first: first.to_string(),
                second: node.path.clone(),
            });
        }
        claimed.insert(destination.clone(), node.path.as_str());

        sources.push(SourceDisposition {
            original_path: node.path.clone(),
            action: ArchiveAction::Move,
            destination,
            last_updated: node.last_updated,
        });
    }

    debug!(
        master = %target.master_path,
        sources = sources.len(),
        "synthesis plan built"
    );

    Ok(SynthesisPlan {
        target_master_node: target.master_path.clone(),
        operation: SynthesisOperation::MergeAndArchive,
        sources,
    })
}

pub fn plan_phonetic(cluster: &[KnowledgeNode]) -> Result<SynthesisPlan> {
    plan(cluster, &PlanTarget::phonetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, ts: i64) -> KnowledgeNode {
        KnowledgeNode::new(path, "fragment").at(ts)
    }

    #[test]
    fn phonetic_plan_archives_each_source_in_order() {
        let cluster = vec![
            node("Philosophy/Phonetics/A", 1000),
            node("Philosophy/Phonetics/B", 2000),
        ];
        let plan = plan_phonetic(&cluster).unwrap();

        assert_eq!(plan.target_master_node, "Philosophy/Axioms/The_Phonetic_Key");
        assert_eq!(plan.operation, SynthesisOperation::MergeAndArchive);
        assert_eq!(plan.sources.len(), 2);
        assert_eq!(plan.sources[0].original_path, "Philosophy/Phonetics/A");
        assert_eq!(plan.sources[0].action, ArchiveAction::Move);
        assert_eq!(
            plan.sources[0].destination,
            "Archive/Legacy_Fragments/Phonetics/Philosophy_Phonetics_A_1000.json"
        );
        assert_eq!(plan.sources[1].original_path, "Philosophy/Phonetics/B");
        assert_eq!(
            plan.sources[1].destination,
            "Archive/Legacy_Fragments/Phonetics/Philosophy_Phonetics_B_2000.json"
        );
    }

    #[test]
    fn input_order_is_preserved_without_sorting() {
        let cluster = vec![node("Z/phonetic", 5), node("A/phonetic", 1), node("M/phonetic", 3)];
        let plan = plan_phonetic(&cluster).unwrap();
        let originals = plan
            .sources
            .iter()
            .map(|s| s.original_path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(originals, vec!["Z/phonetic", "A/phonetic", "M/phonetic"]);
        assert!(plan.sources.iter().all(|s| s.action == ArchiveAction::Move));
    }

    #[test]
    fn empty_cluster_is_rejected() {
        assert!(matches!(plan_phonetic(&[]), Err(SubstrateError::EmptyCluster)));
    }

    #[test]
    fn identical_path_and_timestamp_collide() {
        let cluster = vec![node("Research/Phonetic_Map", 42), node("Research/Phonetic_Map", 42)];
        match plan_phonetic(&cluster) {
            Err(SubstrateError::Collision {
                destination,
                first,
                second,
            }) => {
                assert_eq!(
                    destination,
                    "Archive/Legacy_Fragments/Phonetics/Research_Phonetic_Map_42.json"
                );
                assert_eq!(first, "Research/Phonetic_Map");
                assert_eq!(second, "Research/Phonetic_Map");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn same_path_different_timestamps_do_not_collide() {
        let cluster = vec![node("Research/Phonetic_Map", 1), node("Research/Phonetic_Map", 2)];
        assert_eq!(plan_phonetic(&cluster).unwrap().sources.len(), 2);
    }

    #[test]
    fn malformed_source_path_is_invalid_input() {
        let cluster = vec![node("Good/phonetic", 1), node("", 2)];
        assert!(matches!(
            plan_phonetic(&cluster),
            Err(SubstrateError::InvalidInput { .. })
        ));
    }

    #[test]
    fn custom_target_gets_trailing_separator() {
        let target = PlanTarget::new("Topics/Master", "Archive/Topics");
        assert_eq!(target.archive_root, "Archive/Topics/");
        let plan = plan(&[node("Topics/x", 7)], &target).unwrap();
        assert_eq!(plan.target_master_node, "Topics/Master");
        assert_eq!(plan.sources[0].destination, "Archive/Topics/Topics_x_7.json");
    }

    #[test]
    fn plan_serializes_with_screaming_tags() {
        let plan = plan_phonetic(&[node("P/phonetic", 1)]).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["operation"], "MERGE_AND_ARCHIVE");
        assert_eq!(json["sources"][0]["action"], "MOVE");
    }
}
