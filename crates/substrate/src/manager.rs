//! Application-side coordination: preview a synthesis against a fresh
//! snapshot, then apply it as one serialized unit.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use vanguard_config::{StrategyKind, SubstrateConfig};

use crate::audit::{AuditOptions, AuditReport, ClusterPredicate, StaticClassifier, audit};
use crate::error::{Result, SubstrateError};
use crate::plan::{PlanTarget, SynthesisPlan, plan};
use crate::schema::KnowledgeNode;
use crate::store::NodeRepository;
use crate::synthesize::{SynthesisStrategy, synthesize_now};

const EVENT_CAP: usize = 64;

/// Tag added to every node written into the archive.
pub const ARCHIVED_TAG: &str = "archived";
/// Tag carried by a freshly created master node.
pub const SYNTHESIZED_TAG: &str = "synthesized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubstrateEvent {
    NodeWritten { path: String },
    NodeRemoved { path: String },
    Synthesized { master_path: String, archived: usize },
}

#[derive(Debug, Clone, Default)]
pub struct SubstrateSettings {
    pub audit: AuditOptions,
    pub target: PlanTarget,
    pub strategy: SynthesisStrategy,
}

impl SubstrateSettings {
    pub fn from_config(config: &SubstrateConfig) -> Self {
        let cluster = if config.cluster_tag.trim().is_empty() {
            ClusterPredicate::PathContains(config.cluster_needle.clone())
        } else {
            ClusterPredicate::TagMatch(config.cluster_tag.clone())
        };
        let strategy = match config.strategy {
            StrategyKind::Canon if config.canon_body.trim().is_empty() => {
                SynthesisStrategy::phonetic_canon()
            }
            StrategyKind::Canon => SynthesisStrategy::Canon {
                title: if config.canon_title.trim().is_empty() {
                    config.extractive_title.clone()
                } else {
                    config.canon_title.clone()
                },
                body: config.canon_body.clone(),
            },
            StrategyKind::Extractive => SynthesisStrategy::extractive(
                config.extractive_title.clone(),
                config.extractive_max_chars,
            ),
        };
        Self {
            audit: AuditOptions {
                classifier: StaticClassifier::new(&config.static_markers),
                cluster,
            },
            target: PlanTarget::new(config.master_path.clone(), config.archive_root.clone()),
            strategy,
        }
    }
}

/// Everything a caller needs to show before asking for confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisPreview {
    pub report: AuditReport,
    pub plan: SynthesisPlan,
    pub master_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub master_path: String,
    pub archived: Vec<String>,
    pub removed: usize,
}

pub struct SubstrateManager<R: NodeRepository> {
    repo: R,
    settings: SubstrateSettings,
    /// Serializes plan application against every other write made through
    /// the manager.
    apply_lock: Mutex<()>,
    events: broadcast::Sender<SubstrateEvent>,
}

impl<R: NodeRepository> SubstrateManager<R> {
    pub fn new(repo: R, settings: SubstrateSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAP);
        Self {
            repo,
            settings,
            apply_lock: Mutex::new(()),
            events,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &SubstrateSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubstrateEvent> {
        self.events.subscribe()
    }

    pub async fn nodes(&self) -> Result<Vec<KnowledgeNode>> {
        Ok(self.repo.get_all().await?)
    }

    pub async fn audit(&self) -> Result<AuditReport> {
        let nodes = self.repo.get_all().await?;
        Ok(audit(&nodes, &self.settings.audit))
    }

    /// Compute audit, plan and master content without mutating anything.
    ///
    /// The master node and anything already under the archive root are
    /// outputs of earlier syntheses and are never planned as sources.
    pub async fn preview(&self) -> Result<SynthesisPreview> {
        let report = self.audit().await?;
        let target = &self.settings.target;
        let candidates = report
            .cluster
            .iter()
            .filter(|n| n.path != target.master_path && !n.path.starts_with(&target.archive_root))
            .cloned()
            .collect::<Vec<_>>();
        let plan = plan(&candidates, target)?;
        let master_content = synthesize_now(&candidates, &self.settings.strategy)?;
        Ok(SynthesisPreview {
            report,
            plan,
            master_content,
        })
    }

    /// Apply a previewed plan.
    ///
    /// Order: master node, then every archive entry, then removal of the
    /// originals. A failure before the removal phase leaves every original in
    /// place. An original rewritten after the stale check (by a writer that
    /// bypasses the manager) is kept rather than removed.
    pub async fn apply(&self, preview: &SynthesisPreview) -> Result<ApplyOutcome> {
        let _guard = self.apply_lock.lock().await;
        let plan = &preview.plan;
        if plan.sources.is_empty() {
            return Err(SubstrateError::EmptyCluster);
        }

        let current = self.repo.get_all().await?;
        let by_path: HashMap<&str, &KnowledgeNode> =
            current.iter().map(|n| (n.path.as_str(), n)).collect();

        let mut originals = Vec::with_capacity(plan.sources.len());
        for source in &plan.sources {
            if source.original_path == plan.target_master_node {
                return Err(SubstrateError::invalid(
                    &source.original_path,
                    "master node path is also a synthesis source",
                ));
            }
            match by_path.get(source.original_path.as_str()) {
                Some(node) if node.last_updated == source.last_updated => originals.push(*node),
                _ => {
                    warn!(path = %source.original_path, "refusing stale synthesis plan");
                    return Err(SubstrateError::StalePlan {
                        path: source.original_path.clone(),
                    });
                }
            }
            if let Some(occupant) = by_path.get(source.destination.as_str()) {
                return Err(SubstrateError::Collision {
                    destination: source.destination.clone(),
                    first: occupant.path.clone(),
                    second: source.original_path.clone(),
                });
            }
        }

        let master = match by_path.get(plan.target_master_node.as_str()) {
            Some(existing) => existing.with_content(preview.master_content.clone()),
            None => KnowledgeNode::new(&plan.target_master_node, preview.master_content.clone())
                .tagged([SYNTHESIZED_TAG]),
        };
        self.repo.put(master).await?;

        let mut archived = Vec::with_capacity(originals.len());
        for (source, original) in plan.sources.iter().zip(&originals) {
            let snapshot = serde_json::to_string_pretty(original).map_err(anyhow::Error::from)?;
            let tags = original
                .tags
                .iter()
                .map(String::as_str)
                .chain([ARCHIVED_TAG])
                .collect::<BTreeSet<_>>();
            self.repo
                .put(KnowledgeNode::new(&source.destination, snapshot).tagged(tags))
                .await?;
            archived.push(source.destination.clone());
        }

        let mut removed = 0;
        for source in &plan.sources {
            if self
                .repo
                .remove_if_unchanged(&source.original_path, source.last_updated)
                .await?
            {
                removed += 1;
            } else {
                warn!(path = %source.original_path, "original changed during apply; kept");
            }
        }

        info!(
            master = %plan.target_master_node,
            archived = archived.len(),
            removed,
            "synthesis plan applied"
        );
        let _ = self.events.send(SubstrateEvent::Synthesized {
            master_path: plan.target_master_node.clone(),
            archived: archived.len(),
        });

        Ok(ApplyOutcome {
            master_path: plan.target_master_node.clone(),
            archived,
            removed,
        })
    }

    pub async fn put_node(&self, node: KnowledgeNode) -> Result<()> {
        node.validate_path()?;
        let _guard = self.apply_lock.lock().await;
        let path = node.path.clone();
        self.repo.put(node).await?;
        let _ = self.events.send(SubstrateEvent::NodeWritten { path });
        Ok(())
    }

    pub async fn remove_node(&self, path: &str) -> Result<bool> {
        let _guard = self.apply_lock.lock().await;
        let removed = self.repo.remove(path).await?;
        if removed {
            let _ = self.events.send(SubstrateEvent::NodeRemoved {
                path: path.to_string(),
            });
        }
        Ok(removed)
    }
}
