//! Node storage collaborators.
//!
//! The engine never touches storage; the orchestration layer reads and writes
//! through [`NodeRepository`]. `path` is the logical key: `put` replaces any
//! node already stored under the same path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::schema::KnowledgeNode;

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn get_all(&self) -> Result<Vec<KnowledgeNode>>;

    /// Insert or replace by `path`.
    async fn put(&self, node: KnowledgeNode) -> Result<()>;

    /// Remove the node stored under `path`. Returns `false` when absent.
    async fn remove(&self, path: &str) -> Result<bool>;

    /// Compare-and-remove: drop the node under `path` only while its
    /// `last_updated` still equals `expected`. Returns `false` when the node
    /// is absent or has been rewritten since.
    async fn remove_if_unchanged(&self, path: &str, expected: i64) -> Result<bool>;
}

fn upsert(nodes: &mut Vec<KnowledgeNode>, node: KnowledgeNode) {
    match nodes.iter_mut().find(|existing| existing.path == node.path) {
        Some(slot) => *slot = node,
        None => nodes.push(node),
    }
}

fn remove_path(nodes: &mut Vec<KnowledgeNode>, path: &str) -> bool {
    let before = nodes.len();
    nodes.retain(|n| n.path != path);
    nodes.len() != before
}

fn remove_version(nodes: &mut Vec<KnowledgeNode>, path: &str, expected: i64) -> bool {
    let before = nodes.len();
    nodes.retain(|n| n.path != path || n.last_updated != expected);
    nodes.len() != before
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    nodes: RwLock<Vec<KnowledgeNode>>,
}

impl InMemoryRepository {
    pub fn new(nodes: Vec<KnowledgeNode>) -> Self {
        let mut deduped = Vec::with_capacity(nodes.len());
        for node in nodes {
            upsert(&mut deduped, node);
        }
        Self {
            nodes: RwLock::new(deduped),
        }
    }
}

#[async_trait]
impl NodeRepository for InMemoryRepository {
    async fn get_all(&self) -> Result<Vec<KnowledgeNode>> {
        Ok(self.nodes.read().await.clone())
    }

    async fn put(&self, node: KnowledgeNode) -> Result<()> {
        upsert(&mut *self.nodes.write().await, node);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        Ok(remove_path(&mut *self.nodes.write().await, path))
    }

    async fn remove_if_unchanged(&self, path: &str, expected: i64) -> Result<bool> {
        Ok(remove_version(&mut *self.nodes.write().await, path, expected))
    }
}

/// Whole-collection JSON snapshot on disk.
///
/// Every write rewrites the file through a `.tmp` sibling that is fsync'd and
/// then renamed over the original, so a crash leaves either the old or the new
/// collection, never a torn one. Writers are serialized by an internal lock.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<KnowledgeNode>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse node store {}", self.path.display()))
    }

    async fn overwrite(&self, nodes: &[KnowledgeNode]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = {
            let filename = self
                .path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "nodes.json".to_string());
            self.path.with_file_name(format!("{filename}.tmp"))
        };

        let write_result: Result<()> = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            let rendered = serde_json::to_vec_pretty(nodes)?;
            file.write_all(&rendered).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        debug!(path = %self.path.display(), nodes = nodes.len(), "node store written");
        Ok(())
    }
}

#[async_trait]
impl NodeRepository for JsonFileRepository {
    async fn get_all(&self) -> Result<Vec<KnowledgeNode>> {
        self.load().await
    }

    async fn put(&self, node: KnowledgeNode) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut nodes = self.load().await?;
        upsert(&mut nodes, node);
        self.overwrite(&nodes).await
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut nodes = self.load().await?;
        if !remove_path(&mut nodes, path) {
            return Ok(false);
        }
        self.overwrite(&nodes).await?;
        Ok(true)
    }

    async fn remove_if_unchanged(&self, path: &str, expected: i64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut nodes = self.load().await?;
        if !remove_version(&mut nodes, path, expected) {
            return Ok(false);
        }
        self.overwrite(&nodes).await?;
        Ok(true)
    }
}
