use std::io;
use std::io::IsTerminal;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, TimeZone};

use vanguard_substrate::{
    AuditReport, JsonFileRepository, KnowledgeNode, SubstrateError, SubstrateManager,
    SynthesisPreview,
};

type Manager = SubstrateManager<JsonFileRepository>;

pub(crate) async fn run_audit(manager: &Manager, json: bool) -> Result<()> {
    let report = manager.audit().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &AuditReport) {
    let stats = &report.stats;
    println!("── substrate audit ──────────────────────────────────");
    println!("  total:       {}", stats.total_nodes);
    println!("  signal:      {}", stats.signal_count);
    println!("  static:      {}", stats.static_count);
    println!("  structural:  {}", stats.structural_nodes);

    println!();
    println!("── categories ───────────────────────────────────────");
    if stats.categories.is_empty() {
        println!("  (none)");
    }
    for (category, count) in &stats.categories {
        println!("  {category:<24} {count}");
    }

    println!();
    println!("── cluster ({}) ──────────────────────────────────────", report.cluster.len());
    for node in &report.cluster {
        println!("  {}  [{}]", node.path, format_millis(node.last_updated));
    }
}

pub(crate) async fn run_plan(manager: &Manager, json: bool) -> Result<()> {
    let preview = match manager.preview().await {
        Ok(preview) => preview,
        Err(SubstrateError::EmptyCluster) => {
            println!("no cluster to consolidate");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }
    print_preview(&preview);
    Ok(())
}

fn print_preview(preview: &SynthesisPreview) {
    let plan = &preview.plan;
    println!("── synthesis plan ───────────────────────────────────");
    println!("  operation: {:?}", plan.operation);
    println!("  master:    {}", plan.target_master_node);
    println!("  sources:   {}", plan.sources.len());
    for (index, source) in plan.sources.iter().enumerate() {
        println!(
            "  {}. {:?} {} -> {}",
            index + 1,
            source.action,
            source.original_path,
            source.destination
        );
    }
    println!();
    println!("── master content ───────────────────────────────────");
    println!("{}", preview.master_content);
}

pub(crate) async fn run_apply(manager: &Manager, yes: bool) -> Result<()> {
    let preview = match manager.preview().await {
        Ok(preview) => preview,
        Err(SubstrateError::EmptyCluster) => {
            println!("no cluster to consolidate");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    print_preview(&preview);

    if !yes {
        if !io::stdin().is_terminal() {
            bail!("refusing to apply a synthesis plan in non-interactive mode without --yes");
        }

        print!(
            "This archives {} node(s) and rewrites {}. Type 'APPLY' to continue: ",
            preview.plan.sources.len(),
            preview.plan.target_master_node
        );
        io::stdout().flush()?;

        let mut confirmation = String::new();
        io::stdin().read_line(&mut confirmation)?;
        if confirmation.trim() != "APPLY" {
            println!("synthesis cancelled");
            return Ok(());
        }
    }

    let outcome = manager.apply(&preview).await?;
    println!("synthesis complete");
    println!("- master: {}", outcome.master_path);
    println!("- archived: {}", outcome.archived.len());
    for destination in &outcome.archived {
        println!("    {destination}");
    }
    println!("- originals removed: {}", outcome.removed);
    Ok(())
}

pub(crate) async fn run_node_put(
    manager: &Manager,
    path: String,
    content: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let existing = manager
        .nodes()
        .await?
        .into_iter()
        .find(|node| node.path == path);

    let node = match (existing, content) {
        (Some(node), Some(content)) if tags.is_empty() => node.with_content(content),
        (Some(node), Some(content)) => node.with_content(content).with_tags(tags),
        (Some(_), None) if tags.is_empty() => {
            println!("nothing to change at {path}");
            return Ok(());
        }
        (Some(node), None) => node.with_tags(tags),
        (None, content) => KnowledgeNode::new(path, content.unwrap_or_default()).tagged(tags),
    };
    let written = node.path.clone();
    manager.put_node(node).await?;
    println!("wrote {written}");
    Ok(())
}

pub(crate) async fn run_node_rm(manager: &Manager, path: &str) -> Result<()> {
    if manager.remove_node(path).await? {
        println!("removed {path}");
    } else {
        println!("no node at {path}");
    }
    Ok(())
}

pub(crate) async fn run_node_ls(manager: &Manager) -> Result<()> {
    let mut nodes = manager.nodes().await?;
    nodes.sort_by(|left, right| left.path.cmp(&right.path));
    println!("nodes ({})", nodes.len());
    for node in nodes {
        let tags = if node.tags.is_empty() {
            String::new()
        } else {
            format!(" #{}", node.tags.join(" #"))
        };
        println!("  {}  [{}]{tags}", node.path, format_millis(node.last_updated));
    }
    Ok(())
}

pub(crate) async fn run_import(manager: &Manager, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let nodes: Vec<KnowledgeNode> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of nodes", file.display()))?;

    let total = nodes.len();
    let mut skipped = 0;
    for node in nodes {
        match manager.put_node(node).await {
            Ok(()) => {}
            Err(SubstrateError::InvalidInput { path, reason }) => {
                eprintln!("skipping {path:?}: {reason}");
                skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    println!("imported {} of {total} node(s)", total - skipped);
    Ok(())
}

fn format_millis(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
