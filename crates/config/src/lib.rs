use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Env var overriding `substrate.store_path`.
pub const STORE_PATH_ENV: &str = "VANGUARD_STORE_PATH";
/// Env var overriding `telemetry.log_level`.
pub const LOG_LEVEL_ENV: &str = "VANGUARD_LOG";

const PHONETIC_NEEDLE: &str = "phonetic";
const PHONETIC_MASTER_PATH: &str = "Philosophy/Axioms/The_Phonetic_Key";

// ── Synthesis strategy ────────────────────────────────────────────────────────

/// How the master node's content is produced.
///
/// | Strategy     | Behaviour                                                  |
/// |--------------|------------------------------------------------------------|
/// | `canon`      | Fixed hand-authored document; source content is not read.  |
/// | `extractive` | One excerpt section per source, in cluster order.          |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Canon,
    Extractive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// JSON snapshot file holding the node collection.
    pub store_path: String,
    /// Case-insensitive path substring selecting the consolidation cluster.
    pub cluster_needle: String,
    /// When non-empty, cluster membership is decided by this tag instead of
    /// `cluster_needle`.
    pub cluster_tag: String,
    pub master_path: String,
    pub archive_root: String,
    /// Path fragments that classify a node as static residue.
    pub static_markers: Vec<String>,
    pub strategy: StrategyKind,
    /// Heading of the extractive master document.
    pub extractive_title: String,
    /// Per-source excerpt limit (in chars) for the extractive strategy.
    pub extractive_max_chars: usize,
    /// Heading of a custom canon document.
    pub canon_title: String,
    /// Body of a custom canon document. Empty selects the built-in phonetic
    /// canon, which is only accepted for the phonetic target.
    pub canon_body: String,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            store_path: ".vanguard/substrate/nodes.json".to_string(),
            cluster_needle: PHONETIC_NEEDLE.to_string(),
            cluster_tag: String::new(),
            master_path: PHONETIC_MASTER_PATH.to_string(),
            archive_root: "Archive/Legacy_Fragments/Phonetics/".to_string(),
            static_markers: ["_v", "draft", "old", "backup", "archive"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            strategy: StrategyKind::Canon,
            extractive_title: "Synthesis".to_string(),
            extractive_max_chars: 600,
            canon_title: String::new(),
            canon_body: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub substrate: SubstrateConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var(STORE_PATH_ENV) {
            if !value.is_empty() {
                config.substrate.store_path = value;
            }
        }

        if let Ok(level) = env::var(LOG_LEVEL_ENV) {
            if !level.is_empty() {
                config.telemetry.log_level = level;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.substrate;
        if s.store_path.trim().is_empty() {
            bail!("substrate.store_path must not be empty");
        }
        if s.cluster_needle.trim().is_empty() && s.cluster_tag.trim().is_empty() {
            bail!("one of substrate.cluster_needle or substrate.cluster_tag must be set");
        }
        if s.master_path.trim().is_empty() || s.archive_root.trim().is_empty() {
            bail!("substrate.master_path and substrate.archive_root must be set");
        }
        if s.strategy == StrategyKind::Extractive && s.extractive_max_chars == 0 {
            bail!("substrate.extractive_max_chars must be positive for the extractive strategy");
        }
        if s.strategy == StrategyKind::Canon
            && s.canon_body.trim().is_empty()
            && s.retargeted()
        {
            bail!(
                "substrate.canon_body must be set when the canon strategy targets {}",
                s.master_path
            );
        }
        Ok(())
    }
}

impl SubstrateConfig {
    /// Whether the cluster or master path differs from the phonetic
    /// consolidation the built-in canon was written for.
    pub fn retargeted(&self) -> bool {
        let needle_moved = self.cluster_tag.trim().is_empty()
            && !self.cluster_needle.trim().eq_ignore_ascii_case(PHONETIC_NEEDLE);
        needle_moved || self.master_path != PHONETIC_MASTER_PATH
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_target_the_phonetic_consolidation() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.substrate.cluster_needle, "phonetic");
        assert_eq!(cfg.substrate.master_path, "Philosophy/Axioms/The_Phonetic_Key");
        assert_eq!(
            cfg.substrate.archive_root,
            "Archive/Legacy_Fragments/Phonetics/"
        );
        assert_eq!(
            cfg.substrate.static_markers,
            vec!["_v", "draft", "old", "backup", "archive"]
        );
        assert_eq!(cfg.substrate.strategy, StrategyKind::Canon);
        assert_eq!(cfg.telemetry.log_level, "info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.substrate.cluster_needle, "phonetic");
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            r#"
[substrate]
cluster_needle = "quantum"
master_path = "Research/Quantum_Master"
strategy = "extractive"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.substrate.cluster_needle, "quantum");
        assert_eq!(cfg.substrate.master_path, "Research/Quantum_Master");
        assert_eq!(cfg.substrate.strategy, StrategyKind::Extractive);
        assert_eq!(cfg.substrate.extractive_max_chars, 600);
        assert_eq!(
            cfg.substrate.archive_root,
            "Archive/Legacy_Fragments/Phonetics/"
        );
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cfg.toml");
        let mut cfg = AppConfig::default();
        cfg.substrate.cluster_tag = "phonetics".to_string();
        cfg.substrate.static_markers = vec!["tmp".to_string()];
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.substrate.cluster_tag, "phonetics");
        assert_eq!(loaded.substrate.static_markers, vec!["tmp"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.substrate.cluster_needle.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.substrate.strategy = StrategyKind::Extractive;
        cfg.substrate.extractive_max_chars = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retargeted_canon_needs_its_own_body() {
        let mut cfg = AppConfig::default();
        cfg.substrate.cluster_needle = "quantum".to_string();
        cfg.substrate.master_path = "Research/Quantum_Master".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("canon_body"));

        cfg.substrate.canon_title = "Quantum".to_string();
        cfg.substrate.canon_body = "Entanglement notes.".to_string();
        assert!(cfg.validate().is_ok());

        let mut cfg = AppConfig::default();
        cfg.substrate.master_path = "Topics/Sound".to_string();
        assert!(cfg.validate().is_err());
        cfg.substrate.strategy = StrategyKind::Extractive;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn strategy_kind_serde_labels() {
        for (kind, label) in [
            (StrategyKind::Canon, "\"canon\""),
            (StrategyKind::Extractive, "\"extractive\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), label);
        }
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    #[test]
    fn env_overrides_store_path_and_log_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(
            &path,
            r#"
[substrate]
store_path = "from-file.json"

[telemetry]
log_level = "warn"
"#,
        )
        .unwrap();

        // SAFETY: the only test touching these env vars.
        unsafe {
            env::set_var(STORE_PATH_ENV, "from-env.json");
            env::set_var(LOG_LEVEL_ENV, "debug");
        }
        let cfg = AppConfig::load_from(&path).unwrap();
        unsafe {
            env::remove_var(STORE_PATH_ENV);
            env::remove_var(LOG_LEVEL_ENV);
        }
        assert_eq!(cfg.substrate.store_path, "from-env.json");
        assert_eq!(cfg.telemetry.log_level, "debug");
    }
}
