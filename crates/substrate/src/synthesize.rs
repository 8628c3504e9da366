//! Master-node content generation.
//!
//! Two strategies:
//!
//! 1. **Canon** – emits a fixed, hand-authored document. Source content is
//!    not read; the sources only act as provenance and as the trigger.
//! 2. **Extractive** – derives the document from the sources themselves,
//!    one section per source in input order.
//!
//! Output of either strategy is stable across calls except for the line
//! starting with [`SYNTHESIS_TIMESTAMP_PREFIX`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SubstrateError};
use crate::schema::KnowledgeNode;

pub const SYNTHESIS_TIMESTAMP_PREFIX: &str = "Synthesized: ";

pub const DEFAULT_EXTRACT_CHARS: usize = 600;

const PHONETIC_CANON_TITLE: &str = "The Phonetic Key";

const PHONETIC_CANON_BODY: &str = "\
Every name is first a sound. Before a word is written it is carried by breath, \
and the shape of that breath decides what the word can hold.

## Axiom I: Sound precedes sign
A symbol is a record of something spoken. Spelling drifts; the spoken form is \
the anchor the written form keeps returning to.

## Axiom II: Resonance is meaning under pressure
Words that share a sound share a pressure. Puns, rhymes and echoes are not \
accidents of language but the places where separate ideas touch.

## Axiom III: The key is the listener
A phonetic key does not unlock text. It unlocks the reader, who hears the \
pattern and recognises it as their own.

## Practice
Read aloud. Keep the fragments that still ring when spoken, retire the ones \
that only survive on the page.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SynthesisStrategy {
    Canon { title: String, body: String },
    Extractive { title: String, max_chars_per_source: usize },
}

impl SynthesisStrategy {
    pub fn phonetic_canon() -> Self {
        Self::Canon {
            title: PHONETIC_CANON_TITLE.to_string(),
            body: PHONETIC_CANON_BODY.to_string(),
        }
    }

    pub fn extractive(title: impl Into<String>, max_chars_per_source: usize) -> Self {
        Self::Extractive {
            title: title.into(),
            max_chars_per_source,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Canon { .. } => "canon",
            Self::Extractive { .. } => "extractive",
        }
    }
}

impl Default for SynthesisStrategy {
    fn default() -> Self {
        Self::phonetic_canon()
    }
}

pub fn synthesize(
    sources: &[KnowledgeNode],
    strategy: &SynthesisStrategy,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    for source in sources {
        source.validate_path()?;
    }

    let stamp = format!(
        "{SYNTHESIS_TIMESTAMP_PREFIX}{}",
        generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    );

    let content = match strategy {
        SynthesisStrategy::Canon { title, body } => {
            format!(
                "# {title}\n\n{body}\n\n---\n{stamp}\nProvenance: {} archived fragment(s)\n",
                sources.len()
            )
        }
        SynthesisStrategy::Extractive {
            title,
            max_chars_per_source,
        } => {
            if sources.is_empty() {
                return Err(SubstrateError::EmptyCluster);
            }
            let mut out = format!("# {title}\n\n{stamp}\n");
            for source in sources {
                let leaf = source.leaf().unwrap_or(source.path.as_str());
                let excerpt = truncate_str(source.content.trim(), *max_chars_per_source).trim_end();
                out.push_str(&format!("\n## {leaf}\nsource: {}\n", source.path));
                if !source.tags.is_empty() {
                    out.push_str(&format!("tags: {}\n", source.tags.join(", ")));
                }
                out.push('\n');
                out.push_str(excerpt);
                out.push('\n');
            }
            out
        }
    };

    debug!(
        strategy = strategy.name(),
        sources = sources.len(),
        bytes = content.len(),
        "master content synthesized"
    );
    Ok(content)
}

pub fn synthesize_now(sources: &[KnowledgeNode], strategy: &SynthesisStrategy) -> Result<String> {
    synthesize(sources, strategy, Utc::now())
}

/// Drop the timestamp line so two syntheses can be compared.
pub fn strip_timestamp(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.starts_with(SYNTHESIS_TIMESTAMP_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate `s` to at most `max_chars` Unicode scalar values.
fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn node(path: &str, content: &str) -> KnowledgeNode {
        KnowledgeNode::new(path, content).at(1_000)
    }

    fn cluster() -> Vec<KnowledgeNode> {
        vec![
            node("Philosophy/Phonetics/A", "first fragment"),
            node("Philosophy/Phonetics/B", "second fragment"),
        ]
    }

    #[test]
    fn canon_ignores_source_content() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let strategy = SynthesisStrategy::phonetic_canon();
        let a = synthesize(&cluster(), &strategy, at).unwrap();

        let mut rewritten = cluster();
        rewritten[0] = rewritten[0].with_content("completely different");
        let b = synthesize(&rewritten, &strategy, at).unwrap();

        assert_eq!(a, b);
        assert!(a.starts_with("# The Phonetic Key\n"));
        assert!(a.contains("Synthesized: 2024-01-01T00:00:00.000Z"));
        assert!(!a.contains("first fragment"));
    }

    #[test]
    fn output_differs_only_in_timestamp() {
        let strategy = SynthesisStrategy::phonetic_canon();
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let a = synthesize(&cluster(), &strategy, early).unwrap();
        let b = synthesize(&cluster(), &strategy, late).unwrap();
        assert_ne!(a, b);
        assert_eq!(strip_timestamp(&a), strip_timestamp(&b));

        let extractive = SynthesisStrategy::extractive("Phonetics", 100);
        let c = synthesize(&cluster(), &extractive, early).unwrap();
        let d = synthesize(&cluster(), &extractive, late).unwrap();
        assert_eq!(strip_timestamp(&c), strip_timestamp(&d));
    }

    #[test]
    fn extractive_reads_sources_in_order() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut sources = cluster();
        sources[1] = sources[1].with_tags(["phonetics", "core"]);
        let out = synthesize(&sources, &SynthesisStrategy::extractive("Phonetics", 100), at).unwrap();

        let first = out.find("first fragment").unwrap();
        let second = out.find("second fragment").unwrap();
        assert!(first < second);
        assert!(out.contains("## A\nsource: Philosophy/Phonetics/A\n"));
        assert!(out.contains("tags: core, phonetics\n"));
    }

    #[test]
    fn extractive_truncates_on_char_boundary() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let sources = vec![node("P/phonetic", "äöü-äöü-äöü")];
        let out = synthesize(&sources, &SynthesisStrategy::extractive("T", 3), at).unwrap();
        assert!(out.contains("\näöü\n"));
        assert!(!out.contains("äöü-"));
    }

    #[test]
    fn extractive_requires_sources() {
        let result = synthesize_now(&[], &SynthesisStrategy::extractive("T", 10));
        assert!(matches!(result, Err(SubstrateError::EmptyCluster)));
    }

    #[test]
    fn malformed_source_path_is_rejected() {
        let sources = vec![node("A//B", "x")];
        let result = synthesize_now(&sources, &SynthesisStrategy::phonetic_canon());
        assert!(matches!(result, Err(SubstrateError::InvalidInput { .. })));
    }
}
