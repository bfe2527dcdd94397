//! Dictionary-style highlight parsing.
//!
//! A highlight is a definition when it reads `word (part of speech): definition`,
//! optionally wrapped in quotation marks. Most highlights are not definitions, so a
//! non-match is simply `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::MatchField;
use crate::readwise::{Highlight, HighlightBatch};

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\s*\(([^)]*)\):\s*(.*)$").expect("definition pattern compiles")
});

const QUOTES: &[char] = &['"', '“', '”', '„', '«', '»', '「', '」'];

pub const NOT_AVAILABLE: &str = "N/A";

/// The three captured parts of a definition highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub word: String,
    pub part_of_speech: String,
    pub definition: String,
}

/// A definition together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionRecord {
    pub word: String,
    pub part_of_speech: String,
    pub definition: String,
    pub source_title: String,
    pub source_author: Option<String>,
    pub highlight_url: String,
    pub highlight_id: String,
}

fn clean(s: &str) -> &str {
    s.trim().trim_matches(QUOTES).trim()
}

pub fn extract(text: &str) -> Option<Definition> {
    let caps = DEFINITION.captures(clean(text))?;

    let word = clean(&caps[1]);
    if word.is_empty() {
        return None;
    }

    Some(Definition {
        word: word.to_string(),
        part_of_speech: clean(&caps[2]).to_string(),
        definition: clean(&caps[3]).to_string(),
    })
}

fn record(batch: &HighlightBatch, highlight: &Highlight, def: Definition) -> DefinitionRecord {
    DefinitionRecord {
        word: def.word,
        part_of_speech: def.part_of_speech,
        definition: def.definition,
        source_title: batch
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(NOT_AVAILABLE)
            .to_string(),
        source_author: batch
            .author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string),
        highlight_url: highlight.readwise_url.clone(),
        highlight_id: highlight.id.clone(),
    }
}

pub fn extract_definitions(batches: &[HighlightBatch], field: MatchField) -> Vec<DefinitionRecord> {
    let mut definitions = Vec::new();

    for batch in batches {
        for highlight in &batch.highlights {
            let text = match field {
                MatchField::Note => &highlight.note,
                MatchField::Text => &highlight.text,
            };

            if let Some(def) = extract(text) {
                tracing::debug!(highlight_id = %highlight.id, word = %def.word, "matched definition");
                definitions.push(record(batch, highlight, def));
            }
        }
    }

    tracing::info!(count = definitions.len(), "extracted dictionary definitions");
    definitions
}
