use crate::anki::NewCard;
use crate::config::TemplateFields;
use crate::extract::{DefinitionRecord, NOT_AVAILABLE};

pub const TAGS: [&str; 2] = ["readwise_import", "vocabulary"];

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_back(def: &DefinitionRecord) -> String {
    format!(
        "({pos})<br>{definition}<hr>\
         <small>Source: {title} (by {author})</small><br>\
         <small><a href='{url}'>View on Readwise</a> (ID: {id})</small>",
        pos = escape_html(&def.part_of_speech),
        definition = escape_html(&def.definition),
        title = escape_html(&def.source_title),
        author = escape_html(def.source_author.as_deref().unwrap_or(NOT_AVAILABLE)),
        url = escape_html(&def.highlight_url),
        id = escape_html(&def.highlight_id),
    )
}

pub fn build_card(def: &DefinitionRecord, deck: &str, model: &str, fields: &TemplateFields) -> NewCard {
    NewCard {
        deck: deck.to_string(),
        model: model.to_string(),
        primary_field: fields.primary.clone(),
        primary: def.word.clone(),
        secondary_field: fields.secondary.clone(),
        secondary: render_back(def),
        tags: TAGS.iter().map(|t| t.to_string()).collect(),
    }
}
