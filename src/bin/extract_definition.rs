use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::{self, BufRead};
use wordsync::extract::{Definition, extract};

#[derive(Parser)]
#[command(name = "extract_definition")]
#[command(about = "Check which highlight texts parse as dictionary definitions")]
struct Cli {
    /// Highlight text to parse. Reads one highlight per line from stdin when omitted.
    text: Option<String>,
    #[arg(short, long)]
    pretty: bool,
    /// Also print the lines that did not match.
    #[arg(short, long)]
    all: bool,
}

#[derive(Debug, Serialize)]
struct Parsed {
    input: String,
    definition: Option<Definition>,
}

fn parse_lines(lines: impl IntoIterator<Item = String>, all: bool) -> Vec<Parsed> {
    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .map(|input| Parsed {
            definition: extract(&input),
            input,
        })
        .filter(|p| all || p.definition.is_some())
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let lines = match cli.text {
        Some(text) => vec![text],
        None => io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("Failed to read highlights from stdin")?,
    };

    let parsed = parse_lines(lines, cli.all);

    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    } else {
        println!("{}", serde_json::to_string(&parsed)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let lines = vec![
            "“gregarious (adj): fond of company”".to_string(),
            "".to_string(),
            "a plain highlight".to_string(),
        ];

        let matched = parse_lines(lines.clone(), false);
        assert_eq!(matched.len(), 1);
        assert_eq!(
            matched[0].definition.as_ref().map(|d| d.word.as_str()),
            Some("gregarious")
        );

        let everything = parse_lines(lines, true);
        assert_eq!(everything.len(), 2);
        assert!(everything[1].definition.is_none());
    }
}
