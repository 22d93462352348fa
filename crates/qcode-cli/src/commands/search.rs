//! Search command handler

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use qcode_core::{find_matches, Document, Span};

use crate::output::{preview, Output, OutputFormat};
use crate::project_file;

const CONTEXT_CHARS: usize = 20;

#[derive(Debug, Serialize)]
struct MatchRow {
    #[serde(flatten)]
    span: Span,
    context: String,
}

/// List every match of `query` in the project document
pub fn run(file: PathBuf, query: String, output: &Output) -> Result<()> {
    let project = project_file::load(&file)?;
    let rows = match_rows(&project.document, &query);

    match output.format {
        OutputFormat::Json => output.print_json(&rows)?,
        OutputFormat::Quiet => {
            for row in &rows {
                println!("{}", row.span.start_index);
            }
        }
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("No matches for \"{}\".", query);
                return Ok(());
            }
            for row in &rows {
                println!(
                    "{:>6}..{:<6} {}",
                    row.span.start_index, row.span.end_index, row.context
                );
            }
            println!("\n{} match(es)", rows.len());
        }
    }
    Ok(())
}

fn match_rows(doc: &Document, query: &str) -> Vec<MatchRow> {
    find_matches(query, doc.content())
        .into_iter()
        .map(|span| {
            let start = span.start_index.saturating_sub(CONTEXT_CHARS);
            let end = (span.end_index + CONTEXT_CHARS).min(doc.len());
            let before = doc.window(start, span.start_index).text;
            let hit = doc.window(span.start_index, span.end_index).text;
            let after = doc.window(span.end_index, end).text;
            MatchRow {
                span,
                context: format!(
                    "{}[{}]{}",
                    preview(before, CONTEXT_CHARS),
                    hit,
                    preview(after, CONTEXT_CHARS)
                ),
            }
        })
        .collect()
}
