//! Codes command handler

use std::path::PathBuf;

use anyhow::Result;

use crate::output::{truncate, Output, OutputFormat};
use crate::project_file;

/// List code definitions with their segment counts
pub fn list(file: PathBuf, output: &Output) -> Result<()> {
    let project = project_file::load(&file)?;
    let codes = project.codes_sorted();

    match output.format {
        OutputFormat::Json => {
            let rows: Vec<_> = codes
                .iter()
                .map(|code| {
                    serde_json::json!({
                        "id": code.id,
                        "name": code.name,
                        "color": code.color,
                        "description": code.description,
                        "segments": project.segments_for_code(code.id).len(),
                    })
                })
                .collect();
            output.print_json(&serde_json::json!({
                "codes": rows,
                "stats": project.stats(),
            }))?;
        }
        OutputFormat::Quiet => {
            for code in &codes {
                println!("{}", code.name);
            }
        }
        OutputFormat::Human => {
            if codes.is_empty() {
                println!("No codes defined.");
                return Ok(());
            }
            for code in &codes {
                println!(
                    "{} | {} | {:<30} ({})",
                    &code.id.to_string()[..8],
                    code.color,
                    truncate(&code.name, 30),
                    project.segments_for_code(code.id).len()
                );
            }
            let stats = project.stats();
            println!(
                "\n{} code(s), {} segment(s), {} highlight(s), {} memo(s)",
                stats.codes, stats.segments, stats.highlights, stats.memos
            );
        }
    }
    Ok(())
}
