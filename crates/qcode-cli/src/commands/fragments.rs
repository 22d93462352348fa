//! Fragments command handler

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;

use qcode_core::overlay::Marker;
use qcode_core::{Config, Project, SearchMatcher, StyleResolver, StyledFragment};

use crate::output::{preview, Output, OutputFormat};
use crate::project_file;

/// Options for rendering a window of a project
pub struct FragmentsArgs {
    pub file: PathBuf,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub search: Option<String>,
    pub active_match: usize,
    pub no_colors: bool,
}

/// One row of the rendering plan
#[derive(Debug, Serialize)]
struct FragmentRow {
    start: usize,
    end: usize,
    text: String,
    covering: Vec<&'static str>,
    css: String,
    markers: Vec<String>,
}

/// Print the styled rendering plan of a window
pub fn show(args: FragmentsArgs, config: &Config, output: &Output) -> Result<()> {
    let project = project_file::load(&args.file)?;
    let rows = render_rows(&project, &args, config)?;

    match output.format {
        OutputFormat::Json => output.print_json(&rows)?,
        OutputFormat::Quiet => {
            for row in &rows {
                println!("{}\t{}", row.start, row.end);
            }
        }
        OutputFormat::Human => {
            for row in &rows {
                let markers = if row.markers.is_empty() {
                    String::new()
                } else {
                    format!(" {}", row.markers.join(" "))
                };
                println!(
                    "[{:>5}, {:>5}) {:<32}{} {}",
                    row.start,
                    row.end,
                    format!("\"{}\"", preview(&row.text, 30)),
                    markers,
                    row.css
                );
            }
            println!("\n{} fragment(s)", rows.len());
        }
    }
    Ok(())
}

fn render_rows(project: &Project, args: &FragmentsArgs, config: &Config) -> Result<Vec<FragmentRow>> {
    let doc = &project.document;
    let start = args.start.unwrap_or(0);
    let end = args.end.unwrap_or(doc.len());
    if start > end {
        bail!("Window start {} is past its end {}", start, end);
    }

    let mut options = config.style_options();
    if args.no_colors {
        options.show_colors = false;
    }

    let mut annotations = project.annotations().to_vec();
    if let Some(query) = &args.search {
        let mut matcher = SearchMatcher::new();
        matcher.update(query, doc.content());
        for _ in 0..args.active_match {
            matcher.next_match();
        }
        options.active_match_start = matcher.current_start();
        annotations.extend(matcher.annotations());
    }

    let window = doc.window(start, end);
    let resolver = StyleResolver::new(project.codes(), options);
    let plan = resolver.render(doc.len(), window, &annotations)?;

    Ok(plan.iter().map(|styled| to_row(project, styled)).collect())
}

fn to_row(project: &Project, styled: &StyledFragment<'_>) -> FragmentRow {
    let fragment = &styled.fragment;
    let markers = styled
        .style
        .markers
        .iter()
        .map(|marker| match marker {
            Marker::Code { code, .. } => {
                let name = project.code(*code).map_or("?", |c| c.name.as_str());
                format!("<{}>", name)
            }
            Marker::Memo { title, .. } => format!("[memo: {}]", title),
        })
        .collect();

    FragmentRow {
        start: fragment.global_start,
        end: fragment.global_end,
        text: fragment.text.to_string(),
        covering: fragment.covering.iter().map(|a| a.kind()).collect(),
        css: styled.style.css(),
        markers,
    }
}
