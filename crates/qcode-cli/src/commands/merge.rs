//! Merge command handler

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use qcode_core::lifecycle::MergeReport;
use qcode_core::models::CodeId;
use qcode_core::{merge, CodeDefinition, Color, Project};

use crate::output::{Output, OutputFormat};
use crate::project_file;

/// Options for merging codes
pub struct MergeArgs {
    pub file: PathBuf,
    pub sources: Vec<String>,
    pub into: String,
    pub color: Option<String>,
    pub write: bool,
}

/// Merge named codes into one new code
pub fn run(args: MergeArgs, output: &Output) -> Result<()> {
    let mut project = project_file::load(&args.file)?;
    let report = apply(&mut project, &args)?;

    if args.write {
        project_file::save(&args.file, &project)?;
    }

    match output.format {
        OutputFormat::Json => output.print_json(&serde_json::json!({
            "report": report,
            "written": args.write,
        }))?,
        OutputFormat::Quiet => println!("{}", report.code_id),
        OutputFormat::Human => {
            output.success(&format!(
                "Merged {} code(s) into '{}', {} segment(s) reassigned",
                report.removed_codes.len(),
                args.into,
                report.reassigned
            ));
            if !args.write {
                println!("(dry run, use --write to save)");
            }
        }
    }
    Ok(())
}

fn apply(project: &mut Project, args: &MergeArgs) -> Result<MergeReport> {
    let ids = resolve_names(project, &args.sources)?;
    let color = match &args.color {
        Some(hex) => hex
            .parse::<Color>()
            .with_context(|| format!("Invalid color: {}", hex))?,
        // Inherit the first source's color
        None => project
            .code(ids[0])
            .map(|c| c.color)
            .context("Source code disappeared")?,
    };

    let report = merge(project, &ids, CodeDefinition::new(args.into.clone(), color))
        .context("Merge failed, project left unchanged")?;
    Ok(report)
}

/// Map code names to ids, failing on the first unknown name
pub fn resolve_names(project: &Project, names: &[String]) -> Result<Vec<CodeId>> {
    if names.is_empty() {
        bail!("At least one --source code is required");
    }
    names
        .iter()
        .map(|name| {
            project
                .code_by_name(name)
                .map(|c| c.id)
                .with_context(|| format!("Unknown code: '{}'", name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcode_core::{Annotation, Document};

    fn project() -> Project {
        let mut project = Project::new(Document::new("one two three four"));
        for (name, start, end) in [("A", 0, 3), ("B", 4, 7), ("C", 8, 13)] {
            let code = CodeDefinition::new(name, Color::rgb(10, 20, 30));
            let id = code.id;
            project.add_code(code).unwrap();
            project
                .add_annotation(Annotation::code_segment(start, end, id))
                .unwrap();
        }
        project
    }

    fn args(sources: &[&str], into: &str) -> MergeArgs {
        MergeArgs {
            file: PathBuf::new(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            into: into.to_string(),
            color: None,
            write: false,
        }
    }

    #[test]
    fn test_merge_by_name() {
        let mut project = project();
        let report = apply(&mut project, &args(&["A", "B"], "AB")).unwrap();

        assert_eq!(report.reassigned, 2);
        assert!(project.code_by_name("A").is_none());
        assert!(project.code_by_name("B").is_none());
        let merged = project.code_by_name("AB").unwrap();
        assert_eq!(merged.color, Color::rgb(10, 20, 30));
        assert_eq!(project.segments_for_code(merged.id).len(), 2);
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let mut project = project();
        let before = project.clone();
        let err = apply(&mut project, &args(&["A", "Z"], "AZ")).unwrap_err();
        assert!(err.to_string().contains("'Z'"));
        assert_eq!(project, before);
    }

    #[test]
    fn test_bad_color_is_rejected() {
        let mut project = project();
        let mut merge_args = args(&["A"], "A2");
        merge_args.color = Some("blue".to_string());
        assert!(apply(&mut project, &merge_args).is_err());
    }
}
