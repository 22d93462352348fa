//! Split command handler
//!
//! Runs a split session non-interactively: one `--assign` per segment of the
//! source code, in document order, naming a new code or `-` for uncoded.

use std::path::PathBuf;

use anyhow::{Context, Result};

use qcode_core::lifecycle::SplitReport;
use qcode_core::{CodeDefinition, Color, Project, SplitSession};

use crate::output::{Output, OutputFormat};
use crate::project_file;

/// Marks a segment as uncoded
const UNCODED: &str = "-";

/// Options for splitting a code
pub struct SplitArgs {
    pub file: PathBuf,
    pub source: String,
    pub new_codes: Vec<String>,
    pub assign: Vec<String>,
    pub write: bool,
}

/// Split one code into new codes
pub fn run(args: SplitArgs, output: &Output) -> Result<()> {
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
        OutputFormat::Quiet => {
            for id in &report.created_codes {
                println!("{}", id);
            }
        }
        OutputFormat::Human => {
            output.success(&format!(
                "Split '{}' into {} code(s): {} segment(s) recoded, {} uncoded",
                args.source,
                report.created_codes.len(),
                report.recoded,
                report.uncoded
            ));
            if !args.write {
                println!("(dry run, use --write to save)");
            }
        }
    }
    Ok(())
}

fn apply(project: &mut Project, args: &SplitArgs) -> Result<SplitReport> {
    let source = project
        .code_by_name(&args.source)
        .with_context(|| format!("Unknown code: '{}'", args.source))?;
    let source_id = source.id;
    let fallback = source.color;

    let definitions = args
        .new_codes
        .iter()
        .map(|spec| parse_new_code(spec, fallback))
        .collect::<Result<Vec<_>>>()?;

    let mut session = SplitSession::begin(&*project, source_id, definitions)
        .context("Could not start split")?;
    for target in &args.assign {
        let target = (target != UNCODED).then_some(target.as_str());
        session.assign_next(target).context("Invalid --assign")?;
    }

    let (decided, total) = session.progress();
    let report = session
        .commit(project)
        .with_context(|| format!("Split not applied ({} of {} segments decided)", decided, total))?;
    Ok(report)
}

/// Parse `NAME` or `NAME:#RRGGBB`
fn parse_new_code(spec: &str, fallback: Color) -> Result<CodeDefinition> {
    let (name, color) = match spec.rsplit_once(':') {
        Some((name, hex)) if hex.starts_with('#') => (
            name,
            hex.parse::<Color>()
                .with_context(|| format!("Invalid color in '{}'", spec))?,
        ),
        _ => (spec, fallback),
    };
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Empty code name in '{}'", spec);
    }
    Ok(CodeDefinition::new(name, color))
}
