//! Project file loading and saving
//!
//! A project file is the JSON form of `Project`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use qcode_core::Project;

/// Read and validate a project file
pub fn load(path: &Path) -> Result<Project> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file: {:?}", path))?;
    let project: Project = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse project file: {:?}", path))?;
    project
        .validate()
        .with_context(|| format!("Project file is corrupt: {:?}", path))?;
    debug!("Loaded project {:?}: {:?}", path, project.stats());
    Ok(project)
}

/// Write a project file, replacing the previous contents
pub fn save(path: &Path, project: &Project) -> Result<()> {
    let content = serde_json::to_string_pretty(project).context("Failed to serialize project")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write project file: {:?}", tmp))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace project file: {:?}", path))?;
    debug!("Saved project {:?}", path);
    Ok(())
}
