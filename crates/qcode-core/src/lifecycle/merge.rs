//! Merging code definitions
//!
//! Every segment coded with one of the source codes is moved to a newly
//! created code, then the source codes are deleted. Either all of it happens
//! or none of it does.

use serde::Serialize;
use tracing::{info, warn};

use super::{atomically, CodeRepository};
use crate::error::{CoreError, CoreResult};
use crate::models::{CodeDefinition, CodeId};

/// Outcome of a successful merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// The newly created code
    pub code_id: CodeId,
    /// Number of segments moved to the new code
    pub reassigned: usize,
    /// Codes that were deleted
    pub removed_codes: Vec<CodeId>,
}

/// Merge `source_ids` into `new_definition`
///
/// The new name may reuse the name of one of the sources, since those are
/// deleted by the same transaction. Any failure is reported as
/// `MergeFailed` with the repository left exactly as before.
pub fn merge<R: CodeRepository>(
    repo: &mut R,
    source_ids: &[CodeId],
    new_definition: CodeDefinition,
) -> CoreResult<MergeReport> {
    let mut sources: Vec<CodeId> = Vec::with_capacity(source_ids.len());
    for id in source_ids {
        if !sources.contains(id) {
            sources.push(*id);
        }
    }

    let result = validate(repo, &sources, &new_definition)
        .and_then(|()| atomically(repo, |repo| apply(repo, &sources, new_definition)));

    match result {
        Ok(report) => {
            info!(
                "Merged {} codes into {} ({} segments reassigned)",
                report.removed_codes.len(),
                report.code_id,
                report.reassigned
            );
            Ok(report)
        }
        Err(e) => {
            warn!("Merge failed: {}", e);
            Err(CoreError::MergeFailed {
                source: Box::new(e),
            })
        }
    }
}

fn validate<R: CodeRepository>(
    repo: &R,
    sources: &[CodeId],
    new_definition: &CodeDefinition,
) -> CoreResult<()> {
    if sources.is_empty() {
        return Err(CoreError::NothingToMerge);
    }
    for id in sources {
        if repo.code(*id).is_none() {
            return Err(CoreError::UnknownCode(*id));
        }
    }
    if let Some(existing) = repo.code_by_name(&new_definition.name) {
        if !sources.contains(&existing.id) {
            return Err(CoreError::DuplicateCodeName(new_definition.name.clone()));
        }
    }
    Ok(())
}

fn apply<R: CodeRepository>(
    repo: &mut R,
    sources: &[CodeId],
    new_definition: CodeDefinition,
) -> CoreResult<MergeReport> {
    let segments: Vec<_> = sources
        .iter()
        .flat_map(|id| repo.segments_for_code(*id))
        .collect();

    // Sources go first so the new code may take over one of their names
    for id in sources {
        repo.remove_code(*id)?;
    }

    let code_id = new_definition.id;
    repo.insert_code(new_definition)?;

    for segment in &segments {
        repo.reassign_segment(*segment, code_id)?;
    }

    Ok(MergeReport {
        code_id,
        reassigned: segments.len(),
        removed_codes: sources.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::testing::FlakyRepository;
    use crate::models::{Annotation, Color, Document};
    use crate::project::Project;

    struct Fixture {
        project: Project,
        trust: CodeId,
        doubt: CodeId,
        other: CodeId,
    }

    fn fixture() -> Fixture {
        let mut project = Project::new(Document::new("I trust them, mostly. Maybe not always."));
        let trust = CodeDefinition::new("Trust", Color::rgb(0, 128, 0));
        let doubt = CodeDefinition::new("Doubt", Color::rgb(128, 0, 0));
        let other = CodeDefinition::new("Other", Color::rgb(0, 0, 128));
        let (t, d, o) = (trust.id, doubt.id, other.id);
        project.add_code(trust).unwrap();
        project.add_code(doubt).unwrap();
        project.add_code(other).unwrap();

        project.add_annotation(Annotation::code_segment(2, 12, t)).unwrap();
        project.add_annotation(Annotation::code_segment(14, 20, d)).unwrap();
        project.add_annotation(Annotation::code_segment(22, 38, d)).unwrap();
        project.add_annotation(Annotation::code_segment(0, 1, o)).unwrap();

        Fixture {
            project,
            trust: t,
            doubt: d,
            other: o,
        }
    }

    #[test]
    fn test_merge_reassigns_and_deletes() {
        let mut f = fixture();
        let merged = CodeDefinition::new("Ambivalence", Color::rgb(200, 200, 0));

        let report = merge(&mut f.project, &[f.trust, f.doubt], merged).unwrap();

        assert_eq!(report.reassigned, 3);
        assert_eq!(report.removed_codes, vec![f.trust, f.doubt]);
        assert!(f.project.code(f.trust).is_none());
        assert!(f.project.code(f.doubt).is_none());
        assert_eq!(f.project.segments_for_code(report.code_id).len(), 3);
        assert_eq!(f.project.segments_for_code(f.other).len(), 1);
        assert!(f.project.validate().is_ok());
    }

    #[test]
    fn test_merge_may_reuse_source_name() {
        let mut f = fixture();
        let merged = CodeDefinition::new("Trust", Color::rgb(0, 200, 0));

        let report = merge(&mut f.project, &[f.trust, f.doubt], merged).unwrap();

        let code = f.project.code_by_name("Trust").unwrap();
        assert_eq!(code.id, report.code_id);
        assert_ne!(code.id, f.trust);
    }

    #[test]
    fn test_merge_rejects_foreign_duplicate_name() {
        let mut f = fixture();
        let before = f.project.clone();
        let merged = CodeDefinition::new("Other", Color::rgb(0, 0, 0));

        let err = merge(&mut f.project, &[f.trust, f.doubt], merged).unwrap_err();

        assert!(matches!(
            err,
            CoreError::MergeFailed { ref source } if matches!(**source, CoreError::DuplicateCodeName(_))
        ));
        assert_eq!(f.project, before);
    }

    #[test]
    fn test_merge_rejects_unknown_source() {
        let mut f = fixture();
        let before = f.project.clone();
        let missing = uuid::Uuid::new_v4();

        let err = merge(
            &mut f.project,
            &[f.trust, missing],
            CodeDefinition::new("X", Color::rgb(0, 0, 0)),
        )
        .unwrap_err();

        assert!(matches!(err, CoreError::MergeFailed { .. }));
        assert_eq!(f.project, before);
    }

    #[test]
    fn test_merge_requires_sources() {
        let mut f = fixture();
        let err = merge(
            &mut f.project,
            &[],
            CodeDefinition::new("X", Color::rgb(0, 0, 0)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::MergeFailed { ref source } if matches!(**source, CoreError::NothingToMerge)
        ));
    }

    #[test]
    fn test_merge_dedupes_sources() {
        let mut f = fixture();
        let report = merge(
            &mut f.project,
            &[f.doubt, f.doubt],
            CodeDefinition::new("Hesitation", Color::rgb(9, 9, 9)),
        )
        .unwrap();
        assert_eq!(report.removed_codes, vec![f.doubt]);
        assert_eq!(report.reassigned, 2);
    }

    #[test]
    fn test_merge_is_atomic_at_every_failure_point() {
        // 2 removals + 1 insert + 3 reassignments = 6 writes
        for budget in 0..6 {
            let f = fixture();
            let before = f.project.clone();
            let mut repo = FlakyRepository::new(f.project, budget);

            let err = merge(
                &mut repo,
                &[f.trust, f.doubt],
                CodeDefinition::new("Ambivalence", Color::rgb(1, 2, 3)),
            )
            .unwrap_err();

            assert!(matches!(err, CoreError::MergeFailed { .. }), "budget {}", budget);
            assert_eq!(repo.inner, before, "partial merge after {} writes", budget);
        }
    }

    #[test]
    fn test_merge_succeeds_with_enough_writes() {
        let f = fixture();
        let mut repo = FlakyRepository::new(f.project, 6);
        let report = merge(
            &mut repo,
            &[f.trust, f.doubt],
            CodeDefinition::new("Ambivalence", Color::rgb(1, 2, 3)),
        )
        .unwrap();
        assert_eq!(report.reassigned, 3);
    }
}
