//! Splitting a code definition
//!
//! A split replaces one code by several new ones. Because every affected
//! segment needs a human decision before anything is destroyed, it runs as a
//! session:
//!
//! ```text
//! Idle -> AwaitingReview(cursor=0) -> Reviewing -> Finalizing -> Committed
//!                  \                      \
//!                   +------> Aborted <-----+
//! ```
//!
//! The segment list is snapshotted when the session starts. Decisions are
//! recorded one segment at a time; reaching the end only makes the session
//! ready, `commit` must still be called explicitly. Until then the repository
//! is never touched, so `abort` needs no cleanup.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{atomically, CodeRepository};
use crate::error::{CoreError, CoreResult};
use crate::models::{AnnotationId, CodeDefinition, CodeId};

/// Where a split session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitState {
    /// Not started
    Idle,
    /// Segments snapshotted, no decision recorded yet
    AwaitingReview,
    /// At least one decision recorded
    Reviewing,
    /// Commit in progress
    Finalizing,
    /// Changes applied; terminal
    Committed,
    /// Discarded without changes; terminal
    Aborted,
}

impl fmt::Display for SplitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitState::Idle => "idle",
            SplitState::AwaitingReview => "awaiting review",
            SplitState::Reviewing => "reviewing",
            SplitState::Finalizing => "finalizing",
            SplitState::Committed => "committed",
            SplitState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What happens to one reviewed segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDecision {
    /// Move the segment to one of the new codes
    Recode(CodeId),
    /// Drop the code from the segment
    Uncoded,
}

/// Outcome of a committed split
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    /// The code that was split and deleted
    pub removed_code: CodeId,
    /// Codes created by the split
    pub created_codes: Vec<CodeId>,
    /// Segments moved to a new code
    pub recoded: usize,
    /// Segments that lost their code
    pub uncoded: usize,
}

/// A reviewable split of one code into several
#[derive(Debug, Clone)]
pub struct SplitSession {
    state: SplitState,
    source_id: Option<CodeId>,
    new_definitions: Vec<CodeDefinition>,
    segments: Vec<AnnotationId>,
    decisions: Vec<Option<SplitDecision>>,
    cursor: usize,
}

impl Default for SplitSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitSession {
    /// Create an idle session
    pub fn new() -> Self {
        Self {
            state: SplitState::Idle,
            source_id: None,
            new_definitions: Vec::new(),
            segments: Vec::new(),
            decisions: Vec::new(),
            cursor: 0,
        }
    }

    /// Create a session and start it in one step
    pub fn begin<R: CodeRepository>(
        repo: &R,
        source_id: CodeId,
        new_definitions: Vec<CodeDefinition>,
    ) -> CoreResult<Self> {
        let mut session = Self::new();
        session.start(repo, source_id, new_definitions)?;
        Ok(session)
    }

    /// Snapshot the segments of `source_id` and enter review at cursor 0
    ///
    /// New names must be distinct and must not clash with existing codes,
    /// except the source itself, which disappears on commit.
    pub fn start<R: CodeRepository>(
        &mut self,
        repo: &R,
        source_id: CodeId,
        new_definitions: Vec<CodeDefinition>,
    ) -> CoreResult<()> {
        self.expect_state("start a split", &[SplitState::Idle])?;

        if repo.code(source_id).is_none() {
            return Err(CoreError::UnknownCode(source_id));
        }

        for (i, def) in new_definitions.iter().enumerate() {
            let clashes_new = new_definitions[..i].iter().any(|d| d.name == def.name);
            let clashes_existing = repo
                .code_by_name(&def.name)
                .is_some_and(|existing| existing.id != source_id);
            if clashes_new || clashes_existing {
                return Err(CoreError::DuplicateCodeName(def.name.clone()));
            }
        }

        let segments = repo.segments_for_code(source_id);
        if segments.is_empty() {
            return Err(CoreError::NoSegments { code: source_id });
        }

        debug!(
            "Split of {} started with {} segments and {} new codes",
            source_id,
            segments.len(),
            new_definitions.len()
        );

        self.decisions = vec![None; segments.len()];
        self.segments = segments;
        self.new_definitions = new_definitions;
        self.source_id = Some(source_id);
        self.cursor = 0;
        self.state = SplitState::AwaitingReview;
        Ok(())
    }

    /// Record a decision for the segment at the cursor and advance
    ///
    /// `target` names one of the new definitions, or `None` for uncoded.
    /// Returns whether every segment now has a decision.
    pub fn assign_next(&mut self, target: Option<&str>) -> CoreResult<bool> {
        self.expect_state(
            "assign a segment",
            &[SplitState::AwaitingReview, SplitState::Reviewing],
        )?;
        if self.cursor >= self.segments.len() {
            return Err(CoreError::InvalidSessionState {
                operation: "assign a segment",
                state: "at the end of the review".to_string(),
            });
        }

        let decision = match target {
            Some(name) => {
                let def = self
                    .new_definitions
                    .iter()
                    .find(|d| d.name == name)
                    .ok_or_else(|| CoreError::UnknownSplitTarget(name.to_string()))?;
                SplitDecision::Recode(def.id)
            }
            None => SplitDecision::Uncoded,
        };

        self.decisions[self.cursor] = Some(decision);
        self.cursor += 1;
        self.state = SplitState::Reviewing;
        Ok(self.is_ready())
    }

    /// Move the cursor back one segment so its decision can be revised
    pub fn step_back(&mut self) -> CoreResult<()> {
        self.expect_state(
            "step back",
            &[SplitState::AwaitingReview, SplitState::Reviewing],
        )?;
        self.cursor = self.cursor.saturating_sub(1);
        Ok(())
    }

    /// Apply every recorded decision and delete the source code
    ///
    /// Fails with `IncompleteReview` (session unchanged) when a segment has
    /// no decision. Repository failures roll back and are reported as
    /// `SplitCommitFailed`; the session then stays reviewable.
    pub fn commit<R: CodeRepository>(&mut self, repo: &mut R) -> CoreResult<SplitReport> {
        self.expect_state(
            "commit",
            &[SplitState::AwaitingReview, SplitState::Reviewing],
        )?;

        let decided = self.decisions.iter().filter(|d| d.is_some()).count();
        if decided < self.decisions.len() {
            return Err(CoreError::IncompleteReview {
                decided,
                total: self.decisions.len(),
            });
        }

        let Some(source_id) = self.source_id else {
            return Err(CoreError::InvalidSessionState {
                operation: "commit",
                state: "missing its source code".to_string(),
            });
        };

        let previous = self.state;
        self.state = SplitState::Finalizing;

        let plan: Vec<(AnnotationId, SplitDecision)> = self
            .segments
            .iter()
            .copied()
            .zip(self.decisions.iter().flatten().copied())
            .collect();
        let new_definitions = self.new_definitions.clone();

        match atomically(repo, |repo| apply(repo, source_id, new_definitions, &plan)) {
            Ok(report) => {
                info!(
                    "Split {} into {} codes ({} recoded, {} uncoded)",
                    source_id,
                    report.created_codes.len(),
                    report.recoded,
                    report.uncoded
                );
                self.state = SplitState::Committed;
                Ok(report)
            }
            Err(e) => {
                warn!("Split commit failed: {}", e);
                self.state = previous;
                Err(CoreError::SplitCommitFailed {
                    source: Box::new(e),
                })
            }
        }
    }

    /// Discard the session without touching the repository
    pub fn abort(&mut self) -> CoreResult<()> {
        self.expect_state(
            "abort",
            &[
                SplitState::Idle,
                SplitState::AwaitingReview,
                SplitState::Reviewing,
            ],
        )?;
        debug!("Split session aborted");
        self.state = SplitState::Aborted;
        Ok(())
    }

    pub fn state(&self) -> SplitState {
        self.state
    }

    /// Code being split
    pub fn source_id(&self) -> Option<CodeId> {
        self.source_id
    }

    pub fn new_definitions(&self) -> &[CodeDefinition] {
        &self.new_definitions
    }

    /// Snapshotted segments in review order
    pub fn segments(&self) -> &[AnnotationId] {
        &self.segments
    }

    pub fn decisions(&self) -> &[Option<SplitDecision>] {
        &self.decisions
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Segment under review, `None` once the cursor is past the end
    pub fn current_segment(&self) -> Option<AnnotationId> {
        self.segments.get(self.cursor).copied()
    }

    /// Whether every segment has a decision
    pub fn is_ready(&self) -> bool {
        !self.decisions.is_empty() && self.decisions.iter().all(Option::is_some)
    }

    /// `(decided, total)`
    pub fn progress(&self) -> (usize, usize) {
        let decided = self.decisions.iter().filter(|d| d.is_some()).count();
        (decided, self.decisions.len())
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SplitState]) -> CoreResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CoreError::InvalidSessionState {
                operation,
                state: self.state.to_string(),
            })
        }
    }
}

fn apply<R: CodeRepository>(
    repo: &mut R,
    source_id: CodeId,
    new_definitions: Vec<CodeDefinition>,
    plan: &[(AnnotationId, SplitDecision)],
) -> CoreResult<SplitReport> {
    let mut current = repo.segments_for_code(source_id);
    let mut reviewed: Vec<_> = plan.iter().map(|(id, _)| *id).collect();
    current.sort();
    reviewed.sort();
    if current != reviewed {
        return Err(CoreError::StaleReview { code: source_id });
    }

    // Source goes first so a new code may take over its name
    repo.remove_code(source_id)?;

    let created_codes: Vec<_> = new_definitions.iter().map(|d| d.id).collect();
    for def in new_definitions {
        repo.insert_code(def)?;
    }

    let mut recoded = 0;
    let mut uncoded = 0;
    for (segment, decision) in plan {
        match decision {
            SplitDecision::Recode(code_id) => {
                repo.reassign_segment(*segment, *code_id)?;
                recoded += 1;
            }
            SplitDecision::Uncoded => {
                repo.remove_segment(*segment)?;
                uncoded += 1;
            }
        }
    }

    Ok(SplitReport {
        removed_code: source_id,
        created_codes,
        recoded,
        uncoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::testing::FlakyRepository;
    use crate::models::{Annotation, Color, Document};
    use crate::project::Project;

    fn fixture() -> (Project, CodeId) {
        let mut project = Project::new(Document::new(
            "We moved here for work. The schools were good. Rent was cheap.",
        ));
        let reasons = CodeDefinition::new("Reasons", Color::rgb(10, 20, 30));
        let id = reasons.id;
        project.add_code(reasons).unwrap();
        project.add_code(CodeDefinition::new("Other", Color::rgb(1, 1, 1))).unwrap();
        project.add_annotation(Annotation::code_segment(0, 23, id)).unwrap();
        project.add_annotation(Annotation::code_segment(24, 46, id)).unwrap();
        project.add_annotation(Annotation::code_segment(47, 62, id)).unwrap();
        (project, id)
    }

    fn targets() -> Vec<CodeDefinition> {
        vec![
            CodeDefinition::new("Economic", Color::rgb(200, 0, 0)),
            CodeDefinition::new("Family", Color::rgb(0, 200, 0)),
        ]
    }

    #[test]
    fn test_start_enters_review_at_cursor_zero() {
        let (project, source) = fixture();
        let session = SplitSession::begin(&project, source, targets()).unwrap();

        assert_eq!(session.state(), SplitState::AwaitingReview);
        assert_eq!(session.cursor(), 0);
        assert_eq!(session.segments().len(), 3);
        assert_eq!(session.progress(), (0, 3));
        assert_eq!(session.current_segment(), Some(session.segments()[0]));
    }

    #[test]
    fn test_start_without_segments_fails() {
        let (project, _) = fixture();
        let other = project.code_by_name("Other").unwrap().id;
        let err = SplitSession::begin(&project, other, targets()).unwrap_err();
        assert!(matches!(err, CoreError::NoSegments { code } if code == other));
    }

    #[test]
    fn test_start_rejects_name_clashes() {
        let (project, source) = fixture();

        let clash_existing = vec![CodeDefinition::new("Other", Color::rgb(0, 0, 0))];
        assert!(matches!(
            SplitSession::begin(&project, source, clash_existing),
            Err(CoreError::DuplicateCodeName(_))
        ));

        let clash_each_other = vec![
            CodeDefinition::new("Same", Color::rgb(0, 0, 0)),
            CodeDefinition::new("Same", Color::rgb(1, 1, 1)),
        ];
        assert!(matches!(
            SplitSession::begin(&project, source, clash_each_other),
            Err(CoreError::DuplicateCodeName(_))
        ));

        // Reusing the source's own name is allowed
        let reuse = vec![CodeDefinition::new("Reasons", Color::rgb(0, 0, 0))];
        assert!(SplitSession::begin(&project, source, reuse).is_ok());
    }

    #[test]
    fn test_reaching_end_does_not_commit() {
        let (project, source) = fixture();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();

        assert!(!session.assign_next(Some("Economic")).unwrap());
        assert_eq!(session.state(), SplitState::Reviewing);
        assert!(!session.assign_next(Some("Family")).unwrap());
        assert!(session.assign_next(None).unwrap());

        assert!(session.is_ready());
        assert_eq!(session.state(), SplitState::Reviewing);
        assert!(session.current_segment().is_none());
        assert!(project.code(source).is_some());

        // No more segments to assign
        assert!(matches!(
            session.assign_next(None),
            Err(CoreError::InvalidSessionState { .. })
        ));
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let (project, source) = fixture();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        let err = session.assign_next(Some("Nope")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownSplitTarget(_)));
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_commit_requires_complete_review() {
        let (mut project, source) = fixture();
        let before = project.clone();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        session.assign_next(Some("Economic")).unwrap();

        let err = session.commit(&mut project).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IncompleteReview {
                decided: 1,
                total: 3
            }
        ));
        assert_eq!(session.state(), SplitState::Reviewing);
        assert_eq!(project, before);
    }

    #[test]
    fn test_commit_applies_decisions() {
        let (mut project, source) = fixture();
        let segments = project.segments_for_code(source);
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        session.assign_next(Some("Economic")).unwrap();
        session.assign_next(Some("Family")).unwrap();
        session.assign_next(None).unwrap();

        let report = session.commit(&mut project).unwrap();

        assert_eq!(session.state(), SplitState::Committed);
        assert_eq!(report.recoded, 2);
        assert_eq!(report.uncoded, 1);
        assert!(project.code(source).is_none());
        assert!(project.segments_for_code(source).is_empty());
        assert!(project
            .annotations()
            .iter()
            .all(|a| a.code_id() != Some(source)));

        let economic = project.code_by_name("Economic").unwrap().id;
        let family = project.code_by_name("Family").unwrap().id;
        assert_eq!(project.segments_for_code(economic), vec![segments[0]]);
        assert_eq!(project.segments_for_code(family), vec![segments[1]]);
        assert!(project.annotation(segments[2]).is_none());
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_step_back_revises_decision() {
        let (mut project, source) = fixture();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        session.assign_next(Some("Economic")).unwrap();
        session.step_back().unwrap();
        assert_eq!(session.cursor(), 0);
        session.assign_next(Some("Family")).unwrap();
        session.assign_next(Some("Family")).unwrap();
        session.assign_next(Some("Family")).unwrap();

        session.commit(&mut project).unwrap();
        let family = project.code_by_name("Family").unwrap().id;
        let economic = project.code_by_name("Economic").unwrap().id;
        assert_eq!(project.segments_for_code(family).len(), 3);
        assert!(project.segments_for_code(economic).is_empty());
    }

    #[test]
    fn test_abort_leaves_project_untouched() {
        let (project, source) = fixture();
        let before = project.clone();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        session.assign_next(Some("Economic")).unwrap();

        session.abort().unwrap();

        assert_eq!(session.state(), SplitState::Aborted);
        assert_eq!(project, before);
        assert!(matches!(
            session.assign_next(None),
            Err(CoreError::InvalidSessionState { .. })
        ));
    }

    #[test]
    fn test_cannot_abort_after_commit() {
        let (mut project, source) = fixture();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        for _ in 0..3 {
            session.assign_next(None).unwrap();
        }
        session.commit(&mut project).unwrap();
        assert!(session.abort().is_err());
        assert!(session.commit(&mut project).is_err());
    }

    #[test]
    fn test_commit_detects_changed_segments() {
        let (mut project, source) = fixture();
        let mut session = SplitSession::begin(&project, source, targets()).unwrap();
        for _ in 0..3 {
            session.assign_next(Some("Economic")).unwrap();
        }

        project.add_annotation(Annotation::code_segment(3, 7, source)).unwrap();
        let before = project.clone();

        let err = session.commit(&mut project).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SplitCommitFailed { ref source } if matches!(**source, CoreError::StaleReview { .. })
        ));
        assert_eq!(project, before);
        assert_eq!(session.state(), SplitState::Reviewing);
    }

    #[test]
    fn test_commit_is_atomic_at_every_failure_point() {
        // 1 removal + 2 inserts + 3 segment writes = 6 writes
        for budget in 0..6 {
            let (project, source) = fixture();
            let before = project.clone();
            let mut session = SplitSession::begin(&project, source, targets()).unwrap();
            session.assign_next(Some("Economic")).unwrap();
            session.assign_next(None).unwrap();
            session.assign_next(Some("Family")).unwrap();

            let mut repo = FlakyRepository::new(project, budget);
            let err = session.commit(&mut repo).unwrap_err();

            assert!(matches!(err, CoreError::SplitCommitFailed { .. }));
            assert_eq!(repo.inner, before, "partial split after {} writes", budget);
            assert_eq!(session.state(), SplitState::Reviewing);
        }
    }
}
