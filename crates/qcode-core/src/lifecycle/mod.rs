//! Category lifecycle management
//!
//! Code definitions are only ever destroyed here, through one of two
//! all-or-nothing transactions:
//!
//! - **Merge**: fold several codes into one new code
//! - **Split**: replace one code by several, after a human has re-assigned
//!   every segment in a review session
//!
//! Both run against a [`CodeRepository`] and roll back to a checkpoint when
//! any step fails, so callers never observe a partially reassigned state.

mod merge;
mod split;

pub use merge::{merge, MergeReport};
pub use split::{SplitDecision, SplitReport, SplitSession, SplitState};

use crate::error::CoreResult;
use crate::models::{AnnotationId, CodeDefinition, CodeId};

/// Storage seam the lifecycle manager mutates through
///
/// Implementations must make `rollback` restore exactly the state captured
/// by `checkpoint`.
pub trait CodeRepository {
    /// Saved state used for rollback
    type Checkpoint;

    fn code(&self, id: CodeId) -> Option<&CodeDefinition>;

    fn code_by_name(&self, name: &str) -> Option<&CodeDefinition>;

    /// Segments referencing `code_id`, in input order
    fn segments_for_code(&self, code_id: CodeId) -> Vec<AnnotationId>;

    /// Code currently referenced by a segment
    fn segment_code(&self, segment_id: AnnotationId) -> Option<CodeId>;

    fn insert_code(&mut self, code: CodeDefinition) -> CoreResult<()>;

    fn remove_code(&mut self, id: CodeId) -> CoreResult<CodeDefinition>;

    fn reassign_segment(&mut self, segment_id: AnnotationId, code_id: CodeId) -> CoreResult<()>;

    /// Drop a segment entirely (it becomes uncoded text)
    fn remove_segment(&mut self, segment_id: AnnotationId) -> CoreResult<()>;

    fn checkpoint(&self) -> Self::Checkpoint;

    fn rollback(&mut self, checkpoint: Self::Checkpoint);
}

/// Run `f` against `repo`, restoring the prior state if it fails
pub fn atomically<R, T, F>(repo: &mut R, f: F) -> CoreResult<T>
where
    R: CodeRepository,
    F: FnOnce(&mut R) -> CoreResult<T>,
{
    let checkpoint = repo.checkpoint();
    match f(repo) {
        Ok(value) => Ok(value),
        Err(e) => {
            repo.rollback(checkpoint);
            Err(e)
        }
    }
}
