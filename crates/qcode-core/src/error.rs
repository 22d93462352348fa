//! Core error handling
//!
//! Provides typed errors for overlay, lifecycle and coordination operations
//! with descriptive messages and recovery suggestions.
//!
//! Errors fall into three groups:
//! - **Recoverable**: reported to the caller, who can retry or change input
//!   (`IncompleteReview`, `NoSegments`, `EditConflict`, ...)
//! - **Transactional**: a multi-step mutation failed and was rolled back
//!   (`MergeFailed`, `SplitCommitFailed`)
//! - **Fatal**: upstream data is corrupt (`CorruptAnnotationData`)

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the qcode core
#[derive(Error, Debug)]
pub enum CoreError {
    /// An annotation violates the range invariant or references a missing code
    #[error("Corrupt annotation data for annotation {annotation}: {details}")]
    CorruptAnnotationData { annotation: String, details: String },

    /// Code definition does not exist
    #[error("Unknown code definition: {0}")]
    UnknownCode(Uuid),

    /// Annotation does not exist
    #[error("Unknown annotation: {0}")]
    UnknownAnnotation(Uuid),

    /// A code definition with this name already exists
    #[error("A code named '{0}' already exists")]
    DuplicateCodeName(String),

    /// Color string is not `#RRGGBB`
    #[error("Invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    /// Merge requested without any source codes
    #[error("Merge needs at least one source code")]
    NothingToMerge,

    /// Split requested on a code nobody references
    #[error("Code {code} has no segments to review")]
    NoSegments { code: Uuid },

    /// Commit attempted before every segment had a decision
    #[error("Review incomplete: {decided} of {total} segments have a decision")]
    IncompleteReview { decided: usize, total: usize },

    /// Split decision names a code that is not part of the split
    #[error("'{0}' is not one of the codes created by this split")]
    UnknownSplitTarget(String),

    /// Operation not valid in the session's current state
    #[error("Cannot {operation} while session is {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: String,
    },

    /// The reviewed segments no longer match what references the source code
    #[error("Segments of code {code} changed since the review started")]
    StaleReview { code: Uuid },

    /// Merge failed and was rolled back
    #[error("Merge failed, no changes were applied: {source}")]
    MergeFailed {
        #[source]
        source: Box<CoreError>,
    },

    /// Split commit failed and was rolled back
    #[error("Split commit failed, no changes were applied: {source}")]
    SplitCommitFailed {
        #[source]
        source: Box<CoreError>,
    },

    /// Another tab claimed a file this tab is editing
    #[error("Edit conflict on '{file_id}': another tab is editing this file")]
    EditConflict { file_id: String },

    /// Edit attempted without holding the edit claim
    #[error("Document is read-only in this tab")]
    ReadOnly,

    /// The coordinator task is gone
    #[error("Edit coordinator is no longer running")]
    CoordinatorClosed,

    /// Generic rejection from a repository implementation
    #[error("Repository error: {0}")]
    Repository(String),

    /// Coordination frame could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl CoreError {
    /// Build a corrupt-data error for an annotation
    pub fn corrupt(annotation: impl ToString, details: impl Into<String>) -> Self {
        CoreError::CorruptAnnotationData {
            annotation: annotation.to_string(),
            details: details.into(),
        }
    }

    /// Check if this error indicates corrupt upstream data
    ///
    /// Fatal errors must propagate and never be masked.
    pub fn is_fatal(&self) -> bool {
        match self {
            CoreError::CorruptAnnotationData { .. } => true,
            CoreError::MergeFailed { source } | CoreError::SplitCommitFailed { source } => {
                source.is_fatal()
            }
            _ => false,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::IncompleteReview { .. }
                | CoreError::NoSegments { .. }
                | CoreError::EditConflict { .. }
                | CoreError::DuplicateCodeName(_)
                | CoreError::UnknownSplitTarget(_)
                | CoreError::ReadOnly
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            CoreError::IncompleteReview { .. } => {
                Some("Assign every remaining segment to a new code or mark it uncoded, then commit again.")
            }
            CoreError::NoSegments { .. } => {
                Some("Nothing references this code; edit or delete it directly instead of splitting.")
            }
            CoreError::EditConflict { .. } => {
                Some("Close the other tab editing this file, or reload this one in read-only mode.")
            }
            CoreError::DuplicateCodeName(_) => Some("Choose a different code name."),
            CoreError::ReadOnly => Some("Claim the file for editing first."),
            CoreError::CorruptAnnotationData { .. } => {
                Some("The annotation data is inconsistent with the document. Reload it from storage.")
            }
            _ => None,
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
