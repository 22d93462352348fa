//! qcode Core Library
//!
//! This crate provides the core of qcode, a qualitative coding tool: a text
//! document annotated with overlapping category codes, highlights, memos and
//! search hits, edited by one tab at a time.
//!
//! # Architecture
//!
//! - **Overlay**: splits a text window into minimal fragments and resolves
//!   each fragment's style
//! - **Lifecycle**: atomic merge and reviewed split of category codes over
//!   any `CodeRepository`
//! - **Exclusivity**: claim/release/heartbeat protocol between tabs over a
//!   broadcast bus, run by one actor task per tab
//!
//! The core is persistence-agnostic; `Project` is the in-memory model hosts
//! load and save.
//!
//! # Quick Start
//!
//! ```text
//! let mut project = Project::new(Document::new("Hello world"));
//! let code = CodeDefinition::new("Greeting", "#e6194b".parse()?);
//! let code_id = code.id;
//! project.add_code(code)?;
//! project.add_annotation(Annotation::code_segment(0, 5, code_id))?;
//!
//! let doc = &project.document;
//! let resolver = StyleResolver::new(project.codes(), config.style_options());
//! let plan = resolver.render(doc.len(), doc.full_window(), project.annotations())?;
//! ```
//!
//! # Modules
//!
//! - `models`: Documents, spans, annotations and code definitions
//! - `project`: In-memory project model and repository
//! - `overlay`: Fragmentation and style resolution
//! - `search`: Literal case-insensitive search
//! - `history`: Undo/redo and the edit gate
//! - `lifecycle`: Merge and split of codes
//! - `exclusivity`: Cross-tab edit exclusivity
//! - `config`: Application configuration
//! - `error`: Error types

pub mod config;
pub mod error;
pub mod exclusivity;
pub mod history;
pub mod lifecycle;
pub mod models;
pub mod overlay;
pub mod project;
pub mod search;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use exclusivity::{BroadcastBus, CoordinatorConfig, CoordinatorEvent, EditCoordinator, LockStatus};
pub use history::{EditHistory, EditSession};
pub use lifecycle::{merge, CodeRepository, MergeReport, SplitDecision, SplitSession, SplitState};
pub use models::{Annotation, CodeDefinition, Color, Document, Span, TextWindow};
pub use overlay::{compute_fragments, Fragment, StyleOptions, StyleResolver, StyledFragment};
pub use project::Project;
pub use search::{find_matches, SearchMatcher};
