//! In-memory project aggregate
//!
//! The `Project` holds one document together with everything annotating it:
//! - Code definitions, keyed by id (segments refer to them by id only)
//! - Annotations, in input order (order matters for style tie-breaks)
//!
//! Loading and saving belong to the host; a project only knows how to
//! (de)serialize itself.
//!
//! ## Usage
//!
//! ```ignore
//! let mut project = Project::new(Document::new("Hello world"));
//! let code = CodeDefinition::new("Greeting", "#336699".parse()?);
//! let code_id = code.id;
//! project.add_code(code)?;
//! project.add_annotation(Annotation::code_segment(0, 5, code_id))?;
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::CodeRepository;
use crate::models::{Annotation, AnnotationId, CodeDefinition, CodeId, Document};

/// A document with its codes and annotations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// The annotated text
    pub document: Document,
    /// Code definitions by id
    #[serde(with = "codes_as_list")]
    codes: HashMap<CodeId, CodeDefinition>,
    /// Annotations in input order
    #[serde(default)]
    annotations: Vec<Annotation>,
}

/// Counts of what a project contains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub codes: usize,
    pub segments: usize,
    pub highlights: usize,
    pub memos: usize,
}

/// Saved copy of a project's codes and annotations
#[derive(Debug, Clone)]
pub struct ProjectCheckpoint {
    codes: HashMap<CodeId, CodeDefinition>,
    annotations: Vec<Annotation>,
}

impl Project {
    /// Create an empty project around a document
    pub fn new(document: Document) -> Self {
        Self {
            document,
            codes: HashMap::new(),
            annotations: Vec::new(),
        }
    }

    // ==================== Code Operations ====================

    /// Add a new code definition
    ///
    /// Names must be unique within the project.
    pub fn add_code(&mut self, code: CodeDefinition) -> CoreResult<()> {
        if self.code_by_name(&code.name).is_some() {
            return Err(CoreError::DuplicateCodeName(code.name));
        }
        debug!("Adding code '{}' ({})", code.name, code.id);
        self.codes.insert(code.id, code);
        Ok(())
    }

    /// Rename a code, keeping names unique
    pub fn rename_code(&mut self, id: CodeId, name: &str) -> CoreResult<()> {
        if let Some(existing) = self.code_by_name(name) {
            if existing.id != id {
                return Err(CoreError::DuplicateCodeName(name.to_string()));
            }
        }
        let code = self.codes.get_mut(&id).ok_or(CoreError::UnknownCode(id))?;
        code.set_name(name);
        Ok(())
    }

    /// Get a code by ID
    pub fn code(&self, id: CodeId) -> Option<&CodeDefinition> {
        self.codes.get(&id)
    }

    /// Get a code by its unique name
    pub fn code_by_name(&self, name: &str) -> Option<&CodeDefinition> {
        self.codes.values().find(|code| code.name == name)
    }

    /// The id-keyed code map
    pub fn codes(&self) -> &HashMap<CodeId, CodeDefinition> {
        &self.codes
    }

    /// All codes ordered by name
    pub fn codes_sorted(&self) -> Vec<&CodeDefinition> {
        let mut codes: Vec<_> = self.codes.values().collect();
        codes.sort_by(|a, b| a.name.cmp(&b.name));
        codes
    }

    // ==================== Annotation Operations ====================

    /// Add an annotation after checking its span and code reference
    pub fn add_annotation(&mut self, annotation: Annotation) -> CoreResult<()> {
        self.validate_annotation(&annotation)?;
        self.annotations.push(annotation);
        Ok(())
    }

    /// Remove an annotation by id
    pub fn remove_annotation(&mut self, id: AnnotationId) -> CoreResult<Annotation> {
        let pos = self
            .annotations
            .iter()
            .position(|a| a.id() == Some(id))
            .ok_or(CoreError::UnknownAnnotation(id))?;
        Ok(self.annotations.remove(pos))
    }

    /// Get an annotation by id
    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id() == Some(id))
    }

    /// All annotations in input order
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Ids of the segments referencing a code, in input order
    pub fn segments_for_code(&self, code_id: CodeId) -> Vec<AnnotationId> {
        self.annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::CodeSegment(seg) if seg.code_id == code_id => Some(seg.id),
                _ => None,
            })
            .collect()
    }

    // ==================== Document ====================

    /// Replace the document content, returning the prior content
    ///
    /// Annotation offsets are not shifted; hosts re-sync them and
    /// `validate()` reports any that no longer fit.
    pub fn replace_content(&mut self, content: impl Into<String>) -> String {
        self.document.replace(content)
    }

    // ==================== Integrity ====================

    /// Check every invariant the core relies on
    pub fn validate(&self) -> CoreResult<()> {
        let mut names = HashSet::new();
        for code in self.codes.values() {
            if !names.insert(code.name.as_str()) {
                return Err(CoreError::DuplicateCodeName(code.name.clone()));
            }
        }
        for annotation in &self.annotations {
            self.validate_annotation(annotation)?;
        }
        Ok(())
    }

    fn validate_annotation(&self, annotation: &Annotation) -> CoreResult<()> {
        if let Annotation::SearchMatch(_) = annotation {
            return Err(CoreError::corrupt(
                annotation.label(),
                "search matches are transient and never stored",
            ));
        }
        annotation.validate_span(self.document.len())?;
        if let Some(code_id) = annotation.code_id() {
            if !self.codes.contains_key(&code_id) {
                return Err(CoreError::corrupt(
                    annotation.label(),
                    format!("references missing code {}", code_id),
                ));
            }
        }
        Ok(())
    }

    /// Get counts of codes and annotation kinds
    pub fn stats(&self) -> ProjectStats {
        let mut stats = ProjectStats {
            codes: self.codes.len(),
            ..ProjectStats::default()
        };
        for annotation in &self.annotations {
            match annotation {
                Annotation::CodeSegment(_) => stats.segments += 1,
                Annotation::Highlight(_) => stats.highlights += 1,
                Annotation::Memo(_) => stats.memos += 1,
                Annotation::SearchMatch(_) => {}
            }
        }
        stats
    }

    fn segment_mut(&mut self, id: AnnotationId) -> CoreResult<&mut crate::models::CodeSegment> {
        self.annotations
            .iter_mut()
            .find_map(|a| match a {
                Annotation::CodeSegment(seg) if seg.id == id => Some(seg),
                _ => None,
            })
            .ok_or(CoreError::UnknownAnnotation(id))
    }
}

impl CodeRepository for Project {
    type Checkpoint = ProjectCheckpoint;

    fn code(&self, id: CodeId) -> Option<&CodeDefinition> {
        self.codes.get(&id)
    }

    fn code_by_name(&self, name: &str) -> Option<&CodeDefinition> {
        Project::code_by_name(self, name)
    }

    fn segments_for_code(&self, code_id: CodeId) -> Vec<AnnotationId> {
        Project::segments_for_code(self, code_id)
    }

    fn segment_code(&self, segment_id: AnnotationId) -> Option<CodeId> {
        self.annotation(segment_id).and_then(Annotation::code_id)
    }

    fn insert_code(&mut self, code: CodeDefinition) -> CoreResult<()> {
        self.add_code(code)
    }

    fn remove_code(&mut self, id: CodeId) -> CoreResult<CodeDefinition> {
        self.codes.remove(&id).ok_or(CoreError::UnknownCode(id))
    }

    fn reassign_segment(&mut self, segment_id: AnnotationId, code_id: CodeId) -> CoreResult<()> {
        if !self.codes.contains_key(&code_id) {
            return Err(CoreError::UnknownCode(code_id));
        }
        self.segment_mut(segment_id)?.code_id = code_id;
        Ok(())
    }

    fn remove_segment(&mut self, segment_id: AnnotationId) -> CoreResult<()> {
        self.segment_mut(segment_id)?;
        self.remove_annotation(segment_id).map(|_| ())
    }

    fn checkpoint(&self) -> ProjectCheckpoint {
        ProjectCheckpoint {
            codes: self.codes.clone(),
            annotations: self.annotations.clone(),
        }
    }

    fn rollback(&mut self, checkpoint: ProjectCheckpoint) {
        self.codes = checkpoint.codes;
        self.annotations = checkpoint.annotations;
    }
}

/// Serialize the code map as a plain list
mod codes_as_list {
    use std::collections::HashMap;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::models::{CodeDefinition, CodeId};

    pub fn serialize<S: Serializer>(
        codes: &HashMap<CodeId, CodeDefinition>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut list: Vec<_> = codes.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<CodeId, CodeDefinition>, D::Error> {
        let list = Vec::<CodeDefinition>::deserialize(deserializer)?;
        let mut codes = HashMap::with_capacity(list.len());
        for code in list {
            let id = code.id;
            if codes.insert(id, code).is_some() {
                return Err(D::Error::custom(format!("duplicate code id {}", id)));
            }
        }
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Color;
    use uuid::Uuid;

    fn sample() -> (Project, CodeId) {
        let mut project = Project::new(Document::new("Hello world"));
        let code = CodeDefinition::new("Greeting", Color::rgb(51, 102, 153));
        let code_id = code.id;
        project.add_code(code).unwrap();
        project
            .add_annotation(Annotation::code_segment(0, 5, code_id))
            .unwrap();
        project
            .add_annotation(Annotation::highlight(3, 8, Color::rgb(255, 255, 0)))
            .unwrap();
        (project, code_id)
    }

    #[test]
    fn test_add_code_rejects_duplicate_name() {
        let (mut project, _) = sample();
        let dup = CodeDefinition::new("Greeting", Color::rgb(0, 0, 0));
        let err = project.add_code(dup).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCodeName(name) if name == "Greeting"));
    }

    #[test]
    fn test_rename_code() {
        let (mut project, code_id) = sample();
        project
            .add_code(CodeDefinition::new("Farewell", Color::rgb(0, 0, 0)))
            .unwrap();

        assert!(project.rename_code(code_id, "Farewell").is_err());
        project.rename_code(code_id, "Salutation").unwrap();
        assert_eq!(project.code(code_id).unwrap().name, "Salutation");
        // Renaming to its own name is fine
        project.rename_code(code_id, "Salutation").unwrap();
    }

    #[test]
    fn test_add_annotation_rejects_missing_code() {
        let (mut project, _) = sample();
        let err = project
            .add_annotation(Annotation::code_segment(0, 2, Uuid::new_v4()))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_add_annotation_rejects_bad_range() {
        let (mut project, code_id) = sample();
        assert!(project
            .add_annotation(Annotation::code_segment(4, 12, code_id))
            .is_err());
        assert!(project
            .add_annotation(Annotation::code_segment(4, 4, code_id))
            .is_err());
    }

    #[test]
    fn test_segments_for_code_in_input_order() {
        let (mut project, code_id) = sample();
        project
            .add_annotation(Annotation::code_segment(6, 11, code_id))
            .unwrap();
        let segments = project.segments_for_code(code_id);
        assert_eq!(segments.len(), 2);
        assert_eq!(
            project.annotation(segments[1]).unwrap().span().unwrap().start_index,
            6
        );
    }

    #[test]
    fn test_remove_annotation() {
        let (mut project, code_id) = sample();
        let seg = project.segments_for_code(code_id)[0];
        project.remove_annotation(seg).unwrap();
        assert!(project.segments_for_code(code_id).is_empty());
        assert!(project.remove_annotation(seg).is_err());
    }

    #[test]
    fn test_validate_after_content_shrinks() {
        let (mut project, _) = sample();
        assert!(project.validate().is_ok());

        let prior = project.replace_content("Hi");
        assert_eq!(prior, "Hello world");
        let err = project.validate().unwrap_err();
        assert!(matches!(err, CoreError::CorruptAnnotationData { .. }));
    }

    #[test]
    fn test_validate_rejects_duplicate_code_names() {
        let (project, _) = sample();
        let mut json = serde_json::to_value(&project).unwrap();
        let mut twin = json["codes"][0].clone();
        twin["id"] = serde_json::json!(Uuid::new_v4());
        json["codes"].as_array_mut().unwrap().push(twin);

        let loaded: Project = serde_json::from_value(json).unwrap();
        let err = loaded.validate().unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCodeName(name) if name == "Greeting"));
    }

    #[test]
    fn test_deserialize_rejects_duplicate_code_ids() {
        let (project, _) = sample();
        let mut json = serde_json::to_value(&project).unwrap();
        let twin = json["codes"][0].clone();
        json["codes"].as_array_mut().unwrap().push(twin);

        let err = serde_json::from_value::<Project>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate code id"));
    }

    #[test]
    fn test_search_matches_are_not_stored() {
        let (mut project, _) = sample();
        let err = project
            .add_annotation(Annotation::search_match(0, 5))
            .unwrap_err();
        assert!(matches!(err, CoreError::CorruptAnnotationData { .. }));
        assert_eq!(project.annotations().len(), 2);

        let mut json = serde_json::to_value(&project).unwrap();
        json["annotations"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"kind": "searchMatch", "startIndex": 0, "endIndex": 5}));
        let loaded: Project = serde_json::from_value(json).unwrap();
        assert!(loaded.validate().is_err());
    }

    #[test]
    fn test_stats() {
        let (mut project, _) = sample();
        project
            .add_annotation(Annotation::memo(None, "Overall", ""))
            .unwrap();
        let stats = project.stats();
        assert_eq!(stats.codes, 1);
        assert_eq!(stats.segments, 1);
        assert_eq!(stats.highlights, 1);
        assert_eq!(stats.memos, 1);
    }

    #[test]
    fn test_checkpoint_rollback() {
        let (mut project, code_id) = sample();
        let checkpoint = project.checkpoint();
        let seg = project.segments_for_code(code_id)[0];

        CodeRepository::remove_segment(&mut project, seg).unwrap();
        CodeRepository::remove_code(&mut project, code_id).unwrap();
        assert!(project.code(code_id).is_none());

        project.rollback(checkpoint);
        assert!(project.code(code_id).is_some());
        assert_eq!(project.segments_for_code(code_id), vec![seg]);
    }

    #[test]
    fn test_remove_segment_rejects_highlight() {
        let (mut project, _) = sample();
        let highlight_id = project.annotations()[1].id().unwrap();
        assert!(CodeRepository::remove_segment(&mut project, highlight_id).is_err());
        assert_eq!(project.annotations().len(), 2);
    }

    #[test]
    fn test_project_serialization() {
        let (project, code_id) = sample();
        let json = serde_json::to_string(&project).unwrap();
        let back: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(back, project);
        assert_eq!(back.document.content(), "Hello world");
        assert!(back.code(code_id).is_some());
    }
}
