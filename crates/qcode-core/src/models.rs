//! Data models for qcode
//!
//! Defines the core data structures: the text `Document`, interval
//! `Annotation`s over it and the `CodeDefinition`s that code segments refer to.
//!
//! All offsets are measured in chars (Unicode scalar values), never bytes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// Identifier of a code definition
pub type CodeId = Uuid;

/// Identifier of a persisted annotation
pub type AnnotationId = Uuid;

/// Text buffer being annotated
///
/// The content is replaced wholesale by edits; every replacement invalidates
/// previously computed offsets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub struct Document {
    content: String,
    len: usize,
}

impl Document {
    /// Create a document from its full content
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let len = content.chars().count();
        Self { content, len }
    }

    /// Full text content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Replace the whole content, returning the previous content
    pub fn replace(&mut self, content: impl Into<String>) -> String {
        let content = content.into();
        self.len = content.chars().count();
        std::mem::replace(&mut self.content, content)
    }

    /// Borrow the chars in `[start, end)` as a render window
    ///
    /// Bounds are clamped to the document.
    pub fn window(&self, start: usize, end: usize) -> TextWindow<'_> {
        let end = end.min(self.len);
        let start = start.min(end);
        let from = byte_offset(&self.content, start);
        let to = from + byte_offset(&self.content[from..], end - start);
        TextWindow {
            text: &self.content[from..to],
            start,
        }
    }

    /// The whole document as a single window
    pub fn full_window(&self) -> TextWindow<'_> {
        TextWindow {
            text: &self.content,
            start: 0,
        }
    }
}

impl From<String> for Document {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

impl From<Document> for String {
    fn from(doc: Document) -> Self {
        doc.content
    }
}

/// A slice of document text anchored at a global char offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextWindow<'a> {
    /// Window text
    pub text: &'a str,
    /// Global offset of the first char
    pub start: usize,
}

impl<'a> TextWindow<'a> {
    pub fn new(text: &'a str, start: usize) -> Self {
        Self { text, start }
    }

    /// Window length in chars
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Global end offset (exclusive)
    pub fn end(&self) -> usize {
        self.start + self.len()
    }
}

/// Byte offset of the `char_idx`-th char of `text` (or `text.len()` past the end)
pub(crate) fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(byte, _)| byte)
}

/// Half-open char range `[start_index, end_index)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub start_index: usize,
    pub end_index: usize,
}

impl Span {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    /// Number of chars covered (zero for inverted spans)
    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `[start, end)` lies entirely inside this span
    pub fn contains_range(&self, start: usize, end: usize) -> bool {
        self.start_index <= start && end <= self.end_index
    }

    /// Whether this span shares at least one char with `[start, end)`
    pub fn intersects(&self, start: usize, end: usize) -> bool {
        self.start_index < end && start < self.end_index
    }

    /// Check the range invariant against a document of `doc_len` chars
    pub fn is_valid_for(&self, doc_len: usize) -> bool {
        self.start_index < self.end_index && self.end_index <= doc_len
    }
}

/// A span assigned to a code definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeSegment {
    pub id: AnnotationId,
    #[serde(flatten)]
    pub span: Span,
    pub code_id: CodeId,
}

/// A free-form colored highlight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: AnnotationId,
    #[serde(flatten)]
    pub span: Span,
    pub color: Color,
}

/// A note, optionally anchored to a span
///
/// An unanchored memo applies to the whole document and never takes part in
/// fragmentation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    pub id: AnnotationId,
    #[serde(default)]
    pub anchor: Option<Span>,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// A transient search hit; regenerated per query and never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    #[serde(flatten)]
    pub span: Span,
}

/// A typed interval over document text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Annotation {
    CodeSegment(CodeSegment),
    Highlight(Highlight),
    Memo(Memo),
    SearchMatch(SearchMatch),
}

impl Annotation {
    /// Create a code segment with a fresh id
    pub fn code_segment(start: usize, end: usize, code_id: CodeId) -> Self {
        Annotation::CodeSegment(CodeSegment {
            id: Uuid::new_v4(),
            span: Span::new(start, end),
            code_id,
        })
    }

    /// Create a highlight with a fresh id
    pub fn highlight(start: usize, end: usize, color: Color) -> Self {
        Annotation::Highlight(Highlight {
            id: Uuid::new_v4(),
            span: Span::new(start, end),
            color,
        })
    }

    /// Create a memo with a fresh id
    pub fn memo(anchor: Option<Span>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Annotation::Memo(Memo {
            id: Uuid::new_v4(),
            anchor,
            title: title.into(),
            body: body.into(),
        })
    }

    pub fn search_match(start: usize, end: usize) -> Self {
        Annotation::SearchMatch(SearchMatch {
            span: Span::new(start, end),
        })
    }

    /// Persistent id (search matches have none)
    pub fn id(&self) -> Option<AnnotationId> {
        match self {
            Annotation::CodeSegment(seg) => Some(seg.id),
            Annotation::Highlight(hl) => Some(hl.id),
            Annotation::Memo(memo) => Some(memo.id),
            Annotation::SearchMatch(_) => None,
        }
    }

    /// Covered span, `None` for unanchored memos
    pub fn span(&self) -> Option<Span> {
        match self {
            Annotation::CodeSegment(seg) => Some(seg.span),
            Annotation::Highlight(hl) => Some(hl.span),
            Annotation::Memo(memo) => memo.anchor,
            Annotation::SearchMatch(m) => Some(m.span),
        }
    }

    /// Short kind name used in logs and output
    pub fn kind(&self) -> &'static str {
        match self {
            Annotation::CodeSegment(_) => "code",
            Annotation::Highlight(_) => "highlight",
            Annotation::Memo(_) => "memo",
            Annotation::SearchMatch(_) => "match",
        }
    }

    /// Code referenced by a code segment
    pub fn code_id(&self) -> Option<CodeId> {
        match self {
            Annotation::CodeSegment(seg) => Some(seg.code_id),
            _ => None,
        }
    }

    /// Label identifying the annotation in error messages
    pub(crate) fn label(&self) -> String {
        match self.id() {
            Some(id) => format!("{} {}", self.kind(), id),
            None => self.kind().to_string(),
        }
    }

    /// Check the range invariant against a document of `doc_len` chars
    pub fn validate_span(&self, doc_len: usize) -> CoreResult<()> {
        let Some(span) = self.span() else {
            return Ok(());
        };
        if span.start_index >= span.end_index {
            return Err(CoreError::corrupt(
                self.label(),
                format!(
                    "start {} is not before end {}",
                    span.start_index, span.end_index
                ),
            ));
        }
        if span.end_index > doc_len {
            return Err(CoreError::corrupt(
                self.label(),
                format!(
                    "end {} is past the document end {}",
                    span.end_index, doc_len
                ),
            ));
        }
        Ok(())
    }
}

/// A named, colored category that code segments reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeDefinition {
    /// Unique identifier
    pub id: CodeId,
    /// Display name, unique within a project
    pub name: String,
    /// Category color
    pub color: Color,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// When this code was created
    pub created_at: DateTime<Utc>,
    /// When this code was last updated
    pub updated_at: DateTime<Utc>,
}

impl CodeDefinition {
    /// Create a new code definition
    pub fn new(name: impl Into<String>, color: Color) -> Self {
        Self::with_id(Uuid::new_v4(), name, color)
    }

    /// Create a code with a specific ID (for loading from storage)
    pub fn with_id(id: CodeId, name: impl Into<String>, color: Color) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            color,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.updated_at = Utc::now();
    }

    /// Update the color
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
        self.updated_at = Utc::now();
    }

    /// Update the description
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.updated_at = Utc::now();
    }
}

/// Opaque `#RRGGBB` color
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Translucent version of this color
    pub fn with_alpha(self, alpha: f32) -> Rgba {
        Rgba {
            color: self,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }
}

impl FromStr for Color {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Color {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A color with an alpha channel, rendered as CSS `rgba(...)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub color: Color,
    pub alpha: f32,
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rgba({}, {}, {}, {})",
            self.color.r, self.color.g, self.color.b, self.alpha
        )
    }
}
