//! Search over document text
//!
//! Queries are literal and case-insensitive: the query text is escaped, so
//! characters like `.` or `(` match themselves. Matches are non-overlapping,
//! in left-to-right order, with char offsets.
//!
//! The matcher keeps no state beyond the current match list and the current
//! match index; every query or content change recomputes from scratch.

use regex::RegexBuilder;
use tracing::warn;

use crate::models::{Annotation, Span};

/// Upper bound on the compiled size of a query
const QUERY_SIZE_LIMIT: usize = 1 << 20;

/// Find every occurrence of `query` in `text`
///
/// An empty query, or one too large to compile, yields no matches.
pub fn find_matches(query: &str, text: &str) -> Vec<Span> {
    if query.is_empty() {
        return Vec::new();
    }

    let regex = match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .size_limit(QUERY_SIZE_LIMIT)
        .build()
    {
        Ok(regex) => regex,
        Err(e) => {
            warn!("Search query rejected, returning no matches: {}", e);
            return Vec::new();
        }
    };

    // Walk chars once, converting byte offsets to char offsets as we go
    let total = text.chars().count();
    let mut offsets = text.char_indices().map(|(byte, _)| byte).enumerate().peekable();
    let mut char_at = |byte: usize| -> usize {
        while let Some(&(idx, b)) = offsets.peek() {
            if b >= byte {
                return idx;
            }
            offsets.next();
        }
        total
    };

    let mut spans = Vec::new();
    for m in regex.find_iter(text) {
        if m.is_empty() {
            continue;
        }
        let start = char_at(m.start());
        let end = char_at(m.end());
        spans.push(Span::new(start, end));
    }
    spans
}

/// Current search results with a cycling cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchMatcher {
    query: String,
    matches: Vec<Span>,
    current: Option<usize>,
}

impl SearchMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute matches for `query` over `text`
    ///
    /// The current match resets to the first one (or none).
    pub fn update(&mut self, query: &str, text: &str) -> usize {
        self.query = query.to_string();
        self.matches = find_matches(query, text);
        self.current = if self.matches.is_empty() { None } else { Some(0) };
        self.matches.len()
    }

    /// Recompute for the same query after the content changed
    ///
    /// Keeps the current index when it is still in range.
    pub fn refresh(&mut self, text: &str) -> usize {
        let previous = self.current;
        self.matches = find_matches(&self.query, text);
        self.current = match previous {
            Some(i) if i < self.matches.len() => Some(i),
            _ if self.matches.is_empty() => None,
            _ => Some(0),
        };
        self.matches.len()
    }

    /// Move to the next match, wrapping to the first
    pub fn next_match(&mut self) -> Option<Span> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let i = self.current.map_or(0, |i| (i + 1) % len);
        self.current = Some(i);
        Some(self.matches[i])
    }

    /// Move to the previous match, wrapping to the last
    pub fn previous_match(&mut self) -> Option<Span> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let i = self.current.map_or(len - 1, |i| (i + len - 1) % len);
        self.current = Some(i);
        Some(self.matches[i])
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.matches.clear();
        self.current = None;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[Span] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Index of the current match
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<Span> {
        self.current.map(|i| self.matches[i])
    }

    /// Start offset of the current match, for style resolution
    pub fn current_start(&self) -> Option<usize> {
        self.current().map(|span| span.start_index)
    }

    /// Matches as transient overlay annotations
    pub fn annotations(&self) -> Vec<Annotation> {
        self.matches
            .iter()
            .map(|span| Annotation::search_match(span.start_index, span.end_index))
            .collect()
    }
}
