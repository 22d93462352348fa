//! Fragmentation of a text window by annotation boundaries
//!
//! Every annotation start and end inside the window, plus the two window
//! edges, becomes a boundary point. Consecutive boundary points delimit one
//! fragment, so fragments never overlap, leave no gaps, and are never split
//! anywhere else.

use tracing::trace;

use crate::error::CoreResult;
use crate::models::{Annotation, TextWindow};

/// A minimal slice of window text and the annotations that apply to it
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment<'a> {
    /// Fragment text
    pub text: &'a str,
    /// Global char offset of the first char
    pub global_start: usize,
    /// Global char offset one past the last char
    pub global_end: usize,
    /// Annotations whose span fully contains the fragment, in input order
    pub covering: Vec<&'a Annotation>,
    /// Annotations starting exactly at `global_start`, in input order
    pub starting: Vec<&'a Annotation>,
}

impl Fragment<'_> {
    /// Length in chars
    pub fn len(&self) -> usize {
        self.global_end - self.global_start
    }

    pub fn is_empty(&self) -> bool {
        self.global_start == self.global_end
    }

    /// Whether no annotation covers this fragment
    pub fn is_plain(&self) -> bool {
        self.covering.is_empty()
    }
}

/// Split `window` into fragments along annotation boundaries
///
/// Every annotation is checked against `document_len` first; a malformed
/// span is a fatal `CorruptAnnotationData`, it is never clamped or skipped.
pub fn compute_fragments<'a>(
    document_len: usize,
    window: TextWindow<'a>,
    annotations: &'a [Annotation],
) -> CoreResult<Vec<Fragment<'a>>> {
    for annotation in annotations {
        annotation.validate_span(document_len)?;
    }

    let window_start = window.start;
    let window_end = window.end();
    let selected: Vec<&Annotation> = annotations
        .iter()
        .filter(|a| a.span().is_some_and(|s| s.intersects(window_start, window_end)))
        .collect();

    let points = local_boundaries(window_start, window_end, &selected);
    let bytes = byte_offsets(window.text, &points);

    let mut fragments = Vec::with_capacity(points.len().saturating_sub(1));
    for i in 0..points.len().saturating_sub(1) {
        let global_start = window_start + points[i];
        let global_end = window_start + points[i + 1];

        let mut covering = Vec::new();
        let mut starting = Vec::new();
        for annotation in &selected {
            // Selected annotations always have a span
            let Some(span) = annotation.span() else {
                continue;
            };
            if span.contains_range(global_start, global_end) {
                covering.push(*annotation);
            }
            if span.start_index == global_start {
                starting.push(*annotation);
            }
        }

        fragments.push(Fragment {
            text: &window.text[bytes[i]..bytes[i + 1]],
            global_start,
            global_end,
            covering,
            starting,
        });
    }

    trace!(
        "Window [{}, {}) split into {} fragments by {} annotations",
        window_start,
        window_end,
        fragments.len(),
        selected.len()
    );
    Ok(fragments)
}

/// Sorted, deduplicated boundary points of `window` in global offsets
pub fn boundary_points(
    document_len: usize,
    window: TextWindow<'_>,
    annotations: &[Annotation],
) -> CoreResult<Vec<usize>> {
    for annotation in annotations {
        annotation.validate_span(document_len)?;
    }
    let window_end = window.end();
    let selected: Vec<&Annotation> = annotations
        .iter()
        .filter(|a| a.span().is_some_and(|s| s.intersects(window.start, window_end)))
        .collect();
    Ok(local_boundaries(window.start, window_end, &selected)
        .into_iter()
        .map(|p| p + window.start)
        .collect())
}

/// Boundary points relative to the window start
fn local_boundaries(window_start: usize, window_end: usize, selected: &[&Annotation]) -> Vec<usize> {
    let window_len = window_end - window_start;
    let clamp = |offset: usize| offset.clamp(window_start, window_end) - window_start;

    let mut points = Vec::with_capacity(2 + selected.len() * 2);
    points.push(0);
    points.push(window_len);
    for annotation in selected {
        if let Some(span) = annotation.span() {
            points.push(clamp(span.start_index));
            points.push(clamp(span.end_index));
        }
    }
    points.sort_unstable();
    points.dedup();
    points
}

/// Byte offsets in `text` for ascending char offsets `points`
fn byte_offsets(text: &str, points: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(points.len());
    let mut chars = text.char_indices().map(|(byte, _)| byte).enumerate();
    for &point in points {
        let byte = loop {
            match chars.next() {
                Some((idx, byte)) if idx == point => break byte,
                Some(_) => continue,
                None => break text.len(),
            }
        };
        out.push(byte);
    }
    out
}
