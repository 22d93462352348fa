//! Style resolution for fragments
//!
//! Turns the annotations covering a fragment into a deterministic visual
//! style. Precedence:
//!
//! 1. The covering code segment with the smallest span draws a dashed border
//!    in its code color (ties: first in input order).
//! 2. Segments eligible for fill (`show_colors`, inverted for the active
//!    segment) give a flat fill when there is one, or equal-height
//!    horizontal stripes in input order when there are several.
//! 3. Each covering highlight adds a translucent background layer.
//! 4. A covering search match replaces the whole background.
//!
//! Code segments and anchored memos starting at a fragment place a marker
//! before its text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::fragment::{compute_fragments, Fragment};
use crate::error::{CoreError, CoreResult};
use crate::models::{Annotation, AnnotationId, CodeDefinition, CodeId, Color, Rgba, TextWindow};

/// Colors and opacities used when styling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StylePalette {
    /// Opacity of code fills and stripes
    pub fill_alpha: f32,
    /// Opacity of highlight layers
    pub highlight_alpha: f32,
    /// Background of the active search match
    pub search_current: Color,
    /// Background of every other search match
    pub search_other: Color,
}

impl Default for StylePalette {
    fn default() -> Self {
        Self {
            fill_alpha: 0.25,
            highlight_alpha: 0.35,
            search_current: Color::rgb(0xff, 0x96, 0x32),
            search_other: Color::rgb(0xff, 0xff, 0x00),
        }
    }
}

/// Caller-controlled inputs to style resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleOptions {
    /// Fill code segments with their code color
    pub show_colors: bool,
    /// Selected segment; its fill visibility is the inverse of `show_colors`
    pub active_segment: Option<AnnotationId>,
    /// Start offset of the current search match
    pub active_match_start: Option<usize>,
    pub palette: StylePalette,
}

/// Code fill of a fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Fill {
    None,
    /// A single eligible segment
    Solid(Rgba),
    /// Several eligible segments stacked top to bottom
    Stripes(Vec<Stripe>),
}

/// One horizontal band of a striped fill
#[derive(Debug, Clone, PartialEq)]
pub struct Stripe {
    pub color: Rgba,
    /// Share of the fragment height, `100 / k`
    pub height_percent: f32,
}

/// Background that replaces everything else on a search hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBackground {
    pub color: Color,
    /// Whether this is the active match
    pub current: bool,
}

/// Interactive marker placed before a fragment's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Code {
        segment: AnnotationId,
        code: CodeId,
        color: Color,
    },
    Memo {
        memo: AnnotationId,
        title: String,
    },
}

/// Resolved look of one fragment
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentStyle {
    /// Dashed border color from the narrowest covering segment
    pub border: Option<Color>,
    pub fill: Fill,
    /// Highlight layers in input order
    pub highlights: Vec<Rgba>,
    pub search: Option<SearchBackground>,
    pub markers: Vec<Marker>,
}

impl Default for FragmentStyle {
    fn default() -> Self {
        Self {
            border: None,
            fill: Fill::None,
            highlights: Vec::new(),
            search: None,
            markers: Vec::new(),
        }
    }
}

impl FragmentStyle {
    /// Whether the fragment renders as plain text
    pub fn is_plain(&self) -> bool {
        *self == FragmentStyle::default()
    }

    /// Inline CSS declarations for web hosts
    pub fn css(&self) -> String {
        let mut decls = Vec::new();
        if let Some(border) = self.border {
            decls.push(format!("border: 1px dashed {}", border));
        }
        if let Some(search) = self.search {
            decls.push(format!("background-color: {}", search.color));
            return decls.join("; ");
        }

        let mut layers = Vec::new();
        match &self.fill {
            Fill::None => {}
            Fill::Solid(color) => layers.push(format!("linear-gradient({0}, {0})", color)),
            Fill::Stripes(stripes) => {
                let mut stops = Vec::with_capacity(stripes.len() * 2);
                let mut offset = 0.0_f32;
                for stripe in stripes {
                    let end = offset + stripe.height_percent;
                    stops.push(format!("{} {}%", stripe.color, offset));
                    stops.push(format!("{} {}%", stripe.color, end));
                    offset = end;
                }
                layers.push(format!("linear-gradient(to bottom, {})", stops.join(", ")));
            }
        }
        for highlight in &self.highlights {
            layers.push(format!("linear-gradient({0}, {0})", highlight));
        }
        if !layers.is_empty() {
            decls.push(format!("background-image: {}", layers.join(", ")));
        }
        decls.join("; ")
    }
}

/// A fragment together with its resolved style
#[derive(Debug, Clone, PartialEq)]
pub struct StyledFragment<'a> {
    pub fragment: Fragment<'a>,
    pub style: FragmentStyle,
}

/// Resolves fragment styles against a set of code definitions
pub struct StyleResolver<'c> {
    codes: &'c HashMap<CodeId, CodeDefinition>,
    options: StyleOptions,
}

impl<'c> StyleResolver<'c> {
    pub fn new(codes: &'c HashMap<CodeId, CodeDefinition>, options: StyleOptions) -> Self {
        Self { codes, options }
    }

    pub fn options(&self) -> &StyleOptions {
        &self.options
    }

    /// Fragment `window` and style every fragment
    pub fn render<'a>(
        &self,
        document_len: usize,
        window: TextWindow<'a>,
        annotations: &'a [Annotation],
    ) -> CoreResult<Vec<StyledFragment<'a>>> {
        compute_fragments(document_len, window, annotations)?
            .into_iter()
            .map(|fragment| {
                let style = self.resolve(&fragment)?;
                Ok(StyledFragment { fragment, style })
            })
            .collect()
    }

    /// Resolve the style of one fragment
    pub fn resolve(&self, fragment: &Fragment<'_>) -> CoreResult<FragmentStyle> {
        let palette = &self.options.palette;
        let mut style = FragmentStyle::default();
        let mut narrowest: Option<(usize, Color)> = None;
        let mut eligible: Vec<Color> = Vec::new();

        for annotation in &fragment.covering {
            match annotation {
                Annotation::CodeSegment(seg) => {
                    let code = self.lookup(annotation, seg.code_id)?;
                    let span = seg.span.len();
                    if narrowest.map_or(true, |(best, _)| span < best) {
                        narrowest = Some((span, code.color));
                    }
                    let active = self.options.active_segment == Some(seg.id);
                    if self.options.show_colors != active {
                        eligible.push(code.color);
                    }
                }
                Annotation::Highlight(hl) => {
                    style
                        .highlights
                        .push(hl.color.with_alpha(palette.highlight_alpha));
                }
                Annotation::Memo(_) => {}
                Annotation::SearchMatch(m) => {
                    let current = self.options.active_match_start == Some(m.span.start_index);
                    let color = if current {
                        palette.search_current
                    } else {
                        palette.search_other
                    };
                    style.search = Some(SearchBackground { color, current });
                }
            }
        }

        style.border = narrowest.map(|(_, color)| color);
        style.fill = match eligible.len() {
            0 => Fill::None,
            1 => Fill::Solid(eligible[0].with_alpha(palette.fill_alpha)),
            k => {
                let height_percent = 100.0 / k as f32;
                Fill::Stripes(
                    eligible
                        .into_iter()
                        .map(|color| Stripe {
                            color: color.with_alpha(palette.fill_alpha),
                            height_percent,
                        })
                        .collect(),
                )
            }
        };

        if style.search.is_some() {
            style.fill = Fill::None;
            style.highlights.clear();
        }

        for annotation in &fragment.starting {
            match annotation {
                Annotation::CodeSegment(seg) => {
                    let code = self.lookup(annotation, seg.code_id)?;
                    style.markers.push(Marker::Code {
                        segment: seg.id,
                        code: seg.code_id,
                        color: code.color,
                    });
                }
                Annotation::Memo(memo) if memo.anchor.is_some() => {
                    style.markers.push(Marker::Memo {
                        memo: memo.id,
                        title: memo.title.clone(),
                    });
                }
                Annotation::Memo(_) | Annotation::Highlight(_) | Annotation::SearchMatch(_) => {}
            }
        }

        Ok(style)
    }

    fn lookup(&self, annotation: &Annotation, code_id: CodeId) -> CoreResult<&'c CodeDefinition> {
        self.codes.get(&code_id).ok_or_else(|| {
            CoreError::corrupt(
                annotation.label(),
                format!("references missing code {}", code_id),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Span};

    struct Fixture {
        doc: Document,
        codes: HashMap<CodeId, CodeDefinition>,
        red: CodeDefinition,
        blue: CodeDefinition,
    }

    fn fixture() -> Fixture {
        let red = CodeDefinition::new("Red", Color::rgb(255, 0, 0));
        let blue = CodeDefinition::new("Blue", Color::rgb(0, 0, 255));
        let codes = [red.clone(), blue.clone()]
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        Fixture {
            doc: Document::new("Hello world"),
            codes,
            red,
            blue,
        }
    }

    fn options(show_colors: bool) -> StyleOptions {
        StyleOptions {
            show_colors,
            ..StyleOptions::default()
        }
    }

    #[test]
    fn test_hello_world_styles() {
        let f = fixture();
        let yellow = Color::rgb(255, 255, 0);
        let annotations = vec![
            Annotation::code_segment(0, 5, f.red.id),
            Annotation::highlight(3, 8, yellow),
        ];
        let resolver = StyleResolver::new(&f.codes, options(true));

        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();

        let palette = StylePalette::default();
        let red_fill = Fill::Solid(f.red.color.with_alpha(palette.fill_alpha));
        let yellow_layer = yellow.with_alpha(palette.highlight_alpha);

        assert_eq!(styled[0].style.border, Some(f.red.color));
        assert_eq!(styled[0].style.fill, red_fill);
        assert!(styled[0].style.highlights.is_empty());
        assert_eq!(styled[0].style.markers.len(), 1);

        assert_eq!(styled[1].style.fill, red_fill);
        assert_eq!(styled[1].style.highlights, vec![yellow_layer]);
        assert!(styled[1].style.markers.is_empty());

        assert_eq!(styled[2].style.border, None);
        assert_eq!(styled[2].style.fill, Fill::None);
        assert_eq!(styled[2].style.highlights, vec![yellow_layer]);

        assert!(styled[3].style.is_plain());
    }

    #[test]
    fn test_narrowest_segment_draws_border() {
        let f = fixture();
        let annotations = vec![
            Annotation::code_segment(0, 11, f.red.id),
            Annotation::code_segment(2, 6, f.blue.id),
        ];
        let resolver = StyleResolver::new(&f.codes, options(false));
        let styled = resolver
            .render(f.doc.len(), f.doc.window(2, 6), &annotations)
            .unwrap();

        assert_eq!(styled.len(), 1);
        assert_eq!(styled[0].style.border, Some(f.blue.color));
    }

    #[test]
    fn test_border_tie_keeps_first_in_input_order() {
        let f = fixture();
        let annotations = vec![
            Annotation::code_segment(0, 4, f.blue.id),
            Annotation::code_segment(0, 4, f.red.id),
        ];
        let resolver = StyleResolver::new(&f.codes, options(false));
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();
        assert_eq!(styled[0].style.border, Some(f.blue.color));

        let reversed: Vec<_> = annotations.into_iter().rev().collect();
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &reversed)
            .unwrap();
        assert_eq!(styled[0].style.border, Some(f.red.color));
    }

    #[test]
    fn test_multiple_eligible_segments_stripe() {
        let f = fixture();
        let annotations = vec![
            Annotation::code_segment(0, 5, f.red.id),
            Annotation::code_segment(0, 5, f.blue.id),
        ];
        let resolver = StyleResolver::new(&f.codes, options(true));
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();

        let Fill::Stripes(stripes) = &styled[0].style.fill else {
            panic!("expected stripes, got {:?}", styled[0].style.fill);
        };
        assert_eq!(stripes.len(), 2);
        assert_eq!(stripes[0].color.color, f.red.color);
        assert_eq!(stripes[1].color.color, f.blue.color);
        assert!((stripes[0].height_percent - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_active_segment_inverts_fill() {
        let f = fixture();
        let red_seg = Annotation::code_segment(0, 5, f.red.id);
        let red_id = red_seg.id().unwrap();
        let annotations = vec![red_seg, Annotation::code_segment(0, 5, f.blue.id)];

        // Colors on: the active segment is hidden, leaving only blue
        let resolver = StyleResolver::new(
            &f.codes,
            StyleOptions {
                show_colors: true,
                active_segment: Some(red_id),
                ..StyleOptions::default()
            },
        );
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();
        assert!(matches!(styled[0].style.fill, Fill::Solid(c) if c.color == f.blue.color));

        // Colors off: only the active segment is shown
        let resolver = StyleResolver::new(
            &f.codes,
            StyleOptions {
                show_colors: false,
                active_segment: Some(red_id),
                ..StyleOptions::default()
            },
        );
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();
        assert!(matches!(styled[0].style.fill, Fill::Solid(c) if c.color == f.red.color));
    }

    #[test]
    fn test_search_match_overrides_background() {
        let f = fixture();
        let annotations = vec![
            Annotation::code_segment(0, 11, f.red.id),
            Annotation::highlight(0, 11, Color::rgb(0, 255, 0)),
            Annotation::search_match(0, 2),
            Annotation::search_match(6, 8),
        ];
        let resolver = StyleResolver::new(
            &f.codes,
            StyleOptions {
                show_colors: true,
                active_match_start: Some(6),
                ..StyleOptions::default()
            },
        );
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();
        let palette = StylePalette::default();

        let first = &styled[0].style;
        assert_eq!(
            first.search,
            Some(SearchBackground {
                color: palette.search_other,
                current: false
            })
        );
        assert_eq!(first.fill, Fill::None);
        assert!(first.highlights.is_empty());
        assert_eq!(first.border, Some(f.red.color));

        let current = styled.iter().find(|s| s.fragment.global_start == 6).unwrap();
        assert_eq!(current.style.search.unwrap().color, palette.search_current);

        let between = styled.iter().find(|s| s.fragment.global_start == 2).unwrap();
        assert!(between.style.search.is_none());
        assert!(matches!(between.style.fill, Fill::Solid(_)));
    }

    #[test]
    fn test_markers_for_codes_and_anchored_memos_only() {
        let f = fixture();
        let annotations = vec![
            Annotation::highlight(0, 3, Color::rgb(0, 255, 0)),
            Annotation::search_match(0, 3),
            Annotation::memo(Some(Span::new(0, 3)), "Greeting", "body"),
            Annotation::code_segment(0, 3, f.red.id),
            Annotation::memo(None, "Document memo", ""),
        ];
        let resolver = StyleResolver::new(&f.codes, options(true));
        let styled = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap();

        let markers = &styled[0].style.markers;
        assert_eq!(markers.len(), 2);
        assert!(matches!(&markers[0], Marker::Memo { title, .. } if title == "Greeting"));
        assert!(matches!(markers[1], Marker::Code { code, .. } if code == f.red.id));
    }

    #[test]
    fn test_missing_code_is_fatal() {
        let f = fixture();
        let annotations = vec![Annotation::code_segment(0, 3, uuid::Uuid::new_v4())];
        let resolver = StyleResolver::new(&f.codes, options(true));
        let err = resolver
            .render(f.doc.len(), f.doc.full_window(), &annotations)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_css_output() {
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        let style = FragmentStyle {
            border: Some(red),
            fill: Fill::Stripes(vec![
                Stripe {
                    color: red.with_alpha(0.25),
                    height_percent: 50.0,
                },
                Stripe {
                    color: blue.with_alpha(0.25),
                    height_percent: 50.0,
                },
            ]),
            ..FragmentStyle::default()
        };
        assert_eq!(
            style.css(),
            "border: 1px dashed #ff0000; background-image: linear-gradient(to bottom, \
             rgba(255, 0, 0, 0.25) 0%, rgba(255, 0, 0, 0.25) 50%, \
             rgba(0, 0, 255, 0.25) 50%, rgba(0, 0, 255, 0.25) 100%)"
        );

        let search = FragmentStyle {
            search: Some(SearchBackground {
                color: Color::rgb(0xff, 0xff, 0),
                current: false,
            }),
            ..FragmentStyle::default()
        };
        assert_eq!(search.css(), "background-color: #ffff00");
        assert_eq!(FragmentStyle::default().css(), "");
    }
}
