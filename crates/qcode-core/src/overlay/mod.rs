//! Annotation overlay
//!
//! Merges every family of interval annotations over a text window into a
//! non-overlapping rendering plan:
//!
//! - `fragment`: splits the window at annotation boundaries
//! - `style`: resolves each fragment's border, fill, layers and markers

pub mod fragment;
pub mod style;

pub use fragment::{boundary_points, compute_fragments, Fragment};
pub use style::{
    Fill, FragmentStyle, Marker, SearchBackground, Stripe, StyleOptions, StylePalette,
    StyleResolver, StyledFragment,
};
