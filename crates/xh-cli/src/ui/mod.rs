//! Terminal output.
//!
//! - [`theme`] - Colors and icons
//! - [`output`] - Status lines used by commands

pub mod output;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
