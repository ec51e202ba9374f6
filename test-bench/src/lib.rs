//! Bench-side helpers for the `lcdmap` command line tool.

pub mod corner_picker;

pub use corner_picker::{ascii_preview, parse_corner, FixedCorners, PromptCornerPicker};
