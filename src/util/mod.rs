//! Helpers for printing sheet-supplied text to a terminal.

mod text;

pub use text::{fit_width, sanitize_line};
