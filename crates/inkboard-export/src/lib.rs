//! Board export: SVG drawings and JSON snapshots.

pub mod json;
pub mod svg;

pub use json::{export_json, save_json};
pub use svg::{export_svg, save_svg};
