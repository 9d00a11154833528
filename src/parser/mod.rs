//! HTML parsing and field cleaning.

pub mod clean;
pub mod product;

pub use product::ProductExtractor;
