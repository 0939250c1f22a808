//! Match JPEGs to their RAW originals by metadata and copy GPS tags across.

pub mod core;
