//! Readers for the on-disk map formats: `map.json` metadata, the binary
//! `hf.cell` heightfield chunks, and `.tqt` texture quadtrees.

pub mod cell;
pub mod map_json;
pub mod tqt;
