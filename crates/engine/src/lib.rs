//! Map data engine for a tile-based level editor.
//!
//! A map is a [`TileGrid`](world::TileGrid) and an [`EntGrid`](world::EntGrid)
//! sharing one extent, plus an [`AssetTable`](assets::AssetTable) resolving the
//! compact asset IDs stored in their cells. Nothing here touches the file
//! system; loading asset files is left to an [`AssetLoader`](assets::AssetLoader)
//! and persistence to the editor crate.

pub mod assets;
pub mod codec;
pub mod geometry;
pub mod history;
pub mod render;
pub mod world;
