//! The spatial substrate of a map: the generic cell grid and the tile and ent
//! grids built on it.

pub mod ent;
pub mod ent_grid;
pub mod grid;
pub mod position;
pub mod tile;
pub mod tile_grid;

pub use ent::{Display, Ent};
pub use ent_grid::EntGrid;
pub use grid::{Grid, RangeError};
pub use position::{Direction, Extent, GridPos, MAX_VOLUME};
pub use tile::{ModelId, TexId, Tile};
pub use tile_grid::{DEFAULT_SPACING, TileGrid, tile_transform};
