//! Binary tile stream codec, in the legacy and the current layout.
//!
//! Cells are written in flat grid order. A run of empty cells collapses into
//! a single negative `i32` whose magnitude is the run length. The final cell
//! is always written as a full record, even when empty, so a reader knows the
//! stream ends there; a full record with model `-1` is an empty cell.
//!
//! All integers are little-endian.
//!
//! | format  | full record                                          | bytes |
//! |---------|------------------------------------------------------|-------|
//! | legacy  | `i32 model, i32 yaw_deg, i32 texture, i32 pitch_deg` | 16    |
//! | current | `i32 model, i32 tex0, i32 tex1, u8 yaw, u8 pitch`    | 14    |

use crate::world::position::Extent;
use crate::world::tile::{ModelId, TexId, Tile};

/// Which tile record layout a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    /// Map files up to version 3.1: one texture, angles in degrees.
    Legacy,
    /// Map files from version 3.2: two textures, quarter turns as bytes.
    Current,
}

impl TileFormat {
    pub fn for_version(major: u32, minor: u32) -> Self {
        if (major, minor) <= (3, 1) {
            TileFormat::Legacy
        } else {
            TileFormat::Current
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("tile data ends early at byte {offset} (cell {cell} of {cells})")]
    Truncated { offset: usize, cell: usize, cells: usize },
    #[error("empty run of {run} at cell {cell} overruns a grid of {cells} cells")]
    RunOverflow { cell: usize, run: u64, cells: usize },
    #[error("{0} unread bytes after the last cell")]
    TrailingBytes(usize),
    #[error("a {}x{}x{} grid is too large to load", .0.width, .0.height, .0.length)]
    Oversized(Extent),
    #[error("decoded {actual} cells, expected {expected}")]
    CellCount { expected: usize, actual: usize },
}

/// Encode cells (in flat grid order) into a tile stream.
pub fn encode(tiles: &[Tile], format: TileFormat) -> Vec<u8> {
    let mut out = Vec::new();
    let mut run: i32 = 0;
    let count = tiles.len();
    for (idx, tile) in tiles.iter().enumerate() {
        let last = idx + 1 == count;
        if tile.is_empty() && !last {
            run += 1;
            continue;
        }
        if run > 0 {
            out.extend_from_slice(&(-run).to_le_bytes());
            run = 0;
        }
        write_record(&mut out, tile, format);
    }
    out
}

/// Decode a tile stream holding exactly `cells` cells.
pub fn decode(bytes: &[u8], cells: usize, format: TileFormat) -> Result<Vec<Tile>, CodecError> {
    let mut reader = Reader { bytes, offset: 0, cells, cell: 0 };
    // a run record covers many cells, so the stream length only bounds the
    // initial capacity
    let mut tiles = Vec::with_capacity(cells.min(bytes.len()));
    while tiles.len() < cells {
        let cell = tiles.len();
        let last = cell + 1 == cells;
        reader.cell = cell;
        let model = reader.i32()?;
        if model < 0 && !last {
            let run = (model as i64).unsigned_abs();
            if cell as u64 + run > (cells - 1) as u64 {
                return Err(CodecError::RunOverflow { cell, run, cells });
            }
            tiles.extend(std::iter::repeat_n(Tile::EMPTY, run as usize));
            continue;
        }
        let tile = match format {
            TileFormat::Legacy => {
                let yaw = reader.i32()?;
                let texture = reader.i32()?;
                let pitch = reader.i32()?;
                Tile::single(
                    ModelId(model),
                    TexId(texture),
                    quarter_turns(yaw),
                    quarter_turns(pitch),
                )
            }
            TileFormat::Current => {
                let primary = reader.i32()?;
                let secondary = reader.i32()?;
                let yaw = reader.u8()?;
                let pitch = reader.u8()?;
                Tile::new(ModelId(model), [TexId(primary), TexId(secondary)], yaw, pitch)
            }
        };
        tiles.push(if tile.is_empty() { Tile::EMPTY } else { tile });
    }
    match bytes.len() - reader.offset {
        0 => Ok(tiles),
        extra => Err(CodecError::TrailingBytes(extra)),
    }
}

fn write_record(out: &mut Vec<u8>, tile: &Tile, format: TileFormat) {
    out.extend_from_slice(&tile.shape.0.to_le_bytes());
    match format {
        TileFormat::Legacy => {
            out.extend_from_slice(&(tile.yaw as i32 * 90).to_le_bytes());
            out.extend_from_slice(&tile.textures[0].0.to_le_bytes());
            out.extend_from_slice(&(tile.pitch as i32 * 90).to_le_bytes());
        }
        TileFormat::Current => {
            out.extend_from_slice(&tile.textures[0].0.to_le_bytes());
            out.extend_from_slice(&tile.textures[1].0.to_le_bytes());
            out.push(tile.yaw);
            out.push(tile.pitch);
        }
    }
}

/// Degrees to quarter turns. Negative angles wrap the same way positive ones do.
fn quarter_turns(degrees: i32) -> u8 {
    (degrees.rem_euclid(360) / 90) as u8
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    cells: usize,
    cell: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self.offset + N;
        let Some(chunk) = self.bytes.get(self.offset..end) else {
            return Err(CodecError::Truncated {
                offset: self.offset,
                cell: self.cell,
                cells: self.cells,
            });
        };
        self.offset = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(chunk);
        Ok(buf)
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.take::<1>().map(|[b]| b)
    }
}
