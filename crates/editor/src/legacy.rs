//! One-way importer for legacy `.ti` maps.
//!
//! The format is line oriented. Blank lines and `#` comments are skipped.
//! Three sections follow in order, each a header line, a count line, and that
//! many comma-separated records:
//!
//! ```text
//! TILES    x,y,z,shape,texture,angle_deg,kind[,key=value...]
//! SECTORS  x1,y1,z1,x2,y2,z2,shape,texture,angle_deg
//! THINGS   x,y,z,angle_deg,type[,key=value...]
//! ```
//!
//! A `static` tile becomes a tile. Any other kind (door, switch, trigger...)
//! becomes a placeholder ent carrying the tile's data as properties. Sectors
//! are inclusive boxes of static tiles and are laid down before single tiles.
//! The file has no origin: the map spans the TILES and SECTORS coordinates,
//! and THINGS outside that box are dropped.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail, ensure};
use glam::Vec3;
use te3_engine::assets::{AssetCache, AssetTable};
use te3_engine::world::{DEFAULT_SPACING, Ent, EntGrid, Extent, GridPos, MAX_VOLUME, Tile, TileGrid};

use crate::map_man::Camera;
use crate::persistence::LoadedMap;

/// Color of ents made from dynamic tiles.
const DYNAMIC_TILE_COLOR: [u8; 3] = [255, 160, 0];
/// Color of ents made from things.
const THING_COLOR: [u8; 3] = [0, 200, 255];
const PLACEHOLDER_RADIUS: f32 = 0.5;

struct TileRecord {
    line: usize,
    pos: GridPos,
    shape: String,
    texture: String,
    angle: i32,
    kind: String,
    extra: Vec<(String, String)>,
}

struct SectorRecord {
    line: usize,
    lo: GridPos,
    hi: GridPos,
    shape: String,
    texture: String,
    angle: i32,
}

struct ThingRecord {
    pos: Vec3,
    angle: f32,
    kind: String,
    extra: Vec<(String, String)>,
}

// ── Parsing ──────────────────────────────────────────────────────────────────

struct Lines<'a> {
    inner: std::iter::Peekable<Box<dyn Iterator<Item = (usize, &'a str)> + 'a>>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        let iter: Box<dyn Iterator<Item = (usize, &'a str)> + 'a> = Box::new(
            text.lines()
                .enumerate()
                .map(|(n, line)| (n + 1, line.trim()))
                .filter(|(_, line)| !line.is_empty() && !line.starts_with('#')),
        );
        Self { inner: iter.peekable() }
    }

    fn next(&mut self, what: &str) -> Result<(usize, &'a str)> {
        self.inner
            .next()
            .ok_or_else(|| anyhow!("unexpected end of file, expected {}", what))
    }

    /// Consume a section header and its count. A section may be omitted at
    /// the end of the file.
    fn section(&mut self, name: &str) -> Result<usize> {
        let Some(&(line_no, header)) = self.inner.peek() else {
            return Ok(0);
        };
        ensure!(
            header.eq_ignore_ascii_case(name),
            "line {}: expected section {}, found '{}'",
            line_no,
            name,
            header
        );
        self.inner.next();
        let (line_no, count) = self.next("a record count")?;
        count
            .parse()
            .with_context(|| format!("line {}: bad {} count '{}'", line_no, name, count))
    }
}

fn fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn int(field: &str, line_no: usize) -> Result<i32> {
    field
        .parse()
        .with_context(|| format!("line {}: expected an integer, found '{}'", line_no, field))
}

fn float(field: &str, line_no: usize) -> Result<f32> {
    field
        .parse()
        .with_context(|| format!("line {}: expected a number, found '{}'", line_no, field))
}

fn key_values(fields: &[&str], line_no: usize) -> Result<Vec<(String, String)>> {
    fields
        .iter()
        .map(|kv| {
            let (k, v) = kv
                .split_once('=')
                .ok_or_else(|| anyhow!("line {}: expected key=value, found '{}'", line_no, kv))?;
            Ok((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn parse_tile(line: &str, line_no: usize) -> Result<TileRecord> {
    let f = fields(line);
    ensure!(f.len() >= 7, "line {}: tile needs 7 fields, found {}", line_no, f.len());
    Ok(TileRecord {
        line: line_no,
        pos: GridPos::new(int(f[0], line_no)?, int(f[1], line_no)?, int(f[2], line_no)?),
        shape: f[3].to_string(),
        texture: f[4].to_string(),
        angle: int(f[5], line_no)?,
        kind: f[6].to_ascii_lowercase(),
        extra: key_values(&f[7..], line_no)?,
    })
}

fn parse_sector(line: &str, line_no: usize) -> Result<SectorRecord> {
    let f = fields(line);
    ensure!(f.len() == 9, "line {}: sector needs 9 fields, found {}", line_no, f.len());
    let a = GridPos::new(int(f[0], line_no)?, int(f[1], line_no)?, int(f[2], line_no)?);
    let b = GridPos::new(int(f[3], line_no)?, int(f[4], line_no)?, int(f[5], line_no)?);
    Ok(SectorRecord {
        line: line_no,
        lo: a.min(b),
        hi: a.max(b),
        shape: f[6].to_string(),
        texture: f[7].to_string(),
        angle: int(f[8], line_no)?,
    })
}

fn parse_thing(line: &str, line_no: usize) -> Result<ThingRecord> {
    let f = fields(line);
    ensure!(f.len() >= 5, "line {}: thing needs 5 fields, found {}", line_no, f.len());
    Ok(ThingRecord {
        pos: Vec3::new(float(f[0], line_no)?, float(f[1], line_no)?, float(f[2], line_no)?),
        angle: float(f[3], line_no)?,
        kind: f[4].to_string(),
        extra: key_values(&f[5..], line_no)?,
    })
}

// ── Conversion ───────────────────────────────────────────────────────────────

/// Convert a legacy map into editor structures, loading its assets through
/// `cache`.
pub fn import_ti(cache: &AssetCache, text: &str) -> Result<LoadedMap> {
    let mut lines = Lines::new(text);
    let mut tiles = Vec::new();
    let mut sectors = Vec::new();
    let mut things = Vec::new();

    for _ in 0..lines.section("TILES")? {
        let (n, line) = lines.next("a tile record")?;
        tiles.push(parse_tile(line, n)?);
    }
    for _ in 0..lines.section("SECTORS")? {
        let (n, line) = lines.next("a sector record")?;
        sectors.push(parse_sector(line, n)?);
    }
    for _ in 0..lines.section("THINGS")? {
        let (n, line) = lines.next("a thing record")?;
        things.push(parse_thing(line, n)?);
    }
    if let Some((n, line)) = lines.inner.next() {
        bail!("line {}: unexpected content after THINGS: '{}'", n, line);
    }

    let boxes = tiles
        .iter()
        .map(|t| (t.pos, t.pos, t.line))
        .chain(sectors.iter().map(|s| (s.lo, s.hi, s.line)));
    let mut bounds: Option<(GridPos, GridPos)> = None;
    for (a, b, line_no) in boxes {
        let (lo, hi) = bounds.map_or((a, b), |(lo, hi)| (lo.min(a), hi.max(b)));
        ensure!(
            span(lo, hi).is_some(),
            "line {}: map would span more than {} cells",
            line_no,
            MAX_VOLUME
        );
        bounds = Some((lo, hi));
    }
    let (lo, hi) = bounds.ok_or_else(|| anyhow!("legacy map has no tiles or sectors"))?;
    let extent = span(lo, hi).ok_or_else(|| anyhow!("legacy map is too large"))?;

    let mut assets = AssetTable::new();
    let mut grid = TileGrid::new(extent, DEFAULT_SPACING);
    let mut ents = EntGrid::new(extent, DEFAULT_SPACING);

    for sector in &sectors {
        let tile = static_tile(cache, &mut assets, &sector.shape, &sector.texture, sector.angle)?;
        let box_extent = span(sector.lo, sector.hi)
            .ok_or_else(|| anyhow!("line {}: sector is too large", sector.line))?;
        grid.set_tile_rect(sector.lo - lo, box_extent, tile);
    }

    let mut dynamic = 0usize;
    for record in tiles {
        let pos = record.pos - lo;
        if record.kind == "static" {
            let tile = static_tile(cache, &mut assets, &record.shape, &record.texture, record.angle)?;
            grid.set_tile(pos, tile);
            continue;
        }
        let mut ent = Ent::sphere(DYNAMIC_TILE_COLOR, PLACEHOLDER_RADIUS)
            .with_angles(record.angle as f32, 0.0)
            .with_property("type", record.kind)
            .with_property("shape", record.shape)
            .with_property("texture", record.texture)
            .with_property("angle", record.angle.to_string());
        ent.properties.extend(record.extra);
        ents.add_ent(pos, ent);
        dynamic += 1;
    }

    let mut dropped = 0usize;
    let origin = Vec3::new(lo.i as f32, lo.j as f32, lo.k as f32);
    for thing in things {
        let local = (thing.pos - origin).floor();
        let pos = GridPos::new(local.x as i32, local.y as i32, local.z as i32);
        if !extent.contains(pos) {
            dropped += 1;
            continue;
        }
        let mut ent = Ent::sphere(THING_COLOR, PLACEHOLDER_RADIUS)
            .with_angles(thing.angle, 0.0)
            .with_property("type", thing.kind);
        ent.properties.extend(thing.extra);
        ents.add_ent(pos, ent);
    }
    if dropped > 0 {
        tracing::warn!("Dropped {} legacy things outside the map bounds", dropped);
    }
    tracing::info!(
        "Imported legacy map: {}x{}x{}, {} tiles, {} placeholder ents from dynamic tiles",
        extent.width,
        extent.height,
        extent.length,
        grid.occupied_count(),
        dynamic,
    );

    let camera = Camera::overlooking(grid.grid());
    Ok(LoadedMap { assets, tiles: grid, ents, camera })
}

/// Cells covered by the inclusive box `lo..=hi`, or `None` when that is more
/// than a map may hold.
fn span(lo: GridPos, hi: GridPos) -> Option<Extent> {
    let side = |a: i32, b: i32| usize::try_from(i64::from(b) - i64::from(a) + 1).ok();
    let extent = Extent::new(side(lo.i, hi.i)?, side(lo.j, hi.j)?, side(lo.k, hi.k)?);
    extent.is_allocatable().then_some(extent)
}

fn static_tile(cache: &AssetCache, assets: &mut AssetTable, shape: &str, texture: &str, angle: i32) -> Result<Tile> {
    let shape = assets
        .get_or_add_model(cache, Path::new(shape))
        .with_context(|| format!("loading shape {}", shape))?;
    let texture = assets
        .get_or_add_texture(cache, Path::new(texture))
        .with_context(|| format!("loading texture {}", texture))?;
    let yaw = (angle.rem_euclid(360) / 90) as u8;
    Ok(Tile::single(shape, texture, yaw, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use te3_engine::world::{ModelId, TexId};

    const SAMPLE: &str = "\
# exported by the old tool
TILES
3
10,0,5,cube.obj,brick.png,90,static
11,0,5,cube.obj,stone.png,0,static
12,0,5,door.obj,wood.png,180,door,target=gate1

SECTORS
1
10,-1,5,12,-1,6,cube.obj,stone.png,0
THINGS
2
10.5,0.2,5.9,270,player_start
40,0,0,0,monster,health=20
";

    #[test]
    fn test_bounds_come_from_tiles_and_sectors() {
        let cache = crate::test_support::cube_cache();
        let map = import_ti(&cache, SAMPLE).unwrap();
        assert_eq!(map.tiles.extent(), Extent::new(3, 2, 2));

        // static tiles sit one layer above the sector floor
        let brick = map.tiles.get_tile(GridPos::new(0, 1, 0));
        assert_eq!(brick.yaw, 1);
        assert_eq!(map.assets.path_from_tex_id(brick.textures[0]), Some(Path::new("brick.png")));
        assert_eq!(brick.textures[0], brick.textures[1]);
        assert_eq!(map.tiles.occupied_count(), 2 + 3 * 2);
        // the door is an ent, not a tile
        assert!(map.tiles.get_tile(GridPos::new(2, 1, 0)).is_empty());
    }

    #[test]
    fn test_dynamic_tiles_become_placeholder_ents() {
        let cache = crate::test_support::cube_cache();
        let map = import_ti(&cache, SAMPLE).unwrap();
        let door = map.ents.get_ent(GridPos::new(2, 1, 0));
        assert_eq!(door.properties["type"], "door");
        assert_eq!(door.properties["shape"], "door.obj");
        assert_eq!(door.properties["angle"], "180");
        assert_eq!(door.properties["target"], "gate1");
        assert_eq!(door.yaw, 180.0);
        // placeholders reference no assets
        assert_eq!(map.assets.path_from_model_id(ModelId(1)), None);
        assert_eq!(map.assets.path_from_tex_id(TexId(2)), None);
    }

    #[test]
    fn test_things_are_floored_and_clipped() {
        let cache = crate::test_support::cube_cache();
        let map = import_ti(&cache, SAMPLE).unwrap();
        assert_eq!(map.ents.count(), 2);
        let start = map.ents.get_ent(GridPos::new(0, 1, 0));
        assert_eq!(start.properties["type"], "player_start");
        assert_eq!(start.yaw, 270.0);
    }

    #[test]
    fn test_malformed_input_fails() {
        let cache = crate::test_support::cube_cache();
        assert!(import_ti(&cache, "TILES\n2\n0,0,0,cube.obj,a.png,0,static\n").is_err());
        assert!(import_ti(&cache, "TILES\nmany\n").is_err());
        assert!(import_ti(&cache, "THINGS\n0\n").is_err());
        assert!(import_ti(&cache, "TILES\n0\nSECTORS\n0\n").is_err());
        assert!(import_ti(&cache, "TILES\n1\n0,0,0,cube.obj,a.png,x,static\n").is_err());
    }

    #[test]
    fn test_oversized_bounds_fail_on_the_widening_line() {
        let cache = crate::test_support::cube_cache();
        let extremes = "TILES\n2\n-2147483648,0,0,cube.obj,a.png,0,static\n2147483647,0,0,cube.obj,a.png,0,static\n";
        let err = import_ti(&cache, extremes).unwrap_err();
        assert!(err.to_string().starts_with("line 4:"), "{err}");

        let wide = "TILES\n1\n0,0,0,cube.obj,a.png,0,static\nSECTORS\n1\n0,0,0,4999,0,4999,cube.obj,a.png,0\n";
        let err = import_ti(&cache, wide).unwrap_err();
        assert!(err.to_string().starts_with("line 6:"), "{err}");
    }
}
