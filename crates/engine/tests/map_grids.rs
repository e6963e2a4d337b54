//! Whole-map properties exercised through the public API: codec round trips,
//! face culling, undo/redo and region copies.

use std::path::Path;
use te3_engine::assets::{AssetCache, AssetError, AssetLoader, AssetTable, Model, Texture};
use te3_engine::codec::TileFormat;
use te3_engine::history::{Action, EntAction, History, TileAction};
use te3_engine::world::{Ent, EntGrid, Extent, GridPos, ModelId, TexId, Tile, TileGrid};

struct CubeLoader;

impl AssetLoader for CubeLoader {
    fn load_texture(&self, path: &Path) -> Result<Texture, AssetError> {
        Ok(Texture { path: path.to_path_buf() })
    }

    fn load_model(&self, _path: &Path) -> Result<Model, AssetError> {
        Ok(Model::cube(2.0))
    }
}

/// xorshift, so grids are varied but reproducible.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> i32 {
        (self.next() % n) as i32
    }
}

fn random_grid(rng: &mut Rng, extent: Extent, single_texture: bool) -> TileGrid {
    let mut tiles = TileGrid::new(extent, 2.0);
    for pos in extent.positions(GridPos::ZERO) {
        if rng.below(3) != 0 {
            continue;
        }
        let primary = TexId(rng.below(8));
        let secondary = if single_texture { primary } else { TexId(rng.below(8) - 1) };
        let tile = Tile::new(
            ModelId(rng.below(5)),
            [primary, secondary],
            rng.below(4) as u8,
            rng.below(4) as u8,
        );
        tiles.set_tile(pos, tile);
    }
    tiles
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[test]
fn current_codec_round_trips_random_grids() {
    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
    for extent in [Extent::new(1, 1, 1), Extent::new(5, 3, 4), Extent::new(16, 2, 9)] {
        let tiles = random_grid(&mut rng, extent, false);
        let bytes = tiles.to_bytes(TileFormat::Current);
        let decoded = TileGrid::from_bytes(extent, 2.0, &bytes, TileFormat::Current).unwrap();
        assert_eq!(decoded, tiles);
    }
}

#[test]
fn legacy_codec_round_trips_single_texture_grids() {
    let mut rng = Rng(42);
    let extent = Extent::new(7, 3, 5);
    let tiles = random_grid(&mut rng, extent, true);
    let bytes = tiles.to_bytes(TileFormat::Legacy);
    let decoded = TileGrid::from_bytes(extent, 2.0, &bytes, TileFormat::Legacy).unwrap();
    assert_eq!(decoded, tiles);
}

#[test]
fn all_empty_grid_is_one_run_and_one_record() {
    let extent = Extent::new(4, 2, 4);
    let tiles = TileGrid::new(extent, 2.0);
    let bytes = tiles.to_bytes(TileFormat::Current);
    assert_eq!(bytes.len(), 4 + 14);
    let decoded = TileGrid::from_bytes(extent, 2.0, &bytes, TileFormat::Current).unwrap();
    assert_eq!(decoded.occupied_count(), 0);
}

#[test]
fn stream_for_wrong_extent_is_rejected() {
    let extent = Extent::new(3, 1, 1);
    let bytes = TileGrid::new(extent, 2.0).to_bytes(TileFormat::Current);
    assert!(TileGrid::from_bytes(Extent::new(2, 1, 1), 2.0, &bytes, TileFormat::Current).is_err());
    assert!(TileGrid::from_bytes(Extent::new(9, 1, 1), 2.0, &bytes, TileFormat::Current).is_err());
}

// ---------------------------------------------------------------------------
// Face culling
// ---------------------------------------------------------------------------

fn cube_table() -> (AssetTable, ModelId, TexId) {
    let cache = AssetCache::new(CubeLoader);
    let mut table = AssetTable::new();
    let cube = table.get_or_add_model(&cache, Path::new("cube.obj")).unwrap();
    let tex = table.get_or_add_texture(&cache, Path::new("stone.png")).unwrap();
    (table, cube, tex)
}

#[test]
fn culling_removes_only_the_shared_face() {
    let (table, cube, tex) = cube_table();
    let mut tiles = TileGrid::new(Extent::new(2, 1, 1), 2.0);
    tiles.set_tile(GridPos::new(0, 0, 0), Tile::single(cube, tex, 0, 0));
    tiles.set_tile(GridPos::new(1, 0, 0), Tile::single(cube, tex, 0, 0));

    assert_eq!(tiles.merged_model(&table, false).triangle_count(), 24);
    let culled = tiles.merged_model(&table, true);
    assert_eq!(culled.triangle_count(), 20);

    // Nothing left lies on the shared plane x = 2.
    let mesh = &culled.meshes[0].mesh;
    for tri in mesh.indices.chunks(3) {
        let on_shared_plane = tri
            .iter()
            .all(|&i| (mesh.positions[i as usize].x - 2.0).abs() < 1e-4);
        assert!(!on_shared_plane);
    }
}

#[test]
fn culling_without_neighbors_removes_nothing() {
    let (table, cube, tex) = cube_table();
    let mut tiles = TileGrid::new(Extent::new(3, 1, 1), 2.0);
    tiles.set_tile(GridPos::new(0, 0, 0), Tile::single(cube, tex, 0, 0));
    tiles.set_tile(GridPos::new(2, 0, 0), Tile::single(cube, tex, 0, 0));
    assert_eq!(tiles.merged_model(&table, true).triangle_count(), 24);
}

#[test]
fn stacked_cubes_cull_vertically() {
    let (table, cube, tex) = cube_table();
    let mut tiles = TileGrid::new(Extent::new(1, 3, 1), 2.0);
    tiles.set_tile_rect(GridPos::ZERO, Extent::new(1, 3, 1), Tile::single(cube, tex, 1, 1));
    // two shared faces, two triangles on each side of each
    assert_eq!(tiles.merged_model(&table, true).triangle_count(), 36 - 8);
}

// ---------------------------------------------------------------------------
// Undo / redo
// ---------------------------------------------------------------------------

#[test]
fn undo_and_redo_are_inverse() {
    let mut rng = Rng(7);
    let extent = Extent::new(6, 2, 6);
    let mut tiles = random_grid(&mut rng, extent, false);
    let mut ents = EntGrid::new(extent, 2.0);
    let mut history = History::new(100);
    let start = (tiles.clone(), ents.clone());

    let mut actions = 0;
    for n in 0..20 {
        let origin = GridPos::new(rng.below(6), rng.below(2), rng.below(6));
        let action: Action = match n % 3 {
            0 => {
                let size = Extent::new(1 + rng.below(4) as usize, 1, 1 + rng.below(4) as usize);
                let tile = Tile::single(ModelId(rng.below(3)), TexId(rng.below(3)), 1, 0);
                TileAction::fill(&tiles, origin, size, tile).unwrap().into()
            }
            1 => {
                let brush = random_grid(&mut rng, Extent::new(3, 1, 3), false);
                TileAction::paste(&tiles, origin, &brush, n % 2 == 0).unwrap().into()
            }
            _ => EntAction::place(&ents, origin, Ent::default().with_property("n", n.to_string())).into(),
        };
        history.execute(action, &mut tiles, &mut ents);
        actions += 1;
    }
    let end = (tiles.clone(), ents.clone());

    for _ in 0..actions {
        assert!(history.undo(&mut tiles, &mut ents));
    }
    assert_eq!((tiles.clone(), ents.clone()), start);
    for _ in 0..actions {
        assert!(history.redo(&mut tiles, &mut ents));
    }
    assert_eq!((tiles, ents), end);
}

#[test]
fn history_is_bounded() {
    let extent = Extent::new(8, 1, 1);
    let mut tiles = TileGrid::new(extent, 2.0);
    let mut ents = EntGrid::new(extent, 2.0);
    let max = 3;
    let mut history = History::new(max);
    for i in 0..max as i32 + 2 {
        let tile = Tile::single(ModelId(0), TexId(0), 0, 0);
        let action = TileAction::set(&tiles, GridPos::new(i, 0, 0), tile).unwrap();
        history.execute(action.into(), &mut tiles, &mut ents);
    }
    assert_eq!(history.undo_len(), max);
    while history.undo(&mut tiles, &mut ents) {}
    assert!(tiles.get_tile(GridPos::new(0, 0, 0)).is_occupied());
    assert!(tiles.get_tile(GridPos::new(1, 0, 0)).is_occupied());
    assert!(tiles.get_tile(GridPos::new(2, 0, 0)).is_empty());
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

#[test]
fn subsection_is_idempotent_and_copy_back_is_a_no_op() {
    let mut rng = Rng(1234);
    let mut tiles = random_grid(&mut rng, Extent::new(6, 3, 5), false);
    let before = tiles.clone();
    let origin = GridPos::new(1, 1, 2);
    let size = Extent::new(4, 2, 3);

    let a = tiles.subsection(origin, size);
    let b = tiles.subsection(origin, size);
    assert_eq!(a, b);

    tiles.copy_tiles(origin, &a, false);
    assert_eq!(tiles, before);
}

#[test]
fn oversized_copy_is_clipped() {
    let mut tiles = TileGrid::new(Extent::new(2, 1, 2), 2.0);
    let mut brush = TileGrid::new(Extent::new(3, 1, 3), 2.0);
    brush.set_tile_rect(GridPos::ZERO, brush.extent(), Tile::single(ModelId(0), TexId(0), 0, 0));
    assert_eq!(tiles.copy_tiles(GridPos::new(-1, 0, 0), &brush, false), 4);
    assert_eq!(tiles.occupied_count(), 4);
}
