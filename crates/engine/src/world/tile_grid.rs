use super::grid::{Grid, RangeError};
use super::position::{Extent, GridPos};
use super::tile::Tile;
use crate::assets::{AssetTable, IdRemap, UsedAssets};
use crate::codec::{self, CodecError, TileFormat};
use crate::geometry::{MergedModel, merge_tiles};
use crate::render::{BatchKey, BatchParams, DrawTarget};
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::time::Instant;

/// World units between neighboring cell origins in new maps.
pub const DEFAULT_SPACING: f32 = 2.0;

/// World transform of a tile whose cell center is at `center`: pitch about
/// X first, then yaw about Y, then the translation.
pub fn tile_transform(tile: &Tile, center: Vec3) -> Mat4 {
    Mat4::from_translation(center)
        * Mat4::from_rotation_y(tile.yaw_radians())
        * Mat4::from_rotation_x(tile.pitch_radians())
}

/// A grid of tiles plus the render caches derived from it.
///
/// Two caches are kept: instanced draw batches, built for one set of
/// [`BatchParams`], and the culled merged model used for preview drawing.
/// Every mutation marks both dirty and neither is read before a rebuild.
pub struct TileGrid {
    grid: Grid<Tile>,
    batches: HashMap<BatchKey, Vec<Mat4>>,
    batch_params: Option<BatchParams>,
    batches_dirty: bool,
    model: MergedModel,
    model_dirty: bool,
}

impl TileGrid {
    pub fn new(extent: Extent, spacing: f32) -> Self {
        Self::from_grid(Grid::new(extent, spacing, Tile::EMPTY))
    }

    pub fn from_grid(grid: Grid<Tile>) -> Self {
        Self {
            grid,
            batches: HashMap::new(),
            batch_params: None,
            batches_dirty: true,
            model: MergedModel::default(),
            model_dirty: true,
        }
    }

    pub fn grid(&self) -> &Grid<Tile> {
        &self.grid
    }

    pub fn into_grid(self) -> Grid<Tile> {
        self.grid
    }

    pub fn extent(&self) -> Extent {
        self.grid.extent()
    }

    pub fn spacing(&self) -> f32 {
        self.grid.spacing()
    }

    /// Panics if `pos` is outside the grid.
    pub fn get_tile(&self, pos: GridPos) -> Tile {
        *self.grid.get(pos)
    }

    pub fn try_get_tile(&self, pos: GridPos) -> Result<Tile, RangeError> {
        self.grid.try_get(pos).copied()
    }

    /// Panics if `pos` is outside the grid.
    pub fn set_tile(&mut self, pos: GridPos, tile: Tile) {
        self.grid.set(pos, canonical(tile));
        self.mark_dirty();
    }

    /// Fill a box with one tile. The box is clipped to the grid.
    pub fn set_tile_rect(&mut self, origin: GridPos, size: Extent, tile: Tile) -> usize {
        let written = self.grid.fill_region(origin, size, canonical(tile));
        if written > 0 {
            self.mark_dirty();
        }
        written
    }

    /// Copy `src` into this grid with its origin at `dest`, clipped to the
    /// grid. With `ignore_empty`, empty source cells leave the destination
    /// untouched.
    pub fn copy_tiles(&mut self, dest: GridPos, src: &TileGrid, ignore_empty: bool) -> usize {
        let written = if ignore_empty {
            self.grid.copy_region_where(dest, &src.grid, Tile::is_occupied)
        } else {
            self.grid.copy_region(dest, &src.grid)
        };
        if written > 0 {
            self.mark_dirty();
        }
        written
    }

    /// Deep copy of a region that lies inside the grid.
    pub fn subsection(&self, origin: GridPos, size: Extent) -> TileGrid {
        TileGrid::from_grid(self.grid.subsection(origin, size))
    }

    pub fn occupied_count(&self) -> usize {
        self.grid.cels().iter().filter(|t| t.is_occupied()).count()
    }

    /// Smallest box holding every occupied cell, or `None` if there are none.
    pub fn occupied_bounds(&self) -> Option<(GridPos, GridPos)> {
        self.grid
            .iter()
            .filter(|(_, t)| t.is_occupied())
            .map(|(pos, _)| pos)
            .fold(None, |acc, pos| match acc {
                None => Some((pos, pos)),
                Some((lo, hi)) => Some((lo.min(pos), hi.max(pos))),
            })
    }

    /// Every texture and shape ID referenced by an occupied cell.
    pub fn used_asset_ids(&self) -> UsedAssets {
        let mut used = UsedAssets::default();
        for tile in self.grid.cels().iter().filter(|t| t.is_occupied()) {
            used.models.insert(tile.shape);
            used.textures.extend(tile.textures.iter().filter(|t| t.is_some()));
        }
        used
    }

    /// A copy with every asset ID translated through `remap`. Tiles whose
    /// shape has no mapping become empty.
    pub fn remapped(&self, remap: &IdRemap) -> TileGrid {
        let mut grid = self.grid.clone();
        for tile in grid.iter_mut().filter(|t| t.is_occupied()) {
            let shape = remap.model(tile.shape);
            *tile = if !shape.is_some() {
                Tile::EMPTY
            } else {
                Tile { shape, textures: tile.textures.map(|t| remap.texture(t)), ..*tile }
            };
        }
        TileGrid::from_grid(grid)
    }

    pub fn to_bytes(&self, format: TileFormat) -> Vec<u8> {
        codec::encode(self.grid.cels(), format)
    }

    pub fn from_bytes(
        extent: Extent,
        spacing: f32,
        bytes: &[u8],
        format: TileFormat,
    ) -> Result<TileGrid, CodecError> {
        if !extent.is_allocatable() {
            return Err(CodecError::Oversized(extent));
        }
        let cells = extent.volume();
        let tiles = codec::decode(bytes, cells, format)?;
        let actual = tiles.len();
        Grid::from_cels(extent, spacing, tiles)
            .map(TileGrid::from_grid)
            .ok_or(CodecError::CellCount { expected: cells, actual })
    }

    /// Rebuild the instanced draw batches for the Y layers in `params`.
    pub fn rebuild_batches(&mut self, assets: &AssetTable, params: BatchParams) {
        let start = Instant::now();
        self.batches.clear();
        let offset = Mat4::from_translation(params.position);
        let end_layer = params.y_to.saturating_add(1).min(self.grid.height());
        let mut instances = 0usize;
        for j in params.y_from..end_layer {
            let layer = Extent::new(self.grid.width(), 1, self.grid.length());
            for pos in layer.positions(GridPos::new(0, j as i32, 0)) {
                let tile = self.grid.get(pos);
                if tile.is_empty() {
                    continue;
                }
                let Some(model) = assets.model(tile.shape) else {
                    continue;
                };
                let transform = offset * tile_transform(tile, self.grid.grid_to_world_center(pos));
                for mesh in 0..model.meshes.len() {
                    let key = BatchKey {
                        texture: tile.texture_for_mesh(mesh),
                        model: tile.shape,
                        mesh,
                    };
                    self.batches.entry(key).or_default().push(transform);
                }
                instances += 1;
            }
        }
        self.batch_params = Some(params);
        self.batches_dirty = false;
        tracing::debug!(
            "Rebuilt {} batches from {} tiles in {:.2?}",
            self.batches.len(),
            instances,
            start.elapsed()
        );
    }

    /// Draw batches for `params`, rebuilding them first if the grid changed or
    /// they were built for different parameters.
    pub fn batches(&mut self, assets: &AssetTable, params: BatchParams) -> &HashMap<BatchKey, Vec<Mat4>> {
        if self.batches_dirty || self.batch_params != Some(params) {
            self.rebuild_batches(assets, params);
        }
        &self.batches
    }

    /// The culled merged model, rebuilt if the grid changed.
    pub fn preview_model(&mut self, assets: &AssetTable) -> &MergedModel {
        if self.model_dirty {
            self.model = merge_tiles(&self.grid, assets, true);
            self.model_dirty = false;
        }
        &self.model
    }

    /// Merge all tile geometry into one world-space mesh per texture.
    pub fn merged_model(&self, assets: &AssetTable, culling: bool) -> MergedModel {
        merge_tiles(&self.grid, assets, culling)
    }

    /// Draw the grid. Preview mode draws the merged model as plain meshes;
    /// otherwise each batch is one instanced draw with its texture bound.
    pub fn draw(&mut self, target: &mut dyn DrawTarget, assets: &AssetTable, params: BatchParams, preview: bool) {
        if preview {
            let offset = Mat4::from_translation(params.position);
            for merged in &self.preview_model(assets).meshes {
                let texture = assets.texture(merged.texture).map(|t| t.as_ref());
                target.draw_mesh(texture, &merged.mesh, offset);
            }
            return;
        }
        let batches = self.batches(assets, params);
        let mut keys: Vec<&BatchKey> = batches.keys().collect();
        keys.sort();
        for key in keys {
            let Some(mesh) = assets.model(key.model).and_then(|m| m.meshes.get(key.mesh)) else {
                continue;
            };
            let texture = assets.texture(key.texture).map(|t| t.as_ref());
            target.draw_instanced(texture, mesh, &batches[key]);
        }
    }

    fn mark_dirty(&mut self) {
        self.batches_dirty = true;
        self.model_dirty = true;
    }
}

/// Any tile without a shape is stored as `Tile::EMPTY`.
fn canonical(tile: Tile) -> Tile {
    if tile.is_empty() { Tile::EMPTY } else { tile }
}

impl Clone for TileGrid {
    fn clone(&self) -> Self {
        TileGrid::from_grid(self.grid.clone())
    }
}

impl PartialEq for TileGrid {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
    }
}

impl std::fmt::Debug for TileGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileGrid")
            .field("extent", &self.grid.extent())
            .field("spacing", &self.grid.spacing())
            .field("occupied", &self.occupied_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetCache, AssetError, AssetLoader, Mesh, Model, Texture};
    use crate::world::tile::{ModelId, TexId};
    use std::path::{Path, PathBuf};

    struct Shapes;

    impl AssetLoader for Shapes {
        fn load_texture(&self, path: &Path) -> Result<Texture, AssetError> {
            Ok(Texture { path: path.to_path_buf() })
        }

        fn load_model(&self, _path: &Path) -> Result<Model, AssetError> {
            let mut cube = Model::cube(2.0);
            cube.meshes.push(cube.meshes[0].clone());
            Ok(cube)
        }
    }

    #[derive(Default)]
    struct Recorder {
        instanced: Vec<(Option<PathBuf>, usize)>,
        meshes: usize,
    }

    impl DrawTarget for Recorder {
        fn draw_instanced(&mut self, texture: Option<&Texture>, _mesh: &Mesh, transforms: &[Mat4]) {
            self.instanced.push((texture.map(|t| t.path.clone()), transforms.len()));
        }

        fn draw_mesh(&mut self, _texture: Option<&Texture>, _mesh: &Mesh, _transform: Mat4) {
            self.meshes += 1;
        }
    }

    fn setup() -> (AssetTable, ModelId, TexId, TexId) {
        let cache = AssetCache::new(Shapes);
        let mut table = AssetTable::new();
        let shape = table.get_or_add_model(&cache, Path::new("two_part.obj")).unwrap();
        let a = table.get_or_add_texture(&cache, Path::new("a.png")).unwrap();
        let b = table.get_or_add_texture(&cache, Path::new("b.png")).unwrap();
        (table, shape, a, b)
    }

    #[test]
    fn empty_shapes_are_canonicalized() {
        let mut tiles = TileGrid::new(Extent::new(2, 1, 1), DEFAULT_SPACING);
        let ghost = Tile { shape: ModelId::NONE, textures: [TexId(3), TexId(4)], yaw: 2, pitch: 0 };
        tiles.set_tile(GridPos::ZERO, ghost);
        assert_eq!(tiles.get_tile(GridPos::ZERO), Tile::EMPTY);
    }

    #[test]
    fn batches_key_each_sub_mesh_by_its_texture() {
        let (table, shape, a, b) = setup();
        let mut tiles = TileGrid::new(Extent::new(3, 2, 1), DEFAULT_SPACING);
        tiles.set_tile(GridPos::new(0, 0, 0), Tile::new(shape, [a, b], 0, 0));
        tiles.set_tile(GridPos::new(1, 0, 0), Tile::new(shape, [a, b], 1, 0));
        tiles.set_tile(GridPos::new(2, 1, 0), Tile::new(shape, [a, a], 0, 0));

        let batches = tiles.batches(&table, BatchParams::all_layers(2));
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[&BatchKey { texture: a, model: shape, mesh: 0 }].len(), 3);
        assert_eq!(batches[&BatchKey { texture: b, model: shape, mesh: 1 }].len(), 2);
        assert_eq!(batches[&BatchKey { texture: a, model: shape, mesh: 1 }].len(), 1);
    }

    #[test]
    fn batches_respect_layer_range_and_offset() {
        let (table, shape, a, _) = setup();
        let mut tiles = TileGrid::new(Extent::new(1, 3, 1), DEFAULT_SPACING);
        for j in 0..3 {
            tiles.set_tile(GridPos::new(0, j, 0), Tile::single(shape, a, 0, 0));
        }
        let params = BatchParams { position: Vec3::new(10.0, 0.0, 0.0), y_from: 1, y_to: 1 };
        let batches = tiles.batches(&table, params);
        let transforms = &batches[&BatchKey { texture: a, model: shape, mesh: 0 }];
        assert_eq!(transforms.len(), 1);
        let origin = transforms[0].transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(11.0, 3.0, 1.0), 1e-5));
    }

    #[test]
    fn mutation_invalidates_batches() {
        let (table, shape, a, _) = setup();
        let mut tiles = TileGrid::new(Extent::new(2, 1, 1), DEFAULT_SPACING);
        let params = BatchParams::all_layers(1);
        assert!(tiles.batches(&table, params).is_empty());
        tiles.set_tile(GridPos::ZERO, Tile::single(shape, a, 0, 0));
        assert_eq!(tiles.batches(&table, params).len(), 2);
        tiles.set_tile_rect(GridPos::ZERO, Extent::new(2, 1, 1), Tile::EMPTY);
        assert!(tiles.batches(&table, params).is_empty());
    }

    #[test]
    fn draw_modes() {
        let (table, shape, a, b) = setup();
        let mut tiles = TileGrid::new(Extent::new(2, 1, 1), DEFAULT_SPACING);
        tiles.set_tile(GridPos::ZERO, Tile::new(shape, [a, b], 0, 0));
        let params = BatchParams::all_layers(1);

        let mut rec = Recorder::default();
        tiles.draw(&mut rec, &table, params, false);
        assert_eq!(
            rec.instanced,
            vec![
                (Some(PathBuf::from("a.png")), 1),
                (Some(PathBuf::from("b.png")), 1)
            ]
        );
        assert_eq!(rec.meshes, 0);

        let mut rec = Recorder::default();
        tiles.draw(&mut rec, &table, params, true);
        assert!(rec.instanced.is_empty());
        assert_eq!(rec.meshes, 2);
    }

    #[test]
    fn copy_tiles_can_skip_empty_cells() {
        let (_, shape, a, b) = setup();
        let mut tiles = TileGrid::new(Extent::new(3, 1, 1), DEFAULT_SPACING);
        tiles.set_tile_rect(GridPos::ZERO, Extent::new(3, 1, 1), Tile::single(shape, a, 0, 0));
        let mut brush = TileGrid::new(Extent::new(2, 1, 1), DEFAULT_SPACING);
        brush.set_tile(GridPos::new(1, 0, 0), Tile::single(shape, b, 0, 0));

        let mut masked = tiles.clone();
        assert_eq!(masked.copy_tiles(GridPos::new(1, 0, 0), &brush, true), 1);
        assert_eq!(masked.get_tile(GridPos::new(1, 0, 0)).textures[0], a);
        assert_eq!(masked.get_tile(GridPos::new(2, 0, 0)).textures[0], b);

        assert_eq!(tiles.copy_tiles(GridPos::new(1, 0, 0), &brush, false), 2);
        assert!(tiles.get_tile(GridPos::new(1, 0, 0)).is_empty());
    }

    #[test]
    fn used_ids_and_remap() {
        let (_, shape, _, b) = setup();
        let mut tiles = TileGrid::new(Extent::new(2, 1, 1), DEFAULT_SPACING);
        tiles.set_tile(GridPos::new(1, 0, 0), Tile::new(shape, [b, TexId::NONE], 3, 1));
        let used = tiles.used_asset_ids();
        assert_eq!(used.textures.into_iter().collect::<Vec<_>>(), vec![b]);
        assert_eq!(used.models.into_iter().collect::<Vec<_>>(), vec![shape]);

        let mut remap = IdRemap::default();
        remap.textures.insert(b, TexId(0));
        remap.models.insert(shape, ModelId(0));
        let moved = tiles.remapped(&remap);
        assert_eq!(
            moved.get_tile(GridPos::new(1, 0, 0)),
            Tile::new(ModelId(0), [TexId(0), TexId::NONE], 3, 1)
        );
        assert!(moved.get_tile(GridPos::ZERO).is_empty());

        let unmapped = tiles.remapped(&IdRemap::default());
        assert_eq!(unmapped.get_tile(GridPos::new(1, 0, 0)), Tile::EMPTY);
    }

    #[test]
    fn occupied_bounds_cover_all_tiles() {
        let (_, shape, a, _) = setup();
        let mut tiles = TileGrid::new(Extent::new(4, 3, 4), DEFAULT_SPACING);
        assert_eq!(tiles.occupied_bounds(), None);
        tiles.set_tile(GridPos::new(1, 2, 0), Tile::single(shape, a, 0, 0));
        tiles.set_tile(GridPos::new(3, 0, 2), Tile::single(shape, a, 0, 0));
        assert_eq!(
            tiles.occupied_bounds(),
            Some((GridPos::new(1, 0, 0), GridPos::new(3, 2, 2)))
        );
        assert_eq!(tiles.occupied_count(), 2);
    }

    #[test]
    fn oversized_stream_extent_is_rejected() {
        let bytes = TileGrid::new(Extent::new(1, 1, 1), 2.0).to_bytes(TileFormat::Current);
        for extent in [Extent::new(1 << 32, 1 << 32, 4), Extent::new(100_000, 100_000, 100_000)] {
            let err = TileGrid::from_bytes(extent, 2.0, &bytes, TileFormat::Current).unwrap_err();
            assert_eq!(err, CodecError::Oversized(extent));
        }
    }
}
