//! The map manager: one open map, its asset table and its edit history.

use std::path::Path;
use std::rc::Rc;

use anyhow::Result;
use glam::Vec3;
use te3_engine::assets::{AssetCache, AssetError, AssetTable};
use te3_engine::history::{Action, EntAction, History, TileAction};
use te3_engine::render::{BatchParams, DrawTarget};
use te3_engine::world::{
    DEFAULT_SPACING, Direction, Ent, EntGrid, Extent, Grid, GridPos, ModelId, TexId, Tile, TileGrid,
};

use crate::export::{self, ExportOptions};
use crate::persistence::{self, LoadedMap};

/// Editor camera pose saved with the map. Angles are Euler degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Camera {
    pub position: Vec3,
    pub angles: Vec3,
}

impl Camera {
    /// Above and in front of the grid, pitched down toward its center.
    pub fn overlooking<Cel>(grid: &Grid<Cel>) -> Camera {
        let center = grid.center();
        let reach = center.x.max(center.z).max(grid.spacing());
        Camera {
            position: Vec3::new(center.x, center.y * 2.0 + reach, center.z * 2.0 + reach),
            angles: Vec3::new(-45.0, 0.0, 0.0),
        }
    }
}

/// Owns the open map. Every edit goes through [`MapMan::execute`] so it can
/// be undone; loading, creating and resizing a map clear the history.
pub struct MapMan {
    cache: Rc<AssetCache>,
    assets: AssetTable,
    tiles: TileGrid,
    ents: EntGrid,
    camera: Camera,
    history: History,
}

impl MapMan {
    pub fn new(cache: Rc<AssetCache>, extent: Extent, undo_max: usize) -> Self {
        let tiles = TileGrid::new(extent, DEFAULT_SPACING);
        let camera = Camera::overlooking(tiles.grid());
        Self {
            cache,
            assets: AssetTable::new(),
            tiles,
            ents: EntGrid::new(extent, DEFAULT_SPACING),
            camera,
            history: History::new(undo_max),
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn cache(&self) -> &Rc<AssetCache> {
        &self.cache
    }

    pub fn assets(&self) -> &AssetTable {
        &self.assets
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    pub fn ents(&self) -> &EntGrid {
        &self.ents
    }

    pub fn extent(&self) -> Extent {
        self.tiles.extent()
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn get_tile(&self, pos: GridPos) -> Tile {
        self.tiles.get_tile(pos)
    }

    // ── Assets ─────────────────────────────────────────────────────────────

    pub fn get_or_add_texture(&mut self, path: &Path) -> Result<TexId, AssetError> {
        self.assets.get_or_add_texture(&self.cache, path)
    }

    pub fn get_or_add_model(&mut self, path: &Path) -> Result<ModelId, AssetError> {
        self.assets.get_or_add_model(&self.cache, path)
    }

    pub fn path_from_tex_id(&self, id: TexId) -> Option<&Path> {
        self.assets.path_from_tex_id(id)
    }

    pub fn path_from_model_id(&self, id: ModelId) -> Option<&Path> {
        self.assets.path_from_model_id(id)
    }

    // ── Edits ──────────────────────────────────────────────────────────────

    /// Apply `action` and record it for undo. Clears the redo stack.
    pub fn execute(&mut self, action: Action) {
        self.history.execute(action, &mut self.tiles, &mut self.ents);
    }

    /// Returns false if `pos` is outside the map.
    pub fn set_tile(&mut self, pos: GridPos, tile: Tile) -> bool {
        self.fill_tiles(pos, Extent::new(1, 1, 1), tile)
    }

    /// Fill a box with one tile, clipped to the map. Returns false if the box
    /// lies entirely outside.
    pub fn fill_tiles(&mut self, origin: GridPos, size: Extent, tile: Tile) -> bool {
        match TileAction::fill(&self.tiles, origin, size, tile) {
            Some(action) => {
                self.execute(action.into());
                true
            }
            None => false,
        }
    }

    /// Paste `brush` with its origin at `origin`, clipped to the map.
    pub fn paste_tiles(&mut self, origin: GridPos, brush: &TileGrid, ignore_empty: bool) -> bool {
        match TileAction::paste(&self.tiles, origin, brush, ignore_empty) {
            Some(action) => {
                self.execute(action.into());
                true
            }
            None => false,
        }
    }

    /// Place `ent` at `pos`, replacing any ent already there.
    pub fn place_ent(&mut self, pos: GridPos, ent: Ent) -> bool {
        if !self.extent().contains(pos) {
            return false;
        }
        let action = EntAction::place(&self.ents, pos, ent);
        self.execute(action.into());
        true
    }

    /// Returns false if there is no ent at `pos`.
    pub fn remove_ent(&mut self, pos: GridPos) -> bool {
        match EntAction::remove(&self.ents, pos) {
            Some(action) => {
                self.execute(action.into());
                true
            }
            None => false,
        }
    }

    // ── History ────────────────────────────────────────────────────────────

    /// Revert the most recent action. A no-op returning false when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.tiles, &mut self.ents)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.tiles, &mut self.ents)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_len(&self) -> usize {
        self.history.undo_len()
    }

    pub fn redo_len(&self) -> usize {
        self.history.redo_len()
    }

    /// Drops the oldest actions if the history is already longer.
    pub fn set_undo_max(&mut self, max: usize) {
        self.history.set_max(max);
    }

    // ── Whole-map operations ───────────────────────────────────────────────

    /// Replace the map with an empty one of `extent`, forgetting its assets
    /// and history.
    pub fn new_map(&mut self, extent: Extent) {
        let tiles = TileGrid::new(extent, DEFAULT_SPACING);
        let camera = Camera::overlooking(tiles.grid());
        self.replace(LoadedMap {
            assets: AssetTable::new(),
            tiles,
            ents: EntGrid::new(extent, DEFAULT_SPACING),
            camera,
        });
        tracing::info!("New {}x{}x{} map", extent.width, extent.height, extent.length);
    }

    /// Grow the map by `amount` cells on one side. Growing toward a negative
    /// axis moves the existing content (and the camera) so it stays in place
    /// relative to the new origin.
    pub fn expand_map(&mut self, direction: Direction, amount: usize) {
        if amount == 0 {
            return;
        }
        let old = self.extent();
        let extent = match direction {
            Direction::Left | Direction::Right => Extent::new(old.width + amount, old.height, old.length),
            Direction::Down | Direction::Up => Extent::new(old.width, old.height + amount, old.length),
            Direction::Back | Direction::Front => Extent::new(old.width, old.height, old.length + amount),
        };
        let shift = if direction.is_negative() {
            let unit = direction.unit();
            GridPos::new(-unit.i, -unit.j, -unit.k)
        } else {
            GridPos::ZERO
        };
        let offset = GridPos::new(shift.i * amount as i32, shift.j * amount as i32, shift.k * amount as i32);

        let spacing = self.tiles.spacing();
        let mut tiles = TileGrid::new(extent, spacing);
        tiles.copy_tiles(offset, &self.tiles, false);
        let mut ents = EntGrid::new(extent, spacing);
        ents.copy_ents(offset, &self.ents, false);

        self.tiles = tiles;
        self.ents = ents;
        self.camera.position += Vec3::new(offset.i as f32, offset.j as f32, offset.k as f32) * spacing;
        self.history.clear();
        tracing::info!(
            "Expanded map {:?} by {}: now {}x{}x{}",
            direction,
            amount,
            extent.width,
            extent.height,
            extent.length
        );
    }

    /// Crop the map to the smallest box holding every tile and ent. Returns
    /// false, leaving the map as it is, if there is nothing to keep.
    pub fn shrink_map(&mut self) -> bool {
        let bounds = match (self.tiles.occupied_bounds(), self.ents.occupied_bounds()) {
            (Some((a, b)), Some((c, d))) => (a.min(c), b.max(d)),
            (Some(bounds), None) | (None, Some(bounds)) => bounds,
            (None, None) => return false,
        };
        let (lo, hi) = bounds;
        let size = hi - lo;
        let extent = Extent::new(size.i as usize + 1, size.j as usize + 1, size.k as usize + 1);
        if extent == self.extent() {
            return false;
        }

        self.tiles = self.tiles.subsection(lo, extent);
        self.ents = self.ents.subsection(lo, extent);
        self.camera.position -= Vec3::new(lo.i as f32, lo.j as f32, lo.k as f32) * self.tiles.spacing();
        self.history.clear();
        tracing::info!("Shrank map to {}x{}x{}", extent.width, extent.height, extent.length);
        true
    }

    // ── Files ──────────────────────────────────────────────────────────────

    pub fn save(&self, path: &Path) -> Result<()> {
        persistence::save_map(self, path)
    }

    /// Load a `.te3` or legacy `.ti` map. On failure the current map is
    /// kept unchanged.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let loaded = persistence::load_map(&self.cache, path)?;
        self.replace(loaded);
        Ok(())
    }

    pub fn export(&self, path: &Path, options: &ExportOptions) -> Result<()> {
        export::export_map(self, path, options)
    }

    /// Draw the tiles, then every model ent at its own transform.
    pub fn draw(&mut self, target: &mut dyn DrawTarget, params: BatchParams, preview: bool) {
        self.tiles.draw(target, &self.assets, params, preview);
        let offset = glam::Mat4::from_translation(params.position);
        for (_, ent) in self.ents.iter() {
            let Some(model) = ent.model_id().and_then(|id| self.assets.model(id)) else {
                continue;
            };
            let texture = ent.texture_id().and_then(|id| self.assets.texture(id)).map(|t| t.as_ref());
            for mesh in &model.meshes {
                target.draw_mesh(texture, mesh, offset * ent.transform());
            }
        }
    }

    fn replace(&mut self, map: LoadedMap) {
        self.assets = map.assets;
        self.tiles = map.tiles;
        self.ents = map.ents;
        self.camera = map.camera;
        self.history.clear();
        let pruned = self.cache.prune();
        if pruned > 0 {
            tracing::debug!("Released {} cached assets no longer in use", pruned);
        }
    }
}
