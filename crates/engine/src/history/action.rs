use crate::world::{Ent, EntGrid, Extent, GridPos, Tile, TileGrid};

/// A single reversible edit of a map.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tiles(TileAction),
    Ent(EntAction),
}

impl Action {
    pub fn apply(&self, tiles: &mut TileGrid, ents: &mut EntGrid) {
        match self {
            Action::Tiles(action) => action.apply(tiles),
            Action::Ent(action) => action.apply(ents),
        }
    }

    pub fn revert(&self, tiles: &mut TileGrid, ents: &mut EntGrid) {
        match self {
            Action::Tiles(action) => action.revert(tiles),
            Action::Ent(action) => action.revert(ents),
        }
    }
}

impl From<TileAction> for Action {
    fn from(action: TileAction) -> Self {
        Action::Tiles(action)
    }
}

impl From<EntAction> for Action {
    fn from(action: EntAction) -> Self {
        Action::Ent(action)
    }
}

/// A rectangular tile edit, stored as whole before/after snapshots of the
/// affected box.
#[derive(Debug, Clone, PartialEq)]
pub struct TileAction {
    pub origin: GridPos,
    pub before: TileGrid,
    pub after: TileGrid,
}

impl TileAction {
    /// Fill `origin..origin+size` with `tile`. The box is clipped to the
    /// grid; `None` if nothing of it is inside.
    pub fn fill(tiles: &TileGrid, origin: GridPos, size: Extent, tile: Tile) -> Option<Self> {
        let (origin, size) = tiles.extent().clip(origin, size)?;
        let before = tiles.subsection(origin, size);
        let mut after = TileGrid::new(size, tiles.spacing());
        after.set_tile_rect(GridPos::ZERO, size, tile);
        Some(TileAction { origin, before, after })
    }

    pub fn set(tiles: &TileGrid, pos: GridPos, tile: Tile) -> Option<Self> {
        Self::fill(tiles, pos, Extent::new(1, 1, 1), tile)
    }

    /// Paste `brush` with its origin at `dest`, as `TileGrid::copy_tiles`
    /// would.
    pub fn paste(tiles: &TileGrid, dest: GridPos, brush: &TileGrid, ignore_empty: bool) -> Option<Self> {
        let (origin, size) = tiles.extent().clip(dest, brush.extent())?;
        let before = tiles.subsection(origin, size);
        let mut after = before.clone();
        after.copy_tiles(dest - origin, brush, ignore_empty);
        Some(TileAction { origin, before, after })
    }

    fn apply(&self, tiles: &mut TileGrid) {
        tiles.copy_tiles(self.origin, &self.after, false);
    }

    fn revert(&self, tiles: &mut TileGrid) {
        tiles.copy_tiles(self.origin, &self.before, false);
    }
}

/// Placing, replacing or removing the ent in one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct EntAction {
    pub pos: GridPos,
    pub old: Option<Ent>,
    pub new: Option<Ent>,
}

impl EntAction {
    pub fn place(ents: &EntGrid, pos: GridPos, ent: Ent) -> Self {
        EntAction {
            pos,
            old: ents.ent(pos).cloned(),
            new: Some(ent),
        }
    }

    /// `None` if there is no ent at `pos`.
    pub fn remove(ents: &EntGrid, pos: GridPos) -> Option<Self> {
        let old = ents.ent(pos)?.clone();
        Some(EntAction { pos, old: Some(old), new: None })
    }

    fn apply(&self, ents: &mut EntGrid) {
        write_cell(ents, self.pos, &self.new);
    }

    fn revert(&self, ents: &mut EntGrid) {
        write_cell(ents, self.pos, &self.old);
    }
}

fn write_cell(ents: &mut EntGrid, pos: GridPos, ent: &Option<Ent>) {
    match ent {
        Some(ent) => ents.add_ent(pos, ent.clone()),
        None => {
            ents.remove_ent(pos);
        }
    }
}
