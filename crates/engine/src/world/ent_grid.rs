use super::ent::Ent;
use super::grid::Grid;
use super::position::{Extent, GridPos};
use crate::assets::{IdRemap, UsedAssets};

/// A sparse grid of ents, at most one per cell.
///
/// There is no render cache; ents are few and drawn one by one.
#[derive(Debug, Clone, PartialEq)]
pub struct EntGrid {
    grid: Grid<Option<Ent>>,
}

impl EntGrid {
    pub fn new(extent: Extent, spacing: f32) -> Self {
        Self {
            grid: Grid::new(extent, spacing, None),
        }
    }

    pub fn extent(&self) -> Extent {
        self.grid.extent()
    }

    pub fn grid(&self) -> &Grid<Option<Ent>> {
        &self.grid
    }

    /// Place `ent` at `pos`, replacing whatever was there. The ent's position
    /// is moved to the cell center.
    pub fn add_ent(&mut self, pos: GridPos, mut ent: Ent) {
        ent.position = self.grid.grid_to_world_center(pos);
        self.grid.set(pos, Some(ent));
    }

    pub fn remove_ent(&mut self, pos: GridPos) -> Option<Ent> {
        let old = self.grid.get(pos).clone();
        self.grid.set(pos, None);
        old
    }

    pub fn has_ent(&self, pos: GridPos) -> bool {
        self.grid.get(pos).is_some()
    }

    /// The ent at `pos`. Panics if the cell is empty; check `has_ent` first.
    pub fn get_ent(&self, pos: GridPos) -> &Ent {
        match self.grid.get(pos) {
            Some(ent) => ent,
            None => panic!("no ent at {pos:?}"),
        }
    }

    pub fn ent(&self, pos: GridPos) -> Option<&Ent> {
        self.grid.try_get(pos).ok()?.as_ref()
    }

    /// Every ent with its cell, in flat grid order.
    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &Ent)> {
        self.grid
            .iter()
            .filter_map(|(pos, cel)| cel.as_ref().map(|ent| (pos, ent)))
    }

    /// All ents, for saving and export. There is no inactive state: an ent
    /// is active exactly while a cell holds it.
    pub fn ent_list(&self) -> Vec<&Ent> {
        self.grid.cels().iter().flatten().collect()
    }

    pub fn count(&self) -> usize {
        self.grid.cels().iter().flatten().count()
    }

    pub fn subsection(&self, origin: GridPos, size: Extent) -> EntGrid {
        let mut sub = EntGrid {
            grid: self.grid.subsection(origin, size),
        };
        sub.recenter();
        sub
    }

    /// Copy `src` into this grid at `dest`, clipped to the grid. With
    /// `ignore_empty`, empty source cells do not clear destination ents.
    pub fn copy_ents(&mut self, dest: GridPos, src: &EntGrid, ignore_empty: bool) -> usize {
        let written = if ignore_empty {
            self.grid.copy_region_where(dest, &src.grid, Option::is_some)
        } else {
            self.grid.copy_region(dest, &src.grid)
        };
        if written > 0 {
            self.recenter();
        }
        written
    }

    /// Smallest box holding every ent, or `None` if there are none.
    pub fn occupied_bounds(&self) -> Option<(GridPos, GridPos)> {
        self.iter().map(|(pos, _)| pos).fold(None, |acc, pos| match acc {
            None => Some((pos, pos)),
            Some((lo, hi)) => Some((lo.min(pos), hi.max(pos))),
        })
    }

    /// Add the asset IDs referenced by model and sprite ents to `used`.
    pub fn collect_asset_ids(&self, used: &mut UsedAssets) {
        for (_, ent) in self.iter() {
            ent.collect_asset_ids(used);
        }
    }

    pub fn remapped(&self, remap: &IdRemap) -> EntGrid {
        let mut out = self.clone();
        for ent in out.grid.iter_mut().flatten() {
            ent.remap_assets(remap);
        }
        out
    }

    fn recenter(&mut self) {
        let centers: Vec<_> = self
            .grid
            .iter()
            .map(|(pos, _)| self.grid.grid_to_world_center(pos))
            .collect();
        for (cel, center) in self.grid.iter_mut().zip(centers) {
            if let Some(ent) = cel {
                ent.position = center;
            }
        }
    }
}
