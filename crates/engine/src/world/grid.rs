use super::position::{Extent, GridPos};
use glam::Vec3;

/// A position was outside the grid it was used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("grid position ({}, {}, {}) is outside a {}x{}x{} grid", pos.i, pos.j, pos.k, extent.width, extent.height, extent.length)]
pub struct RangeError {
    pub pos: GridPos,
    pub extent: Extent,
}

/// A dense 3D array of cells with a uniform world-space spacing.
///
/// Stored flat with x varying fastest, then z, then y:
/// `index = i + k * width + j * width * length`. Whole Y layers are therefore
/// contiguous, which is what layer-limited batching scans.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<Cel> {
    cels: Vec<Cel>,
    extent: Extent,
    spacing: f32,
}

impl<Cel> Grid<Cel> {
    /// Wrap an existing flat cell buffer. `cels.len()` must equal the volume.
    pub fn from_cels(extent: Extent, spacing: f32, cels: Vec<Cel>) -> Option<Self> {
        (cels.len() == extent.volume()).then_some(Self { cels, extent, spacing })
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn width(&self) -> usize {
        self.extent.width
    }

    pub fn height(&self) -> usize {
        self.extent.height
    }

    pub fn length(&self) -> usize {
        self.extent.length
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn len(&self) -> usize {
        self.cels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cels.is_empty()
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        self.extent.contains(pos)
    }

    #[inline]
    pub fn flat_index(&self, pos: GridPos) -> Result<usize, RangeError> {
        if !self.extent.contains(pos) {
            return Err(RangeError { pos, extent: self.extent });
        }
        let Extent { width, length, .. } = self.extent;
        Ok(pos.i as usize + pos.k as usize * width + pos.j as usize * width * length)
    }

    /// Inverse of `flat_index`. `index` must be below `len()`.
    pub fn unflatten(&self, index: usize) -> GridPos {
        let Extent { width, length, .. } = self.extent;
        let layer = width * length;
        GridPos::new(
            (index % width) as i32,
            (index / layer) as i32,
            ((index % layer) / width) as i32,
        )
    }

    pub fn try_get(&self, pos: GridPos) -> Result<&Cel, RangeError> {
        self.flat_index(pos).map(|idx| &self.cels[idx])
    }

    pub fn try_set(&mut self, pos: GridPos, cel: Cel) -> Result<(), RangeError> {
        let idx = self.flat_index(pos)?;
        self.cels[idx] = cel;
        Ok(())
    }

    /// Read a cell. Panics if `pos` is outside the grid; use `try_get` when
    /// the position is not already known to be valid.
    #[inline]
    pub fn get(&self, pos: GridPos) -> &Cel {
        match self.try_get(pos) {
            Ok(cel) => cel,
            Err(e) => panic!("{e}"),
        }
    }

    /// Write a cell. Panics if `pos` is outside the grid.
    #[inline]
    pub fn set(&mut self, pos: GridPos, cel: Cel) {
        if let Err(e) = self.try_set(pos, cel) {
            panic!("{e}");
        }
    }

    /// World-space position of a cell's minimum corner.
    pub fn grid_to_world(&self, pos: GridPos) -> Vec3 {
        Vec3::new(pos.i as f32, pos.j as f32, pos.k as f32) * self.spacing
    }

    /// World-space position of a cell's center.
    pub fn grid_to_world_center(&self, pos: GridPos) -> Vec3 {
        self.grid_to_world(pos) + Vec3::splat(self.spacing / 2.0)
    }

    /// The cell containing a world-space point. May be outside the grid.
    pub fn world_to_grid(&self, world: Vec3) -> GridPos {
        let g = (world / self.spacing).floor();
        GridPos::new(g.x as i32, g.y as i32, g.z as i32)
    }

    /// World-space center of the whole grid.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.extent.width as f32,
            self.extent.height as f32,
            self.extent.length as f32,
        ) * self.spacing
            / 2.0
    }

    pub fn cels(&self) -> &[Cel] {
        &self.cels
    }

    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &Cel)> {
        self.cels
            .iter()
            .enumerate()
            .map(|(idx, cel)| (self.unflatten(idx), cel))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cel> {
        self.cels.iter_mut()
    }

    #[inline]
    fn index_unchecked(&self, pos: GridPos) -> usize {
        let Extent { width, length, .. } = self.extent;
        pos.i as usize + pos.k as usize * width + pos.j as usize * width * length
    }
}

impl<Cel: Clone> Grid<Cel> {
    pub fn new(extent: Extent, spacing: f32, fill: Cel) -> Self {
        Self {
            cels: vec![fill; extent.volume()],
            extent,
            spacing,
        }
    }

    /// Fill the part of `origin..origin+size` that lies inside the grid.
    /// Returns the number of cells written.
    pub fn fill_region(&mut self, origin: GridPos, size: Extent, cel: Cel) -> usize {
        let Some((origin, size)) = self.extent.clip(origin, size) else {
            return 0;
        };
        let mut written = 0;
        for pos in size.positions(origin) {
            let idx = self.index_unchecked(pos);
            self.cels[idx] = cel.clone();
            written += 1;
        }
        written
    }

    /// Copy `src` into this grid with its origin at `dest`. Cells that would
    /// land outside this grid are skipped; clipping is not an error.
    pub fn copy_region(&mut self, dest: GridPos, src: &Grid<Cel>) -> usize {
        self.copy_region_where(dest, src, |_| true)
    }

    /// Like `copy_region`, but only source cells accepted by `keep` are written.
    pub fn copy_region_where<F>(&mut self, dest: GridPos, src: &Grid<Cel>, keep: F) -> usize
    where
        F: Fn(&Cel) -> bool,
    {
        let Some((origin, size)) = self.extent.clip(dest, src.extent) else {
            return 0;
        };
        if size != src.extent {
            tracing::debug!(
                "copy clipped: {}x{}x{} of {}x{}x{} cells fit",
                size.width,
                size.height,
                size.length,
                src.width(),
                src.height(),
                src.length()
            );
        }
        let mut written = 0;
        for pos in size.positions(origin) {
            let cel = &src.cels[src.index_unchecked(pos - dest)];
            if keep(cel) {
                let idx = self.index_unchecked(pos);
                self.cels[idx] = cel.clone();
                written += 1;
            }
        }
        written
    }

    /// Deep copy of the region `origin..origin+size`.
    ///
    /// The region must lie entirely inside the grid; callers clip first.
    pub fn subsection(&self, origin: GridPos, size: Extent) -> Grid<Cel> {
        assert!(
            size.is_empty() || (self.contains(origin) && self.contains(size.end(origin).offset(-1, -1, -1))),
            "subsection {origin:?} + {size:?} exceeds grid extent {:?}",
            self.extent
        );
        let cels = size
            .positions(origin)
            .map(|pos| self.cels[self.index_unchecked(pos)].clone())
            .collect();
        Grid { cels, extent: size, spacing: self.spacing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(extent: Extent) -> Grid<u32> {
        let cels = (0..extent.volume() as u32).collect();
        Grid::from_cels(extent, 1.0, cels).unwrap()
    }

    #[test]
    fn flat_index_layout() {
        let g = Grid::new(Extent::new(3, 2, 4), 1.0, 0u8);
        assert_eq!(g.flat_index(GridPos::new(1, 0, 0)), Ok(1));
        assert_eq!(g.flat_index(GridPos::new(0, 0, 1)), Ok(3));
        assert_eq!(g.flat_index(GridPos::new(0, 1, 0)), Ok(12));
        assert_eq!(g.flat_index(GridPos::new(2, 1, 3)), Ok(2 + 9 + 12));
        for idx in 0..g.len() {
            assert_eq!(g.flat_index(g.unflatten(idx)), Ok(idx));
        }
    }

    #[test]
    fn out_of_range_is_an_error() {
        let mut g = Grid::new(Extent::new(2, 2, 2), 1.0, 0u8);
        assert!(g.try_get(GridPos::new(2, 0, 0)).is_err());
        assert!(g.try_get(GridPos::new(0, -1, 0)).is_err());
        assert!(g.try_set(GridPos::new(0, 0, 2), 1).is_err());
    }

    #[test]
    #[should_panic]
    fn get_out_of_range_panics() {
        let g = Grid::new(Extent::new(2, 2, 2), 1.0, 0u8);
        g.get(GridPos::new(5, 0, 0));
    }

    #[test]
    fn copy_region_clips() {
        let mut dst = Grid::new(Extent::new(3, 1, 3), 1.0, 0u32);
        let src = Grid::new(Extent::new(2, 1, 2), 1.0, 7u32);
        let written = dst.copy_region(GridPos::new(2, 0, 2), &src);
        assert_eq!(written, 1);
        assert_eq!(*dst.get(GridPos::new(2, 0, 2)), 7);
        assert_eq!(dst.cels().iter().filter(|c| **c == 7).count(), 1);
    }

    #[test]
    fn subsection_then_copy_back_is_noop() {
        let mut g = numbered(Extent::new(4, 3, 5));
        let before = g.clone();
        let origin = GridPos::new(1, 1, 2);
        let sub = g.subsection(origin, Extent::new(2, 2, 3));
        assert_eq!(sub, g.subsection(origin, Extent::new(2, 2, 3)));
        assert_eq!(*sub.get(GridPos::ZERO), *g.get(origin));
        g.copy_region(origin, &sub);
        assert_eq!(g, before);
    }

    #[test]
    #[should_panic]
    fn subsection_out_of_range_panics() {
        let g = numbered(Extent::new(2, 2, 2));
        g.subsection(GridPos::new(1, 0, 0), Extent::new(2, 1, 1));
    }

    #[test]
    fn world_conversions() {
        let g = Grid::new(Extent::new(4, 4, 4), 2.0, 0u8);
        let p = GridPos::new(1, 2, 3);
        assert_eq!(g.grid_to_world(p), Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(g.grid_to_world_center(p), Vec3::new(3.0, 5.0, 7.0));
        assert_eq!(g.world_to_grid(g.grid_to_world_center(p)), p);
        assert_eq!(g.world_to_grid(Vec3::new(-0.5, 0.0, 0.0)).i, -1);
    }

    #[test]
    fn accessors_need_no_clone() {
        struct Marker;
        let g = Grid::from_cels(Extent::new(2, 1, 1), 2.0, vec![Marker, Marker]).unwrap();
        assert_eq!(g.center(), Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(g.spacing(), 2.0);
        assert!(g.try_get(GridPos::new(1, 0, 0)).is_ok());
        assert_eq!(g.iter().count(), 2);
    }
}
