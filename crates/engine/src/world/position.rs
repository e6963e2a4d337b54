/// Integer cell coordinate: `i` = x, `j` = y (layer), `k` = z.
///
/// Signed so that neighbor arithmetic at the grid border stays representable;
/// whether a position is inside a grid is answered by `Extent::contains`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridPos {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl GridPos {
    pub const ZERO: GridPos = GridPos::new(0, 0, 0);

    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    pub const fn offset(&self, di: i32, dj: i32, dk: i32) -> Self {
        Self::new(self.i + di, self.j + dj, self.k + dk)
    }

    /// The six cardinal neighbors, in `Direction::ALL` order.
    pub const fn neighbors(&self) -> [GridPos; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }

    pub fn min(self, other: GridPos) -> GridPos {
        GridPos::new(self.i.min(other.i), self.j.min(other.j), self.k.min(other.k))
    }

    pub fn max(self, other: GridPos) -> GridPos {
        GridPos::new(self.i.max(other.i), self.j.max(other.j), self.k.max(other.k))
    }
}

impl std::ops::Add for GridPos {
    type Output = GridPos;

    fn add(self, rhs: GridPos) -> GridPos {
        self.offset(rhs.i, rhs.j, rhs.k)
    }
}

impl std::ops::Sub for GridPos {
    type Output = GridPos;

    fn sub(self, rhs: GridPos) -> GridPos {
        self.offset(-rhs.i, -rhs.j, -rhs.k)
    }
}

/// Largest grid, in cells, that can be created or loaded.
pub const MAX_VOLUME: usize = 1 << 24;

/// Size of a grid or of a region inside one, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: usize,
    pub height: usize,
    pub length: usize,
}

impl Extent {
    pub const fn new(width: usize, height: usize, length: usize) -> Self {
        Self { width, height, length }
    }

    pub const fn volume(&self) -> usize {
        self.width * self.height * self.length
    }

    /// `None` when the product overflows.
    pub const fn checked_volume(&self) -> Option<usize> {
        match self.width.checked_mul(self.height) {
            Some(area) => area.checked_mul(self.length),
            None => None,
        }
    }

    /// Whether a grid of this size is small enough to allocate. Each side is
    /// bounded on its own too, so a zero-volume extent cannot carry a side
    /// that does not fit a `GridPos` coordinate.
    pub const fn is_allocatable(&self) -> bool {
        let sides_fit = self.width <= MAX_VOLUME && self.height <= MAX_VOLUME && self.length <= MAX_VOLUME;
        match self.checked_volume() {
            Some(volume) => sides_fit && volume <= MAX_VOLUME,
            None => false,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.length == 0
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.i >= 0
            && pos.j >= 0
            && pos.k >= 0
            && (pos.i as usize) < self.width
            && (pos.j as usize) < self.height
            && (pos.k as usize) < self.length
    }

    /// The position one past the far corner of a region starting at `origin`.
    pub fn end(&self, origin: GridPos) -> GridPos {
        origin.offset(self.width as i32, self.height as i32, self.length as i32)
    }

    /// Intersect the region `origin..origin+size` with `0..self`.
    ///
    /// Returns the clipped origin and size, or `None` if nothing overlaps.
    pub fn clip(&self, origin: GridPos, size: Extent) -> Option<(GridPos, Extent)> {
        let lo = origin.max(GridPos::ZERO);
        let hi = size.end(origin).min(self.end(GridPos::ZERO));
        if hi.i <= lo.i || hi.j <= lo.j || hi.k <= lo.k {
            return None;
        }
        let clipped = Extent::new(
            (hi.i - lo.i) as usize,
            (hi.j - lo.j) as usize,
            (hi.k - lo.k) as usize,
        );
        Some((lo, clipped))
    }

    /// Every position inside `origin..origin+self`, x fastest, then z, then y.
    pub fn positions(&self, origin: GridPos) -> impl Iterator<Item = GridPos> + use<> {
        let Extent { width, height, length } = *self;
        (0..height as i32).flat_map(move |j| {
            (0..length as i32).flat_map(move |k| {
                (0..width as i32).map(move |i| origin.offset(i, j, k))
            })
        })
    }
}

/// The six sides of a map, used when growing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// +X
    Right,
    /// -X
    Left,
    /// +Y
    Up,
    /// -Y
    Down,
    /// +Z
    Front,
    /// -Z
    Back,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Right,
        Direction::Left,
        Direction::Up,
        Direction::Down,
        Direction::Front,
        Direction::Back,
    ];

    pub const fn unit(&self) -> GridPos {
        match self {
            Direction::Right => GridPos::new(1, 0, 0),
            Direction::Left => GridPos::new(-1, 0, 0),
            Direction::Up => GridPos::new(0, 1, 0),
            Direction::Down => GridPos::new(0, -1, 0),
            Direction::Front => GridPos::new(0, 0, 1),
            Direction::Back => GridPos::new(0, 0, -1),
        }
    }

    /// Growing toward a negative axis shifts existing content away from the origin.
    pub const fn is_negative(&self) -> bool {
        matches!(self, Direction::Left | Direction::Down | Direction::Back)
    }
}
