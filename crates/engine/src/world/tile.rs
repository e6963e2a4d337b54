/// Index of a shape in a map's asset table. Only meaningful inside one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId(pub i32);

/// Index of a texture in a map's asset table. Only meaningful inside one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TexId(pub i32);

impl ModelId {
    /// Marks an empty cell.
    pub const NONE: ModelId = ModelId(-1);

    pub const fn is_some(&self) -> bool {
        self.0 >= 0
    }

    pub const fn index(&self) -> Option<usize> {
        if self.0 >= 0 { Some(self.0 as usize) } else { None }
    }
}

impl TexId {
    pub const NONE: TexId = TexId(-1);

    pub const fn is_some(&self) -> bool {
        self.0 >= 0
    }

    pub const fn index(&self) -> Option<usize> {
        if self.0 >= 0 { Some(self.0 as usize) } else { None }
    }
}

/// Contents of one tile grid cell: a shape, two textures and a quarter-turn
/// orientation.
///
/// `textures[n]` applies to sub-mesh `n` of the shape; sub-meshes past the
/// second reuse the secondary texture. `yaw` and `pitch` count 90 degree
/// turns and are always stored mod 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub shape: ModelId,
    pub textures: [TexId; 2],
    pub yaw: u8,
    pub pitch: u8,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        shape: ModelId::NONE,
        textures: [TexId::NONE, TexId::NONE],
        yaw: 0,
        pitch: 0,
    };

    pub fn new(shape: ModelId, textures: [TexId; 2], yaw: u8, pitch: u8) -> Self {
        Self {
            shape,
            textures,
            yaw: yaw % 4,
            pitch: pitch % 4,
        }
    }

    /// A tile using the same texture on every sub-mesh.
    pub fn single(shape: ModelId, texture: TexId, yaw: u8, pitch: u8) -> Self {
        Self::new(shape, [texture, texture], yaw, pitch)
    }

    pub const fn is_empty(&self) -> bool {
        !self.shape.is_some()
    }

    pub const fn is_occupied(&self) -> bool {
        self.shape.is_some()
    }

    /// Texture used for sub-mesh `mesh` of the shape.
    pub fn texture_for_mesh(&self, mesh: usize) -> TexId {
        self.textures[mesh.min(1)]
    }

    /// Yaw in radians, counter-clockwise about +Y.
    pub fn yaw_radians(&self) -> f32 {
        self.yaw as f32 * std::f32::consts::FRAC_PI_2
    }

    /// Pitch in radians, about +X.
    pub fn pitch_radians(&self) -> f32 {
        self.pitch as f32 * std::f32::consts::FRAC_PI_2
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::EMPTY
    }
}
