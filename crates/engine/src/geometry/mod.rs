//! World-space geometry built from tile grids: the merged model used for the
//! preview and for export, and the face-culling pass that feeds it.

mod merge;

pub use merge::merge_tiles;

use crate::assets::Mesh;
use crate::world::position::GridPos;
use crate::world::tile::TexId;
use glam::Vec3;

/// Distance and direction tolerance for coincident-face tests.
pub const EPSILON: f32 = 1e-3;

/// One mesh of the merged model; everything in it shares one texture.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedMesh {
    pub texture: TexId,
    pub mesh: Mesh,
}

/// All tile geometry of a grid in world space, one mesh per texture.
///
/// Meshes are ordered by texture ID and never empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedModel {
    pub meshes: Vec<MergedMesh>,
}

impl MergedModel {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.mesh.triangle_count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// A plane `normal . p == distance` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Plane of a counter-clockwise triangle, or `None` if it is degenerate.
    pub fn from_triangle([a, b, c]: [Vec3; 3]) -> Option<Self> {
        let normal = (b - a).cross(c - a).try_normalize()?;
        Some(Plane { normal, distance: normal.dot(a) })
    }

    /// Same plane, facing the other way.
    pub fn is_opposite(&self, other: &Plane) -> bool {
        (self.normal + other.normal).length() < EPSILON
            && (self.distance + other.distance).abs() < EPSILON
    }

    /// The grid step this plane faces, if its normal is one of the six axes.
    pub fn axis_direction(&self) -> Option<GridPos> {
        let n = self.normal;
        let candidates = [
            (Vec3::X, GridPos::new(1, 0, 0)),
            (Vec3::NEG_X, GridPos::new(-1, 0, 0)),
            (Vec3::Y, GridPos::new(0, 1, 0)),
            (Vec3::NEG_Y, GridPos::new(0, -1, 0)),
            (Vec3::Z, GridPos::new(0, 0, 1)),
            (Vec3::NEG_Z, GridPos::new(0, 0, -1)),
        ];
        candidates
            .into_iter()
            .find(|(axis, _)| n.abs_diff_eq(*axis, EPSILON))
            .map(|(_, step)| step)
    }
}
