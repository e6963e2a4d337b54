//! Instanced draw batches and the seam to the host renderer.

use crate::assets::{Mesh, Texture};
use crate::world::tile::{ModelId, TexId};
use glam::{Mat4, Vec3};

/// Identifies one instanced draw: a texture bound to one sub-mesh of a shape.
///
/// Uses `(ModelId, sub-mesh index)` rather than the mesh's address, so keys
/// survive the asset table moving or reloading its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub texture: TexId,
    pub model: ModelId,
    pub mesh: usize,
}

/// The parameters a set of batches was built for. Any change forces a rebuild.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchParams {
    /// World-space offset applied to every instance.
    pub position: Vec3,
    /// First Y layer drawn.
    pub y_from: usize,
    /// Last Y layer drawn (inclusive).
    pub y_to: usize,
}

impl BatchParams {
    pub fn all_layers(height: usize) -> Self {
        Self {
            position: Vec3::ZERO,
            y_from: 0,
            y_to: height.saturating_sub(1),
        }
    }
}

/// Implemented by the host renderer.
pub trait DrawTarget {
    /// Draw `mesh` once per transform with `texture` bound (untextured if `None`).
    fn draw_instanced(&mut self, texture: Option<&Texture>, mesh: &Mesh, transforms: &[Mat4]);

    /// Draw a single already-positioned mesh.
    fn draw_mesh(&mut self, texture: Option<&Texture>, mesh: &Mesh, transform: Mat4);
}
