//! Asset handles, the shared asset cache, and the per-map ID table.
//!
//! Tiles and ents never hold asset handles directly. They store compact
//! [`TexId`]/[`ModelId`] indices into an [`AssetTable`], which keeps a strong
//! `Rc` to every asset the map references. The [`AssetCache`] only holds weak
//! handles, so an asset is dropped once no map (or renderer) uses it anymore.

mod cache;
mod table;

pub use cache::{AssetCache, AssetLoader};
pub use table::{AssetTable, IdRemap, UsedAssets};

use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
    #[error("unknown texture id {0}")]
    UnknownTexture(i32),
    #[error("unknown model id {0}")]
    UnknownModel(i32),
}

impl AssetError {
    pub fn load(path: &Path, reason: impl ToString) -> Self {
        AssetError::Load {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// A loaded texture. The core never samples it; it is bound by the renderer
/// and referenced by path on export.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub path: PathBuf,
}

/// Indexed triangle geometry. `normals` and `texcoords` are either empty or
/// parallel to `positions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn normal(&self, vertex: usize) -> Vec3 {
        self.normals.get(vertex).copied().unwrap_or(Vec3::Y)
    }

    pub fn texcoord(&self, vertex: usize) -> Vec2 {
        self.texcoords.get(vertex).copied().unwrap_or(Vec2::ZERO)
    }

    /// Component-wise bounds of `positions`, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }
}

/// A tile shape: one or more sub-meshes, each textured independently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub meshes: Vec<Mesh>,
}

impl Model {
    /// An axis-aligned cube of edge `size` centered on the origin, one quad
    /// (two triangles) per face with outward winding.
    ///
    /// Every face is split along the diagonal running from its lowest to its
    /// highest corner, so coincident faces of two adjacent cubes consist of
    /// the same two triangles.
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        let axes = [Vec3::X, Vec3::Y, Vec3::Z];
        let mut mesh = Mesh::default();
        for a in 0..3 {
            let (b, c) = match a {
                0 => (1, 2),
                1 => (0, 2),
                _ => (0, 1),
            };
            for sign in [1.0f32, -1.0] {
                let n = axes[a] * sign;
                let base = mesh.positions.len() as u32;
                for (sb, sc) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                    mesh.positions.push((n + axes[b] * sb + axes[c] * sc) * h);
                    mesh.normals.push(n);
                    mesh.texcoords.push(Vec2::new((sb + 1.0) / 2.0, (1.0 - sc) / 2.0));
                }
                let quad = if axes[b].cross(axes[c]).dot(n) > 0.0 {
                    [0, 1, 2, 0, 2, 3]
                } else {
                    [0, 2, 1, 0, 3, 2]
                };
                mesh.indices.extend(quad.map(|i| base + i));
            }
        }
        Model { meshes: vec![mesh] }
    }
}
