//! Asset loading from the file system: textures by path, shapes from
//! Wavefront OBJ files.

use std::fs;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use te3_engine::assets::{AssetError, AssetLoader, Mesh, Model, Texture};

use crate::settings::Settings;

/// Resolves relative texture paths against `textures` and shape paths
/// against `shapes`. Tables keep the paths as given, so maps stay portable
/// between working directories.
pub struct FsLoader {
    textures: PathBuf,
    shapes: PathBuf,
}

impl FsLoader {
    /// Textures and shapes both under `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self { textures: base.clone(), shapes: base }
    }

    pub fn with_dirs(textures: impl Into<PathBuf>, shapes: impl Into<PathBuf>) -> Self {
        Self { textures: textures.into(), shapes: shapes.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_dirs(&settings.textures_dir, &settings.shapes_dir)
    }
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

impl AssetLoader for FsLoader {
    /// Pixels are decoded by the renderer; here the file only has to exist.
    fn load_texture(&self, path: &Path) -> Result<Texture, AssetError> {
        let full = resolve(&self.textures, path);
        let meta = fs::metadata(&full).map_err(|e| AssetError::load(path, e))?;
        if !meta.is_file() {
            return Err(AssetError::load(path, "not a file"));
        }
        Ok(Texture { path: path.to_path_buf() })
    }

    fn load_model(&self, path: &Path) -> Result<Model, AssetError> {
        let text = fs::read_to_string(resolve(&self.shapes, path)).map_err(|e| AssetError::load(path, e))?;
        parse_obj(&text).map_err(|reason| AssetError::load(path, reason))
    }
}

/// One [`Mesh`] per OBJ object, in file order. Material libraries are ignored.
pub fn parse_obj(text: &str) -> Result<Model, String> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (objects, _materials) = tobj::load_obj_buf(&mut text.as_bytes(), &options, |_| {
        Ok((Vec::new(), Default::default()))
    })
    .map_err(|e| e.to_string())?;
    if objects.is_empty() {
        return Err("no objects in OBJ".into());
    }

    let meshes = objects
        .into_iter()
        .map(|object| {
            let m = object.mesh;
            let positions: Vec<Vec3> = m.positions.chunks_exact(3).map(Vec3::from_slice).collect();
            let normals = if m.normals.len() == m.positions.len() {
                m.normals.chunks_exact(3).map(Vec3::from_slice).collect()
            } else {
                Vec::new()
            };
            // OBJ puts v = 0 at the bottom of the image
            let texcoords = if m.texcoords.len() / 2 == positions.len() {
                m.texcoords
                    .chunks_exact(2)
                    .map(|uv| Vec2::new(uv[0], 1.0 - uv[1]))
                    .collect()
            } else {
                Vec::new()
            };
            let indices = if m.indices.is_empty() {
                (0..positions.len() as u32).collect()
            } else {
                m.indices
            };
            Mesh { positions, normals, texcoords, indices }
        })
        .collect();
    Ok(Model { meshes })
}
