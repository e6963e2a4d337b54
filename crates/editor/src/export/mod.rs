//! Scene export to glTF 2.0, either as a `.gltf` document with an embedded
//! buffer or as a single binary `.glb`.

mod glb;
mod scene;

pub use scene::GENERATOR;
pub use glb::to_glb;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::map_man::MapMan;
use crate::persistence::write_replacing;
use crate::settings::{ExportSettings, Settings};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// One node and single-material mesh per texture, instead of one
    /// multi-primitive mesh.
    pub separate_geometry: bool,
    /// Drop faces hidden between adjacent tiles.
    pub cull_faces: bool,
    /// Directory relative texture paths are resolved from when computing
    /// image URIs. The configured textures directory when built from
    /// [`Settings`].
    pub asset_root: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        let ExportSettings { separate_geometry, cull_faces } = ExportSettings::default();
        Self { separate_geometry, cull_faces, asset_root: PathBuf::from(".") }
    }
}

impl ExportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            separate_geometry: settings.export.separate_geometry,
            cull_faces: settings.export.cull_faces,
            asset_root: settings.textures_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON with the geometry buffer as a base64 data URI.
    Gltf,
    /// Binary container with JSON and BIN chunks.
    Glb,
}

impl ExportFormat {
    /// `.glb` (any case) is binary; everything else is written as `.gltf`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("glb") => ExportFormat::Glb,
            _ => ExportFormat::Gltf,
        }
    }
}

/// Export `map` to `path`, choosing the container from the extension.
pub fn export_map(map: &MapMan, path: &Path, options: &ExportOptions) -> Result<()> {
    let start = Instant::now();
    let model = map.tiles().merged_model(map.assets(), options.cull_faces);
    let out_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut doc = scene::build_scene(&model, map.ents(), map.assets(), options, out_dir)?;

    let format = ExportFormat::from_path(path);
    let bytes = match format {
        ExportFormat::Glb => {
            let json = serde_json::to_vec(&doc.root).context("serializing glTF document")?;
            to_glb(&json, &doc.bin)
        }
        ExportFormat::Gltf => {
            doc.embed_buffer();
            serde_json::to_vec_pretty(&doc.root).context("serializing glTF document")?
        }
    };
    write_replacing(path, &bytes)?;

    tracing::info!(
        "Exported {} as {:?}: {} triangles in {} meshes, {} ents ({:.2?})",
        path.display(),
        format,
        model.triangle_count(),
        doc.root.meshes.len(),
        map.ents().count(),
        start.elapsed(),
    );
    Ok(())
}
