//! Map persistence in the `.te3` JSON format.
//!
//! ```text
//! {
//!   "meta":  { "editor": "te3", "version": "3.2" },
//!   "tiles": { "width", "height", "length", "textures": [path], "shapes": [path], "data": base64 },
//!   "ents":  [ { "radius", "color": [r,g,b], "position": [x,y,z], "angles": [pitch,yaw,0], "properties": {..} } ],
//!   "editorCamera": { "position": [x,y,z], "eulerAngles": [deg,deg,deg] }
//! }
//! ```
//!
//! `tiles.data` is the binary tile stream (see `te3_engine::codec`); the
//! version selects its layout. Asset IDs inside it index the `textures` and
//! `shapes` lists, which hold only assets the map actually uses.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail, ensure};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use glam::Vec3;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use te3_engine::assets::{AssetCache, AssetTable, IdRemap};
use te3_engine::codec::TileFormat;
use te3_engine::world::{DEFAULT_SPACING, Display, Ent, EntGrid, Extent, MAX_VOLUME, ModelId, TexId, TileGrid};

use crate::map_man::{Camera, MapMan};

/// Identifies files written by this editor.
pub const EDITOR_NAME: &str = "te3";
/// Version written on save. Selects the current tile codec.
pub const FORMAT_VERSION: &str = "3.2";

/// A fully parsed map, ready to replace a `MapMan`'s contents.
pub struct LoadedMap {
    pub assets: AssetTable,
    pub tiles: TileGrid,
    pub ents: EntGrid,
    pub camera: Camera,
}

impl std::fmt::Debug for LoadedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedMap")
            .field("ents", &self.ents)
            .field("camera", &self.camera)
            .finish_non_exhaustive()
    }
}

// ── Document structs (serde) ─────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
struct MapDocument {
    meta: Meta,
    tiles: TilesSection,
    #[serde(default)]
    ents: Vec<EntRecord>,
    #[serde(rename = "editorCamera", default)]
    editor_camera: CameraRecord,
}

#[derive(Serialize, Deserialize, Debug)]
struct Meta {
    #[serde(default)]
    editor: String,
    version: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct TilesSection {
    width: usize,
    height: usize,
    length: usize,
    textures: Vec<PathBuf>,
    shapes: Vec<PathBuf>,
    data: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct EntRecord {
    radius: f32,
    color: [u8; 3],
    position: [f32; 3],
    /// `[pitch, yaw, roll]` in degrees; roll is always 0.
    angles: [f32; 3],
    #[serde(default)]
    properties: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "DisplayKind::is_sphere")]
    display: DisplayKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    texture: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
enum DisplayKind {
    #[default]
    Sphere,
    Model,
    Sprite,
}

impl DisplayKind {
    fn is_sphere(&self) -> bool {
        *self == DisplayKind::Sphere
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct CameraRecord {
    position: [f32; 3],
    #[serde(rename = "eulerAngles")]
    euler_angles: [f32; 3],
}

// ── Save ─────────────────────────────────────────────────────────────────────

/// Save `map` to `path`.
///
/// The document is composed fully in memory and written to a sibling
/// temporary file, which then replaces `path`. A failure at any point leaves
/// an existing file at `path` untouched.
pub fn save_map(map: &MapMan, path: &Path) -> Result<()> {
    let start = Instant::now();
    let json = to_json(map)?;
    write_replacing(path, json.as_bytes())?;
    tracing::info!(
        "Map saved to {}: {} tiles, {} ents ({:.2?})",
        path.display(),
        map.tiles().occupied_count(),
        map.ents().count(),
        start.elapsed(),
    );
    Ok(())
}

/// Serialize `map` as a `.te3` document.
///
/// Only referenced assets are listed and tile IDs are renumbered to match.
/// The map's own table and tiles are left as they are.
pub fn to_json(map: &MapMan) -> Result<String> {
    let tiles = map.tiles();
    let ents = map.ents();
    let assets = map.assets();

    let mut used = tiles.used_asset_ids();
    ents.collect_asset_ids(&mut used);
    let (compact, remap) = assets.compacted(&used);
    if compact.texture_count() < assets.texture_count() || compact.model_count() < assets.model_count() {
        tracing::debug!(
            "Compacted assets: {}/{} textures, {}/{} shapes",
            compact.texture_count(),
            assets.texture_count(),
            compact.model_count(),
            assets.model_count(),
        );
    }

    let data = tiles.remapped(&remap).to_bytes(TileFormat::Current);
    let extent = tiles.extent();
    let doc = MapDocument {
        meta: Meta {
            editor: EDITOR_NAME.into(),
            version: FORMAT_VERSION.into(),
        },
        tiles: TilesSection {
            width: extent.width,
            height: extent.height,
            length: extent.length,
            textures: compact.texture_paths().map(Path::to_path_buf).collect(),
            shapes: compact.model_paths().map(Path::to_path_buf).collect(),
            data: BASE64_STANDARD.encode(data),
        },
        ents: ents.iter().map(|(_, ent)| ent_to_record(ent, assets)).collect(),
        editor_camera: CameraRecord {
            position: map.camera().position.to_array(),
            euler_angles: map.camera().angles.to_array(),
        },
    };
    serde_json::to_string_pretty(&doc).context("serializing map document")
}

fn ent_to_record(ent: &Ent, assets: &AssetTable) -> EntRecord {
    let path_of_tex = |id: TexId| assets.path_from_tex_id(id).map(Path::to_path_buf);
    let (display, model, texture) = match ent.display {
        Display::Sphere => (DisplayKind::Sphere, None, None),
        Display::Model { model, texture } => (
            DisplayKind::Model,
            assets.path_from_model_id(model).map(Path::to_path_buf),
            path_of_tex(texture),
        ),
        Display::Sprite { texture } => (DisplayKind::Sprite, None, path_of_tex(texture)),
    };
    EntRecord {
        radius: ent.radius,
        color: ent.color,
        position: ent.position.to_array(),
        angles: [ent.pitch, ent.yaw, 0.0],
        properties: ent.properties.clone(),
        display,
        model,
        texture,
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename it over `path`.
pub(crate) fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("not a file path: {}", path.display()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let result = fs::write(&tmp, bytes)
        .with_context(|| format!("writing {}", tmp.display()))
        .and_then(|()| {
            fs::rename(&tmp, path)
                .with_context(|| format!("replacing {} with {}", path.display(), tmp.display()))
        });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

// ── Load ─────────────────────────────────────────────────────────────────────

/// Whether `text` is a `.te3` document: JSON with a `meta.version` string.
/// Anything else is treated as a legacy `.ti` map.
pub fn is_te3(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("meta")?.get("version")?.as_str().map(|_| ()))
        .is_some()
}

/// Parse a `.te3` document, loading every listed asset through `cache`.
pub fn parse_te3(cache: &AssetCache, text: &str) -> Result<LoadedMap> {
    let doc: MapDocument = serde_json::from_str(text).context("parsing map document")?;
    let (major, minor) = parse_version(&doc.meta.version)?;
    let format = TileFormat::for_version(major, minor);
    if !doc.meta.editor.is_empty() && doc.meta.editor != EDITOR_NAME {
        tracing::warn!("Map was written by '{}'", doc.meta.editor);
    }

    let extent = Extent::new(doc.tiles.width, doc.tiles.height, doc.tiles.length);
    ensure!(
        extent.is_allocatable(),
        "a {}x{}x{} tile grid exceeds the {} cell limit",
        extent.width,
        extent.height,
        extent.length,
        MAX_VOLUME
    );

    // Rebuild the table in file order. Duplicate paths collapse onto one ID,
    // so file indices are translated rather than assumed equal.
    let mut assets = AssetTable::new();
    let mut remap = IdRemap::default();
    for (idx, path) in doc.tiles.textures.iter().enumerate() {
        let id = assets
            .get_or_add_texture(cache, path)
            .with_context(|| format!("loading texture {}", path.display()))?;
        remap.textures.insert(TexId(idx as i32), id);
    }
    for (idx, path) in doc.tiles.shapes.iter().enumerate() {
        let id = assets
            .get_or_add_model(cache, path)
            .with_context(|| format!("loading shape {}", path.display()))?;
        remap.models.insert(ModelId(idx as i32), id);
    }

    let data = BASE64_STANDARD
        .decode(doc.tiles.data.trim())
        .context("decoding tile data")?;
    let tiles = TileGrid::from_bytes(extent, DEFAULT_SPACING, &data, format)
        .with_context(|| format!("reading {}x{}x{} tile grid", extent.width, extent.height, extent.length))?;
    let unknown = tiles
        .grid()
        .cels()
        .iter()
        .filter(|t| t.is_occupied() && !remap.models.contains_key(&t.shape))
        .count();
    if unknown > 0 {
        tracing::warn!("Cleared {} tiles whose shape is not listed in the file", unknown);
    }
    let tiles = tiles.remapped(&remap);

    let mut ents = EntGrid::new(extent, DEFAULT_SPACING);
    let mut dropped = 0usize;
    for record in doc.ents {
        let position = Vec3::from_array(record.position);
        let cell = tiles.grid().world_to_grid(position);
        if !tiles.grid().contains(cell) {
            dropped += 1;
            continue;
        }
        let ent = record_to_ent(record, cache, &mut assets)?;
        ents.add_ent(cell, ent);
    }
    if dropped > 0 {
        tracing::warn!("Dropped {} ents outside the {}x{}x{} grid", dropped, extent.width, extent.height, extent.length);
    }

    let camera = Camera {
        position: Vec3::from_array(doc.editor_camera.position),
        angles: Vec3::from_array(doc.editor_camera.euler_angles),
    };
    Ok(LoadedMap { assets, tiles, ents, camera })
}

fn record_to_ent(record: EntRecord, cache: &AssetCache, assets: &mut AssetTable) -> Result<Ent> {
    let mut texture = || -> Result<TexId> {
        match &record.texture {
            Some(path) => assets
                .get_or_add_texture(cache, path)
                .with_context(|| format!("loading ent texture {}", path.display())),
            None => Ok(TexId::NONE),
        }
    };
    let display = match record.display {
        DisplayKind::Sphere => Display::Sphere,
        DisplayKind::Sprite => Display::Sprite { texture: texture()? },
        DisplayKind::Model => {
            let texture = texture()?;
            match &record.model {
                Some(path) => Display::Model {
                    model: assets
                        .get_or_add_model(cache, path)
                        .with_context(|| format!("loading ent model {}", path.display()))?,
                    texture,
                },
                None => {
                    tracing::warn!("Model ent without a model path, showing it as a sphere");
                    Display::Sphere
                }
            }
        }
    };
    Ok(Ent {
        display,
        color: record.color,
        radius: record.radius,
        yaw: record.angles[1],
        pitch: record.angles[0],
        position: Vec3::from_array(record.position),
        properties: record.properties,
    })
}

fn parse_version(version: &str) -> Result<(u32, u32)> {
    let (major, minor) = version
        .trim()
        .split_once('.')
        .ok_or_else(|| anyhow!("malformed map version '{}'", version))?;
    let major = major.parse().with_context(|| format!("malformed map version '{}'", version))?;
    let minor = minor.parse().with_context(|| format!("malformed map version '{}'", version))?;
    if major > 3 {
        bail!("map version {} is newer than this editor supports", version);
    }
    Ok((major, minor))
}

/// Read a map file of either supported format.
pub fn load_map(cache: &AssetCache, path: &Path) -> Result<LoadedMap> {
    let start = Instant::now();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let map = if is_te3(&text) {
        parse_te3(cache, &text)
    } else {
        tracing::info!("{} is not a .te3 document, importing it as a legacy map", path.display());
        crate::legacy::import_ti(cache, &text)
    }
    .with_context(|| format!("loading {}", path.display()))?;
    tracing::info!(
        "Map loaded from {}: {} tiles, {} ents ({:.2?})",
        path.display(),
        map.tiles.occupied_count(),
        map.ents.count(),
        start.elapsed(),
    );
    Ok(map)
}
