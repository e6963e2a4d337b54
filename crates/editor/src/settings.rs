//! Editor settings, stored as JSON next to the working directory.
//!
//! Every field has a default, so a partial file is valid. A missing file
//! gives the defaults silently; an unreadable or malformed one gives the
//! defaults with a warning.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use te3_engine::history::DEFAULT_UNDO_MAX;
use te3_engine::world::Extent;

pub const SETTINGS_FILE: &str = "te3_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of undoable actions.
    pub undo_max: usize,
    /// Base for relative texture paths, both when loading and in exported
    /// image URIs.
    pub textures_dir: PathBuf,
    /// Base for relative shape paths.
    pub shapes_dir: PathBuf,
    /// `[width, height, length]` of new maps.
    pub default_map_size: [usize; 3],
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// One node and mesh per texture instead of one multi-primitive mesh.
    pub separate_geometry: bool,
    pub cull_faces: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            undo_max: DEFAULT_UNDO_MAX,
            textures_dir: PathBuf::from("assets/textures"),
            shapes_dir: PathBuf::from("assets/shapes"),
            default_map_size: [64, 5, 64],
            export: ExportSettings::default(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            separate_geometry: false,
            cull_faces: true,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Settings {
        if !path.exists() {
            return Settings::default();
        }
        match Self::try_load(path) {
            Ok(settings) => {
                tracing::debug!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                tracing::warn!("Ignoring settings file: {:#}", e);
                Settings::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Settings> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    pub fn default_extent(&self) -> Extent {
        let [width, height, length] = self.default_map_size;
        Extent::new(width, height, length)
    }
}
