use super::{AssetCache, AssetError, Model, Texture};
use crate::world::tile::{ModelId, TexId};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

struct Entry<T> {
    path: PathBuf,
    asset: Rc<T>,
}

/// The per-map asset ID table: two lists of `(path, handle)`, where an
/// asset's ID is its list index.
///
/// IDs are only valid inside the map that owns the table. They are rebuilt
/// from the listed paths on load and compacted when writing a file.
#[derive(Default)]
pub struct AssetTable {
    textures: Vec<Entry<Texture>>,
    models: Vec<Entry<Model>>,
}

/// Sorted, de-duplicated asset IDs referenced by a map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedAssets {
    pub textures: BTreeSet<TexId>,
    pub models: BTreeSet<ModelId>,
}

/// Old-to-new ID translation produced by [`AssetTable::compacted`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRemap {
    pub textures: HashMap<TexId, TexId>,
    pub models: HashMap<ModelId, ModelId>,
}

impl IdRemap {
    /// Unmapped IDs become `NONE`.
    pub fn texture(&self, id: TexId) -> TexId {
        self.textures.get(&id).copied().unwrap_or(TexId::NONE)
    }

    pub fn model(&self, id: ModelId) -> ModelId {
        self.models.get(&id).copied().unwrap_or(ModelId::NONE)
    }
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ID of the texture at `path`, loading and appending it if this map does
    /// not reference it yet.
    pub fn get_or_add_texture(&mut self, cache: &AssetCache, path: &Path) -> Result<TexId, AssetError> {
        if let Some(idx) = self.textures.iter().position(|e| e.path == path) {
            return Ok(TexId(idx as i32));
        }
        let asset = cache.texture(path)?;
        self.textures.push(Entry { path: path.to_path_buf(), asset });
        Ok(TexId(self.textures.len() as i32 - 1))
    }

    pub fn get_or_add_model(&mut self, cache: &AssetCache, path: &Path) -> Result<ModelId, AssetError> {
        if let Some(idx) = self.models.iter().position(|e| e.path == path) {
            return Ok(ModelId(idx as i32));
        }
        let asset = cache.model(path)?;
        self.models.push(Entry { path: path.to_path_buf(), asset });
        Ok(ModelId(self.models.len() as i32 - 1))
    }

    pub fn path_from_tex_id(&self, id: TexId) -> Option<&Path> {
        Some(self.textures.get(id.index()?)?.path.as_path())
    }

    pub fn path_from_model_id(&self, id: ModelId) -> Option<&Path> {
        Some(self.models.get(id.index()?)?.path.as_path())
    }

    pub fn texture(&self, id: TexId) -> Option<&Rc<Texture>> {
        Some(&self.textures.get(id.index()?)?.asset)
    }

    pub fn model(&self, id: ModelId) -> Option<&Rc<Model>> {
        Some(&self.models.get(id.index()?)?.asset)
    }

    pub fn try_texture(&self, id: TexId) -> Result<&Rc<Texture>, AssetError> {
        self.texture(id).ok_or(AssetError::UnknownTexture(id.0))
    }

    pub fn try_model(&self, id: ModelId) -> Result<&Rc<Model>, AssetError> {
        self.model(id).ok_or(AssetError::UnknownModel(id.0))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn texture_paths(&self) -> impl Iterator<Item = &Path> {
        self.textures.iter().map(|e| e.path.as_path())
    }

    pub fn model_paths(&self) -> impl Iterator<Item = &Path> {
        self.models.iter().map(|e| e.path.as_path())
    }

    /// A new table holding only the `used` entries, in ascending old-ID
    /// order, plus the translation from old IDs to new ones. IDs not present
    /// in this table are ignored.
    pub fn compacted(&self, used: &UsedAssets) -> (AssetTable, IdRemap) {
        let mut table = AssetTable::new();
        let mut remap = IdRemap::default();
        for &id in &used.textures {
            if let Some(entry) = id.index().and_then(|i| self.textures.get(i)) {
                remap.textures.insert(id, TexId(table.textures.len() as i32));
                table.textures.push(Entry {
                    path: entry.path.clone(),
                    asset: Rc::clone(&entry.asset),
                });
            }
        }
        for &id in &used.models {
            if let Some(entry) = id.index().and_then(|i| self.models.get(i)) {
                remap.models.insert(id, ModelId(table.models.len() as i32));
                table.models.push(Entry {
                    path: entry.path.clone(),
                    asset: Rc::clone(&entry.asset),
                });
            }
        }
        (table, remap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetLoader;

    struct StubLoader;

    impl AssetLoader for StubLoader {
        fn load_texture(&self, path: &Path) -> Result<Texture, AssetError> {
            Ok(Texture { path: path.to_path_buf() })
        }

        fn load_model(&self, _path: &Path) -> Result<Model, AssetError> {
            Ok(Model::cube(2.0))
        }
    }

    #[test]
    fn get_or_add_is_idempotent() {
        let cache = AssetCache::new(StubLoader);
        let mut table = AssetTable::new();
        let a = table.get_or_add_texture(&cache, Path::new("a.png")).unwrap();
        let b = table.get_or_add_texture(&cache, Path::new("b.png")).unwrap();
        assert_eq!((a, b), (TexId(0), TexId(1)));
        assert_eq!(table.get_or_add_texture(&cache, Path::new("a.png")).unwrap(), a);
        assert_eq!(table.texture_count(), 2);
        assert_eq!(table.path_from_tex_id(b), Some(Path::new("b.png")));
        assert_eq!(table.path_from_tex_id(TexId::NONE), None);
        assert!(table.try_model(ModelId(0)).is_err());
    }

    #[test]
    fn compaction_drops_unused_and_renumbers() {
        let cache = AssetCache::new(StubLoader);
        let mut table = AssetTable::new();
        for name in ["a.png", "b.png", "c.png"] {
            table.get_or_add_texture(&cache, Path::new(name)).unwrap();
        }
        for name in ["x.obj", "y.obj"] {
            table.get_or_add_model(&cache, Path::new(name)).unwrap();
        }
        let used = UsedAssets {
            textures: [TexId(2), TexId(0)].into(),
            models: [ModelId(1)].into(),
        };
        let (compact, remap) = table.compacted(&used);
        assert_eq!(
            compact.texture_paths().collect::<Vec<_>>(),
            [Path::new("a.png"), Path::new("c.png")]
        );
        assert_eq!(remap.texture(TexId(2)), TexId(1));
        assert_eq!(remap.texture(TexId(1)), TexId::NONE);
        assert_eq!(remap.model(ModelId(1)), ModelId(0));
        assert_eq!(compact.path_from_model_id(ModelId(0)), Some(Path::new("y.obj")));
    }
}
