use super::{AssetError, Model, Texture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

/// Decodes asset files. Implemented by the host application; the engine
/// never touches image or mesh file formats itself.
pub trait AssetLoader {
    fn load_texture(&self, path: &Path) -> Result<Texture, AssetError>;
    fn load_model(&self, path: &Path) -> Result<Model, AssetError>;
}

/// Process-wide asset cache, constructed explicitly by the application and
/// shared by `Rc`.
///
/// Entries are weak: an asset stays loaded while some map's asset table (or
/// the renderer) holds a strong handle, and is reloaded on next request once
/// the last one is gone.
pub struct AssetCache {
    loader: Box<dyn AssetLoader>,
    textures: RefCell<HashMap<PathBuf, Weak<Texture>>>,
    models: RefCell<HashMap<PathBuf, Weak<Model>>>,
}

impl AssetCache {
    pub fn new(loader: impl AssetLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            textures: RefCell::new(HashMap::new()),
            models: RefCell::new(HashMap::new()),
        }
    }

    pub fn texture(&self, path: &Path) -> Result<Rc<Texture>, AssetError> {
        fetch(&self.textures, path, |p| self.loader.load_texture(p))
    }

    pub fn model(&self, path: &Path) -> Result<Rc<Model>, AssetError> {
        fetch(&self.models, path, |p| self.loader.load_model(p))
    }

    /// Forget entries whose asset has been dropped. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.live_textures() + self.live_models();
        let mut textures = self.textures.borrow_mut();
        let mut models = self.models.borrow_mut();
        let total = textures.len() + models.len();
        textures.retain(|_, weak| weak.strong_count() > 0);
        models.retain(|_, weak| weak.strong_count() > 0);
        let removed = total - textures.len() - models.len();
        if removed > 0 {
            tracing::debug!("Asset cache pruned {} dead entries ({} live)", removed, before);
        }
        removed
    }

    pub fn live_textures(&self) -> usize {
        self.textures
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn live_models(&self) -> usize {
        self.models
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

fn fetch<T, F>(
    entries: &RefCell<HashMap<PathBuf, Weak<T>>>,
    path: &Path,
    load: F,
) -> Result<Rc<T>, AssetError>
where
    F: FnOnce(&Path) -> Result<T, AssetError>,
{
    if let Some(live) = entries.borrow().get(path).and_then(Weak::upgrade) {
        return Ok(live);
    }
    let asset = Rc::new(load(path)?);
    tracing::debug!("Loaded asset {}", path.display());
    entries
        .borrow_mut()
        .insert(path.to_path_buf(), Rc::downgrade(&asset));
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingLoader {
        loads: Rc<Cell<usize>>,
    }

    impl AssetLoader for CountingLoader {
        fn load_texture(&self, path: &Path) -> Result<Texture, AssetError> {
            self.loads.set(self.loads.get() + 1);
            Ok(Texture { path: path.to_path_buf() })
        }

        fn load_model(&self, path: &Path) -> Result<Model, AssetError> {
            if path.ends_with("missing.obj") {
                return Err(AssetError::load(path, "not found"));
            }
            self.loads.set(self.loads.get() + 1);
            Ok(Model::cube(1.0))
        }
    }

    #[test]
    fn live_assets_are_shared() {
        let loads = Rc::new(Cell::new(0));
        let cache = AssetCache::new(CountingLoader { loads: loads.clone() });
        let a = cache.texture(Path::new("a.png")).unwrap();
        let b = cache.texture(Path::new("a.png")).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn dropped_assets_reload() {
        let loads = Rc::new(Cell::new(0));
        let cache = AssetCache::new(CountingLoader { loads: loads.clone() });
        drop(cache.model(Path::new("cube.obj")).unwrap());
        assert_eq!(cache.live_models(), 0);
        assert_eq!(cache.prune(), 1);
        let _again = cache.model(Path::new("cube.obj")).unwrap();
        assert_eq!(loads.get(), 2);
        assert_eq!(cache.live_models(), 1);
    }

    #[test]
    fn load_errors_propagate() {
        let cache = AssetCache::new(CountingLoader { loads: Rc::new(Cell::new(0)) });
        assert!(matches!(
            cache.model(Path::new("missing.obj")),
            Err(AssetError::Load { .. })
        ));
    }
}
