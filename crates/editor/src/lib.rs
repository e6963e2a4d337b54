//! The te3 level editor's map manager and file formats: `.te3` save files,
//! legacy `.ti` import and glTF/GLB export, on top of `te3_engine`.

pub mod export;
pub mod legacy;
pub mod loader;
pub mod map_man;
pub mod persistence;
pub mod settings;
