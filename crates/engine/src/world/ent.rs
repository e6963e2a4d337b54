use super::tile::{ModelId, TexId};
use crate::assets::{IdRemap, UsedAssets};
use glam::{Mat4, Vec3};
use indexmap::IndexMap;

/// How an ent is drawn in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Display {
    #[default]
    Sphere,
    Model { model: ModelId, texture: TexId },
    Sprite { texture: TexId },
}

/// A point entity occupying one cell of an [`EntGrid`](super::ent_grid::EntGrid).
///
/// `position` is denormalized: the grid owning the ent keeps it at the
/// center of the ent's cell. Angles are in degrees with no range limit.
/// `properties` are inert strings interpreted by downstream tools, kept in
/// insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Ent {
    pub display: Display,
    pub color: [u8; 3],
    pub radius: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub position: Vec3,
    pub properties: IndexMap<String, String>,
}

impl Default for Ent {
    fn default() -> Self {
        Self {
            display: Display::Sphere,
            color: [255, 255, 255],
            radius: 0.5,
            yaw: 0.0,
            pitch: 0.0,
            position: Vec3::ZERO,
            properties: IndexMap::new(),
        }
    }
}

impl Ent {
    pub fn sphere(color: [u8; 3], radius: f32) -> Self {
        Self { color, radius, ..Self::default() }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_angles(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// World transform: pitch, then yaw, then translation to `position`.
    pub fn transform(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_y(self.yaw.to_radians())
            * Mat4::from_rotation_x(self.pitch.to_radians())
    }

    pub fn model_id(&self) -> Option<ModelId> {
        match self.display {
            Display::Model { model, .. } if model.is_some() => Some(model),
            _ => None,
        }
    }

    pub fn texture_id(&self) -> Option<TexId> {
        match self.display {
            Display::Model { texture, .. } | Display::Sprite { texture } if texture.is_some() => {
                Some(texture)
            }
            _ => None,
        }
    }

    pub(crate) fn collect_asset_ids(&self, used: &mut UsedAssets) {
        used.models.extend(self.model_id());
        used.textures.extend(self.texture_id());
    }

    pub(crate) fn remap_assets(&mut self, remap: &IdRemap) {
        self.display = match self.display {
            Display::Sphere => Display::Sphere,
            Display::Model { model, texture } => Display::Model {
                model: remap.model(model),
                texture: remap.texture(texture),
            },
            Display::Sprite { texture } => Display::Sprite { texture: remap.texture(texture) },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_places_and_turns() {
        let mut ent = Ent::sphere([255, 0, 0], 1.0).with_angles(90.0, 0.0);
        ent.position = Vec3::new(1.0, 2.0, 3.0);
        let m = ent.transform();
        assert!(m.transform_point3(Vec3::ZERO).abs_diff_eq(ent.position, 1e-5));
        assert!(m.transform_vector3(Vec3::X).abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn asset_ids_follow_display() {
        let mut used = UsedAssets::default();
        Ent::default().collect_asset_ids(&mut used);
        assert_eq!(used, UsedAssets::default());

        let sprite = Ent {
            display: Display::Sprite { texture: TexId(4) },
            ..Ent::default()
        };
        sprite.collect_asset_ids(&mut used);
        assert!(used.textures.contains(&TexId(4)));
        assert!(used.models.is_empty());
    }

    #[test]
    fn properties_keep_insertion_order() {
        let ent = Ent::default()
            .with_property("zeta", "1")
            .with_property("alpha", "2");
        let keys: Vec<&str> = ent.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }
}
