//! Builds the glTF document and its binary buffer from a merged tile model
//! and the map's ents.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use ::gltf::json;
use glam::{Quat, Vec2, Vec3};
use json::accessor::{ComponentType, GenericComponentType};
use json::validation::{Checked, USize64};
use serde_json::value::RawValue;
use te3_engine::assets::AssetTable;
use te3_engine::geometry::{MergedMesh, MergedModel};
use te3_engine::world::{EntGrid, TexId};

use super::ExportOptions;
use super::glb::pad_to_4;

/// `asset.generator` of every exported document.
pub const GENERATOR: &str = concat!("te3 ", env!("CARGO_PKG_VERSION"));

/// A glTF document plus the single binary buffer its accessors point into.
pub(crate) struct SceneDocument {
    pub root: json::Root,
    pub bin: Vec<u8>,
}

impl SceneDocument {
    /// Reference the buffer from the document as a base64 data URI, for
    /// `.gltf` output.
    pub fn embed_buffer(&mut self) {
        if let Some(buffer) = self.root.buffers.first_mut() {
            buffer.uri = Some(format!(
                "data:application/octet-stream;base64,{}",
                BASE64_STANDARD.encode(&self.bin)
            ));
        }
    }
}

// ── Buffer ───────────────────────────────────────────────────────────────────

/// Appends vertex and index data to one buffer. Every view starts on a
/// 4-byte boundary, which covers the alignment of all component types used.
#[derive(Default)]
struct BufferWriter {
    bin: Vec<u8>,
    views: Vec<json::buffer::View>,
    accessors: Vec<json::Accessor>,
}

impl BufferWriter {
    fn view(&mut self, bytes: &[u8], target: json::buffer::Target) -> json::Index<json::buffer::View> {
        pad_to_4(&mut self.bin, 0);
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.views.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64(bytes.len() as u64),
            byte_offset: Some(USize64(offset as u64)),
            byte_stride: None,
            target: Some(Checked::Valid(target)),
            extensions: None,
            extras: None,
            name: None,
        });
        json::Index::new((self.views.len() - 1) as u32)
    }

    fn accessor(
        &mut self,
        view: json::Index<json::buffer::View>,
        count: usize,
        component: ComponentType,
        type_: json::accessor::Type,
        bounds: Option<(Vec3, Vec3)>,
    ) -> json::Index<json::Accessor> {
        self.accessors.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            component_type: Checked::Valid(GenericComponentType(component)),
            count: USize64(count as u64),
            extensions: None,
            extras: None,
            max: bounds.map(|(_, hi)| serde_json::json!(hi.to_array())),
            min: bounds.map(|(lo, _)| serde_json::json!(lo.to_array())),
            name: None,
            normalized: false,
            sparse: None,
            type_: Checked::Valid(type_),
        });
        json::Index::new((self.accessors.len() - 1) as u32)
    }

    fn vec3(&mut self, data: &[Vec3], bounds: Option<(Vec3, Vec3)>) -> json::Index<json::Accessor> {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_array()).flat_map(f32::to_le_bytes).collect();
        let view = self.view(&bytes, json::buffer::Target::ArrayBuffer);
        self.accessor(view, data.len(), ComponentType::F32, json::accessor::Type::Vec3, bounds)
    }

    fn vec2(&mut self, data: &[Vec2]) -> json::Index<json::Accessor> {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_array()).flat_map(f32::to_le_bytes).collect();
        let view = self.view(&bytes, json::buffer::Target::ArrayBuffer);
        self.accessor(view, data.len(), ComponentType::F32, json::accessor::Type::Vec2, None)
    }

    fn indices(&mut self, data: &[u32]) -> json::Index<json::Accessor> {
        let bytes: Vec<u8> = data.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.view(&bytes, json::buffer::Target::ElementArrayBuffer);
        self.accessor(view, data.len(), ComponentType::U32, json::accessor::Type::Scalar, None)
    }

    /// Write one merged mesh and describe it as a triangle primitive.
    fn primitive(&mut self, merged: &MergedMesh, material: json::Index<json::Material>) -> json::mesh::Primitive {
        let mesh = &merged.mesh;
        let vertices = 0..mesh.vertex_count();
        let normals: Vec<Vec3> = vertices.clone().map(|v| mesh.normal(v)).collect();
        let texcoords: Vec<Vec2> = vertices.map(|v| mesh.texcoord(v)).collect();

        let mut attributes = BTreeMap::new();
        attributes.insert(
            Checked::Valid(json::mesh::Semantic::Positions),
            self.vec3(&mesh.positions, mesh.bounds()),
        );
        attributes.insert(
            Checked::Valid(json::mesh::Semantic::TexCoords(0)),
            self.vec2(&texcoords),
        );
        attributes.insert(Checked::Valid(json::mesh::Semantic::Normals), self.vec3(&normals, None));

        json::mesh::Primitive {
            attributes,
            indices: Some(self.indices(&mesh.indices)),
            material: Some(material),
            mode: Checked::Valid(json::mesh::Mode::Triangles),
            targets: None,
            extensions: None,
            extras: None,
        }
    }
}

// ── Materials ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Materials {
    materials: Vec<json::Material>,
    images: Vec<json::Image>,
    textures: Vec<json::Texture>,
    samplers: Vec<json::texture::Sampler>,
}

impl Materials {
    /// One material per texture. Untextured tiles get a plain white material.
    fn add(&mut self, texture: TexId, assets: &AssetTable, uris: &UriBase) -> Result<(json::Index<json::Material>, String)> {
        let path = assets.path_from_tex_id(texture);
        let name = path
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untextured".into());

        let base_color_texture = match path {
            Some(path) => {
                if self.samplers.is_empty() {
                    self.samplers.push(json::texture::Sampler {
                        mag_filter: Some(Checked::Valid(json::texture::MagFilter::Linear)),
                        min_filter: Some(Checked::Valid(json::texture::MinFilter::LinearMipmapLinear)),
                        wrap_s: Checked::Valid(json::texture::WrappingMode::Repeat),
                        wrap_t: Checked::Valid(json::texture::WrappingMode::Repeat),
                        name: None,
                        extensions: None,
                        extras: None,
                    });
                }
                self.images.push(json::Image {
                    buffer_view: None,
                    mime_type: None,
                    uri: Some(uris.uri_for(path)?),
                    name: Some(name.clone()),
                    extensions: None,
                    extras: None,
                });
                self.textures.push(json::Texture {
                    sampler: Some(json::Index::new(0)),
                    source: json::Index::new((self.images.len() - 1) as u32),
                    name: Some(name.clone()),
                    extensions: None,
                    extras: None,
                });
                Some(json::texture::Info {
                    index: json::Index::new((self.textures.len() - 1) as u32),
                    tex_coord: 0,
                    extensions: None,
                    extras: None,
                })
            }
            None => None,
        };

        self.materials.push(json::Material {
            alpha_cutoff: None,
            alpha_mode: Checked::Valid(json::material::AlphaMode::Opaque),
            double_sided: false,
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor([1.0, 1.0, 1.0, 1.0]),
                base_color_texture,
                metallic_factor: json::material::StrengthFactor(0.0),
                roughness_factor: json::material::StrengthFactor(1.0),
                metallic_roughness_texture: None,
                extensions: None,
                extras: None,
            },
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: json::material::EmissiveFactor([0.0, 0.0, 0.0]),
            extensions: None,
            extras: None,
            name: Some(name.clone()),
        });
        Ok((json::Index::new((self.materials.len() - 1) as u32), name))
    }
}

// ── Image URIs ───────────────────────────────────────────────────────────────

/// Turns texture paths from the asset table into URIs relative to the
/// output file's directory.
struct UriBase {
    asset_root: PathBuf,
    out_dir: PathBuf,
}

impl UriBase {
    fn new(asset_root: &Path, out_dir: &Path) -> Result<Self> {
        Ok(Self {
            asset_root: std::path::absolute(asset_root)
                .with_context(|| format!("resolving {}", asset_root.display()))?,
            out_dir: std::path::absolute(out_dir).with_context(|| format!("resolving {}", out_dir.display()))?,
        })
    }

    fn uri_for(&self, texture: &Path) -> Result<String> {
        let target = self.asset_root.join(texture);
        Ok(relative_uri(&normalize(&target), &normalize(&self.out_dir)))
    }
}

/// Resolve `.` and `..` lexically.
fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn relative_uri(target: &[Component<'_>], base: &[Component<'_>]) -> String {
    let common = target.iter().zip(base).take_while(|(a, b)| a == b).count();
    let part = |c: &Component<'_>| c.as_os_str().to_string_lossy().replace(' ', "%20");
    if common == 0 {
        // different roots (another drive): keep the absolute path
        let path: PathBuf = target.iter().collect();
        return path.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    }
    base[common..]
        .iter()
        .map(|_| "..".to_string())
        .chain(target[common..].iter().map(part))
        .collect::<Vec<_>>()
        .join("/")
}

// ── Document ─────────────────────────────────────────────────────────────────

/// Build the export document. `out_dir` is where the file will be written;
/// image URIs are relative to it.
pub(crate) fn build_scene(
    model: &MergedModel,
    ents: &EntGrid,
    assets: &AssetTable,
    options: &ExportOptions,
    out_dir: &Path,
) -> Result<SceneDocument> {
    let uris = UriBase::new(&options.asset_root, out_dir)?;
    let mut writer = BufferWriter::default();
    let mut materials = Materials::default();
    let mut meshes = Vec::new();
    let mut nodes = Vec::new();
    let mut map_children = Vec::new();

    if !model.is_empty() {
        let mut primitives = Vec::new();
        for merged in &model.meshes {
            let (material, name) = materials.add(merged.texture, assets, &uris)?;
            primitives.push((name, writer.primitive(merged, material)));
        }

        if options.separate_geometry {
            let mut children = Vec::new();
            for (name, primitive) in primitives {
                meshes.push(json::Mesh {
                    name: Some(name.clone()),
                    primitives: vec![primitive],
                    weights: None,
                    extensions: None,
                    extras: None,
                });
                nodes.push(json::Node {
                    name: Some(name),
                    mesh: Some(json::Index::new((meshes.len() - 1) as u32)),
                    ..Default::default()
                });
                children.push(json::Index::new((nodes.len() - 1) as u32));
            }
            nodes.push(json::Node {
                name: Some("tiles".into()),
                children: Some(children),
                ..Default::default()
            });
        } else {
            meshes.push(json::Mesh {
                name: Some("tiles".into()),
                primitives: primitives.into_iter().map(|(_, p)| p).collect(),
                weights: None,
                extensions: None,
                extras: None,
            });
            nodes.push(json::Node {
                name: Some("tiles".into()),
                mesh: Some(json::Index::new(0)),
                ..Default::default()
            });
        }
        map_children.push(json::Index::new((nodes.len() - 1) as u32));
    }

    for (n, (_, ent)) in ents.iter().enumerate() {
        let rotation = Quat::from_rotation_y(ent.yaw.to_radians()) * Quat::from_rotation_x(ent.pitch.to_radians());
        let properties = serde_json::to_string(&ent.properties).context("serializing ent properties")?;
        nodes.push(json::Node {
            name: Some(format!("ent{}", n)),
            translation: Some(ent.position.to_array()),
            rotation: Some(json::scene::UnitQuaternion(rotation.to_array())),
            extras: Some(RawValue::from_string(properties)?),
            ..Default::default()
        });
        map_children.push(json::Index::new((nodes.len() - 1) as u32));
    }

    nodes.push(json::Node {
        name: Some("map".into()),
        children: if map_children.is_empty() { None } else { Some(map_children) },
        ..Default::default()
    });
    let root_node = json::Index::new((nodes.len() - 1) as u32);

    let BufferWriter { mut bin, views, accessors } = writer;
    pad_to_4(&mut bin, 0);
    let buffers = if bin.is_empty() {
        Vec::new()
    } else {
        vec![json::Buffer {
            byte_length: USize64(bin.len() as u64),
            extensions: None,
            extras: None,
            name: None,
            uri: None,
        }]
    };

    let Materials { materials, images, textures, samplers } = materials;
    let root = json::Root {
        asset: json::Asset {
            version: "2.0".to_string(),
            generator: Some(GENERATOR.to_string()),
            ..Default::default()
        },
        nodes,
        scenes: vec![json::Scene {
            nodes: vec![root_node],
            name: Some("map".into()),
            extensions: None,
            extras: None,
        }],
        scene: Some(json::Index::new(0)),
        accessors,
        buffers,
        buffer_views: views,
        meshes,
        materials,
        images,
        textures,
        samplers,
        ..Default::default()
    };
    Ok(SceneDocument { root, bin })
}

#[cfg(test)]
mod tests {
    use super::*;
    use te3_engine::world::{Ent, Extent, GridPos};

    fn uri(target: &str, base: &str) -> String {
        relative_uri(&normalize(Path::new(target)), &normalize(Path::new(base)))
    }

    #[test]
    fn test_relative_uris() {
        assert_eq!(uri("/maps/tex/a.png", "/maps"), "tex/a.png");
        assert_eq!(uri("/maps/tex/a.png", "/maps/out/gltf"), "../../tex/a.png");
        assert_eq!(uri("/maps/./tex/../tex/my wall.png", "/maps/tex"), "my%20wall.png");
    }

    fn cube_model() -> MergedModel {
        let mesh = te3_engine::assets::Model::cube(2.0).meshes.remove(0);
        MergedModel {
            meshes: vec![
                MergedMesh { texture: TexId(0), mesh: mesh.clone() },
                MergedMesh { texture: TexId(1), mesh },
            ],
        }
    }

    #[test]
    fn test_views_are_aligned() {
        let doc = build_scene(
            &cube_model(),
            &EntGrid::new(Extent::new(1, 1, 1), 2.0),
            &AssetTable::new(),
            &ExportOptions::default(),
            Path::new("."),
        )
        .unwrap();
        assert_eq!(doc.root.buffer_views.len(), 8);
        for view in &doc.root.buffer_views {
            let offset = view.byte_offset.as_ref().unwrap().0 as usize;
            assert_eq!(offset % 4, 0);
            assert!(offset + view.byte_length.0 as usize <= doc.bin.len());
        }
        assert_eq!(doc.bin.len() % 4, 0);
        assert_eq!(doc.root.buffers[0].byte_length.0 as usize, doc.bin.len());
        assert_eq!(doc.root.meshes.len(), 1);
        assert_eq!(doc.root.meshes[0].primitives.len(), 2);
        // no asset table paths, so no images
        assert!(doc.root.images.is_empty());
        assert_eq!(doc.root.materials.len(), 2);
    }

    #[test]
    fn test_separate_geometry_splits_meshes() {
        let options = ExportOptions {
            separate_geometry: true,
            ..ExportOptions::default()
        };
        let doc = build_scene(
            &cube_model(),
            &EntGrid::new(Extent::new(1, 1, 1), 2.0),
            &AssetTable::new(),
            &options,
            Path::new("."),
        )
        .unwrap();
        assert_eq!(doc.root.meshes.len(), 2);
        assert!(doc.root.meshes.iter().all(|m| m.primitives.len() == 1));
        let tiles = doc.root.nodes.iter().find(|n| n.name.as_deref() == Some("tiles")).unwrap();
        assert_eq!(tiles.children.as_ref().unwrap().len(), 2);
        assert!(tiles.mesh.is_none());
    }

    #[test]
    fn test_empty_map_has_no_buffers() {
        let mut ents = EntGrid::new(Extent::new(2, 1, 1), 2.0);
        ents.add_ent(GridPos::new(1, 0, 0), Ent::default().with_property("spawn", "1").with_angles(90.0, 0.0));
        let mut doc = build_scene(
            &MergedModel::default(),
            &ents,
            &AssetTable::new(),
            &ExportOptions::default(),
            Path::new("."),
        )
        .unwrap();
        doc.embed_buffer();
        assert!(doc.root.buffers.is_empty());
        assert!(doc.root.meshes.is_empty());
        assert!(doc.bin.is_empty());

        let ent = &doc.root.nodes[0];
        assert_eq!(ent.name.as_deref(), Some("ent0"));
        assert_eq!(ent.translation, Some([3.0, 1.0, 1.0]));
        let extras: serde_json::Value = serde_json::from_str(ent.extras.as_ref().unwrap().get()).unwrap();
        assert_eq!(extras, serde_json::json!({"spawn": "1"}));
        let [_, y, _, w] = ent.rotation.as_ref().unwrap().0;
        assert!((y - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((w - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }
}
