use super::{EPSILON, MergedMesh, MergedModel, Plane};
use crate::assets::{AssetTable, Mesh};
use crate::world::grid::Grid;
use crate::world::position::GridPos;
use crate::world::tile::{TexId, Tile};
use crate::world::tile_grid::tile_transform;
use glam::{Mat4, Vec2, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// A shape triangle moved into world space, remembering where it came from.
struct WorldTri {
    positions: [Vec3; 3],
    normals: [Vec3; 3],
    texcoords: [Vec2; 3],
    texture: TexId,
    mesh: usize,
    source: [u32; 3],
    plane: Option<Plane>,
}

/// Accumulates one output mesh, sharing vertices that came from the same
/// source vertex of the same cell.
#[derive(Default)]
struct MeshBuilder {
    mesh: Mesh,
    remap: HashMap<(usize, usize, u32), u32>,
}

impl MeshBuilder {
    fn push(&mut self, cell: usize, tri: &WorldTri) {
        for n in 0..3 {
            let key = (cell, tri.mesh, tri.source[n]);
            let idx = match self.remap.get(&key) {
                Some(&idx) => idx,
                None => {
                    let idx = self.mesh.positions.len() as u32;
                    self.mesh.positions.push(tri.positions[n]);
                    self.mesh.normals.push(tri.normals[n]);
                    self.mesh.texcoords.push(tri.texcoords[n]);
                    self.remap.insert(key, idx);
                    idx
                }
            };
            self.mesh.indices.push(idx);
        }
    }
}

/// Merge every occupied cell's shape into world-space meshes, one per
/// texture.
///
/// With `culling`, a triangle is dropped when it faces one of the six grid
/// axes and the neighboring cell in that direction holds a triangle on the
/// same plane, facing the other way, whose three corners all coincide with
/// this triangle's corners. Triangles on diagonal planes are never culled.
pub fn merge_tiles(grid: &Grid<Tile>, assets: &AssetTable, culling: bool) -> MergedModel {
    let start = Instant::now();
    let cells = world_triangles(grid, assets);

    let mut builders: BTreeMap<TexId, MeshBuilder> = BTreeMap::new();
    let mut culled = 0usize;
    for (cell, tris) in cells.iter().enumerate() {
        let pos = grid.unflatten(cell);
        for tri in tris {
            if culling && is_hidden(tri, pos, grid, &cells) {
                culled += 1;
                continue;
            }
            builders.entry(tri.texture).or_default().push(cell, tri);
        }
    }

    let model = MergedModel {
        meshes: builders
            .into_iter()
            .filter(|(_, b)| !b.mesh.is_empty())
            .map(|(texture, b)| MergedMesh { texture, mesh: b.mesh })
            .collect(),
    };
    tracing::debug!(
        "Merged {} triangles into {} meshes ({} culled, {:.2?})",
        model.triangle_count(),
        model.meshes.len(),
        culled,
        start.elapsed()
    );
    model
}

/// Transformed triangles for every cell, indexed by flat cell index.
fn world_triangles(grid: &Grid<Tile>, assets: &AssetTable) -> Vec<Vec<WorldTri>> {
    let mut missing = 0usize;
    let cells = grid
        .iter()
        .map(|(pos, tile)| {
            if tile.is_empty() {
                return Vec::new();
            }
            let Some(model) = assets.model(tile.shape) else {
                missing += 1;
                return Vec::new();
            };
            let transform = tile_transform(tile, grid.grid_to_world_center(pos));
            model
                .meshes
                .iter()
                .enumerate()
                .flat_map(|(mesh_idx, mesh)| {
                    transform_mesh(mesh, mesh_idx, tile.texture_for_mesh(mesh_idx), transform)
                })
                .collect()
        })
        .collect();
    if missing > 0 {
        tracing::warn!("{} tiles reference unknown shapes and were skipped", missing);
    }
    cells
}

fn transform_mesh(mesh: &Mesh, mesh_idx: usize, texture: TexId, transform: Mat4) -> Vec<WorldTri> {
    mesh.indices
        .chunks_exact(3)
        .filter(|tri| tri.iter().all(|&i| (i as usize) < mesh.vertex_count()))
        .map(|tri| {
            let source = [tri[0], tri[1], tri[2]];
            let positions = source.map(|i| transform.transform_point3(mesh.positions[i as usize]));
            let normals = source.map(|i| {
                transform
                    .transform_vector3(mesh.normal(i as usize))
                    .normalize_or_zero()
            });
            WorldTri {
                positions,
                normals,
                texcoords: source.map(|i| mesh.texcoord(i as usize)),
                texture,
                mesh: mesh_idx,
                source,
                plane: Plane::from_triangle(positions),
            }
        })
        .collect()
}

fn is_hidden(tri: &WorldTri, pos: GridPos, grid: &Grid<Tile>, cells: &[Vec<WorldTri>]) -> bool {
    let Some(plane) = tri.plane else {
        return false;
    };
    let Some(step) = plane.axis_direction() else {
        return false;
    };
    let Ok(neighbor) = grid.flat_index(pos + step) else {
        return false;
    };
    cells[neighbor].iter().any(|other| {
        other.plane.is_some_and(|p| p.is_opposite(&plane))
            && other.positions.iter().all(|p| {
                tri.positions
                    .iter()
                    .any(|q| p.abs_diff_eq(*q, EPSILON))
            })
    })
}
