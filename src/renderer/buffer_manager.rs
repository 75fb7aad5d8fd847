//! GPU Buffer Manager
//!
//! Owns the device buffers of every geometry referenced by a rendered node.
//!
//! # Lifecycle
//!
//! 1. **First reference** ([`GpuBufferManager::init_object`]): the geometry is
//!    partitioned into groups and each group gets a position buffer plus the
//!    optional streams the referencing material needs. The geometry is then
//!    flagged fully dirty.
//! 2. **Per frame** ([`GpuBufferManager::update_object`]): each dirty flag
//!    repacks and re-uploads only its own stream. Flags are cleared once every
//!    group of the geometry has been updated.
//! 3. **Release** ([`GpuBufferManager::release`]): explicit, on
//!    `deallocate_geometry`. Nothing is collected automatically.

use glam::{Mat4, Vec2, Vec3, Vec4};
use log::{debug, warn};
use slotmap::SecondaryMap;

use crate::assets::{AssetStorage, Assets, GeometryHandle, MaterialHandle};
use crate::errors::Result;
use crate::renderer::device::{BufferObject, BufferTarget, BufferUsage, GraphicsDevice};
use crate::renderer::geometry_group::{
    AttributeNeeds, CustomBuffer, GeometryGroup, GroupBuffers, Staging,
};
use crate::renderer::info::RenderInfo;
use crate::renderer::partition::{partition_faces, whole_geometry_group};
use crate::resources::{
    AttributeBinding, CustomAttribute, DirtyFlags, Face3, Geometry, Material, VertexColors,
};
use crate::scene::{Node, NodeKind};

/// Device-side state of one geometry.
#[derive(Debug, Default)]
pub struct GpuGeometry {
    pub groups: Vec<GeometryGroup>,
}

#[derive(Default)]
pub struct GpuBufferManager {
    geometries: SecondaryMap<GeometryHandle, GpuGeometry>,
}

impl GpuBufferManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, geometry: GeometryHandle) -> bool {
        self.geometries.contains_key(geometry)
    }

    /// Groups of an initialized geometry, empty otherwise.
    #[must_use]
    pub fn groups(&self, geometry: GeometryHandle) -> &[GeometryGroup] {
        self.geometries
            .get(geometry)
            .map_or(&[], |g| g.groups.as_slice())
    }

    #[must_use]
    pub fn group(&self, geometry: GeometryHandle, index: usize) -> Option<&GeometryGroup> {
        self.geometries.get(geometry)?.groups.get(index)
    }

    // ========================================================================
    // First reference
    // ========================================================================

    /// Partitions and allocates buffers for the node's geometry unless that
    /// geometry already has them. Returns whether anything was allocated.
    pub fn init_object(
        &mut self,
        device: &mut impl GraphicsDevice,
        node: &Node,
        assets: &mut Assets,
        info: &mut RenderInfo,
    ) -> Result<bool> {
        let Some(handle) = node.kind.geometry() else {
            return Ok(false);
        };
        if self.geometries.contains_key(handle) {
            return Ok(false);
        }
        let Some(geometry) = assets.geometries.get(handle) else {
            warn!("Node '{}' references a missing geometry", node.name);
            return Ok(false);
        };

        let mut groups = match &node.kind {
            NodeKind::Mesh(_) => partition_faces(geometry, node.kind.uses_face_materials()),
            NodeKind::Line(_) | NodeKind::ParticleSystem(_) => vec![whole_geometry_group(geometry)],
            _ => return Ok(false),
        };

        for group in &mut groups {
            let material = node
                .kind
                .material_for_group(group.material_index)
                .and_then(|h| assets.materials.get(h));
            let needs = attribute_needs(&node.kind, geometry, material);
            let is_mesh = matches!(node.kind, NodeKind::Mesh(_));
            group.buffers = Some(allocate_group(device, geometry, needs, is_mesh)?);
        }

        debug!(
            "Allocated {} geometry group(s) for node '{}'",
            groups.len(),
            node.name
        );

        if let Some(geometry) = assets.geometries.get_mut(handle) {
            geometry.mark_dirty(DirtyFlags::all());
            for attribute in &mut geometry.custom_attributes {
                attribute.needs_update = true;
            }
        }

        self.geometries.insert(handle, GpuGeometry { groups });
        info.memory.geometries += 1;
        Ok(true)
    }

    // ========================================================================
    // Per-frame update
    // ========================================================================

    /// Repacks and uploads whatever changed in the node's geometry.
    ///
    /// Sorted particle systems are re-sorted back to front with
    /// `model_view_projection` and fully re-uploaded every call.
    pub fn update_object(
        &mut self,
        device: &mut impl GraphicsDevice,
        node: &Node,
        assets: &mut Assets,
        model_view_projection: &Mat4,
    ) {
        let Some(handle) = node.kind.geometry() else {
            return;
        };
        let Some(gpu) = self.geometries.get_mut(handle) else {
            return;
        };
        let Assets {
            geometries,
            materials,
            ..
        } = assets;
        let Some(geometry) = geometries.get_mut(handle) else {
            return;
        };

        let dirty = geometry.dirty();
        let custom_dirty = geometry.custom_attributes_dirty();

        match &node.kind {
            NodeKind::Mesh(mesh) => {
                if dirty.is_empty() && !custom_dirty {
                    return;
                }
                for group in &mut gpu.groups {
                    let Some(material) = resolve(materials, mesh.material.resolve(group.material_index))
                    else {
                        continue;
                    };
                    pack_mesh_group(device, geometry, group, material, dirty);
                }
            }
            NodeKind::Line(_) => {
                if dirty.is_empty() && !custom_dirty {
                    return;
                }
                for group in &mut gpu.groups {
                    pack_vertex_group(device, geometry, group, dirty, None);
                }
            }
            NodeKind::ParticleSystem(ps) => {
                if ps.sort_particles {
                    let order = back_to_front(geometry, model_view_projection);
                    for group in &mut gpu.groups {
                        pack_vertex_group(device, geometry, group, DirtyFlags::all(), Some(&order));
                    }
                } else {
                    if dirty.is_empty() && !custom_dirty {
                        return;
                    }
                    for group in &mut gpu.groups {
                        pack_vertex_group(device, geometry, group, dirty, None);
                    }
                }
            }
            _ => return,
        }

        geometry.clear_dirty();
        geometry.clear_custom_attributes();
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Deletes every buffer of `geometry`. Returns `false` if it had none.
    pub fn release(
        &mut self,
        device: &mut impl GraphicsDevice,
        geometry: GeometryHandle,
        info: &mut RenderInfo,
    ) -> bool {
        let Some(gpu) = self.geometries.remove(geometry) else {
            return false;
        };
        for buffers in gpu.groups.iter().filter_map(GeometryGroup::buffers) {
            for buffer in buffers.all_buffers() {
                device.delete_buffer(buffer);
            }
        }
        info.memory.geometries = info.memory.geometries.saturating_sub(1);
        true
    }
}

fn resolve(
    materials: &AssetStorage<MaterialHandle, Material>,
    handle: Option<MaterialHandle>,
) -> Option<&Material> {
    materials.get(handle?)
}

fn attribute_needs(kind: &NodeKind, geometry: &Geometry, material: Option<&Material>) -> AttributeNeeds {
    match (kind, material) {
        (NodeKind::Mesh(mesh), Some(material)) => {
            AttributeNeeds::for_mesh(geometry, material, mesh.skeleton.is_some())
        }
        (NodeKind::Line(_), Some(material)) => AttributeNeeds::for_line(geometry, material),
        (NodeKind::ParticleSystem(_), _) => AttributeNeeds::for_particles(geometry),
        _ => AttributeNeeds::default(),
    }
}

fn optional_buffer(device: &mut impl GraphicsDevice, wanted: bool) -> Result<Option<BufferObject>> {
    if wanted {
        device.create_buffer().map(Some)
    } else {
        Ok(None)
    }
}

fn allocate_group(
    device: &mut impl GraphicsDevice,
    geometry: &Geometry,
    needs: AttributeNeeds,
    is_mesh: bool,
) -> Result<GroupBuffers> {
    let position = device.create_buffer()?;

    let morph_target_count = if needs.morph_targets {
        geometry.morph_targets.len()
    } else {
        0
    };
    let morph_normal_count = if needs.morph_normals {
        geometry.morph_normals.len()
    } else {
        0
    };

    let mut morph_targets = Vec::with_capacity(morph_target_count);
    for _ in 0..morph_target_count {
        morph_targets.push(device.create_buffer()?);
    }
    let mut morph_normals = Vec::with_capacity(morph_normal_count);
    for _ in 0..morph_normal_count {
        morph_normals.push(device.create_buffer()?);
    }

    let mut custom = Vec::with_capacity(geometry.custom_attributes.len());
    for attribute in &geometry.custom_attributes {
        custom.push(CustomBuffer {
            name: attribute.name.clone(),
            item_size: attribute.item_size,
            buffer: device.create_buffer()?,
        });
    }

    Ok(GroupBuffers {
        needs,
        position,
        normal: optional_buffer(device, needs.normals)?,
        tangent: optional_buffer(device, needs.tangents)?,
        color: optional_buffer(device, needs.colors)?,
        uv: optional_buffer(device, needs.uvs)?,
        uv2: optional_buffer(device, needs.uv2s)?,
        skin_index: optional_buffer(device, needs.skinning)?,
        skin_weight: optional_buffer(device, needs.skinning)?,
        line_distance: optional_buffer(device, needs.line_distances)?,
        morph_targets,
        morph_normals,
        custom,
        faces: optional_buffer(device, is_mesh)?,
        lines: optional_buffer(device, is_mesh)?,
        face_index_count: 0,
        line_index_count: 0,
        staging: Staging::default(),
    })
}

// ============================================================================
// Packing
// ============================================================================

fn usage_for(geometry: &Geometry) -> BufferUsage {
    if geometry.dynamic {
        BufferUsage::Dynamic
    } else {
        BufferUsage::Static
    }
}

fn upload_floats(
    device: &mut impl GraphicsDevice,
    buffer: BufferObject,
    data: &[f32],
    usage: BufferUsage,
) {
    device.bind_buffer(BufferTarget::Array, Some(buffer));
    device.buffer_data(BufferTarget::Array, bytemuck::cast_slice(data), usage);
}

fn upload_indices(
    device: &mut impl GraphicsDevice,
    buffer: BufferObject,
    data: &[u16],
    usage: BufferUsage,
) {
    device.bind_buffer(BufferTarget::ElementArray, Some(buffer));
    device.buffer_data(BufferTarget::ElementArray, bytemuck::cast_slice(data), usage);
}

/// Appends one item of `attribute` padded to its item size.
fn push_item(out: &mut Vec<f32>, attribute: &CustomAttribute, index: usize) {
    let mut item = [0.0_f32; 4];
    attribute.read_item(index, &mut item);
    out.extend_from_slice(&item[..attribute.item_size as usize]);
}

fn pack_mesh_group(
    device: &mut impl GraphicsDevice,
    geometry: &Geometry,
    group: &mut GeometryGroup,
    material: &Material,
    dirty: DirtyFlags,
) {
    let usage = usage_for(geometry);
    let Some(buffers) = group.buffers.as_mut() else {
        return;
    };

    let faces: Vec<(usize, &Face3)> = group
        .faces
        .iter()
        .filter_map(|&i| geometry.faces.get(i as usize).map(|f| (i as usize, f)))
        .collect();
    let corner_count = faces.len() * 3;
    let vertex = |i: u32| geometry.vertices.get(i as usize).copied().unwrap_or(Vec3::ZERO);
    let staging = &mut buffers.staging;

    if dirty.contains(DirtyFlags::VERTICES) {
        let out = &mut staging.positions;
        out.clear();
        out.reserve(corner_count * 3);
        for (_, face) in &faces {
            for i in face.indices() {
                out.extend_from_slice(&vertex(i).to_array());
            }
        }
        upload_floats(device, buffers.position, out, usage);

        if let (Some(index_buffer), Some(weight_buffer)) = (buffers.skin_index, buffers.skin_weight) {
            let skin = |list: &[Vec4], i: u32| list.get(i as usize).copied().unwrap_or(Vec4::ZERO);
            staging.skin_indices.clear();
            staging.skin_weights.clear();
            for (_, face) in &faces {
                for i in face.indices() {
                    staging
                        .skin_indices
                        .extend_from_slice(&skin(&geometry.skin_indices, i).to_array());
                    staging
                        .skin_weights
                        .extend_from_slice(&skin(&geometry.skin_weights, i).to_array());
                }
            }
            upload_floats(device, index_buffer, &staging.skin_indices, usage);
            upload_floats(device, weight_buffer, &staging.skin_weights, usage);
        }
    }

    if dirty.contains(DirtyFlags::NORMALS)
        && let Some(buffer) = buffers.normal
    {
        let flat = material.needs_flat_normals();
        let out = &mut staging.normals;
        out.clear();
        for (_, face) in &faces {
            let corners = match face.vertex_normals {
                Some(normals) if !flat => normals,
                _ => [face.normal; 3],
            };
            for n in corners {
                out.extend_from_slice(&n.to_array());
            }
        }
        upload_floats(device, buffer, out, usage);
    }

    if dirty.contains(DirtyFlags::TANGENTS)
        && let Some(buffer) = buffers.tangent
    {
        let out = &mut staging.tangents;
        out.clear();
        for (_, face) in &faces {
            for t in face.vertex_tangents.unwrap_or([Vec4::ZERO; 3]) {
                out.extend_from_slice(&t.to_array());
            }
        }
        upload_floats(device, buffer, out, usage);
    }

    if dirty.contains(DirtyFlags::COLORS)
        && let Some(buffer) = buffers.color
    {
        let out = &mut staging.colors;
        out.clear();
        for (_, face) in &faces {
            let corners = match (material.vertex_colors, face.vertex_colors) {
                (VertexColors::Vertex, Some(colors)) => colors,
                _ => [face.color; 3],
            };
            for c in corners {
                out.extend_from_slice(&c.to_array());
            }
        }
        upload_floats(device, buffer, out, usage);
    }

    if dirty.contains(DirtyFlags::UVS) {
        for (layer, buffer, out) in [
            (0, buffers.uv, &mut staging.uvs),
            (1, buffers.uv2, &mut staging.uv2s),
        ] {
            let Some(buffer) = buffer else {
                continue;
            };
            out.clear();
            for (face_index, _) in &faces {
                let uvs = geometry.face_vertex_uvs[layer]
                    .get(*face_index)
                    .copied()
                    .unwrap_or([Vec2::ZERO; 3]);
                for uv in uvs {
                    out.extend_from_slice(&uv.to_array());
                }
            }
            upload_floats(device, buffer, out, usage);
        }
    }

    if dirty.contains(DirtyFlags::MORPH_TARGETS) {
        staging
            .morph_targets
            .resize_with(buffers.morph_targets.len(), Vec::new);
        for (t, (&buffer, out)) in buffers
            .morph_targets
            .iter()
            .zip(staging.morph_targets.iter_mut())
            .enumerate()
        {
            let target = geometry.morph_targets.get(t);
            out.clear();
            for (_, face) in &faces {
                for i in face.indices() {
                    let v = target
                        .and_then(|m| m.vertices.get(i as usize).copied())
                        .unwrap_or_else(|| vertex(i));
                    out.extend_from_slice(&v.to_array());
                }
            }
            upload_floats(device, buffer, out, usage);
        }
    }

    if dirty.intersects(DirtyFlags::MORPH_TARGETS | DirtyFlags::NORMALS) {
        let flat = material.needs_flat_normals();
        staging
            .morph_normals
            .resize_with(buffers.morph_normals.len(), Vec::new);
        for (t, (&buffer, out)) in buffers
            .morph_normals
            .iter()
            .zip(staging.morph_normals.iter_mut())
            .enumerate()
        {
            let normals = geometry.morph_normals.get(t);
            out.clear();
            for (face_index, face) in &faces {
                let corners = normals
                    .and_then(|m| {
                        if flat {
                            m.face_normals.get(*face_index).map(|n| [*n; 3])
                        } else {
                            m.vertex_normals.get(*face_index).copied()
                        }
                    })
                    .unwrap_or([face.normal; 3]);
                for n in corners {
                    out.extend_from_slice(&n.to_array());
                }
            }
            upload_floats(device, buffer, out, usage);
        }
    }

    if dirty.contains(DirtyFlags::ELEMENTS) {
        let face_count = faces.len() as u16;
        staging.faces.clear();
        staging.lines.clear();
        for f in 0..face_count {
            let base = f * 3;
            staging.faces.extend_from_slice(&[base, base + 1, base + 2]);
            staging
                .lines
                .extend_from_slice(&[base, base + 1, base, base + 2, base + 1, base + 2]);
        }
        if let Some(buffer) = buffers.faces {
            upload_indices(device, buffer, &staging.faces, usage);
            buffers.face_index_count = staging.faces.len() as u32;
        }
        if let Some(buffer) = buffers.lines {
            upload_indices(device, buffer, &staging.lines, usage);
            buffers.line_index_count = staging.lines.len() as u32;
        }
    }

    staging.custom.resize_with(buffers.custom.len(), Vec::new);
    for (custom, out) in buffers.custom.iter().zip(staging.custom.iter_mut()) {
        let Some(attribute) = geometry.custom_attribute(&custom.name) else {
            continue;
        };
        if !attribute.needs_update {
            continue;
        }
        out.clear();
        for (face_index, face) in &faces {
            for (corner, i) in face.indices().into_iter().enumerate() {
                let item = match attribute.binding {
                    AttributeBinding::Vertices => i as usize,
                    AttributeBinding::Faces => *face_index,
                    AttributeBinding::FaceVertices => face_index * 3 + corner,
                };
                push_item(out, attribute, item);
            }
        }
        upload_floats(device, custom.buffer, out, usage);
    }

    if !geometry.dynamic {
        *staging = Staging::default();
    }
}

/// Vertex indices sorted by projected depth, farthest first.
fn back_to_front(geometry: &Geometry, model_view_projection: &Mat4) -> Vec<usize> {
    let mut depths: Vec<(f32, usize)> = geometry
        .vertices
        .iter()
        .enumerate()
        .map(|(i, v)| (model_view_projection.project_point3(*v).z, i))
        .collect();
    depths.sort_by(|a, b| b.0.total_cmp(&a.0));
    depths.into_iter().map(|(_, i)| i).collect()
}

/// Packs a line or particle group. With `order`, every stream is written in
/// that vertex order and re-uploaded.
fn pack_vertex_group(
    device: &mut impl GraphicsDevice,
    geometry: &Geometry,
    group: &mut GeometryGroup,
    dirty: DirtyFlags,
    order: Option<&[usize]>,
) {
    let sorted = order.is_some();
    let usage = if sorted {
        BufferUsage::Dynamic
    } else {
        usage_for(geometry)
    };
    let identity: Vec<usize>;
    let order = if let Some(order) = order {
        order
    } else {
        identity = (0..geometry.vertices.len()).collect();
        &identity
    };

    if dirty.contains(DirtyFlags::VERTICES) {
        group.vertex_count = geometry.vertices.len() as u32;
    }
    let Some(buffers) = group.buffers.as_mut() else {
        return;
    };
    let staging = &mut buffers.staging;

    if dirty.contains(DirtyFlags::VERTICES) {
        staging.positions.clear();
        for &i in order {
            staging
                .positions
                .extend_from_slice(&geometry.vertices[i].to_array());
        }
        upload_floats(device, buffers.position, &staging.positions, usage);
    }

    if dirty.contains(DirtyFlags::COLORS)
        && let Some(buffer) = buffers.color
    {
        staging.colors.clear();
        for &i in order {
            let c = geometry.colors.get(i).copied().unwrap_or(Vec3::ONE);
            staging.colors.extend_from_slice(&c.to_array());
        }
        upload_floats(device, buffer, &staging.colors, usage);
    }

    if dirty.contains(DirtyFlags::LINE_DISTANCES)
        && let Some(buffer) = buffers.line_distance
    {
        staging.line_distances.clear();
        staging.line_distances.extend(
            order
                .iter()
                .map(|&i| geometry.line_distances.get(i).copied().unwrap_or(0.0)),
        );
        upload_floats(device, buffer, &staging.line_distances, usage);
    }

    staging.custom.resize_with(buffers.custom.len(), Vec::new);
    for (custom, out) in buffers.custom.iter().zip(staging.custom.iter_mut()) {
        let Some(attribute) = geometry.custom_attribute(&custom.name) else {
            continue;
        };
        if !(sorted || attribute.needs_update) {
            continue;
        }
        out.clear();
        for &i in order {
            push_item(out, attribute, i);
        }
        upload_floats(device, custom.buffer, out, usage);
    }

    if !(geometry.dynamic || sorted) {
        *staging = Staging::default();
    }
}
