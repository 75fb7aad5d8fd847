//! Geometry Groups
//!
//! A [`GeometryGroup`] is the unit the renderer uploads and draws: a subset of
//! a geometry's faces sharing one material index, small enough to be indexed
//! with `u16`. Lines and particle systems use a single group spanning every
//! vertex.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::renderer::device::BufferObject;
use crate::resources::{Geometry, Material};

static NEXT_GROUP_ID: AtomicU32 = AtomicU32::new(1);

/// Which optional vertex streams were allocated for a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AttributeNeeds {
    pub normals: bool,
    pub tangents: bool,
    pub colors: bool,
    pub uvs: bool,
    pub uv2s: bool,
    pub skinning: bool,
    pub morph_targets: bool,
    pub morph_normals: bool,
    pub line_distances: bool,
}

impl AttributeNeeds {
    /// Streams a mesh group needs for `material`, limited to data the
    /// geometry actually has.
    #[must_use]
    pub fn for_mesh(geometry: &Geometry, material: &Material, skinned: bool) -> Self {
        Self {
            normals: material.needs_normals(),
            tangents: geometry.has_tangents,
            colors: material.needs_colors(),
            uvs: material.needs_uvs() && !geometry.face_vertex_uvs[0].is_empty(),
            uv2s: material.needs_uvs() && !geometry.face_vertex_uvs[1].is_empty(),
            skinning: skinned
                && !geometry.skin_indices.is_empty()
                && !geometry.skin_weights.is_empty(),
            morph_targets: material.morph_targets && !geometry.morph_targets.is_empty(),
            morph_normals: material.morph_normals && !geometry.morph_normals.is_empty(),
            line_distances: false,
        }
    }

    #[must_use]
    pub fn for_line(geometry: &Geometry, material: &Material) -> Self {
        Self {
            colors: !geometry.colors.is_empty(),
            line_distances: material.needs_line_distances(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_particles(geometry: &Geometry) -> Self {
        Self {
            colors: !geometry.colors.is_empty(),
            ..Self::default()
        }
    }
}

/// A device buffer backing one custom attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomBuffer {
    pub name: String,
    pub item_size: u32,
    pub buffer: BufferObject,
}

/// CPU copies of the packed streams, sized to the group.
///
/// Dropped after upload unless the geometry is dynamic.
#[derive(Debug, Default, Clone)]
pub(crate) struct Staging {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub tangents: Vec<f32>,
    pub colors: Vec<f32>,
    pub uvs: Vec<f32>,
    pub uv2s: Vec<f32>,
    pub skin_indices: Vec<f32>,
    pub skin_weights: Vec<f32>,
    pub line_distances: Vec<f32>,
    pub morph_targets: Vec<Vec<f32>>,
    pub morph_normals: Vec<Vec<f32>>,
    pub custom: Vec<Vec<f32>>,
    pub faces: Vec<u16>,
    pub lines: Vec<u16>,
}

/// Device buffers of one group. Optional streams are `None` (or empty) when
/// the material that first referenced the geometry did not need them.
#[derive(Debug, Clone)]
pub struct GroupBuffers {
    pub needs: AttributeNeeds,
    pub position: BufferObject,
    pub normal: Option<BufferObject>,
    pub tangent: Option<BufferObject>,
    pub color: Option<BufferObject>,
    pub uv: Option<BufferObject>,
    pub uv2: Option<BufferObject>,
    pub skin_index: Option<BufferObject>,
    pub skin_weight: Option<BufferObject>,
    pub line_distance: Option<BufferObject>,
    pub morph_targets: Vec<BufferObject>,
    pub morph_normals: Vec<BufferObject>,
    pub custom: Vec<CustomBuffer>,
    /// Triangle index buffer (meshes).
    pub faces: Option<BufferObject>,
    /// Wireframe index buffer (meshes).
    pub lines: Option<BufferObject>,
    /// Number of indices in `faces`.
    pub face_index_count: u32,
    /// Number of indices in `lines`.
    pub line_index_count: u32,

    pub(crate) staging: Staging,
}

impl GroupBuffers {
    /// Every buffer object owned by the group.
    pub fn all_buffers(&self) -> impl Iterator<Item = BufferObject> + '_ {
        [
            Some(self.position),
            self.normal,
            self.tangent,
            self.color,
            self.uv,
            self.uv2,
            self.skin_index,
            self.skin_weight,
            self.line_distance,
            self.faces,
            self.lines,
        ]
        .into_iter()
        .flatten()
        .chain(self.morph_targets.iter().copied())
        .chain(self.morph_normals.iter().copied())
        .chain(self.custom.iter().map(|c| c.buffer))
    }
}

/// A drawable chunk of a geometry.
#[derive(Debug, Clone)]
pub struct GeometryGroup {
    id: u32,
    pub material_index: u32,
    /// Indices into `Geometry::faces`. Empty for line / particle groups.
    pub faces: Vec<u32>,
    pub vertex_count: u32,
    pub(crate) buffers: Option<GroupBuffers>,
}

impl GeometryGroup {
    #[must_use]
    pub fn new(material_index: u32) -> Self {
        Self {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            material_index,
            faces: Vec::new(),
            vertex_count: 0,
            buffers: None,
        }
    }

    /// A group covering every vertex, for lines and particle systems.
    #[must_use]
    pub fn whole(vertex_count: u32) -> Self {
        Self {
            vertex_count,
            ..Self::new(0)
        }
    }

    /// Process-unique id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn buffers(&self) -> Option<&GroupBuffers> {
        self.buffers.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn face_count(&self) -> u32 {
        self.faces.len() as u32
    }
}
