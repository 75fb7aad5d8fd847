use std::cell::Cell;

use bitflags::bitflags;
use glam::{Affine3A, Vec2, Vec3, Vec4};

bitflags! {
    /// Which CPU-side arrays changed since the last upload.
    ///
    /// Set by the application after mutating geometry data, consumed and
    /// cleared by the renderer once every group of the geometry has been
    /// repacked.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        const VERTICES       = 1 << 0;
        const NORMALS        = 1 << 1;
        const UVS            = 1 << 2;
        const COLORS         = 1 << 3;
        const TANGENTS       = 1 << 4;
        const ELEMENTS       = 1 << 5;
        const MORPH_TARGETS  = 1 << 6;
        const LINE_DISTANCES = 1 << 7;
    }
}

/// A triangle referencing three vertices of its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Face3 {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    /// Face normal, used for flat shading and when no vertex normals exist.
    pub normal: Vec3,
    pub vertex_normals: Option<[Vec3; 3]>,
    /// Face color, used by `VertexColors::Face`.
    pub color: Vec3,
    pub vertex_colors: Option<[Vec3; 3]>,
    pub vertex_tangents: Option<[Vec4; 3]>,
    /// Index into a per-face material list.
    pub material_index: u32,
}

impl Face3 {
    #[must_use]
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        Self {
            a,
            b,
            c,
            normal: Vec3::ZERO,
            vertex_normals: None,
            color: Vec3::ONE,
            vertex_colors: None,
            vertex_tangents: None,
            material_index: 0,
        }
    }

    #[must_use]
    pub fn with_material_index(mut self, index: u32) -> Self {
        self.material_index = index;
        self
    }

    #[inline]
    #[must_use]
    pub fn indices(&self) -> [u32; 3] {
        [self.a, self.b, self.c]
    }
}

/// A named set of displaced vertex positions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MorphTarget {
    pub name: String,
    pub vertices: Vec<Vec3>,
}

/// Normals matching one morph target, stored per face like the base normals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MorphNormals {
    pub face_normals: Vec<Vec3>,
    pub vertex_normals: Vec<[Vec3; 3]>,
}

/// What one value of a custom attribute is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeBinding {
    /// One item per geometry vertex.
    #[default]
    Vertices,
    /// One item per face, replicated to its three corners.
    Faces,
    /// Three items per face, one per corner.
    FaceVertices,
}

/// An application-defined vertex attribute.
///
/// `values` is flat: `item_size` floats per item. Setting `needs_update`
/// re-uploads only this attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    pub name: String,
    pub item_size: u32,
    pub binding: AttributeBinding,
    pub values: Vec<f32>,
    pub needs_update: bool,
}

impl CustomAttribute {
    #[must_use]
    pub fn new(name: &str, item_size: u32, binding: AttributeBinding, values: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            item_size: item_size.clamp(1, 4),
            binding,
            values,
            needs_update: true,
        }
    }

    /// Reads item `index` into `out`, padding with zeros past the end.
    pub(crate) fn read_item(&self, index: usize, out: &mut [f32]) {
        let size = self.item_size as usize;
        let start = index * size;
        for (k, slot) in out.iter_mut().enumerate().take(size) {
            *slot = self.values.get(start + k).copied().unwrap_or(0.0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Transforms the sphere, scaling the radius by the largest axis scale.
    #[must_use]
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let center = matrix.transform_point3(self.center);
        let scale = matrix
            .matrix3
            .x_axis
            .length()
            .max(matrix.matrix3.y_axis.length())
            .max(matrix.matrix3.z_axis.length());
        Self {
            center,
            radius: self.radius * scale,
        }
    }
}

/// Face-based triangle, line and point geometry.
///
/// Meshes draw `faces`; lines and particle systems draw `vertices` directly.
/// After mutating any array, call [`Geometry::mark_dirty`] with the matching
/// flag so the renderer repacks and re-uploads it on the next frame.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub vertices: Vec<Vec3>,
    /// Per-vertex colors for lines and particle systems.
    pub colors: Vec<Vec3>,
    pub faces: Vec<Face3>,
    /// Two UV layers, each holding one `[uv; 3]` per face.
    pub face_vertex_uvs: [Vec<[Vec2; 3]>; 2],
    pub skin_indices: Vec<Vec4>,
    pub skin_weights: Vec<Vec4>,
    pub morph_targets: Vec<MorphTarget>,
    pub morph_normals: Vec<MorphNormals>,
    /// Cumulative distances along a line, for dashed line materials.
    pub line_distances: Vec<f32>,
    pub custom_attributes: Vec<CustomAttribute>,
    /// Uploads use a dynamic usage hint and keep staging arrays alive.
    pub dynamic: bool,
    pub has_tangents: bool,

    pub(crate) dirty: DirtyFlags,
    bounding_sphere: Cell<Option<BoundingSphere>>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            colors: Vec::new(),
            faces: Vec::new(),
            face_vertex_uvs: [Vec::new(), Vec::new()],
            skin_indices: Vec::new(),
            skin_weights: Vec::new(),
            morph_targets: Vec::new(),
            morph_normals: Vec::new(),
            line_distances: Vec::new(),
            custom_attributes: Vec::new(),
            dynamic: false,
            has_tangents: false,
            dirty: DirtyFlags::all(),
            bounding_sphere: Cell::new(None),
        }
    }

    /// Builds a triangle geometry and computes face normals.
    #[must_use]
    pub fn from_faces(vertices: Vec<Vec3>, faces: Vec<Face3>) -> Self {
        let mut geometry = Self {
            vertices,
            faces,
            ..Self::new()
        };
        geometry.compute_face_normals();
        geometry
    }

    /// Builds a vertex-only geometry for lines and particle systems.
    #[must_use]
    pub fn from_points(vertices: Vec<Vec3>) -> Self {
        Self {
            vertices,
            ..Self::new()
        }
    }

    /// Flags arrays for re-upload on the next frame.
    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
        if flags.contains(DirtyFlags::VERTICES) {
            self.bounding_sphere.set(None);
        }
    }

    #[inline]
    #[must_use]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    #[inline]
    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = DirtyFlags::empty();
    }

    #[must_use]
    pub fn custom_attribute(&self, name: &str) -> Option<&CustomAttribute> {
        self.custom_attributes.iter().find(|a| a.name == name)
    }

    pub fn custom_attribute_mut(&mut self, name: &str) -> Option<&mut CustomAttribute> {
        self.custom_attributes.iter_mut().find(|a| a.name == name)
    }

    pub(crate) fn custom_attributes_dirty(&self) -> bool {
        self.custom_attributes.iter().any(|a| a.needs_update)
    }

    pub(crate) fn clear_custom_attributes(&mut self) {
        for attribute in &mut self.custom_attributes {
            attribute.needs_update = false;
        }
    }

    /// Bounding sphere around all vertices, computed lazily and cached until
    /// the next `mark_dirty(VERTICES)`.
    #[must_use]
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        if let Some(sphere) = self.bounding_sphere.get() {
            return Some(sphere);
        }
        let sphere = self.compute_bounding_sphere()?;
        self.bounding_sphere.set(Some(sphere));
        Some(sphere)
    }

    fn compute_bounding_sphere(&self) -> Option<BoundingSphere> {
        if self.vertices.is_empty() {
            return None;
        }

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for v in &self.vertices {
            min = min.min(*v);
            max = max.max(*v);
        }

        let center = (min + max) * 0.5;
        let max_dist_sq = self
            .vertices
            .iter()
            .map(|v| v.distance_squared(center))
            .fold(0.0_f32, f32::max);

        Some(BoundingSphere {
            center,
            radius: max_dist_sq.sqrt(),
        })
    }

    pub fn compute_face_normals(&mut self) {
        let vertex = |i: u32| self.vertices.get(i as usize).copied().unwrap_or(Vec3::ZERO);
        let normals: Vec<Vec3> = self
            .faces
            .iter()
            .map(|f| {
                let (va, vb, vc) = (vertex(f.a), vertex(f.b), vertex(f.c));
                (vc - vb).cross(va - vb).normalize_or_zero()
            })
            .collect();

        for (face, normal) in self.faces.iter_mut().zip(normals) {
            face.normal = normal;
        }
        self.mark_dirty(DirtyFlags::NORMALS);
    }

    /// Area-weighted smooth normals, written to each face's `vertex_normals`.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];
        let count = normals.len();

        for face in &self.faces {
            let [a, b, c] = face.indices().map(|i| i as usize);
            if a >= count || b >= count || c >= count {
                continue;
            }
            let (va, vb, vc) = (self.vertices[a], self.vertices[b], self.vertices[c]);
            let face_normal = (vc - vb).cross(va - vb);
            normals[a] += face_normal;
            normals[b] += face_normal;
            normals[c] += face_normal;
        }

        for n in &mut normals {
            *n = n.normalize_or_zero();
        }

        for face in &mut self.faces {
            let normal = |i: u32| normals.get(i as usize).copied().unwrap_or(Vec3::ZERO);
            face.vertex_normals = Some([normal(face.a), normal(face.b), normal(face.c)]);
        }
        self.mark_dirty(DirtyFlags::NORMALS);
    }

    /// Cumulative distance from the first vertex, for dashed lines.
    pub fn compute_line_distances(&mut self) {
        self.line_distances.clear();
        let mut total = 0.0;
        for (i, v) in self.vertices.iter().enumerate() {
            if i > 0 {
                total += v.distance(self.vertices[i - 1]);
            }
            self.line_distances.push(total);
        }
        self.mark_dirty(DirtyFlags::LINE_DISTANCES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry::from_faces(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Face3::new(0, 1, 2)],
        )
    }

    #[test]
    fn face_normal_follows_counter_clockwise_winding() {
        let geometry = triangle();
        assert!((geometry.faces[0].normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn bounding_sphere_is_invalidated_by_vertex_changes() {
        let mut geometry = triangle();
        let before = geometry.bounding_sphere().unwrap();

        geometry.vertices.push(Vec3::new(10.0, 0.0, 0.0));
        geometry.mark_dirty(DirtyFlags::VERTICES);
        let after = geometry.bounding_sphere().unwrap();

        assert!(after.radius > before.radius);
    }

    #[test]
    fn new_geometry_starts_fully_dirty() {
        assert_eq!(Geometry::new().dirty(), DirtyFlags::all());
    }

    #[test]
    fn line_distances_accumulate() {
        let mut geometry = Geometry::from_points(vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 2.0, 0.0)]);
        geometry.compute_line_distances();
        assert_eq!(geometry.line_distances, vec![0.0, 1.0, 3.0]);
    }
}
