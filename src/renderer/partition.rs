//! Geometry Partitioner
//!
//! Splits a face-based geometry into [`GeometryGroup`]s of at most
//! [`MAX_GROUP_VERTICES`] vertices each, one bucket chain per material index.
//! Faces are not shared between corners, so every face costs three vertices.

use rustc_hash::FxHashMap;

use crate::renderer::geometry_group::GeometryGroup;
use crate::resources::Geometry;

/// Largest vertex count addressable with `u16` indices.
pub const MAX_GROUP_VERTICES: u32 = 65535;

/// Greedy single pass over the faces in order.
///
/// Faces are bucketed by `(material_index, counter)`; a new bucket opens when
/// the current one would exceed the limit. Groups are returned in the order
/// their bucket first appeared. Without per-face materials every face uses
/// material index 0.
#[must_use]
pub fn partition_faces(geometry: &Geometry, uses_face_materials: bool) -> Vec<GeometryGroup> {
    let mut groups: Vec<GeometryGroup> = Vec::new();
    let mut lookup: FxHashMap<(u32, u32), usize> = FxHashMap::default();
    let mut counters: FxHashMap<u32, u32> = FxHashMap::default();

    for (face_index, face) in geometry.faces.iter().enumerate() {
        let material_index = if uses_face_materials {
            face.material_index
        } else {
            0
        };

        let counter = counters.entry(material_index).or_insert(0);
        if let Some(&slot) = lookup.get(&(material_index, *counter))
            && groups[slot].vertex_count + 3 > MAX_GROUP_VERTICES
        {
            *counter += 1;
        }

        let slot = *lookup
            .entry((material_index, *counter))
            .or_insert_with(|| {
                groups.push(GeometryGroup::new(material_index));
                groups.len() - 1
            });

        let group = &mut groups[slot];
        group.faces.push(face_index as u32);
        group.vertex_count += 3;
    }

    groups
}

/// The single group of a line or particle system.
#[must_use]
pub fn whole_geometry_group(geometry: &Geometry) -> GeometryGroup {
    GeometryGroup::whole(geometry.vertices.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Face3;
    use glam::Vec3;

    #[test]
    fn single_material_fits_one_group() {
        let geometry = Geometry::from_faces(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Face3::new(0, 1, 2), Face3::new(0, 2, 1)],
        );
        let groups = partition_faces(&geometry, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].vertex_count, 6);
        assert_eq!(groups[0].faces, vec![0, 1]);
    }

    #[test]
    fn face_material_indices_are_ignored_without_face_materials() {
        let geometry = Geometry::from_faces(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Face3::new(0, 1, 2).with_material_index(3)],
        );
        let groups = partition_faces(&geometry, false);
        assert_eq!(groups[0].material_index, 0);
    }
}
