//! Geometry partitioning tests
//!
//! Face geometries are split into groups addressable with 16-bit indices,
//! one chain of groups per material index.

use glam::Vec3;
use myth_gl::renderer::partition::{MAX_GROUP_VERTICES, partition_faces, whole_geometry_group};
use myth_gl::resources::{Face3, Geometry};

fn many_faces(count: usize, material_index: impl Fn(usize) -> u32) -> Geometry {
    let faces = (0..count)
        .map(|i| Face3::new(0, 1, 2).with_material_index(material_index(i)))
        .collect();
    Geometry::from_faces(vec![Vec3::ZERO, Vec3::X, Vec3::Y], faces)
}

#[test]
fn large_geometry_splits_at_the_index_limit() {
    let geometry = many_faces(30_000, |_| 0);
    let groups = partition_faces(&geometry, false);

    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.vertex_count <= MAX_GROUP_VERTICES));
    assert_eq!(groups[0].faces.len(), 21_845);
    assert_eq!(groups[0].vertex_count, 65_535);
    assert_eq!(groups[1].faces.len(), 30_000 - 21_845);
}

#[test]
fn every_face_lands_in_exactly_one_group() {
    let geometry = many_faces(50_000, |i| (i % 3) as u32);
    let groups = partition_faces(&geometry, true);

    let mut seen: Vec<u32> = groups.iter().flat_map(|g| g.faces.iter().copied()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..50_000).collect::<Vec<u32>>());
    for group in &groups {
        assert!(group.vertex_count <= MAX_GROUP_VERTICES);
        assert_eq!(group.vertex_count as usize, group.faces.len() * 3);
    }
}

#[test]
fn per_face_materials_get_their_own_groups_in_first_seen_order() {
    let geometry = many_faces(4, |i| if i % 2 == 0 { 2 } else { 1 });
    let groups = partition_faces(&geometry, true);

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].material_index, 2);
    assert_eq!(groups[0].faces, vec![0, 2]);
    assert_eq!(groups[1].material_index, 1);
    assert_eq!(groups[1].faces, vec![1, 3]);
}

#[test]
fn overflowing_material_keeps_faces_in_order() {
    let geometry = many_faces(21_846, |_| 5);
    let groups = partition_faces(&geometry, true);

    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.material_index == 5));
    assert_eq!(groups[1].faces, vec![21_845]);
}

#[test]
fn empty_geometry_has_no_groups() {
    let groups = partition_faces(&Geometry::new(), false);
    assert!(groups.is_empty());
}

#[test]
fn point_geometry_is_one_group() {
    let geometry = Geometry::from_points(vec![Vec3::ZERO; 70_000]);
    let group = whole_geometry_group(&geometry);
    assert_eq!(group.vertex_count, 70_000);
    assert!(group.faces.is_empty());
}
