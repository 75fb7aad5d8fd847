//! Scene Integration Tests
//!
//! Tests for:
//! - Hierarchy: add, remove, re-parenting, destruction
//! - Tracked lists: objects and lights follow attachment to the root
//! - Pending queues: add/remove bookkeeping and cancellation
//! - World transform propagation

use glam::Vec3;
use myth_gl::assets::Assets;
use myth_gl::resources::{Geometry, Material};
use myth_gl::scene::{Light, Node, NodeKind, Scene};

fn mesh_node(assets: &mut Assets) -> Node {
    let geometry = assets.add_geometry(Geometry::new());
    let material = assets.add_material(Material::basic(Vec3::ONE));
    Node::new(NodeKind::mesh(geometry, material))
}

// ============================================================================
// Hierarchy & tracked lists
// ============================================================================

#[test]
fn adding_to_root_tracks_objects_and_lights() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();

    let mesh = scene.add_node(mesh_node(&mut assets));
    let light = scene.add_node(Node::new(NodeKind::Light(Light::point(Vec3::ONE, 1.0, 0.0))));
    let group = scene.add_node(Node::new(NodeKind::Group));

    assert_eq!(scene.objects(), &[mesh]);
    assert_eq!(scene.lights(), &[light]);
    assert!(scene.is_attached(group));
}

#[test]
fn detached_subtree_is_registered_when_attached() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();

    let group = scene.create_node(Node::new(NodeKind::Group));
    let mesh = scene.create_node(mesh_node(&mut assets));
    scene.add(group, mesh);
    assert!(scene.objects().is_empty());
    assert!(!scene.is_attached(mesh));

    let root = scene.root();
    scene.add(root, group);
    assert_eq!(scene.objects(), &[mesh]);
    assert!(scene.is_attached(mesh));
}

#[test]
fn reparenting_keeps_a_single_parent() {
    let mut scene = Scene::new();
    let a = scene.add_node(Node::new(NodeKind::Group));
    let b = scene.add_node(Node::new(NodeKind::Group));
    let child = scene.create_node(Node::new(NodeKind::Group));

    scene.add(a, child);
    scene.add(b, child);

    assert!(scene.node(a).unwrap().children().is_empty());
    assert_eq!(scene.node(b).unwrap().children(), &[child]);
    assert_eq!(scene.node(child).unwrap().parent(), Some(b));
}

#[test]
fn cycles_are_rejected() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new(NodeKind::Group));
    let child = scene.create_node(Node::new(NodeKind::Group));
    scene.add(parent, child);

    scene.add(child, parent);
    assert_eq!(scene.node(parent).unwrap().parent(), Some(scene.root()));
}

#[test]
fn destroying_a_node_frees_its_subtree() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let group = scene.add_node(Node::new(NodeKind::Group));
    let mesh = scene.create_node(mesh_node(&mut assets));
    scene.add(group, mesh);
    let before = scene.node_count();

    scene.destroy_node(group);

    assert_eq!(scene.node_count(), before - 2);
    assert!(scene.node(mesh).is_none());
    assert!(scene.objects().is_empty());
}

// ============================================================================
// Pending queues
// ============================================================================

#[test]
fn removal_after_drain_is_queued() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let mesh = scene.add_node(mesh_node(&mut assets));

    let pending = scene.take_pending();
    assert_eq!(pending.added, vec![mesh]);
    assert!(pending.removed.is_empty());

    let root = scene.root();
    scene.remove(root, mesh);
    assert_eq!(scene.pending_removed(), &[mesh]);
    assert!(scene.objects().is_empty());
}

#[test]
fn add_then_remove_before_drain_cancels() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let root = scene.root();
    let mesh = scene.add_node(mesh_node(&mut assets));

    scene.remove(root, mesh);

    assert!(scene.pending_added().is_empty());
    assert!(scene.pending_removed().is_empty());
}

#[test]
fn remove_then_add_before_drain_cancels() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let root = scene.root();
    let mesh = scene.add_node(mesh_node(&mut assets));
    scene.take_pending();

    scene.remove(root, mesh);
    scene.add(root, mesh);

    assert!(scene.pending_added().is_empty());
    assert!(scene.pending_removed().is_empty());
    assert_eq!(scene.objects(), &[mesh]);
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn world_positions_compose_down_the_hierarchy() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new(NodeKind::Group).with_position(Vec3::new(1.0, 0.0, 0.0)));
    let child = scene.create_node(Node::new(NodeKind::Group).with_position(Vec3::new(0.0, 2.0, 0.0)));
    scene.add(parent, child);

    let root = scene.root();
    scene.update_world_transforms(root);

    assert!(scene.world_position(child).abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
}

#[test]
fn moving_a_parent_moves_its_children() {
    let mut scene = Scene::new();
    let parent = scene.add_node(Node::new(NodeKind::Group));
    let child = scene.create_node(Node::new(NodeKind::Group).with_position(Vec3::X));
    scene.add(parent, child);
    let root = scene.root();
    scene.update_world_transforms(root);

    scene.node_mut(parent).unwrap().transform.position = Vec3::new(0.0, 0.0, -3.0);
    scene.update_world_transforms(root);

    assert!(scene.world_position(child).abs_diff_eq(Vec3::new(1.0, 0.0, -3.0), 1e-6));
}
