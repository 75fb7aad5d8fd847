//! Light budget and aggregation tests

use glam::Vec3;
use myth_gl::renderer::lights::{LightArrays, LightBudget, allocate_lights, count_lights};
use myth_gl::scene::{Light, Node, NodeKind, Scene};

fn add_light(scene: &mut Scene, light: Light, position: Vec3) {
    scene.add_node(Node::new(NodeKind::Light(light)).with_position(position));
}

fn updated(mut scene: Scene) -> Scene {
    let root = scene.root();
    scene.update_world_transforms(root);
    scene
}

#[test]
fn ten_point_lights_fit_into_four_slots() {
    let counts = LightBudget {
        point: 10,
        ..LightBudget::default()
    };
    let budget = allocate_lights(counts, 4);
    assert_eq!(budget.point, 4);
    assert_eq!(budget.directional + budget.spot, 0);
}

#[test]
fn mixed_types_share_the_budget() {
    let counts = LightBudget {
        directional: 2,
        point: 6,
        spot: 4,
        hemisphere: 3,
    };
    let budget = allocate_lights(counts, 6);
    assert!(budget.directional + budget.point + budget.spot <= 6);
    assert!(budget.directional <= 2 && budget.point <= 6 && budget.spot <= 4);
    assert_eq!(budget.hemisphere, 3);
}

#[test]
fn counting_skips_hidden_and_shadow_only_lights() {
    let mut scene = Scene::new();
    add_light(&mut scene, Light::point(Vec3::ONE, 1.0, 0.0), Vec3::ZERO);
    add_light(&mut scene, Light::directional(Vec3::ONE, 1.0), Vec3::Y);

    let mut shadow_only = Light::directional(Vec3::ONE, 1.0);
    shadow_only.only_shadow = true;
    add_light(&mut scene, shadow_only, Vec3::Y);

    let hidden = scene.add_node(Node::new(NodeKind::Light(Light::point(Vec3::ONE, 1.0, 0.0))));
    scene.node_mut(hidden).unwrap().visible = false;

    let counts = count_lights(&scene);
    assert_eq!(counts.point, 1);
    assert_eq!(counts.directional, 1);
}

#[test]
fn aggregation_stops_at_the_budget() {
    let mut scene = Scene::new();
    for i in 0..10 {
        add_light(
            &mut scene,
            Light::point(Vec3::ONE, 1.0, 5.0),
            Vec3::new(i as f32, 0.0, 0.0),
        );
    }
    let scene = updated(scene);
    let budget = allocate_lights(count_lights(&scene), 4);

    let arrays = LightArrays::aggregate(&scene, budget, false);

    assert_eq!(arrays.point_count(), 4);
    assert_eq!(arrays.point_colors.len(), 12);
    assert_eq!(arrays.point_distances, vec![5.0; 4]);
    // Scene order is kept.
    assert_eq!(&arrays.point_positions[..6], &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn ambient_lights_add_up() {
    let mut scene = Scene::new();
    add_light(&mut scene, Light::ambient(Vec3::new(0.1, 0.2, 0.3)), Vec3::ZERO);
    add_light(&mut scene, Light::ambient(Vec3::new(0.1, 0.0, 0.0)), Vec3::ZERO);
    let scene = updated(scene);

    let arrays = LightArrays::aggregate(&scene, LightBudget::default(), false);
    assert!(arrays.ambient.abs_diff_eq(Vec3::new(0.2, 0.2, 0.3), 1e-6));
}

#[test]
fn gamma_input_squares_colors() {
    let mut scene = Scene::new();
    add_light(&mut scene, Light::directional(Vec3::splat(0.5), 2.0), Vec3::Y);
    let scene = updated(scene);
    let budget = allocate_lights(count_lights(&scene), 4);

    let linear = LightArrays::aggregate(&scene, budget, false);
    let gamma = LightArrays::aggregate(&scene, budget, true);

    assert!((linear.directional_colors[0] - 1.0).abs() < 1e-6);
    assert!((gamma.directional_colors[0] - 0.5 * 0.5 * 2.0 * 2.0).abs() < 1e-6);
    // Directional lights point from the target (origin) to the light.
    assert_eq!(&linear.directional_directions[..], &[0.0, 1.0, 0.0]);
}
