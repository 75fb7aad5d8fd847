//! Renderer Integration Tests
//!
//! Whole frames on the recording device:
//! - Draw submission and frame statistics
//! - Program sharing, build failures and teardown
//! - Draw list ordering
//! - Buffer lifetime across scene membership changes
//! - Lights, render targets, plugins and override materials

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use myth_gl::assets::Assets;
use myth_gl::renderer::device::{Capability, CullFace, DeviceCall, DrawMode};
use myth_gl::renderer::settings::RendererSettings;
use myth_gl::renderer::{PluginContext, RenderPlugin, RenderTarget};
use myth_gl::resources::{
    BlendFactor, Blending, DirtyFlags, Geometry, Material, Uniforms, VertexColors,
};
use myth_gl::scene::{Light, LineMode, Node, NodeKind, Scene};

use common::{add_camera, add_mesh, renderer, renderer_with, single_mesh_scene, triangle};

fn compile_count(device: &myth_gl::HeadlessDevice) -> usize {
    device.count_calls(|c| matches!(c, DeviceCall::CompileShader { .. }))
}

// ============================================================================
// Submission
// ============================================================================

#[test]
fn single_mesh_is_drawn_once() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(
        renderer.device().draw_calls(),
        vec![&DeviceCall::DrawElements {
            mode: DrawMode::Triangles,
            count: 3,
            offset: 0
        }]
    );
    let info = renderer.info();
    assert_eq!(info.render.calls, 1);
    assert_eq!(info.render.vertices, 3);
    assert_eq!(info.render.faces, 1);
    assert_eq!(info.memory.geometries, 1);
    assert_eq!(info.memory.programs, 1);
}

#[test]
fn frame_counters_reset_every_render() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(renderer.info().render.calls, 1);
    assert_eq!(renderer.device().draw_calls().len(), 2);
}

#[test]
fn non_camera_node_aborts_the_frame() {
    let mut assets = Assets::new();
    let (mut scene, _, mesh) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, mesh, None, false);

    assert!(renderer.device().draw_calls().is_empty());
    assert_eq!(
        renderer
            .device()
            .count_calls(|c| matches!(c, DeviceCall::Clear(_))),
        0
    );
}

#[test]
fn objects_outside_the_frustum_are_skipped() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    scene.node_mut(mesh).unwrap().transform.position = Vec3::new(0.0, 0.0, 10.0);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert!(renderer.device().draw_calls().is_empty());
    // Still uploaded, only culled.
    assert_eq!(renderer.info().memory.geometries, 1);
}

#[test]
fn invisible_nodes_and_materials_are_skipped() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();

    scene.node_mut(mesh).unwrap().visible = false;
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert!(renderer.device().draw_calls().is_empty());

    scene.node_mut(mesh).unwrap().visible = true;
    let material = scene
        .node(mesh)
        .unwrap()
        .kind
        .material_for_group(0)
        .unwrap();
    assets.material_mut(material).unwrap().visible = false;
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert!(renderer.device().draw_calls().is_empty());
}

#[test]
fn wireframe_meshes_draw_edge_lists() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let mut material = Material::basic(Vec3::ONE);
    material.wireframe = true;
    let material = assets.add_material(material);
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(
        renderer.device().draw_calls(),
        vec![&DeviceCall::DrawElements {
            mode: DrawMode::Lines,
            count: 6,
            offset: 0
        }]
    );
}

#[test]
fn lines_and_particles_draw_arrays() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let points = vec![Vec3::ZERO, Vec3::X, Vec3::Y];

    let line_geometry = assets.add_geometry(Geometry::from_points(points.clone()));
    let line_material = assets.add_material(Material::line_basic(Vec3::ONE));
    scene.add_node(
        Node::new(NodeKind::line(line_geometry, line_material, LineMode::Strip))
            .with_position(Vec3::new(0.0, 0.0, -5.0)),
    );

    let particle_geometry = assets.add_geometry(Geometry::from_points(points));
    let particle_material = assets.add_material(Material::particle_basic(Vec3::ONE, 2.0));
    scene.add_node(
        Node::new(NodeKind::particles(particle_geometry, particle_material, false))
            .with_position(Vec3::new(0.0, 0.0, -6.0)),
    );

    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(
        renderer.device().draw_calls(),
        vec![
            &DeviceCall::DrawArrays {
                mode: DrawMode::LineStrip,
                first: 0,
                count: 3
            },
            &DeviceCall::DrawArrays {
                mode: DrawMode::Points,
                first: 0,
                count: 3
            },
        ]
    );
    assert_eq!(renderer.info().render.points, 3);
}

// ============================================================================
// Programs
// ============================================================================

#[test]
fn materials_with_equal_parameters_share_a_program() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let red = assets.add_material(Material::basic(Vec3::X));
    let blue = assets.add_material(Material::basic(Vec3::Z));
    add_mesh(&mut scene, geometry, red, Vec3::new(0.0, 0.0, -5.0));
    add_mesh(&mut scene, geometry, blue, Vec3::new(1.0, 0.0, -5.0));
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(renderer.program_cache().len(), 1);
    assert_eq!(renderer.material_program(red).unwrap().usage, 2);
    assert_eq!(renderer.info().memory.programs, 1);
    assert_eq!(renderer.device().live_program_count(), 1);
    assert_eq!(renderer.device().draw_calls().len(), 2);
}

#[test]
fn deallocating_materials_releases_their_program() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let a = assets.add_material(Material::basic(Vec3::ONE));
    let b = assets.add_material(Material::basic(Vec3::ONE));
    add_mesh(&mut scene, geometry, a, Vec3::new(0.0, 0.0, -5.0));
    add_mesh(&mut scene, geometry, b, Vec3::new(0.0, 0.0, -6.0));
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    renderer.deallocate_material(a);
    assert!(renderer.material_program(a).is_none());
    assert_eq!(renderer.material_program(b).unwrap().usage, 1);
    assert_eq!(renderer.device().live_program_count(), 1);

    renderer.deallocate_material(b);
    assert!(renderer.program_cache().is_empty());
    assert_eq!(renderer.device().live_program_count(), 0);
    assert_eq!(renderer.info().memory.programs, 0);
}

#[test]
fn failed_program_skips_its_objects_and_is_not_rebuilt() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let geometry = assets.add_geometry(triangle());
    let broken = assets.add_material(Material::shader(
        "void main() { gl_Position = vec4(position, 1.0); }",
        "// BROKEN\nvoid main() { gl_FragColor = vec4(1.0); }",
        Uniforms::new(),
    ));
    add_mesh(&mut scene, geometry, broken, Vec3::new(0.0, 0.0, -8.0));
    let mut renderer = renderer();
    renderer.device_mut().fail_compiles_containing("BROKEN");

    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.device().draw_calls().len(), 1);
    assert!(renderer.material_program(broken).is_none());
    let compiled = compile_count(renderer.device());

    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.device().draw_calls().len(), 2);
    assert_eq!(compile_count(renderer.device()), compiled);

    // An explicit update retries the build.
    assets.material_mut(broken).unwrap().needs_update = true;
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert!(compile_count(renderer.device()) > compiled);
}

#[test]
fn changing_material_parameters_switches_programs() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    let material = scene
        .node(mesh)
        .unwrap()
        .kind
        .material_for_group(0)
        .unwrap();
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);
    let before = renderer.material_program(material).unwrap().id;

    let m = assets.material_mut(material).unwrap();
    m.vertex_colors = VertexColors::Face;
    m.needs_update = true;
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_ne!(renderer.material_program(material).unwrap().id, before);
    // The old program lost its only user.
    assert_eq!(renderer.program_cache().len(), 1);
    assert_eq!(renderer.device().live_program_count(), 1);
}

#[test]
fn shared_material_keeps_one_program_per_variant_across_frames() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    scene.add_node(
        Node::new(NodeKind::Light(
            Light::directional(Vec3::ONE, 1.0).with_shadow(),
        ))
        .with_position(Vec3::Y * 5.0),
    );
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::lambert(Vec3::ONE));
    let lit = add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    add_mesh(&mut scene, geometry, material, Vec3::new(1.0, 0.0, -5.0));
    scene.node_mut(lit).unwrap().receive_shadow = true;
    let mut renderer = renderer_with(RendererSettings {
        shadow_map_enabled: true,
        ..RendererSettings::default()
    });

    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.program_cache().len(), 2);
    let compiled = compile_count(renderer.device());

    for _ in 0..3 {
        renderer.render(&mut scene, &mut assets, camera, None, false);
        assert_eq!(renderer.info().render.calls, 2);
    }
    assert_eq!(compile_count(renderer.device()), compiled);
    assert_eq!(renderer.device().live_program_count(), 2);

    renderer.deallocate_material(material);
    assert_eq!(renderer.device().live_program_count(), 0);
    assert_eq!(renderer.info().memory.programs, 0);
}

#[test]
fn program_variant_unused_for_a_frame_is_released() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    scene.add_node(
        Node::new(NodeKind::Light(
            Light::directional(Vec3::ONE, 1.0).with_shadow(),
        ))
        .with_position(Vec3::Y * 5.0),
    );
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::lambert(Vec3::ONE));
    let mesh = add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    let mut renderer = renderer_with(RendererSettings {
        shadow_map_enabled: true,
        ..RendererSettings::default()
    });
    renderer.render(&mut scene, &mut assets, camera, None, false);

    scene.node_mut(mesh).unwrap().receive_shadow = true;
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(renderer.program_cache().len(), 1);
    assert_eq!(renderer.device().live_program_count(), 1);
}

// ============================================================================
// Draw order
// ============================================================================

fn depth_scene(assets: &mut Assets, transparent: bool) -> (Scene, myth_gl::NodeHandle, Vec<myth_gl::NodeHandle>) {
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let material =
        assets.add_material(Material::basic(Vec3::ONE).with_transparent(transparent));
    let nodes = [-10.0, -50.0, -5.0]
        .into_iter()
        .map(|z| add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, z)))
        .collect();
    (scene, camera, nodes)
}

fn drawn_opaque(renderer: &myth_gl::Renderer<myth_gl::HeadlessDevice>) -> Vec<myth_gl::NodeHandle> {
    renderer
        .draw_lists()
        .opaque
        .iter()
        .map(|item| item.entry.node)
        .collect()
}

#[test]
fn opaque_objects_draw_front_to_back() {
    let mut assets = Assets::new();
    let (mut scene, camera, nodes) = depth_scene(&mut assets, false);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(drawn_opaque(&renderer), vec![nodes[2], nodes[0], nodes[1]]);
    assert!(renderer.draw_lists().transparent.is_empty());
}

#[test]
fn transparent_objects_draw_back_to_front() {
    let mut assets = Assets::new();
    let (mut scene, camera, nodes) = depth_scene(&mut assets, true);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    let order: Vec<_> = renderer
        .draw_lists()
        .transparent
        .iter()
        .map(|item| item.entry.node)
        .collect();
    assert_eq!(order, vec![nodes[1], nodes[0], nodes[2]]);

    // Blending was switched back on for the transparent pass.
    let last_blend = renderer.device().calls().iter().rev().find_map(|c| match c {
        DeviceCall::SetCapability(Capability::Blend, enabled) => Some(*enabled),
        _ => None,
    });
    assert_eq!(last_blend, Some(true));
}

#[test]
fn unsorted_lists_keep_scene_order() {
    let mut assets = Assets::new();
    let (mut scene, camera, nodes) = depth_scene(&mut assets, false);
    let mut renderer = renderer_with(RendererSettings {
        sort_objects: false,
        ..RendererSettings::default()
    });

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(drawn_opaque(&renderer), nodes);
}

#[test]
fn render_depth_overrides_the_computed_depth() {
    let mut assets = Assets::new();
    let (mut scene, camera, nodes) = depth_scene(&mut assets, false);
    scene.node_mut(nodes[1]).unwrap().render_depth = Some(100.0);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(drawn_opaque(&renderer), vec![nodes[1], nodes[2], nodes[0]]);
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn removed_and_readded_objects_keep_their_buffers() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    let root = scene.root();
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);
    let live = renderer.device().live_buffer_count();

    scene.remove(root, mesh);
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.info().render.calls, 0);

    scene.add(root, mesh);
    renderer.device_mut().clear_calls();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(renderer.info().render.calls, 1);
    assert_eq!(
        renderer
            .device()
            .count_calls(|c| matches!(c, DeviceCall::CreateBuffer(_))),
        0
    );
    assert_eq!(renderer.device().live_buffer_count(), live);
}

#[test]
fn objects_added_between_frames_are_drawn() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::basic(Vec3::ONE));
    let late = add_mesh(&mut scene, geometry, material, Vec3::new(1.0, 0.0, -5.0));
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.info().render.calls, 2);

    let root = scene.root();
    scene.remove(root, late);
    scene.add(root, late);
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.info().render.calls, 2);
}

#[test]
fn object_without_its_geometry_is_tracked_once_it_exists() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::basic(Vec3::ONE));
    let mesh = add_mesh(&mut scene, geometry, material, Vec3::new(1.0, 0.0, -5.0));
    let stored = assets.geometries.remove(geometry).unwrap();
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.info().render.calls, 1);

    let replacement = assets.add_geometry(stored);
    if let NodeKind::Mesh(m) = &mut scene.node_mut(mesh).unwrap().kind {
        m.geometry = replacement;
    }
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.info().render.calls, 2);
}

#[test]
fn deallocated_object_is_uploaded_again_while_in_the_scene() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    renderer.deallocate_object(&scene, mesh);
    assert_eq!(renderer.device().live_buffer_count(), 0);
    assert_eq!(renderer.info().memory.geometries, 0);

    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.info().memory.geometries, 1);
    assert_eq!(renderer.info().render.calls, 1);
}

#[test]
fn only_dirty_streams_are_reuploaded_between_frames() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let material =
        assets.add_material(Material::basic(Vec3::ONE).with_vertex_colors(VertexColors::Face));
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    renderer.device_mut().clear_calls();
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.device().upload_count(), 0);

    let g = assets.geometry_mut(geometry).unwrap();
    g.faces[0].color = Vec3::X;
    g.mark_dirty(DirtyFlags::COLORS);
    renderer.device_mut().clear_calls();
    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(renderer.device().upload_count(), 1);
}

// ============================================================================
// Uniforms and state
// ============================================================================

#[test]
fn shared_material_refreshes_once_but_uploads_matrices_per_draw() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::basic(Vec3::ONE));
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -7.0));
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(renderer.device().uniform_uploads("diffuse").len(), 1);
    assert_eq!(renderer.device().uniform_uploads("modelViewMatrix").len(), 2);
}

#[test]
fn material_edits_show_up_next_frame() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    let material = scene
        .node(mesh)
        .unwrap()
        .kind
        .material_for_group(0)
        .unwrap();
    let mut renderer = renderer();
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assets.material_mut(material).unwrap().color = Vec3::new(1.0, 0.0, 0.0);
    renderer.render(&mut scene, &mut assets, camera, None, false);

    let uploads = renderer.device().uniform_uploads("diffuse");
    assert_eq!(uploads.last().copied(), Some(&[1.0_f32, 0.0, 0.0][..]));
}

#[test]
fn redundant_state_changes_are_not_reissued() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::basic(Vec3::ONE));
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -7.0));
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);
    renderer.render(&mut scene, &mut assets, camera, None, false);

    let device = renderer.device();
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::DepthMask(_))), 1);
    assert_eq!(
        device.count_calls(|c| matches!(c, DeviceCall::SetCapability(Capability::DepthTest, _))),
        1
    );
}

#[test]
fn clearing_follows_settings() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let mut renderer = renderer_with(RendererSettings {
        auto_clear: false,
        ..RendererSettings::default()
    });
    let clears = |r: &myth_gl::Renderer<myth_gl::HeadlessDevice>| {
        r.device().count_calls(|c| matches!(c, DeviceCall::Clear(_)))
    };

    renderer.render(&mut scene, &mut assets, camera, None, false);
    assert_eq!(clears(&renderer), 0);

    renderer.render(&mut scene, &mut assets, camera, None, true);
    assert_eq!(clears(&renderer), 1);
}

// ============================================================================
// Lights
// ============================================================================

#[test]
fn point_lights_beyond_the_budget_are_dropped() {
    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    for i in 0..10 {
        scene.add_node(
            Node::new(NodeKind::Light(Light::point(Vec3::ONE, 1.0, 10.0)))
                .with_position(Vec3::new(i as f32, 0.0, 0.0)),
        );
    }
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(Material::lambert(Vec3::ONE));
    add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(renderer.light_budget().point, 4);
    let colors = renderer.device().uniform_uploads("pointLightColor");
    assert_eq!(colors.last().map(|v| v.len()), Some(12));
    assert_eq!(renderer.device().draw_calls().len(), 1);
}

// ============================================================================
// Targets, plugins and overrides
// ============================================================================

#[test]
fn render_target_is_created_bound_and_mipmapped() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let mut target = RenderTarget::new(256, 256);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, Some(&mut target), false);

    let objects = target.objects().unwrap();
    let device = renderer.device();
    assert_eq!(device.live_framebuffer_count(), 1);
    assert!(device
        .calls()
        .contains(&DeviceCall::BindFramebuffer(Some(objects.framebuffer))));
    assert!(device.calls().contains(&DeviceCall::Viewport(0, 0, 256, 256)));
    assert!(device.count_calls(|c| matches!(c, DeviceCall::GenerateMipmap)) >= 1);

    renderer.deallocate_render_target(&mut target);
    assert_eq!(renderer.device().live_framebuffer_count(), 0);
    assert!(target.objects().is_none());
}

struct Recorder {
    label: &'static str,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl RenderPlugin for Recorder {
    fn render(&mut self, ctx: &mut PluginContext<'_>) {
        self.log.borrow_mut().push(self.label);
        // Leave the device in a state the renderer must not trust.
        ctx.device.depth_mask(false);
    }
}

struct FrontCuller;

impl RenderPlugin for FrontCuller {
    fn render(&mut self, ctx: &mut PluginContext<'_>) {
        ctx.device.cull_face(CullFace::Front);
    }
}

#[test]
fn cull_face_changed_by_a_plugin_is_restored() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let mut renderer = renderer();
    renderer.add_pre_plugin(Box::new(FrontCuller));

    renderer.render(&mut scene, &mut assets, camera, None, false);

    let calls = renderer.device().calls();
    let culled = calls
        .iter()
        .rposition(|c| matches!(c, DeviceCall::CullFace(_)))
        .unwrap();
    let drawn = calls
        .iter()
        .rposition(|c| matches!(c, DeviceCall::DrawElements { .. }))
        .unwrap();
    assert_eq!(calls[culled], DeviceCall::CullFace(CullFace::Back));
    assert!(culled < drawn);
}

#[test]
fn plugins_run_once_per_frame_around_the_passes() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut renderer = renderer();
    renderer.add_pre_plugin(Box::new(Recorder {
        label: "pre",
        log: Rc::clone(&log),
    }));
    renderer.add_post_plugin(Box::new(Recorder {
        label: "post",
        log: Rc::clone(&log),
    }));

    renderer.render(&mut scene, &mut assets, camera, None, false);
    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert_eq!(*log.borrow(), vec!["pre", "post", "pre", "post"]);
    let last_mask = renderer.device().calls().iter().rev().find_map(|c| match c {
        DeviceCall::DepthMask(enabled) => Some(*enabled),
        _ => None,
    });
    assert_eq!(last_mask, Some(true));
}

#[test]
fn override_material_blending_covers_both_passes() {
    let mut assets = Assets::new();
    let (mut scene, camera, _) = single_mesh_scene(&mut assets);
    let geometry = assets.add_geometry(triangle());
    let mut glass = Material::basic(Vec3::ONE);
    glass.transparent = true;
    let glass = assets.add_material(glass);
    add_mesh(&mut scene, geometry, glass, Vec3::new(1.0, 0.0, -5.0));
    let mut additive = Material::basic(Vec3::ONE);
    additive.blending = Blending::Additive;
    scene.override_material = Some(assets.add_material(additive));
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    let calls = renderer.device().calls();
    let first_draw = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::DrawElements { .. }))
        .unwrap();
    let blend_calls: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, DeviceCall::SetCapability(Capability::Blend, _)))
        .collect();
    let (last_index, last) = *blend_calls.last().unwrap();
    assert!(last_index < first_draw);
    assert_eq!(*last, DeviceCall::SetCapability(Capability::Blend, true));
    assert!(calls.contains(&DeviceCall::BlendFunc(BlendFactor::SrcAlpha, BlendFactor::One)));
    assert_eq!(renderer.device().draw_calls().len(), 2);
}

#[test]
fn override_material_replaces_every_material() {
    let mut assets = Assets::new();
    let (mut scene, camera, mesh) = single_mesh_scene(&mut assets);
    let own = scene
        .node(mesh)
        .unwrap()
        .kind
        .material_for_group(0)
        .unwrap();
    let depth = assets.add_material(Material::depth());
    scene.override_material = Some(depth);
    let mut renderer = renderer();

    renderer.render(&mut scene, &mut assets, camera, None, false);

    assert!(renderer.material_program(depth).is_some());
    assert!(renderer.material_program(own).is_none());
    assert_eq!(renderer.device().draw_calls().len(), 1);
    assert_eq!(renderer.device().uniform_uploads("mNear").len(), 1);
}
