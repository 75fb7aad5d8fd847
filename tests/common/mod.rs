//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use glam::Vec3;
use myth_gl::assets::{Assets, GeometryHandle, MaterialHandle};
use myth_gl::renderer::device::HeadlessDevice;
use myth_gl::renderer::program::ShaderSource;
use myth_gl::renderer::settings::RendererSettings;
use myth_gl::renderer::Renderer;
use myth_gl::resources::{Face3, Geometry, UniformValue, Uniforms};
use myth_gl::scene::{Camera, Node, NodeHandle, NodeKind, Scene};

const VERTEX: &str = "void main() {\n\tgl_Position = projectionMatrix * modelViewMatrix * vec4(position, 1.0);\n}\n";

const LIGHTS: &str = "uniform vec3 ambientLightColor;
uniform vec3 directionalLightColor[MAX_DIR_LIGHTS];
uniform vec3 directionalLightDirection[MAX_DIR_LIGHTS];
uniform vec3 pointLightColor[MAX_POINT_LIGHTS];
uniform vec3 pointLightPosition[MAX_POINT_LIGHTS];
uniform float pointLightDistance[MAX_POINT_LIGHTS];
";

fn fragment(uniforms: &str) -> String {
    format!("{uniforms}uniform vec3 fogColor;\nvoid main() {{\n\tgl_FragColor = vec4(1.0);\n}}\n")
}

/// A shader library whose sources declare the uniforms each built-in kind
/// refreshes.
pub fn library() -> HashMap<String, ShaderSource> {
    let common = "uniform vec3 diffuse;\nuniform float opacity;\nuniform sampler2D map;\n";
    let mut library = HashMap::new();
    let mut add = |id: &str, uniforms: String, defaults: Uniforms| {
        library.insert(
            id.to_string(),
            ShaderSource::new(VERTEX, &fragment(&uniforms), defaults),
        );
    };

    add(
        "basic",
        common.to_string(),
        Uniforms::new().with("opacity", UniformValue::Float(1.0)),
    );
    add(
        "lambert",
        format!("{common}uniform vec3 ambient;\nuniform vec3 emissive;\n{LIGHTS}"),
        Uniforms::new(),
    );
    add(
        "phong",
        format!("{common}uniform vec3 ambient;\nuniform vec3 emissive;\nuniform vec3 specular;\nuniform float shininess;\n{LIGHTS}"),
        Uniforms::new(),
    );
    add(
        "depth",
        "uniform float mNear;\nuniform float mFar;\nuniform float opacity;\n".to_string(),
        Uniforms::new(),
    );
    add(
        "normal",
        "uniform float opacity;\n".to_string(),
        Uniforms::new(),
    );
    add(
        "dashed",
        format!("{common}uniform float dashSize;\nuniform float totalSize;\nuniform float scale;\n"),
        Uniforms::new(),
    );
    add(
        "particle_basic",
        "uniform vec3 psColor;\nuniform float opacity;\nuniform float size;\nuniform float scale;\nuniform sampler2D map;\n"
            .to_string(),
        Uniforms::new(),
    );
    library
}

pub fn renderer() -> Renderer<HeadlessDevice> {
    renderer_with(RendererSettings::default())
}

/// Routes renderer logs to the test output. Set `RUST_LOG` to see them.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn renderer_with(settings: RendererSettings) -> Renderer<HeadlessDevice> {
    init_logging();
    let mut renderer = Renderer::new(HeadlessDevice::new(), Box::new(library()), settings);
    renderer.set_size(800, 600);
    renderer
}

/// A triangle facing +z, centered on the origin.
pub fn triangle() -> Geometry {
    let mut geometry = Geometry::from_faces(
        vec![
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, -0.5, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
        ],
        vec![Face3::new(0, 1, 2)],
    );
    geometry.compute_face_normals();
    geometry
}

/// A perspective camera at the origin looking down -z, added to the scene.
pub fn add_camera(scene: &mut Scene) -> NodeHandle {
    scene.add_node(Node::new(NodeKind::Camera(Camera::perspective(
        45.0, 1.0, 0.1, 1000.0,
    ))))
}

pub fn add_mesh(
    scene: &mut Scene,
    geometry: GeometryHandle,
    material: MaterialHandle,
    position: Vec3,
) -> NodeHandle {
    scene.add_node(Node::new(NodeKind::mesh(geometry, material)).with_position(position))
}

/// A scene with a camera and one basic triangle five units in front of it.
pub fn single_mesh_scene(assets: &mut Assets) -> (Scene, NodeHandle, NodeHandle) {
    let mut scene = Scene::new();
    let camera = add_camera(&mut scene);
    let geometry = assets.add_geometry(triangle());
    let material = assets.add_material(myth_gl::Material::basic(Vec3::ONE));
    let mesh = add_mesh(&mut scene, geometry, material, Vec3::new(0.0, 0.0, -5.0));
    (scene, camera, mesh)
}
