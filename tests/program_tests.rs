//! Program cache tests
//!
//! Code keys, usage counting, deletion at zero and build failures.

use myth_gl::renderer::device::HeadlessDevice;
use myth_gl::renderer::program::{ProgramCache, ProgramDescriptor, ProgramParameters};
use myth_gl::resources::ShaderDefines;

const VERTEX: &str = "void main() { gl_Position = vec4(position, 1.0); }";
const FRAGMENT: &str = "uniform vec3 diffuse;\nvoid main() { gl_FragColor = vec4(diffuse, 1.0); }";

fn descriptor<'a>(
    shader_id: Option<&'a str>,
    defines: &'a ShaderDefines,
    parameters: &'a ProgramParameters,
) -> ProgramDescriptor<'a> {
    ProgramDescriptor {
        shader_id,
        vertex_source: VERTEX,
        fragment_source: FRAGMENT,
        defines,
        parameters,
    }
}

#[test]
fn identical_descriptors_share_one_program() {
    let mut device = HeadlessDevice::new();
    let mut cache = ProgramCache::new();
    let defines = ShaderDefines::new();
    let parameters = ProgramParameters::default();
    let desc = descriptor(Some("basic"), &defines, &parameters);

    let a = cache.resolve(&mut device, &desc).unwrap();
    let b = cache.resolve(&mut device, &desc).unwrap();

    assert_eq!(a, b);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(a).unwrap().usage, 2);
    assert_eq!(device.live_program_count(), 1);
}

#[test]
fn program_is_deleted_when_the_last_user_releases_it() {
    let mut device = HeadlessDevice::new();
    let mut cache = ProgramCache::new();
    let defines = ShaderDefines::new();
    let parameters = ProgramParameters::default();
    let desc = descriptor(Some("basic"), &defines, &parameters);
    let handle = cache.resolve(&mut device, &desc).unwrap();
    cache.resolve(&mut device, &desc).unwrap();

    assert!(!cache.release(&mut device, handle));
    assert_eq!(device.live_program_count(), 1);

    assert!(cache.release(&mut device, handle));
    assert!(cache.is_empty());
    assert_eq!(device.live_program_count(), 0);

    // Resolving again builds a fresh program.
    let rebuilt = cache.resolve(&mut device, &desc).unwrap();
    assert_eq!(cache.get(rebuilt).unwrap().usage, 1);
}

#[test]
fn parameters_and_defines_change_the_code() {
    let plain_defines = ShaderDefines::new();
    let mut fancy_defines = ShaderDefines::new();
    fancy_defines.set("FANCY", "1");
    let plain = ProgramParameters::default();
    let fogged = ProgramParameters {
        fog: true,
        ..ProgramParameters::default()
    };

    let base = descriptor(Some("basic"), &plain_defines, &plain).code();
    assert_ne!(base, descriptor(Some("basic"), &plain_defines, &fogged).code());
    assert_ne!(base, descriptor(Some("basic"), &fancy_defines, &plain).code());
    assert_ne!(base, descriptor(Some("lambert"), &plain_defines, &plain).code());
    assert_eq!(base, descriptor(Some("basic"), &plain_defines, &plain).code());
}

#[test]
fn sources_key_programs_without_a_shader_id() {
    let defines = ShaderDefines::new();
    let parameters = ProgramParameters::default();
    let a = descriptor(None, &defines, &parameters);
    let b = ProgramDescriptor {
        fragment_source: "void main() { gl_FragColor = vec4(0.0); }",
        ..a
    };
    assert_ne!(a.code(), b.code());
}

#[test]
fn introspection_exposes_locations() {
    let mut device = HeadlessDevice::new();
    let mut cache = ProgramCache::new();
    let defines = ShaderDefines::new();
    let parameters = ProgramParameters::default();
    let handle = cache
        .resolve(&mut device, &descriptor(None, &defines, &parameters))
        .unwrap();

    let program = cache.get(handle).unwrap();
    assert!(program.uniform("diffuse").is_some());
    assert!(program.uniform("modelViewMatrix").is_some());
    assert!(program.attribute("position").is_some());
    assert!(program.uniform("notDeclared").is_none());
}

#[test]
fn compile_failure_yields_none_and_caches_nothing() {
    let mut device = HeadlessDevice::new();
    device.fail_compiles_containing("diffuse");
    let mut cache = ProgramCache::new();
    let defines = ShaderDefines::new();
    let parameters = ProgramParameters::default();

    let resolved = cache.resolve(&mut device, &descriptor(None, &defines, &parameters));

    assert!(resolved.is_none());
    assert!(cache.is_empty());
    assert_eq!(device.live_program_count(), 0);
}
