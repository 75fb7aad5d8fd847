//! Core resource definitions
//!
//! CPU-side data consumed by the renderer, independent of any device:
//! - Geometry: faces, vertices and per-face attributes with dirty flags
//! - Material: shading parameters and material kinds
//! - Texture: image data and sampler configuration
//! - Uniforms: named uniform values
//! - ShaderDefines: user `#define` sets for shader materials

pub mod geometry;
pub mod material;
pub mod shader_defines;
pub mod texture;
pub mod uniforms;

pub use geometry::{
    AttributeBinding, BoundingSphere, CustomAttribute, DirtyFlags, Face3, Geometry, MorphNormals,
    MorphTarget,
};
pub use material::{
    BlendEquation, BlendFactor, Blending, Combine, DashParams, LambertParams, Material,
    MaterialKind, ParticleParams, PhongParams, Shading, ShaderProgramSource, Side, VertexColors,
};
pub use shader_defines::ShaderDefines;
pub use texture::{Filter, ImageData, PixelFormat, Texture, Wrapping};
pub use uniforms::{UniformValue, Uniforms};
