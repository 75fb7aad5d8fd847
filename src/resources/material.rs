use glam::{Vec2, Vec3};

use crate::assets::TextureHandle;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::{UniformValue, Uniforms};

// ============================================================================
// Render State Enums
// ============================================================================

/// Preset blend modes. `Custom` uses the material's equation and factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    None,
    #[default]
    Normal,
    Additive,
    Subtractive,
    Multiply,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
    SrcAlphaSaturate,
}

/// Which faces are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Shading {
    Flat,
    #[default]
    Smooth,
}

/// Source of per-vertex colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexColors {
    #[default]
    None,
    /// Each face's color replicated to its corners.
    Face,
    /// Per-corner colors.
    Vertex,
}

/// How the environment map combines with the surface color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Combine {
    #[default]
    Multiply,
    Mix,
    Add,
}

impl Combine {
    #[must_use]
    pub fn as_int(self) -> i32 {
        match self {
            Combine::Multiply => 0,
            Combine::Mix => 1,
            Combine::Add => 2,
        }
    }
}

// ============================================================================
// Material Kinds
// ============================================================================

/// Lambert-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertParams {
    pub ambient: Vec3,
    pub emissive: Vec3,
    pub wrap_around: bool,
    pub wrap_rgb: Vec3,
}

impl Default for LambertParams {
    fn default() -> Self {
        Self {
            ambient: Vec3::ONE,
            emissive: Vec3::ZERO,
            wrap_around: false,
            wrap_rgb: Vec3::ONE,
        }
    }
}

/// Phong-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PhongParams {
    pub ambient: Vec3,
    pub emissive: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
    pub metal: bool,
    pub per_pixel: bool,
    pub wrap_around: bool,
    pub wrap_rgb: Vec3,
    pub bump_scale: f32,
    pub normal_scale: Vec2,
}

impl Default for PhongParams {
    fn default() -> Self {
        Self {
            ambient: Vec3::ONE,
            emissive: Vec3::ZERO,
            specular: Vec3::splat(0.067),
            shininess: 30.0,
            metal: false,
            per_pixel: true,
            wrap_around: false,
            wrap_rgb: Vec3::ONE,
            bump_scale: 1.0,
            normal_scale: Vec2::ONE,
        }
    }
}

/// Dashed line parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DashParams {
    pub scale: f32,
    pub dash_size: f32,
    pub gap_size: f32,
}

impl Default for DashParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            dash_size: 3.0,
            gap_size: 1.0,
        }
    }
}

/// Point sprite parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleParams {
    pub size: f32,
    pub size_attenuation: bool,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            size: 1.0,
            size_attenuation: true,
        }
    }
}

/// Application-authored shader sources.
///
/// Uniform values live in [`Material::uniforms`]; every name there is expected
/// to be declared by the shader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderProgramSource {
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub defines: ShaderDefines,
    /// Receive scene light uniforms.
    pub lights: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    Basic,
    Lambert(LambertParams),
    Phong(PhongParams),
    Depth,
    Normal,
    LineBasic,
    LineDashed(DashParams),
    ParticleBasic(ParticleParams),
    Shader(ShaderProgramSource),
}

impl MaterialKind {
    /// Symbolic shader id in the shader library, `None` for raw sources.
    #[must_use]
    pub fn shader_id(&self) -> Option<&'static str> {
        match self {
            MaterialKind::Basic | MaterialKind::LineBasic => Some("basic"),
            MaterialKind::Lambert(_) => Some("lambert"),
            MaterialKind::Phong(_) => Some("phong"),
            MaterialKind::Depth => Some("depth"),
            MaterialKind::Normal => Some("normal"),
            MaterialKind::LineDashed(_) => Some("dashed"),
            MaterialKind::ParticleBasic(_) => Some("particle_basic"),
            MaterialKind::Shader(_) => None,
        }
    }

    /// Whether the shader consumes scene lights.
    #[must_use]
    pub fn uses_lights(&self) -> bool {
        match self {
            MaterialKind::Lambert(_) | MaterialKind::Phong(_) => true,
            MaterialKind::Shader(source) => source.lights,
            _ => false,
        }
    }
}

// ============================================================================
// Material
// ============================================================================

/// Shading parameters shared by every material kind, plus the kind payload.
///
/// Set `needs_update` after changing anything that affects the compiled
/// program (maps, fog, skinning, vertex colors, shader sources); plain value
/// changes such as `color` or `opacity` are picked up automatically.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,

    pub color: Vec3,
    pub opacity: f32,
    pub transparent: bool,
    pub visible: bool,

    pub blending: Blending,
    pub blend_equation: BlendEquation,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,

    pub depth_test: bool,
    pub depth_write: bool,
    pub polygon_offset: bool,
    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,
    pub alpha_test: f32,
    pub side: Side,

    pub wireframe: bool,
    pub wireframe_linewidth: f32,
    pub linewidth: f32,
    pub shading: Shading,
    pub vertex_colors: VertexColors,
    pub fog: bool,
    pub skinning: bool,
    pub morph_targets: bool,
    pub morph_normals: bool,

    pub map: Option<TextureHandle>,
    pub light_map: Option<TextureHandle>,
    pub specular_map: Option<TextureHandle>,
    pub bump_map: Option<TextureHandle>,
    pub normal_map: Option<TextureHandle>,
    pub env_map: Option<TextureHandle>,
    pub reflectivity: f32,
    pub refraction_ratio: f32,
    pub combine: Combine,

    pub uniforms: Uniforms,
    pub needs_update: bool,
}

impl Material {
    #[must_use]
    pub fn new(kind: MaterialKind) -> Self {
        let fog = !matches!(kind, MaterialKind::Depth | MaterialKind::Normal);
        Self {
            name: String::new(),
            kind,
            color: Vec3::ONE,
            opacity: 1.0,
            transparent: false,
            visible: true,
            blending: Blending::Normal,
            blend_equation: BlendEquation::Add,
            blend_src: BlendFactor::SrcAlpha,
            blend_dst: BlendFactor::OneMinusSrcAlpha,
            depth_test: true,
            depth_write: true,
            polygon_offset: false,
            polygon_offset_factor: 0.0,
            polygon_offset_units: 0.0,
            alpha_test: 0.0,
            side: Side::Front,
            wireframe: false,
            wireframe_linewidth: 1.0,
            linewidth: 1.0,
            shading: Shading::Smooth,
            vertex_colors: VertexColors::None,
            fog,
            skinning: false,
            morph_targets: false,
            morph_normals: false,
            map: None,
            light_map: None,
            specular_map: None,
            bump_map: None,
            normal_map: None,
            env_map: None,
            reflectivity: 1.0,
            refraction_ratio: 0.98,
            combine: Combine::Multiply,
            uniforms: Uniforms::new(),
            needs_update: true,
        }
    }

    #[must_use]
    pub fn basic(color: Vec3) -> Self {
        Self {
            color,
            ..Self::new(MaterialKind::Basic)
        }
    }

    #[must_use]
    pub fn lambert(color: Vec3) -> Self {
        Self {
            color,
            ..Self::new(MaterialKind::Lambert(LambertParams::default()))
        }
    }

    #[must_use]
    pub fn phong(color: Vec3) -> Self {
        Self {
            color,
            ..Self::new(MaterialKind::Phong(PhongParams::default()))
        }
    }

    #[must_use]
    pub fn depth() -> Self {
        Self::new(MaterialKind::Depth)
    }

    #[must_use]
    pub fn normal() -> Self {
        Self::new(MaterialKind::Normal)
    }

    #[must_use]
    pub fn line_basic(color: Vec3) -> Self {
        Self {
            color,
            ..Self::new(MaterialKind::LineBasic)
        }
    }

    #[must_use]
    pub fn line_dashed(color: Vec3, dash: DashParams) -> Self {
        Self {
            color,
            ..Self::new(MaterialKind::LineDashed(dash))
        }
    }

    #[must_use]
    pub fn particle_basic(color: Vec3, size: f32) -> Self {
        Self {
            color,
            ..Self::new(MaterialKind::ParticleBasic(ParticleParams {
                size,
                size_attenuation: true,
            }))
        }
    }

    #[must_use]
    pub fn shader(vertex_shader: &str, fragment_shader: &str, uniforms: Uniforms) -> Self {
        Self {
            uniforms,
            fog: false,
            ..Self::new(MaterialKind::Shader(ShaderProgramSource {
                vertex_shader: vertex_shader.to_string(),
                fragment_shader: fragment_shader.to_string(),
                defines: ShaderDefines::new(),
                lights: false,
            }))
        }
    }

    #[must_use]
    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn with_vertex_colors(mut self, vertex_colors: VertexColors) -> Self {
        self.vertex_colors = vertex_colors;
        self
    }

    #[must_use]
    pub fn with_map(mut self, map: TextureHandle) -> Self {
        self.map = Some(map);
        self
    }

    /// Sets a user uniform value.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.uniforms.set(name, value);
    }

    // ========================================================================
    // Attribute requirements
    // ========================================================================

    #[must_use]
    pub fn is_shader(&self) -> bool {
        matches!(self.kind, MaterialKind::Shader(_))
    }

    /// Normals are needed for everything except unlit materials without an
    /// environment map.
    #[must_use]
    pub fn needs_normals(&self) -> bool {
        match self.kind {
            MaterialKind::Basic => self.env_map.is_some(),
            MaterialKind::Depth
            | MaterialKind::LineBasic
            | MaterialKind::LineDashed(_)
            | MaterialKind::ParticleBasic(_) => false,
            _ => true,
        }
    }

    #[must_use]
    pub fn needs_flat_normals(&self) -> bool {
        self.shading == Shading::Flat
    }

    #[must_use]
    pub fn needs_uvs(&self) -> bool {
        self.is_shader()
            || self.map.is_some()
            || self.light_map.is_some()
            || self.bump_map.is_some()
            || self.normal_map.is_some()
            || self.specular_map.is_some()
    }

    #[must_use]
    pub fn needs_colors(&self) -> bool {
        self.vertex_colors != VertexColors::None
    }

    #[must_use]
    pub fn needs_line_distances(&self) -> bool {
        matches!(self.kind, MaterialKind::LineDashed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_basic_shares_the_basic_shader() {
        assert_eq!(MaterialKind::LineBasic.shader_id(), Some("basic"));
        assert_eq!(Material::basic(Vec3::ONE).kind.shader_id(), Some("basic"));
    }

    #[test]
    fn attribute_requirements_follow_parameters() {
        let basic = Material::basic(Vec3::ONE);
        assert!(!basic.needs_normals());
        assert!(!basic.needs_uvs());

        let phong = Material::phong(Vec3::ONE).with_vertex_colors(VertexColors::Face);
        assert!(phong.needs_normals());
        assert!(phong.needs_colors());

        let shader = Material::shader("void main() {}", "void main() {}", Uniforms::new());
        assert!(shader.needs_uvs());
        assert!(!shader.fog);
    }
}
