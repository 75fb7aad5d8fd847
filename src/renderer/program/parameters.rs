//! Program Parameters
//!
//! Everything besides the shader sources that changes the generated program
//! text. Two materials with equal parameters, sources and defines share one
//! compiled program.

use log::warn;
use serde::{Serialize, Serializer};

use crate::renderer::device::DeviceCapabilities;
use crate::renderer::lights::LightBudget;
use crate::renderer::settings::{Precision, RendererSettings, ShadowMapType};
use crate::resources::{Material, MaterialKind, Side, VertexColors};
use crate::scene::Fog;

/// An `f32` stored by bit pattern so it can take part in hashing.
///
/// Serialized as a GLSL float literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FloatKey(u32);

impl FloatKey {
    #[must_use]
    pub fn new(value: f32) -> Self {
        Self(value.to_bits())
    }

    #[must_use]
    pub fn get(self) -> f32 {
        f32::from_bits(self.0)
    }
}

impl Serialize for FloatKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:?}", self.get()))
    }
}

/// Inputs to [`ProgramParameters::from_material`] that come from the frame
/// rather than the material.
#[derive(Debug, Clone, Copy)]
pub struct ParameterContext<'a> {
    pub settings: &'a RendererSettings,
    pub capabilities: DeviceCapabilities,
    pub lights: LightBudget,
    /// Shadow-casting lights in the scene.
    pub shadows: u32,
    pub fog: Option<&'a Fog>,
    /// Bones of the skeleton of the object being initialized.
    pub bone_count: u32,
    pub receive_shadow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ProgramParameters {
    pub precision: Precision,
    pub supports_vertex_textures: bool,

    pub map: bool,
    pub env_map: bool,
    pub light_map: bool,
    pub bump_map: bool,
    pub normal_map: bool,
    pub specular_map: bool,
    pub vertex_colors: bool,

    pub fog: bool,
    pub fog_exp2: bool,
    pub size_attenuation: bool,

    pub skinning: bool,
    pub max_bones: u32,

    pub morph_targets: bool,
    pub morph_normals: bool,
    pub max_morph_targets: u32,
    pub max_morph_normals: u32,

    pub max_dir_lights: u32,
    pub max_point_lights: u32,
    pub max_spot_lights: u32,
    pub max_hemi_lights: u32,
    pub max_shadows: u32,

    pub shadow_map_enabled: bool,
    pub shadow_map_type: ShadowMapType,
    pub shadow_map_debug: bool,

    pub alpha_test: FloatKey,
    pub metal: bool,
    pub wrap_around: bool,
    pub per_pixel: bool,
    pub double_sided: bool,
    pub flip_sided: bool,

    pub gamma_input: bool,
    pub gamma_output: bool,
    pub physically_based_shading: bool,
}

/// Bones that fit in the vertex uniform budget, leaving room for the
/// built-in matrices.
#[must_use]
pub fn allocate_bones(capabilities: &DeviceCapabilities, bone_count: u32) -> u32 {
    let budget = capabilities.max_vertex_uniform_vectors.saturating_sub(20) / 4;
    if bone_count > budget {
        warn!("Skeleton has {bone_count} bones, only {budget} fit in the vertex uniforms");
    }
    bone_count.min(budget)
}

impl ProgramParameters {
    #[must_use]
    pub fn from_material(material: &Material, ctx: &ParameterContext<'_>) -> Self {
        let settings = ctx.settings;
        let lit = material.kind.uses_lights();
        let lights = if lit { ctx.lights } else { LightBudget::default() };

        let skinning = material.skinning && ctx.bone_count > 0;
        let max_bones = if skinning {
            allocate_bones(&ctx.capabilities, ctx.bone_count)
        } else {
            0
        };

        let (metal, wrap_around, per_pixel) = match &material.kind {
            MaterialKind::Phong(p) => (p.metal, p.wrap_around, p.per_pixel),
            MaterialKind::Lambert(l) => (false, l.wrap_around, false),
            _ => (false, false, false),
        };
        let size_attenuation = match &material.kind {
            MaterialKind::ParticleBasic(p) => p.size_attenuation,
            _ => false,
        };

        let fog = material.fog && ctx.fog.is_some();
        let max_shadows = if lit { ctx.shadows } else { 0 };

        Self {
            precision: settings.precision,
            supports_vertex_textures: ctx.capabilities.supports_vertex_textures(),

            map: material.map.is_some(),
            env_map: material.env_map.is_some(),
            light_map: material.light_map.is_some(),
            bump_map: material.bump_map.is_some(),
            normal_map: material.normal_map.is_some(),
            specular_map: material.specular_map.is_some(),
            vertex_colors: material.vertex_colors != VertexColors::None,

            fog,
            fog_exp2: fog && matches!(ctx.fog, Some(Fog::Exp2 { .. })),
            size_attenuation,

            skinning,
            max_bones,

            morph_targets: material.morph_targets,
            morph_normals: material.morph_normals,
            max_morph_targets: settings.max_morph_targets,
            max_morph_normals: settings.max_morph_normals,

            max_dir_lights: lights.directional,
            max_point_lights: lights.point,
            max_spot_lights: lights.spot,
            max_hemi_lights: lights.hemisphere,
            max_shadows,

            shadow_map_enabled: settings.shadow_map_enabled && ctx.receive_shadow && max_shadows > 0,
            shadow_map_type: settings.shadow_map_type,
            shadow_map_debug: settings.shadow_map_debug,

            alpha_test: FloatKey::new(material.alpha_test),
            metal,
            wrap_around,
            per_pixel,
            double_sided: material.side == Side::Double,
            flip_sided: material.side == Side::Back,

            gamma_input: settings.gamma_input,
            gamma_output: settings.gamma_output,
            physically_based_shading: settings.physically_based_shading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn context(settings: &RendererSettings) -> ParameterContext<'_> {
        ParameterContext {
            settings,
            capabilities: DeviceCapabilities::default(),
            lights: LightBudget {
                directional: 1,
                point: 2,
                spot: 0,
                hemisphere: 0,
            },
            shadows: 0,
            fog: None,
            bone_count: 0,
            receive_shadow: false,
        }
    }

    #[test]
    fn unlit_materials_ignore_the_light_budget() {
        let settings = RendererSettings::default();
        let ctx = context(&settings);

        let basic = ProgramParameters::from_material(&Material::basic(Vec3::ONE), &ctx);
        assert_eq!(basic.max_point_lights, 0);

        let lambert = ProgramParameters::from_material(&Material::lambert(Vec3::ONE), &ctx);
        assert_eq!(lambert.max_point_lights, 2);
    }

    #[test]
    fn bone_budget_is_capped_by_uniform_vectors() {
        let caps = DeviceCapabilities {
            max_vertex_uniform_vectors: 100,
            ..DeviceCapabilities::default()
        };
        assert_eq!(allocate_bones(&caps, 50), 20);
        assert_eq!(allocate_bones(&caps, 8), 8);
    }

    #[test]
    fn alpha_test_serializes_as_float_literal() {
        assert_eq!(format!("{:?}", FloatKey::new(1.0).get()), "1.0");
    }
}
