//! Uniform Refresh
//!
//! Two halves:
//!
//! - **Refresh**: material parameters, fog, scene lights and shadows are
//!   copied into a material's [`Uniforms`]. Runs only when the program,
//!   material or camera changed since the previous draw.
//! - **Upload**: values are sent through the locations of the program in
//!   use. Each sampler gets the next free texture unit.
//!
//! Camera and object matrices are uploaded separately, on every draw.

use glam::{Mat3, Mat4, Vec3, Vec4};
use log::{error, warn};

use crate::assets::{AssetStorage, TextureHandle};
use crate::renderer::device::{GraphicsDevice, UniformData, UniformLocation};
use crate::renderer::info::RenderInfo;
use crate::renderer::lights::LightArrays;
use crate::renderer::program::Program;
use crate::renderer::texture_manager::TextureManager;
use crate::resources::{
    DashParams, LambertParams, Material, MaterialKind, ParticleParams, PhongParams, Texture,
    UniformValue, Uniforms,
};
use crate::scene::{Camera, Fog, NodeKind, Scene};

// ============================================================================
// Frame inputs
// ============================================================================

/// Shadow uniforms of the frame's shadow-casting lights, in light order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowArrays {
    pub maps: Vec<Option<TextureHandle>>,
    /// Two floats per light.
    pub map_sizes: Vec<f32>,
    pub matrices: Vec<Mat4>,
    pub darkness: Vec<f32>,
    pub bias: Vec<f32>,
}

impl ShadowArrays {
    #[must_use]
    pub fn gather(scene: &Scene) -> Self {
        let mut arrays = Self::default();
        for node in scene.lights().iter().filter_map(|&h| scene.node(h)) {
            let NodeKind::Light(light) = &node.kind else {
                continue;
            };
            if !light.casts_shadow_map() {
                continue;
            }
            let Some(shadow) = &light.shadow else {
                continue;
            };
            arrays.maps.push(shadow.map);
            arrays.map_sizes.extend_from_slice(&shadow.map_size.to_array());
            arrays.matrices.push(shadow.matrix);
            arrays.darkness.push(shadow.darkness);
            arrays.bias.push(shadow.bias);
        }
        arrays
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }
}

/// Frame-wide values the material refresh reads.
#[derive(Debug, Clone, Copy)]
pub struct FrameUniforms<'a> {
    pub fog: Option<&'a Fog>,
    pub lights: &'a LightArrays,
    pub shadows: &'a ShadowArrays,
    pub camera_near: f32,
    pub camera_far: f32,
    /// Half the drawing buffer height. Scales attenuated point sizes.
    pub half_height: f32,
    pub gamma_input: bool,
}

// ============================================================================
// Refresh
// ============================================================================

fn color(value: Vec3, gamma_input: bool) -> UniformValue {
    UniformValue::Color(if gamma_input { value * value } else { value })
}

/// Writes every built-in uniform `material` feeds into `uniforms`.
pub fn refresh_material(
    uniforms: &mut Uniforms,
    material: &Material,
    textures: &AssetStorage<TextureHandle, Texture>,
    frame: &FrameUniforms<'_>,
    receive_shadow: bool,
) {
    if material.fog
        && let Some(fog) = frame.fog
    {
        refresh_fog(uniforms, fog);
    }

    if material.kind.uses_lights() {
        refresh_lights(uniforms, frame.lights);
    }

    let gamma = frame.gamma_input;
    match &material.kind {
        MaterialKind::Basic => refresh_common(uniforms, material, textures, gamma),
        MaterialKind::Lambert(params) => {
            refresh_common(uniforms, material, textures, gamma);
            refresh_lambert(uniforms, params, gamma);
        }
        MaterialKind::Phong(params) => {
            refresh_common(uniforms, material, textures, gamma);
            refresh_phong(uniforms, material, params, gamma);
        }
        MaterialKind::LineBasic => refresh_line(uniforms, material, gamma),
        MaterialKind::LineDashed(dash) => {
            refresh_line(uniforms, material, gamma);
            refresh_dash(uniforms, dash);
        }
        MaterialKind::ParticleBasic(params) => {
            refresh_particle(uniforms, material, params, frame.half_height);
        }
        MaterialKind::Depth => {
            uniforms.set("mNear", UniformValue::Float(frame.camera_near));
            uniforms.set("mFar", UniformValue::Float(frame.camera_far));
            uniforms.set("opacity", UniformValue::Float(material.opacity));
        }
        MaterialKind::Normal => {
            uniforms.set("opacity", UniformValue::Float(material.opacity));
        }
        MaterialKind::Shader(_) => {}
    }

    if receive_shadow && !frame.shadows.is_empty() {
        refresh_shadow(uniforms, frame.shadows);
    }
}

fn refresh_common(
    uniforms: &mut Uniforms,
    material: &Material,
    textures: &AssetStorage<TextureHandle, Texture>,
    gamma_input: bool,
) {
    uniforms.set("opacity", UniformValue::Float(material.opacity));
    uniforms.set("diffuse", color(material.color, gamma_input));

    uniforms.set("map", UniformValue::Texture(material.map));
    uniforms.set("lightMap", UniformValue::Texture(material.light_map));
    uniforms.set("specularMap", UniformValue::Texture(material.specular_map));
    uniforms.set("bumpMap", UniformValue::Texture(material.bump_map));
    uniforms.set("normalMap", UniformValue::Texture(material.normal_map));

    // All maps share one uv transform, taken from the first one present.
    let uv_source = [
        material.map,
        material.specular_map,
        material.normal_map,
        material.bump_map,
    ]
    .into_iter()
    .flatten()
    .find_map(|handle| textures.get(handle));
    if let Some(texture) = uv_source {
        uniforms.set(
            "offsetRepeat",
            UniformValue::Vec4(Vec4::new(
                texture.offset.x,
                texture.offset.y,
                texture.repeat.x,
                texture.repeat.y,
            )),
        );
    }

    uniforms.set("envMap", UniformValue::Texture(material.env_map));
    uniforms.set("flipEnvMap", UniformValue::Float(1.0));
    uniforms.set("useRefract", UniformValue::Int(0));
    uniforms.set("reflectivity", UniformValue::Float(material.reflectivity));
    uniforms.set("refractionRatio", UniformValue::Float(material.refraction_ratio));
    uniforms.set("combine", UniformValue::Int(material.combine.as_int()));
}

fn refresh_lambert(uniforms: &mut Uniforms, params: &LambertParams, gamma_input: bool) {
    uniforms.set("ambient", color(params.ambient, gamma_input));
    uniforms.set("emissive", color(params.emissive, gamma_input));
    if params.wrap_around {
        uniforms.set("wrapRGB", UniformValue::Vec3(params.wrap_rgb));
    }
}

fn refresh_phong(
    uniforms: &mut Uniforms,
    material: &Material,
    params: &PhongParams,
    gamma_input: bool,
) {
    uniforms.set("shininess", UniformValue::Float(params.shininess));
    uniforms.set("ambient", color(params.ambient, gamma_input));
    uniforms.set("emissive", color(params.emissive, gamma_input));
    uniforms.set("specular", color(params.specular, gamma_input));
    if params.wrap_around {
        uniforms.set("wrapRGB", UniformValue::Vec3(params.wrap_rgb));
    }
    if material.bump_map.is_some() {
        uniforms.set("bumpScale", UniformValue::Float(params.bump_scale));
    }
    if material.normal_map.is_some() {
        uniforms.set("normalScale", UniformValue::Vec2(params.normal_scale));
    }
}

fn refresh_line(uniforms: &mut Uniforms, material: &Material, gamma_input: bool) {
    uniforms.set("diffuse", color(material.color, gamma_input));
    uniforms.set("opacity", UniformValue::Float(material.opacity));
}

fn refresh_dash(uniforms: &mut Uniforms, dash: &DashParams) {
    uniforms.set("dashSize", UniformValue::Float(dash.dash_size));
    uniforms.set("totalSize", UniformValue::Float(dash.dash_size + dash.gap_size));
    uniforms.set("scale", UniformValue::Float(dash.scale));
}

fn refresh_particle(
    uniforms: &mut Uniforms,
    material: &Material,
    params: &ParticleParams,
    half_height: f32,
) {
    uniforms.set("psColor", UniformValue::Color(material.color));
    uniforms.set("opacity", UniformValue::Float(material.opacity));
    uniforms.set("size", UniformValue::Float(params.size));
    uniforms.set("scale", UniformValue::Float(half_height));
    uniforms.set("map", UniformValue::Texture(material.map));
}

fn refresh_fog(uniforms: &mut Uniforms, fog: &Fog) {
    uniforms.set("fogColor", UniformValue::Color(fog.color()));
    match *fog {
        Fog::Linear { near, far, .. } => {
            uniforms.set("fogNear", UniformValue::Float(near));
            uniforms.set("fogFar", UniformValue::Float(far));
        }
        Fog::Exp2 { density, .. } => {
            uniforms.set("fogDensity", UniformValue::Float(density));
        }
    }
}

fn refresh_lights(uniforms: &mut Uniforms, lights: &LightArrays) {
    let arrays = [
        ("directionalLightColor", &lights.directional_colors),
        ("directionalLightDirection", &lights.directional_directions),
        ("pointLightColor", &lights.point_colors),
        ("pointLightPosition", &lights.point_positions),
        ("spotLightColor", &lights.spot_colors),
        ("spotLightPosition", &lights.spot_positions),
        ("spotLightDirection", &lights.spot_directions),
        ("hemisphereLightSkyColor", &lights.hemi_sky_colors),
        ("hemisphereLightGroundColor", &lights.hemi_ground_colors),
        ("hemisphereLightDirection", &lights.hemi_directions),
    ];
    uniforms.set("ambientLightColor", UniformValue::Vec3(lights.ambient));
    for (name, values) in arrays {
        uniforms.set(name, UniformValue::Vec3Array(values.clone()));
    }

    let scalars = [
        ("pointLightDistance", &lights.point_distances),
        ("spotLightDistance", &lights.spot_distances),
        ("spotLightAngleCos", &lights.spot_angles_cos),
        ("spotLightExponent", &lights.spot_exponents),
    ];
    for (name, values) in scalars {
        uniforms.set(name, UniformValue::FloatArray(values.clone()));
    }
}

fn refresh_shadow(uniforms: &mut Uniforms, shadows: &ShadowArrays) {
    uniforms.set("shadowMap", UniformValue::TextureArray(shadows.maps.clone()));
    uniforms.set("shadowMapSize", UniformValue::Vec2Array(shadows.map_sizes.clone()));
    uniforms.set("shadowMatrix", UniformValue::Mat4Array(shadows.matrices.clone()));
    uniforms.set("shadowDarkness", UniformValue::FloatArray(shadows.darkness.clone()));
    uniforms.set("shadowBias", UniformValue::FloatArray(shadows.bias.clone()));
}

// ============================================================================
// Upload
// ============================================================================

/// Hands out texture units and binds sampler textures to them.
pub struct TextureBinder<'a> {
    pub manager: &'a mut TextureManager,
    pub textures: &'a mut AssetStorage<TextureHandle, Texture>,
    pub info: &'a mut RenderInfo,
    next_unit: u32,
    max_units: u32,
}

impl<'a> TextureBinder<'a> {
    pub fn new(
        manager: &'a mut TextureManager,
        textures: &'a mut AssetStorage<TextureHandle, Texture>,
        info: &'a mut RenderInfo,
        max_units: u32,
    ) -> Self {
        Self {
            manager,
            textures,
            info,
            next_unit: 0,
            max_units,
        }
    }

    /// Units allocated so far.
    #[inline]
    #[must_use]
    pub fn used_units(&self) -> u32 {
        self.next_unit
    }

    fn allocate_unit(&mut self) -> u32 {
        let unit = self.next_unit;
        if unit >= self.max_units {
            warn!(
                "Using texture unit {unit}, the device only supports {}",
                self.max_units
            );
        }
        self.next_unit += 1;
        unit
    }

    /// Allocates a unit and binds `texture` to it.
    pub fn bind(&mut self, device: &mut impl GraphicsDevice, texture: Option<TextureHandle>) -> u32 {
        let unit = self.allocate_unit();
        let Some(handle) = texture else {
            return unit;
        };
        let Some(data) = self.textures.get_mut(handle) else {
            warn!("Sampler references a missing texture");
            return unit;
        };
        if let Err(err) = self.manager.bind(device, handle, data, unit, self.info) {
            error!("Failed to bind texture '{}': {err}", data.name);
        }
        unit
    }
}

fn is_empty_array(value: &UniformValue) -> bool {
    match value {
        UniformValue::IntArray(v) => v.is_empty(),
        UniformValue::FloatArray(v)
        | UniformValue::Vec2Array(v)
        | UniformValue::Vec3Array(v)
        | UniformValue::Vec4Array(v) => v.is_empty(),
        UniformValue::Mat4Array(v) => v.is_empty(),
        UniformValue::TextureArray(v) => v.is_empty(),
        _ => false,
    }
}

fn upload_value(
    device: &mut impl GraphicsDevice,
    location: UniformLocation,
    value: &UniformValue,
    binder: &mut TextureBinder<'_>,
) {
    match value {
        UniformValue::Int(v) => device.set_uniform(location, UniformData::Int1(&[*v])),
        UniformValue::Float(v) => device.set_uniform(location, UniformData::Float1(&[*v])),
        UniformValue::Vec2(v) => device.set_uniform(location, UniformData::Float2(&v.to_array())),
        UniformValue::Vec3(v) | UniformValue::Color(v) => {
            device.set_uniform(location, UniformData::Float3(&v.to_array()));
        }
        UniformValue::Vec4(v) => device.set_uniform(location, UniformData::Float4(&v.to_array())),
        UniformValue::Mat3(m) => {
            device.set_uniform(location, UniformData::Matrix3(&m.to_cols_array()));
        }
        UniformValue::Mat4(m) => {
            device.set_uniform(location, UniformData::Matrix4(&m.to_cols_array()));
        }
        UniformValue::IntArray(v) => device.set_uniform(location, UniformData::Int1(v)),
        UniformValue::FloatArray(v) => device.set_uniform(location, UniformData::Float1(v)),
        UniformValue::Vec2Array(v) => device.set_uniform(location, UniformData::Float2(v)),
        UniformValue::Vec3Array(v) => device.set_uniform(location, UniformData::Float3(v)),
        UniformValue::Vec4Array(v) => device.set_uniform(location, UniformData::Float4(v)),
        UniformValue::Mat4Array(matrices) => {
            let flat: Vec<f32> = matrices.iter().flat_map(Mat4::to_cols_array).collect();
            device.set_uniform(location, UniformData::Matrix4(&flat));
        }
        UniformValue::Texture(texture) => {
            let unit = binder.bind(device, *texture) as i32;
            device.set_uniform(location, UniformData::Int1(&[unit]));
        }
        UniformValue::TextureArray(textures) => {
            let units: Vec<i32> = textures
                .iter()
                .map(|&texture| binder.bind(device, texture) as i32)
                .collect();
            device.set_uniform(location, UniformData::Int1(&units));
        }
    }
}

/// Uploads `uniforms` through `program`'s locations.
///
/// Empty arrays are skipped. Returns the names the program does not declare.
pub fn upload_uniforms<'u>(
    device: &mut impl GraphicsDevice,
    program: &Program,
    uniforms: impl IntoIterator<Item = (&'u str, &'u UniformValue)>,
    binder: &mut TextureBinder<'_>,
) -> Vec<&'u str> {
    let mut missing = Vec::new();
    for (name, value) in uniforms {
        let Some(location) = program.uniform(name) else {
            missing.push(name);
            continue;
        };
        if is_empty_array(value) {
            continue;
        }
        upload_value(device, location, value, binder);
    }
    missing
}

// ============================================================================
// Per-draw matrices
// ============================================================================

/// Matrices derived from one object's world transform and the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectMatrices {
    pub model: Mat4,
    pub model_view: Mat4,
    pub normal: Mat3,
}

impl ObjectMatrices {
    #[must_use]
    pub fn new(world: Mat4, view: &Mat4) -> Self {
        let model_view = *view * world;
        let normal = Mat3::from_mat4(model_view).inverse().transpose();
        Self {
            model: world,
            model_view,
            normal,
        }
    }
}

fn set_mat4(device: &mut impl GraphicsDevice, program: &Program, name: &str, matrix: &Mat4) {
    if let Some(location) = program.uniform(name) {
        device.set_uniform(location, UniformData::Matrix4(&matrix.to_cols_array()));
    }
}

/// Uploads the camera and object matrices every draw needs.
pub fn upload_matrices(
    device: &mut impl GraphicsDevice,
    program: &Program,
    camera: &Camera,
    camera_position: Vec3,
    object: &ObjectMatrices,
) {
    set_mat4(device, program, "projectionMatrix", camera.projection_matrix());
    set_mat4(device, program, "viewMatrix", camera.view_matrix());
    if let Some(location) = program.uniform("cameraPosition") {
        device.set_uniform(location, UniformData::Float3(&camera_position.to_array()));
    }

    set_mat4(device, program, "modelMatrix", &object.model);
    set_mat4(device, program, "modelViewMatrix", &object.model_view);
    if let Some(location) = program.uniform("normalMatrix") {
        device.set_uniform(location, UniformData::Matrix3(&object.normal.to_cols_array()));
    }
}

/// Uploads joint matrices, truncated to the program's bone budget.
pub fn upload_bones(
    device: &mut impl GraphicsDevice,
    program: &Program,
    joints: &[Mat4],
    max_bones: usize,
) {
    let Some(location) = program.uniform("boneGlobalMatrices") else {
        return;
    };
    if joints.is_empty() {
        return;
    }
    let flat: Vec<f32> = joints
        .iter()
        .take(max_bones)
        .flat_map(Mat4::to_cols_array)
        .collect();
    device.set_uniform(location, UniformData::Matrix4(&flat));
}

/// Picks the `slots` strongest morph targets.
///
/// Returns `(target index, influence)` per slot, strongest first. Ties keep
/// target order. Slots beyond the number of targets are absent.
#[must_use]
pub fn select_morph_targets(influences: &[f32], slots: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = influences.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(slots);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strongest_morph_targets_come_first() {
        let picked = select_morph_targets(&[0.1, 0.9, 0.0, 0.5], 2);
        assert_eq!(picked, vec![(1, 0.9), (3, 0.5)]);

        let ties = select_morph_targets(&[0.5, 0.5, 0.5], 8);
        assert_eq!(ties.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn dashed_lines_get_total_size() {
        let mut uniforms = Uniforms::new();
        refresh_dash(
            &mut uniforms,
            &DashParams {
                scale: 2.0,
                dash_size: 3.0,
                gap_size: 1.5,
            },
        );
        assert_eq!(uniforms.get("totalSize"), Some(&UniformValue::Float(4.5)));
        assert_eq!(uniforms.get("scale"), Some(&UniformValue::Float(2.0)));
    }

    #[test]
    fn gamma_input_squares_material_colors() {
        let mut uniforms = Uniforms::new();
        let material = Material::basic(Vec3::new(0.5, 1.0, 0.0));
        refresh_line(&mut uniforms, &material, true);
        assert_eq!(
            uniforms.get("diffuse"),
            Some(&UniformValue::Color(Vec3::new(0.25, 1.0, 0.0)))
        );
    }

    #[test]
    fn exp2_fog_sets_density_only() {
        let mut uniforms = Uniforms::new();
        refresh_fog(
            &mut uniforms,
            &Fog::Exp2 {
                color: Vec3::ONE,
                density: 0.25,
            },
        );
        assert!(uniforms.contains("fogDensity"));
        assert!(!uniforms.contains("fogNear"));
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let matrices = ObjectMatrices::new(world, &Mat4::IDENTITY);
        let n = matrices.normal * Vec3::X;
        assert!((n - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
    }
}
