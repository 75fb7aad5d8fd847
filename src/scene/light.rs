use glam::{Mat4, Vec2, Vec3};

use crate::scene::NodeHandle;

/// Shadow state of a shadow-casting light.
///
/// The shadow map itself is rendered by a shadow plugin, which writes `map`,
/// the texture unit contents and `matrix` every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowData {
    pub map: Option<crate::assets::TextureHandle>,
    pub map_size: Vec2,
    pub matrix: Mat4,
    pub bias: f32,
    pub darkness: f32,
    pub camera_near: f32,
    pub camera_far: f32,
}

impl Default for ShadowData {
    fn default() -> Self {
        Self {
            map: None,
            map_size: Vec2::splat(512.0),
            matrix: Mat4::IDENTITY,
            bias: 0.0,
            darkness: 0.5,
            camera_near: 50.0,
            camera_far: 5000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectionalLight {
    /// Node the light points at. `None` points at the world origin.
    pub target: Option<NodeHandle>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointLight {
    /// Falloff distance; 0 means no falloff.
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub target: Option<NodeHandle>,
    pub distance: f32,
    /// Cone half-angle in radians.
    pub angle: f32,
    pub exponent: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            target: None,
            distance: 0.0,
            angle: std::f32::consts::FRAC_PI_3,
            exponent: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HemisphereLight {
    pub ground_color: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Ambient,
    Directional(DirectionalLight),
    Point(PointLight),
    Spot(SpotLight),
    Hemisphere(HemisphereLight),
}

/// Light payload of a node. Position comes from the node's world matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,

    pub cast_shadow: bool,
    /// Contributes only to shadows, never to shading.
    pub only_shadow: bool,
    pub shadow: Option<ShadowData>,
}

impl Light {
    fn with_kind(color: Vec3, intensity: f32, kind: LightKind) -> Self {
        Self {
            color,
            intensity,
            kind,
            cast_shadow: false,
            only_shadow: false,
            shadow: None,
        }
    }

    #[must_use]
    pub fn ambient(color: Vec3) -> Self {
        Self::with_kind(color, 1.0, LightKind::Ambient)
    }

    #[must_use]
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Directional(DirectionalLight::default()))
    }

    #[must_use]
    pub fn point(color: Vec3, intensity: f32, distance: f32) -> Self {
        Self::with_kind(color, intensity, LightKind::Point(PointLight { distance }))
    }

    #[must_use]
    pub fn spot(color: Vec3, intensity: f32, distance: f32, angle: f32, exponent: f32) -> Self {
        Self::with_kind(
            color,
            intensity,
            LightKind::Spot(SpotLight {
                target: None,
                distance,
                angle,
                exponent,
            }),
        )
    }

    #[must_use]
    pub fn hemisphere(sky_color: Vec3, ground_color: Vec3, intensity: f32) -> Self {
        Self::with_kind(
            sky_color,
            intensity,
            LightKind::Hemisphere(HemisphereLight { ground_color }),
        )
    }

    /// Enables shadow casting with default shadow parameters.
    #[must_use]
    pub fn with_shadow(mut self) -> Self {
        self.cast_shadow = true;
        self.shadow.get_or_insert_with(ShadowData::default);
        self
    }

    /// Directional and spot lights can cast shadows.
    #[must_use]
    pub fn casts_shadow_map(&self) -> bool {
        self.cast_shadow && matches!(self.kind, LightKind::Directional(_) | LightKind::Spot(_))
    }
}
