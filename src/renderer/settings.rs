//! Renderer Settings
//!
//! Construction-time configuration of a [`Renderer`](crate::renderer::Renderer).
//! Settings are plain data and can be loaded from any serde format.
//!
//! ```rust,ignore
//! use myth_gl::RendererSettings;
//!
//! let settings = RendererSettings {
//!     max_lights: 8,
//!     sort_objects: false,
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Precision / Shadow map type
// ---------------------------------------------------------------------------

/// Float precision qualifier emitted at the top of every generated shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Highp,
    Mediump,
    Lowp,
}

impl Precision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Highp => "highp",
            Precision::Mediump => "mediump",
            Precision::Lowp => "lowp",
        }
    }
}

/// Shadow map filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowMapType {
    Basic,
    #[default]
    Pcf,
    PcfSoft,
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global renderer configuration.
///
/// | Field                    | Default          |
/// |--------------------------|------------------|
/// | `precision`              | `highp`          |
/// | `clear_color`            | black, alpha 0   |
/// | `auto_clear`             | `true`           |
/// | `sort_objects`           | `true`           |
/// | `max_lights`             | 4                |
/// | `gamma_input` / `output` | `false`          |
/// | `shadow_map_enabled`     | `false`          |
/// | `max_morph_targets`      | 8                |
/// | `max_morph_normals`      | 4                |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    // === Shader generation ===
    pub precision: Precision,
    /// Upper bound on directional + point + spot lights per program.
    pub max_lights: u32,
    /// Square light colors before aggregation (textures are in gamma space).
    pub gamma_input: bool,
    pub gamma_output: bool,
    pub physically_based_shading: bool,
    pub max_morph_targets: u32,
    pub max_morph_normals: u32,

    // === Clearing ===
    pub clear_color: [f32; 3],
    pub clear_alpha: f32,
    pub auto_clear: bool,
    pub auto_clear_color: bool,
    pub auto_clear_depth: bool,
    pub auto_clear_stencil: bool,

    // === Draw list ===
    pub sort_objects: bool,

    // === Shadows ===
    pub shadow_map_enabled: bool,
    pub shadow_map_type: ShadowMapType,
    pub shadow_map_debug: bool,
    pub shadow_map_cascade: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            precision: Precision::Highp,
            max_lights: 4,
            gamma_input: false,
            gamma_output: false,
            physically_based_shading: false,
            max_morph_targets: 8,
            max_morph_normals: 4,
            clear_color: [0.0, 0.0, 0.0],
            clear_alpha: 0.0,
            auto_clear: true,
            auto_clear_color: true,
            auto_clear_depth: true,
            auto_clear_stencil: true,
            sort_objects: true,
            shadow_map_enabled: false,
            shadow_map_type: ShadowMapType::Pcf,
            shadow_map_debug: false,
            shadow_map_cascade: false,
        }
    }
}
