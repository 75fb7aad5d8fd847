//! Per-frame draw tracking.
//!
//! Remembers what the previous draw bound so the next one can skip redundant
//! program switches, uniform refreshes and attribute rebinding.

use crate::assets::MaterialHandle;
use crate::renderer::program::ProgramHandle;
use crate::scene::NodeHandle;

/// Identifies a bound set of vertex buffers.
///
/// Two consecutive draws with the same group, program and wireframe mode
/// reuse the attribute bindings of the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingKey {
    pub group_id: u32,
    pub program_id: u32,
    pub wireframe: bool,
}

#[derive(Debug, Default)]
pub struct RenderContext {
    pub current_program: Option<ProgramHandle>,
    pub current_material: Option<MaterialHandle>,
    pub current_camera: Option<NodeHandle>,
    pub current_binding: Option<BindingKey>,
    /// Set when the frame's light arrays have not been uploaded yet.
    pub lights_need_update: bool,
}

impl RenderContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every cached binding. Called at frame start and after plugins.
    pub fn reset(&mut self) {
        self.current_program = None;
        self.current_material = None;
        self.current_camera = None;
        self.current_binding = None;
    }
}
