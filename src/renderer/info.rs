//! Render statistics
//!
//! Memory counters track live device objects; render counters are reset at
//! the start of every [`Renderer::render`](crate::renderer::Renderer::render).

/// Live device objects owned by the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub programs: u32,
    pub geometries: u32,
    pub textures: u32,
}

/// Work submitted during the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub calls: u32,
    pub vertices: u32,
    pub faces: u32,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    pub memory: MemoryInfo,
    pub render: FrameInfo,
}

impl RenderInfo {
    pub(crate) fn reset_frame(&mut self) {
        self.render = FrameInfo::default();
    }
}
