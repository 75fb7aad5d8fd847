//! Render plugins
//!
//! Plugins draw things the core passes do not: sprites, lens flares, shadow
//! maps. Pre plugins run after the target is bound and cleared, post plugins
//! after the transparent pass. The renderer forgets its cached device state
//! before and after each plugin, so a plugin may leave the device in any
//! state.

use crate::assets::Assets;
use crate::renderer::device::GraphicsDevice;
use crate::scene::{NodeHandle, Scene};

/// What a plugin gets to work with.
pub struct PluginContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub scene: &'a mut Scene,
    pub assets: &'a mut Assets,
    /// The camera node of the current render.
    pub camera: NodeHandle,
    /// Drawing buffer size in pixels.
    pub width: u32,
    pub height: u32,
}

pub trait RenderPlugin {
    /// Called once per [`Renderer::render`](crate::renderer::Renderer::render).
    fn render(&mut self, ctx: &mut PluginContext<'_>);

    /// Shown in debug logs.
    fn name(&self) -> &str {
        "plugin"
    }
}
