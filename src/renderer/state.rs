//! Frame State Cache
//!
//! Mirrors the fixed-function state last sent to the device so redundant
//! calls are filtered out. Every entry starts (and is [`reset`] to) unknown,
//! which forces the next request through regardless of its value.
//!
//! [`reset`]: FrameStateCache::reset

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::renderer::device::{
    Capability, CullFace, FramebufferObject, FrontFace, GraphicsDevice,
};
use crate::resources::{BlendEquation, BlendFactor, Blending, Side};

/// Last-applied device state. `None` means unknown.
#[derive(Debug, Default)]
pub struct FrameStateCache {
    blending: Option<Blending>,
    blend_equation: Option<BlendEquation>,
    blend_factors: Option<(BlendFactor, BlendFactor)>,

    depth_test: Option<bool>,
    depth_write: Option<bool>,

    double_sided: Option<bool>,
    flip_sided: Option<bool>,
    cull_face: Option<CullFace>,

    polygon_offset: Option<bool>,
    polygon_offset_values: Option<(f32, f32)>,

    line_width: Option<f32>,
    framebuffer: Option<Option<FramebufferObject>>,

    enabled_attributes: FxHashSet<u32>,
}

impl FrameStateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything. The next request of every kind reaches the device.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Applies a blend mode. `Custom` takes the equation and factors given.
    pub fn set_blending(
        &mut self,
        device: &mut impl GraphicsDevice,
        blending: Blending,
        equation: BlendEquation,
        src: BlendFactor,
        dst: BlendFactor,
    ) {
        if self.blending != Some(blending) {
            match blending {
                Blending::None => device.set_capability(Capability::Blend, false),
                Blending::Normal => {
                    device.set_capability(Capability::Blend, true);
                    device.blend_equation(BlendEquation::Add);
                    device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
                }
                Blending::Additive => {
                    device.set_capability(Capability::Blend, true);
                    device.blend_equation(BlendEquation::Add);
                    device.blend_func(BlendFactor::SrcAlpha, BlendFactor::One);
                }
                Blending::Subtractive => {
                    device.set_capability(Capability::Blend, true);
                    device.blend_equation(BlendEquation::Add);
                    device.blend_func(BlendFactor::Zero, BlendFactor::OneMinusSrcColor);
                }
                Blending::Multiply => {
                    device.set_capability(Capability::Blend, true);
                    device.blend_equation(BlendEquation::Add);
                    device.blend_func(BlendFactor::Zero, BlendFactor::SrcColor);
                }
                Blending::Custom => device.set_capability(Capability::Blend, true),
            }
            self.blending = Some(blending);
            // Presets overwrite the equation and factors behind our back.
            self.blend_equation = None;
            self.blend_factors = None;
        }

        if blending == Blending::Custom {
            if self.blend_equation != Some(equation) {
                device.blend_equation(equation);
                self.blend_equation = Some(equation);
            }
            if self.blend_factors != Some((src, dst)) {
                device.blend_func(src, dst);
                self.blend_factors = Some((src, dst));
            }
        }
    }

    pub fn set_depth_test(&mut self, device: &mut impl GraphicsDevice, enabled: bool) {
        if self.depth_test != Some(enabled) {
            device.set_capability(Capability::DepthTest, enabled);
            self.depth_test = Some(enabled);
        }
    }

    pub fn set_depth_write(&mut self, device: &mut impl GraphicsDevice, enabled: bool) {
        if self.depth_write != Some(enabled) {
            device.depth_mask(enabled);
            self.depth_write = Some(enabled);
        }
    }

    /// Culling and winding for a material side. Culled sides always cull
    /// back faces.
    pub fn set_material_faces(&mut self, device: &mut impl GraphicsDevice, side: Side) {
        let double_sided = side == Side::Double;
        let flip_sided = side == Side::Back;

        if self.double_sided != Some(double_sided) {
            device.set_capability(Capability::CullFace, !double_sided);
            self.double_sided = Some(double_sided);
        }
        if !double_sided {
            self.set_cull_face(device, CullFace::Back);
        }
        if self.flip_sided != Some(flip_sided) {
            device.front_face(if flip_sided { FrontFace::Cw } else { FrontFace::Ccw });
            self.flip_sided = Some(flip_sided);
        }
    }

    pub fn set_cull_face(&mut self, device: &mut impl GraphicsDevice, face: CullFace) {
        if self.cull_face != Some(face) {
            device.cull_face(face);
            self.cull_face = Some(face);
        }
    }

    pub fn set_polygon_offset(
        &mut self,
        device: &mut impl GraphicsDevice,
        enabled: bool,
        factor: f32,
        units: f32,
    ) {
        if self.polygon_offset != Some(enabled) {
            device.set_capability(Capability::PolygonOffsetFill, enabled);
            self.polygon_offset = Some(enabled);
        }
        if enabled && self.polygon_offset_values != Some((factor, units)) {
            device.polygon_offset(factor, units);
            self.polygon_offset_values = Some((factor, units));
        }
    }

    pub fn set_line_width(&mut self, device: &mut impl GraphicsDevice, width: f32) {
        if self.line_width != Some(width) {
            device.line_width(width);
            self.line_width = Some(width);
        }
    }

    pub fn bind_framebuffer(
        &mut self,
        device: &mut impl GraphicsDevice,
        framebuffer: Option<FramebufferObject>,
    ) {
        if self.framebuffer != Some(framebuffer) {
            device.bind_framebuffer(framebuffer);
            self.framebuffer = Some(framebuffer);
        }
    }

    /// Marks the framebuffer binding unknown after a bind outside the cache.
    pub fn invalidate_framebuffer(&mut self) {
        self.framebuffer = None;
    }

    pub fn enable_attribute(&mut self, device: &mut impl GraphicsDevice, slot: u32) {
        if self.enabled_attributes.insert(slot) {
            device.enable_vertex_attrib_array(slot);
        }
    }

    /// Enables exactly `slots`, disabling every other slot this cache enabled.
    pub fn set_enabled_attributes(&mut self, device: &mut impl GraphicsDevice, slots: &[u32]) {
        let mut stale: SmallVec<[u32; 8]> = self
            .enabled_attributes
            .iter()
            .copied()
            .filter(|slot| !slots.contains(slot))
            .collect();
        stale.sort_unstable();
        for slot in stale {
            device.disable_vertex_attrib_array(slot);
            self.enabled_attributes.remove(&slot);
        }
        for &slot in slots {
            self.enable_attribute(device, slot);
        }
    }

    /// Disables every slot this cache enabled.
    pub fn disable_attributes(&mut self, device: &mut impl GraphicsDevice) {
        let mut slots: Vec<u32> = self.enabled_attributes.drain().collect();
        slots.sort_unstable();
        for slot in slots {
            device.disable_vertex_attrib_array(slot);
        }
    }

    #[must_use]
    pub fn depth_test(&self) -> Option<bool> {
        self.depth_test
    }

    #[must_use]
    pub fn depth_write(&self) -> Option<bool> {
        self.depth_write
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::{DeviceCall, HeadlessDevice};

    #[test]
    fn custom_blending_tracks_factors_separately() {
        let mut device = HeadlessDevice::new();
        let mut state = FrameStateCache::new();

        let (eq, src, dst) = (BlendEquation::Add, BlendFactor::One, BlendFactor::One);
        state.set_blending(&mut device, Blending::Custom, eq, src, dst);
        state.set_blending(&mut device, Blending::Custom, eq, src, dst);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::BlendFunc(..))), 1);

        state.set_blending(&mut device, Blending::Custom, eq, src, BlendFactor::Zero);
        assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::BlendFunc(..))), 2);
    }

    #[test]
    fn switching_back_from_preset_reapplies_custom_factors() {
        let mut device = HeadlessDevice::new();
        let mut state = FrameStateCache::new();
        let (eq, src, dst) = (BlendEquation::Add, BlendFactor::One, BlendFactor::One);

        state.set_blending(&mut device, Blending::Custom, eq, src, dst);
        state.set_blending(&mut device, Blending::Normal, eq, src, dst);
        device.clear_calls();
        state.set_blending(&mut device, Blending::Custom, eq, src, dst);

        assert!(device.calls().contains(&DeviceCall::BlendFunc(src, dst)));
    }

    #[test]
    fn cull_face_is_reissued_after_a_reset() {
        let mut device = HeadlessDevice::new();
        let mut state = FrameStateCache::new();
        let culls = |device: &HeadlessDevice| {
            device.count_calls(|c| matches!(c, DeviceCall::CullFace(CullFace::Back)))
        };

        state.set_material_faces(&mut device, Side::Front);
        state.set_material_faces(&mut device, Side::Back);
        assert_eq!(culls(&device), 1);

        state.set_material_faces(&mut device, Side::Double);
        state.reset();
        state.set_material_faces(&mut device, Side::Front);
        assert_eq!(culls(&device), 2);
    }
}
