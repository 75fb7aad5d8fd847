//! Offscreen render targets
//!
//! A [`RenderTarget`] is a color texture with optional depth / stencil
//! renderbuffers. Device objects are created the first time the target is
//! bound and freed by `Renderer::deallocate_render_target`.

use crate::errors::Result;
use crate::renderer::device::{
    FramebufferObject, GraphicsDevice, RenderbufferFormat, RenderbufferObject, SamplerState,
    TextureImage, TextureObject,
};
use crate::resources::{Filter, PixelFormat, Wrapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetObjects {
    pub framebuffer: FramebufferObject,
    pub texture: TextureObject,
    pub renderbuffer: Option<RenderbufferObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub wrap_s: Wrapping,
    pub wrap_t: Wrapping,
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub format: PixelFormat,
    pub depth_buffer: bool,
    pub stencil_buffer: bool,
    pub generate_mipmaps: bool,

    pub(crate) objects: Option<RenderTargetObjects>,
}

impl RenderTarget {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            wrap_s: Wrapping::ClampToEdge,
            wrap_t: Wrapping::ClampToEdge,
            mag_filter: Filter::Linear,
            min_filter: Filter::LinearMipmapLinear,
            format: PixelFormat::Rgba,
            depth_buffer: true,
            stencil_buffer: true,
            generate_mipmaps: true,
            objects: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn objects(&self) -> Option<RenderTargetObjects> {
        self.objects
    }

    #[must_use]
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    fn sampler(&self) -> SamplerState {
        if self.is_power_of_two() {
            SamplerState {
                wrap_s: self.wrap_s,
                wrap_t: self.wrap_t,
                mag_filter: self.mag_filter,
                min_filter: self.min_filter,
            }
        } else {
            SamplerState {
                wrap_s: Wrapping::ClampToEdge,
                wrap_t: Wrapping::ClampToEdge,
                mag_filter: self.mag_filter.without_mipmaps(),
                min_filter: self.min_filter.without_mipmaps(),
            }
        }
    }

    /// Creates the device objects if they do not exist yet.
    pub(crate) fn ensure_objects(
        &mut self,
        device: &mut impl GraphicsDevice,
    ) -> Result<RenderTargetObjects> {
        if let Some(objects) = self.objects {
            return Ok(objects);
        }

        let texture = device.create_texture()?;
        device.bind_texture(Some(texture));
        device.tex_image_2d(&TextureImage {
            width: self.width,
            height: self.height,
            format: self.format,
            data: None,
            flip_y: false,
            premultiply_alpha: false,
        });
        let sampler = self.sampler();
        device.set_sampler_state(&sampler);

        let framebuffer = device.create_framebuffer()?;
        device.bind_framebuffer(Some(framebuffer));
        device.framebuffer_texture_2d(texture);

        let format = match (self.depth_buffer, self.stencil_buffer) {
            (true, true) => Some(RenderbufferFormat::DepthStencil),
            (true, false) => Some(RenderbufferFormat::Depth16),
            (false, true) => Some(RenderbufferFormat::Stencil8),
            (false, false) => None,
        };
        let renderbuffer = match format {
            Some(format) => {
                let renderbuffer = device.create_renderbuffer()?;
                device.renderbuffer_attachment(renderbuffer, format, self.width, self.height);
                Some(renderbuffer)
            }
            None => None,
        };

        if self.generate_mipmaps && self.is_power_of_two() && sampler.min_filter.uses_mipmaps() {
            device.generate_mipmap();
        }

        device.bind_texture(None);
        device.bind_framebuffer(None);

        let objects = RenderTargetObjects {
            framebuffer,
            texture,
            renderbuffer,
        };
        self.objects = Some(objects);
        Ok(objects)
    }

    /// Regenerates the mip chain of the color texture after rendering.
    pub(crate) fn update_mipmaps(&self, device: &mut impl GraphicsDevice) {
        let Some(objects) = self.objects else {
            return;
        };
        if self.generate_mipmaps && self.is_power_of_two() && self.min_filter.uses_mipmaps() {
            device.bind_texture(Some(objects.texture));
            device.generate_mipmap();
            device.bind_texture(None);
        }
    }

    pub(crate) fn release(&mut self, device: &mut impl GraphicsDevice) -> bool {
        let Some(objects) = self.objects.take() else {
            return false;
        };
        device.delete_texture(objects.texture);
        device.delete_framebuffer(objects.framebuffer);
        if let Some(renderbuffer) = objects.renderbuffer {
            device.delete_renderbuffer(renderbuffer);
        }
        true
    }
}
