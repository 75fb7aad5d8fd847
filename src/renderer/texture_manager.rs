//! Texture uploads
//!
//! Device textures are created on first bind and re-uploaded whenever the
//! CPU-side [`Texture`] has `needs_update` set.

use log::warn;
use slotmap::SecondaryMap;

use crate::assets::TextureHandle;
use crate::errors::Result;
use crate::renderer::device::{GraphicsDevice, SamplerState, TextureImage, TextureObject};
use crate::renderer::info::RenderInfo;
use crate::resources::{Texture, Wrapping};

#[derive(Default)]
pub struct TextureManager {
    textures: SecondaryMap<TextureHandle, TextureObject>,
}

/// Sampler for a texture, falling back to clamped, non-mipmapped sampling
/// for sizes that are not powers of two.
#[must_use]
pub fn sampler_for(texture: &Texture) -> SamplerState {
    let power_of_two = texture.image.as_ref().is_none_or(|i| i.is_power_of_two());
    if power_of_two {
        SamplerState {
            wrap_s: texture.wrap_s,
            wrap_t: texture.wrap_t,
            mag_filter: texture.mag_filter,
            min_filter: texture.min_filter,
        }
    } else {
        SamplerState {
            wrap_s: Wrapping::ClampToEdge,
            wrap_t: Wrapping::ClampToEdge,
            mag_filter: texture.mag_filter.without_mipmaps(),
            min_filter: texture.min_filter.without_mipmaps(),
        }
    }
}

impl TextureManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, handle: TextureHandle) -> Option<TextureObject> {
        self.textures.get(handle).copied()
    }

    /// Binds `texture` to `unit`, uploading it first when needed.
    pub fn bind(
        &mut self,
        device: &mut impl GraphicsDevice,
        handle: TextureHandle,
        texture: &mut Texture,
        unit: u32,
        info: &mut RenderInfo,
    ) -> Result<()> {
        device.active_texture(unit);

        let object = if let Some(object) = self.textures.get(handle) {
            *object
        } else {
            let object = device.create_texture()?;
            self.textures.insert(handle, object);
            info.memory.textures += 1;
            object
        };
        device.bind_texture(Some(object));

        if texture.needs_update {
            upload(device, texture);
            texture.needs_update = false;
        }
        Ok(())
    }

    /// Deletes the device texture. Returns `false` if none existed.
    pub fn release(
        &mut self,
        device: &mut impl GraphicsDevice,
        handle: TextureHandle,
        info: &mut RenderInfo,
    ) -> bool {
        let Some(object) = self.textures.remove(handle) else {
            return false;
        };
        device.delete_texture(object);
        info.memory.textures = info.memory.textures.saturating_sub(1);
        true
    }
}

fn upload(device: &mut impl GraphicsDevice, texture: &Texture) {
    let Some(image) = texture.image.as_ref() else {
        warn!("Texture '{}' has no image to upload", texture.name);
        return;
    };

    let sampler = sampler_for(texture);
    device.tex_image_2d(&TextureImage {
        width: image.width,
        height: image.height,
        format: image.format,
        data: Some(&image.data),
        flip_y: texture.flip_y,
        premultiply_alpha: texture.premultiply_alpha,
    });
    device.set_sampler_state(&sampler);

    if texture.generate_mipmaps && image.is_power_of_two() && sampler.min_filter.uses_mipmaps() {
        device.generate_mipmap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Filter, ImageData, PixelFormat};

    #[test]
    fn non_power_of_two_images_drop_mipmaps_and_repeat() {
        let mut texture = Texture::new(ImageData::new(3, 5, PixelFormat::Rgba, vec![0; 60]));
        texture.wrap_s = Wrapping::Repeat;
        let sampler = sampler_for(&texture);
        assert_eq!(sampler.wrap_s, Wrapping::ClampToEdge);
        assert_eq!(sampler.min_filter, Filter::Linear);
    }
}
