//! Graphics Device Abstraction
//!
//! The renderer talks to the GPU exclusively through [`GraphicsDevice`], a
//! thin GL-shaped function table. Objects are referred to by opaque integer
//! handles; the backend maps them to its native objects.
//!
//! Backends:
//! - [`HeadlessDevice`]: records every call, answers queries from shader
//!   sources. Used by tests and offline runs.
//! - `GlowDevice` (feature `glow`): forwards to an OpenGL / WebGL context.

pub mod headless;

#[cfg(feature = "glow")]
pub mod glow;

use std::borrow::Cow;

use bitflags::bitflags;

use crate::errors::Result;
use crate::resources::{BlendEquation, BlendFactor, Filter, PixelFormat, Wrapping};

pub use headless::{DeviceCall, HeadlessDevice};

#[cfg(feature = "glow")]
pub use self::glow::GlowDevice;

macro_rules! device_object {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

device_object! {
    /// Vertex or index buffer.
    BufferObject;
    /// One compiled shader stage.
    ShaderObject;
    /// Linked program.
    ProgramObject;
    TextureObject;
    FramebufferObject;
    RenderbufferObject;
    /// Location of a uniform within a program.
    UniformLocation;
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

/// Usage hint for buffer uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Toggleable pipeline capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    CullFace,
    PolygonOffsetFill,
    ScissorTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    Back,
    Front,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Triangles,
    Lines,
    LineStrip,
    Points,
}

/// Depth / stencil attachment formats for render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderbufferFormat {
    Depth16,
    DepthStencil,
    Stencil8,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u32 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

// ============================================================================
// Data carriers
// ============================================================================

/// Uniform payload, mirroring the `glUniform*v` family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    Float1(&'a [f32]),
    Float2(&'a [f32]),
    Float3(&'a [f32]),
    Float4(&'a [f32]),
    Int1(&'a [i32]),
    Matrix3(&'a [f32]),
    Matrix4(&'a [f32]),
}

/// Pixels for a 2D texture upload. `data == None` allocates storage only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureImage<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Option<&'a [u8]>,
    pub flip_y: bool,
    pub premultiply_alpha: bool,
}

impl<'a> TextureImage<'a> {
    /// The pixels with `flip_y` and `premultiply_alpha` applied, for backends
    /// without unpack flags. Borrowed when neither is set.
    #[must_use]
    pub fn unpacked_pixels(&self) -> Option<Cow<'a, [u8]>> {
        let data = self.data?;
        let alpha = match self.format {
            PixelFormat::Rgba => Some(3),
            PixelFormat::LuminanceAlpha => Some(1),
            _ => None,
        };
        let premultiply = self.premultiply_alpha && alpha.is_some();
        if !self.flip_y && !premultiply {
            return Some(Cow::Borrowed(data));
        }

        let mut pixels = data.to_vec();
        let stride = (self.width * self.format.bytes_per_pixel()) as usize;
        if self.flip_y && stride > 0 {
            let rows = (pixels.len() / stride).min(self.height as usize);
            for row in 0..rows / 2 {
                let (top, bottom) = pixels.split_at_mut((rows - 1 - row) * stride);
                top[row * stride..(row + 1) * stride].swap_with_slice(&mut bottom[..stride]);
            }
        }
        if premultiply && let Some(alpha) = alpha {
            let channels = self.format.bytes_per_pixel() as usize;
            for pixel in pixels.chunks_exact_mut(channels) {
                let a = u32::from(pixel[alpha]);
                for channel in &mut pixel[..alpha] {
                    *channel = ((u32::from(*channel) * a + 127) / 255) as u8;
                }
            }
        }
        Some(Cow::Owned(pixels))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerState {
    pub wrap_s: Wrapping,
    pub wrap_t: Wrapping,
    pub mag_filter: Filter,
    pub min_filter: Filter,
}

/// Limits queried once at renderer construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub max_texture_units: u32,
    pub max_vertex_texture_units: u32,
    pub max_texture_size: u32,
    pub max_vertex_uniform_vectors: u32,
    pub max_vertex_attributes: u32,
}

impl DeviceCapabilities {
    #[must_use]
    pub fn supports_vertex_textures(&self) -> bool {
        self.max_vertex_texture_units > 0
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            max_texture_units: 16,
            max_vertex_texture_units: 4,
            max_texture_size: 4096,
            max_vertex_uniform_vectors: 256,
            max_vertex_attributes: 16,
        }
    }
}

// ============================================================================
// GraphicsDevice
// ============================================================================

/// The function table the renderer drives.
///
/// Calls are issued in GL order and are expected to take effect immediately.
/// Creation calls return an error when the device refuses; compile and link
/// calls report status and expose the driver log separately.
pub trait GraphicsDevice {
    fn capabilities(&self) -> DeviceCapabilities;

    // --- Buffers ---
    fn create_buffer(&mut self) -> Result<BufferObject>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferObject>);
    /// Uploads `data` to the buffer bound at `target`.
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: BufferObject);

    // --- Vertex attributes ---
    fn enable_vertex_attrib_array(&mut self, slot: u32);
    fn disable_vertex_attrib_array(&mut self, slot: u32);
    /// Float attribute sourced from the buffer bound at `BufferTarget::Array`.
    fn vertex_attrib_pointer(&mut self, slot: u32, components: u32, stride: u32, offset: u32);

    // --- Shaders & programs ---
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderObject>;
    fn shader_source(&mut self, shader: ShaderObject, source: &str);
    /// Returns the compile status.
    fn compile_shader(&mut self, shader: ShaderObject) -> bool;
    fn shader_info_log(&self, shader: ShaderObject) -> String;
    fn delete_shader(&mut self, shader: ShaderObject);

    fn create_program(&mut self) -> Result<ProgramObject>;
    fn attach_shader(&mut self, program: ProgramObject, shader: ShaderObject);
    /// Returns the link status.
    fn link_program(&mut self, program: ProgramObject) -> bool;
    fn program_info_log(&self, program: ProgramObject) -> String;
    fn delete_program(&mut self, program: ProgramObject);
    fn use_program(&mut self, program: Option<ProgramObject>);

    /// Names of the active uniforms, array suffixes (`[0]`) stripped.
    fn active_uniforms(&self, program: ProgramObject) -> Vec<String>;
    /// Names of the active attributes.
    fn active_attributes(&self, program: ProgramObject) -> Vec<String>;
    fn uniform_location(&self, program: ProgramObject, name: &str) -> Option<UniformLocation>;
    fn attribute_location(&self, program: ProgramObject, name: &str) -> Option<u32>;
    /// Sets a uniform of the program in use.
    fn set_uniform(&mut self, location: UniformLocation, data: UniformData<'_>);

    // --- Textures ---
    fn create_texture(&mut self) -> Result<TextureObject>;
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, texture: Option<TextureObject>);
    fn tex_image_2d(&mut self, image: &TextureImage<'_>);
    fn set_sampler_state(&mut self, sampler: &SamplerState);
    fn generate_mipmap(&mut self);
    fn delete_texture(&mut self, texture: TextureObject);

    // --- Framebuffers ---
    fn create_framebuffer(&mut self) -> Result<FramebufferObject>;
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferObject>);
    /// Attaches a texture as color attachment 0 of the bound framebuffer.
    fn framebuffer_texture_2d(&mut self, texture: TextureObject);
    fn create_renderbuffer(&mut self) -> Result<RenderbufferObject>;
    /// Allocates storage and attaches the renderbuffer to the bound framebuffer.
    fn renderbuffer_attachment(
        &mut self,
        renderbuffer: RenderbufferObject,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    );
    fn delete_framebuffer(&mut self, framebuffer: FramebufferObject);
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferObject);

    // --- Fixed-function state ---
    fn set_capability(&mut self, capability: Capability, enabled: bool);
    fn depth_mask(&mut self, write: bool);
    fn depth_func(&mut self, func: DepthFunc);
    fn blend_equation(&mut self, equation: BlendEquation);
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn cull_face(&mut self, face: CullFace);
    fn front_face(&mut self, winding: FrontFace);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn line_width(&mut self, width: f32);

    // --- Frame ---
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&mut self, flags: ClearFlags);

    // --- Draws ---
    /// Draws `count` `u16` indices starting at `offset` bytes into the bound
    /// element buffer.
    fn draw_elements(&mut self, mode: DrawMode, count: u32, offset: u32);
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32);
}
