//! OpenGL / WebGL backend over [`glow`].
//!
//! Device objects are small integers handed out by this wrapper; the native
//! objects live in per-kind tables. Uniform locations are resolved once at
//! link time so [`GraphicsDevice::uniform_location`] stays a lookup.

use glow::HasContext;
use log::{trace, warn};
use rustc_hash::FxHashMap;

use crate::errors::{RenderError, Result};
use crate::renderer::device::{
    BufferObject, BufferTarget, BufferUsage, Capability, ClearFlags, CullFace, DepthFunc,
    DeviceCapabilities, DrawMode, FramebufferObject, FrontFace, GraphicsDevice, ProgramObject,
    RenderbufferFormat, RenderbufferObject, SamplerState, ShaderObject, ShaderStage,
    TextureImage, TextureObject, UniformData, UniformLocation,
};
use crate::resources::{BlendEquation, BlendFactor, Filter, PixelFormat, Wrapping};

struct LinkedProgram<C: HasContext> {
    native: C::Program,
    uniforms: Vec<(String, UniformLocation)>,
    attributes: Vec<String>,
}

/// [`GraphicsDevice`] forwarding to a `glow` context.
///
/// The context must be current on the calling thread for the lifetime of the
/// device.
pub struct GlowDevice<C: HasContext> {
    gl: C,
    next_id: u32,
    buffers: FxHashMap<BufferObject, C::Buffer>,
    shaders: FxHashMap<ShaderObject, C::Shader>,
    programs: FxHashMap<ProgramObject, LinkedProgram<C>>,
    locations: FxHashMap<UniformLocation, C::UniformLocation>,
    textures: FxHashMap<TextureObject, C::Texture>,
    framebuffers: FxHashMap<FramebufferObject, C::Framebuffer>,
    renderbuffers: FxHashMap<RenderbufferObject, C::Renderbuffer>,
}

impl<C: HasContext> GlowDevice<C> {
    pub fn new(gl: C) -> Self {
        Self {
            gl,
            next_id: 1,
            buffers: FxHashMap::default(),
            shaders: FxHashMap::default(),
            programs: FxHashMap::default(),
            locations: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            renderbuffers: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &C {
        &self.gl
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Enumerates the active uniforms and attributes of a linked program.
    fn introspect(&mut self, native: C::Program) -> (Vec<(String, UniformLocation)>, Vec<String>) {
        let mut uniforms = Vec::new();
        let mut attributes = Vec::new();
        unsafe {
            for index in 0..self.gl.get_active_uniforms(native) {
                let Some(active) = self.gl.get_active_uniform(native, index) else {
                    continue;
                };
                let name = active
                    .name
                    .strip_suffix("[0]")
                    .unwrap_or(&active.name)
                    .to_string();
                let Some(native_location) = self.gl.get_uniform_location(native, &active.name)
                else {
                    continue;
                };
                let location = UniformLocation(self.next());
                self.locations.insert(location, native_location);
                uniforms.push((name, location));
            }
            for index in 0..self.gl.get_active_attributes(native) {
                if let Some(active) = self.gl.get_active_attribute(native, index) {
                    attributes.push(active.name);
                }
            }
        }
        (uniforms, attributes)
    }
}

// ============================================================================
// Enum mapping
// ============================================================================

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

fn capability(capability: Capability) -> u32 {
    match capability {
        Capability::Blend => glow::BLEND,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::CullFace => glow::CULL_FACE,
        Capability::PolygonOffsetFill => glow::POLYGON_OFFSET_FILL,
        Capability::ScissorTest => glow::SCISSOR_TEST,
    }
}

fn depth_func(func: DepthFunc) -> u32 {
    match func {
        DepthFunc::Never => glow::NEVER,
        DepthFunc::Less => glow::LESS,
        DepthFunc::Equal => glow::EQUAL,
        DepthFunc::LessEqual => glow::LEQUAL,
        DepthFunc::Greater => glow::GREATER,
        DepthFunc::NotEqual => glow::NOTEQUAL,
        DepthFunc::GreaterEqual => glow::GEQUAL,
        DepthFunc::Always => glow::ALWAYS,
    }
}

fn blend_equation(equation: BlendEquation) -> u32 {
    match equation {
        BlendEquation::Add => glow::FUNC_ADD,
        BlendEquation::Subtract => glow::FUNC_SUBTRACT,
        BlendEquation::ReverseSubtract => glow::FUNC_REVERSE_SUBTRACT,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlphaSaturate => glow::SRC_ALPHA_SATURATE,
    }
}

fn draw_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Triangles => glow::TRIANGLES,
        DrawMode::Lines => glow::LINES,
        DrawMode::LineStrip => glow::LINE_STRIP,
        DrawMode::Points => glow::POINTS,
    }
}

fn pixel_format(format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Alpha => glow::ALPHA,
        PixelFormat::Rgb => glow::RGB,
        PixelFormat::Rgba => glow::RGBA,
        PixelFormat::Luminance => glow::LUMINANCE,
        PixelFormat::LuminanceAlpha => glow::LUMINANCE_ALPHA,
    }
}

fn wrapping(wrap: Wrapping) -> i32 {
    (match wrap {
        Wrapping::Repeat => glow::REPEAT,
        Wrapping::ClampToEdge => glow::CLAMP_TO_EDGE,
        Wrapping::MirroredRepeat => glow::MIRRORED_REPEAT,
    }) as i32
}

fn filter(filter: Filter) -> i32 {
    (match filter {
        Filter::Nearest => glow::NEAREST,
        Filter::NearestMipmapNearest => glow::NEAREST_MIPMAP_NEAREST,
        Filter::NearestMipmapLinear => glow::NEAREST_MIPMAP_LINEAR,
        Filter::Linear => glow::LINEAR,
        Filter::LinearMipmapNearest => glow::LINEAR_MIPMAP_NEAREST,
        Filter::LinearMipmapLinear => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn created<T>(result: std::result::Result<T, String>, what: &str) -> Result<T> {
    result.map_err(|err| RenderError::ResourceCreation(format!("{what}: {err}")))
}

// ============================================================================
// GraphicsDevice
// ============================================================================

// SAFETY (all blocks below): the context is current and every native object
// passed to it was created by it and not yet deleted.
impl<C: HasContext> GraphicsDevice for GlowDevice<C> {
    fn capabilities(&self) -> DeviceCapabilities {
        let get = |parameter| unsafe { self.gl.get_parameter_i32(parameter).max(0) as u32 };
        DeviceCapabilities {
            max_texture_units: get(glow::MAX_TEXTURE_IMAGE_UNITS),
            max_vertex_texture_units: get(glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS),
            max_texture_size: get(glow::MAX_TEXTURE_SIZE),
            max_vertex_uniform_vectors: get(glow::MAX_VERTEX_UNIFORM_VECTORS),
            max_vertex_attributes: get(glow::MAX_VERTEX_ATTRIBS),
        }
    }

    // --- Buffers ---

    fn create_buffer(&mut self) -> Result<BufferObject> {
        let native = created(unsafe { self.gl.create_buffer() }, "buffer")?;
        let buffer = BufferObject(self.next());
        self.buffers.insert(buffer, native);
        Ok(buffer)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferObject>) {
        let native = buffer.and_then(|b| self.buffers.get(&b).copied());
        unsafe { self.gl.bind_buffer(buffer_target(target), native) };
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, buffer_usage(usage));
        }
    }

    fn delete_buffer(&mut self, buffer: BufferObject) {
        if let Some(native) = self.buffers.remove(&buffer) {
            unsafe { self.gl.delete_buffer(native) };
        }
    }

    // --- Vertex attributes ---

    fn enable_vertex_attrib_array(&mut self, slot: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(slot) };
    }

    fn disable_vertex_attrib_array(&mut self, slot: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(slot) };
    }

    fn vertex_attrib_pointer(&mut self, slot: u32, components: u32, stride: u32, offset: u32) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                slot,
                components as i32,
                glow::FLOAT,
                false,
                stride as i32,
                offset as i32,
            );
        }
    }

    // --- Shaders & programs ---

    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderObject> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let native = created(unsafe { self.gl.create_shader(kind) }, "shader")?;
        let shader = ShaderObject(self.next());
        self.shaders.insert(shader, native);
        Ok(shader)
    }

    fn shader_source(&mut self, shader: ShaderObject, source: &str) {
        if let Some(&native) = self.shaders.get(&shader) {
            unsafe { self.gl.shader_source(native, source) };
        }
    }

    fn compile_shader(&mut self, shader: ShaderObject) -> bool {
        let Some(&native) = self.shaders.get(&shader) else {
            return false;
        };
        unsafe {
            self.gl.compile_shader(native);
            self.gl.get_shader_compile_status(native)
        }
    }

    fn shader_info_log(&self, shader: ShaderObject) -> String {
        self.shaders
            .get(&shader)
            .map(|&native| unsafe { self.gl.get_shader_info_log(native) })
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderObject) {
        if let Some(native) = self.shaders.remove(&shader) {
            unsafe { self.gl.delete_shader(native) };
        }
    }

    fn create_program(&mut self) -> Result<ProgramObject> {
        let native = created(unsafe { self.gl.create_program() }, "program")?;
        let program = ProgramObject(self.next());
        self.programs.insert(
            program,
            LinkedProgram {
                native,
                uniforms: Vec::new(),
                attributes: Vec::new(),
            },
        );
        Ok(program)
    }

    fn attach_shader(&mut self, program: ProgramObject, shader: ShaderObject) {
        if let (Some(linked), Some(&native)) = (self.programs.get(&program), self.shaders.get(&shader)) {
            unsafe { self.gl.attach_shader(linked.native, native) };
        }
    }

    fn link_program(&mut self, program: ProgramObject) -> bool {
        let Some(native) = self.programs.get(&program).map(|p| p.native) else {
            return false;
        };
        let linked = unsafe {
            self.gl.link_program(native);
            self.gl.get_program_link_status(native)
        };
        if !linked {
            return false;
        }
        let (uniforms, attributes) = self.introspect(native);
        trace!(
            "Linked program {program:?}: {} uniforms, {} attributes",
            uniforms.len(),
            attributes.len()
        );
        if let Some(entry) = self.programs.get_mut(&program) {
            entry.uniforms = uniforms;
            entry.attributes = attributes;
        }
        true
    }

    fn program_info_log(&self, program: ProgramObject) -> String {
        self.programs
            .get(&program)
            .map(|p| unsafe { self.gl.get_program_info_log(p.native) })
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramObject) {
        if let Some(linked) = self.programs.remove(&program) {
            for (_, location) in &linked.uniforms {
                self.locations.remove(location);
            }
            unsafe { self.gl.delete_program(linked.native) };
        }
    }

    fn use_program(&mut self, program: Option<ProgramObject>) {
        let native = program.and_then(|p| self.programs.get(&p).map(|l| l.native));
        unsafe { self.gl.use_program(native) };
    }

    fn active_uniforms(&self, program: ProgramObject) -> Vec<String> {
        self.programs
            .get(&program)
            .map(|p| p.uniforms.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default()
    }

    fn active_attributes(&self, program: ProgramObject) -> Vec<String> {
        self.programs
            .get(&program)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramObject, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)?
            .uniforms
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, l)| *l)
    }

    fn attribute_location(&self, program: ProgramObject, name: &str) -> Option<u32> {
        let native = self.programs.get(&program)?.native;
        unsafe { self.gl.get_attrib_location(native, name) }
    }

    fn set_uniform(&mut self, location: UniformLocation, data: UniformData<'_>) {
        let Some(native) = self.locations.get(&location) else {
            warn!("Unknown uniform location {location:?}");
            return;
        };
        let native = Some(native);
        unsafe {
            match data {
                UniformData::Float1(v) => self.gl.uniform_1_f32_slice(native, v),
                UniformData::Float2(v) => self.gl.uniform_2_f32_slice(native, v),
                UniformData::Float3(v) => self.gl.uniform_3_f32_slice(native, v),
                UniformData::Float4(v) => self.gl.uniform_4_f32_slice(native, v),
                UniformData::Int1(v) => self.gl.uniform_1_i32_slice(native, v),
                UniformData::Matrix3(v) => self.gl.uniform_matrix_3_f32_slice(native, false, v),
                UniformData::Matrix4(v) => self.gl.uniform_matrix_4_f32_slice(native, false, v),
            }
        }
    }

    // --- Textures ---

    fn create_texture(&mut self) -> Result<TextureObject> {
        let native = created(unsafe { self.gl.create_texture() }, "texture")?;
        let texture = TextureObject(self.next());
        self.textures.insert(texture, native);
        Ok(texture)
    }

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) };
    }

    fn bind_texture(&mut self, texture: Option<TextureObject>) {
        let native = texture.and_then(|t| self.textures.get(&t).copied());
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, native) };
    }

    fn tex_image_2d(&mut self, image: &TextureImage<'_>) {
        let format = pixel_format(image.format);
        // Desktop GL has no unpack flip or premultiply, so both happen here.
        let pixels = image.unpacked_pixels();
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                format as i32,
                image.width as i32,
                image.height as i32,
                0,
                format,
                glow::UNSIGNED_BYTE,
                pixels.as_deref(),
            );
        }
    }

    fn set_sampler_state(&mut self, sampler: &SamplerState) {
        unsafe {
            let target = glow::TEXTURE_2D;
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrapping(sampler.wrap_s));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrapping(sampler.wrap_t));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, filter(sampler.mag_filter));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, filter(sampler.min_filter));
        }
    }

    fn generate_mipmap(&mut self) {
        unsafe { self.gl.generate_mipmap(glow::TEXTURE_2D) };
    }

    fn delete_texture(&mut self, texture: TextureObject) {
        if let Some(native) = self.textures.remove(&texture) {
            unsafe { self.gl.delete_texture(native) };
        }
    }

    // --- Framebuffers ---

    fn create_framebuffer(&mut self) -> Result<FramebufferObject> {
        let native = created(unsafe { self.gl.create_framebuffer() }, "framebuffer")?;
        let framebuffer = FramebufferObject(self.next());
        self.framebuffers.insert(framebuffer, native);
        Ok(framebuffer)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferObject>) {
        let native = framebuffer.and_then(|f| self.framebuffers.get(&f).copied());
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native) };
    }

    fn framebuffer_texture_2d(&mut self, texture: TextureObject) {
        let native = self.textures.get(&texture).copied();
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                native,
                0,
            );
        }
    }

    fn create_renderbuffer(&mut self) -> Result<RenderbufferObject> {
        let native = created(unsafe { self.gl.create_renderbuffer() }, "renderbuffer")?;
        let renderbuffer = RenderbufferObject(self.next());
        self.renderbuffers.insert(renderbuffer, native);
        Ok(renderbuffer)
    }

    fn renderbuffer_attachment(
        &mut self,
        renderbuffer: RenderbufferObject,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) {
        let Some(&native) = self.renderbuffers.get(&renderbuffer) else {
            return;
        };
        let (storage, attachment) = match format {
            RenderbufferFormat::Depth16 => (glow::DEPTH_COMPONENT16, glow::DEPTH_ATTACHMENT),
            RenderbufferFormat::DepthStencil => (glow::DEPTH_STENCIL, glow::DEPTH_STENCIL_ATTACHMENT),
            RenderbufferFormat::Stencil8 => (glow::STENCIL_INDEX8, glow::STENCIL_ATTACHMENT),
        };
        unsafe {
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, Some(native));
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, storage, width as i32, height as i32);
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                attachment,
                glow::RENDERBUFFER,
                Some(native),
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferObject) {
        if let Some(native) = self.framebuffers.remove(&framebuffer) {
            unsafe { self.gl.delete_framebuffer(native) };
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferObject) {
        if let Some(native) = self.renderbuffers.remove(&renderbuffer) {
            unsafe { self.gl.delete_renderbuffer(native) };
        }
    }

    // --- Fixed-function state ---

    fn set_capability(&mut self, cap: Capability, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(capability(cap));
            } else {
                self.gl.disable(capability(cap));
            }
        }
    }

    fn depth_mask(&mut self, write: bool) {
        unsafe { self.gl.depth_mask(write) };
    }

    fn depth_func(&mut self, func: DepthFunc) {
        unsafe { self.gl.depth_func(depth_func(func)) };
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        unsafe { self.gl.blend_equation(blend_equation(equation)) };
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        unsafe { self.gl.blend_func(blend_factor(src), blend_factor(dst)) };
    }

    fn cull_face(&mut self, face: CullFace) {
        let face = match face {
            CullFace::Back => glow::BACK,
            CullFace::Front => glow::FRONT,
            CullFace::FrontAndBack => glow::FRONT_AND_BACK,
        };
        unsafe { self.gl.cull_face(face) };
    }

    fn front_face(&mut self, winding: FrontFace) {
        let winding = match winding {
            FrontFace::Ccw => glow::CCW,
            FrontFace::Cw => glow::CW,
        };
        unsafe { self.gl.front_face(winding) };
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        unsafe { self.gl.polygon_offset(factor, units) };
    }

    fn line_width(&mut self, width: f32) {
        unsafe { self.gl.line_width(width) };
    }

    // --- Frame ---

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) };
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) };
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) };
    }

    fn clear(&mut self, flags: ClearFlags) {
        let mut mask = 0;
        if flags.contains(ClearFlags::COLOR) {
            mask |= glow::COLOR_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::DEPTH) {
            mask |= glow::DEPTH_BUFFER_BIT;
        }
        if flags.contains(ClearFlags::STENCIL) {
            mask |= glow::STENCIL_BUFFER_BIT;
        }
        unsafe { self.gl.clear(mask) };
    }

    // --- Draws ---

    fn draw_elements(&mut self, mode: DrawMode, count: u32, offset: u32) {
        unsafe {
            self.gl.draw_elements(
                draw_mode(mode),
                count as i32,
                glow::UNSIGNED_SHORT,
                offset as i32,
            );
        }
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        unsafe { self.gl.draw_arrays(draw_mode(mode), first as i32, count as i32) };
    }
}
