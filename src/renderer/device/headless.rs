//! Headless device
//!
//! A [`GraphicsDevice`] without a GPU. Every call is appended to a log that
//! tests inspect; programs "link" by scanning their sources for `uniform` and
//! `attribute` declarations so location queries behave like a driver's.

use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::Result;
use crate::renderer::device::{
    BufferObject, BufferTarget, BufferUsage, Capability, ClearFlags, CullFace, DepthFunc,
    DeviceCapabilities, DrawMode, FramebufferObject, FrontFace, GraphicsDevice, ProgramObject,
    RenderbufferFormat, RenderbufferObject, SamplerState, ShaderObject, ShaderStage,
    TextureImage, TextureObject, UniformData, UniformLocation,
};
use crate::resources::{BlendEquation, BlendFactor};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer(BufferObject),
    BindBuffer(BufferTarget, Option<BufferObject>),
    BufferData {
        target: BufferTarget,
        buffer: Option<BufferObject>,
        data: Vec<u8>,
        usage: BufferUsage,
    },
    DeleteBuffer(BufferObject),
    EnableAttribute(u32),
    DisableAttribute(u32),
    AttributePointer { slot: u32, components: u32 },
    CompileShader { stage: ShaderStage, success: bool },
    LinkProgram { program: ProgramObject, success: bool },
    DeleteProgram(ProgramObject),
    UseProgram(Option<ProgramObject>),
    SetUniform { name: String, values: Vec<f32> },
    CreateTexture(TextureObject),
    ActiveTexture(u32),
    BindTexture(Option<TextureObject>),
    TexImage2D { width: u32, height: u32, has_data: bool },
    SamplerState(SamplerState),
    GenerateMipmap,
    DeleteTexture(TextureObject),
    CreateFramebuffer(FramebufferObject),
    BindFramebuffer(Option<FramebufferObject>),
    FramebufferTexture(TextureObject),
    CreateRenderbuffer(RenderbufferObject),
    RenderbufferAttachment { format: RenderbufferFormat, width: u32, height: u32 },
    DeleteFramebuffer(FramebufferObject),
    DeleteRenderbuffer(RenderbufferObject),
    SetCapability(Capability, bool),
    DepthMask(bool),
    DepthFunc(DepthFunc),
    BlendEquation(BlendEquation),
    BlendFunc(BlendFactor, BlendFactor),
    CullFace(CullFace),
    FrontFace(FrontFace),
    PolygonOffset(f32, f32),
    LineWidth(f32),
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    ClearColor([f32; 4]),
    Clear(ClearFlags),
    DrawElements { mode: DrawMode, count: u32, offset: u32 },
    DrawArrays { mode: DrawMode, first: u32, count: u32 },
}

struct HeadlessShader {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Default)]
struct HeadlessProgram {
    shaders: Vec<ShaderObject>,
    uniforms: Vec<(String, UniformLocation)>,
    attributes: Vec<String>,
    log: String,
}

/// Recording device. See the module docs.
pub struct HeadlessDevice {
    calls: Vec<DeviceCall>,
    next_id: u32,
    capabilities: DeviceCapabilities,
    compile_failure_marker: Option<String>,

    array_buffer: Option<BufferObject>,
    element_buffer: Option<BufferObject>,
    live_buffers: FxHashSet<BufferObject>,
    live_textures: FxHashSet<TextureObject>,
    live_framebuffers: FxHashSet<FramebufferObject>,
    live_renderbuffers: FxHashSet<RenderbufferObject>,

    shaders: FxHashMap<ShaderObject, HeadlessShader>,
    programs: FxHashMap<ProgramObject, HeadlessProgram>,
    uniform_names: FxHashMap<UniformLocation, String>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_id: 1,
            capabilities: DeviceCapabilities::default(),
            compile_failure_marker: None,
            array_buffer: None,
            element_buffer: None,
            live_buffers: FxHashSet::default(),
            live_textures: FxHashSet::default(),
            live_framebuffers: FxHashSet::default(),
            live_renderbuffers: FxHashSet::default(),
            shaders: FxHashMap::default(),
            programs: FxHashMap::default(),
            uniform_names: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Makes every shader whose source contains `marker` fail to compile.
    pub fn fail_compiles_containing(&mut self, marker: &str) {
        self.compile_failure_marker = Some(marker.to_string());
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of `buffer_data` uploads that targeted `buffer`.
    #[must_use]
    pub fn uploads_to(&self, buffer: BufferObject) -> usize {
        self.count_calls(|c| matches!(c, DeviceCall::BufferData { buffer: Some(b), .. } if *b == buffer))
    }

    /// The floats of the last upload to `buffer`.
    #[must_use]
    pub fn last_upload_f32(&self, buffer: BufferObject) -> Option<Vec<f32>> {
        self.calls.iter().rev().find_map(|c| match c {
            DeviceCall::BufferData {
                buffer: Some(b),
                data,
                ..
            } if *b == buffer => Some(bytemuck::pod_collect_to_vec(data)),
            _ => None,
        })
    }

    /// Total number of `buffer_data` uploads.
    #[must_use]
    pub fn upload_count(&self) -> usize {
        self.count_calls(|c| matches!(c, DeviceCall::BufferData { .. }))
    }

    /// Recorded draw calls, in order.
    #[must_use]
    pub fn draw_calls(&self) -> Vec<&DeviceCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::DrawElements { .. } | DeviceCall::DrawArrays { .. }))
            .collect()
    }

    /// Values of every upload of the uniform `name`, in order.
    #[must_use]
    pub fn uniform_uploads(&self, name: &str) -> Vec<&[f32]> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SetUniform { name: n, values } if n == name => Some(values.as_slice()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.live_buffers.len()
    }

    #[must_use]
    pub fn is_buffer_live(&self, buffer: BufferObject) -> bool {
        self.live_buffers.contains(&buffer)
    }

    #[must_use]
    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.len()
    }

    #[must_use]
    pub fn live_framebuffer_count(&self) -> usize {
        self.live_framebuffers.len()
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, call: DeviceCall) {
        trace!("device: {call:?}");
        self.calls.push(call);
    }

    fn bound(&self, target: BufferTarget) -> Option<BufferObject> {
        match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.element_buffer,
        }
    }
}

/// Names declared by `keyword` lines (`uniform` / `attribute`), array
/// suffixes stripped, in declaration order.
fn declared_names(source: &str, keyword: &str, out: &mut Vec<String>) {
    for line in source.lines() {
        let Some(rest) = line.trim().strip_prefix(keyword) else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let declaration = rest.split(';').next().unwrap_or_default();
        let mut tokens = declaration
            .split_whitespace()
            .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp"));
        let _ty = tokens.next();
        let names = tokens.collect::<Vec<_>>().join(" ");
        for part in names.split(',') {
            let name = part.split('[').next().unwrap_or_default().trim();
            if !name.is_empty() && !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
    }
}

fn flatten(data: UniformData<'_>) -> Vec<f32> {
    match data {
        UniformData::Float1(v)
        | UniformData::Float2(v)
        | UniformData::Float3(v)
        | UniformData::Float4(v)
        | UniformData::Matrix3(v)
        | UniformData::Matrix4(v) => v.to_vec(),
        UniformData::Int1(v) => v.iter().map(|&i| i as f32).collect(),
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    // --- Buffers ---

    fn create_buffer(&mut self) -> Result<BufferObject> {
        let buffer = BufferObject(self.next());
        self.live_buffers.insert(buffer);
        self.record(DeviceCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferObject>) {
        match target {
            BufferTarget::Array => self.array_buffer = buffer,
            BufferTarget::ElementArray => self.element_buffer = buffer,
        }
        self.record(DeviceCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let buffer = self.bound(target);
        self.record(DeviceCall::BufferData {
            target,
            buffer,
            data: data.to_vec(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferObject) {
        self.live_buffers.remove(&buffer);
        if self.array_buffer == Some(buffer) {
            self.array_buffer = None;
        }
        if self.element_buffer == Some(buffer) {
            self.element_buffer = None;
        }
        self.record(DeviceCall::DeleteBuffer(buffer));
    }

    // --- Vertex attributes ---

    fn enable_vertex_attrib_array(&mut self, slot: u32) {
        self.record(DeviceCall::EnableAttribute(slot));
    }

    fn disable_vertex_attrib_array(&mut self, slot: u32) {
        self.record(DeviceCall::DisableAttribute(slot));
    }

    fn vertex_attrib_pointer(&mut self, slot: u32, components: u32, _stride: u32, _offset: u32) {
        self.record(DeviceCall::AttributePointer { slot, components });
    }

    // --- Shaders & programs ---

    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderObject> {
        let shader = ShaderObject(self.next());
        self.shaders.insert(
            shader,
            HeadlessShader {
                stage,
                source: String::new(),
                compiled: false,
                log: String::new(),
            },
        );
        Ok(shader)
    }

    fn shader_source(&mut self, shader: ShaderObject, source: &str) {
        if let Some(s) = self.shaders.get_mut(&shader) {
            s.source = source.to_string();
        }
    }

    fn compile_shader(&mut self, shader: ShaderObject) -> bool {
        let marker = self.compile_failure_marker.clone();
        let Some(s) = self.shaders.get_mut(&shader) else {
            return false;
        };
        let failed = marker.as_deref().is_some_and(|m| s.source.contains(m));
        s.compiled = !failed;
        s.log = if failed {
            format!("ERROR: 0:1: '{}' : syntax error", marker.unwrap_or_default())
        } else {
            String::new()
        };
        let stage = s.stage;
        self.record(DeviceCall::CompileShader {
            stage,
            success: !failed,
        });
        !failed
    }

    fn shader_info_log(&self, shader: ShaderObject) -> String {
        self.shaders
            .get(&shader)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderObject) {
        // Sources stay readable while attached to a program, as in GL.
        let attached = self.programs.values().any(|p| p.shaders.contains(&shader));
        if !attached {
            self.shaders.remove(&shader);
        }
    }

    fn create_program(&mut self) -> Result<ProgramObject> {
        let program = ProgramObject(self.next());
        self.programs.insert(program, HeadlessProgram::default());
        Ok(program)
    }

    fn attach_shader(&mut self, program: ProgramObject, shader: ShaderObject) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.shaders.push(shader);
        }
    }

    fn link_program(&mut self, program: ProgramObject) -> bool {
        let Some(shader_handles) = self.programs.get(&program).map(|p| p.shaders.clone()) else {
            return false;
        };

        let mut uniform_names = Vec::new();
        let mut attributes = Vec::new();
        let mut success = !shader_handles.is_empty();
        for handle in &shader_handles {
            match self.shaders.get(handle) {
                Some(shader) if shader.compiled => {
                    declared_names(&shader.source, "uniform", &mut uniform_names);
                    if shader.stage == ShaderStage::Vertex {
                        declared_names(&shader.source, "attribute", &mut attributes);
                    }
                }
                _ => success = false,
            }
        }

        let mut uniforms = Vec::with_capacity(uniform_names.len());
        if success {
            for name in uniform_names {
                let location = UniformLocation(self.next());
                self.uniform_names.insert(location, name.clone());
                uniforms.push((name, location));
            }
        }

        if let Some(p) = self.programs.get_mut(&program) {
            p.uniforms = uniforms;
            p.attributes = if success { attributes } else { Vec::new() };
            p.log = if success {
                String::new()
            } else {
                "ERROR: one or more attached shaders not successfully compiled".to_string()
            };
        }
        self.record(DeviceCall::LinkProgram { program, success });
        success
    }

    fn program_info_log(&self, program: ProgramObject) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramObject) {
        if let Some(p) = self.programs.remove(&program) {
            for (_, location) in &p.uniforms {
                self.uniform_names.remove(location);
            }
            for shader in p.shaders {
                self.shaders.remove(&shader);
            }
        }
        self.record(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramObject>) {
        self.record(DeviceCall::UseProgram(program));
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
        self.programs
            .get(&program)?
            .attributes
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    fn set_uniform(&mut self, location: UniformLocation, data: UniformData<'_>) {
        let name = self
            .uniform_names
            .get(&location)
            .cloned()
            .unwrap_or_default();
        self.record(DeviceCall::SetUniform {
            name,
            values: flatten(data),
        });
    }

    // --- Textures ---

    fn create_texture(&mut self) -> Result<TextureObject> {
        let texture = TextureObject(self.next());
        self.live_textures.insert(texture);
        self.record(DeviceCall::CreateTexture(texture));
        Ok(texture)
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(DeviceCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: Option<TextureObject>) {
        self.record(DeviceCall::BindTexture(texture));
    }

    fn tex_image_2d(&mut self, image: &TextureImage<'_>) {
        self.record(DeviceCall::TexImage2D {
            width: image.width,
            height: image.height,
            has_data: image.data.is_some(),
        });
    }

    fn set_sampler_state(&mut self, sampler: &SamplerState) {
        self.record(DeviceCall::SamplerState(*sampler));
    }

    fn generate_mipmap(&mut self) {
        self.record(DeviceCall::GenerateMipmap);
    }

    fn delete_texture(&mut self, texture: TextureObject) {
        self.live_textures.remove(&texture);
        self.record(DeviceCall::DeleteTexture(texture));
    }

    // --- Framebuffers ---

    fn create_framebuffer(&mut self) -> Result<FramebufferObject> {
        let framebuffer = FramebufferObject(self.next());
        self.live_framebuffers.insert(framebuffer);
        self.record(DeviceCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferObject>) {
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&mut self, texture: TextureObject) {
        self.record(DeviceCall::FramebufferTexture(texture));
    }

    fn create_renderbuffer(&mut self) -> Result<RenderbufferObject> {
        let renderbuffer = RenderbufferObject(self.next());
        self.live_renderbuffers.insert(renderbuffer);
        self.record(DeviceCall::CreateRenderbuffer(renderbuffer));
        Ok(renderbuffer)
    }

    fn renderbuffer_attachment(
        &mut self,
        _renderbuffer: RenderbufferObject,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) {
        self.record(DeviceCall::RenderbufferAttachment {
            format,
            width,
            height,
        });
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferObject) {
        self.live_framebuffers.remove(&framebuffer);
        self.record(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferObject) {
        self.live_renderbuffers.remove(&renderbuffer);
        self.record(DeviceCall::DeleteRenderbuffer(renderbuffer));
    }

    // --- Fixed-function state ---

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        self.record(DeviceCall::SetCapability(capability, enabled));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(DeviceCall::DepthMask(write));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.record(DeviceCall::DepthFunc(func));
    }

    fn blend_equation(&mut self, equation: BlendEquation) {
        self.record(DeviceCall::BlendEquation(equation));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.record(DeviceCall::BlendFunc(src, dst));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.record(DeviceCall::CullFace(face));
    }

    fn front_face(&mut self, winding: FrontFace) {
        self.record(DeviceCall::FrontFace(winding));
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(DeviceCall::PolygonOffset(factor, units));
    }

    fn line_width(&mut self, width: f32) {
        self.record(DeviceCall::LineWidth(width));
    }

    // --- Frame ---

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(DeviceCall::Viewport(x, y, width, height));
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.record(DeviceCall::Scissor(x, y, width, height));
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.record(DeviceCall::ClearColor([r, g, b, a]));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.record(DeviceCall::Clear(flags));
    }

    // --- Draws ---

    fn draw_elements(&mut self, mode: DrawMode, count: u32, offset: u32) {
        self.record(DeviceCall::DrawElements {
            mode,
            count,
            offset,
        });
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        self.record(DeviceCall::DrawArrays { mode, first, count });
    }
}
