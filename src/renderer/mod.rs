//! Renderer
//!
//! [`Renderer`] turns a [`Scene`] into draw calls on a [`GraphicsDevice`].
//!
//! # Frame
//!
//! 1. Propagate world transforms and update the camera view.
//! 2. Count the scene's lights and fit them into the light budget.
//! 3. Forget removed objects; allocate and update GPU buffers of every
//!    object in the scene.
//! 4. Build the draw list (cull, bucket, sort).
//! 5. Bind the render target, clear, run pre plugins.
//! 6. Draw the opaque list, then the transparent list. Each draw resolves
//!    its material's program, refreshes uniforms when the program, material
//!    or camera changed, binds vertex buffers and submits.
//! 7. Run post plugins, update target mipmaps, restore depth state.
//!
//! Failures inside a frame (shader errors, missing resources) are logged and
//! skip the affected draw. An invalid camera skips the whole frame.

pub mod buffer_manager;
pub mod context;
pub mod device;
pub mod draw_list;
pub mod geometry_group;
pub mod info;
pub mod lights;
pub mod partition;
pub mod plugin;
pub mod program;
pub mod refresh;
pub mod render_target;
pub mod settings;
pub mod state;
pub mod texture_manager;

use glam::Mat4;
use log::{debug, error, trace, warn};
use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::assets::{AssetStorage, Assets, GeometryHandle, MaterialHandle, TextureHandle};
use crate::errors::{RenderError, Result};
use crate::resources::{
    BlendEquation, BlendFactor, Blending, Material, MaterialKind, ShaderDefines, Side, Texture,
    Uniforms,
};
use crate::scene::{Camera, LineMode, Mesh, Node, NodeHandle, NodeKind, RenderableKind, Scene};

use self::buffer_manager::GpuBufferManager;
use self::context::{BindingKey, RenderContext};
use self::device::{
    BufferObject, BufferTarget, ClearFlags, DepthFunc, DeviceCapabilities, DrawMode,
    GraphicsDevice, UniformData,
};
use self::draw_list::{DrawItem, DrawListBuilder, DrawLists};
use self::geometry_group::{GeometryGroup, GroupBuffers};
use self::info::RenderInfo;
use self::lights::{LightArrays, LightBudget, allocate_lights, count_lights, count_shadows};
use self::program::{
    ParameterContext, Program, ProgramCache, ProgramDescriptor, ProgramHandle, ProgramParameters,
    ShaderLibrary,
};
use self::refresh::{
    FrameUniforms, ObjectMatrices, ShadowArrays, TextureBinder, refresh_material,
    select_morph_targets, upload_bones, upload_matrices, upload_uniforms,
};
use self::settings::RendererSettings;
use self::state::FrameStateCache;
use self::texture_manager::TextureManager;

pub use plugin::{PluginContext, RenderPlugin};
pub use render_target::RenderTarget;

/// One compiled program of a material.
///
/// Nodes that differ in bone count or shadow reception draw the same
/// material with different programs, so a material can hold several.
#[derive(Debug, Clone, Copy)]
struct ProgramVariant {
    code: u64,
    program: ProgramHandle,
    max_bones: u32,
    /// Frame the variant was last drawn in.
    last_frame: u64,
}

/// Renderer-side state of one material.
#[derive(Debug, Default)]
struct MaterialState {
    variants: SmallVec<[ProgramVariant; 2]>,
    /// Program of the most recent draw.
    current: Option<ProgramHandle>,
    /// Codes that failed to build. Not retried until the material is flagged
    /// `needs_update`.
    failed_codes: SmallVec<[u64; 2]>,
    /// Built-in uniforms: shader library defaults, refreshed from the
    /// material. Only fog and lights for `Shader` materials.
    uniforms: Uniforms,
    warned_missing: bool,
}

impl MaterialState {
    fn max_bones(&self, program: ProgramHandle) -> u32 {
        self.variants
            .iter()
            .find(|v| v.program == program)
            .map_or(0, |v| v.max_bones)
    }
}

/// Outcome of trying to track an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tracking {
    Tracked,
    /// Not drawn by the core passes.
    Skipped,
    /// Buffers could not be set up; tried again next frame.
    Retry,
}

#[derive(Debug, Clone, Copy)]
enum PluginPhase {
    Pre,
    Post,
}

fn camera_of(scene: &Scene, handle: NodeHandle) -> Option<&Camera> {
    match &scene.node(handle)?.kind {
        NodeKind::Camera(camera) => Some(camera),
        _ => None,
    }
}

pub struct Renderer<D: GraphicsDevice> {
    device: D,
    library: Box<dyn ShaderLibrary>,
    settings: RendererSettings,
    capabilities: DeviceCapabilities,

    buffers: GpuBufferManager,
    programs: ProgramCache,
    textures: TextureManager,
    materials: SecondaryMap<MaterialHandle, MaterialState>,
    draw_list: DrawListBuilder,
    state: FrameStateCache,
    context: RenderContext,
    info: RenderInfo,

    pre_plugins: Vec<Box<dyn RenderPlugin>>,
    post_plugins: Vec<Box<dyn RenderPlugin>>,

    width: u32,
    height: u32,
    viewport: [i32; 4],

    light_budget: LightBudget,
    shadow_count: u32,
    lights: LightArrays,
    shadows: ShadowArrays,
    joints: Vec<Mat4>,
    /// Renders started so far.
    frame: u64,
}

impl<D: GraphicsDevice> Renderer<D> {
    /// Creates a renderer and puts the device into its default state.
    ///
    /// The drawing buffer size starts at zero; call [`set_size`](Self::set_size).
    pub fn new(mut device: D, library: Box<dyn ShaderLibrary>, settings: RendererSettings) -> Self {
        let capabilities = device.capabilities();
        debug!("Device capabilities: {capabilities:?}");

        let [r, g, b] = settings.clear_color;
        device.clear_color(r, g, b, settings.clear_alpha);
        device.depth_func(DepthFunc::LessEqual);

        let mut state = FrameStateCache::new();
        state.set_depth_test(&mut device, true);
        state.set_depth_write(&mut device, true);
        state.set_material_faces(&mut device, Side::Front);
        state.set_blending(
            &mut device,
            Blending::Normal,
            BlendEquation::Add,
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
        );

        Self {
            device,
            library,
            settings,
            capabilities,
            buffers: GpuBufferManager::new(),
            programs: ProgramCache::new(),
            textures: TextureManager::new(),
            materials: SecondaryMap::new(),
            draw_list: DrawListBuilder::new(),
            state,
            context: RenderContext::new(),
            info: RenderInfo::default(),
            pre_plugins: Vec::new(),
            post_plugins: Vec::new(),
            width: 0,
            height: 0,
            viewport: [0; 4],
            light_budget: LightBudget::default(),
            shadow_count: 0,
            lights: LightArrays::default(),
            shadows: ShadowArrays::default(),
            joints: Vec::new(),
            frame: 0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Changes take effect on the next render. Settings that feed program
    /// generation rebuild programs as materials are drawn.
    #[inline]
    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    #[inline]
    #[must_use]
    pub fn info(&self) -> &RenderInfo {
        &self.info
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Light counts compiled into programs during the last render.
    #[inline]
    #[must_use]
    pub fn light_budget(&self) -> LightBudget {
        self.light_budget
    }

    /// Geometry groups of an uploaded geometry.
    #[must_use]
    pub fn geometry_groups(&self, geometry: GeometryHandle) -> &[GeometryGroup] {
        self.buffers.groups(geometry)
    }

    #[inline]
    #[must_use]
    pub fn program_cache(&self) -> &ProgramCache {
        &self.programs
    }

    /// The program of the material's most recent draw.
    #[must_use]
    pub fn material_program(&self, material: MaterialHandle) -> Option<&Program> {
        let handle = self.materials.get(material)?.current?;
        self.programs.get(handle)
    }

    /// Draw lists built by the last render.
    #[must_use]
    pub fn draw_lists(&self) -> &DrawLists {
        self.draw_list.lists()
    }

    // ========================================================================
    // Output configuration
    // ========================================================================

    /// Resizes the drawing buffer and resets the viewport to cover it.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.set_viewport(0, 0, width as i32, height as i32);
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.viewport = [x, y, width, height];
        self.device.viewport(x, y, width, height);
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.device.scissor(x, y, width, height);
    }

    pub fn enable_scissor_test(&mut self, enable: bool) {
        self.device.set_capability(device::Capability::ScissorTest, enable);
    }

    pub fn set_clear_color(&mut self, color: [f32; 3], alpha: f32) {
        self.settings.clear_color = color;
        self.settings.clear_alpha = alpha;
        self.device.clear_color(color[0], color[1], color[2], alpha);
    }

    /// Clears the selected buffers of the current target.
    pub fn clear(&mut self, color: bool, depth: bool, stencil: bool) {
        let mut flags = ClearFlags::empty();
        flags.set(ClearFlags::COLOR, color);
        flags.set(ClearFlags::DEPTH, depth);
        flags.set(ClearFlags::STENCIL, stencil);
        if !flags.is_empty() {
            self.device.clear(flags);
        }
    }

    /// Binds `target`, or the default framebuffer for `None`, and sets the
    /// viewport to match.
    pub fn set_render_target(&mut self, target: Option<&mut RenderTarget>) {
        let Some(target) = target else {
            self.state.bind_framebuffer(&mut self.device, None);
            let [x, y, w, h] = self.viewport;
            self.device.viewport(x, y, w, h);
            return;
        };

        let created = target.objects().is_none();
        let objects = match target.ensure_objects(&mut self.device) {
            Ok(objects) => objects,
            Err(err) => {
                error!("Failed to create render target: {err}");
                return;
            }
        };
        if created {
            self.state.invalidate_framebuffer();
        }
        self.state
            .bind_framebuffer(&mut self.device, Some(objects.framebuffer));
        self.device
            .viewport(0, 0, target.width as i32, target.height as i32);
    }

    /// Binds a texture to `unit`, uploading it first if needed.
    pub fn set_texture(&mut self, assets: &mut Assets, texture: TextureHandle, unit: u32) -> Result<()> {
        let data = assets
            .textures
            .get_mut(texture)
            .ok_or_else(|| RenderError::ResourceNotFound("texture".to_string()))?;
        self.textures
            .bind(&mut self.device, texture, data, unit, &mut self.info)
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    /// Runs after the target is cleared, before the opaque pass.
    pub fn add_pre_plugin(&mut self, plugin: Box<dyn RenderPlugin>) {
        self.pre_plugins.push(plugin);
    }

    /// Runs after the transparent pass.
    pub fn add_post_plugin(&mut self, plugin: Box<dyn RenderPlugin>) {
        self.post_plugins.push(plugin);
    }

    fn run_plugins(
        &mut self,
        phase: PluginPhase,
        scene: &mut Scene,
        assets: &mut Assets,
        camera: NodeHandle,
    ) {
        let mut plugins = match phase {
            PluginPhase::Pre => std::mem::take(&mut self.pre_plugins),
            PluginPhase::Post => std::mem::take(&mut self.post_plugins),
        };

        for plugin in &mut plugins {
            self.state.reset();
            self.context.reset();
            trace!("Running {phase:?} plugin '{}'", plugin.name());

            let mut ctx = PluginContext {
                device: &mut self.device,
                scene: &mut *scene,
                assets: &mut *assets,
                camera,
                width: self.width,
                height: self.height,
            };
            plugin.render(&mut ctx);

            self.state.reset();
            self.context.reset();
        }

        match phase {
            PluginPhase::Pre => self.pre_plugins = plugins,
            PluginPhase::Post => self.post_plugins = plugins,
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stops drawing `node` in `scene` and frees its geometry's buffers.
    ///
    /// A node that is still attached is uploaded again on its next render.
    pub fn deallocate_object(&mut self, scene: &Scene, node: NodeHandle) {
        self.draw_list.remove_object(scene.id(), node);
        self.draw_list.defer(scene.id(), node);
        if let Some(geometry) = scene.node(node).and_then(|n| n.kind.geometry()) {
            self.deallocate_geometry(geometry);
        }
    }

    pub fn deallocate_geometry(&mut self, geometry: GeometryHandle) {
        if self
            .buffers
            .release(&mut self.device, geometry, &mut self.info)
        {
            debug!("Released buffers of geometry {geometry:?}");
        }
        self.draw_list.remove_geometry(geometry);
        self.context.current_binding = None;
    }

    pub fn deallocate_texture(&mut self, texture: TextureHandle) {
        self.textures
            .release(&mut self.device, texture, &mut self.info);
    }

    /// Drops the material's use of its program, deleting the program when no
    /// other material uses it.
    pub fn deallocate_material(&mut self, material: MaterialHandle) {
        let Some(state) = self.materials.remove(material) else {
            return;
        };
        for variant in state.variants {
            release_program(&mut self.programs, &mut self.device, &mut self.info, variant.program);
        }
        if self.context.current_material == Some(material) {
            self.context.reset();
        }
    }

    pub fn deallocate_render_target(&mut self, target: &mut RenderTarget) {
        if target.release(&mut self.device) {
            self.state.invalidate_framebuffer();
        }
    }

    // ========================================================================
    // Render
    // ========================================================================

    /// Renders `scene` as seen from `camera` into `target` (or the default
    /// framebuffer).
    pub fn render(
        &mut self,
        scene: &mut Scene,
        assets: &mut Assets,
        camera: NodeHandle,
        mut target: Option<&mut RenderTarget>,
        force_clear: bool,
    ) {
        if camera_of(scene, camera).is_none() {
            error!(
                "{}",
                RenderError::InvalidCamera(format!("{camera:?} is not a camera node"))
            );
            return;
        }

        self.frame += 1;
        self.info.reset_frame();
        self.context.reset();
        self.context.lights_need_update = true;

        // 1. Transforms
        if scene.auto_update {
            let root = scene.root();
            scene.update_world_transforms(root);
        }
        if !scene.is_attached(camera) {
            scene.update_world_transforms(camera);
        }
        if let Some(node) = scene.node_mut(camera) {
            let world = *node.transform.world_matrix();
            if let NodeKind::Camera(camera) = &mut node.kind {
                camera.update_view(&world);
            }
        }

        // 2. Lights
        self.light_budget = allocate_lights(count_lights(scene), self.settings.max_lights);
        if self.settings.shadow_map_enabled {
            self.shadow_count = count_shadows(scene);
            self.shadows = ShadowArrays::gather(scene);
        } else {
            self.shadow_count = 0;
            self.shadows = ShadowArrays::default();
        }

        // 3. Objects
        let Some(view_projection) = camera_of(scene, camera).map(|c| *c.view_projection_matrix())
        else {
            return;
        };
        let pending = scene.take_pending();
        for &node in &pending.removed {
            self.draw_list.remove_object(scene.id(), node);
        }
        self.update_objects(scene, assets, &pending.added, &view_projection);

        // 4. Draw list
        let lists = {
            let Some(camera) = camera_of(scene, camera) else {
                return;
            };
            self.draw_list
                .build(scene, assets, camera, self.settings.sort_objects);
            self.draw_list.take_lists()
        };

        // 5. Target, clear, pre plugins
        self.set_render_target(target.as_deref_mut());
        if self.settings.auto_clear || force_clear {
            self.clear(
                self.settings.auto_clear_color,
                self.settings.auto_clear_depth,
                self.settings.auto_clear_stencil,
            );
        }
        self.run_plugins(PluginPhase::Pre, scene, assets, camera);

        // 6. Passes
        if let Some(override_material) = scene.override_material {
            if let Some(material) = assets.material(override_material) {
                self.state.set_blending(
                    &mut self.device,
                    material.blending,
                    material.blend_equation,
                    material.blend_src,
                    material.blend_dst,
                );
            }
            self.render_items(&lists.opaque, scene, assets, camera, Some(override_material), false);
            self.render_items(&lists.transparent, scene, assets, camera, Some(override_material), false);
        } else {
            self.state.set_blending(
                &mut self.device,
                Blending::None,
                BlendEquation::Add,
                BlendFactor::SrcAlpha,
                BlendFactor::OneMinusSrcAlpha,
            );
            self.render_items(&lists.opaque, scene, assets, camera, None, false);
            self.render_items(&lists.transparent, scene, assets, camera, None, true);
        }
        self.draw_list.restore_lists(lists);

        // 7. Post plugins, mipmaps, depth state
        self.run_plugins(PluginPhase::Post, scene, assets, camera);

        if let Some(target) = target {
            target.update_mipmaps(&mut self.device);
        }
        self.state.set_depth_test(&mut self.device, true);
        self.state.set_depth_write(&mut self.device, true);
    }

    /// Tracks newly added objects, then uploads every tracked one.
    ///
    /// Objects already tracked keep their buffers; only dirty streams are
    /// re-uploaded.
    fn update_objects(
        &mut self,
        scene: &Scene,
        assets: &mut Assets,
        added: &[NodeHandle],
        view_projection: &Mat4,
    ) {
        let scene_id = scene.id();
        let mut candidates = self.draw_list.take_deferred(scene_id);
        candidates.extend_from_slice(added);
        for handle in candidates {
            if !scene.is_attached(handle) || self.draw_list.is_tracked(scene_id, handle) {
                continue;
            }
            let Some(node) = scene.node(handle) else {
                continue;
            };
            if self.track_object(scene_id, handle, node, assets) == Tracking::Retry {
                self.draw_list.defer(scene_id, handle);
            }
        }

        for &handle in scene.objects() {
            if !self.draw_list.is_tracked(scene_id, handle) {
                continue;
            }
            let Some(node) = scene.node(handle) else {
                continue;
            };
            let model_view_projection = *view_projection * node.transform.world_matrix_as_mat4();
            self.buffers
                .update_object(&mut self.device, node, assets, &model_view_projection);
        }
    }

    fn track_object(
        &mut self,
        scene_id: u32,
        handle: NodeHandle,
        node: &Node,
        assets: &mut Assets,
    ) -> Tracking {
        let (Some(kind), Some(geometry)) = (node.kind.renderable(), node.kind.geometry()) else {
            return Tracking::Skipped;
        };
        if !kind.is_core_drawable() {
            return Tracking::Skipped;
        }
        if let Err(err) = self
            .buffers
            .init_object(&mut self.device, node, assets, &mut self.info)
        {
            error!("Failed to allocate buffers for '{}': {err}", node.name);
            return Tracking::Retry;
        }
        if !self.buffers.contains(geometry) {
            return Tracking::Retry;
        }
        let material_indices: SmallVec<[u32; 4]> = self
            .buffers
            .groups(geometry)
            .iter()
            .map(|g| g.material_index)
            .collect();
        self.draw_list
            .add_object(scene_id, handle, geometry, material_indices, kind);
        Tracking::Tracked
    }

    fn render_items(
        &mut self,
        items: &[DrawItem],
        scene: &Scene,
        assets: &mut Assets,
        camera: NodeHandle,
        override_material: Option<MaterialHandle>,
        use_blending: bool,
    ) {
        for item in items {
            let material = override_material.unwrap_or(item.material);
            self.draw_item(item, material, scene, assets, camera, use_blending);
        }
    }

    fn draw_item(
        &mut self,
        item: &DrawItem,
        material_handle: MaterialHandle,
        scene: &Scene,
        assets: &mut Assets,
        camera_handle: NodeHandle,
        use_blending: bool,
    ) {
        let Some(node) = scene.node(item.entry.node) else {
            return;
        };
        let Some(camera) = camera_of(scene, camera_handle) else {
            return;
        };
        let Assets {
            materials,
            textures,
            ..
        } = assets;
        let Some(material) = materials.get_mut(material_handle) else {
            return;
        };

        let Some(program_handle) = self.ensure_program(material_handle, material, node, scene) else {
            return;
        };
        let material: &Material = material;

        if use_blending {
            self.state.set_blending(
                &mut self.device,
                material.blending,
                material.blend_equation,
                material.blend_src,
                material.blend_dst,
            );
        }
        self.state.set_depth_test(&mut self.device, material.depth_test);
        self.state.set_depth_write(&mut self.device, material.depth_write);
        self.state.set_polygon_offset(
            &mut self.device,
            material.polygon_offset,
            material.polygon_offset_factor,
            material.polygon_offset_units,
        );
        self.state.set_material_faces(&mut self.device, material.side);

        self.set_program(
            program_handle,
            material_handle,
            material,
            node,
            scene,
            camera_handle,
            camera,
            textures,
        );

        let Some(program) = self.programs.get(program_handle) else {
            return;
        };
        let Some(group) = self.buffers.group(item.entry.geometry, item.entry.group) else {
            return;
        };
        let Some(buffers) = group.buffers() else {
            return;
        };

        let is_mesh = item.entry.kind == RenderableKind::Mesh;
        let wireframe = is_mesh && material.wireframe;
        let morph = match &node.kind {
            NodeKind::Mesh(Mesh {
                morph_target_influences,
                ..
            }) if material.morph_targets => Some(MorphBinding {
                influences: morph_target_influences,
                targets: self.settings.max_morph_targets as usize,
                normals: material
                    .morph_normals
                    .then_some(self.settings.max_morph_normals as usize),
            }),
            _ => None,
        };

        let key = BindingKey {
            group_id: group.id(),
            program_id: program.id,
            wireframe,
        };
        // Morph bindings depend on the object's influences, not just the group.
        if self.context.current_binding != Some(key) || morph.is_some() {
            bind_group(
                &mut self.device,
                &mut self.state,
                program,
                buffers,
                morph.as_ref(),
            );
            if is_mesh {
                let index = if wireframe { buffers.lines } else { buffers.faces };
                self.device.bind_buffer(BufferTarget::ElementArray, index);
            }
            self.context.current_binding = Some(key);
        }

        submit(
            &mut self.device,
            &mut self.state,
            &mut self.info,
            item.entry.kind,
            material,
            group,
            buffers,
            wireframe,
        );
    }

    /// Returns the program `material` draws with for `node`.
    ///
    /// Each distinct code gets its own variant, built once. `needs_update`
    /// drops every variant; a new code drops the ones not drawn this frame.
    fn ensure_program(
        &mut self,
        handle: MaterialHandle,
        material: &mut Material,
        node: &Node,
        scene: &Scene,
    ) -> Option<ProgramHandle> {
        let bone_count = match &node.kind {
            NodeKind::Mesh(Mesh {
                skeleton: Some(skeleton),
                ..
            }) => skeleton.bone_count() as u32,
            _ => 0,
        };
        let parameters = ProgramParameters::from_material(
            material,
            &ParameterContext {
                settings: &self.settings,
                capabilities: self.capabilities,
                lights: self.light_budget,
                shadows: self.shadow_count,
                fog: scene.fog.as_ref(),
                bone_count,
                receive_shadow: node.receive_shadow,
            },
        );

        let no_defines = ShaderDefines::new();
        let (shader_id, vertex, fragment, defines, defaults) = match &material.kind {
            MaterialKind::Shader(source) => (
                None,
                source.vertex_shader.as_str(),
                source.fragment_shader.as_str(),
                &source.defines,
                None,
            ),
            kind => {
                let id = kind.shader_id()?;
                let Some(source) = self.library.source(id) else {
                    error!("{}", RenderError::UnknownShader(id.to_string()));
                    return None;
                };
                (
                    Some(id),
                    source.vertex.as_str(),
                    source.fragment.as_str(),
                    &no_defines,
                    Some(&source.uniforms),
                )
            }
        };
        let descriptor = ProgramDescriptor {
            shader_id,
            vertex_source: vertex,
            fragment_source: fragment,
            defines,
            parameters: &parameters,
        };
        let code = descriptor.code();

        let frame = self.frame;
        if !self.materials.contains_key(handle) {
            self.materials.insert(handle, MaterialState::default());
        }
        let state = self.materials.get_mut(handle)?;

        let retired: SmallVec<[ProgramVariant; 2]> = if material.needs_update {
            state.failed_codes.clear();
            state.current = None;
            state.variants.drain(..).collect()
        } else {
            if let Some(variant) = state.variants.iter_mut().find(|v| v.code == code) {
                variant.last_frame = frame;
                state.current = Some(variant.program);
                return state.current;
            }
            if state.failed_codes.contains(&code) {
                return None;
            }
            // A new code retires the variants that have not drawn this frame.
            let (kept, retired): (SmallVec<[ProgramVariant; 2]>, _) = state
                .variants
                .drain(..)
                .partition(|v| v.last_frame == frame);
            state.variants = kept;
            retired
        };
        material.needs_update = false;
        if state.variants.is_empty() {
            state.uniforms = defaults.cloned().unwrap_or_default();
            state.warned_missing = false;
        }

        // Resolve before releasing so an unchanged code keeps its program.
        let resolved = self.programs.resolve(&mut self.device, &descriptor);
        if let Some(program) = resolved
            && self.programs.get(program).is_some_and(|p| p.usage == 1)
        {
            self.info.memory.programs += 1;
        }
        for variant in retired {
            release_program(&mut self.programs, &mut self.device, &mut self.info, variant.program);
        }

        match resolved {
            Some(program) => {
                state.variants.push(ProgramVariant {
                    code,
                    program,
                    max_bones: parameters.max_bones,
                    last_frame: frame,
                });
                state.current = Some(program);
            }
            None => {
                warn!("Material '{}' has no usable program, skipping it", material.name);
                state.failed_codes.push(code);
            }
        }
        resolved
    }

    /// Makes `program` current and uploads its uniforms.
    ///
    /// Material uniforms are refreshed only when the program, material or
    /// camera differs from the previous draw; matrices are uploaded always.
    fn set_program(
        &mut self,
        program_handle: ProgramHandle,
        material_handle: MaterialHandle,
        material: &Material,
        node: &Node,
        scene: &Scene,
        camera_handle: NodeHandle,
        camera: &Camera,
        textures: &mut AssetStorage<TextureHandle, Texture>,
    ) {
        let Some(program) = self.programs.get(program_handle) else {
            return;
        };

        let mut refresh = false;
        if self.context.current_program != Some(program_handle) {
            self.device.use_program(Some(program.object));
            self.context.current_program = Some(program_handle);
            refresh = true;
        }
        if self.context.current_material != Some(material_handle) {
            self.context.current_material = Some(material_handle);
            refresh = true;
        }
        if self.context.current_camera != Some(camera_handle) {
            self.context.current_camera = Some(camera_handle);
            refresh = true;
        }

        let Some(state) = self.materials.get_mut(material_handle) else {
            return;
        };

        if refresh {
            if material.kind.uses_lights() && self.context.lights_need_update {
                self.lights =
                    LightArrays::aggregate(scene, self.light_budget, self.settings.gamma_input);
                self.context.lights_need_update = false;
            }

            let frame = FrameUniforms {
                fog: scene.fog.as_ref(),
                lights: &self.lights,
                shadows: &self.shadows,
                camera_near: camera.near(),
                camera_far: camera.far(),
                half_height: self.height as f32 * 0.5,
                gamma_input: self.settings.gamma_input,
            };
            refresh_material(&mut state.uniforms, material, textures, &frame, node.receive_shadow);

            let mut binder = TextureBinder::new(
                &mut self.textures,
                textures,
                &mut self.info,
                self.capabilities.max_texture_units,
            );
            upload_uniforms(&mut self.device, program, state.uniforms.iter(), &mut binder);
            if material.is_shader() {
                let missing =
                    upload_uniforms(&mut self.device, program, material.uniforms.iter(), &mut binder);
                if !missing.is_empty() && !state.warned_missing {
                    warn!(
                        "Material '{}' sets uniforms its shader does not declare: {}",
                        material.name,
                        missing.join(", ")
                    );
                    state.warned_missing = true;
                }
            }
        }

        let matrices = ObjectMatrices::new(
            node.transform.world_matrix_as_mat4(),
            camera.view_matrix(),
        );
        let camera_position = scene.world_position(camera_handle);
        upload_matrices(&mut self.device, program, camera, camera_position, &matrices);

        if material.skinning
            && let NodeKind::Mesh(Mesh {
                skeleton: Some(skeleton),
                ..
            }) = &node.kind
        {
            skeleton.compute_joint_matrices(
                scene.nodes(),
                node.transform.world_matrix().inverse(),
                &mut self.joints,
            );
            upload_bones(
                &mut self.device,
                program,
                &self.joints,
                state.max_bones(program_handle) as usize,
            );
        }
    }
}

/// Drops one use of `program`, counting it out of memory stats when deleted.
fn release_program(
    programs: &mut ProgramCache,
    device: &mut impl GraphicsDevice,
    info: &mut RenderInfo,
    program: ProgramHandle,
) {
    if programs.release(device, program) {
        info.memory.programs = info.memory.programs.saturating_sub(1);
    }
}

// ============================================================================
// Vertex binding & submission
// ============================================================================

/// Morph target inputs of one draw.
struct MorphBinding<'a> {
    influences: &'a [f32],
    /// Morph target attribute slots in the program.
    targets: usize,
    /// Morph normal slots, when the material morphs normals.
    normals: Option<usize>,
}

fn bind_group(
    device: &mut impl GraphicsDevice,
    state: &mut FrameStateCache,
    program: &Program,
    buffers: &GroupBuffers,
    morph: Option<&MorphBinding<'_>>,
) {
    let mut bindings: SmallVec<[(u32, BufferObject, u32); 16]> = SmallVec::new();
    let mut push = |name: &str, buffer: Option<BufferObject>, components: u32| {
        if let (Some(slot), Some(buffer)) = (program.attribute(name), buffer) {
            bindings.push((slot, buffer, components));
        }
    };

    push("position", Some(buffers.position), 3);
    for custom in &buffers.custom {
        push(&custom.name, Some(custom.buffer), custom.item_size);
    }
    push("color", buffers.color, 3);
    push("normal", buffers.normal, 3);
    push("tangent", buffers.tangent, 4);
    push("uv", buffers.uv, 2);
    push("uv2", buffers.uv2, 2);
    push("skinIndex", buffers.skin_index, 4);
    push("skinWeight", buffers.skin_weight, 4);
    push("lineDistance", buffers.line_distance, 1);

    let mut weights = Vec::new();
    if let Some(morph) = morph {
        let picked = select_morph_targets(morph.influences, morph.targets);
        weights.resize(morph.targets, 0.0);
        for slot in 0..morph.targets {
            let target = picked.get(slot).map(|&(index, weight)| {
                weights[slot] = weight;
                index
            });
            // Unused slots read the base stream with zero weight.
            let position = target
                .and_then(|t| buffers.morph_targets.get(t).copied())
                .unwrap_or(buffers.position);
            push(&format!("morphTarget{slot}"), Some(position), 3);

            if let Some(normal_slots) = morph.normals
                && slot < normal_slots
            {
                let normal = target
                    .and_then(|t| buffers.morph_normals.get(t).copied())
                    .or(buffers.normal);
                push(&format!("morphNormal{slot}"), normal, 3);
            }
        }
    }

    let slots: SmallVec<[u32; 16]> = bindings.iter().map(|&(slot, _, _)| slot).collect();
    state.set_enabled_attributes(device, &slots);
    for (slot, buffer, components) in bindings {
        device.bind_buffer(BufferTarget::Array, Some(buffer));
        device.vertex_attrib_pointer(slot, components, 0, 0);
    }

    if morph.is_some()
        && let Some(location) = program.uniform("morphTargetInfluences")
    {
        device.set_uniform(location, UniformData::Float1(&weights));
    }
}

fn submit(
    device: &mut impl GraphicsDevice,
    state: &mut FrameStateCache,
    info: &mut RenderInfo,
    kind: RenderableKind,
    material: &Material,
    group: &GeometryGroup,
    buffers: &GroupBuffers,
    wireframe: bool,
) {
    match kind {
        RenderableKind::Mesh if wireframe => {
            if buffers.line_index_count == 0 {
                return;
            }
            state.set_line_width(device, material.wireframe_linewidth);
            device.draw_elements(DrawMode::Lines, buffers.line_index_count, 0);
            info.render.calls += 1;
        }
        RenderableKind::Mesh => {
            if buffers.face_index_count == 0 {
                return;
            }
            device.draw_elements(DrawMode::Triangles, buffers.face_index_count, 0);
            info.render.calls += 1;
            info.render.vertices += buffers.face_index_count;
            info.render.faces += buffers.face_index_count / 3;
        }
        RenderableKind::Line(mode) => {
            let mode = match mode {
                LineMode::Strip => DrawMode::LineStrip,
                LineMode::Pieces => DrawMode::Lines,
            };
            state.set_line_width(device, material.linewidth);
            device.draw_arrays(mode, 0, group.vertex_count);
            info.render.calls += 1;
        }
        RenderableKind::ParticleSystem { .. } => {
            device.draw_arrays(DrawMode::Points, 0, group.vertex_count);
            info.render.calls += 1;
            info.render.points += group.vertex_count;
        }
        RenderableKind::Sprite | RenderableKind::LensFlare => {}
    }
}
