//! Program Cache
//!
//! Reference-counted store of linked programs keyed by a 64-bit code:
//!
//! ```text
//! code = xxh3(shader id | sources) ^ rotl(hash(defines), 21) ^ rotl(xxh3(parameters), 42)
//! ```
//!
//! [`ProgramCache::resolve`] returns the existing program for a known code
//! (incrementing its usage) or compiles, links and introspects a new one.
//! [`ProgramCache::release`] decrements usage and deletes the device program
//! at zero.

use std::hash::Hash;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, error};
use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use xxhash_rust::xxh3::{Xxh3, xxh3_64};

use crate::errors::{RenderError, Result};
use crate::renderer::device::{
    GraphicsDevice, ProgramObject, ShaderObject, ShaderStage, UniformLocation,
};
use crate::renderer::program::parameters::ProgramParameters;
use crate::renderer::program::source::{assemble, numbered_lines};
use crate::resources::ShaderDefines;

static NEXT_PROGRAM_ID: AtomicU32 = AtomicU32::new(1);

new_key_type! {
    /// Handle to a program owned by a [`ProgramCache`].
    pub struct ProgramHandle;
}

/// A linked program and its introspected locations.
#[derive(Debug)]
pub struct Program {
    /// Process-unique id.
    pub id: u32,
    pub code: u64,
    pub object: ProgramObject,
    pub uniforms: FxHashMap<String, UniformLocation>,
    /// Attribute name → vertex attribute slot.
    pub attributes: FxHashMap<String, u32>,
    pub usage: u32,
}

impl Program {
    #[inline]
    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    #[inline]
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }
}

/// What to build. `shader_id` is the library id for built-in materials and
/// `None` for materials with their own sources.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDescriptor<'a> {
    pub shader_id: Option<&'a str>,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub defines: &'a ShaderDefines,
    pub parameters: &'a ProgramParameters,
}

impl ProgramDescriptor<'_> {
    /// The cache key of this descriptor.
    #[must_use]
    pub fn code(&self) -> u64 {
        let source_hash = match self.shader_id {
            Some(id) => xxh3_64(id.as_bytes()),
            None => xxh3_64(self.vertex_source.as_bytes())
                ^ xxh3_64(self.fragment_source.as_bytes()).rotate_left(1),
        };

        let mut hasher = Xxh3::new();
        self.parameters.hash(&mut hasher);
        let parameters_hash = hasher.digest();

        source_hash ^ self.defines.compute_hash().rotate_left(21) ^ parameters_hash.rotate_left(42)
    }
}

#[derive(Default)]
pub struct ProgramCache {
    programs: SlotMap<ProgramHandle, Program>,
    lookup: FxHashMap<u64, ProgramHandle>,
}

impl ProgramCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live programs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, handle: ProgramHandle) -> Option<&Program> {
        self.programs.get(handle)
    }

    /// Returns a program for `descriptor`, building it on a cache miss.
    ///
    /// Build failures are logged (with numbered sources for compile errors)
    /// and yield `None`.
    pub fn resolve(
        &mut self,
        device: &mut impl GraphicsDevice,
        descriptor: &ProgramDescriptor<'_>,
    ) -> Option<ProgramHandle> {
        let code = descriptor.code();

        if let Some(&handle) = self.lookup.get(&code)
            && let Some(program) = self.programs.get_mut(handle)
        {
            program.usage += 1;
            return Some(handle);
        }

        match build_program(device, descriptor, code) {
            Ok(program) => {
                debug!(
                    "Built program {} for {}",
                    program.id,
                    descriptor.shader_id.unwrap_or("shader material")
                );
                let handle = self.programs.insert(program);
                self.lookup.insert(code, handle);
                Some(handle)
            }
            Err(err) => {
                error!("{err}");
                None
            }
        }
    }

    /// Drops one use of `handle`. Returns `true` if the program was deleted.
    pub fn release(&mut self, device: &mut impl GraphicsDevice, handle: ProgramHandle) -> bool {
        let Some(program) = self.programs.get_mut(handle) else {
            return false;
        };
        program.usage = program.usage.saturating_sub(1);
        if program.usage > 0 {
            return false;
        }

        if let Some(program) = self.programs.remove(handle) {
            self.lookup.remove(&program.code);
            device.delete_program(program.object);
        }
        true
    }
}

fn compile_stage(
    device: &mut impl GraphicsDevice,
    stage: ShaderStage,
    source: &str,
) -> Result<ShaderObject> {
    let shader = device.create_shader(stage)?;
    device.shader_source(shader, source);
    if device.compile_shader(shader) {
        return Ok(shader);
    }

    let log = device.shader_info_log(shader);
    device.delete_shader(shader);
    error!("{stage:?} shader failed to compile:\n{}", numbered_lines(source));
    Err(RenderError::ShaderCompile { stage, log })
}

fn build_program(
    device: &mut impl GraphicsDevice,
    descriptor: &ProgramDescriptor<'_>,
    code: u64,
) -> Result<Program> {
    let sources = assemble(
        descriptor.parameters,
        descriptor.defines,
        descriptor.vertex_source,
        descriptor.fragment_source,
    )?;

    let vertex = compile_stage(device, ShaderStage::Vertex, &sources.vertex)?;
    let fragment = match compile_stage(device, ShaderStage::Fragment, &sources.fragment) {
        Ok(fragment) => fragment,
        Err(err) => {
            device.delete_shader(vertex);
            return Err(err);
        }
    };

    let object = device.create_program()?;
    device.attach_shader(object, vertex);
    device.attach_shader(object, fragment);
    let linked = device.link_program(object);

    // Attached shaders are freed together with the program.
    device.delete_shader(vertex);
    device.delete_shader(fragment);

    if !linked {
        let log = device.program_info_log(object);
        device.delete_program(object);
        return Err(RenderError::ProgramLink(log));
    }

    let uniforms = device
        .active_uniforms(object)
        .into_iter()
        .filter_map(|name| {
            let location = device.uniform_location(object, &name)?;
            Some((name, location))
        })
        .collect();
    let attributes = device
        .active_attributes(object)
        .into_iter()
        .filter_map(|name| {
            let slot = device.attribute_location(object, &name)?;
            Some((name, slot))
        })
        .collect();

    Ok(Program {
        id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
        code,
        object,
        uniforms,
        attributes,
        usage: 1,
    })
}
