//! Shader library seam
//!
//! The renderer does not ship shader bodies. Built-in material kinds look up
//! their sources and default uniforms by symbolic id (`"basic"`, `"lambert"`,
//! `"phong"`, `"depth"`, `"normal"`, `"dashed"`, `"particle_basic"`).

use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::resources::Uniforms;

/// Sources and default uniform values of one built-in shader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
    /// Default values, copied into the per-material uniform set.
    pub uniforms: Uniforms,
}

impl ShaderSource {
    #[must_use]
    pub fn new(vertex: &str, fragment: &str, uniforms: Uniforms) -> Self {
        Self {
            vertex: vertex.to_string(),
            fragment: fragment.to_string(),
            uniforms,
        }
    }
}

/// Maps symbolic shader ids to sources.
pub trait ShaderLibrary {
    fn source(&self, id: &str) -> Option<&ShaderSource>;
}

impl<S: BuildHasher> ShaderLibrary for HashMap<String, ShaderSource, S> {
    fn source(&self, id: &str) -> Option<&ShaderSource> {
        self.get(id)
    }
}
