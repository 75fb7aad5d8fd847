//! Material Uniform Values
//!
//! A [`Uniforms`] set maps uniform names to typed [`UniformValue`]s. Built-in
//! materials get theirs from the shader library and have them refreshed from
//! material parameters; [`MaterialKind::Shader`] materials carry a user-owned
//! set that is uploaded as-is.
//!
//! [`MaterialKind::Shader`]: crate::resources::MaterialKind::Shader

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::assets::TextureHandle;

/// A typed uniform value.
///
/// Array variants holding `f32` are flat: `Vec3Array` stores three floats per
/// element.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    /// RGB color, uploaded as `vec3`.
    Color(Vec3),
    Mat3(Mat3),
    Mat4(Mat4),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Vec2Array(Vec<f32>),
    Vec3Array(Vec<f32>),
    Vec4Array(Vec<f32>),
    Mat4Array(Vec<Mat4>),
    /// A sampler. `None` binds nothing to the allocated unit.
    Texture(Option<TextureHandle>),
    /// An array of samplers, one unit per element.
    TextureArray(Vec<Option<TextureHandle>>),
}

/// Insertion-ordered uniform set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Uniforms {
    entries: Vec<(String, UniformValue)>,
}

impl Uniforms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: UniformValue) -> Self {
        self.set(name, value);
        self
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, name: &str, value: UniformValue) {
        if let Some(slot) = self.get_mut(name) {
            *slot = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut UniformValue> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<UniformValue> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, UniformValue)> for Uniforms {
    fn from_iter<T: IntoIterator<Item = (String, UniformValue)>>(iter: T) -> Self {
        let mut uniforms = Uniforms::new();
        for (name, value) in iter {
            uniforms.set(&name, value);
        }
        uniforms
    }
}
