//! Asset Storage
//!
//! Geometries, materials and textures are shared between scene nodes by
//! handle. [`Assets`] owns the CPU-side data; GPU-side state lives in the
//! renderer and is keyed by the same handles.

pub mod storage;

use slotmap::new_key_type;

use crate::resources::{Geometry, Material, Texture};

pub use storage::AssetStorage;

new_key_type! {
    /// Handle to a [`Geometry`] stored in [`Assets`].
    pub struct GeometryHandle;
    /// Handle to a [`Material`] stored in [`Assets`].
    pub struct MaterialHandle;
    /// Handle to a [`Texture`] stored in [`Assets`].
    pub struct TextureHandle;
}

/// CPU-side asset tables.
#[derive(Default)]
pub struct Assets {
    pub geometries: AssetStorage<GeometryHandle, Geometry>,
    pub materials: AssetStorage<MaterialHandle, Material>,
    pub textures: AssetStorage<TextureHandle, Texture>,
}

impl Assets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: impl Into<Geometry>) -> GeometryHandle {
        self.geometries.add(geometry)
    }

    pub fn add_material(&mut self, material: impl Into<Material>) -> MaterialHandle {
        self.materials.add(material)
    }

    pub fn add_texture(&mut self, texture: impl Into<Texture>) -> TextureHandle {
        self.textures.add(texture)
    }

    #[inline]
    #[must_use]
    pub fn geometry(&self, handle: GeometryHandle) -> Option<&Geometry> {
        self.geometries.get(handle)
    }

    #[inline]
    pub fn geometry_mut(&mut self, handle: GeometryHandle) -> Option<&mut Geometry> {
        self.geometries.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    #[inline]
    pub fn material_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle)
    }

    #[inline]
    #[must_use]
    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    #[inline]
    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Texture> {
        self.textures.get_mut(handle)
    }
}
