#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! # Myth GL
//!
//! A retained-mode scene renderer core for GL-class devices.
//!
//! A [`Scene`] holds a tree of [`Node`]s (meshes, lines, particle systems,
//! sprites, lens flares, cameras and lights). Geometry, material and texture
//! data live in [`Assets`] and are shared by handle. Each call to
//! [`Renderer::render`] propagates transforms, keeps GPU buffers in sync with
//! dirty CPU data, resolves shader programs through a reference-counted cache,
//! refreshes uniforms, sorts the draw list and issues draw calls through a
//! [`GraphicsDevice`].
//!
//! ```rust,ignore
//! use myth_gl::prelude::*;
//!
//! let mut assets = Assets::new();
//! let mut scene = Scene::new();
//! let geometry = assets.add_geometry(Geometry::new());
//! let material = assets.add_material(Material::basic(Vec3::ONE));
//! scene.add_node(Node::new(NodeKind::mesh(geometry, material)));
//! let camera = scene.add_node(Node::new(NodeKind::Camera(Camera::perspective(45.0, 1.0, 0.1, 100.0))));
//!
//! let mut renderer = Renderer::new(HeadlessDevice::new(), Box::new(library), RendererSettings::default());
//! renderer.render(&mut scene, &mut assets, camera, None, false);
//! ```

pub mod assets;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use assets::{Assets, GeometryHandle, MaterialHandle, TextureHandle};
pub use errors::{RenderError, Result};
pub use renderer::device::{GraphicsDevice, HeadlessDevice};
pub use renderer::settings::RendererSettings;
pub use renderer::Renderer;
pub use resources::{Geometry, Material, ShaderDefines, Texture};
pub use scene::{Camera, Light, Node, NodeHandle, NodeKind, Scene};
pub use utils::interner;

pub mod prelude {
    //! Commonly used types, re-exported for glob import.

    pub use crate::assets::{Assets, GeometryHandle, MaterialHandle, TextureHandle};
    pub use crate::renderer::device::{GraphicsDevice, HeadlessDevice};
    pub use crate::renderer::program::{ShaderLibrary, ShaderSource};
    pub use crate::renderer::settings::RendererSettings;
    pub use crate::renderer::{RenderPlugin, RenderTarget, Renderer};
    pub use crate::resources::{
        Blending, Face3, Geometry, Material, MaterialKind, Side, Texture, UniformValue, Uniforms,
        VertexColors,
    };
    pub use crate::scene::{
        Camera, Fog, Light, LightKind, MaterialBinding, Node, NodeHandle, NodeKind, Scene,
    };
    pub use glam::{Quat, Vec2, Vec3, Vec4};
}
