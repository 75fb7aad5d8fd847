use glam::{Affine3A, Vec2, Vec3};

use crate::assets::{GeometryHandle, MaterialHandle, TextureHandle};
use crate::resources::Blending;
use crate::scene::camera::Camera;
use crate::scene::light::Light;
use crate::scene::skeleton::Skeleton;
use crate::scene::transform::Transform;
use crate::scene::NodeHandle;

// ============================================================================
// Renderable payloads
// ============================================================================

/// Material assignment of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialBinding {
    /// One material for every face.
    Single(MaterialHandle),
    /// One material per face, selected by `Face3::material_index`.
    PerFace(Vec<MaterialHandle>),
}

impl MaterialBinding {
    /// Effective material for a group with the given material index.
    #[must_use]
    pub fn resolve(&self, material_index: u32) -> Option<MaterialHandle> {
        match self {
            MaterialBinding::Single(handle) => Some(*handle),
            MaterialBinding::PerFace(list) => list.get(material_index as usize).copied(),
        }
    }

    #[must_use]
    pub fn is_per_face(&self) -> bool {
        matches!(self, MaterialBinding::PerFace(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub geometry: GeometryHandle,
    pub material: MaterialBinding,
    /// One weight per morph target of the geometry.
    pub morph_target_influences: Vec<f32>,
    pub skeleton: Option<Skeleton>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineMode {
    /// Consecutive vertices are connected.
    #[default]
    Strip,
    /// Each vertex pair is a separate segment.
    Pieces,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub mode: LineMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSystem {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    /// Re-sort vertices back to front every frame.
    pub sort_particles: bool,
}

/// A screen-aligned quad, drawn by a sprite plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    pub texture: Option<TextureHandle>,
    pub color: Vec3,
    pub opacity: f32,
    pub rotation: f32,
    pub scale: Vec2,
    pub blending: Blending,
    pub use_screen_coordinates: bool,
    pub align: Vec2,
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            texture: None,
            color: Vec3::ONE,
            opacity: 1.0,
            rotation: 0.0,
            scale: Vec2::ONE,
            blending: Blending::Normal,
            use_screen_coordinates: false,
            align: Vec2::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LensFlareElement {
    pub texture: TextureHandle,
    pub size: f32,
    /// 0 at the light source, 1 at the screen center mirror point.
    pub distance: f32,
    pub opacity: f32,
    pub color: Vec3,
    pub blending: Blending,
}

/// Flare sprites anchored to a world position, drawn by a lens flare plugin.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LensFlare {
    pub elements: Vec<LensFlareElement>,
    /// Projected source position, written by the plugin.
    pub position_screen: Vec3,
}

// ============================================================================
// Node kinds
// ============================================================================

/// Closed set of node payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Line(Line),
    ParticleSystem(ParticleSystem),
    Sprite(Sprite),
    LensFlare(LensFlare),
    Camera(Camera),
    Light(Light),
}

/// Which draw path a renderable node takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderableKind {
    Mesh,
    Line(LineMode),
    ParticleSystem { sort: bool },
    Sprite,
    LensFlare,
}

impl RenderableKind {
    /// Meshes, lines and particle systems are drawn by the core renderer;
    /// sprites and lens flares are left to plugins.
    #[must_use]
    pub fn is_core_drawable(self) -> bool {
        matches!(
            self,
            RenderableKind::Mesh | RenderableKind::Line(_) | RenderableKind::ParticleSystem { .. }
        )
    }
}

impl NodeKind {
    /// Convenience constructor for a single-material mesh.
    #[must_use]
    pub fn mesh(geometry: GeometryHandle, material: MaterialHandle) -> Self {
        NodeKind::Mesh(Mesh {
            geometry,
            material: MaterialBinding::Single(material),
            morph_target_influences: Vec::new(),
            skeleton: None,
        })
    }

    #[must_use]
    pub fn line(geometry: GeometryHandle, material: MaterialHandle, mode: LineMode) -> Self {
        NodeKind::Line(Line {
            geometry,
            material,
            mode,
        })
    }

    #[must_use]
    pub fn particles(geometry: GeometryHandle, material: MaterialHandle, sort_particles: bool) -> Self {
        NodeKind::ParticleSystem(ParticleSystem {
            geometry,
            material,
            sort_particles,
        })
    }

    #[must_use]
    pub fn renderable(&self) -> Option<RenderableKind> {
        match self {
            NodeKind::Mesh(_) => Some(RenderableKind::Mesh),
            NodeKind::Line(line) => Some(RenderableKind::Line(line.mode)),
            NodeKind::ParticleSystem(ps) => Some(RenderableKind::ParticleSystem {
                sort: ps.sort_particles,
            }),
            NodeKind::Sprite(_) => Some(RenderableKind::Sprite),
            NodeKind::LensFlare(_) => Some(RenderableKind::LensFlare),
            NodeKind::Group | NodeKind::Camera(_) | NodeKind::Light(_) => None,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> Option<GeometryHandle> {
        match self {
            NodeKind::Mesh(mesh) => Some(mesh.geometry),
            NodeKind::Line(line) => Some(line.geometry),
            NodeKind::ParticleSystem(ps) => Some(ps.geometry),
            _ => None,
        }
    }

    /// Effective material for a geometry group.
    #[must_use]
    pub fn material_for_group(&self, material_index: u32) -> Option<MaterialHandle> {
        match self {
            NodeKind::Mesh(mesh) => mesh.material.resolve(material_index),
            NodeKind::Line(line) => Some(line.material),
            NodeKind::ParticleSystem(ps) => Some(ps.material),
            _ => None,
        }
    }

    /// Whether faces are split into groups by their material index.
    #[must_use]
    pub fn uses_face_materials(&self) -> bool {
        matches!(self, NodeKind::Mesh(mesh) if mesh.material.is_per_face())
    }
}

// ============================================================================
// Node
// ============================================================================

/// A scene node: hierarchy links, transform, payload and per-object flags.
///
/// # Hierarchy
///
/// - `parent`: handle of the parent node (`None` for detached nodes and the scene root)
/// - `children`: ordered, duplicate-free child handles
///
/// Links are maintained by [`Scene::add`](crate::scene::Scene::add) and
/// [`Scene::remove`](crate::scene::Scene::remove).
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub transform: Transform,
    pub kind: NodeKind,

    pub visible: bool,
    /// When `false`, the node is drawn even if its bounds are off screen.
    pub frustum_culled: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    /// Replaces the computed camera-space depth when sorting.
    pub render_depth: Option<f32>,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            name: String::new(),
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            kind,
            visible: true,
            frustum_culled: true,
            cast_shadow: false,
            receive_shadow: false,
            render_depth: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// World transformation, updated by the transform system each frame.
    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.transform.world_matrix
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new(NodeKind::Group)
    }
}
