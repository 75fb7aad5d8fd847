//! Scene graph
//!
//! Hierarchy and per-object data:
//! - Node: a scene node (hierarchy links, transform, payload, flags)
//! - Transform: position, rotation, scale with cached matrices
//! - Scene: the node container with add/remove tracking
//! - Camera, Light, Skeleton: node payloads
//! - transform_system: world matrix propagation

pub mod camera;
pub mod light;
pub mod node;
pub mod scene;
pub mod skeleton;
pub mod transform;
pub mod transform_system;

pub use camera::{Camera, Frustum, Projection};
pub use light::{
    DirectionalLight, HemisphereLight, Light, LightKind, PointLight, ShadowData, SpotLight,
};
pub use node::{
    LensFlare, LensFlareElement, Line, LineMode, MaterialBinding, Mesh, Node, NodeKind,
    ParticleSystem, RenderableKind, Sprite,
};
pub use scene::{Fog, PendingChanges, Scene};
pub use skeleton::Skeleton;
pub use transform::Transform;

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a [`Node`] owned by a [`Scene`].
    pub struct NodeHandle;
}
