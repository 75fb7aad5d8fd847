use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use log::warn;
use slotmap::SlotMap;

use crate::assets::MaterialHandle;
use crate::scene::node::{Node, NodeKind, RenderableKind};
use crate::scene::transform_system;
use crate::scene::NodeHandle;

static NEXT_SCENE_ID: AtomicU32 = AtomicU32::new(1);

/// Scene-wide fog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fog {
    Linear { color: Vec3, near: f32, far: f32 },
    Exp2 { color: Vec3, density: f32 },
}

impl Fog {
    #[must_use]
    pub fn color(&self) -> Vec3 {
        match self {
            Fog::Linear { color, .. } | Fog::Exp2 { color, .. } => *color,
        }
    }
}

/// Nodes that entered or left the scene since the last [`Scene::take_pending`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingChanges {
    pub added: Vec<NodeHandle>,
    pub removed: Vec<NodeHandle>,
}

/// Scene graph container.
///
/// Owns every node in a `SlotMap`. Nodes reachable from [`Scene::root`] are
/// "in the scene": lights are tracked in a light list, sprites and lens
/// flares in their own lists, and meshes, lines and particle systems in the
/// object list plus an add/remove queue drained by renderers.
pub struct Scene {
    id: u32,
    nodes: SlotMap<NodeHandle, Node>,
    root: NodeHandle,

    pub fog: Option<Fog>,
    /// Renders every object with this material when set.
    pub override_material: Option<MaterialHandle>,
    /// Update world matrices at the start of every render.
    pub auto_update: bool,

    objects: Vec<NodeHandle>,
    objects_added: Vec<NodeHandle>,
    objects_removed: Vec<NodeHandle>,
    lights: Vec<NodeHandle>,
    sprites: Vec<NodeHandle>,
    lens_flares: Vec<NodeHandle>,
}

#[derive(Clone, Copy)]
enum Category {
    Untracked,
    Light,
    Sprite,
    LensFlare,
    Object,
}

impl Category {
    fn of(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Light(_) => Category::Light,
            NodeKind::Group | NodeKind::Camera(_) => Category::Untracked,
            other => match other.renderable() {
                Some(RenderableKind::Sprite) => Category::Sprite,
                Some(RenderableKind::LensFlare) => Category::LensFlare,
                Some(_) => Category::Object,
                None => Category::Untracked,
            },
        }
    }
}

fn push_unique(list: &mut Vec<NodeHandle>, handle: NodeHandle) {
    if !list.contains(&handle) {
        list.push(handle);
    }
}

fn remove_item(list: &mut Vec<NodeHandle>, handle: NodeHandle) -> bool {
    if let Some(pos) = list.iter().position(|&h| h == handle) {
        list.remove(pos);
        true
    } else {
        false
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeKind::Group).with_name("Scene"));
        Self {
            id: NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed),
            nodes,
            root,
            fog: None,
            override_material: None,
            auto_update: true,
            objects: Vec::new(),
            objects_added: Vec::new(),
            objects_removed: Vec::new(),
            lights: Vec::new(),
            sprites: Vec::new(),
            lens_flares: Vec::new(),
        }
    }

    /// Process-unique scene id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Inserts a detached node. Attach it with [`Scene::add`].
    pub fn create_node(&mut self, node: Node) -> NodeHandle {
        self.nodes.insert(node)
    }

    /// Inserts a node and attaches it to the scene root.
    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.create_node(node);
        self.add(self.root, handle);
        handle
    }

    /// Removes a node from its parent and frees it together with its
    /// descendants.
    pub fn destroy_node(&mut self, handle: NodeHandle) {
        if handle == self.root {
            warn!("Cannot destroy the scene root");
            return;
        }
        let Some(parent) = self.nodes.get(handle).map(|n| n.parent) else {
            return;
        };
        if let Some(parent) = parent {
            self.remove(parent, handle);
        }
        for node in self.collect_subtree(handle) {
            self.nodes.remove(node);
        }
    }

    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    #[inline]
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    #[inline]
    pub(crate) fn nodes(&self) -> &SlotMap<NodeHandle, Node> {
        &self.nodes
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Attaches `child` under `parent`, detaching it from any previous parent.
    ///
    /// When `parent` is reachable from the root, the whole subtree of `child`
    /// is registered with the scene.
    pub fn add(&mut self, parent: NodeHandle, child: NodeHandle) {
        if child == parent {
            warn!("Cannot add a node as a child of itself");
            return;
        }
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            warn!("Scene::add called with a stale node handle");
            return;
        }
        if child == self.root || self.is_ancestor_of(child, parent) {
            warn!("Cannot add a node beneath one of its own descendants");
            return;
        }

        if let Some(old_parent) = self.nodes[child].parent {
            self.remove(old_parent, child);
        }

        self.nodes[parent].children.push(child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.transform.mark_dirty();

        if self.is_attached(parent) {
            self.register_subtree(child);
        }
    }

    /// Detaches `child` from `parent`. Does nothing if `child` is not a child
    /// of `parent`.
    pub fn remove(&mut self, parent: NodeHandle, child: NodeHandle) {
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return;
        };
        let Some(pos) = parent_node.children.iter().position(|&c| c == child) else {
            return;
        };
        parent_node.children.remove(pos);

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }

        if self.is_attached(parent) {
            self.unregister_subtree(child);
        }
    }

    /// Whether `handle` is reachable from the scene root.
    #[must_use]
    pub fn is_attached(&self, handle: NodeHandle) -> bool {
        self.is_ancestor_of(self.root, handle)
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn is_ancestor_of(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = Some(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.nodes.get(handle).and_then(|n| n.parent);
        }
        false
    }

    /// Depth-first, pre-order handles of the subtree rooted at `root`.
    fn collect_subtree(&self, root: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            out.push(handle);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Visits the subtree rooted at `root`, parents before children.
    pub fn traverse(&self, root: NodeHandle, mut visitor: impl FnMut(NodeHandle, &Node)) {
        for handle in self.collect_subtree(root) {
            visitor(handle, &self.nodes[handle]);
        }
    }

    fn register_subtree(&mut self, root: NodeHandle) {
        for handle in self.collect_subtree(root) {
            match Category::of(&self.nodes[handle].kind) {
                Category::Untracked => {}
                Category::Light => push_unique(&mut self.lights, handle),
                Category::Sprite => push_unique(&mut self.sprites, handle),
                Category::LensFlare => push_unique(&mut self.lens_flares, handle),
                Category::Object => {
                    if self.objects.contains(&handle) {
                        continue;
                    }
                    self.objects.push(handle);
                    // A pending removal the renderer has not seen yet is cancelled.
                    if !remove_item(&mut self.objects_removed, handle) {
                        self.objects_added.push(handle);
                    }
                }
            }
        }
    }

    fn unregister_subtree(&mut self, root: NodeHandle) {
        for handle in self.collect_subtree(root) {
            match Category::of(&self.nodes[handle].kind) {
                Category::Untracked => {}
                Category::Light => {
                    remove_item(&mut self.lights, handle);
                }
                Category::Sprite => {
                    remove_item(&mut self.sprites, handle);
                }
                Category::LensFlare => {
                    remove_item(&mut self.lens_flares, handle);
                }
                Category::Object => {
                    if !remove_item(&mut self.objects, handle) {
                        continue;
                    }
                    if !remove_item(&mut self.objects_added, handle) {
                        self.objects_removed.push(handle);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Tracked lists
    // ========================================================================

    /// Drains the add/remove queues.
    pub fn take_pending(&mut self) -> PendingChanges {
        PendingChanges {
            added: std::mem::take(&mut self.objects_added),
            removed: std::mem::take(&mut self.objects_removed),
        }
    }

    #[must_use]
    pub fn pending_added(&self) -> &[NodeHandle] {
        &self.objects_added
    }

    #[must_use]
    pub fn pending_removed(&self) -> &[NodeHandle] {
        &self.objects_removed
    }

    /// Meshes, lines and particle systems currently in the scene.
    #[must_use]
    pub fn objects(&self) -> &[NodeHandle] {
        &self.objects
    }

    #[must_use]
    pub fn lights(&self) -> &[NodeHandle] {
        &self.lights
    }

    #[must_use]
    pub fn sprites(&self) -> &[NodeHandle] {
        &self.sprites
    }

    #[must_use]
    pub fn lens_flares(&self) -> &[NodeHandle] {
        &self.lens_flares
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    /// Recomputes world matrices of the subtree rooted at `root`.
    pub fn update_world_transforms(&mut self, root: NodeHandle) {
        transform_system::propagate_world_matrices(&mut self.nodes, root);
    }

    /// World-space position of a node, or the origin for a missing node.
    #[must_use]
    pub fn world_position(&self, handle: NodeHandle) -> Vec3 {
        self.nodes
            .get(handle)
            .map_or(Vec3::ZERO, |n| n.transform.world_position())
    }
}
