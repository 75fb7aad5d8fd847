//! Draw List
//!
//! Tracks the renderable entries of every scene the renderer has seen and
//! turns them into per-frame opaque and transparent lists.
//!
//! # Per frame
//!
//! 1. Skip invisible nodes and nodes whose world bounding sphere misses the
//!    camera frustum (unless `frustum_culled` is off).
//! 2. Take camera-space z from `render_depth` or the node's world position.
//! 3. Resolve the group's material and bucket by `transparent`.
//! 4. Stable sort: opaque nearest first (z descending), transparent farthest
//!    first (z ascending).

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::assets::{Assets, GeometryHandle, MaterialHandle};
use crate::scene::{Camera, NodeHandle, RenderableKind, Scene};

/// One drawable group of a tracked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderEntry {
    pub node: NodeHandle,
    pub geometry: GeometryHandle,
    /// Index into the geometry's groups.
    pub group: usize,
    /// Face material index of the group.
    pub material_index: u32,
    pub kind: RenderableKind,
}

/// A culled, bucketed entry ready for submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub entry: RenderEntry,
    /// The node's own material for this group.
    pub material: MaterialHandle,
    /// Camera-space z. The camera looks down -z, so nearer is larger.
    pub z: f32,
}

#[derive(Debug, Default, Clone)]
pub struct DrawLists {
    pub opaque: Vec<DrawItem>,
    pub transparent: Vec<DrawItem>,
}

impl DrawLists {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Opaque nearest first, transparent farthest first. Equal depths keep
    /// insertion order.
    pub fn sort(&mut self) {
        self.opaque.sort_by(|a, b| b.z.total_cmp(&a.z));
        self.transparent.sort_by(|a, b| a.z.total_cmp(&b.z));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}

/// Tracked entries of one scene.
#[derive(Default)]
struct SceneEntries {
    /// Scene order. May still hold entries of nodes no longer tracked.
    entries: Vec<RenderEntry>,
    tracked: FxHashSet<NodeHandle>,
    /// Set when `entries` holds untracked nodes.
    stale: bool,
    /// Nodes to try tracking again next frame.
    deferred: Vec<NodeHandle>,
}

impl SceneEntries {
    fn compact(&mut self) {
        if std::mem::take(&mut self.stale) {
            let tracked = &self.tracked;
            self.entries.retain(|e| tracked.contains(&e.node));
        }
    }
}

#[derive(Default)]
pub struct DrawListBuilder {
    scenes: FxHashMap<u32, SceneEntries>,
    lists: DrawLists,
}

impl DrawListBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one entry per group, given the groups' material indices.
    /// Nodes already tracked in the scene are left as they are.
    pub fn add_object(
        &mut self,
        scene_id: u32,
        node: NodeHandle,
        geometry: GeometryHandle,
        material_indices: impl IntoIterator<Item = u32>,
        kind: RenderableKind,
    ) {
        let scene = self.scenes.entry(scene_id).or_default();
        // Old entries of a re-added node must go before it is tracked again.
        scene.compact();
        if !scene.tracked.insert(node) {
            return;
        }
        scene.entries.extend(
            material_indices
                .into_iter()
                .enumerate()
                .map(|(group, material_index)| RenderEntry {
                    node,
                    geometry,
                    group,
                    material_index,
                    kind,
                }),
        );
    }

    /// Stops drawing `node`. Its entries are dropped at the next build.
    pub fn remove_object(&mut self, scene_id: u32, node: NodeHandle) {
        if let Some(scene) = self.scenes.get_mut(&scene_id)
            && scene.tracked.remove(&node)
        {
            scene.stale = true;
        }
    }

    /// Untracks every node drawing `geometry` and defers it, so nodes still
    /// in their scene are uploaded again on the next frame.
    pub fn remove_geometry(&mut self, geometry: GeometryHandle) {
        for scene in self.scenes.values_mut() {
            scene.compact();
            let mut removed = false;
            for entry in scene.entries.iter().filter(|e| e.geometry == geometry) {
                if scene.tracked.remove(&entry.node) {
                    scene.deferred.push(entry.node);
                    removed = true;
                }
            }
            scene.stale |= removed;
        }
    }

    /// Queues `node` to be tracked again on the next frame.
    pub fn defer(&mut self, scene_id: u32, node: NodeHandle) {
        let scene = self.scenes.entry(scene_id).or_default();
        if !scene.deferred.contains(&node) {
            scene.deferred.push(node);
        }
    }

    /// Takes the nodes deferred in `scene_id`.
    pub fn take_deferred(&mut self, scene_id: u32) -> Vec<NodeHandle> {
        self.scenes
            .get_mut(&scene_id)
            .map(|scene| std::mem::take(&mut scene.deferred))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_tracked(&self, scene_id: u32, node: NodeHandle) -> bool {
        self.scenes
            .get(&scene_id)
            .is_some_and(|scene| scene.tracked.contains(&node))
    }

    /// The lists produced by the last [`build`](Self::build).
    #[must_use]
    pub fn lists(&self) -> &DrawLists {
        &self.lists
    }

    pub(crate) fn take_lists(&mut self) -> DrawLists {
        std::mem::take(&mut self.lists)
    }

    pub(crate) fn restore_lists(&mut self, lists: DrawLists) {
        self.lists = lists;
    }

    /// Culls, buckets and (optionally) sorts the scene's entries.
    pub fn build(&mut self, scene: &Scene, assets: &Assets, camera: &Camera, sort: bool) -> &DrawLists {
        self.lists.clear();
        let Some(tracked) = self.scenes.get_mut(&scene.id()) else {
            return &self.lists;
        };
        tracked.compact();
        let entries = &tracked.entries;

        let view = camera.view_matrix();
        let frustum = camera.frustum();

        for entry in entries {
            let Some(node) = scene.node(entry.node) else {
                continue;
            };
            if !node.visible {
                continue;
            }

            let world = node.world_matrix();
            if node.frustum_culled
                && let Some(sphere) = assets.geometry(entry.geometry).and_then(|g| g.bounding_sphere())
            {
                let sphere = sphere.transform(world);
                if !frustum.intersects_sphere(sphere.center, sphere.radius) {
                    continue;
                }
            }

            let z = node
                .render_depth
                .unwrap_or_else(|| view.transform_point3(world.translation.into()).z);

            let Some(group_material) = node.kind.material_for_group(entry.material_index) else {
                debug!("Node '{}' group {} has no material", node.name, entry.group);
                continue;
            };
            let Some(material) = assets.material(group_material) else {
                continue;
            };
            if !material.visible {
                continue;
            }

            let item = DrawItem {
                entry: *entry,
                material: group_material,
                z,
            };
            if material.transparent {
                self.lists.transparent.push(item);
            } else {
                self.lists.opaque.push(item);
            }
        }

        if sort {
            self.lists.sort();
        }
        &self.lists
    }
}
