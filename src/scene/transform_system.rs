//! World matrix propagation
//!
//! Works on the node table alone so [`Scene`](crate::scene::Scene) can keep
//! its tracked lists borrowed elsewhere.

use glam::Affine3A;
use slotmap::SlotMap;

use crate::scene::node::Node;
use crate::scene::NodeHandle;

/// Refreshes world matrices below (and including) `start`.
///
/// Parents are visited before their children using an explicit stack. A
/// world matrix is rebuilt when the node's local matrix changed or an
/// ancestor's world matrix was rebuilt in the same pass. If `start` has a
/// parent, that parent's cached world matrix is the base and the whole
/// subtree is rebuilt.
pub fn propagate_world_matrices(nodes: &mut SlotMap<NodeHandle, Node>, start: NodeHandle) {
    let Some(first) = nodes.get(start) else {
        return;
    };
    let base = first
        .parent
        .and_then(|p| nodes.get(p))
        .map(|parent| parent.transform.world_matrix);

    let mut pending: Vec<(NodeHandle, Affine3A, bool)> = Vec::with_capacity(64);
    pending.push((start, base.unwrap_or(Affine3A::IDENTITY), base.is_some()));

    while let Some((handle, parent_world, ancestor_moved)) = pending.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };

        let moved = node.transform.update_local_matrix() || ancestor_moved;
        if moved {
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);
        }

        let world = node.transform.world_matrix;
        // Pushed in reverse so children pop in order.
        pending.extend(node.children.iter().rev().map(|&child| (child, world, moved)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::NodeKind;
    use glam::Vec3;

    fn group_at(position: Vec3) -> Node {
        let mut node = Node::new(NodeKind::Group);
        node.transform.position = position;
        node
    }

    #[test]
    fn children_inherit_parent_translation() {
        let mut nodes: SlotMap<NodeHandle, Node> = SlotMap::with_key();
        let parent = nodes.insert(group_at(Vec3::X));
        let mut child = group_at(Vec3::Y);
        child.parent = Some(parent);
        let child = nodes.insert(child);
        nodes[parent].children.push(child);

        propagate_world_matrices(&mut nodes, parent);

        assert!(nodes[child]
            .transform
            .world_position()
            .abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5));
    }

    #[test]
    fn trs_is_ignored_without_matrix_auto_update() {
        let mut nodes: SlotMap<NodeHandle, Node> = SlotMap::with_key();
        let mut node = group_at(Vec3::new(5.0, 0.0, 0.0));
        node.transform.matrix_auto_update = false;
        let handle = nodes.insert(node);

        propagate_world_matrices(&mut nodes, handle);
        assert_eq!(nodes[handle].transform.world_position(), Vec3::ZERO);

        nodes[handle]
            .transform
            .set_matrix(Affine3A::from_translation(Vec3::new(0.0, 0.0, -2.0)));
        propagate_world_matrices(&mut nodes, handle);
        assert_eq!(nodes[handle].transform.world_position(), Vec3::new(0.0, 0.0, -2.0));
    }
}
