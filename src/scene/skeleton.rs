use glam::{Affine3A, Mat4};
use slotmap::SlotMap;

use crate::scene::{Node, NodeHandle};

/// Bones driving a skinned mesh.
///
/// `bones[i]` corresponds to joint index `i` in the vertex skin indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<NodeHandle>,
    /// Inverse bind matrices, transforming mesh space into each bone's space.
    pub inverse_bind_matrices: Vec<Affine3A>,
}

impl Skeleton {
    #[must_use]
    pub fn new(bones: Vec<NodeHandle>, inverse_bind_matrices: Vec<Affine3A>) -> Self {
        Self {
            bones,
            inverse_bind_matrices,
        }
    }

    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Computes joint matrices for the current pose into `out`.
    ///
    /// `root_matrix_inv` is the inverse world matrix of the skinned mesh, so
    /// joints end up in mesh space. Missing bones yield identity.
    pub fn compute_joint_matrices(
        &self,
        nodes: &SlotMap<NodeHandle, Node>,
        root_matrix_inv: Affine3A,
        out: &mut Vec<Mat4>,
    ) {
        out.clear();
        for (i, &bone_handle) in self.bones.iter().enumerate() {
            let Some(bone_node) = nodes.get(bone_handle) else {
                out.push(Mat4::IDENTITY);
                continue;
            };
            let ibm = self
                .inverse_bind_matrices
                .get(i)
                .copied()
                .unwrap_or(Affine3A::IDENTITY);
            out.push((root_matrix_inv * bone_node.transform.world_matrix * ibm).into());
        }
    }
}
