use glam::{Affine3A, Mat3, Mat4, Quat, Vec3};

/// Local placement of a node and its cached matrices.
///
/// The local matrix is rebuilt from position / rotation / scale only when one
/// of them changed since the previous frame, so static subtrees cost a
/// comparison per node.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    /// When `false`, the local matrix keeps whatever was passed to
    /// [`Transform::set_matrix`] and edits to position / rotation / scale are
    /// ignored.
    pub matrix_auto_update: bool,

    pub(crate) local_matrix: Affine3A,
    pub(crate) world_matrix: Affine3A,

    /// Position, rotation and scale the local matrix was last built from.
    built_from: Option<(Vec3, Quat, Vec3)>,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix_auto_update: true,
            local_matrix: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,
            built_from: None,
        }
    }

    /// Rebuilds the local matrix if needed. Returns whether it changed.
    pub fn update_local_matrix(&mut self) -> bool {
        let current = (self.position, self.rotation, self.scale);
        if !self.matrix_auto_update {
            // A pending `set_matrix` / `mark_dirty` still counts as a change.
            let pending = self.built_from.is_none();
            self.built_from = Some(current);
            return pending;
        }
        if self.built_from == Some(current) {
            return false;
        }

        self.local_matrix =
            Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position);
        self.built_from = Some(current);
        true
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    /// The world matrix in the column-major layout matrix uniforms use.
    #[inline]
    #[must_use]
    pub fn world_matrix_as_mat4(&self) -> Mat4 {
        Mat4::from(self.world_matrix)
    }

    #[inline]
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        Vec3::from(self.world_matrix.translation)
    }

    pub(crate) fn set_world_matrix(&mut self, matrix: Affine3A) {
        self.world_matrix = matrix;
    }

    /// Replaces the local matrix. Only sticks with `matrix_auto_update` off.
    pub fn set_matrix(&mut self, matrix: Affine3A) {
        self.local_matrix = matrix;
        self.mark_dirty();
    }

    /// Turns the node so its -Z axis faces `target` (in parent space).
    ///
    /// Does nothing when `target` lies along `up` from the node.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        let side = forward.cross(up);
        if side.length_squared() < 1e-8 {
            return;
        }
        let right = side.normalize();
        let true_up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward));
    }

    /// Makes the next transform update recompute this node's matrices.
    pub fn mark_dirty(&mut self) {
        self.built_from = None;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
