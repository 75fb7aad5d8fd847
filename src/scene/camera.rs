use glam::{Affine3A, Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// `fov` is the vertical field of view in degrees.
    Perspective {
        fov: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    },
}

/// Camera payload of a node. The view matrix is the inverse of the node's
/// world matrix and is refreshed by the renderer every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub projection: Projection,

    pub(crate) projection_matrix: Mat4,
    pub(crate) view_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
    pub(crate) frustum: Frustum,
}

impl Camera {
    #[must_use]
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::from_projection(Projection::Perspective {
            fov,
            aspect,
            near,
            far,
        })
    }

    #[must_use]
    pub fn orthographic(left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) -> Self {
        Self::from_projection(Projection::Orthographic {
            left,
            right,
            top,
            bottom,
            near,
            far,
        })
    }

    fn from_projection(projection: Projection) -> Self {
        let mut cam = Self {
            projection,
            projection_matrix: Mat4::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
            frustum: Frustum::default(),
        };
        cam.update_projection_matrix();
        cam
    }

    /// Rebuilds the projection matrix. Call after editing `projection`.
    pub fn update_projection_matrix(&mut self) {
        // GL clip space, depth in [-1, 1].
        self.projection_matrix = match self.projection {
            Projection::Perspective {
                fov,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov.to_radians(), aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        };

        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    /// Sets the aspect ratio of a perspective camera.
    pub fn set_aspect(&mut self, new_aspect: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = new_aspect;
            self.update_projection_matrix();
        }
    }

    pub(crate) fn update_view(&mut self, world_transform: &Affine3A) {
        self.view_matrix = Mat4::from(*world_transform).inverse();
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        match self.projection {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => near,
        }
    }

    #[must_use]
    pub fn far(&self) -> f32 {
        match self.projection {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => far,
        }
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann plane extraction for a GL-style clip matrix.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[3] + rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = Vec3::new(plane.x, plane.y, plane.z).length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.x * center.x + p.y * center.y + p.z * center.z + p.w >= -radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_sees_points_down_negative_z() {
        let camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        let frustum = camera.frustum();

        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 0.5));
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 0.5));
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, -200.0), 0.5));
    }

    #[test]
    fn view_follows_world_transform() {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        camera.update_view(&Affine3A::from_translation(Vec3::new(0.0, 0.0, 10.0)));

        assert!(camera.frustum().intersects_sphere(Vec3::ZERO, 0.5));
        let in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((in_view.z + 10.0).abs() < 1e-5);
    }
}
