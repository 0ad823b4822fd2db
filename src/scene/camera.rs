use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};

use crate::gpu::Rect;

use super::frustum::Frustum;

static NEXT_CAMERA_ID: AtomicU64 = AtomicU64::new(1);

/// Perspective camera. Setters bump `version` so programs re-upload view
/// uniforms only after a change.
#[derive(Clone, Debug)]
pub struct Camera {
    id: u64,
    version: u64,
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y_radians: f32,
    near: f32,
    far: f32,
    viewport: Option<Rect>,
}

impl Camera {
    pub fn new(eye: Vec3, target: Vec3) -> Self {
        Self {
            id: NEXT_CAMERA_ID.fetch_add(1, Ordering::Relaxed),
            version: 0,
            eye,
            target,
            up: Vec3::Y,
            fov_y_radians: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
            viewport: None,
        }
    }

    pub fn with_perspective(mut self, fov_y_radians: f32, near: f32, far: f32) -> Self {
        self.set_perspective(fov_y_radians, near, far);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn position(&self) -> Vec3 {
        self.eye
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// `None` covers the whole render target.
    pub fn viewport(&self) -> Option<Rect> {
        self.viewport
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        self.eye = eye;
        self.target = target;
        self.version += 1;
    }

    pub fn set_perspective(&mut self, fov_y_radians: f32, near: f32, far: f32) {
        self.fov_y_radians = fov_y_radians;
        self.near = near;
        self.far = far;
        self.version += 1;
    }

    pub fn set_viewport(&mut self, viewport: Option<Rect>) {
        self.viewport = viewport;
        self.version += 1;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn proj(&self, aspect: f32) -> Mat4 {
        self.proj_range(aspect, self.near, self.far)
    }

    pub fn proj_range(&self, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_radians, aspect, near, far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.proj(aspect) * self.view()
    }

    pub fn frustum(&self, aspect: f32) -> Frustum {
        Frustum::from_view_proj(&self.view_proj(aspect))
    }

    /// World-space corners of the frustum slice between `near` and `far`.
    pub fn frustum_corners(&self, aspect: f32, near: f32, far: f32) -> [Vec3; 8] {
        let inverse = (self.proj_range(aspect, near, far) * self.view()).inverse();
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let ndc = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            *corner = inverse.project_point3(ndc);
        }
        corners
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO)
    }
}
