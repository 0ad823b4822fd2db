// scene/frustum.rs
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

/// Six inward-facing planes (xyz normal, w distance) extracted from a
/// GL-convention view-projection matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_proj(view_proj: &Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(point) + plane.w >= 0.0)
    }

    /// Conservative: may accept boxes just outside a corner.
    pub fn intersects_aabb(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.xyz();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), max, min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let length = plane.xyz().length();
    if length > f32::EPSILON {
        plane / length
    } else {
        plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frustum() -> Frustum {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(60f32.to_radians(), 1.0, 0.1, 100.0);
        Frustum::from_view_proj(&(proj * view))
    }

    #[test]
    fn origin_is_inside() {
        assert!(frustum().contains_point(Vec3::ZERO));
    }

    #[test]
    fn point_behind_camera_is_outside() {
        assert!(!frustum().contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn box_straddling_edge_intersects() {
        let f = frustum();
        assert!(f.intersects_aabb(Vec3::new(2.0, -0.5, -0.5), Vec3::new(50.0, 0.5, 0.5)));
        assert!(!f.intersects_aabb(Vec3::new(40.0, -0.5, -0.5), Vec3::new(50.0, 0.5, 0.5)));
    }
}
