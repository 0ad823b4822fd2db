// scene/components.rs
// Pure hecs components - no custom entity system

use glam::{Mat3, Mat4, Vec3};
use hecs::Entity;

use crate::asset::{Handle, Mesh};
use crate::renderer::resource::next_revision;
use crate::renderer::{Material, Vertex};
use crate::scene::Transform;

// ============================================================================
// Core Rendering Components
// ============================================================================

/// What to draw. Either reference may be missing; such nodes are batched
/// alone and skipped at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawable {
    pub mesh: Option<Handle<Mesh>>,
    pub material: Option<Handle<Material>>,
}

/// Local transform with a version bumped by every change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    transform: Transform,
    version: u64,
}

impl LocalTransform {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            version: 1,
        }
    }

    pub fn get(&self) -> &Transform {
        &self.transform
    }

    pub fn set(&mut self, transform: Transform) {
        self.transform = transform;
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// World-space matrices (computed from hierarchy). `version` changes every
/// time they are recomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    pub model: Mat4,
    /// Inverse-transpose of the model's upper 3x3.
    pub normal: Mat3,
    pub version: u64,
    pub(crate) local_version: u64,
    pub(crate) parent: Option<(Entity, u64)>,
}

impl WorldTransform {
    pub(crate) fn compute(
        parent_model: &Mat4,
        local: &LocalTransform,
        parent: Option<(Entity, u64)>,
        previous_version: u64,
    ) -> Self {
        let model = *parent_model * local.get().matrix();
        Self {
            model,
            normal: normal_matrix(&model),
            version: previous_version + 1,
            local_version: local.version(),
            parent,
        }
    }
}

pub fn normal_matrix(model: &Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(*model);
    if linear.determinant().abs() > f32::EPSILON {
        linear.inverse().transpose()
    } else {
        linear
    }
}

/// Visibility component
#[derive(Debug, Clone, Copy)]
pub struct Visible(pub bool);

impl Default for Visible {
    fn default() -> Self {
        Self(true)
    }
}

/// Local-space axis-aligned bounds used for frustum culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_vertices(vertices: &[Vertex]) -> Option<Self> {
        let mut points = vertices.iter().map(|vertex| Vec3::from(vertex.position));
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

// ============================================================================
// Animation Components
// ============================================================================

/// Bone matrices for a skinned node. Evaluating animation tracks happens
/// elsewhere; this only carries the result.
#[derive(Debug, Clone, PartialEq)]
pub struct Armature {
    bones: Vec<Mat4>,
    version: u64,
}

impl Armature {
    pub fn new(bones: Vec<Mat4>) -> Self {
        Self {
            bones,
            version: next_revision(),
        }
    }

    pub fn bones(&self) -> &[Mat4] {
        &self.bones
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn set_bone(&mut self, index: usize, matrix: Mat4) {
        if let Some(bone) = self.bones.get_mut(index) {
            *bone = matrix;
            self.version = next_revision();
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

// ============================================================================
// Utility Components
// ============================================================================

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

// ============================================================================
// Hierarchy Components
// ============================================================================

/// Parent entity reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::vertex::v;

    #[test]
    fn bounds_cover_all_vertices() {
        let bounds = Bounds::from_vertices(&[
            v([1.0, -2.0, 0.0], [0.0; 3], [0.0; 2]),
            v([-1.0, 3.0, 0.5], [0.0; 3], [0.0; 2]),
        ])
        .unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 3.0, 0.5));
        assert!(Bounds::from_vertices(&[]).is_none());
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(&model);
        assert!((normal.x_axis.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_bone_is_ignored() {
        let mut armature = Armature::new(vec![Mat4::IDENTITY; 2]);
        let initial = armature.version();
        armature.set_bone(5, Mat4::ZERO);
        assert_eq!(armature.version(), initial);
        armature.set_bone(1, Mat4::ZERO);
        assert!(armature.version() > initial);
    }
}
