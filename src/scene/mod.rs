// scene/mod.rs

pub mod camera;
pub mod components;
pub mod frustum;
pub mod scene;
pub mod transform;

use hecs::Entity;

use crate::asset::{Handle, Mesh};
use crate::renderer::Material;

// Re-export commonly used types
pub use camera::Camera;
pub use frustum::Frustum;
pub use scene::{Scene, SceneView};
pub use transform::Transform;

// Re-export all components
pub use components::{
    Armature, Bounds, Drawable, LocalTransform, Name, Parent, Visible, WorldTransform,
};

/// A node that survived culling this frame. Batches hold these by value;
/// the entity is only valid for the frame that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleNode {
    pub entity: Entity,
    pub mesh: Option<Handle<Mesh>>,
    pub material: Option<Handle<Material>>,
    pub has_armature: bool,
}
