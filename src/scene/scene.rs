use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec4};
use hecs::{Entity, World};
use rayon::prelude::*;

use crate::asset::{Assets, Handle, Mesh};
use crate::renderer::program::SceneUniforms;
use crate::renderer::{Light, Material};

use super::camera::Camera;
use super::frustum::Frustum;
use super::components::{
    Armature, Bounds, Drawable, LocalTransform, Name, Parent, Visible, WorldTransform,
};
use super::transform::Transform;
use super::VisibleNode;

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

/// Node arena plus the assets and lights it draws with.
pub struct Scene {
    id: u64,
    pub world: World,
    pub assets: Assets,
    lights: Vec<Light>,
    ambient: Vec4,
    ambient_version: u64,
}

/// Read-only scene state the renderer needs while it mutates assets.
pub struct SceneView<'a> {
    pub world: &'a World,
    pub lights: &'a [Light],
    pub uniforms: SceneUniforms,
}

struct Candidate {
    entity: Entity,
    drawable: Drawable,
    model: Mat4,
    bounds: Option<Bounds>,
    has_armature: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            id: NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed),
            world: World::new(),
            assets: Assets::new(),
            lights: Vec::new(),
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            ambient_version: 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Spawns a drawable node. Local bounds come from the mesh when it is
    /// already in the asset cache.
    pub fn spawn_node(
        &mut self,
        name: &str,
        transform: Transform,
        mesh: Option<Handle<Mesh>>,
        material: Option<Handle<Material>>,
    ) -> Entity {
        let bounds = mesh
            .and_then(|handle| self.assets.meshes.get(handle))
            .and_then(|mesh| Bounds::from_vertices(mesh.vertices()));
        let entity = self.world.spawn((
            Name::new(name),
            LocalTransform::new(transform),
            Drawable { mesh, material },
            Visible(true),
        ));
        if let Some(bounds) = bounds {
            // The entity was spawned just above.
            let _ = self.world.insert_one(entity, bounds);
        }
        entity
    }

    /// Spawns a transform-only node, useful as a hierarchy pivot.
    pub fn spawn_group(&mut self, name: &str, transform: Transform) -> Entity {
        self.world
            .spawn((Name::new(name), LocalTransform::new(transform)))
    }

    pub fn set_parent(&mut self, child: Entity, parent: Entity) -> bool {
        if child == parent || !self.world.contains(parent) {
            log::warn!("Refusing to parent {:?} under {:?}", child, parent);
            return false;
        }
        self.world.insert_one(child, Parent(parent)).is_ok()
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> bool {
        match self.world.get::<&mut LocalTransform>(entity) {
            Ok(mut local) => {
                local.set(transform);
                true
            }
            Err(_) => false,
        }
    }

    pub fn set_visible(&mut self, entity: Entity, visible: bool) -> bool {
        self.world.insert_one(entity, Visible(visible)).is_ok()
    }

    pub fn set_armature(&mut self, entity: Entity, armature: Armature) -> bool {
        self.world.insert_one(entity, armature).is_ok()
    }

    pub fn world_transform(&self, entity: Entity) -> Option<WorldTransform> {
        self.world.get::<&WorldTransform>(entity).ok().map(|world| *world)
    }

    // ========================================================================
    // Lights and ambient
    // ========================================================================

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn light_mut(&mut self, index: usize) -> Option<&mut Light> {
        self.lights.get_mut(index)
    }

    pub fn ambient_color(&self) -> Vec4 {
        self.ambient
    }

    pub fn set_ambient_color(&mut self, color: Vec4) {
        self.ambient = color;
        self.ambient_version += 1;
    }

    pub fn uniforms(&self) -> SceneUniforms {
        SceneUniforms {
            id: self.id,
            version: self.ambient_version,
            ambient: self.ambient,
        }
    }

    /// Splits the scene so assets can upload while nodes and lights are read.
    pub fn split(&mut self) -> (SceneView<'_>, &mut Assets) {
        let uniforms = self.uniforms();
        (
            SceneView {
                world: &self.world,
                lights: &self.lights,
                uniforms,
            },
            &mut self.assets,
        )
    }

    // ========================================================================
    // Transforms (sequential due to parent-child dependencies)
    // ========================================================================

    /// Recomputes world transforms whose local transform, parent, or parent
    /// world transform changed since the last pass. Returns how many were
    /// recomputed.
    pub fn propagate_transforms(&mut self) -> usize {
        let mut children: HashMap<Entity, Vec<Entity>> = HashMap::new();
        for (entity, parent) in self.world.query::<&Parent>().iter() {
            children.entry(parent.0).or_default().push(entity);
        }

        let roots: Vec<Entity> = self
            .world
            .query::<&LocalTransform>()
            .without::<&Parent>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();

        let mut updated = 0;
        let mut stack: Vec<(Entity, Option<(Entity, Mat4, u64)>)> = Vec::new();

        for root in roots {
            stack.push((root, None));

            while let Some((entity, parent)) = stack.pop() {
                let Ok(local) = self.world.get::<&LocalTransform>(entity).map(|local| *local)
                else {
                    log::trace!("Entity {:?} has no LocalTransform, skipping", entity);
                    continue;
                };
                let existing = self.world_transform(entity);
                let parent_stamp = parent.map(|(id, _, version)| (id, version));

                let world = match existing {
                    Some(world)
                        if world.local_version == local.version()
                            && world.parent == parent_stamp =>
                    {
                        world
                    }
                    _ => {
                        let parent_model = parent.map_or(Mat4::IDENTITY, |(_, model, _)| model);
                        let previous = existing.map_or(0, |world| world.version);
                        let world =
                            WorldTransform::compute(&parent_model, &local, parent_stamp, previous);
                        if let Err(e) = self.world.insert_one(entity, world) {
                            log::error!(
                                "Failed to store WorldTransform for entity {:?}: {:?}",
                                entity,
                                e
                            );
                            continue;
                        }
                        updated += 1;
                        world
                    }
                };

                if let Some(kids) = children.get(&entity) {
                    for &child in kids.iter().rev() {
                        stack.push((child, Some((entity, world.model, world.version))));
                    }
                }
            }
        }

        log::trace!("Recomputed {} world transforms", updated);
        updated
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// Drawable nodes whose world bounds touch the camera frustum, in entity
    /// iteration order. Nodes without bounds are always visible.
    pub fn visible_nodes(&self, camera: &Camera, aspect: f32) -> Vec<VisibleNode> {
        self.visible_nodes_in(&camera.frustum(aspect))
    }

    /// Same as [`Scene::visible_nodes`] for an arbitrary view volume, such
    /// as a shadow split.
    pub fn visible_nodes_in(&self, frustum: &Frustum) -> Vec<VisibleNode> {
        cull(&self.world, frustum)
    }
}

impl SceneView<'_> {
    pub fn visible_nodes_in(&self, frustum: &Frustum) -> Vec<VisibleNode> {
        cull(self.world, frustum)
    }
}

fn cull(world: &World, frustum: &Frustum) -> Vec<VisibleNode> {
    let candidates: Vec<Candidate> = world
        .query::<(
            &Drawable,
            &WorldTransform,
            Option<&Bounds>,
            Option<&Visible>,
            Option<&Armature>,
        )>()
        .iter()
        .filter(|(_, (_, _, _, visible, _))| visible.map_or(true, |v| v.0))
        .map(|(entity, (drawable, world, bounds, _, armature))| Candidate {
            entity,
            drawable: *drawable,
            model: world.model,
            bounds: bounds.copied(),
            has_armature: armature.is_some(),
        })
        .collect();

    candidates
        .par_iter()
        .filter(|candidate| {
            candidate.bounds.map_or(true, |bounds| {
                let world = bounds.transformed(&candidate.model);
                frustum.intersects_aabb(world.min, world.max)
            })
        })
        .map(|candidate| VisibleNode {
            entity: candidate.entity,
            mesh: candidate.drawable.mesh,
            material: candidate.drawable.material,
            has_armature: candidate.has_armature,
        })
        .collect()
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_transform_propagation_simple() {
        let mut scene = Scene::new();
        let parent = scene.spawn_group(
            "Parent",
            Transform::from_trs(Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE),
        );
        let child = scene.spawn_group("Child", Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert!(scene.set_parent(child, parent));

        scene.propagate_transforms();

        let parent_world = scene.world_transform(parent).unwrap();
        assert_eq!(parent_world.model.w_axis.truncate(), Vec3::new(5.0, 0.0, 0.0));
        let child_world = scene.world_transform(child).unwrap();
        assert_eq!(child_world.model.w_axis.truncate(), Vec3::new(7.0, 0.0, 0.0));
    }

    #[test]
    fn unchanged_hierarchy_is_not_recomputed() {
        let mut scene = Scene::new();
        let parent = scene.spawn_group("Parent", Transform::IDENTITY);
        let child = scene.spawn_group("Child", Transform::IDENTITY);
        scene.set_parent(child, parent);

        assert_eq!(scene.propagate_transforms(), 2);
        assert_eq!(scene.propagate_transforms(), 0);
        let version = scene.world_transform(child).unwrap().version;

        // Moving the parent dirties the child through the parent version.
        scene.set_transform(parent, Transform::from_translation(Vec3::X));
        assert_eq!(scene.propagate_transforms(), 2);
        let child_world = scene.world_transform(child).unwrap();
        assert_eq!(child_world.version, version + 1);
        assert_eq!(child_world.model.w_axis.truncate(), Vec3::X);
    }

    #[test]
    fn test_transform_propagation_scale() {
        let mut scene = Scene::new();
        let parent = scene.spawn_group(
            "Parent",
            Transform::IDENTITY.with_scale(Vec3::splat(2.0)),
        );
        let child = scene.spawn_group("Child", Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        scene.set_parent(child, parent);
        scene.propagate_transforms();

        let child_world = scene.world_transform(child).unwrap();
        assert_eq!(child_world.model.w_axis.truncate(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn culling_drops_nodes_outside_frustum() {
        use crate::renderer::primitives::cube_mesh;

        let mut scene = Scene::new();
        let mesh = scene.assets.meshes.insert(cube_mesh());
        let material = scene.assets.materials.insert(Material::default());
        let inside = scene.spawn_node("inside", Transform::IDENTITY, Some(mesh), Some(material));
        scene.spawn_node(
            "behind",
            Transform::from_translation(Vec3::new(0.0, 0.0, 50.0)),
            Some(mesh),
            Some(material),
        );
        let hidden = scene.spawn_node("hidden", Transform::IDENTITY, Some(mesh), Some(material));
        scene.set_visible(hidden, false);
        scene.propagate_transforms();

        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let visible = scene.visible_nodes(&camera, 1.0);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].entity, inside);
    }

    #[test]
    fn armature_is_reported() {
        let mut scene = Scene::new();
        let node = scene.spawn_node("skinned", Transform::IDENTITY, None, None);
        scene.set_armature(node, Armature::new(vec![Mat4::IDENTITY]));
        scene.propagate_transforms();
        let visible = scene.visible_nodes(&Camera::default(), 1.0);
        assert!(visible[0].has_armature);
    }

    #[test]
    fn ambient_change_bumps_scene_uniform_version() {
        let mut scene = Scene::new();
        let before = scene.uniforms().version;
        scene.set_ambient_color(Vec4::ONE);
        assert_eq!(scene.uniforms().version, before + 1);
    }
}
