// renderer/batch.rs
// Groups visible nodes into runs that share a material and a mesh.
use crate::asset::{Handle, Mesh};
use crate::scene::VisibleNode;

use super::material::Material;

/// Nodes drawn with one material and one mesh. Rebuilt every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    material: Option<Handle<Material>>,
    mesh: Option<Handle<Mesh>>,
    nodes: Vec<VisibleNode>,
    allow_instancing: bool,
}

impl Batch {
    pub fn new(material: Option<Handle<Material>>, mesh: Option<Handle<Mesh>>) -> Self {
        Self {
            material,
            mesh,
            nodes: Vec::new(),
            allow_instancing: true,
        }
    }

    /// Skinned nodes need per-node bone uniforms, which instance attributes
    /// cannot carry.
    pub fn add(&mut self, node: VisibleNode) {
        debug_assert!(node.material == self.material && node.mesh == self.mesh);
        if node.has_armature {
            self.allow_instancing = false;
        }
        self.nodes.push(node);
    }

    pub fn material(&self) -> Option<Handle<Material>> {
        self.material
    }

    pub fn mesh(&self) -> Option<Handle<Mesh>> {
        self.mesh
    }

    pub fn nodes(&self) -> &[VisibleNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn allow_instancing(&self) -> bool {
        self.allow_instancing
    }

    fn accepts(&self, node: &VisibleNode, max_nodes: usize) -> bool {
        node.material.is_some()
            && node.mesh.is_some()
            && self.material == node.material
            && self.mesh == node.mesh
            && self.nodes.len() < max_nodes
    }
}

/// Sorts by material, then by mesh (both stable), and cuts a new batch on
/// every key change, on every node missing a material or mesh, and whenever
/// the current batch holds `max_nodes_in_batch` nodes.
pub fn generate_batches(nodes: &[VisibleNode], max_nodes_in_batch: usize) -> Vec<Batch> {
    let max_nodes = max_nodes_in_batch.max(1);
    let mut sorted: Vec<VisibleNode> = nodes.to_vec();
    sorted.sort_by_key(|node| (node.material, node.mesh));

    let mut batches: Vec<Batch> = Vec::new();
    for node in sorted {
        match batches.last_mut() {
            Some(batch) if batch.accepts(&node, max_nodes) => batch.add(node),
            _ => {
                let mut batch = Batch::new(node.material, node.mesh);
                batch.add(node);
                batches.push(batch);
            }
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, material: Option<usize>, mesh: Option<usize>) -> VisibleNode {
        let mut world = hecs::World::new();
        let mut entity = world.spawn(());
        for _ in 0..id {
            entity = world.spawn(());
        }
        VisibleNode {
            entity,
            material: material.map(Handle::new),
            mesh: mesh.map(Handle::new),
            has_armature: false,
        }
    }

    #[test]
    fn empty_input_gives_no_batches() {
        assert!(generate_batches(&[], 128).is_empty());
    }

    #[test]
    fn single_node_gives_single_batch() {
        let batches = generate_batches(&[node(0, Some(0), Some(0))], 128);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn material_groups_before_mesh() {
        let nodes = [
            node(0, Some(1), Some(0)),
            node(1, Some(0), Some(1)),
            node(2, Some(1), Some(0)),
            node(3, Some(0), Some(0)),
            node(4, Some(0), Some(1)),
        ];
        let batches = generate_batches(&nodes, 128);
        let keys: Vec<_> = batches
            .iter()
            .map(|b| (b.material().map(|h| h.index()), b.mesh().map(|h| h.index()), b.len()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (Some(0), Some(0), 1),
                (Some(0), Some(1), 2),
                (Some(1), Some(0), 2),
            ]
        );
    }

    #[test]
    fn equal_keys_keep_discovery_order() {
        let nodes = [
            node(5, Some(0), Some(0)),
            node(2, Some(0), Some(0)),
            node(9, Some(0), Some(0)),
        ];
        let batches = generate_batches(&nodes, 128);
        let order: Vec<_> = batches[0].nodes().iter().map(|n| n.entity).collect();
        assert_eq!(order, nodes.iter().map(|n| n.entity).collect::<Vec<_>>());
    }

    #[test]
    fn missing_material_or_mesh_is_never_merged() {
        let nodes = [
            node(0, None, Some(0)),
            node(1, None, Some(0)),
            node(2, Some(0), None),
            node(3, Some(0), None),
        ];
        let batches = generate_batches(&nodes, 128);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn armature_disables_instancing_for_its_batch() {
        let mut skinned = node(1, Some(0), Some(0));
        skinned.has_armature = true;
        let nodes = [node(0, Some(0), Some(0)), skinned, node(2, Some(1), Some(0))];
        let batches = generate_batches(&nodes, 128);
        assert!(!batches[0].allow_instancing());
        assert!(batches[1].allow_instancing());
    }

    #[test]
    fn zero_limit_behaves_as_one() {
        let nodes = [node(0, Some(0), Some(0)), node(1, Some(0), Some(0))];
        assert_eq!(generate_batches(&nodes, 0).len(), 2);
    }
}
