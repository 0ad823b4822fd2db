// renderer/vao.rs
// Vertex array objects memoized by everything their attribute setup reads.
use std::collections::HashMap;

use log::{debug, trace};

use crate::asset::{Handle, Mesh};
use crate::gpu::{BufferId, GpuDevice, ProgramId, VertexArrayId};

use super::buffers::InstanceData;
use super::context::RenderingContext;
use super::program::{Program, ProgramKey};
use super::resource::GpuResource;
use super::vertex::Vertex;

/// Instance buffer, program, mesh and fill mode. Two draws that differ in
/// any of them must not share attribute state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaoKey {
    pub instance_buffer: Option<BufferId>,
    pub program: ProgramKey,
    pub mesh: Handle<Mesh>,
    pub solid: bool,
}

/// GPU ids the attribute pointers were recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BuiltAgainst {
    program: ProgramId,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
}

#[derive(Debug)]
pub struct VertexArrayObject {
    key: VaoKey,
    resource: GpuResource<VertexArrayId>,
    built: Option<BuiltAgainst>,
}

impl VertexArrayObject {
    fn new(key: VaoKey) -> Self {
        Self {
            key,
            resource: GpuResource::new(),
            built: None,
        }
    }

    pub fn key(&self) -> VaoKey {
        self.key
    }

    pub fn id(&self) -> Option<VertexArrayId> {
        self.resource.id()
    }

    /// Valid while the program is linked, the mesh is uploaded, and both
    /// still carry the ids the attributes were recorded with.
    pub fn is_valid(&self, program: &Program, mesh: &Mesh) -> bool {
        self.resource.is_ready()
            && program.is_linked()
            && mesh.is_uploaded()
            && self.built == current_ids(program, mesh, self.key.solid)
    }

    fn build<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        program: &Program,
        mesh: &Mesh,
    ) -> bool {
        let Some(built) = current_ids(program, mesh, self.key.solid) else {
            return false;
        };
        let id = context.device_mut().create_vertex_array();
        context.set_vertex_array(Some(id));
        set_attributes(context, program, mesh, self.key.solid, self.key.instance_buffer);
        context.check_gpu_error("vertex array setup");
        self.resource.set_ready(id);
        self.built = Some(built);
        trace!("Built vertex array {:?} for {:?}", id, self.key);
        true
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.resource.invalidate(context);
        self.built = None;
    }

    pub fn forget(&mut self) {
        self.resource.forget();
        self.built = None;
    }
}

fn current_ids(program: &Program, mesh: &Mesh, solid: bool) -> Option<BuiltAgainst> {
    Some(BuiltAgainst {
        program: program.id()?,
        vertex_buffer: mesh.vertex_buffer_id()?,
        index_buffer: mesh.index_buffer_id(solid),
    })
}

/// Points every attribute the program uses at the mesh (and instance) buffers
/// and binds the element buffer. With a vertex array bound this is recorded
/// into it; without one it is the per-draw fallback.
pub fn set_attributes<D: GpuDevice>(
    context: &mut RenderingContext<D>,
    program: &Program,
    mesh: &Mesh,
    solid: bool,
    instance_buffer: Option<BufferId>,
) {
    context.set_vertex_buffer(mesh.vertex_buffer_id());
    for attribute in Vertex::ATTRIBUTES {
        let index = attribute.location.index();
        if program.has_attribute(attribute.location) {
            let device = context.device_mut();
            device.enable_vertex_attrib(index);
            device.vertex_attrib_pointer(index, attribute.components, Vertex::STRIDE, attribute.offset);
        } else {
            context.device_mut().disable_vertex_attrib(index);
        }
    }

    match instance_buffer {
        Some(buffer) => {
            context.set_instance_buffer(Some(buffer));
            for attribute in InstanceData::ATTRIBUTES {
                let index = attribute.location.index();
                let device = context.device_mut();
                device.enable_vertex_attrib(index);
                device.vertex_attrib_pointer(
                    index,
                    attribute.components,
                    InstanceData::STRIDE,
                    attribute.offset,
                );
                device.vertex_attrib_divisor(index, 1);
            }
        }
        None => {
            for attribute in InstanceData::ATTRIBUTES {
                context.device_mut().disable_vertex_attrib(attribute.location.index());
            }
        }
    }

    context.set_index_buffer(mesh.index_buffer_id(solid));
}

/// Memoizes vertex array objects by [`VaoKey`].
#[derive(Debug, Default)]
pub struct VaoCache {
    vaos: HashMap<VaoKey, VertexArrayObject>,
}

impl VaoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the vertex array for `key`, rebuilding it when its program
    /// or mesh changed underneath it. `None` while either is not ready.
    pub fn get_or_create<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        key: VaoKey,
        program: &Program,
        mesh: &Mesh,
    ) -> Option<VertexArrayId> {
        debug_assert!(context.capabilities().has_vertex_array_objects());
        let vao = self.vaos.entry(key).or_insert_with(|| {
            debug!("Vertex array cache miss for {:?}", key);
            VertexArrayObject::new(key)
        });
        if !vao.is_valid(program, mesh) {
            if vao.id().is_some() {
                debug!("Rebuilding stale vertex array {:?}", vao.id());
            }
            vao.invalidate(context);
            if !vao.build(context, program, mesh) {
                return None;
            }
        }
        vao.id()
    }

    pub fn get(&self, key: &VaoKey) -> Option<&VertexArrayObject> {
        self.vaos.get(key)
    }

    pub fn len(&self) -> usize {
        self.vaos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vaos.is_empty()
    }

    pub fn clear<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        for vao in self.vaos.values_mut() {
            vao.invalidate(context);
        }
        self.vaos.clear();
    }

    /// Empties the cache without device calls, after context loss.
    pub fn forget_all(&mut self) {
        for vao in self.vaos.values_mut() {
            vao.forget();
        }
        self.vaos.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, RecordingDevice};
    use crate::renderer::program::ProgramCache;
    use crate::renderer::vertex::v;
    use crate::settings::RenderSettings;

    struct Fixture {
        ctx: RenderingContext<RecordingDevice>,
        programs: ProgramCache,
        key: ProgramKey,
        mesh: Mesh,
    }

    fn fixture() -> Fixture {
        let mut ctx = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
        let mut programs = ProgramCache::new();
        let key = programs.get_or_create("UNLIT\n");
        let mut mesh = Mesh::new(
            vec![
                v([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
                v([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
                v([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            ],
            vec![0, 1, 2],
        );
        assert!(mesh.is_ready(&mut ctx));
        assert!(programs.get_mut(key).unwrap().is_ready(&mut ctx));
        Fixture {
            ctx,
            programs,
            key,
            mesh,
        }
    }

    fn vao_key(program: ProgramKey, instance_buffer: Option<BufferId>) -> VaoKey {
        VaoKey {
            instance_buffer,
            program,
            mesh: Handle::new(0),
            solid: true,
        }
    }

    #[test]
    fn same_key_reuses_vertex_array() {
        let mut f = fixture();
        let mut cache = VaoCache::new();
        let program = f.programs.get(f.key).unwrap();
        let key = vao_key(f.key, None);
        let first = cache.get_or_create(&mut f.ctx, key, program, &f.mesh);
        let second = cache.get_or_create(&mut f.ctx, key, program, &f.mesh);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(f.ctx.device().count(|c| matches!(c, GpuCall::CreateVertexArray(_))), 1);
    }

    #[test]
    fn instancing_gets_its_own_vertex_array() {
        let mut f = fixture();
        let mut cache = VaoCache::new();
        let program = f.programs.get(f.key).unwrap();
        let plain = cache.get_or_create(&mut f.ctx, vao_key(f.key, None), program, &f.mesh);
        let instanced = cache.get_or_create(
            &mut f.ctx,
            vao_key(f.key, Some(BufferId(999))),
            program,
            &f.mesh,
        );
        assert_ne!(plain, instanced);
        assert_eq!(cache.len(), 2);
        assert!(f.ctx.device().count(|c| matches!(c, GpuCall::VertexAttribDivisor(_, 1))) > 0);
    }

    #[test]
    fn mesh_invalidation_rebuilds_with_new_id() {
        let mut f = fixture();
        let mut cache = VaoCache::new();
        let key = vao_key(f.key, None);
        let before = {
            let program = f.programs.get(f.key).unwrap();
            cache.get_or_create(&mut f.ctx, key, program, &f.mesh)
        };

        f.mesh.invalidate(&mut f.ctx);
        let program = f.programs.get(f.key).unwrap();
        assert!(!cache.get(&key).unwrap().is_valid(program, &f.mesh));
        assert_eq!(cache.get_or_create(&mut f.ctx, key, program, &f.mesh), None);

        assert!(f.mesh.is_ready(&mut f.ctx));
        let after = cache.get_or_create(&mut f.ctx, key, program, &f.mesh);
        assert!(after.is_some());
        assert_ne!(before, after);
        assert!(before.is_some_and(|id| f
            .ctx
            .device()
            .calls()
            .contains(&GpuCall::DeleteVertexArray(id))));
    }

    #[test]
    fn index_buffer_is_recorded_into_vertex_array() {
        let mut f = fixture();
        let mut cache = VaoCache::new();
        let program = f.programs.get(f.key).unwrap();
        let id = cache.get_or_create(&mut f.ctx, vao_key(f.key, None), program, &f.mesh);
        assert_eq!(f.ctx.vertex_array(), id);
        assert_eq!(f.ctx.index_buffer(), f.mesh.index_buffer_id(true));
    }
}
