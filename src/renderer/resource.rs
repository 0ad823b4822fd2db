// renderer/resource.rs
// Lifecycle shared by every GPU object the renderer allocates.
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::gpu::{BufferId, FramebufferId, GpuDevice, ProgramId, TextureId, VertexArrayId};

use super::context::RenderingContext;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

/// Process-wide revision counter for uniform sources (materials, lights,
/// armatures). No value is handed out twice, so an (identity, revision)
/// stamp never matches a replaced source or an edited clone.
pub fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceState {
    #[default]
    Unallocated,
    Ready,
    /// Allocation failed for good. Only an explicit invalidate leaves this state.
    Failed,
}

/// Raw id that can be handed back to the device.
pub trait GpuObject: Copy + Debug {
    fn release<D: GpuDevice>(self, context: &mut RenderingContext<D>);
}

impl GpuObject for BufferId {
    fn release<D: GpuDevice>(self, context: &mut RenderingContext<D>) {
        context.delete_buffer(self);
    }
}

impl GpuObject for TextureId {
    fn release<D: GpuDevice>(self, context: &mut RenderingContext<D>) {
        context.delete_texture(self);
    }
}

impl GpuObject for FramebufferId {
    fn release<D: GpuDevice>(self, context: &mut RenderingContext<D>) {
        context.delete_framebuffer(self);
    }
}

impl GpuObject for VertexArrayId {
    fn release<D: GpuDevice>(self, context: &mut RenderingContext<D>) {
        context.delete_vertex_array(self);
    }
}

impl GpuObject for ProgramId {
    fn release<D: GpuDevice>(self, context: &mut RenderingContext<D>) {
        context.delete_program(self);
    }
}

#[derive(Debug)]
pub struct GpuResource<Id> {
    state: ResourceState,
    id: Option<Id>,
}

impl<Id: GpuObject> GpuResource<Id> {
    pub const fn new() -> Self {
        Self {
            state: ResourceState::Unallocated,
            id: None,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ResourceState::Ready
    }

    pub fn has_failed(&self) -> bool {
        self.state == ResourceState::Failed
    }

    pub fn id(&self) -> Option<Id> {
        self.id
    }

    pub fn set_ready(&mut self, id: Id) {
        debug_assert!(self.id.is_none(), "resource allocated twice");
        self.id = Some(id);
        self.state = ResourceState::Ready;
    }

    pub fn set_failed(&mut self) {
        self.id = None;
        self.state = ResourceState::Failed;
    }

    /// Deletes the GPU object and returns to `Unallocated`.
    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        if let Some(id) = self.id.take() {
            id.release(context);
        }
        self.state = ResourceState::Unallocated;
    }

    /// Drops the id without touching the device. The context that owned it is gone.
    pub fn forget(&mut self) {
        self.id = None;
        self.state = ResourceState::Unallocated;
    }
}

impl<Id: GpuObject> Default for GpuResource<Id> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, RecordingDevice};
    use crate::settings::RenderSettings;

    #[test]
    fn invalidate_deletes_and_forget_does_not() {
        let mut context = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
        let mut first: GpuResource<BufferId> = GpuResource::new();
        let mut second: GpuResource<BufferId> = GpuResource::new();
        let a = context.device_mut().create_buffer();
        let b = context.device_mut().create_buffer();
        first.set_ready(a);
        second.set_ready(b);

        first.invalidate(&mut context);
        second.forget();

        assert_eq!(first.state(), ResourceState::Unallocated);
        assert_eq!(second.state(), ResourceState::Unallocated);
        let deletes = context
            .device()
            .count(|call| matches!(call, GpuCall::DeleteBuffer(_)));
        assert_eq!(deletes, 1);
    }

    #[test]
    fn failed_resource_is_not_ready() {
        let mut resource: GpuResource<ProgramId> = GpuResource::new();
        resource.set_failed();
        assert!(resource.has_failed());
        assert!(!resource.is_ready());
        assert_eq!(resource.id(), None);
    }
}
