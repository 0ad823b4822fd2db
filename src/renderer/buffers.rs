// renderer/buffers.rs
use std::mem;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use log::{debug, trace};

use crate::gpu::{BufferId, BufferTarget, BufferUsage, GpuDevice};

use super::context::RenderingContext;
use super::resource::GpuResource;
use super::vertex::{AttributeLocation, VertexAttribute};

/// Immutable vertex or index storage, uploaded once on first use.
#[derive(Debug)]
pub struct StaticBuffer {
    target: BufferTarget,
    resource: GpuResource<BufferId>,
}

impl StaticBuffer {
    pub const fn vertices() -> Self {
        Self {
            target: BufferTarget::Array,
            resource: GpuResource::new(),
        }
    }

    pub const fn indices() -> Self {
        Self {
            target: BufferTarget::ElementArray,
            resource: GpuResource::new(),
        }
    }

    pub fn target(&self) -> BufferTarget {
        self.target
    }

    pub fn id(&self) -> Option<BufferId> {
        self.resource.id()
    }

    pub fn is_uploaded(&self) -> bool {
        self.resource.is_ready()
    }

    /// Uploads `data` unless the buffer already lives on the GPU.
    pub fn ensure_uploaded<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        data: &[u8],
    ) -> bool {
        if self.resource.is_ready() {
            return true;
        }

        let id = context.device_mut().create_buffer();
        context.set_buffer(self.target, Some(id));
        context
            .device_mut()
            .buffer_data(self.target, data, BufferUsage::Static);
        context.check_gpu_error("buffer upload");
        self.resource.set_ready(id);
        trace!("Uploaded {:?} buffer {:?} ({} bytes)", self.target, id, data.len());
        true
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.resource.invalidate(context);
    }

    pub fn forget(&mut self) {
        self.resource.forget();
    }
}

/// Per-node data for instanced draws: the top three rows of the model
/// matrix and the three columns of the normal matrix.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct InstanceData {
    pub model_row0: [f32; 4],
    pub model_row1: [f32; 4],
    pub model_row2: [f32; 4],
    pub normal_col0: [f32; 3],
    pub normal_col1: [f32; 3],
    pub normal_col2: [f32; 3],
}

impl InstanceData {
    pub const STRIDE: usize = mem::size_of::<InstanceData>();

    pub const ATTRIBUTES: [VertexAttribute; 6] = [
        VertexAttribute {
            location: AttributeLocation::ModelMatrixRow0,
            components: 4,
            offset: mem::offset_of!(InstanceData, model_row0),
        },
        VertexAttribute {
            location: AttributeLocation::ModelMatrixRow1,
            components: 4,
            offset: mem::offset_of!(InstanceData, model_row1),
        },
        VertexAttribute {
            location: AttributeLocation::ModelMatrixRow2,
            components: 4,
            offset: mem::offset_of!(InstanceData, model_row2),
        },
        VertexAttribute {
            location: AttributeLocation::NormalMatrixCol0,
            components: 3,
            offset: mem::offset_of!(InstanceData, normal_col0),
        },
        VertexAttribute {
            location: AttributeLocation::NormalMatrixCol1,
            components: 3,
            offset: mem::offset_of!(InstanceData, normal_col1),
        },
        VertexAttribute {
            location: AttributeLocation::NormalMatrixCol2,
            components: 3,
            offset: mem::offset_of!(InstanceData, normal_col2),
        },
    ];

    pub fn new(model: &Mat4, normal: &Mat3) -> Self {
        Self {
            model_row0: model.row(0).to_array(),
            model_row1: model.row(1).to_array(),
            model_row2: model.row(2).to_array(),
            normal_col0: normal.x_axis.to_array(),
            normal_col1: normal.y_axis.to_array(),
            normal_col2: normal.z_axis.to_array(),
        }
    }
}

/// Dynamic buffer rewritten for every instanced batch. Grows by
/// reallocating; otherwise the existing storage is overwritten in place.
#[derive(Debug, Default)]
pub struct InstanceBuffer {
    resource: GpuResource<BufferId>,
    capacity: usize,
    staging: Vec<InstanceData>,
}

impl InstanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<BufferId> {
        self.resource.id()
    }

    /// Capacity in instances.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn staging_mut(&mut self) -> &mut Vec<InstanceData> {
        &mut self.staging
    }

    /// Pushes the staged instances to the GPU and returns how many there are.
    pub fn upload<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) -> u32 {
        if !self.resource.is_ready() {
            let id = context.device_mut().create_buffer();
            self.resource.set_ready(id);
            self.capacity = 0;
        }

        let id = self.resource.id();
        context.set_instance_buffer(id);
        let bytes: &[u8] = bytemuck::cast_slice(&self.staging);
        if self.staging.len() > self.capacity {
            debug!(
                "Growing instance buffer from {} to {} instances",
                self.capacity,
                self.staging.len()
            );
            context
                .device_mut()
                .buffer_data(BufferTarget::Array, bytes, BufferUsage::Dynamic);
            self.capacity = self.staging.len();
        } else if !bytes.is_empty() {
            context
                .device_mut()
                .buffer_sub_data(BufferTarget::Array, 0, bytes);
        }
        context.check_gpu_error("instance buffer upload");
        self.staging.len() as u32
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.resource.invalidate(context);
        self.capacity = 0;
    }

    pub fn forget(&mut self) {
        self.resource.forget();
        self.capacity = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, RecordingDevice};
    use crate::settings::RenderSettings;
    use glam::Vec3;

    fn context() -> RenderingContext<RecordingDevice> {
        let mut context = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
        context.device_mut().clear_calls();
        context
    }

    #[test]
    fn instance_data_is_84_bytes() {
        assert_eq!(InstanceData::STRIDE, 84);
    }

    #[test]
    fn instance_rows_hold_translation() {
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let data = InstanceData::new(&model, &Mat3::IDENTITY);
        assert_eq!(data.model_row0, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(data.model_row1, [0.0, 1.0, 0.0, 2.0]);
        assert_eq!(data.model_row2, [0.0, 0.0, 1.0, 3.0]);
        assert_eq!(data.normal_col1, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn static_buffer_uploads_once() {
        let mut ctx = context();
        let mut buffer = StaticBuffer::vertices();
        assert!(buffer.ensure_uploaded(&mut ctx, &[0u8; 16]));
        assert!(buffer.ensure_uploaded(&mut ctx, &[0u8; 16]));
        assert_eq!(ctx.device().count(|c| matches!(c, GpuCall::BufferData(..))), 1);
    }

    #[test]
    fn instance_buffer_grows_then_rewrites() {
        let mut ctx = context();
        let mut buffer = InstanceBuffer::new();
        let one = InstanceData::new(&Mat4::IDENTITY, &Mat3::IDENTITY);

        buffer.staging_mut().extend([one; 4]);
        assert_eq!(buffer.upload(&mut ctx), 4);
        buffer.staging_mut().truncate(2);
        assert_eq!(buffer.upload(&mut ctx), 2);
        buffer.staging_mut().extend([one; 6]);
        assert_eq!(buffer.upload(&mut ctx), 8);

        let calls = ctx.device().calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, GpuCall::BufferData(..))).count(), 2);
        assert_eq!(calls.iter().filter(|c| matches!(c, GpuCall::BufferSubData(..))).count(), 1);
        assert_eq!(buffer.capacity(), 8);
    }
}
