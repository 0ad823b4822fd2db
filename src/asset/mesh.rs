use log::warn;

use crate::gpu::{BufferId, GpuDevice, PrimitiveMode};
use crate::renderer::buffers::StaticBuffer;
use crate::renderer::context::{DrawRange, RenderingContext};
use crate::renderer::Vertex;

/// CPU geometry plus its lazily uploaded GPU buffers. Solid draws use the
/// triangle indices; wireframe draws use an edge list derived from them.
#[derive(Debug)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    wireframe_indices: Vec<u16>,
    solid_mode: PrimitiveMode,
    wireframe_mode: PrimitiveMode,
    is_static: bool,
    vertex_buffer: StaticBuffer,
    index_buffer: StaticBuffer,
    wireframe_buffer: StaticBuffer,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        Self::with_mode(vertices, indices, PrimitiveMode::Triangles)
    }

    pub fn with_mode(vertices: Vec<Vertex>, indices: Vec<u16>, solid_mode: PrimitiveMode) -> Self {
        let wireframe_indices = if solid_mode == PrimitiveMode::Triangles {
            triangle_edges(&indices, vertices.len())
        } else {
            Vec::new()
        };
        Self {
            vertices,
            indices,
            wireframe_indices,
            solid_mode,
            wireframe_mode: PrimitiveMode::Lines,
            is_static: true,
            vertex_buffer: StaticBuffer::vertices(),
            index_buffer: StaticBuffer::indices(),
            wireframe_buffer: StaticBuffer::indices(),
        }
    }

    /// Geometry that changes per frame. Never instanced.
    pub fn dynamic(mut self) -> Self {
        self.is_static = false;
        self
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Wireframe falls back to the solid indices when no edge list exists.
    pub fn indices(&self, solid: bool) -> &[u16] {
        if solid || self.wireframe_indices.is_empty() {
            &self.indices
        } else {
            &self.wireframe_indices
        }
    }

    pub fn draw_mode(&self, solid: bool) -> PrimitiveMode {
        if solid || self.wireframe_indices.is_empty() {
            self.solid_mode
        } else {
            self.wireframe_mode
        }
    }

    pub fn draw_range(&self, solid: bool) -> DrawRange {
        match self.indices(solid) {
            [] => DrawRange::Arrays(self.vertices.len() as u32),
            indices => DrawRange::Indexed(indices.len() as u32),
        }
    }

    pub fn triangle_count(&self) -> u32 {
        let count = if self.indices.is_empty() {
            self.vertices.len()
        } else {
            self.indices.len()
        } as u32;
        match self.solid_mode {
            PrimitiveMode::Triangles => count / 3,
            PrimitiveMode::TriangleStrip | PrimitiveMode::TriangleFan => count.saturating_sub(2),
            _ => 0,
        }
    }

    pub fn vertex_buffer_id(&self) -> Option<BufferId> {
        self.vertex_buffer.id()
    }

    pub fn index_buffer_id(&self, solid: bool) -> Option<BufferId> {
        if solid || self.wireframe_indices.is_empty() {
            self.index_buffer.id()
        } else {
            self.wireframe_buffer.id()
        }
    }

    /// True when every buffer this mesh needs is on the GPU. Does not upload.
    pub fn is_uploaded(&self) -> bool {
        self.vertex_buffer.is_uploaded()
            && (self.indices.is_empty() || self.index_buffer.is_uploaded())
            && (self.wireframe_indices.is_empty() || self.wireframe_buffer.is_uploaded())
    }

    /// Uploads missing buffers. An empty mesh is never ready.
    pub fn is_ready<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) -> bool {
        if self.vertices.is_empty() {
            return false;
        }
        if self.is_uploaded() {
            return true;
        }

        // The element binding is per vertex array; keep uploads off any bound one.
        context.set_vertex_array(None);
        self.vertex_buffer
            .ensure_uploaded(context, bytemuck::cast_slice(&self.vertices));
        if !self.indices.is_empty() {
            self.index_buffer
                .ensure_uploaded(context, bytemuck::cast_slice(&self.indices));
        }
        if !self.wireframe_indices.is_empty() {
            self.wireframe_buffer
                .ensure_uploaded(context, bytemuck::cast_slice(&self.wireframe_indices));
        }
        self.is_uploaded()
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.vertex_buffer.invalidate(context);
        self.index_buffer.invalidate(context);
        self.wireframe_buffer.invalidate(context);
    }

    pub fn forget(&mut self) {
        self.vertex_buffer.forget();
        self.index_buffer.forget();
        self.wireframe_buffer.forget();
    }
}

/// Each triangle contributes its three edges as line pairs.
fn triangle_edges(indices: &[u16], vertex_count: usize) -> Vec<u16> {
    let source: Vec<u16> = if indices.is_empty() {
        if vertex_count > u16::MAX as usize + 1 {
            warn!("Mesh has {} vertices, too many for u16 wireframe indices", vertex_count);
            return Vec::new();
        }
        (0..vertex_count).map(|i| i as u16).collect()
    } else {
        indices.to_vec()
    };

    source
        .chunks_exact(3)
        .flat_map(|tri| [tri[0], tri[1], tri[1], tri[2], tri[2], tri[0]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCall, RecordingDevice};
    use crate::renderer::vertex::v;
    use crate::settings::RenderSettings;

    fn triangle() -> Mesh {
        Mesh::new(
            vec![
                v([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
                v([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
                v([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            ],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn wireframe_uses_edge_list() {
        let mesh = triangle();
        assert_eq!(mesh.indices(false), &[0, 1, 1, 2, 2, 0]);
        assert_eq!(mesh.draw_mode(false), PrimitiveMode::Lines);
        assert_eq!(mesh.draw_range(true), DrawRange::Indexed(3));
        assert_eq!(mesh.draw_range(false), DrawRange::Indexed(6));
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn non_indexed_mesh_draws_arrays() {
        let mesh = Mesh::with_mode(vec![Vertex::default(); 4], Vec::new(), PrimitiveMode::TriangleStrip);
        assert_eq!(mesh.draw_range(true), DrawRange::Arrays(4));
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn ready_uploads_three_buffers_once() {
        let mut ctx = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
        let mut mesh = triangle();
        assert!(!mesh.is_uploaded());
        assert!(mesh.is_ready(&mut ctx));
        assert!(mesh.is_ready(&mut ctx));
        assert_eq!(ctx.device().count(|c| matches!(c, GpuCall::BufferData(..))), 3);
    }

    #[test]
    fn invalidated_mesh_reports_not_uploaded() {
        let mut ctx = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
        let mut mesh = triangle();
        mesh.is_ready(&mut ctx);
        let before = mesh.vertex_buffer_id();
        mesh.invalidate(&mut ctx);
        assert!(!mesh.is_uploaded());
        assert!(mesh.is_ready(&mut ctx));
        assert_ne!(mesh.vertex_buffer_id(), before);
    }

    #[test]
    fn empty_mesh_is_never_ready() {
        let mut ctx = RenderingContext::new(RecordingDevice::new(), &RenderSettings::default());
        let mut mesh = Mesh::new(Vec::new(), Vec::new());
        assert!(!mesh.is_ready(&mut ctx));
    }
}
