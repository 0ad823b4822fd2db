pub mod batch;
pub mod buffers;
pub mod capabilities;
pub mod context;
pub mod defines;
pub mod framebuffer;
pub mod light;
pub mod material;
pub mod pass;
pub mod primitives;
pub mod program;
pub mod renderer;
pub mod resource;
pub mod shadows;
pub mod state;
pub mod texture;
pub mod vao;
pub mod vertex;

pub use batch::{generate_batches, Batch};
pub use buffers::{InstanceBuffer, InstanceData, StaticBuffer};
pub use capabilities::RenderingCapabilities;
pub use context::{DrawRange, RenderingContext};
pub use defines::{DrawVariant, ShaderDefines};
pub use framebuffer::FrameBuffer;
pub use light::{Light, LightType};
pub use material::{
    BillboardType, FillMode, Material, MaterialTexture, RenderKind, TextureSlot,
};
pub use pass::{Pass, PassType, Technique};
pub use primitives::{cube_mesh, quad_mesh, sphere_mesh};
pub use program::{Program, ProgramCache, ProgramKey, SceneUniforms, ViewUniforms};
pub use renderer::{FrameContext, Renderer, RendererStats};
pub use resource::{GpuResource, ResourceState};
pub use shadows::{ShadowCaster, ShadowMaps};
pub use state::{BlendMode, CullFaceMode, PassState, PolygonOffset, StencilState};
pub use texture::{Image, Texture, TextureLoader};
pub use vao::{VaoCache, VaoKey, VertexArrayObject};
pub use vertex::{AttributeLocation, Vertex};
