// gpu/mod.rs
// Platform binding layer: the primitive calls the renderer issues, nothing more.
pub mod recording;

pub use recording::{GpuCall, RecordingDevice};

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use thiserror::Error;

macro_rules! gpu_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u32);
        )*
    };
}

gpu_id!(
    BufferId,
    TextureId,
    FramebufferId,
    VertexArrayId,
    ShaderId,
    ProgramId,
);

/// Location returned by a uniform query. Only valid for the program it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
    CullFace,
    ScissorTest,
    PolygonOffsetFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    #[default]
    Back,
    Front,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    #[default]
    Texture2D,
    CubeMap,
    /// One face of a cube map, for image uploads and framebuffer attachment.
    CubeMapFace(CubeFace),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// In GL face order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Depth24,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferAttachment {
    Color0,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuErrorCode {
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    InvalidFramebufferOperation,
    OutOfMemory,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Integer rectangle used for viewport and scissor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const ZERO: Self = Self::new(0, 0, 0, 0);

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

/// What the driver reports it can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub instanced_arrays: bool,
    pub vertex_array_objects: bool,
    pub max_texture_units: u32,
    pub max_texture_size: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            instanced_arrays: true,
            vertex_array_objects: true,
            max_texture_units: 16,
            max_texture_size: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    #[error("{stage:?} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("program failed to link: {log}")]
    ProgramLink { log: String },
}

/// Primitive GPU calls. Every method is a side effect on the device owned by
/// the render thread; only compilation and linking report failure.
pub trait GpuDevice {
    fn capabilities(&self) -> DeviceCapabilities;

    /// Framebuffer the window system renders to. Not necessarily zero.
    fn default_framebuffer(&self) -> Option<FramebufferId> {
        None
    }

    fn get_error(&mut self) -> Option<GpuErrorCode>;

    // Fixed-function state
    fn enable(&mut self, capability: Capability);
    fn disable(&mut self, capability: Capability);
    fn clear_color(&mut self, color: Vec4);
    fn clear_depth(&mut self, depth: f32);
    fn clear_stencil(&mut self, value: i32);
    fn clear(&mut self, mask: ClearMask);
    fn color_mask(&mut self, write: bool);
    fn depth_mask(&mut self, write: bool);
    fn stencil_mask(&mut self, mask: u32);
    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32);
    fn stencil_op(&mut self, stencil_fail: StencilOp, depth_fail: StencilOp, depth_pass: StencilOp);
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn depth_func(&mut self, func: CompareFunc);
    fn cull_face(&mut self, face: CullFace);
    fn front_face(&mut self, winding: FrontFace);
    fn polygon_offset(&mut self, factor: f32, units: f32);
    fn viewport(&mut self, rect: Rect);
    fn scissor(&mut self, rect: Rect);

    // Bindings
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn active_texture(&mut self, unit: u32);
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureId>);
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>);
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);
    fn use_program(&mut self, program: Option<ProgramId>);

    // Buffers
    fn create_buffer(&mut self) -> BufferId;
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);
    fn delete_buffer(&mut self, buffer: BufferId);

    // Textures and framebuffers
    fn create_texture(&mut self) -> TextureId;
    fn texture_image_2d(
        &mut self,
        target: TextureTarget,
        format: TextureFormat,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    );
    fn delete_texture(&mut self, texture: TextureId);
    fn create_framebuffer(&mut self) -> FramebufferId;
    fn framebuffer_texture(
        &mut self,
        attachment: FramebufferAttachment,
        target: TextureTarget,
        texture: TextureId,
    );
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    // Vertex arrays
    fn create_vertex_array(&mut self) -> VertexArrayId;
    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);
    fn enable_vertex_attrib(&mut self, index: u32);
    fn disable_vertex_attrib(&mut self, index: u32);
    fn vertex_attrib_pointer(&mut self, index: u32, components: u32, stride: usize, offset: usize);
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);

    // Programs
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError>;
    fn delete_shader(&mut self, shader: ShaderId);
    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        attribute_bindings: &[(u32, &str)],
    ) -> Result<ProgramId, GpuError>;
    fn delete_program(&mut self, program: ProgramId);
    fn attribute_location(&mut self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn uniform(&mut self, location: UniformLocation, value: UniformValue);

    // Draws
    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32);
    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32);
    fn draw_arrays_instanced(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32);
    fn draw_elements_instanced(&mut self, mode: PrimitiveMode, count: u32, instances: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_aspect_ratio_guards_zero_height() {
        let rect = Rect::from_size(800, 0);
        assert!(rect.is_empty());
        assert_eq!(rect.aspect_ratio(), 800.0);
    }

    #[test]
    fn link_error_carries_driver_log() {
        let err = GpuError::ProgramLink {
            log: "undefined symbol u_model".into(),
        };
        assert!(err.to_string().contains("u_model"));
    }
}
