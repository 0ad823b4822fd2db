// gpu/recording.rs
// Device that records every call instead of talking to a driver. Used by the
// headless binary and by tests that count GPU calls.
use std::collections::HashMap;

use glam::Vec4;

use super::{
    BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, ClearMask, CompareFunc,
    CullFace, DeviceCapabilities, FramebufferAttachment, FramebufferId, FrontFace, GpuDevice,
    GpuError, GpuErrorCode, PrimitiveMode, ProgramId, Rect, ShaderId, ShaderStage, StencilOp,
    TextureFormat, TextureId, TextureTarget, UniformLocation, UniformValue, VertexArrayId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    Enable(Capability),
    Disable(Capability),
    ClearColor(Vec4),
    ClearDepth(f32),
    ClearStencil(i32),
    Clear(ClearMask),
    ColorMask(bool),
    DepthMask(bool),
    StencilMask(u32),
    StencilFunc(CompareFunc, i32, u32),
    StencilOp(StencilOp, StencilOp, StencilOp),
    BlendFunc(BlendFactor, BlendFactor),
    DepthFunc(CompareFunc),
    CullFace(CullFace),
    FrontFace(FrontFace),
    PolygonOffset(f32, f32),
    Viewport(Rect),
    Scissor(Rect),
    BindFramebuffer(Option<FramebufferId>),
    ActiveTexture(u32),
    BindTexture(TextureTarget, Option<TextureId>),
    BindBuffer(BufferTarget, Option<BufferId>),
    BindVertexArray(Option<VertexArrayId>),
    UseProgram(Option<ProgramId>),
    CreateBuffer(BufferId),
    BufferData(BufferTarget, usize, BufferUsage),
    BufferSubData(BufferTarget, usize, usize),
    DeleteBuffer(BufferId),
    CreateTexture(TextureId),
    TextureImage2d(TextureTarget, TextureFormat, u32, u32),
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    FramebufferTexture(FramebufferAttachment, TextureTarget, TextureId),
    DeleteFramebuffer(FramebufferId),
    CreateVertexArray(VertexArrayId),
    DeleteVertexArray(VertexArrayId),
    EnableVertexAttrib(u32),
    DisableVertexAttrib(u32),
    VertexAttribPointer(u32, u32, usize, usize),
    VertexAttribDivisor(u32, u32),
    CompileShader(ShaderStage, ShaderId),
    DeleteShader(ShaderId),
    LinkProgram(ProgramId),
    LinkFailed,
    DeleteProgram(ProgramId),
    Uniform(UniformLocation, UniformValue),
    DrawArrays(PrimitiveMode, u32, u32),
    DrawElements(PrimitiveMode, u32),
    DrawArraysInstanced(PrimitiveMode, u32, u32, u32),
    DrawElementsInstanced(PrimitiveMode, u32, u32),
}

impl GpuCall {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            GpuCall::DrawArrays(..)
                | GpuCall::DrawElements(..)
                | GpuCall::DrawArraysInstanced(..)
                | GpuCall::DrawElementsInstanced(..)
        )
    }
}

pub struct RecordingDevice {
    capabilities: DeviceCapabilities,
    calls: Vec<GpuCall>,
    next_id: u32,
    shader_sources: HashMap<u32, String>,
    program_attributes: HashMap<u32, Vec<(u32, String)>>,
    uniform_locations: HashMap<(u32, String), UniformLocation>,
    link_failure_marker: Option<String>,
    pending_error: Option<GpuErrorCode>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::default())
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            calls: Vec::new(),
            next_id: 1,
            shader_sources: HashMap::new(),
            program_attributes: HashMap::new(),
            uniform_locations: HashMap::new(),
            link_failure_marker: None,
            pending_error: None,
        }
    }

    /// Any program whose shader sources contain `marker` fails to link.
    pub fn fail_links_containing(&mut self, marker: impl Into<String>) {
        self.link_failure_marker = Some(marker.into());
    }

    pub fn inject_error(&mut self, code: GpuErrorCode) {
        self.pending_error = Some(code);
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn draw_calls(&self) -> usize {
        self.count(GpuCall::is_draw)
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, call: GpuCall) {
        self.calls.push(call);
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for RecordingDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn get_error(&mut self) -> Option<GpuErrorCode> {
        self.pending_error.take()
    }

    fn enable(&mut self, capability: Capability) {
        self.record(GpuCall::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.record(GpuCall::Disable(capability));
    }

    fn clear_color(&mut self, color: Vec4) {
        self.record(GpuCall::ClearColor(color));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.record(GpuCall::ClearDepth(depth));
    }

    fn clear_stencil(&mut self, value: i32) {
        self.record(GpuCall::ClearStencil(value));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.record(GpuCall::Clear(mask));
    }

    fn color_mask(&mut self, write: bool) {
        self.record(GpuCall::ColorMask(write));
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(GpuCall::DepthMask(write));
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record(GpuCall::StencilMask(mask));
    }

    fn stencil_func(&mut self, func: CompareFunc, reference: i32, mask: u32) {
        self.record(GpuCall::StencilFunc(func, reference, mask));
    }

    fn stencil_op(&mut self, stencil_fail: StencilOp, depth_fail: StencilOp, depth_pass: StencilOp) {
        self.record(GpuCall::StencilOp(stencil_fail, depth_fail, depth_pass));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.record(GpuCall::BlendFunc(src, dst));
    }

    fn depth_func(&mut self, func: CompareFunc) {
        self.record(GpuCall::DepthFunc(func));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.record(GpuCall::CullFace(face));
    }

    fn front_face(&mut self, winding: FrontFace) {
        self.record(GpuCall::FrontFace(winding));
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(GpuCall::PolygonOffset(factor, units));
    }

    fn viewport(&mut self, rect: Rect) {
        self.record(GpuCall::Viewport(rect));
    }

    fn scissor(&mut self, rect: Rect) {
        self.record(GpuCall::Scissor(rect));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.record(GpuCall::BindFramebuffer(framebuffer));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(GpuCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureId>) {
        self.record(GpuCall::BindTexture(target, texture));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        self.record(GpuCall::BindBuffer(target, buffer));
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.record(GpuCall::BindVertexArray(vertex_array));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.record(GpuCall::UseProgram(program));
    }

    fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next());
        self.record(GpuCall::CreateBuffer(id));
        id
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.record(GpuCall::BufferData(target, data.len(), usage));
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        self.record(GpuCall::BufferSubData(target, offset, data.len()));
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.record(GpuCall::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.next());
        self.record(GpuCall::CreateTexture(id));
        id
    }

    fn texture_image_2d(
        &mut self,
        target: TextureTarget,
        format: TextureFormat,
        width: u32,
        height: u32,
        _pixels: Option<&[u8]>,
    ) {
        self.record(GpuCall::TextureImage2d(target, format, width, height));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.record(GpuCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let id = FramebufferId(self.next());
        self.record(GpuCall::CreateFramebuffer(id));
        id
    }

    fn framebuffer_texture(
        &mut self,
        attachment: FramebufferAttachment,
        target: TextureTarget,
        texture: TextureId,
    ) {
        self.record(GpuCall::FramebufferTexture(attachment, target, texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.record(GpuCall::DeleteFramebuffer(framebuffer));
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.next());
        self.record(GpuCall::CreateVertexArray(id));
        id
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.record(GpuCall::DeleteVertexArray(vertex_array));
    }

    fn enable_vertex_attrib(&mut self, index: u32) {
        self.record(GpuCall::EnableVertexAttrib(index));
    }

    fn disable_vertex_attrib(&mut self, index: u32) {
        self.record(GpuCall::DisableVertexAttrib(index));
    }

    fn vertex_attrib_pointer(&mut self, index: u32, components: u32, stride: usize, offset: usize) {
        self.record(GpuCall::VertexAttribPointer(index, components, stride, offset));
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record(GpuCall::VertexAttribDivisor(index, divisor));
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, GpuError> {
        let id = ShaderId(self.next());
        self.shader_sources.insert(id.0, source.to_owned());
        self.record(GpuCall::CompileShader(stage, id));
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shader_sources.remove(&shader.0);
        self.record(GpuCall::DeleteShader(shader));
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        attribute_bindings: &[(u32, &str)],
    ) -> Result<ProgramId, GpuError> {
        if let Some(marker) = self.link_failure_marker.clone() {
            let poisoned = [vertex, fragment].iter().any(|shader| {
                self.shader_sources
                    .get(&shader.0)
                    .is_some_and(|source| source.contains(marker.as_str()))
            });
            if poisoned {
                self.record(GpuCall::LinkFailed);
                return Err(GpuError::ProgramLink {
                    log: format!("sources contain unresolved symbol '{marker}'"),
                });
            }
        }

        let id = ProgramId(self.next());
        self.program_attributes.insert(
            id.0,
            attribute_bindings
                .iter()
                .map(|(index, name)| (*index, (*name).to_owned()))
                .collect(),
        );
        self.record(GpuCall::LinkProgram(id));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.program_attributes.remove(&program.0);
        self.uniform_locations.retain(|(owner, _), _| *owner != program.0);
        self.record(GpuCall::DeleteProgram(program));
    }

    fn attribute_location(&mut self, program: ProgramId, name: &str) -> Option<u32> {
        self.program_attributes
            .get(&program.0)?
            .iter()
            .find(|(_, bound)| bound == name)
            .map(|(index, _)| *index)
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if !self.program_attributes.contains_key(&program.0) {
            return None;
        }
        let next = self.uniform_locations.len() as i32;
        Some(
            *self
                .uniform_locations
                .entry((program.0, name.to_owned()))
                .or_insert(UniformLocation(next)),
        )
    }

    fn uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.record(GpuCall::Uniform(location, value));
    }

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32) {
        self.record(GpuCall::DrawArrays(mode, first, count));
    }

    fn draw_elements(&mut self, mode: PrimitiveMode, count: u32) {
        self.record(GpuCall::DrawElements(mode, count));
    }

    fn draw_arrays_instanced(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32) {
        self.record(GpuCall::DrawArraysInstanced(mode, first, count, instances));
    }

    fn draw_elements_instanced(&mut self, mode: PrimitiveMode, count: u32, instances: u32) {
        self.record(GpuCall::DrawElementsInstanced(mode, count, instances));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let mut device = RecordingDevice::new();
        let a = device.create_buffer();
        let b = device.create_buffer();
        device.delete_buffer(a);
        let c = device.create_buffer();
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn link_fails_when_marker_present() {
        let mut device = RecordingDevice::new();
        device.fail_links_containing("BROKEN");
        let vs = device.compile_shader(ShaderStage::Vertex, "#define BROKEN\n").unwrap();
        let fs = device.compile_shader(ShaderStage::Fragment, "void main() {}").unwrap();
        assert!(device.link_program(vs, fs, &[]).is_err());
        assert_eq!(device.count(|c| matches!(c, GpuCall::LinkFailed)), 1);
    }

    #[test]
    fn attribute_locations_follow_bindings() {
        let mut device = RecordingDevice::new();
        let vs = device.compile_shader(ShaderStage::Vertex, "").unwrap();
        let fs = device.compile_shader(ShaderStage::Fragment, "").unwrap();
        let program = device.link_program(vs, fs, &[(3, "a_texcoord1")]).unwrap();
        assert_eq!(device.attribute_location(program, "a_texcoord1"), Some(3));
        assert_eq!(device.attribute_location(program, "a_color"), None);
    }

    #[test]
    fn injected_error_is_reported_once() {
        let mut device = RecordingDevice::new();
        device.inject_error(GpuErrorCode::InvalidOperation);
        assert_eq!(device.get_error(), Some(GpuErrorCode::InvalidOperation));
        assert_eq!(device.get_error(), None);
    }
}
