// renderer/context.rs
// State cache in front of the GPU device. Every setter compares against the
// last value it applied and skips the device call when nothing changes.
use std::collections::HashMap;

use glam::Vec4;
use log::{info, warn};

use crate::gpu::{
    BlendFactor, BufferId, BufferTarget, Capability, ClearMask, CompareFunc, CullFace,
    FramebufferId, FrontFace, GpuDevice, PrimitiveMode, ProgramId, Rect, StencilOp, TextureId,
    TextureTarget, VertexArrayId,
};
use crate::settings::RenderSettings;

use super::capabilities::RenderingCapabilities;
use super::framebuffer::FrameBuffer;
use super::state::{BlendMode, CullFaceMode, PassState, PolygonOffset, StencilState};
use super::texture::Texture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextureBinding {
    target: TextureTarget,
    id: TextureId,
}

/// Number of elements a draw consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    /// `u16` indices from the bound element buffer.
    Indexed(u32),
    Arrays(u32),
}

#[derive(Debug, Clone)]
struct CachedState {
    framebuffer: Option<FramebufferId>,
    viewport: Rect,
    scissor_enabled: bool,
    scissor: Rect,
    clear_color: Vec4,
    clear_depth: f32,
    clear_stencil: i32,
    color_mask: bool,
    depth_mask: bool,
    stencil_enabled: bool,
    stencil_write_mask: u32,
    stencil_ops: (StencilOp, StencilOp, StencilOp),
    stencil_func: (CompareFunc, i32, u32),
    blend_mode: BlendMode,
    blend_enabled: bool,
    blend_factors: (BlendFactor, BlendFactor),
    depth_test: bool,
    depth_func: CompareFunc,
    cull_face_enabled: bool,
    cull_face: CullFace,
    front_face: FrontFace,
    polygon_offset_enabled: bool,
    polygon_offset: (f32, f32),
    active_texture_unit: u32,
    textures: Vec<Option<TextureBinding>>,
    array_buffer: Option<BufferId>,
    // The element binding belongs to the bound vertex array; `None` is the default one.
    element_buffers: HashMap<Option<VertexArrayId>, BufferId>,
    vertex_array: Option<VertexArrayId>,
    program: Option<ProgramId>,
}

impl CachedState {
    fn defaults(
        texture_units: u32,
        framebuffer: Option<FramebufferId>,
        viewport: Rect,
        clear_color: Vec4,
    ) -> Self {
        let stencil = StencilState::default();
        Self {
            framebuffer,
            viewport,
            scissor_enabled: false,
            scissor: Rect::ZERO,
            clear_color,
            clear_depth: 1.0,
            clear_stencil: 0,
            color_mask: true,
            depth_mask: true,
            stencil_enabled: stencil.enabled,
            stencil_write_mask: stencil.write_mask,
            stencil_ops: (stencil.stencil_fail, stencil.depth_fail, stencil.depth_pass),
            stencil_func: (stencil.func, stencil.reference, stencil.compare_mask),
            blend_mode: BlendMode::None,
            blend_enabled: false,
            blend_factors: BlendMode::None.factors(),
            depth_test: false,
            depth_func: CompareFunc::Less,
            cull_face_enabled: false,
            cull_face: CullFace::Back,
            front_face: FrontFace::CounterClockwise,
            polygon_offset_enabled: false,
            polygon_offset: (0.0, 0.0),
            active_texture_unit: 0,
            textures: vec![None; texture_units as usize],
            array_buffer: None,
            element_buffers: HashMap::new(),
            vertex_array: None,
            program: None,
        }
    }
}

pub struct RenderingContext<D: GpuDevice> {
    device: D,
    capabilities: RenderingCapabilities,
    window_viewport: Rect,
    default_clear_color: Vec4,
    state: CachedState,
}

impl<D: GpuDevice> RenderingContext<D> {
    pub fn new(device: D, settings: &RenderSettings) -> Self {
        let capabilities = RenderingCapabilities::new(device.capabilities(), settings);
        let default_clear_color = Vec4::from_array(settings.clear_color);
        let state = CachedState::defaults(
            capabilities.max_texture_units,
            device.default_framebuffer(),
            Rect::ZERO,
            default_clear_color,
        );
        let mut context = Self {
            device,
            capabilities,
            window_viewport: Rect::ZERO,
            default_clear_color,
            state,
        };
        context.reset_cached_state();
        context
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn capabilities(&self) -> &RenderingCapabilities {
        &self.capabilities
    }

    /// Forgets everything cached and pushes known defaults to the device
    /// unconditionally. Call after the GPU context was lost or recreated.
    pub fn reset_cached_state(&mut self) {
        info!("Resetting cached rendering state");
        let default_framebuffer = self.device.default_framebuffer();
        self.state = CachedState::defaults(
            self.capabilities.max_texture_units,
            default_framebuffer,
            self.window_viewport,
            self.default_clear_color,
        );
        let state = self.state.clone();
        let device = &mut self.device;

        device.bind_framebuffer(state.framebuffer);
        device.viewport(state.viewport);
        device.disable(Capability::ScissorTest);
        device.clear_color(state.clear_color);
        device.clear_depth(state.clear_depth);
        device.clear_stencil(state.clear_stencil);
        device.color_mask(state.color_mask);
        device.depth_mask(state.depth_mask);
        device.stencil_mask(state.stencil_write_mask);
        device.disable(Capability::StencilTest);
        let (func, reference, mask) = state.stencil_func;
        device.stencil_func(func, reference, mask);
        let (stencil_fail, depth_fail, depth_pass) = state.stencil_ops;
        device.stencil_op(stencil_fail, depth_fail, depth_pass);
        device.disable(Capability::Blend);
        let (src, dst) = state.blend_factors;
        device.blend_func(src, dst);
        device.disable(Capability::DepthTest);
        device.depth_func(state.depth_func);
        device.disable(Capability::CullFace);
        device.cull_face(state.cull_face);
        device.front_face(state.front_face);
        device.disable(Capability::PolygonOffsetFill);
        device.polygon_offset(0.0, 0.0);

        // Walk down so unit 0 is the active one afterwards.
        for unit in (0..self.capabilities.max_texture_units).rev() {
            device.active_texture(unit);
            device.bind_texture(TextureTarget::Texture2D, None);
        }

        if self.capabilities.vertex_array_objects {
            device.bind_vertex_array(None);
        }
        device.bind_buffer(BufferTarget::Array, None);
        device.bind_buffer(BufferTarget::ElementArray, None);
        device.use_program(None);

        self.check_gpu_error("reset_cached_state");
    }

    // ------------------------------------------------------------------
    // Framebuffer and viewport
    // ------------------------------------------------------------------

    /// Size of the window surface, used whenever the default framebuffer is bound.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_viewport = Rect::from_size(width, height);
        if self.state.framebuffer == self.device.default_framebuffer() {
            self.set_viewport(self.window_viewport);
        }
    }

    pub fn window_viewport(&self) -> Rect {
        self.window_viewport
    }

    /// Binds `framebuffer`, or the window framebuffer for `None`, and fits the
    /// viewport to it. Returns false when the framebuffer is not ready yet.
    pub fn set_frame_buffer(&mut self, framebuffer: Option<&mut FrameBuffer>) -> bool {
        match framebuffer {
            Some(framebuffer) => {
                if !framebuffer.is_ready(self) {
                    return false;
                }
                let Some(id) = framebuffer.id() else {
                    return false;
                };
                self.bind_framebuffer_id(Some(id));
                self.set_viewport(framebuffer.viewport());
            }
            None => {
                let default = self.device.default_framebuffer();
                self.bind_framebuffer_id(default);
                self.set_viewport(self.window_viewport);
            }
        }
        true
    }

    pub(crate) fn bind_framebuffer_id(&mut self, framebuffer: Option<FramebufferId>) {
        if self.state.framebuffer != framebuffer {
            self.device.bind_framebuffer(framebuffer);
            self.state.framebuffer = framebuffer;
        }
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.state.framebuffer
    }

    pub fn set_viewport(&mut self, viewport: Rect) {
        if self.state.viewport != viewport {
            self.device.viewport(viewport);
            self.state.viewport = viewport;
        }
    }

    pub fn viewport(&self) -> Rect {
        self.state.viewport
    }

    /// `None` disables the scissor test.
    pub fn set_scissor(&mut self, scissor: Option<Rect>) {
        match scissor {
            Some(rect) => {
                self.set_capability(Capability::ScissorTest, true);
                if self.state.scissor != rect {
                    self.device.scissor(rect);
                    self.state.scissor = rect;
                }
            }
            None => self.set_capability(Capability::ScissorTest, false),
        }
    }

    // ------------------------------------------------------------------
    // Clearing
    // ------------------------------------------------------------------

    pub fn set_clear_color(&mut self, color: Vec4) {
        if self.state.clear_color != color {
            self.device.clear_color(color);
            self.state.clear_color = color;
        }
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        if self.state.clear_depth != depth {
            self.device.clear_depth(depth);
            self.state.clear_depth = depth;
        }
    }

    pub fn set_clear_stencil(&mut self, value: i32) {
        if self.state.clear_stencil != value {
            self.device.clear_stencil(value);
            self.state.clear_stencil = value;
        }
    }

    /// Clears the requested buffers. Write masks are opened first, otherwise
    /// the clear would be silently masked.
    pub fn clear_buffers(&mut self, color: bool, depth: bool, stencil: bool) {
        let mut mask = ClearMask::empty();
        if color {
            self.set_color_mask(true);
            mask |= ClearMask::COLOR;
        }
        if depth {
            self.set_depth_mask(true);
            mask |= ClearMask::DEPTH;
        }
        if stencil {
            self.set_stencil_mask(!0);
            mask |= ClearMask::STENCIL;
        }
        if !mask.is_empty() {
            self.device.clear(mask);
        }
    }

    // ------------------------------------------------------------------
    // Write masks, stencil, blend, depth, culling
    // ------------------------------------------------------------------

    pub fn set_color_mask(&mut self, write: bool) {
        if self.state.color_mask != write {
            self.device.color_mask(write);
            self.state.color_mask = write;
        }
    }

    pub fn set_depth_mask(&mut self, write: bool) {
        if self.state.depth_mask != write {
            self.device.depth_mask(write);
            self.state.depth_mask = write;
        }
    }

    pub fn set_stencil_mask(&mut self, mask: u32) {
        if self.state.stencil_write_mask != mask {
            self.device.stencil_mask(mask);
            self.state.stencil_write_mask = mask;
        }
    }

    /// Mask, ops and func are only pushed while the test is enabled.
    pub fn set_stencil_test(&mut self, stencil: &StencilState) {
        self.set_capability(Capability::StencilTest, stencil.enabled);
        if !stencil.enabled {
            return;
        }

        self.set_stencil_mask(stencil.write_mask);

        let ops = (stencil.stencil_fail, stencil.depth_fail, stencil.depth_pass);
        if self.state.stencil_ops != ops {
            self.device.stencil_op(ops.0, ops.1, ops.2);
            self.state.stencil_ops = ops;
        }

        let func = (stencil.func, stencil.reference, stencil.compare_mask);
        if self.state.stencil_func != func {
            self.device.stencil_func(func.0, func.1, func.2);
            self.state.stencil_func = func;
        }
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        if self.state.blend_mode == mode {
            return;
        }
        self.set_capability(Capability::Blend, mode.is_enabled());
        let factors = mode.factors();
        if self.state.blend_factors != factors {
            self.device.blend_func(factors.0, factors.1);
            self.state.blend_factors = factors;
        }
        self.state.blend_mode = mode;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.state.blend_mode
    }

    pub fn set_depth_test(&mut self, enable: bool) {
        self.set_capability(Capability::DepthTest, enable);
    }

    pub fn set_depth_func(&mut self, func: CompareFunc) {
        if self.state.depth_func != func {
            self.device.depth_func(func);
            self.state.depth_func = func;
        }
    }

    pub fn set_cull_face_mode(&mut self, mode: CullFaceMode) {
        match mode.face() {
            Some(face) => {
                self.set_capability(Capability::CullFace, true);
                if self.state.cull_face != face {
                    self.device.cull_face(face);
                    self.state.cull_face = face;
                }
            }
            None => self.set_capability(Capability::CullFace, false),
        }
    }

    pub fn set_front_face(&mut self, winding: FrontFace) {
        if self.state.front_face != winding {
            self.device.front_face(winding);
            self.state.front_face = winding;
        }
    }

    pub fn set_polygon_offset(&mut self, offset: Option<PolygonOffset>) {
        match offset {
            Some(offset) => {
                self.set_capability(Capability::PolygonOffsetFill, true);
                let values = (offset.factor, offset.units);
                if self.state.polygon_offset != values {
                    self.device.polygon_offset(values.0, values.1);
                    self.state.polygon_offset = values;
                }
            }
            None => self.set_capability(Capability::PolygonOffsetFill, false),
        }
    }

    fn set_capability(&mut self, capability: Capability, enable: bool) {
        let cached = match capability {
            Capability::Blend => &mut self.state.blend_enabled,
            Capability::DepthTest => &mut self.state.depth_test,
            Capability::StencilTest => &mut self.state.stencil_enabled,
            Capability::CullFace => &mut self.state.cull_face_enabled,
            Capability::ScissorTest => &mut self.state.scissor_enabled,
            Capability::PolygonOffsetFill => &mut self.state.polygon_offset_enabled,
        };
        if *cached == enable {
            return;
        }
        *cached = enable;
        if enable {
            self.device.enable(capability);
        } else {
            self.device.disable(capability);
        }
    }

    pub fn setup_pass(&mut self, pass: &PassState) {
        self.set_color_mask(pass.color_write);
        self.set_depth_mask(pass.depth_write);
        self.set_depth_test(pass.depth_test);
        self.set_depth_func(pass.depth_func);
        self.set_stencil_test(&pass.stencil);
        self.set_blend_mode(pass.blend_mode);
        self.set_polygon_offset(pass.polygon_offset);
        self.set_front_face(pass.front_face);
        self.set_cull_face_mode(pass.cull_face);
        self.check_gpu_error("setup_pass");
    }

    // ------------------------------------------------------------------
    // Textures
    // ------------------------------------------------------------------

    pub fn set_active_texture_unit(&mut self, unit: u32) {
        if self.state.active_texture_unit != unit {
            self.device.active_texture(unit);
            self.state.active_texture_unit = unit;
        }
    }

    pub fn active_texture_unit(&self) -> u32 {
        self.state.active_texture_unit
    }

    /// Binds a raw texture id to `unit`. The active unit only moves when the
    /// slot actually changes.
    pub fn bind_texture(
        &mut self,
        unit: u32,
        target: TextureTarget,
        texture: Option<TextureId>,
    ) -> bool {
        let Some(current) = self.state.textures.get(unit as usize).copied() else {
            warn!(
                "Texture unit {} out of range ({} available)",
                unit, self.capabilities.max_texture_units
            );
            return false;
        };

        let wanted = texture.map(|id| TextureBinding { target, id });
        if current == wanted {
            return true;
        }

        self.set_active_texture_unit(unit);
        let bind_target = match (wanted, current) {
            (Some(binding), _) | (None, Some(binding)) => binding.target,
            (None, None) => target,
        };
        self.device.bind_texture(bind_target, texture);
        self.state.textures[unit as usize] = wanted;
        true
    }

    /// Binds `texture` to `unit`, uploading it first if needed. A texture
    /// that is not ready leaves the unit empty and returns false.
    pub fn set_texture(&mut self, unit: u32, texture: Option<&mut Texture>) -> bool {
        match texture {
            Some(texture) => {
                if !texture.is_ready(self) {
                    self.bind_texture(unit, texture.target(), None);
                    return false;
                }
                self.bind_texture(unit, texture.target(), texture.id())
            }
            None => self.bind_texture(unit, TextureTarget::Texture2D, None),
        }
    }

    pub fn texture_at(&self, unit: u32) -> Option<TextureId> {
        self.state
            .textures
            .get(unit as usize)
            .copied()
            .flatten()
            .map(|binding| binding.id)
    }

    // ------------------------------------------------------------------
    // Buffers, vertex arrays, programs
    // ------------------------------------------------------------------

    pub fn set_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        match target {
            BufferTarget::Array => {
                if self.state.array_buffer != buffer {
                    self.device.bind_buffer(target, buffer);
                    self.state.array_buffer = buffer;
                }
            }
            BufferTarget::ElementArray => {
                let key = self.state.vertex_array;
                if self.state.element_buffers.get(&key).copied() != buffer {
                    self.device.bind_buffer(target, buffer);
                    match buffer {
                        Some(id) => self.state.element_buffers.insert(key, id),
                        None => self.state.element_buffers.remove(&key),
                    };
                }
            }
        }
    }

    pub fn set_vertex_buffer(&mut self, buffer: Option<BufferId>) {
        self.set_buffer(BufferTarget::Array, buffer);
    }

    pub fn set_index_buffer(&mut self, buffer: Option<BufferId>) {
        self.set_buffer(BufferTarget::ElementArray, buffer);
    }

    /// Instance data lives behind the array-buffer binding point.
    pub fn set_instance_buffer(&mut self, buffer: Option<BufferId>) {
        self.set_buffer(BufferTarget::Array, buffer);
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.state.array_buffer
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.state
            .element_buffers
            .get(&self.state.vertex_array)
            .copied()
    }

    pub fn set_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        if self.state.vertex_array != vertex_array {
            debug_assert!(
                vertex_array.is_none() || self.capabilities.vertex_array_objects,
                "vertex array bound without device support"
            );
            self.device.bind_vertex_array(vertex_array);
            self.state.vertex_array = vertex_array;
        }
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.state.vertex_array
    }

    /// Returns true when the active program changed.
    pub fn set_program(&mut self, program: Option<ProgramId>) -> bool {
        if self.state.program == program {
            return false;
        }
        self.device.use_program(program);
        self.state.program = program;
        true
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.state.program
    }

    // ------------------------------------------------------------------
    // Deletion keeps the cache in step with what the driver unbinds.
    // ------------------------------------------------------------------

    pub(crate) fn delete_buffer(&mut self, buffer: BufferId) {
        self.device.delete_buffer(buffer);
        if self.state.array_buffer == Some(buffer) {
            self.state.array_buffer = None;
        }
        self.state.element_buffers.retain(|_, bound| *bound != buffer);
    }

    pub(crate) fn delete_texture(&mut self, texture: TextureId) {
        self.device.delete_texture(texture);
        for slot in self.state.textures.iter_mut() {
            if slot.is_some_and(|binding| binding.id == texture) {
                *slot = None;
            }
        }
    }

    pub(crate) fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.device.delete_framebuffer(framebuffer);
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    pub(crate) fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.device.delete_vertex_array(vertex_array);
        if self.state.vertex_array == Some(vertex_array) {
            self.state.vertex_array = None;
        }
        self.state.element_buffers.remove(&Some(vertex_array));
    }

    pub(crate) fn delete_program(&mut self, program: ProgramId) {
        if self.state.program == Some(program) {
            self.set_program(None);
        }
        self.device.delete_program(program);
    }

    // ------------------------------------------------------------------
    // Draws
    // ------------------------------------------------------------------

    pub fn draw(&mut self, mode: PrimitiveMode, range: DrawRange) {
        match range {
            DrawRange::Indexed(count) => self.device.draw_elements(mode, count),
            DrawRange::Arrays(count) => self.device.draw_arrays(mode, 0, count),
        }
    }

    pub fn draw_instanced(&mut self, mode: PrimitiveMode, range: DrawRange, instances: u32) {
        debug_assert!(self.capabilities.instanced_arrays);
        match range {
            DrawRange::Indexed(count) => {
                self.device.draw_elements_instanced(mode, count, instances)
            }
            DrawRange::Arrays(count) => {
                self.device.draw_arrays_instanced(mode, 0, count, instances)
            }
        }
    }

    /// Queries the device error flag in debug builds and treats a set flag
    /// as a programming error.
    #[cfg(debug_assertions)]
    pub fn check_gpu_error(&mut self, operation: &str) {
        if let Some(code) = self.device.get_error() {
            log::error!("GPU error {:?} after {}", code, operation);
            debug_assert!(false, "GPU error {code:?} after {operation}");
        } else {
            log::trace!("{} ok", operation);
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn check_gpu_error(&mut self, _operation: &str) {}
}
