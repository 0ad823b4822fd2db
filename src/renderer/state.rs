// renderer/state.rs
// Fixed-function state values the rendering context caches.
use crate::gpu::{BlendFactor, CompareFunc, CullFace, FrontFace, StencilOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    None,
    Alpha,
    Additive,
    Multiplicative,
}

impl BlendMode {
    pub const fn factors(self) -> (BlendFactor, BlendFactor) {
        match self {
            BlendMode::None => (BlendFactor::One, BlendFactor::Zero),
            BlendMode::Alpha => (BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha),
            BlendMode::Additive => (BlendFactor::One, BlendFactor::One),
            BlendMode::Multiplicative => (BlendFactor::Zero, BlendFactor::SrcColor),
        }
    }

    pub const fn is_enabled(self) -> bool {
        !matches!(self, BlendMode::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFaceMode {
    #[default]
    Disabled,
    Back,
    Front,
    FrontAndBack,
}

impl CullFaceMode {
    pub const fn face(self) -> Option<CullFace> {
        match self {
            CullFaceMode::Disabled => None,
            CullFaceMode::Back => Some(CullFace::Back),
            CullFaceMode::Front => Some(CullFace::Front),
            CullFaceMode::FrontAndBack => Some(CullFace::FrontAndBack),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub enabled: bool,
    pub write_mask: u32,
    pub stencil_fail: StencilOp,
    pub depth_fail: StencilOp,
    pub depth_pass: StencilOp,
    pub func: CompareFunc,
    pub reference: i32,
    pub compare_mask: u32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            write_mask: !0,
            stencil_fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            depth_pass: StencilOp::Keep,
            func: CompareFunc::Always,
            reference: 0,
            compare_mask: !0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

/// Everything a pass sets before drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassState {
    pub blend_mode: BlendMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunc,
    pub color_write: bool,
    pub stencil: StencilState,
    pub cull_face: CullFaceMode,
    pub front_face: FrontFace,
    pub polygon_offset: Option<PolygonOffset>,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            blend_mode: BlendMode::None,
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunc::Less,
            color_write: true,
            stencil: StencilState::default(),
            cull_face: CullFaceMode::Back,
            front_face: FrontFace::CounterClockwise,
            polygon_offset: None,
        }
    }
}

impl PassState {
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool, func: CompareFunc) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_func = func;
        self
    }

    pub fn with_cull_face(mut self, cull_face: CullFaceMode) -> Self {
        self.cull_face = cull_face;
        self
    }

    pub fn with_stencil(mut self, stencil: StencilState) -> Self {
        self.stencil = stencil;
        self
    }

    pub fn with_polygon_offset(mut self, factor: f32, units: f32) -> Self {
        self.polygon_offset = Some(PolygonOffset { factor, units });
        self
    }

    pub fn without_color_write(mut self) -> Self {
        self.color_write = false;
        self
    }
}
