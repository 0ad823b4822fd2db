// renderer/pass.rs
use crate::gpu::CompareFunc;

use super::state::{BlendMode, CullFaceMode, PassState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassType {
    /// Ambient, unlit and emissive contributions.
    #[default]
    Default,
    /// One additive draw per light.
    Lit,
    /// Into a shadow map: depth only, or light distance for cube faces.
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pass {
    pub pass_type: PassType,
    pub state: PassState,
}

impl Pass {
    pub fn new(pass_type: PassType, state: PassState) -> Self {
        Self { pass_type, state }
    }

    pub fn shadow() -> Self {
        Self::new(
            PassType::Shadow,
            PassState::default()
                .without_color_write()
                .with_cull_face(CullFaceMode::Front),
        )
    }

    /// Point light faces keep the light distance in the color target.
    pub fn cube_shadow() -> Self {
        Self::new(
            PassType::Shadow,
            PassState::default().with_cull_face(CullFaceMode::Front),
        )
    }
}

impl Default for Pass {
    fn default() -> Self {
        Self::new(PassType::Default, PassState::default())
    }
}

/// Ordered passes a material is drawn with.
#[derive(Debug, Clone, PartialEq)]
pub struct Technique {
    passes: Vec<Pass>,
}

impl Technique {
    pub fn new(passes: Vec<Pass>) -> Self {
        Self { passes }
    }

    pub fn single(pass: Pass) -> Self {
        Self::new(vec![pass])
    }

    /// Ambient pass followed by an additive pass per light.
    pub fn lit() -> Self {
        let light_pass = PassState::default()
            .with_blend_mode(BlendMode::Additive)
            .with_depth(true, false, CompareFunc::LessEqual);
        Self::new(vec![Pass::default(), Pass::new(PassType::Lit, light_pass)])
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.passes.push(pass);
    }
}

impl Default for Technique {
    fn default() -> Self {
        Self::single(Pass::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lit_technique_adds_light_pass_after_ambient() {
        let technique = Technique::lit();
        let kinds: Vec<PassType> = technique.passes().iter().map(|p| p.pass_type).collect();
        assert_eq!(kinds, vec![PassType::Default, PassType::Lit]);
        assert_eq!(technique.passes()[1].state.blend_mode, BlendMode::Additive);
        assert!(!technique.passes()[1].state.depth_write);
    }

    #[test]
    fn shadow_pass_writes_depth_only() {
        let pass = Pass::shadow();
        assert!(!pass.state.color_write);
        assert!(pass.state.depth_write);
        assert!(Pass::cube_shadow().state.color_write);
    }
}
