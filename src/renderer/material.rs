// renderer/material.rs
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec4;

use crate::asset::{AssetCache, Handle};
use crate::gpu::GpuDevice;

use super::context::RenderingContext;
use super::pass::Technique;
use super::resource::next_revision;
use super::state::{BlendMode, CullFaceMode};
use super::texture::Texture;

/// Texture unit assignment. Every program samples slot `n` from
/// `u_texture{n}`, so units never change after link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    Diffuse = 0,
    Normal = 1,
    Specular = 2,
    LightMap = 3,
    AmbientOcclusion = 4,
    Displacement = 5,
    ShadowMap0 = 6,
    ShadowMap1 = 7,
    ShadowMap2 = 8,
    ShadowMap3 = 9,
}

impl TextureSlot {
    pub const COUNT: usize = 10;
    pub const MATERIAL_COUNT: usize = 6;

    /// Slots a material can fill; shadow slots belong to the renderer.
    pub const MATERIAL: [TextureSlot; Self::MATERIAL_COUNT] = [
        TextureSlot::Diffuse,
        TextureSlot::Normal,
        TextureSlot::Specular,
        TextureSlot::LightMap,
        TextureSlot::AmbientOcclusion,
        TextureSlot::Displacement,
    ];

    pub const SHADOW_MAPS: [TextureSlot; 4] = [
        TextureSlot::ShadowMap0,
        TextureSlot::ShadowMap1,
        TextureSlot::ShadowMap2,
        TextureSlot::ShadowMap3,
    ];

    pub const fn unit(self) -> u32 {
        self as u32
    }

    pub fn shadow_map(split: usize) -> Option<Self> {
        Self::SHADOW_MAPS.get(split).copied()
    }
}

/// A texture reference plus how the shader reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialTexture {
    pub texture: Handle<Texture>,
    /// Which vertex UV set to sample with (0 or 1).
    pub uv_channel: u32,
    /// Channels the shader should read (1..=4).
    pub channels: u32,
    pub use_alpha: bool,
}

impl MaterialTexture {
    pub fn new(texture: Handle<Texture>) -> Self {
        Self {
            texture,
            uv_channel: 0,
            channels: 3,
            use_alpha: false,
        }
    }

    pub fn with_uv_channel(mut self, channel: u32) -> Self {
        self.uv_channel = channel.min(1);
        self
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels.clamp(1, 4);
        self
    }

    pub fn with_alpha(mut self) -> Self {
        self.use_alpha = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

/// Shading model. Selects the base shader define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderKind {
    #[default]
    Lit,
    Unlit,
    VertexColor,
    Text,
    ShowTexture0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BillboardType {
    #[default]
    None,
    Spherical,
    Cylindrical,
    CylindricalZ,
}

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Surface description. Every setter bumps the version so programs re-upload
/// material uniforms only after an actual change.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    id: u64,
    name: String,
    color: Vec4,
    ambient: Vec4,
    diffuse: Vec4,
    specular: Vec4,
    shininess: f32,
    blend_mode: BlendMode,
    cull_face: CullFaceMode,
    fill_mode: FillMode,
    render_kind: RenderKind,
    billboard: BillboardType,
    receive_shadows: bool,
    cast_shadows: bool,
    flip_y: bool,
    textures: [Option<MaterialTexture>; TextureSlot::MATERIAL_COUNT],
    technique: Technique,
    version: u64,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            color: Vec4::ONE,
            ambient: Vec4::new(0.3, 0.3, 0.3, 1.0),
            diffuse: Vec4::ONE,
            specular: Vec4::ONE,
            shininess: 32.0,
            blend_mode: BlendMode::None,
            cull_face: CullFaceMode::Back,
            fill_mode: FillMode::Solid,
            render_kind: RenderKind::Lit,
            billboard: BillboardType::None,
            receive_shadows: true,
            cast_shadows: true,
            flip_y: false,
            textures: [None; TextureSlot::MATERIAL_COUNT],
            technique: Technique::default(),
            version: next_revision(),
        }
    }

    /// Ambient plus per-light passes.
    pub fn lit(name: impl Into<String>) -> Self {
        Self::new(name).with_technique(Technique::lit())
    }

    pub fn unlit(name: impl Into<String>, color: Vec4) -> Self {
        Self::new(name)
            .with_render_kind(RenderKind::Unlit)
            .with_color(color)
    }

    // ---- builders ----

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.set_color(color);
        self
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.set_blend_mode(mode);
        self
    }

    pub fn with_cull_face(mut self, mode: CullFaceMode) -> Self {
        self.set_cull_face(mode);
        self
    }

    pub fn with_fill_mode(mut self, mode: FillMode) -> Self {
        self.set_fill_mode(mode);
        self
    }

    pub fn with_render_kind(mut self, kind: RenderKind) -> Self {
        self.render_kind = kind;
        self.touch();
        self
    }

    pub fn with_billboard(mut self, billboard: BillboardType) -> Self {
        self.billboard = billboard;
        self.touch();
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, texture: MaterialTexture) -> Self {
        self.set_texture(slot, Some(texture));
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.technique = technique;
        self.touch();
        self
    }

    pub fn with_flip_y(mut self) -> Self {
        self.flip_y = true;
        self.touch();
        self
    }

    pub fn without_shadows(mut self) -> Self {
        self.receive_shadows = false;
        self.touch();
        self
    }

    /// Keeps nodes with this material out of every shadow map.
    pub fn without_shadow_casting(mut self) -> Self {
        self.set_cast_shadows(false);
        self
    }

    pub fn set_cast_shadows(&mut self, enabled: bool) {
        self.cast_shadows = enabled;
        self.touch();
    }

    // ---- setters ----

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
        self.touch();
    }

    pub fn set_lighting(&mut self, ambient: Vec4, diffuse: Vec4, specular: Vec4, shininess: f32) {
        self.ambient = ambient;
        self.diffuse = diffuse;
        self.specular = specular;
        self.shininess = shininess;
        self.touch();
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
        self.touch();
    }

    pub fn set_cull_face(&mut self, mode: CullFaceMode) {
        self.cull_face = mode;
        self.touch();
    }

    pub fn set_fill_mode(&mut self, mode: FillMode) {
        self.fill_mode = mode;
        self.touch();
    }

    /// Shadow slots are ignored; the renderer owns them.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<MaterialTexture>) {
        if let Some(entry) = self.textures.get_mut(slot.unit() as usize) {
            *entry = texture;
            self.touch();
        }
    }

    // ---- getters ----

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique per constructed material; clones keep it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn color(&self) -> Vec4 {
        self.color
    }

    pub fn ambient(&self) -> Vec4 {
        self.ambient
    }

    pub fn diffuse(&self) -> Vec4 {
        self.diffuse
    }

    pub fn specular(&self) -> Vec4 {
        self.specular
    }

    pub fn shininess(&self) -> f32 {
        self.shininess
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn cull_face(&self) -> CullFaceMode {
        self.cull_face
    }

    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    pub fn is_solid(&self) -> bool {
        self.fill_mode == FillMode::Solid
    }

    pub fn render_kind(&self) -> RenderKind {
        self.render_kind
    }

    pub fn billboard(&self) -> BillboardType {
        self.billboard
    }

    pub fn receives_shadows(&self) -> bool {
        self.receive_shadows
    }

    pub fn casts_shadows(&self) -> bool {
        self.cast_shadows
    }

    pub fn flip_y(&self) -> bool {
        self.flip_y
    }

    pub fn technique(&self) -> &Technique {
        &self.technique
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<MaterialTexture> {
        self.textures.get(slot.unit() as usize).copied().flatten()
    }

    /// Filled slots in unit order.
    pub fn textures(&self) -> impl Iterator<Item = (TextureSlot, MaterialTexture)> + '_ {
        TextureSlot::MATERIAL
            .iter()
            .filter_map(move |&slot| self.texture(slot).map(|texture| (slot, texture)))
    }

    /// True once every referenced texture is on the GPU. Uploads textures
    /// that finished loading; a missing handle keeps the material not ready.
    pub fn is_ready<D: GpuDevice>(
        &self,
        context: &mut RenderingContext<D>,
        textures: &mut AssetCache<Texture>,
    ) -> bool {
        let mut ready = true;
        for (_, entry) in self.textures() {
            ready &= textures
                .get_mut(entry.texture)
                .is_some_and(|texture| texture.is_ready(context));
        }
        ready
    }

    /// Binds every texture to its slot's unit. Call after `is_ready`.
    pub fn bind_textures<D: GpuDevice>(
        &self,
        context: &mut RenderingContext<D>,
        textures: &mut AssetCache<Texture>,
    ) {
        for (slot, entry) in self.textures() {
            context.set_texture(slot.unit(), textures.get_mut(entry.texture));
        }
    }

    fn touch(&mut self) {
        self.version = next_revision();
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}
