// renderer/program.rs
// Linked shader variants, interned by their define block.
use std::collections::HashMap;

use glam::{Mat4, Vec3, Vec4};
use hecs::Entity;
use log::{debug, error, info};
use slotmap::{new_key_type, SlotMap};

use crate::gpu::{
    GpuDevice, GpuError, ProgramId, ShaderStage, UniformLocation, UniformValue,
};
use crate::scene::components::{Armature, WorldTransform};

use super::context::RenderingContext;
use super::light::{Light, LightType};
use super::material::{Material, TextureSlot};
use super::resource::{GpuResource, ResourceState};
use super::vertex::AttributeLocation;

const COMMON_SOURCE: &str = include_str!("../../shader/common.glsl");
const VERTEX_SOURCE: &str = include_str!("../../shader/program.vert");
const FRAGMENT_SOURCE: &str = include_str!("../../shader/program.frag");

/// Shadow split matrices a lit program can receive.
pub const MAX_SHADOW_SPLITS: usize = 4;

new_key_type! {
    /// Stable identity of an interned program.
    pub struct ProgramKey;
}

/// Camera-like view the program uploads per draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub eye: Vec3,
    /// `None` uploads on every draw.
    pub key: Option<ViewKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewKey {
    pub camera: u64,
    pub version: u64,
    pub aspect_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneUniforms {
    pub id: u64,
    pub version: u64,
    pub ambient: Vec4,
}

/// Per-split light matrices for a shadowed lit pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowUniforms<'a> {
    pub view_projections: &'a [Mat4],
    pub split_distances: Vec4,
    pub bias: f32,
}

/// What each consumer last uploaded, as (identity, version). Entities are
/// only unique within their world, so node stamps carry the scene id.
#[derive(Debug, Default, Clone)]
struct UniformStamps {
    scene: Option<(u64, u64)>,
    view: Option<ViewKey>,
    node: Option<(u64, Entity, u64)>,
    material: Option<(u64, u64)>,
    light: Option<(u64, u64)>,
    bones: Option<(u64, Entity, u64)>,
}

#[derive(Debug, Default, Clone, Copy)]
struct LightLocations {
    diffuse: Option<UniformLocation>,
    specular: Option<UniformLocation>,
    position: Option<UniformLocation>,
    direction: Option<UniformLocation>,
    cut_off: Option<UniformLocation>,
    inv_range: Option<UniformLocation>,
}

impl LightLocations {
    fn locate<D: GpuDevice>(device: &mut D, program: ProgramId, prefix: &str) -> Self {
        let mut find = |field: &str| device.uniform_location(program, &format!("{prefix}.{field}"));
        Self {
            diffuse: find("base.diffuse"),
            specular: find("base.specular"),
            position: find("position"),
            direction: find("direction"),
            cut_off: find("cutOff"),
            inv_range: find("invRange"),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct UniformLocations {
    model: Option<UniformLocation>,
    normal_matrix: Option<UniformLocation>,
    view: Option<UniformLocation>,
    view_projection: Option<UniformLocation>,
    projection: Option<UniformLocation>,
    scene_ambient: Option<UniformLocation>,
    eye_world_pos: Option<UniformLocation>,
    color: Option<UniformLocation>,
    ambient: Option<UniformLocation>,
    diffuse: Option<UniformLocation>,
    specular: Option<UniformLocation>,
    shininess: Option<UniformLocation>,
    directional: LightLocations,
    point: LightLocations,
    spot: LightLocations,
    light_view_projection: [Option<UniformLocation>; MAX_SHADOW_SPLITS],
    shadow_splits: Option<UniformLocation>,
    shadow_bias: Option<UniformLocation>,
    bones: Vec<Option<UniformLocation>>,
}

impl UniformLocations {
    fn locate<D: GpuDevice>(device: &mut D, program: ProgramId, bones: usize) -> Self {
        let mut find = |name: &str| device.uniform_location(program, name);
        let mut locations = Self {
            model: find("u_model"),
            normal_matrix: find("u_normalMatrix"),
            view: find("u_view"),
            view_projection: find("u_viewProjection"),
            projection: find("u_projection"),
            scene_ambient: find("u_sceneAmbientColor"),
            eye_world_pos: find("u_eyeWorldPos"),
            color: find("u_material.color"),
            ambient: find("u_material.ambient"),
            diffuse: find("u_material.diffuse"),
            specular: find("u_material.specular"),
            shininess: find("u_material.shininess"),
            shadow_splits: find("u_shadowSplits"),
            shadow_bias: find("u_shadowBias"),
            ..Self::default()
        };
        for (split, slot) in locations.light_view_projection.iter_mut().enumerate() {
            *slot = device.uniform_location(program, &format!("u_lightViewProjection[{split}]"));
        }
        locations.bones = (0..bones)
            .map(|i| device.uniform_location(program, &format!("u_bones[{i}]")))
            .collect();
        locations.directional = LightLocations::locate(device, program, "u_directionalLight");
        locations.point = LightLocations::locate(device, program, "u_pointLight");
        locations.spot = LightLocations::locate(device, program, "u_spotLight");
        locations
    }
}

/// One shader variant. Links on the first readiness check; a link failure
/// is permanent.
#[derive(Debug)]
pub struct Program {
    defines: String,
    bone_count: usize,
    resource: GpuResource<ProgramId>,
    attributes: u32,
    locations: UniformLocations,
    stamps: UniformStamps,
}

impl Program {
    pub fn new(defines: impl Into<String>) -> Self {
        let defines = defines.into();
        let bone_count = defines
            .lines()
            .find_map(|line| line.strip_prefix("MAX_BONES "))
            .and_then(|count| count.trim().parse().ok())
            .unwrap_or(0);
        Self {
            defines,
            bone_count,
            resource: GpuResource::new(),
            attributes: 0,
            locations: UniformLocations::default(),
            stamps: UniformStamps::default(),
        }
    }

    pub fn defines(&self) -> &str {
        &self.defines
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.resource.id()
    }

    pub fn state(&self) -> ResourceState {
        self.resource.state()
    }

    /// Linked and usable. Never triggers a link.
    pub fn is_linked(&self) -> bool {
        self.resource.is_ready()
    }

    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    pub fn has_attribute(&self, location: AttributeLocation) -> bool {
        self.attributes & (1 << location.index()) != 0
    }

    /// Links on first call. Returns false while failed.
    pub fn is_ready<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) -> bool {
        match self.resource.state() {
            ResourceState::Ready => true,
            ResourceState::Failed => false,
            ResourceState::Unallocated => self.allocate(context),
        }
    }

    fn allocate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) -> bool {
        let (vertex, fragment) = compose_sources(&self.defines);
        let id = match link(context.device_mut(), &vertex, &fragment) {
            Ok(id) => id,
            Err(err) => {
                error!(
                    "Shader program [{}] unusable: {}",
                    self.defines.trim_end().replace('\n', " "),
                    err
                );
                self.resource.set_failed();
                return false;
            }
        };

        let device = context.device_mut();
        self.attributes = AttributeLocation::ALL
            .iter()
            .filter(|location| device.attribute_location(id, location.name()).is_some())
            .fold(0, |mask, location| mask | 1 << location.index());
        self.locations = UniformLocations::locate(device, id, self.bone_count);
        self.stamps = UniformStamps::default();
        self.resource.set_ready(id);

        // Samplers read fixed units for the lifetime of the program.
        context.set_program(Some(id));
        for unit in 0..TextureSlot::COUNT as u32 {
            let name = format!("u_texture{unit}");
            if let Some(location) = context.device_mut().uniform_location(id, &name) {
                context
                    .device_mut()
                    .uniform(location, UniformValue::Int(unit as i32));
            }
        }
        context.check_gpu_error("program link");
        debug!("Linked program {:?} [{}]", id, self.defines.trim_end().replace('\n', " "));
        true
    }

    pub fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        self.resource.invalidate(context);
        self.stamps = UniformStamps::default();
    }

    pub fn forget(&mut self) {
        self.resource.forget();
        self.stamps = UniformStamps::default();
    }

    // ------------------------------------------------------------------
    // Uniform uploads. The program must be current on the context.
    // ------------------------------------------------------------------

    pub fn upload_scene<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        scene: &SceneUniforms,
    ) {
        let stamp = Some((scene.id, scene.version));
        if self.stamps.scene == stamp {
            return;
        }
        self.debug_assert_current(context);
        set(context, self.locations.scene_ambient, UniformValue::Vec4(scene.ambient));
        self.stamps.scene = stamp;
    }

    pub fn upload_view<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>, view: &ViewUniforms) {
        if view.key.is_some() && self.stamps.view == view.key {
            return;
        }
        self.debug_assert_current(context);
        let l = &self.locations;
        set(context, l.view, UniformValue::Mat4(view.view));
        set(context, l.projection, UniformValue::Mat4(view.projection));
        set(context, l.view_projection, UniformValue::Mat4(view.view_projection));
        set(context, l.eye_world_pos, UniformValue::Vec3(view.eye));
        self.stamps.view = view.key;
    }

    pub fn upload_material<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        material: &Material,
    ) {
        let stamp = Some((material.id(), material.version()));
        if self.stamps.material == stamp {
            return;
        }
        self.debug_assert_current(context);
        let l = &self.locations;
        set(context, l.color, UniformValue::Vec4(material.color()));
        set(context, l.ambient, UniformValue::Vec4(material.ambient()));
        set(context, l.diffuse, UniformValue::Vec4(material.diffuse()));
        set(context, l.specular, UniformValue::Vec4(material.specular()));
        set(context, l.shininess, UniformValue::Float(material.shininess()));
        self.stamps.material = stamp;
    }

    pub fn upload_node<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        scene: u64,
        entity: Entity,
        world: &WorldTransform,
    ) {
        let stamp = Some((scene, entity, world.version));
        if self.stamps.node == stamp {
            return;
        }
        self.debug_assert_current(context);
        set(context, self.locations.model, UniformValue::Mat4(world.model));
        set(context, self.locations.normal_matrix, UniformValue::Mat3(world.normal));
        self.stamps.node = stamp;
    }

    pub fn upload_light<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        light: &Light,
    ) {
        let stamp = Some((light.id(), light.version()));
        if self.stamps.light == stamp {
            return;
        }
        self.debug_assert_current(context);
        let l = match light.kind() {
            LightType::Directional => self.locations.directional,
            LightType::Point => self.locations.point,
            LightType::Spot => self.locations.spot,
        };
        set(context, l.diffuse, UniformValue::Vec3(light.diffuse_color()));
        set(context, l.specular, UniformValue::Vec3(light.specular_color()));
        match light.kind() {
            LightType::Directional => {
                set(context, l.direction, UniformValue::Vec3(light.direction()));
            }
            LightType::Point => {
                set(context, l.position, UniformValue::Vec3(light.position()));
                set(context, l.inv_range, UniformValue::Float(light.inv_range()));
            }
            LightType::Spot => {
                set(context, l.position, UniformValue::Vec3(light.position()));
                set(context, l.direction, UniformValue::Vec3(light.direction()));
                set(context, l.cut_off, UniformValue::Float(light.spot_cutoff_cos()));
                set(context, l.inv_range, UniformValue::Float(light.inv_range()));
            }
        }
        self.stamps.light = stamp;
    }

    /// Shadow matrices change whenever the camera moves; always uploaded.
    pub fn upload_shadows<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        shadows: &ShadowUniforms<'_>,
    ) {
        self.debug_assert_current(context);
        for (location, matrix) in self
            .locations
            .light_view_projection
            .iter()
            .zip(shadows.view_projections)
        {
            set(context, *location, UniformValue::Mat4(*matrix));
        }
        set(context, self.locations.shadow_splits, UniformValue::Vec4(shadows.split_distances));
        set(context, self.locations.shadow_bias, UniformValue::Float(shadows.bias));
    }

    pub fn upload_bones<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        scene: u64,
        entity: Entity,
        armature: &Armature,
    ) {
        let stamp = Some((scene, entity, armature.version()));
        if self.stamps.bones == stamp {
            return;
        }
        self.debug_assert_current(context);
        for (location, bone) in self.locations.bones.iter().zip(armature.bones()) {
            set(context, *location, UniformValue::Mat4(*bone));
        }
        self.stamps.bones = stamp;
    }

    fn debug_assert_current<D: GpuDevice>(&self, context: &RenderingContext<D>) {
        debug_assert_eq!(
            context.program(),
            self.id(),
            "uniform upload to a program that is not current"
        );
    }
}

fn set<D: GpuDevice>(
    context: &mut RenderingContext<D>,
    location: Option<UniformLocation>,
    value: UniformValue,
) {
    if let Some(location) = location {
        context.device_mut().uniform(location, value);
    }
}

/// Vertex and fragment sources for a define block: version line, one
/// `#define` per line, the stage define, then the shared and stage code.
pub fn compose_sources(defines: &str) -> (String, String) {
    let mut header = String::from("#version 100\n");
    for line in defines.lines().filter(|line| !line.is_empty()) {
        header.push_str("#define ");
        header.push_str(line);
        header.push('\n');
    }
    let vertex = format!("{header}#define COMPILEVS\n{COMMON_SOURCE}\n{VERTEX_SOURCE}");
    let fragment = format!("{header}#define COMPILEFS\n{COMMON_SOURCE}\n{FRAGMENT_SOURCE}");
    (vertex, fragment)
}

fn link<D: GpuDevice>(device: &mut D, vertex: &str, fragment: &str) -> Result<ProgramId, GpuError> {
    let vs = device.compile_shader(ShaderStage::Vertex, vertex)?;
    let fs = match device.compile_shader(ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(err) => {
            device.delete_shader(vs);
            return Err(err);
        }
    };
    let program = device.link_program(vs, fs, &AttributeLocation::bindings());
    device.delete_shader(vs);
    device.delete_shader(fs);
    program
}

/// Interns programs by define text. The same text always yields the same
/// key until the cache is cleared.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: SlotMap<ProgramKey, Program>,
    by_defines: HashMap<String, ProgramKey>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, defines: &str) -> ProgramKey {
        if let Some(&key) = self.by_defines.get(defines) {
            return key;
        }
        let key = self.programs.insert(Program::new(defines));
        let previous = self.by_defines.insert(defines.to_owned(), key);
        debug_assert!(previous.is_none(), "program registered twice");
        debug!(
            "Program cache grew to {} variants",
            self.programs.len()
        );
        key
    }

    pub fn get(&self, key: ProgramKey) -> Option<&Program> {
        self.programs.get(key)
    }

    pub fn get_mut(&mut self, key: ProgramKey) -> Option<&mut Program> {
        self.programs.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProgramKey, &Program)> {
        self.programs.iter()
    }

    /// Deletes every program and empties the cache.
    pub fn clear<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        for program in self.programs.values_mut() {
            program.invalidate(context);
        }
        self.drop_all();
    }

    /// Empties the cache without touching the device; the ids died with the
    /// context.
    pub fn forget_all(&mut self) {
        for program in self.programs.values_mut() {
            program.forget();
        }
        self.drop_all();
    }

    fn drop_all(&mut self) {
        if !self.programs.is_empty() {
            info!("Dropping {} cached programs", self.programs.len());
        }
        self.programs.clear();
        self.by_defines.clear();
    }
}
