// renderer/renderer.rs
use glam::{Mat4, Vec4};
use hecs::Entity;
use log::{debug, info, trace, warn};

use crate::asset::{AssetCache, Assets, Handle, Mesh};
use crate::gpu::{BufferId, GpuDevice, VertexArrayId};
use crate::scene::{Armature, Camera, Scene, SceneView, WorldTransform};
use crate::settings::RenderSettings;

use super::batch::{generate_batches, Batch};
use super::buffers::{InstanceBuffer, InstanceData};
use super::context::RenderingContext;
use super::defines::{DrawVariant, ShaderDefines};
use super::light::Light;
use super::material::Material;
use super::pass::{Pass, PassType};
use super::program::{Program, ProgramCache, ProgramKey, ViewKey, ViewUniforms};
use super::shadows::ShadowMaps;
use super::state::BlendMode;
use super::texture::Texture;
use super::vao::{self, VaoCache, VaoKey};

/// Per-frame counters. Advisory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub visible_nodes: usize,
    pub batches: usize,
    pub instanced_batches: usize,
    pub skipped_batches: usize,
    pub draw_calls: usize,
    pub shadow_draw_calls: usize,
    pub triangles: u64,
    pub programs: usize,
    pub vaos: usize,
}

impl RendererStats {
    pub fn total_draw_calls(&self) -> usize {
        self.draw_calls + self.shadow_draw_calls
    }
}

/// What a pass over the batch list reads: scene nodes and lights, the asset
/// caches, and the view it draws from.
pub struct FrameContext<'f, 's> {
    pub scene: &'f SceneView<'s>,
    pub assets: &'f mut Assets,
    pub view: ViewUniforms,
    /// Light a shadow pass renders from, as an index into the scene lights.
    pub light: Option<usize>,
}

/// Everything fixed for one batch across its passes.
struct BatchDraw<'a> {
    batch: &'a Batch,
    material: &'a Material,
    mesh_handle: Handle<Mesh>,
    mesh: &'a Mesh,
    instanced: bool,
    bones: usize,
}

pub struct Renderer<D: GpuDevice> {
    context: RenderingContext<D>,
    programs: ProgramCache,
    vaos: VaoCache,
    instance_buffer: InstanceBuffer,
    shadows: ShadowMaps,
    settings: RenderSettings,
    stats: RendererStats,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D, settings: RenderSettings) -> Self {
        let settings = settings.validate();
        let context = RenderingContext::new(device, &settings);
        info!(
            "Renderer ready (instancing: {}, vertex arrays: {}, batch limit: {})",
            context.capabilities().has_instanced_arrays() && settings.allow_instancing,
            context.capabilities().has_vertex_array_objects(),
            settings.max_nodes_in_batch
        );
        Self {
            context,
            programs: ProgramCache::new(),
            vaos: VaoCache::new(),
            instance_buffer: InstanceBuffer::new(),
            shadows: ShadowMaps::new(),
            settings,
            stats: RendererStats::default(),
        }
    }

    pub fn context(&self) -> &RenderingContext<D> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RenderingContext<D> {
        &mut self.context
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn program_cache(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn vao_cache(&self) -> &VaoCache {
        &self.vaos
    }

    pub fn shadow_maps(&self) -> &ShadowMaps {
        &self.shadows
    }

    pub fn last_frame_stats(&self) -> RendererStats {
        self.stats
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.set_window_size(width, height);
    }

    /// Re-issues every piece of cached state and drops both intern caches.
    /// Their GPU handles may be dead, so nothing is deleted.
    pub fn reset_cached_state(&mut self) {
        self.context.reset_cached_state();
        self.programs.forget_all();
        self.vaos.forget_all();
        info!("Render state reset; program and vertex array caches emptied");
    }

    /// Recovery after the GPU context was lost and recreated. Every asset
    /// uploads again on its next readiness check.
    pub fn context_lost(&mut self, assets: &mut Assets) {
        warn!("GPU context lost, forgetting all GPU objects");
        self.reset_cached_state();
        self.instance_buffer.forget();
        self.shadows.forget_all();
        assets.forget_gpu_objects();
    }

    /// Draws one frame of `scene` as seen by `camera`.
    pub fn render(&mut self, camera: &Camera, scene: &mut Scene) -> RendererStats {
        self.stats = RendererStats::default();

        scene.propagate_transforms();
        let viewport = camera
            .viewport()
            .unwrap_or_else(|| self.context.window_viewport());
        let aspect = if viewport.is_empty() {
            1.0
        } else {
            viewport.aspect_ratio()
        };

        let visible = scene.visible_nodes(camera, aspect);
        let batches = generate_batches(&visible, self.settings.max_nodes_in_batch);
        self.stats.visible_nodes = visible.len();
        self.stats.batches = batches.len();

        let (scene_view, assets) = scene.split();
        self.render_shadow_maps(camera, aspect, &scene_view, assets);

        self.context.set_frame_buffer(None);
        self.context.set_viewport(viewport);
        self.context
            .set_clear_color(Vec4::from_array(self.settings.clear_color));
        self.context.set_color_mask(true);
        self.context.set_depth_mask(true);
        self.context.clear_buffers(true, true, false);

        let mut frame = FrameContext {
            scene: &scene_view,
            assets,
            view: camera_view(camera, aspect),
            light: None,
        };
        for batch in &batches {
            if !self.render_batch(batch, &mut frame, None) {
                self.stats.skipped_batches += 1;
            }
        }

        self.stats.programs = self.programs.len();
        self.stats.vaos = self.vaos.len();
        debug!(
            "Frame: {} visible, {} batches ({} instanced, {} skipped), {} draws, {} triangles",
            self.stats.visible_nodes,
            self.stats.batches,
            self.stats.instanced_batches,
            self.stats.skipped_batches,
            self.stats.total_draw_calls(),
            self.stats.triangles
        );
        self.stats
    }

    /// Renders every shadow view from the nodes inside that view's volume,
    /// including ones the camera cannot see.
    fn render_shadow_maps(
        &mut self,
        camera: &Camera,
        aspect: f32,
        scene: &SceneView<'_>,
        assets: &mut Assets,
    ) {
        let mut shadows = std::mem::take(&mut self.shadows);
        shadows.update(
            &mut self.context,
            scene.lights,
            camera,
            aspect,
            &self.settings.shadow_map_sizes,
        );

        for caster in shadows.casters_mut() {
            let index = caster.light();
            let eye = scene.lights.get(index).map(Light::position).unwrap_or_default();
            for view in caster.views().to_vec() {
                let Some(map) = caster.map_mut(view.map) else {
                    continue;
                };
                if !self.context.set_frame_buffer(Some(&mut *map)) {
                    trace!("Shadow map {} of light {} not ready", view.map, index);
                    continue;
                }
                if let Some(face) = view.face {
                    if !map.set_cube_face(&mut self.context, face) {
                        continue;
                    }
                }

                let casters = scene.visible_nodes_in(&view.frustum());
                let batches: Vec<Batch> =
                    generate_batches(&casters, self.settings.max_nodes_in_batch)
                        .into_iter()
                        .filter(|batch| {
                            batch
                                .material()
                                .and_then(|handle| assets.materials.get(handle))
                                .is_some_and(Material::casts_shadows)
                        })
                        .collect();
                // Far distance everywhere nothing is drawn.
                self.context.set_clear_color(Vec4::ONE);
                self.context.clear_buffers(true, true, false);
                let pass = match view.face {
                    Some(_) => Pass::cube_shadow(),
                    None => Pass::shadow(),
                };

                let mut frame = FrameContext {
                    scene,
                    assets: &mut *assets,
                    view: ViewUniforms {
                        view: Mat4::IDENTITY,
                        projection: view.view_projection,
                        view_projection: view.view_projection,
                        eye,
                        key: None,
                    },
                    light: Some(index),
                };
                for batch in &batches {
                    self.render_batch(batch, &mut frame, Some(pass));
                }
            }
        }

        self.shadows = shadows;
    }

    /// Draws one batch with its material's technique, or with `pass_override`
    /// alone (shadow and picking passes). Returns false when the batch was
    /// skipped because something it needs is missing or not ready.
    pub fn render_batch(
        &mut self,
        batch: &Batch,
        frame: &mut FrameContext<'_, '_>,
        pass_override: Option<Pass>,
    ) -> bool {
        let (Some(material_handle), Some(mesh_handle)) = (batch.material(), batch.mesh()) else {
            trace!("Skipping batch of {} without material or mesh", batch.len());
            return false;
        };

        let Assets {
            meshes,
            materials,
            textures,
        } = &mut *frame.assets;
        let Some(material) = materials.get(material_handle) else {
            warn!("Batch references missing material {:?}", material_handle);
            return false;
        };
        let Some(mesh) = meshes.get_mut(mesh_handle) else {
            warn!("Batch references missing mesh {:?}", mesh_handle);
            return false;
        };
        if !mesh.is_ready(&mut self.context) || !material.is_ready(&mut self.context, textures) {
            trace!(
                "Skipping batch ({:?}, {:?}): not ready",
                material_handle,
                mesh_handle
            );
            return false;
        }
        let mesh: &Mesh = mesh;

        let single;
        let passes: &[Pass] = match pass_override {
            Some(pass) => {
                single = [pass];
                &single
            }
            None => material.technique().passes(),
        };

        let instanced = batch.allow_instancing()
            && self.settings.allow_instancing
            && self.context.capabilities().has_instanced_arrays()
            && passes.len() == 1
            && mesh.is_static();
        let bones = batch
            .nodes()
            .iter()
            .filter(|node| node.has_armature)
            .filter_map(|node| {
                frame
                    .scene
                    .world
                    .get::<&Armature>(node.entity)
                    .ok()
                    .map(|armature| armature.bone_count())
            })
            .max()
            .unwrap_or(0);

        let draw = BatchDraw {
            batch,
            material,
            mesh_handle,
            mesh,
            instanced,
            bones,
        };

        let mut drawn = false;
        for pass in passes {
            match pass.pass_type {
                PassType::Lit => {
                    for (index, light) in frame.scene.lights.iter().enumerate() {
                        drawn |= self.draw_pass(
                            &draw,
                            pass,
                            Some((index, light)),
                            frame.scene,
                            &frame.view,
                            textures,
                        );
                    }
                }
                PassType::Shadow => {
                    let light = frame
                        .light
                        .and_then(|index| frame.scene.lights.get(index).map(|light| (index, light)));
                    drawn |= self.draw_pass(&draw, pass, light, frame.scene, &frame.view, textures);
                }
                PassType::Default => {
                    drawn |= self.draw_pass(&draw, pass, None, frame.scene, &frame.view, textures);
                }
            }
        }

        if drawn && draw.instanced && pass_override.is_none() {
            self.stats.instanced_batches += 1;
        }
        drawn
    }

    fn draw_pass(
        &mut self,
        draw: &BatchDraw<'_>,
        pass: &Pass,
        light: Option<(usize, &Light)>,
        scene: &SceneView<'_>,
        view: &ViewUniforms,
        textures: &mut AssetCache<Texture>,
    ) -> bool {
        let material = draw.material;

        let mut state = pass.state;
        if pass.pass_type != PassType::Shadow {
            state.cull_face = material.cull_face();
        }
        if pass.pass_type == PassType::Default && material.blend_mode() != BlendMode::None {
            state.blend_mode = material.blend_mode();
        }
        self.context.setup_pass(&state);

        let defines = ShaderDefines::for_draw(DrawVariant {
            pass: pass.pass_type,
            material,
            light: light.map(|(_, light)| light),
            instanced: draw.instanced,
            bones: draw.bones,
        });
        let program_key = self.programs.get_or_create(defines.as_str());
        let Some(program) = self.programs.get_mut(program_key) else {
            return false;
        };
        if !program.is_ready(&mut self.context) {
            trace!("Program for [{}] unusable, skipping pass", defines.as_str().trim_end());
            return false;
        }
        self.context.set_program(program.id());

        program.upload_scene(&mut self.context, &scene.uniforms);
        program.upload_view(&mut self.context, view);
        if pass.pass_type != PassType::Shadow {
            program.upload_material(&mut self.context, material);
            material.bind_textures(&mut self.context, textures);
        }
        if let Some((index, light)) = light {
            program.upload_light(&mut self.context, light);
            if pass.pass_type == PassType::Lit
                && light.casts_shadows()
                && material.receives_shadows()
            {
                if let Some(caster) = self.shadows.caster_mut(index) {
                    caster.bind(&mut self.context);
                    program.upload_shadows(&mut self.context, &caster.uniforms());
                }
            }
        }

        let solid = material.is_solid();
        let mode = draw.mesh.draw_mode(solid);
        let range = draw.mesh.draw_range(solid);
        let triangles = u64::from(draw.mesh.triangle_count());
        let mut draw_calls = 0;

        if draw.instanced {
            let staging = self.instance_buffer.staging_mut();
            staging.clear();
            for node in draw.batch.nodes() {
                if let Ok(world) = scene.world.get::<&WorldTransform>(node.entity) {
                    staging.push(InstanceData::new(&world.model, &world.normal));
                }
            }
            let count = self.instance_buffer.upload(&mut self.context);
            if count == 0 {
                return false;
            }
            let instances = self.instance_buffer.id();
            if !bind_geometry(
                &mut self.context,
                &mut self.vaos,
                program_key,
                program,
                draw.mesh_handle,
                draw.mesh,
                solid,
                instances,
            ) {
                return false;
            }
            self.context.draw_instanced(mode, range, count);
            draw_calls += 1;
            self.count_draws(pass.pass_type, draw_calls, triangles * u64::from(count));
        } else {
            if !bind_geometry(
                &mut self.context,
                &mut self.vaos,
                program_key,
                program,
                draw.mesh_handle,
                draw.mesh,
                solid,
                None,
            ) {
                return false;
            }
            for node in draw.batch.nodes() {
                let Ok(world) = scene.world.get::<&WorldTransform>(node.entity) else {
                    trace!("Node {:?} has no world transform yet", node.entity);
                    continue;
                };
                program.upload_node(&mut self.context, scene.uniforms.id, node.entity, &world);
                if draw.bones > 0 {
                    upload_bones(&mut self.context, program, scene, node.entity);
                }
                self.context.draw(mode, range);
                draw_calls += 1;
            }
            self.count_draws(pass.pass_type, draw_calls, triangles * draw_calls as u64);
        }

        if self.context.capabilities().has_vertex_array_objects() {
            self.context.set_vertex_array(None);
        }
        draw_calls > 0
    }

    fn count_draws(&mut self, pass: PassType, draw_calls: usize, triangles: u64) {
        match pass {
            PassType::Shadow => self.stats.shadow_draw_calls += draw_calls,
            PassType::Default | PassType::Lit => {
                self.stats.draw_calls += draw_calls;
                self.stats.triangles += triangles;
            }
        }
    }
}

fn camera_view(camera: &Camera, aspect: f32) -> ViewUniforms {
    let view = camera.view();
    let projection = camera.proj(aspect);
    ViewUniforms {
        view,
        projection,
        view_projection: projection * view,
        eye: camera.position(),
        key: Some(ViewKey {
            camera: camera.id(),
            version: camera.version(),
            aspect_bits: aspect.to_bits(),
        }),
    }
}

/// Binds the mesh through a cached vertex array, or sets the attributes
/// directly when the device has none.
#[allow(clippy::too_many_arguments)]
fn bind_geometry<D: GpuDevice>(
    context: &mut RenderingContext<D>,
    vaos: &mut VaoCache,
    program_key: ProgramKey,
    program: &Program,
    mesh_handle: Handle<Mesh>,
    mesh: &Mesh,
    solid: bool,
    instance_buffer: Option<BufferId>,
) -> bool {
    if context.capabilities().has_vertex_array_objects() {
        let key = VaoKey {
            instance_buffer,
            program: program_key,
            mesh: mesh_handle,
            solid,
        };
        let vertex_array: Option<VertexArrayId> = vaos.get_or_create(context, key, program, mesh);
        if vertex_array.is_none() {
            return false;
        }
        context.set_vertex_array(vertex_array);
    } else {
        vao::set_attributes(context, program, mesh, solid, instance_buffer);
    }
    true
}

fn upload_bones<D: GpuDevice>(
    context: &mut RenderingContext<D>,
    program: &mut Program,
    scene: &SceneView<'_>,
    entity: Entity,
) {
    if let Ok(armature) = scene.world.get::<&Armature>(entity) {
        program.upload_bones(context, scene.uniforms.id, entity, &armature);
    }
}
