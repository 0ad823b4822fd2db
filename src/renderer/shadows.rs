// renderer/shadows.rs
// Depth maps for shadow-casting lights. Directional lights get one map per
// camera frustum split, spot lights a single perspective map, point lights a
// distance cube map rendered face by face.
use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Vec3, Vec4};
use log::debug;

use crate::gpu::{CubeFace, GpuDevice};
use crate::scene::{Camera, Frustum};

use super::context::RenderingContext;
use super::framebuffer::FrameBuffer;
use super::light::{Light, LightType};
use super::material::TextureSlot;
use super::program::{ShadowUniforms, MAX_SHADOW_SPLITS};

const SPOT_NEAR: f32 = 0.1;
const POINT_NEAR: f32 = 0.1;
/// Blend between logarithmic and uniform split placement.
const SPLIT_LAMBDA: f32 = 0.5;

/// One depth render into a caster's map: a directional split, the spot
/// frustum, or one face of a point light cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    pub map: usize,
    pub face: Option<CubeFace>,
    pub view_projection: Mat4,
}

impl ShadowView {
    /// Volume whose nodes can cast into this view.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_proj(&self.view_projection)
    }
}

#[derive(Debug)]
pub struct ShadowCaster {
    light: usize,
    kind: LightType,
    maps: Vec<FrameBuffer>,
    views: Vec<ShadowView>,
    /// Split matrices lit passes sample with; empty for point lights.
    view_projections: Vec<Mat4>,
    split_distances: Vec4,
    bias: f32,
}

impl ShadowCaster {
    fn new(light: usize, kind: LightType, sizes: &[u32]) -> Self {
        debug!("Creating {} shadow map(s) for light {}", sizes.len(), light);
        let (maps, view_projections) = match kind {
            LightType::Point => (
                sizes.iter().map(|&size| FrameBuffer::cube_shadow_map(size)).collect(),
                Vec::new(),
            ),
            LightType::Directional | LightType::Spot => (
                sizes.iter().map(|&size| FrameBuffer::shadow_map(size)).collect(),
                vec![Mat4::IDENTITY; sizes.len()],
            ),
        };
        Self {
            light,
            kind,
            maps,
            views: Vec::new(),
            view_projections,
            split_distances: Vec4::ZERO,
            bias: 0.0,
        }
    }

    /// Index of the light in the scene's light list.
    pub fn light(&self) -> usize {
        self.light
    }

    pub fn split_count(&self) -> usize {
        self.maps.len()
    }

    pub fn view_projections(&self) -> &[Mat4] {
        &self.view_projections
    }

    /// Depth renders for this frame, in drawing order.
    pub fn views(&self) -> &[ShadowView] {
        &self.views
    }

    pub fn split_distances(&self) -> Vec4 {
        self.split_distances
    }

    pub fn map_mut(&mut self, split: usize) -> Option<&mut FrameBuffer> {
        self.maps.get_mut(split)
    }

    pub fn uniforms(&self) -> ShadowUniforms<'_> {
        ShadowUniforms {
            view_projections: &self.view_projections,
            split_distances: self.split_distances,
            bias: self.bias,
        }
    }

    /// Binds each map's sampled texture to its shadow slot.
    pub fn bind<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        for (split, map) in self.maps.iter_mut().enumerate() {
            if let Some(slot) = TextureSlot::shadow_map(split) {
                context.set_texture(slot.unit(), map.shadow_texture());
            }
        }
    }

    fn matches(&self, light: &Light, sizes: &[u32]) -> bool {
        self.kind == light.kind()
            && self.maps.len() == sizes.len()
            && self
                .maps
                .iter()
                .zip(sizes)
                .all(|(map, &size)| map.width() == size)
    }

    fn update(&mut self, light: &Light, camera: &Camera, aspect: f32) {
        self.bias = light.shadow_bias();
        self.views.clear();
        match light.kind() {
            LightType::Directional => {
                let splits = split_distances(camera.near(), camera.far(), self.maps.len());
                let mut near = camera.near();
                let mut distances = [camera.far(); MAX_SHADOW_SPLITS];
                for (split, &far) in splits.iter().enumerate() {
                    let corners = camera.frustum_corners(aspect, near, far);
                    self.view_projections[split] = directional_split(light.direction(), &corners);
                    distances[split] = far;
                    near = far;
                }
                self.split_distances = Vec4::from_array(distances);
            }
            LightType::Spot => {
                self.view_projections[0] = spot_view_projection(light);
                self.split_distances = Vec4::splat(light.range());
            }
            LightType::Point => {
                self.split_distances = Vec4::splat(light.range());
                // A light whose range misses the view lights nothing on screen.
                let reach = Vec3::splat(light.range());
                let position = light.position();
                if !camera
                    .frustum(aspect)
                    .intersects_aabb(position - reach, position + reach)
                {
                    return;
                }
                for face in CubeFace::ALL {
                    self.views.push(ShadowView {
                        map: 0,
                        face: Some(face),
                        view_projection: cube_face_view_projection(light, face),
                    });
                }
                return;
            }
        }
        self.views
            .extend(self.view_projections.iter().enumerate().map(|(map, &view_projection)| {
                ShadowView {
                    map,
                    face: None,
                    view_projection,
                }
            }));
    }

    fn invalidate<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        for map in &mut self.maps {
            map.invalidate(context);
        }
    }

    fn forget(&mut self) {
        for map in &mut self.maps {
            map.forget();
        }
    }
}

/// Shadow casters, kept in light order and reused across frames while the
/// light keeps its type and the configured map sizes do not change.
#[derive(Debug, Default)]
pub struct ShadowMaps {
    casters: Vec<ShadowCaster>,
}

impl ShadowMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.casters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.casters.is_empty()
    }

    pub fn casters_mut(&mut self) -> impl Iterator<Item = &mut ShadowCaster> {
        self.casters.iter_mut()
    }

    pub fn caster_mut(&mut self, light: usize) -> Option<&mut ShadowCaster> {
        self.casters.iter_mut().find(|caster| caster.light == light)
    }

    /// Creates, resizes or drops casters to follow `lights`, then refits
    /// every split to the camera.
    pub fn update<D: GpuDevice>(
        &mut self,
        context: &mut RenderingContext<D>,
        lights: &[Light],
        camera: &Camera,
        aspect: f32,
        map_sizes: &[u32],
    ) {
        let split_sizes = &map_sizes[..map_sizes.len().min(MAX_SHADOW_SPLITS)];
        let mut previous = std::mem::take(&mut self.casters);

        for (index, light) in lights.iter().enumerate() {
            if !light.casts_shadows() {
                continue;
            }
            let sizes = match light.kind() {
                LightType::Directional => split_sizes,
                LightType::Spot | LightType::Point => &split_sizes[..split_sizes.len().min(1)],
            };
            if sizes.is_empty() {
                continue;
            }

            let mut caster = match previous.iter().position(|caster| caster.light == index) {
                Some(position) if previous[position].matches(light, sizes) => {
                    previous.swap_remove(position)
                }
                _ => ShadowCaster::new(index, light.kind(), sizes),
            };
            caster.update(light, camera, aspect);
            self.casters.push(caster);
        }

        for mut stale in previous {
            debug!("Releasing shadow maps of light {}", stale.light);
            stale.invalidate(context);
        }
    }

    pub fn clear<D: GpuDevice>(&mut self, context: &mut RenderingContext<D>) {
        for caster in &mut self.casters {
            caster.invalidate(context);
        }
        self.casters.clear();
    }

    /// Drops every GPU id without device calls, after context loss.
    pub fn forget_all(&mut self) {
        for caster in &mut self.casters {
            caster.forget();
        }
    }
}

/// Far distance of each split between `near` and `far`.
pub fn split_distances(near: f32, far: f32, count: usize) -> Vec<f32> {
    let near = near.max(1e-3);
    let far = far.max(near + 1e-3);
    (1..=count)
        .map(|i| {
            let t = i as f32 / count as f32;
            let log = near * (far / near).powf(t);
            let uniform = near + (far - near) * t;
            SPLIT_LAMBDA * log + (1.0 - SPLIT_LAMBDA) * uniform
        })
        .collect()
}

/// Orthographic light view enclosing the bounding sphere of one split.
fn directional_split(direction: Vec3, corners: &[Vec3; 8]) -> Mat4 {
    let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(center))
        .fold(0.0_f32, f32::max)
        .max(0.01);

    let eye = center - direction * radius * 2.0;
    let view = Mat4::look_at_rh(eye, center, shadow_up(direction));
    let projection = Mat4::orthographic_rh_gl(-radius, radius, -radius, radius, 0.0, radius * 4.0);
    projection * view
}

fn spot_view_projection(light: &Light) -> Mat4 {
    let forward = light.direction().try_normalize().unwrap_or(Vec3::NEG_Z);
    let far = light.range().max(SPOT_NEAR + 0.1);
    let fov = (light.spot_cutoff_degrees() * 2.0)
        .to_radians()
        .clamp(0.1, PI - 0.1);
    let position = light.position();
    let view = Mat4::look_at_rh(position, position + forward, shadow_up(forward));
    Mat4::perspective_rh_gl(fov, 1.0, SPOT_NEAR, far) * view
}

/// 90 degree view through one cube face, oriented the way cube map
/// lookups address that face.
fn cube_face_view_projection(light: &Light, face: CubeFace) -> Mat4 {
    let (forward, up) = match face {
        CubeFace::PositiveX => (Vec3::X, Vec3::NEG_Y),
        CubeFace::NegativeX => (Vec3::NEG_X, Vec3::NEG_Y),
        CubeFace::PositiveY => (Vec3::Y, Vec3::Z),
        CubeFace::NegativeY => (Vec3::NEG_Y, Vec3::NEG_Z),
        CubeFace::PositiveZ => (Vec3::Z, Vec3::NEG_Y),
        CubeFace::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_Y),
    };
    let far = light.range().max(POINT_NEAR + 0.1);
    let position = light.position();
    let view = Mat4::look_at_rh(position, position + forward, up);
    Mat4::perspective_rh_gl(FRAC_PI_2, 1.0, POINT_NEAR, far) * view
}

fn shadow_up(direction: Vec3) -> Vec3 {
    if direction.abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}
