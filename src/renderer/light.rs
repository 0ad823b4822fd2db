// renderer/light.rs
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use super::resource::next_revision;

static NEXT_LIGHT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Point,
    Directional,
    Spot,
}

/// Scene light. Every setter bumps `version` so programs know when to
/// re-upload its uniforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    id: u64,
    kind: LightType,
    color: Vec3,
    energy: f32,
    specular: bool,
    position: Vec3,
    direction: Vec3,
    range: f32,
    spot_cutoff_degrees: f32,
    shadows: bool,
    shadow_bias: f32,
    version: u64,
}

impl Light {
    fn new(kind: LightType) -> Self {
        Self {
            id: NEXT_LIGHT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            color: Vec3::ONE,
            energy: 1.0,
            specular: true,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            range: 10.0,
            spot_cutoff_degrees: 45.0,
            shadows: false,
            shadow_bias: 0.005,
            version: next_revision(),
        }
    }

    pub fn directional(direction: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            ..Self::new(LightType::Directional)
        }
    }

    pub fn point(position: Vec3, range: f32) -> Self {
        Self {
            position,
            range,
            ..Self::new(LightType::Point)
        }
    }

    pub fn spot(position: Vec3, direction: Vec3, range: f32, cutoff_degrees: f32) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            range,
            spot_cutoff_degrees: cutoff_degrees,
            ..Self::new(LightType::Spot)
        }
    }

    pub fn with_color(mut self, color: Vec3, energy: f32) -> Self {
        self.set_color(color, energy);
        self
    }

    pub fn with_shadows(mut self) -> Self {
        self.set_shadows(true);
        self
    }

    pub fn kind(&self) -> LightType {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn inv_range(&self) -> f32 {
        if self.range > 0.0 {
            1.0 / self.range
        } else {
            0.0
        }
    }

    pub fn spot_cutoff_degrees(&self) -> f32 {
        self.spot_cutoff_degrees
    }

    /// Cosine of the cutoff angle, which is what the shader compares against.
    pub fn spot_cutoff_cos(&self) -> f32 {
        self.spot_cutoff_degrees.to_radians().cos()
    }

    pub fn shadow_bias(&self) -> f32 {
        self.shadow_bias
    }

    pub fn diffuse_color(&self) -> Vec3 {
        self.color * self.energy
    }

    pub fn specular_color(&self) -> Vec3 {
        if self.specular {
            self.color * self.energy
        } else {
            Vec3::ZERO
        }
    }

    pub fn casts_shadows(&self) -> bool {
        self.shadows
    }

    pub fn set_color(&mut self, color: Vec3, energy: f32) {
        self.color = color;
        self.energy = energy;
        self.touch();
    }

    pub fn set_specular(&mut self, enabled: bool) {
        self.specular = enabled;
        self.touch();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.touch();
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        self.direction = direction.normalize_or_zero();
        self.touch();
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range;
        self.touch();
    }

    pub fn set_shadows(&mut self, enabled: bool) {
        self.shadows = enabled;
        self.touch();
    }

    pub fn set_shadow_bias(&mut self, bias: f32) {
        self.shadow_bias = bias;
        self.touch();
    }

    fn touch(&mut self) {
        self.version = next_revision();
    }
}
