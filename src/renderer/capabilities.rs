// renderer/capabilities.rs
use log::info;

use crate::gpu::DeviceCapabilities;
use crate::settings::RenderSettings;

/// What the renderer may use on this context, after settings are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderingCapabilities {
    pub instanced_arrays: bool,
    pub vertex_array_objects: bool,
    pub max_texture_units: u32,
    pub max_texture_size: u32,
}

impl RenderingCapabilities {
    pub fn new(device: DeviceCapabilities, settings: &RenderSettings) -> Self {
        let capabilities = Self {
            instanced_arrays: device.instanced_arrays && settings.allow_instancing,
            vertex_array_objects: device.vertex_array_objects,
            max_texture_units: device.max_texture_units.min(settings.max_texture_units),
            max_texture_size: device.max_texture_size,
        };
        info!(
            "Rendering capabilities: instancing={} vao={} texture units={}",
            capabilities.instanced_arrays,
            capabilities.vertex_array_objects,
            capabilities.max_texture_units
        );
        capabilities
    }

    pub fn has_instanced_arrays(&self) -> bool {
        self.instanced_arrays
    }

    pub fn has_vertex_array_objects(&self) -> bool {
        self.vertex_array_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_can_force_instancing_off() {
        let settings = RenderSettings {
            allow_instancing: false,
            ..RenderSettings::default()
        };
        let caps = RenderingCapabilities::new(DeviceCapabilities::default(), &settings);
        assert!(!caps.has_instanced_arrays());
    }

    #[test]
    fn texture_units_are_clamped_to_device() {
        let device = DeviceCapabilities {
            max_texture_units: 8,
            ..DeviceCapabilities::default()
        };
        let caps = RenderingCapabilities::new(device, &RenderSettings::default());
        assert_eq!(caps.max_texture_units, 8);
    }
}
