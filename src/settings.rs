use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_max_nodes_in_batch")]
    pub max_nodes_in_batch: usize,
    #[serde(default = "RenderSettings::default_shadow_map_sizes")]
    pub shadow_map_sizes: Vec<u32>,
    #[serde(default = "RenderSettings::default_allow_instancing")]
    pub allow_instancing: bool,
    #[serde(default = "RenderSettings::default_max_texture_units")]
    pub max_texture_units: u32,
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_nodes_in_batch: Self::default_max_nodes_in_batch(),
            shadow_map_sizes: Self::default_shadow_map_sizes(),
            allow_instancing: Self::default_allow_instancing(),
            max_texture_units: Self::default_max_texture_units(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.max_nodes_in_batch == 0 {
            warn!("Batch size must be greater than zero. Using default value.");
            self.max_nodes_in_batch = Self::default_max_nodes_in_batch();
        }

        if self.shadow_map_sizes.is_empty() || self.shadow_map_sizes.contains(&0) {
            warn!("Shadow map sizes must be non-empty and greater than zero. Using default splits.");
            self.shadow_map_sizes = Self::default_shadow_map_sizes();
        }

        if self.max_texture_units == 0 {
            warn!("Texture unit count must be greater than zero. Using default value.");
            self.max_texture_units = Self::default_max_texture_units();
        }

        self
    }

    /// Number of shadow splits, one map per split.
    pub fn shadow_splits(&self) -> usize {
        self.shadow_map_sizes.len()
    }

    const fn default_max_nodes_in_batch() -> usize {
        128
    }

    fn default_shadow_map_sizes() -> Vec<u32> {
        vec![1024, 512, 256, 128]
    }

    const fn default_allow_instancing() -> bool {
        true
    }

    const fn default_max_texture_units() -> u32 {
        16
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            max_nodes_in_batch: 0,
            shadow_map_sizes: vec![1024, 0],
            allow_instancing: false,
            max_texture_units: 0,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = RenderSettings::default();

        assert_eq!(validated.max_nodes_in_batch, defaults.max_nodes_in_batch);
        assert_eq!(validated.shadow_map_sizes, defaults.shadow_map_sizes);
        assert_eq!(validated.max_texture_units, defaults.max_texture_units);
        assert!(!validated.allow_instancing);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            max_nodes_in_batch: 64,
            shadow_map_sizes: vec![2048, 1024],
            allow_instancing: true,
            max_texture_units: 8,
            clear_color: [1.0, 0.0, 0.0, 1.0],
        };

        let validated = valid.clone().validate();

        assert_eq!(validated, valid);
        assert_eq!(validated.shadow_splits(), 2);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: RenderSettings =
            serde_json::from_str(r#"{ "max_nodes_in_batch": 32 }"#).unwrap();
        assert_eq!(parsed.max_nodes_in_batch, 32);
        assert_eq!(parsed.shadow_map_sizes, vec![1024, 512, 256, 128]);
        assert!(parsed.allow_instancing);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = RenderSettings::load_from_path("definitely/not/here/settings.json");
        assert_eq!(settings, RenderSettings::default());
    }
}
