use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub cascades: CascadeSettings,
    #[serde(default)]
    pub ssao: SsaoSettings,
    #[serde(default)]
    pub fxaa: FxaaSettings,
    /// Equirectangular HDR used as the static image-based-lighting source;
    /// a neutral built-in environment is used when unset.
    #[serde(default)]
    pub environment_path: Option<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            resolution: Resolution::default(),
            cascades: CascadeSettings::default(),
            ssao: SsaoSettings::default(),
            fxaa: FxaaSettings::default(),
            environment_path: None,
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
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        self.cascades = self.cascades.validate();

        self
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Tuning for the directional-shadow cascade splits. All values that shape
/// the split scheme live here so rebalancing shadow quality is a settings
/// edit, not a rebuild.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CascadeSettings {
    #[serde(default = "CascadeSettings::default_count")]
    pub count: u32,
    /// Distance of the first split plane from the camera.
    #[serde(default = "CascadeSettings::default_first_split")]
    pub first_split: f32,
    /// Geometric ratio between consecutive split distances.
    #[serde(default = "CascadeSettings::default_growth")]
    pub growth: f32,
    /// Per-cascade widening of the far extent, as a fraction per cascade
    /// index, to hide swimming at split boundaries.
    #[serde(default = "CascadeSettings::default_far_widening")]
    pub far_widening: f32,
    /// Multiplier applied to the last split to stretch the final cascade.
    #[serde(default = "CascadeSettings::default_last_scale")]
    pub last_scale: f32,
}

impl CascadeSettings {
    const fn default_count() -> u32 {
        4
    }
    const fn default_first_split() -> f32 {
        7.0
    }
    const fn default_growth() -> f32 {
        2.2
    }
    const fn default_far_widening() -> f32 {
        0.05
    }
    const fn default_last_scale() -> f32 {
        1.5
    }

    fn validate(mut self) -> Self {
        if self.count == 0 || self.count > 8 {
            warn!("Cascade count {} out of range, using default.", self.count);
            self.count = Self::default_count();
        }
        if self.first_split <= 0.0 {
            warn!("Cascade first split must be positive, using default.");
            self.first_split = Self::default_first_split();
        }
        if self.growth <= 1.0 {
            warn!("Cascade growth must be greater than one, using default.");
            self.growth = Self::default_growth();
        }
        if self.last_scale < 1.0 {
            warn!("Cascade last scale must be at least one, using default.");
            self.last_scale = Self::default_last_scale();
        }
        self
    }
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            count: Self::default_count(),
            first_split: Self::default_first_split(),
            growth: Self::default_growth(),
            far_widening: Self::default_far_widening(),
            last_scale: Self::default_last_scale(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SsaoSettings {
    #[serde(default = "SsaoSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "SsaoSettings::default_radius")]
    pub radius: f32,
    #[serde(default = "SsaoSettings::default_bias")]
    pub bias: f32,
    #[serde(default = "SsaoSettings::default_intensity")]
    pub intensity: f32,
}

impl SsaoSettings {
    const fn default_enabled() -> bool {
        true
    }
    const fn default_radius() -> f32 {
        0.5
    }
    const fn default_bias() -> f32 {
        0.025
    }
    const fn default_intensity() -> f32 {
        1.0
    }
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            radius: Self::default_radius(),
            bias: Self::default_bias(),
            intensity: Self::default_intensity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FxaaSettings {
    #[serde(default = "FxaaSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "FxaaSettings::default_edge_threshold")]
    pub edge_threshold: f32,
    #[serde(default = "FxaaSettings::default_edge_threshold_min")]
    pub edge_threshold_min: f32,
}

impl FxaaSettings {
    const fn default_enabled() -> bool {
        true
    }
    const fn default_edge_threshold() -> f32 {
        0.166
    }
    const fn default_edge_threshold_min() -> f32 {
        0.0833
    }
}

impl Default for FxaaSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            edge_threshold: Self::default_edge_threshold(),
            edge_threshold_min: Self::default_edge_threshold_min(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let invalid = RenderSettings {
            shadow_map_size: 0,
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            cascades: CascadeSettings {
                count: 0,
                first_split: -1.0,
                growth: 0.5,
                far_widening: 0.05,
                last_scale: 0.0,
            },
            ssao: SsaoSettings::default(),
            fxaa: FxaaSettings::default(),
            environment_path: None,
        };

        let validated = invalid.validate();

        assert_eq!(
            validated.shadow_map_size,
            RenderSettings::default().shadow_map_size
        );
        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.cascades.count, CascadeSettings::default_count());
        assert_eq!(
            validated.cascades.growth,
            CascadeSettings::default_growth()
        );
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            shadow_map_size: 4096,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            cascades: CascadeSettings {
                count: 3,
                first_split: 10.0,
                growth: 2.0,
                far_widening: 0.1,
                last_scale: 2.0,
            },
            ssao: SsaoSettings::default(),
            fxaa: FxaaSettings::default(),
            environment_path: None,
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.shadow_map_size, 4096);
        assert_eq!(validated.cascades.count, 3);
        assert_eq!(validated.cascades.first_split, 10.0);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: RenderSettings =
            serde_json::from_str(r#"{ "shadow_map_size": 1024 }"#).unwrap();
        assert_eq!(settings.shadow_map_size, 1024);
        assert_eq!(settings.cascades.count, CascadeSettings::default_count());
        assert!(settings.ssao.enabled);
    }
}
