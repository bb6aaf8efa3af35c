use std::fmt;

use model::Size;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerTreeSettings {
    pub default_tile_size: Size,
    pub max_untiled_layer_size: Size,
    pub max_texture_size: i32,
    pub minimum_contents_scale: f32,
    pub low_res_contents_scale_factor: f32,
    pub create_low_res_tiling: bool,
    pub skewport_target_time_multiplier: f32,
    pub skewport_extrapolation_limit_in_content_pixels: i32,
    pub max_tiles_for_interest_area: usize,
}

impl Default for LayerTreeSettings {
    fn default() -> Self {
        Self {
            default_tile_size: Size::new(256, 256),
            max_untiled_layer_size: Size::new(512, 512),
            max_texture_size: 2048,
            minimum_contents_scale: 0.0625,
            low_res_contents_scale_factor: 0.25,
            create_low_res_tiling: true,
            skewport_target_time_multiplier: 1.0,
            skewport_extrapolation_limit_in_content_pixels: 2000,
            max_tiles_for_interest_area: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    Parse { line: usize, column: usize },
    OutOfRange { field: &'static str },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Parse { line, column } => write!(
                formatter,
                "layer tree settings are not valid JSON at line {line}, column {column}"
            ),
            SettingsError::OutOfRange { field } => {
                write!(formatter, "layer tree setting {field} is out of range")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

impl LayerTreeSettings {
    /// Parses settings from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: LayerTreeSettings =
            serde_json::from_str(json).map_err(|error| SettingsError::Parse {
                line: error.line(),
                column: error.column(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.default_tile_size.is_empty() {
            return Err(SettingsError::OutOfRange {
                field: "default_tile_size",
            });
        }
        if self.max_untiled_layer_size.is_empty() {
            return Err(SettingsError::OutOfRange {
                field: "max_untiled_layer_size",
            });
        }
        if self.max_texture_size <= 0 {
            return Err(SettingsError::OutOfRange {
                field: "max_texture_size",
            });
        }
        if !self.minimum_contents_scale.is_finite() || self.minimum_contents_scale <= 0.0 {
            return Err(SettingsError::OutOfRange {
                field: "minimum_contents_scale",
            });
        }
        if !(self.low_res_contents_scale_factor > 0.0 && self.low_res_contents_scale_factor <= 1.0)
        {
            return Err(SettingsError::OutOfRange {
                field: "low_res_contents_scale_factor",
            });
        }
        if !self.skewport_target_time_multiplier.is_finite()
            || self.skewport_target_time_multiplier < 0.0
        {
            return Err(SettingsError::OutOfRange {
                field: "skewport_target_time_multiplier",
            });
        }
        if self.skewport_extrapolation_limit_in_content_pixels < 0 {
            return Err(SettingsError::OutOfRange {
                field: "skewport_extrapolation_limit_in_content_pixels",
            });
        }
        if self.max_tiles_for_interest_area == 0 {
            return Err(SettingsError::OutOfRange {
                field: "max_tiles_for_interest_area",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_keep_defaults() {
        let settings = LayerTreeSettings::from_json_str(
            r#"{ "max_texture_size": 4096, "default_tile_size": { "width": 512, "height": 128 } }"#,
        )
        .expect("valid settings");

        assert_eq!(settings.max_texture_size, 4096);
        assert_eq!(settings.default_tile_size, Size::new(512, 128));
        assert_eq!(settings.max_untiled_layer_size, Size::new(512, 512));
        assert_eq!(settings.max_tiles_for_interest_area, 128);
        assert!(settings.create_low_res_tiling);
    }

    #[test]
    fn empty_object_is_the_default() {
        assert_eq!(
            LayerTreeSettings::from_json_str("{}"),
            Ok(LayerTreeSettings::default())
        );
    }

    #[test]
    fn malformed_json_reports_position() {
        let error = LayerTreeSettings::from_json_str("{\n  \"max_texture_size\": ,\n}")
            .expect_err("malformed");
        assert!(matches!(error, SettingsError::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_eq!(
            LayerTreeSettings::from_json_str(r#"{ "low_res_contents_scale_factor": 1.5 }"#),
            Err(SettingsError::OutOfRange {
                field: "low_res_contents_scale_factor"
            })
        );
        assert_eq!(
            LayerTreeSettings::from_json_str(r#"{ "max_tiles_for_interest_area": 0 }"#),
            Err(SettingsError::OutOfRange {
                field: "max_tiles_for_interest_area"
            })
        );
    }
}
