//! `canopy.toml` handling.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use canopy_core::{ClusterConfig, Coordinate, Viewport};
use canopy_system_gesture::GestureConfig;
use canopy_system_view_sync::SyncConfig;
use glam::Vec2;
use serde::Deserialize;
use thiserror::Error;

/// File consulted when no `--config` flag is given.
pub(crate) const DEFAULT_CONFIG_PATH: &str = "canopy.toml";

/// Settings that parse but cannot drive a session.
#[derive(Clone, Debug, PartialEq, Error)]
pub(crate) enum ConfigError {
    /// A zero dwell would turn every press into a long press.
    #[error("timing.dwell_ms must be greater than zero")]
    ZeroDwell,
    /// The viewport has no area to render into.
    #[error("viewport size {width}x{height} has no area")]
    EmptyViewport {
        /// Configured width in pixels.
        width: f32,
        /// Configured height in pixels.
        height: f32,
    },
    /// The viewport center is not a geographic coordinate.
    #[error("viewport center ({lat}, {lon}) is out of range")]
    InvalidCenter {
        /// Configured latitude.
        lat: f64,
        /// Configured longitude.
        lon: f64,
    },
    /// Clustering needs a positive radius.
    #[error("clustering.radius_px must be positive, got {0}")]
    InvalidRadius(f32),
}

/// Parsed `canopy.toml`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CanopyConfig {
    pub(crate) timing: TimingConfig,
    pub(crate) clustering: ClusteringConfig,
    pub(crate) viewport: ViewportConfig,
    pub(crate) data: DataConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct TimingConfig {
    pub(crate) dwell_ms: u64,
    pub(crate) debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 1_000,
            debounce_ms: 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ClusteringConfig {
    pub(crate) radius_px: f32,
    pub(crate) max_zoom: u8,
    pub(crate) zoom_step: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        let defaults = ClusterConfig::default();
        Self {
            radius_px: defaults.radius_px,
            max_zoom: defaults.max_zoom,
            zoom_step: SyncConfig::default().cluster_zoom_step,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ViewportConfig {
    pub(crate) lat: f64,
    pub(crate) lon: f64,
    pub(crate) zoom: f64,
    pub(crate) width: f32,
    pub(crate) height: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            lat: 42.38,
            lon: -71.09,
            zoom: 13.0,
            width: 1_024.0,
            height: 768.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct DataConfig {
    pub(crate) seed: u64,
    pub(crate) synthetic_count: usize,
    pub(crate) dataset: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            synthetic_count: 400,
            dataset: None,
        }
    }
}

impl CanopyConfig {
    /// Reads the configuration.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
    /// used when present and built-in defaults otherwise.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parses and validates TOML contents.
    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse canopy toml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.dwell_ms == 0 {
            return Err(ConfigError::ZeroDwell);
        }
        let ViewportConfig {
            lat,
            lon,
            width,
            height,
            ..
        } = self.viewport;
        if width <= 0.0 || height <= 0.0 {
            return Err(ConfigError::EmptyViewport { width, height });
        }
        if !Coordinate::new(lat, lon).is_valid() {
            return Err(ConfigError::InvalidCenter { lat, lon });
        }
        if self.clustering.radius_px <= 0.0 {
            return Err(ConfigError::InvalidRadius(self.clustering.radius_px));
        }
        Ok(())
    }

    /// Initial camera.
    pub(crate) fn viewport(&self) -> Viewport {
        Viewport {
            center: Coordinate::new(self.viewport.lat, self.viewport.lon),
            zoom: self.viewport.zoom,
            size: Vec2::new(self.viewport.width, self.viewport.height),
        }
    }

    /// Coordinator settings.
    pub(crate) fn sync(&self) -> SyncConfig {
        SyncConfig {
            debounce: Duration::from_millis(self.timing.debounce_ms),
            cluster_zoom_step: self.clustering.zoom_step,
            clustering: ClusterConfig {
                radius_px: self.clustering.radius_px,
                max_zoom: self.clustering.max_zoom,
            },
            gesture: GestureConfig {
                dwell: Duration::from_millis(self.timing.dwell_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = CanopyConfig::parse("").expect("defaults are valid");

        assert_eq!(config, CanopyConfig::default());
        assert_eq!(config.sync(), SyncConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = CanopyConfig::parse(
            r#"
            [timing]
            dwell_ms = 750

            [viewport]
            zoom = 12.5

            [data]
            synthetic_count = 25
            dataset = "trees.json"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.sync().gesture.dwell, Duration::from_millis(750));
        assert_eq!(config.sync().debounce, Duration::from_millis(300));
        assert_eq!(config.viewport().zoom, 12.5);
        assert_eq!(config.data.synthetic_count, 25);
        assert_eq!(config.data.dataset, Some(PathBuf::from("trees.json")));
    }

    #[test]
    fn zero_dwell_is_rejected() {
        let error = CanopyConfig::parse("[timing]\ndwell_ms = 0").expect_err("invalid");

        assert_eq!(
            error.downcast_ref::<ConfigError>(),
            Some(&ConfigError::ZeroDwell)
        );
    }

    #[test]
    fn empty_viewport_is_rejected() {
        let error = CanopyConfig::parse("[viewport]\nwidth = 0.0").expect_err("invalid");

        assert!(matches!(
            error.downcast_ref::<ConfigError>(),
            Some(ConfigError::EmptyViewport { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_reported() {
        assert!(CanopyConfig::parse("[timing]\ndwell = 10").is_err());
    }

    #[test]
    fn missing_default_file_falls_back_to_defaults() {
        let config = CanopyConfig::load(None).expect("defaults");

        assert_eq!(config.timing, TimingConfig::default());
    }
}
