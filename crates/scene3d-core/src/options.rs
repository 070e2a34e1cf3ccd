//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Adapter selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerMode {
    /// Prefer a discrete GPU.
    #[default]
    HighPerformance,
    /// Prefer an integrated GPU.
    LowPower,
}

/// Blinn-Phong coefficients and the camera-relative key light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LightingConfig {
    /// Ambient term.
    pub ambient: f32,
    /// Diffuse term.
    pub diffuse: f32,
    /// Specular term.
    pub specular: f32,
    /// Specular exponent.
    pub shininess: f32,
    /// Key light weights along the camera's right, up and backward axes.
    pub key_light: [f32; 3],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: 0.4,
            diffuse: 0.6,
            specular: 0.2,
            shininess: 20.0,
            key_light: [0.5, 0.7, 1.0],
        }
    }
}

/// Options fixed for the life of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    /// Clear color of the visual pass (linear RGBA).
    pub background_color: [f32; 4],
    /// Minimum interval between hover picks, in milliseconds.
    pub hover_throttle_ms: u64,
    /// Over-provisioning factor applied when the instance buffers grow.
    pub buffer_slack: f32,
    /// Shading parameters.
    pub lighting: LightingConfig,
    /// Adapter preference.
    pub power_preference: PowerMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            background_color: [1.0, 1.0, 1.0, 1.0],
            hover_throttle_ms: 32,
            buffer_slack: 2.0,
            lighting: LightingConfig::default(),
            power_preference: PowerMode::default(),
        }
    }
}

impl EngineOptions {
    /// Parses options from JSON; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Hover throttle interval.
    #[must_use]
    pub fn hover_throttle(&self) -> Duration {
        Duration::from_millis(self.hover_throttle_ms)
    }

    /// Slack factor, never below 1.
    #[must_use]
    pub fn effective_slack(&self) -> f32 {
        if self.buffer_slack.is_finite() {
            self.buffer_slack.max(1.0)
        } else {
            1.0
        }
    }
}
