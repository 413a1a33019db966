//! Simulation configuration and normalization.
//!
//! This module defines:
//! - [`RawSimulationConfig`]: a possibly-partial configuration as received
//!   from callers or a config file
//! - [`SimulationConfig`]: the normalized record that is allowed to cross
//!   into the module
//! - [`SurfaceSize`]: the reference drawing-surface dimensions
//!
//! Normalization is a pure function with no module interaction. It must run
//! before any value crosses the memory boundary: the module assumes
//! already-valid integers and positive floats and performs no further
//! validation.

use serde::{Deserialize, Serialize};

/// Fixed fallback color for nodes and edges.
pub const DEFAULT_COLOR: &str = "#E2F0FF";

/// Dimensions of the target drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SurfaceSize {
    /// Surface height in pixels.
    pub height: u32,
    /// Surface width in pixels.
    pub width: u32,
}

impl SurfaceSize {
    /// Create a new surface size.
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

/// A possibly-partial simulation configuration.
///
/// Every field is optional; absent or out-of-domain values are replaced with
/// fixed defaults by [`RawSimulationConfig::normalize`]. `NaN` counts as out
/// of domain.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSimulationConfig {
    /// Simulation height. Valid domain: > 0. Default: surface height.
    pub height: Option<f64>,

    /// Simulation width. Valid domain: > 0. Default: surface width.
    pub width: Option<f64>,

    /// Number of particles. Valid domain: >= 1. Default: 50.
    pub n_particles: Option<f64>,

    /// Maximum edge length. Valid domain: > 0. Default: 200.
    pub max_edge_len: Option<f64>,

    /// Velocity multiplier. Valid domain: > 0. Default: 1.
    pub velocity_factor: Option<f64>,

    /// Node radius. Valid domain: > 0. Default: 5.
    pub node_radius: Option<f64>,

    /// Edge stroke width. Valid domain: >= 0. Default: 1.
    pub line_width: Option<f64>,

    /// Node fill color. Valid domain: non-empty. Default: [`DEFAULT_COLOR`].
    pub node_color: Option<String>,

    /// Edge stroke color. Valid domain: non-empty. Default: [`DEFAULT_COLOR`].
    pub line_color: Option<String>,

    /// Enable collision handling. `None` leaves the module default.
    pub collision_enabled: Option<bool>,

    /// Enable edge computation. `None` leaves the module default.
    pub edges_enabled: Option<bool>,

    /// Magnetic field strength. `None` leaves the module default.
    pub magnetic_strength: Option<f64>,

    /// Electric field strength, X component.
    pub electric_strength_x: Option<f64>,

    /// Electric field strength, Y component.
    pub electric_strength_y: Option<f64>,
}

/// A normalized simulation configuration.
///
/// Height, width, and particle count are already floored to integers here;
/// these are exactly the values handed to the module's `config_create`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Simulation height in integer pixels.
    pub height: u32,
    /// Simulation width in integer pixels.
    pub width: u32,
    /// Number of particles.
    pub n_particles: u32,
    /// Maximum edge length.
    pub max_edge_len: f64,
    /// Velocity multiplier.
    pub velocity_factor: f64,
    /// Node radius.
    pub node_radius: f64,
    /// Edge stroke width.
    pub line_width: f64,
    /// Node fill color.
    pub node_color: String,
    /// Edge stroke color.
    pub line_color: String,
    /// Collision toggle requested at construction, if any.
    pub collision_enabled: Option<bool>,
    /// Edge toggle requested at construction, if any.
    pub edges_enabled: Option<bool>,
    /// Magnetic strength requested at construction, if any.
    pub magnetic_strength: Option<f64>,
    /// Electric strength requested at construction, if any.
    pub electric_strength: Option<(f64, f64)>,
}

impl RawSimulationConfig {
    /// Normalize this configuration against a reference surface size.
    ///
    /// Each absent or out-of-domain field is replaced with its documented
    /// default; valid fields pass through untouched. Height, width, and
    /// particle count are floored to integers after defaulting.
    pub fn normalize(&self, surface: SurfaceSize) -> SimulationConfig {
        let height = in_domain(self.height, |v| v > 0.0).unwrap_or(f64::from(surface.height));
        let width = in_domain(self.width, |v| v > 0.0).unwrap_or(f64::from(surface.width));
        let n_particles = in_domain(self.n_particles, |v| v >= 1.0).unwrap_or(50.0);

        let electric_strength = match (self.electric_strength_x, self.electric_strength_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        };

        SimulationConfig {
            height: floor_u32(height),
            width: floor_u32(width),
            n_particles: floor_u32(n_particles),
            max_edge_len: in_domain(self.max_edge_len, |v| v > 0.0).unwrap_or(200.0),
            velocity_factor: in_domain(self.velocity_factor, |v| v > 0.0).unwrap_or(1.0),
            node_radius: in_domain(self.node_radius, |v| v > 0.0).unwrap_or(5.0),
            line_width: in_domain(self.line_width, |v| v >= 0.0).unwrap_or(1.0),
            node_color: non_empty(self.node_color.as_deref()),
            line_color: non_empty(self.line_color.as_deref()),
            collision_enabled: self.collision_enabled,
            edges_enabled: self.edges_enabled,
            magnetic_strength: self.magnetic_strength,
            electric_strength,
        }
    }
}

/// Keep a value only when present, finite, and inside its domain.
fn in_domain(value: Option<f64>, valid: impl Fn(f64) -> bool) -> Option<f64> {
    value.filter(|v| v.is_finite() && valid(*v))
}

fn non_empty(value: Option<&str>) -> String {
    match value {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => DEFAULT_COLOR.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_u32(v: f64) -> u32 {
    v.floor() as u32
}
