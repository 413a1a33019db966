//! Common types, errors, and configuration for particles-bridge.
//!
//! This crate provides shared functionality used across the particles-bridge workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Simulation configuration and its normalization rules
//! - TOML configuration file structures for the CLI

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{RawSimulationConfig, SimulationConfig, SurfaceSize};
pub use config_file::{BridgeConfigFile, ConfigFileError};
pub use error::BridgeError;
