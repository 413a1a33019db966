//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the bridge. It is shared by every
//! instantiation and contains no per-instance state. Calls into the module
//! are synchronous; the only suspension points in the bridge are byte
//! acquisition and compilation, which happen before an engine instance ever
//! executes guest code.

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use particles_bridge_common::BridgeError;

/// Shared WebAssembly engine wrapper.
///
/// One engine serves every module instantiation in the process. The
/// simulation module is a single-instance, synchronous collaborator, so the
/// engine runs without async support, fuel metering, or instance pooling.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
}

impl WasmEngine {
    /// Create a new WebAssembly engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is rejected.
    pub fn new() -> Result<Self, BridgeError> {
        let mut config = Config::new();

        config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        let engine = Engine::new(&config)
            .map_err(|e| BridgeError::load(format!("Failed to create Wasmtime engine: {e}")))?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation() {
        let engine = WasmEngine::new();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_engine_is_shareable() {
        let engine = WasmEngine::new().unwrap();
        let clone = engine.clone();

        // Both handles point at the same engine
        assert!(Engine::same(engine.inner(), clone.inner()));
    }

    #[test]
    fn test_engine_debug() {
        let engine = WasmEngine::new().unwrap();
        let debug_str = format!("{engine:?}");
        assert!(debug_str.contains("WasmEngine"));
    }
}
