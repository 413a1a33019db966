//! Host function registration for Wasmtime linkers.
//!
//! The particle module declares its import surface in the `env` namespace.
//! Every import must be registered on the linker before instantiation or
//! instantiation fails with a link error.

use tracing::debug;
use wasmtime::{Caller, Linker};

use particles_bridge_common::BridgeError;
use particles_bridge_core::HostContext;

/// Register all host functions the particle module imports.
///
/// Currently this is the single import `env::rand01`.
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<HostContext>) -> Result<(), BridgeError> {
    register_rand01(linker)?;
    debug!("Host import surface registered");
    Ok(())
}

/// Register the randomness host function.
///
/// Registers `env::rand01() -> f64`, which the module calls whenever it
/// needs a uniform sample in `[0, 1)`. The sample comes from the
/// [`HostContext`]'s injected source, so a seeded context makes the whole
/// simulation deterministic.
pub fn register_rand01(linker: &mut Linker<HostContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap("env", "rand01", |mut caller: Caller<'_, HostContext>| {
            caller.data_mut().rand01()
        })
        .map_err(|e| BridgeError::load(format!("Failed to register rand01 function: {e}")))?;

    Ok(())
}
