//! Module instantiation and the version guard.
//!
//! This module provides [`ModuleInstance`], one instantiation of the
//! compiled artifact bound to:
//!
//! 1. A fresh linear memory region (never shared across instances)
//! 2. The fixed host callback set registered on the linker
//! 3. The typed export surface, resolved once at instantiation
//!
//! After instantiation the build-identifier guard runs: the host writes its
//! identifier into module memory as a NUL-terminated string and asks the
//! module to verify it. The marshaling layout is a silent contract with the
//! module's compiled layout; a version skew corrupts memory instead of
//! failing loudly, so a mismatch aborts initialization.

use tracing::{debug, info, instrument, warn};
use wasmtime::{Linker, Memory, Store, TypedFunc};

use crate::abi::{ConfigHandle, GuestPtr, ParticlesAbi, RenderBuffer, StateHandle};
use crate::loader::CompiledModule;
use crate::memory::{self, F64View};
use crate::WasmEngine;
use particles_bridge_common::BridgeError;

/// Suffix marking a development build. A build identifier carrying it
/// bypasses the version guard entirely (the check is skipped, not passed).
pub const DEV_MARKER: &str = "development";

/// Verification result the module returns for a matching build identifier.
const BUILD_ID_OK: i32 = 1;

/// The host-provided random source, `[0, 1)`.
///
/// The module may call it synchronously during any exported function call,
/// including the very first one; treat it as a re-entrant callback point.
pub type RandSource = Box<dyn FnMut() -> f64 + Send>;

/// Per-instance state reachable from host callbacks.
pub struct HostContext {
    /// Unique instance identifier for tracing.
    instance_id: String,

    rand01: RandSource,
}

impl HostContext {
    /// Create a new context around a random source.
    pub fn new(rand01: RandSource) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().to_string(),
            rand01,
        }
    }

    /// The instance identifier for tracing.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Draw one value from the random source.
    pub fn rand01(&mut self) -> f64 {
        (self.rand01)()
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

/// A raw byte range allocated inside module memory.
///
/// Used transiently to pass strings into the module; the caller must hand it
/// back to [`ModuleInstance::free`] immediately after use.
#[derive(Debug, Clone, Copy)]
pub struct AllocatedBuffer {
    /// Start of the allocation.
    pub ptr: GuestPtr,
    /// Allocation length in bytes.
    pub len: usize,
}

/// The module's export surface as typed functions, resolved once.
struct AbiExports {
    alloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    check_build_id: TypedFunc<u32, i32>,

    config_create: TypedFunc<(u32, u32, u32, f64, f64, f64), u32>,
    state_create: TypedFunc<u32, u32>,
    state_destroy: TypedFunc<u32, ()>,
    state_update: TypedFunc<u32, ()>,
    state_set_size: TypedFunc<(u32, u32, u32), ()>,
    state_borrow_config: TypedFunc<u32, u32>,

    config_enable_collision: TypedFunc<u32, ()>,
    config_disable_collision: TypedFunc<u32, ()>,
    config_enable_edges: TypedFunc<u32, ()>,
    config_disable_edges: TypedFunc<u32, ()>,
    config_set_magnetic_strength: TypedFunc<(u32, f64), ()>,
    config_set_electric_strength: TypedFunc<(u32, f64, f64), ()>,

    state_render: TypedFunc<u32, u32>,
    rendered_get_n_nodes: TypedFunc<u32, u32>,
    rendered_get_n_edges: TypedFunc<u32, u32>,
    rendered_get_nodes_ref: TypedFunc<u32, u32>,
    rendered_get_edges_ref: TypedFunc<u32, u32>,
    rendered_destroy: TypedFunc<u32, ()>,
}

/// One instantiation of the compiled module.
///
/// Owns the store, the instance's linear memory, and the resolved export
/// surface. Exactly one live instance is expected per runtime environment.
pub struct ModuleInstance {
    store: Store<HostContext>,
    memory: Memory,
    exports: AbiExports,
}

impl ModuleInstance {
    /// Instantiate the compiled artifact with a fresh store and memory.
    ///
    /// Every ABI export (and the `memory` export) is resolved here; a
    /// missing or ill-typed export fails initialization early rather than
    /// at first use.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Load`] if instantiation fails or the export
    /// surface is incomplete.
    #[instrument(skip_all, fields(content_hash = %artifact.content_hash()))]
    pub fn instantiate(
        engine: &WasmEngine,
        artifact: &CompiledModule,
        linker: &Linker<HostContext>,
        ctx: HostContext,
    ) -> Result<Self, BridgeError> {
        let instance_id = ctx.instance_id().to_string();
        let mut store = Store::new(engine.inner(), ctx);

        let instance = linker
            .instantiate(&mut store, artifact.inner())
            .map_err(|e| BridgeError::load(format!("Instantiation failed: {e}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BridgeError::load("Module does not export 'memory'"))?;

        let exports = AbiExports::resolve(&instance, &mut store)?;

        info!(instance_id = %instance_id, "Module instantiated");

        Ok(Self {
            store,
            memory,
            exports,
        })
    }

    /// Instantiate and run the version guard in one step.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Load`] on instantiation failure and
    /// [`BridgeError::VersionMismatch`] when the guard rejects the build
    /// identifier; in both cases no usable instance is returned.
    pub fn initialize(
        engine: &WasmEngine,
        artifact: &CompiledModule,
        linker: &Linker<HostContext>,
        ctx: HostContext,
        build_id: &str,
    ) -> Result<Self, BridgeError> {
        let mut instance = Self::instantiate(engine, artifact, linker, ctx)?;
        instance.check_build_id(build_id)?;
        Ok(instance)
    }

    /// Exchange the build identifier with the module.
    ///
    /// Identifiers ending in the development marker bypass the check (the
    /// module is never called). Otherwise the identifier crosses the
    /// boundary as a NUL-terminated string; any verification result other
    /// than ok is a fatal [`BridgeError::VersionMismatch`].
    pub fn check_build_id(&mut self, local_id: &str) -> Result<(), BridgeError> {
        if local_id.ends_with(DEV_MARKER) {
            info!(build_id = %local_id, "Development mode; skipping build id check");
            return Ok(());
        }

        let code = self.with_cstring(local_id, |this, ptr| {
            this.exports
                .check_build_id
                .call(&mut this.store, ptr.raw())
                .map_err(|e| BridgeError::call("check_build_id", e.to_string()))
        })?;
        if code != BUILD_ID_OK {
            warn!(build_id = %local_id, code, "Build id rejected by module");
            return Err(BridgeError::VersionMismatch {
                build_id: local_id.to_string(),
                code,
            });
        }

        debug!(build_id = %local_id, "Build id verified");
        Ok(())
    }

    /// Allocate a byte range inside module memory.
    ///
    /// The caller owns the result and must release it with
    /// [`ModuleInstance::free`] exactly once.
    pub fn alloc(&mut self, len: usize) -> Result<AllocatedBuffer, BridgeError> {
        let len_u32 = u32::try_from(len)
            .map_err(|_| BridgeError::invalid_argument(format!("Allocation too large: {len}")))?;

        let ptr = self
            .exports
            .alloc
            .call(&mut self.store, len_u32)
            .map_err(|e| BridgeError::call("alloc", e.to_string()))?;

        Ok(AllocatedBuffer {
            ptr: GuestPtr::from_raw(ptr),
            len,
        })
    }

    /// Release a byte range previously returned by [`ModuleInstance::alloc`].
    pub fn free(&mut self, buffer: AllocatedBuffer) -> Result<(), BridgeError> {
        self.exports
            .free
            .call(&mut self.store, buffer.ptr.raw())
            .map_err(|e| BridgeError::call("free", e.to_string()))
    }

    /// Encode a string into module memory as NUL-terminated bytes.
    ///
    /// Ownership of the returned buffer passes to the caller.
    pub fn write_cstring(&mut self, s: &str) -> Result<AllocatedBuffer, BridgeError> {
        let mut data = Vec::with_capacity(s.len() + 1);
        data.extend_from_slice(s.as_bytes());
        data.push(0);

        let buffer = self.alloc(data.len())?;
        if let Err(e) = memory::write_bytes(&self.memory, &mut self.store, buffer.ptr, &data) {
            // Surface the write error; the freed buffer is best-effort here.
            let _ = self.free(buffer);
            return Err(e);
        }

        Ok(buffer)
    }

    /// Read a NUL-terminated string out of module memory.
    pub fn read_cstring(&mut self, ptr: GuestPtr) -> Result<String, BridgeError> {
        memory::read_cstring(&self.memory, &self.store, ptr)
    }

    /// Run `f` with `s` marshaled into module memory as a NUL-terminated
    /// string. The allocation is freed whether or not `f` succeeds.
    pub fn with_cstring<R>(
        &mut self,
        s: &str,
        f: impl FnOnce(&mut Self, GuestPtr) -> Result<R, BridgeError>,
    ) -> Result<R, BridgeError> {
        let buffer = self.write_cstring(s)?;
        let result = f(self, buffer.ptr);
        let freed = self.free(buffer);

        let value = result?;
        freed?;
        Ok(value)
    }

    /// Current size of the module's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// The instance identifier for tracing.
    pub fn instance_id(&self) -> &str {
        self.store.data().instance_id()
    }
}

impl AbiExports {
    fn resolve(
        instance: &wasmtime::Instance,
        store: &mut Store<HostContext>,
    ) -> Result<Self, BridgeError> {
        fn typed<P, R>(
            instance: &wasmtime::Instance,
            store: &mut Store<HostContext>,
            name: &str,
        ) -> Result<TypedFunc<P, R>, BridgeError>
        where
            P: wasmtime::WasmParams,
            R: wasmtime::WasmResults,
        {
            instance.get_typed_func::<P, R>(&mut *store, name).map_err(|e| {
                BridgeError::load(format!("Missing or ill-typed export '{name}': {e}"))
            })
        }

        Ok(Self {
            alloc: typed(instance, store, "alloc")?,
            free: typed(instance, store, "free")?,
            check_build_id: typed(instance, store, "check_build_id")?,

            config_create: typed(instance, store, "config_create")?,
            state_create: typed(instance, store, "state_create")?,
            state_destroy: typed(instance, store, "state_destroy")?,
            state_update: typed(instance, store, "state_update")?,
            state_set_size: typed(instance, store, "state_set_size")?,
            state_borrow_config: typed(instance, store, "state_borrow_config")?,

            config_enable_collision: typed(instance, store, "config_enable_collision")?,
            config_disable_collision: typed(instance, store, "config_disable_collision")?,
            config_enable_edges: typed(instance, store, "config_enable_edges")?,
            config_disable_edges: typed(instance, store, "config_disable_edges")?,
            config_set_magnetic_strength: typed(instance, store, "config_set_magnetic_strength")?,
            config_set_electric_strength: typed(instance, store, "config_set_electric_strength")?,

            state_render: typed(instance, store, "state_render")?,
            rendered_get_n_nodes: typed(instance, store, "rendered_get_n_nodes")?,
            rendered_get_n_edges: typed(instance, store, "rendered_get_n_edges")?,
            rendered_get_nodes_ref: typed(instance, store, "rendered_get_nodes_ref")?,
            rendered_get_edges_ref: typed(instance, store, "rendered_get_edges_ref")?,
            rendered_destroy: typed(instance, store, "rendered_destroy")?,
        })
    }
}

impl ParticlesAbi for ModuleInstance {
    fn config_create(
        &mut self,
        height: u32,
        width: u32,
        n_particles: u32,
        max_edge_len: f64,
        velocity_factor: f64,
        node_radius: f64,
    ) -> Result<ConfigHandle, BridgeError> {
        self.exports
            .config_create
            .call(
                &mut self.store,
                (
                    height,
                    width,
                    n_particles,
                    max_edge_len,
                    velocity_factor,
                    node_radius,
                ),
            )
            .map(ConfigHandle::from_raw)
            .map_err(|e| BridgeError::call("config_create", e.to_string()))
    }

    fn state_create(&mut self, config: ConfigHandle) -> Result<StateHandle, BridgeError> {
        self.exports
            .state_create
            .call(&mut self.store, config.raw())
            .map(StateHandle::from_raw)
            .map_err(|e| BridgeError::call("state_create", e.to_string()))
    }

    fn state_destroy(&mut self, state: StateHandle) -> Result<(), BridgeError> {
        self.exports
            .state_destroy
            .call(&mut self.store, state.raw())
            .map_err(|e| BridgeError::call("state_destroy", e.to_string()))
    }

    fn state_update(&mut self, state: StateHandle) -> Result<(), BridgeError> {
        self.exports
            .state_update
            .call(&mut self.store, state.raw())
            .map_err(|e| BridgeError::call("state_update", e.to_string()))
    }

    fn state_set_size(
        &mut self,
        state: StateHandle,
        height: u32,
        width: u32,
    ) -> Result<(), BridgeError> {
        self.exports
            .state_set_size
            .call(&mut self.store, (state.raw(), height, width))
            .map_err(|e| BridgeError::call("state_set_size", e.to_string()))
    }

    fn state_borrow_config(&mut self, state: StateHandle) -> Result<ConfigHandle, BridgeError> {
        self.exports
            .state_borrow_config
            .call(&mut self.store, state.raw())
            .map(ConfigHandle::from_raw)
            .map_err(|e| BridgeError::call("state_borrow_config", e.to_string()))
    }

    fn config_set_collision_enabled(
        &mut self,
        config: ConfigHandle,
        enabled: bool,
    ) -> Result<(), BridgeError> {
        let (func, name) = if enabled {
            (&self.exports.config_enable_collision, "config_enable_collision")
        } else {
            (
                &self.exports.config_disable_collision,
                "config_disable_collision",
            )
        };
        func.call(&mut self.store, config.raw())
            .map_err(|e| BridgeError::call(name, e.to_string()))
    }

    fn config_set_edges_enabled(
        &mut self,
        config: ConfigHandle,
        enabled: bool,
    ) -> Result<(), BridgeError> {
        let (func, name) = if enabled {
            (&self.exports.config_enable_edges, "config_enable_edges")
        } else {
            (&self.exports.config_disable_edges, "config_disable_edges")
        };
        func.call(&mut self.store, config.raw())
            .map_err(|e| BridgeError::call(name, e.to_string()))
    }

    fn config_set_magnetic_strength(
        &mut self,
        config: ConfigHandle,
        value: f64,
    ) -> Result<(), BridgeError> {
        self.exports
            .config_set_magnetic_strength
            .call(&mut self.store, (config.raw(), value))
            .map_err(|e| BridgeError::call("config_set_magnetic_strength", e.to_string()))
    }

    fn config_set_electric_strength(
        &mut self,
        config: ConfigHandle,
        x: f64,
        y: f64,
    ) -> Result<(), BridgeError> {
        self.exports
            .config_set_electric_strength
            .call(&mut self.store, (config.raw(), x, y))
            .map_err(|e| BridgeError::call("config_set_electric_strength", e.to_string()))
    }

    fn state_render(&mut self, state: StateHandle) -> Result<RenderBuffer, BridgeError> {
        self.exports
            .state_render
            .call(&mut self.store, state.raw())
            .map(RenderBuffer::from_raw)
            .map_err(|e| BridgeError::call("state_render", e.to_string()))
    }

    fn rendered_n_nodes(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError> {
        self.exports
            .rendered_get_n_nodes
            .call(&mut self.store, buffer.raw())
            .map(|n| n as usize)
            .map_err(|e| BridgeError::call("rendered_get_n_nodes", e.to_string()))
    }

    fn rendered_n_edges(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError> {
        self.exports
            .rendered_get_n_edges
            .call(&mut self.store, buffer.raw())
            .map(|n| n as usize)
            .map_err(|e| BridgeError::call("rendered_get_n_edges", e.to_string()))
    }

    fn rendered_nodes_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError> {
        self.exports
            .rendered_get_nodes_ref
            .call(&mut self.store, buffer.raw())
            .map(GuestPtr::from_raw)
            .map_err(|e| BridgeError::call("rendered_get_nodes_ref", e.to_string()))
    }

    fn rendered_edges_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError> {
        self.exports
            .rendered_get_edges_ref
            .call(&mut self.store, buffer.raw())
            .map(GuestPtr::from_raw)
            .map_err(|e| BridgeError::call("rendered_get_edges_ref", e.to_string()))
    }

    fn rendered_destroy(&mut self, buffer: RenderBuffer) -> Result<(), BridgeError> {
        self.exports
            .rendered_destroy
            .call(&mut self.store, buffer.raw())
            .map_err(|e| BridgeError::call("rendered_destroy", e.to_string()))
    }

    fn read_f64_slice(&mut self, ptr: GuestPtr, count: usize) -> Result<Vec<f64>, BridgeError> {
        // The view is re-derived from the live memory region on every call;
        // linear memory may have grown (and moved) since the last decode.
        let view = F64View::new(self.memory.data(&self.store));
        view.read_slice(ptr, count)
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("instance_id", &self.instance_id())
            .field("memory_size", &self.memory_size())
            .finish_non_exhaustive()
    }
}
