//! The typed seam over the simulation module's ABI.
//!
//! Handles crossing the host/module boundary are capability tokens, not
//! pointers: the module hands out opaque integers that are only meaningful
//! back inside the module. Each handle kind gets its own newtype so they
//! cannot be mixed up, and ownership transfer (create/destroy/borrow) is the
//! only legal operation on them.
//!
//! [`ParticlesAbi`] abstracts the export surface so the rest of the bridge
//! can run against either a real Wasm instance ([`crate::ModuleInstance`]) or
//! the in-memory [`testing::FakeAbi`].

use particles_bridge_common::BridgeError;

macro_rules! opaque_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw handle value received from the module.
            pub fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// The raw handle value, for passing back to the module.
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

opaque_handle!(
    /// A module-owned configuration record.
    ConfigHandle
);

opaque_handle!(
    /// Module-owned simulation state. Owns exactly one [`ConfigHandle`]
    /// inside the module.
    StateHandle
);

opaque_handle!(
    /// A transient per-frame render result inside the module. Must be
    /// released exactly once via `rendered_destroy`.
    RenderBuffer
);

opaque_handle!(
    /// A byte address inside the module's linear memory. Never dereferenced
    /// by the host directly; only through bounds-checked marshaling.
    GuestPtr
);

impl GuestPtr {
    /// Returns `true` for the module's null pointer.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// The simulation module's export surface, as seen by the host.
///
/// All calls are synchronous and may re-enter host callbacks before
/// returning. Implementations wrap traps and marshaling failures in
/// [`BridgeError`].
pub trait ParticlesAbi {
    /// `config_create(height, width, n_particles, max_edge_len, velocity_factor, node_radius)`.
    ///
    /// Integer fields must already be truncated; see
    /// [`RawSimulationConfig::normalize`](particles_bridge_common::RawSimulationConfig::normalize).
    fn config_create(
        &mut self,
        height: u32,
        width: u32,
        n_particles: u32,
        max_edge_len: f64,
        velocity_factor: f64,
        node_radius: f64,
    ) -> Result<ConfigHandle, BridgeError>;

    /// Create simulation state, transferring ownership of the config into it.
    fn state_create(&mut self, config: ConfigHandle) -> Result<StateHandle, BridgeError>;

    /// Destroy simulation state (and the config it owns).
    fn state_destroy(&mut self, state: StateHandle) -> Result<(), BridgeError>;

    /// Advance the simulation by one step.
    fn state_update(&mut self, state: StateHandle) -> Result<(), BridgeError>;

    /// Resize the simulation bounds.
    fn state_set_size(
        &mut self,
        state: StateHandle,
        height: u32,
        width: u32,
    ) -> Result<(), BridgeError>;

    /// Borrow the live config owned by the state. Read-only relation; the
    /// returned handle must not be destroyed by the host.
    fn state_borrow_config(&mut self, state: StateHandle) -> Result<ConfigHandle, BridgeError>;

    /// Toggle collision handling on a live config.
    fn config_set_collision_enabled(
        &mut self,
        config: ConfigHandle,
        enabled: bool,
    ) -> Result<(), BridgeError>;

    /// Toggle edge computation on a live config.
    fn config_set_edges_enabled(
        &mut self,
        config: ConfigHandle,
        enabled: bool,
    ) -> Result<(), BridgeError>;

    /// Set the magnetic field strength on a live config.
    fn config_set_magnetic_strength(
        &mut self,
        config: ConfigHandle,
        value: f64,
    ) -> Result<(), BridgeError>;

    /// Set the electric field strength on a live config.
    fn config_set_electric_strength(
        &mut self,
        config: ConfigHandle,
        x: f64,
        y: f64,
    ) -> Result<(), BridgeError>;

    /// Compute a frame, returning a transient render buffer.
    fn state_render(&mut self, state: StateHandle) -> Result<RenderBuffer, BridgeError>;

    /// Number of node records in the buffer.
    fn rendered_n_nodes(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError>;

    /// Number of edge records in the buffer.
    fn rendered_n_edges(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError>;

    /// Byte pointer to the node record array (null when empty).
    fn rendered_nodes_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError>;

    /// Byte pointer to the edge record array (null when empty).
    fn rendered_edges_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError>;

    /// Release the render buffer. Exactly once per buffer; skipping this
    /// leaks memory inside the module.
    fn rendered_destroy(&mut self, buffer: RenderBuffer) -> Result<(), BridgeError>;

    /// Read `count` consecutive `f64` values from module memory, through a
    /// view derived from the current memory region.
    fn read_f64_slice(&mut self, ptr: GuestPtr, count: usize) -> Result<Vec<f64>, BridgeError>;
}

/// A mutable borrow carries the ABI too, so a caller can lend an
/// implementation to a consumer (e.g. [`crate::Simulation`]) and keep it
/// inspectable afterwards.
impl<A: ParticlesAbi + ?Sized> ParticlesAbi for &mut A {
    fn config_create(
        &mut self,
        height: u32,
        width: u32,
        n_particles: u32,
        max_edge_len: f64,
        velocity_factor: f64,
        node_radius: f64,
    ) -> Result<ConfigHandle, BridgeError> {
        (**self).config_create(
            height,
            width,
            n_particles,
            max_edge_len,
            velocity_factor,
            node_radius,
        )
    }

    fn state_create(&mut self, config: ConfigHandle) -> Result<StateHandle, BridgeError> {
        (**self).state_create(config)
    }

    fn state_destroy(&mut self, state: StateHandle) -> Result<(), BridgeError> {
        (**self).state_destroy(state)
    }

    fn state_update(&mut self, state: StateHandle) -> Result<(), BridgeError> {
        (**self).state_update(state)
    }

    fn state_set_size(
        &mut self,
        state: StateHandle,
        height: u32,
        width: u32,
    ) -> Result<(), BridgeError> {
        (**self).state_set_size(state, height, width)
    }

    fn state_borrow_config(&mut self, state: StateHandle) -> Result<ConfigHandle, BridgeError> {
        (**self).state_borrow_config(state)
    }

    fn config_set_collision_enabled(
        &mut self,
        config: ConfigHandle,
        enabled: bool,
    ) -> Result<(), BridgeError> {
        (**self).config_set_collision_enabled(config, enabled)
    }

    fn config_set_edges_enabled(
        &mut self,
        config: ConfigHandle,
        enabled: bool,
    ) -> Result<(), BridgeError> {
        (**self).config_set_edges_enabled(config, enabled)
    }

    fn config_set_magnetic_strength(
        &mut self,
        config: ConfigHandle,
        value: f64,
    ) -> Result<(), BridgeError> {
        (**self).config_set_magnetic_strength(config, value)
    }

    fn config_set_electric_strength(
        &mut self,
        config: ConfigHandle,
        x: f64,
        y: f64,
    ) -> Result<(), BridgeError> {
        (**self).config_set_electric_strength(config, x, y)
    }

    fn state_render(&mut self, state: StateHandle) -> Result<RenderBuffer, BridgeError> {
        (**self).state_render(state)
    }

    fn rendered_n_nodes(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError> {
        (**self).rendered_n_nodes(buffer)
    }

    fn rendered_n_edges(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError> {
        (**self).rendered_n_edges(buffer)
    }

    fn rendered_nodes_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError> {
        (**self).rendered_nodes_ptr(buffer)
    }

    fn rendered_edges_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError> {
        (**self).rendered_edges_ptr(buffer)
    }

    fn rendered_destroy(&mut self, buffer: RenderBuffer) -> Result<(), BridgeError> {
        (**self).rendered_destroy(buffer)
    }

    fn read_f64_slice(&mut self, ptr: GuestPtr, count: usize) -> Result<Vec<f64>, BridgeError> {
        (**self).read_f64_slice(ptr, count)
    }
}

pub mod testing {
    //! An in-memory ABI double for tests.
    //!
    //! [`FakeAbi`] keeps handle tables and canned frame geometry on the host
    //! side so lifecycle and render code can be exercised without a compiled
    //! module.

    use std::collections::HashMap;

    use super::{ConfigHandle, GuestPtr, ParticlesAbi, RenderBuffer, StateHandle};
    use particles_bridge_common::BridgeError;

    /// Fake byte address of the node array.
    pub const NODES_PTR: u32 = 0x100;
    /// Fake byte address of the edge array.
    pub const EDGES_PTR: u32 = 0x1000;

    /// Live-parameter state of a fake config record.
    #[derive(Debug, Clone, Default)]
    pub struct FakeConfig {
        /// Last collision toggle applied, if any.
        pub collision_enabled: Option<bool>,
        /// Last edge toggle applied, if any.
        pub edges_enabled: Option<bool>,
        /// Last magnetic strength applied, if any.
        pub magnetic_strength: Option<f64>,
        /// Last electric strength applied, if any.
        pub electric_strength: Option<(f64, f64)>,
        /// Scalars received at `config_create`.
        pub created_with: (u32, u32, u32, f64, f64, f64),
    }

    /// In-memory implementation of [`ParticlesAbi`].
    #[derive(Debug, Default)]
    pub struct FakeAbi {
        next_handle: u32,
        configs: HashMap<u32, FakeConfig>,
        states: HashMap<u32, u32>,
        buffers: HashMap<u32, (Vec<f64>, Vec<f64>)>,

        /// Flat node fields (stride 2) served by the next render.
        pub nodes: Vec<f64>,
        /// Flat edge fields (stride 5) served by the next render.
        pub edges: Vec<f64>,

        /// Number of `state_update` calls.
        pub update_calls: u32,
        /// Number of `state_render` calls.
        pub render_calls: u32,
        /// Number of `rendered_destroy` calls.
        pub released_buffers: u32,
        /// Number of `state_destroy` calls.
        pub destroyed_states: u32,
        /// Last size passed to `state_set_size`.
        pub last_set_size: Option<(u32, u32)>,
    }

    impl FakeAbi {
        /// Create an empty fake with no canned geometry.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a fake serving the given node/edge field arrays.
        pub fn with_frame(nodes: Vec<f64>, edges: Vec<f64>) -> Self {
            Self {
                nodes,
                edges,
                ..Self::default()
            }
        }

        /// Inspect the config owned by a state.
        pub fn config_of(&self, state: StateHandle) -> Option<&FakeConfig> {
            let config = self.states.get(&state.raw())?;
            self.configs.get(config)
        }

        /// Returns `true` if any render buffer is still unreleased.
        pub fn has_live_buffers(&self) -> bool {
            !self.buffers.is_empty()
        }

        fn fresh_handle(&mut self) -> u32 {
            self.next_handle += 1;
            self.next_handle
        }

        fn config_mut(&mut self, config: ConfigHandle) -> Result<&mut FakeConfig, BridgeError> {
            self.configs
                .get_mut(&config.raw())
                .ok_or_else(|| BridgeError::handle_misuse("unknown config handle"))
        }

        fn buffer(&self, buffer: RenderBuffer) -> Result<&(Vec<f64>, Vec<f64>), BridgeError> {
            self.buffers
                .get(&buffer.raw())
                .ok_or_else(|| BridgeError::handle_misuse("unknown render buffer"))
        }
    }

    impl ParticlesAbi for FakeAbi {
        fn config_create(
            &mut self,
            height: u32,
            width: u32,
            n_particles: u32,
            max_edge_len: f64,
            velocity_factor: f64,
            node_radius: f64,
        ) -> Result<ConfigHandle, BridgeError> {
            let handle = self.fresh_handle();
            self.configs.insert(
                handle,
                FakeConfig {
                    created_with: (
                        height,
                        width,
                        n_particles,
                        max_edge_len,
                        velocity_factor,
                        node_radius,
                    ),
                    ..FakeConfig::default()
                },
            );
            Ok(ConfigHandle::from_raw(handle))
        }

        fn state_create(&mut self, config: ConfigHandle) -> Result<StateHandle, BridgeError> {
            if !self.configs.contains_key(&config.raw()) {
                return Err(BridgeError::handle_misuse("unknown config handle"));
            }
            let handle = self.fresh_handle();
            self.states.insert(handle, config.raw());
            Ok(StateHandle::from_raw(handle))
        }

        fn state_destroy(&mut self, state: StateHandle) -> Result<(), BridgeError> {
            let config = self
                .states
                .remove(&state.raw())
                .ok_or_else(|| BridgeError::handle_misuse("unknown state handle"))?;
            self.configs.remove(&config);
            self.destroyed_states += 1;
            Ok(())
        }

        fn state_update(&mut self, state: StateHandle) -> Result<(), BridgeError> {
            if !self.states.contains_key(&state.raw()) {
                return Err(BridgeError::handle_misuse("unknown state handle"));
            }
            self.update_calls += 1;
            Ok(())
        }

        fn state_set_size(
            &mut self,
            state: StateHandle,
            height: u32,
            width: u32,
        ) -> Result<(), BridgeError> {
            if !self.states.contains_key(&state.raw()) {
                return Err(BridgeError::handle_misuse("unknown state handle"));
            }
            self.last_set_size = Some((height, width));
            Ok(())
        }

        fn state_borrow_config(&mut self, state: StateHandle) -> Result<ConfigHandle, BridgeError> {
            self.states
                .get(&state.raw())
                .map(|c| ConfigHandle::from_raw(*c))
                .ok_or_else(|| BridgeError::handle_misuse("unknown state handle"))
        }

        fn config_set_collision_enabled(
            &mut self,
            config: ConfigHandle,
            enabled: bool,
        ) -> Result<(), BridgeError> {
            self.config_mut(config)?.collision_enabled = Some(enabled);
            Ok(())
        }

        fn config_set_edges_enabled(
            &mut self,
            config: ConfigHandle,
            enabled: bool,
        ) -> Result<(), BridgeError> {
            self.config_mut(config)?.edges_enabled = Some(enabled);
            Ok(())
        }

        fn config_set_magnetic_strength(
            &mut self,
            config: ConfigHandle,
            value: f64,
        ) -> Result<(), BridgeError> {
            self.config_mut(config)?.magnetic_strength = Some(value);
            Ok(())
        }

        fn config_set_electric_strength(
            &mut self,
            config: ConfigHandle,
            x: f64,
            y: f64,
        ) -> Result<(), BridgeError> {
            self.config_mut(config)?.electric_strength = Some((x, y));
            Ok(())
        }

        fn state_render(&mut self, state: StateHandle) -> Result<RenderBuffer, BridgeError> {
            if !self.states.contains_key(&state.raw()) {
                return Err(BridgeError::handle_misuse("unknown state handle"));
            }
            self.render_calls += 1;
            let handle = self.fresh_handle();
            self.buffers
                .insert(handle, (self.nodes.clone(), self.edges.clone()));
            Ok(RenderBuffer::from_raw(handle))
        }

        fn rendered_n_nodes(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError> {
            Ok(self.buffer(buffer)?.0.len() / 2)
        }

        fn rendered_n_edges(&mut self, buffer: RenderBuffer) -> Result<usize, BridgeError> {
            Ok(self.buffer(buffer)?.1.len() / 5)
        }

        fn rendered_nodes_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError> {
            let nodes = &self.buffer(buffer)?.0;
            Ok(if nodes.is_empty() {
                GuestPtr::from_raw(0)
            } else {
                GuestPtr::from_raw(NODES_PTR)
            })
        }

        fn rendered_edges_ptr(&mut self, buffer: RenderBuffer) -> Result<GuestPtr, BridgeError> {
            let edges = &self.buffer(buffer)?.1;
            Ok(if edges.is_empty() {
                GuestPtr::from_raw(0)
            } else {
                GuestPtr::from_raw(EDGES_PTR)
            })
        }

        fn rendered_destroy(&mut self, buffer: RenderBuffer) -> Result<(), BridgeError> {
            self.buffers
                .remove(&buffer.raw())
                .ok_or_else(|| BridgeError::handle_misuse("unknown render buffer"))?;
            self.released_buffers += 1;
            Ok(())
        }

        fn read_f64_slice(&mut self, ptr: GuestPtr, count: usize) -> Result<Vec<f64>, BridgeError> {
            let data = match ptr.raw() {
                NODES_PTR => &self.nodes,
                EDGES_PTR => &self.edges,
                other => {
                    return Err(BridgeError::memory(format!(
                        "unknown fake pointer: {other}"
                    )));
                }
            };

            if count > data.len() {
                return Err(BridgeError::memory(format!(
                    "Read of {count} f64s exceeds fake array of {}",
                    data.len()
                )));
            }

            Ok(data[..count].to_vec())
        }
    }
}
