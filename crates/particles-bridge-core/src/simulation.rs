//! The handle-based lifecycle for module-owned simulation state.
//!
//! A [`Simulation`] goes through three states: unconstructed, active, and
//! destroyed (terminal). Construction normalizes the configuration, creates
//! a config record inside the module, and trades it for a state handle.
//! While active, every live-parameter change first borrows the config back
//! from the state (a read-only relation, not a new allocation) and then
//! calls the corresponding setter.
//!
//! Destruction releases the module-side state exactly once; the host-side
//! handle is cleared to a sentinel so later operations fail with
//! [`BridgeError::HandleMisuse`] instead of corrupting the module.

use tracing::debug;

use crate::abi::{ConfigHandle, ParticlesAbi, StateHandle};
use particles_bridge_common::{BridgeError, RawSimulationConfig, SimulationConfig, SurfaceSize};

/// An active simulation backed by module-owned state.
///
/// Generic over the ABI carrier so tests can run against
/// [`crate::abi::testing::FakeAbi`] instead of a compiled module.
pub struct Simulation<A> {
    abi: A,
    state: Option<StateHandle>,
    config: SimulationConfig,
}

impl<A: ParticlesAbi> Simulation<A> {
    /// Construct simulation state inside the module from a raw configuration.
    ///
    /// The configuration is normalized first (the module performs no
    /// validation of its own), then any live parameters the caller requested
    /// are applied through the borrowed config.
    ///
    /// # Errors
    ///
    /// Returns an error if any module call fails, including rejection of a
    /// non-finite field strength.
    pub fn new(
        mut abi: A,
        raw: &RawSimulationConfig,
        surface: SurfaceSize,
    ) -> Result<Self, BridgeError> {
        let config = raw.normalize(surface);

        let config_handle = abi.config_create(
            config.height,
            config.width,
            config.n_particles,
            config.max_edge_len,
            config.velocity_factor,
            config.node_radius,
        )?;
        let state = abi.state_create(config_handle)?;

        debug!(
            height = config.height,
            width = config.width,
            n_particles = config.n_particles,
            "Simulation state created"
        );

        let mut simulation = Self {
            abi,
            state: Some(state),
            config,
        };
        if let Err(e) = simulation.apply_requested_parameters() {
            // The state already exists inside the module; release it before
            // surfacing the error so the handle is not leaked.
            let _ = simulation.destroy();
            return Err(e);
        }

        Ok(simulation)
    }

    /// Advance the simulation by one step.
    pub fn update(&mut self) -> Result<(), BridgeError> {
        let state = self.state()?;
        self.abi.state_update(state)
    }

    /// Resize the simulation bounds. Inputs are truncated to integers.
    pub fn set_size(&mut self, height: f64, width: f64) -> Result<(), BridgeError> {
        let state = self.state()?;
        self.abi
            .state_set_size(state, floor_u32(height), floor_u32(width))
    }

    /// Enable collision handling.
    pub fn enable_collision(&mut self) -> Result<(), BridgeError> {
        let config = self.borrow_config()?;
        self.abi.config_set_collision_enabled(config, true)
    }

    /// Disable collision handling.
    pub fn disable_collision(&mut self) -> Result<(), BridgeError> {
        let config = self.borrow_config()?;
        self.abi.config_set_collision_enabled(config, false)
    }

    /// Enable edge computation.
    pub fn enable_edges(&mut self) -> Result<(), BridgeError> {
        let config = self.borrow_config()?;
        self.abi.config_set_edges_enabled(config, true)
    }

    /// Disable edge computation.
    pub fn disable_edges(&mut self) -> Result<(), BridgeError> {
        let config = self.borrow_config()?;
        self.abi.config_set_edges_enabled(config, false)
    }

    /// Set the magnetic field strength.
    ///
    /// Non-finite values are rejected before crossing the boundary.
    pub fn set_magnetic_strength(&mut self, value: f64) -> Result<(), BridgeError> {
        require_finite("magnetic strength", value)?;
        let config = self.borrow_config()?;
        self.abi.config_set_magnetic_strength(config, value)
    }

    /// Set the electric field strength.
    ///
    /// Non-finite components are rejected before crossing the boundary.
    pub fn set_electric_strength(&mut self, x: f64, y: f64) -> Result<(), BridgeError> {
        require_finite("electric strength x", x)?;
        require_finite("electric strength y", y)?;
        let config = self.borrow_config()?;
        self.abi.config_set_electric_strength(config, x, y)
    }

    /// Destroy the module-side state.
    ///
    /// The first call releases the state and clears the host-side handle;
    /// repeated calls are no-ops.
    pub fn destroy(&mut self) -> Result<(), BridgeError> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        debug!("Destroying simulation state");
        self.abi.state_destroy(state)
    }

    /// Returns `true` while the simulation holds a live state handle.
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// The normalized configuration, including the draw style.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The live state handle, if the simulation is still active.
    pub fn state_handle(&self) -> Option<StateHandle> {
        self.state
    }

    /// Access the ABI carrier, e.g. for per-frame render calls.
    pub fn abi_mut(&mut self) -> &mut A {
        &mut self.abi
    }

    fn state(&self) -> Result<StateHandle, BridgeError> {
        self.state
            .ok_or_else(|| BridgeError::handle_misuse("Simulation already destroyed"))
    }

    fn borrow_config(&mut self) -> Result<ConfigHandle, BridgeError> {
        let state = self.state()?;
        self.abi.state_borrow_config(state)
    }

    fn apply_requested_parameters(&mut self) -> Result<(), BridgeError> {
        if let Some(enabled) = self.config.collision_enabled {
            let config = self.borrow_config()?;
            self.abi.config_set_collision_enabled(config, enabled)?;
        }
        if let Some(enabled) = self.config.edges_enabled {
            let config = self.borrow_config()?;
            self.abi.config_set_edges_enabled(config, enabled)?;
        }
        if let Some(value) = self.config.magnetic_strength {
            self.set_magnetic_strength(value)?;
        }
        if let Some((x, y)) = self.config.electric_strength {
            self.set_electric_strength(x, y)?;
        }
        Ok(())
    }
}

fn require_finite(what: &str, value: f64) -> Result<(), BridgeError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(BridgeError::invalid_argument(format!(
            "{what} must be a finite number, got {value}"
        )))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_u32(v: f64) -> u32 {
    v.max(0.0).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::testing::FakeAbi;

    fn active_simulation() -> Simulation<FakeAbi> {
        Simulation::new(
            FakeAbi::new(),
            &RawSimulationConfig::default(),
            SurfaceSize::new(480, 640),
        )
        .unwrap()
    }

    #[test]
    fn test_construction_passes_normalized_scalars() {
        let raw = RawSimulationConfig {
            n_particles: Some(12.7),
            ..Default::default()
        };
        let sim = Simulation::new(FakeAbi::new(), &raw, SurfaceSize::new(480, 640)).unwrap();

        let state = sim.state_handle().unwrap();
        let config = sim.abi.config_of(state).unwrap();
        assert_eq!(config.created_with.0, 480);
        assert_eq!(config.created_with.1, 640);
        assert_eq!(config.created_with.2, 12);
    }

    #[test]
    fn test_requested_parameters_applied_at_construction() {
        let raw = RawSimulationConfig {
            collision_enabled: Some(true),
            edges_enabled: Some(false),
            magnetic_strength: Some(0.5),
            electric_strength_x: Some(1.0),
            electric_strength_y: Some(-1.0),
            ..Default::default()
        };
        let sim = Simulation::new(FakeAbi::new(), &raw, SurfaceSize::new(100, 100)).unwrap();

        let state = sim.state_handle().unwrap();
        let config = sim.abi.config_of(state).unwrap();
        assert_eq!(config.collision_enabled, Some(true));
        assert_eq!(config.edges_enabled, Some(false));
        assert_eq!(config.magnetic_strength, Some(0.5));
        assert_eq!(config.electric_strength, Some((1.0, -1.0)));
    }

    #[test]
    fn test_collision_toggle_reflects_last_call() {
        let mut sim = active_simulation();

        sim.enable_collision().unwrap();
        sim.disable_collision().unwrap();
        sim.enable_collision().unwrap();

        let state = sim.state_handle().unwrap();
        let config = sim.abi.config_of(state).unwrap();
        assert_eq!(config.collision_enabled, Some(true));

        sim.disable_collision().unwrap();
        let config = sim.abi.config_of(state).unwrap();
        assert_eq!(config.collision_enabled, Some(false));
    }

    #[test]
    fn test_set_size_truncates() {
        let mut sim = active_simulation();
        sim.set_size(99.9, 101.2).unwrap();
        assert_eq!(sim.abi.last_set_size, Some((99, 101)));
    }

    #[test]
    fn test_non_finite_strength_rejected_before_boundary() {
        let mut sim = active_simulation();

        let result = sim.set_magnetic_strength(f64::NAN);
        assert!(matches!(result, Err(BridgeError::InvalidArgument { .. })));

        let result = sim.set_electric_strength(1.0, f64::INFINITY);
        assert!(matches!(result, Err(BridgeError::InvalidArgument { .. })));

        // Nothing crossed the boundary
        let state = sim.state_handle().unwrap();
        let config = sim.abi.config_of(state).unwrap();
        assert_eq!(config.magnetic_strength, None);
        assert_eq!(config.electric_strength, None);
    }

    #[test]
    fn test_failed_construction_releases_state() {
        let mut abi = FakeAbi::new();
        let raw = RawSimulationConfig {
            magnetic_strength: Some(f64::NAN),
            ..Default::default()
        };

        let result = Simulation::new(&mut abi, &raw, SurfaceSize::new(100, 100));
        assert!(matches!(result, Err(BridgeError::InvalidArgument { .. })));

        // The state created before the failure was released again
        assert_eq!(abi.destroyed_states, 1);
    }

    #[test]
    fn test_failed_electric_strength_releases_state() {
        let mut abi = FakeAbi::new();
        let raw = RawSimulationConfig {
            electric_strength_x: Some(f64::INFINITY),
            electric_strength_y: Some(0.0),
            ..Default::default()
        };

        let result = Simulation::new(&mut abi, &raw, SurfaceSize::new(100, 100));
        assert!(matches!(result, Err(BridgeError::InvalidArgument { .. })));
        assert_eq!(abi.destroyed_states, 1);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut sim = active_simulation();
        assert!(sim.is_active());

        sim.destroy().unwrap();
        assert!(!sim.is_active());
        assert_eq!(sim.abi.destroyed_states, 1);

        // Second destroy is a no-op, not a second module call
        sim.destroy().unwrap();
        assert_eq!(sim.abi.destroyed_states, 1);
    }

    #[test]
    fn test_operations_after_destroy_fail() {
        let mut sim = active_simulation();
        sim.destroy().unwrap();

        assert!(matches!(
            sim.update(),
            Err(BridgeError::HandleMisuse { .. })
        ));
        assert!(matches!(
            sim.enable_edges(),
            Err(BridgeError::HandleMisuse { .. })
        ));
        assert!(matches!(
            sim.set_size(10.0, 10.0),
            Err(BridgeError::HandleMisuse { .. })
        ));
    }
}
