//! Integration tests for particles-bridge-core.
//!
//! These tests drive a real Wasmtime instance through the full bridge
//! pipeline:
//! - WAT compilation and instantiation with the host import surface
//! - Build identifier exchange through linear memory
//! - Simulation lifecycle against the module's exports
//! - Frame geometry reads out of the module's data segments

use wasmtime::Linker;

use particles_bridge_common::BridgeError;
use particles_bridge_core::{
    CompiledModule, GuestPtr, HostContext, ModuleInstance, ParticlesAbi, Simulation, WasmEngine,
};
use particles_bridge_common::{RawSimulationConfig, SurfaceSize};
use particles_bridge_host::{register_all, seeded_source};

/// A module implementing the complete export surface.
///
/// Behavior is canned: handles are constants, the build check accepts any
/// identifier starting with 'v', and the rendered geometry is two nodes at
/// (1,2) and (3,4) plus one edge (10,20)-(30,40) at half opacity, stored
/// in data segments as little-endian f64.
const FULL_ABI_WAT: &str = r#"
    (module
        (import "env" "rand01" (func $rand01 (result f64)))
        (memory (export "memory") 1)
        (global $bump (mut i32) (i32.const 4096))

        (func (export "alloc") (param $len i32) (result i32)
            (local $ptr i32)
            (local.set $ptr (global.get $bump))
            (global.set $bump (i32.add (global.get $bump) (local.get $len)))
            (local.get $ptr))
        (func (export "free") (param i32))

        (func (export "check_build_id") (param $ptr i32) (result i32)
            (if (result i32)
                (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 118))
                (then (i32.const 1))
                (else (i32.const 7))))

        (func (export "config_create")
            (param i32 i32 i32 f64 f64 f64) (result i32)
            (i32.const 11))
        (func (export "state_create") (param i32) (result i32) (i32.const 22))
        (func (export "state_destroy") (param i32))
        (func (export "state_update") (param i32)
            (drop (call $rand01)))
        (func (export "state_set_size") (param i32 i32 i32))
        (func (export "state_borrow_config") (param i32) (result i32)
            (i32.const 11))

        (func (export "config_enable_collision") (param i32))
        (func (export "config_disable_collision") (param i32))
        (func (export "config_enable_edges") (param i32))
        (func (export "config_disable_edges") (param i32))
        (func (export "config_set_magnetic_strength") (param i32 f64))
        (func (export "config_set_electric_strength") (param i32 f64 f64))

        (func (export "state_render") (param i32) (result i32) (i32.const 33))
        (func (export "rendered_get_n_nodes") (param i32) (result i32) (i32.const 2))
        (func (export "rendered_get_n_edges") (param i32) (result i32) (i32.const 1))
        (func (export "rendered_get_nodes_ref") (param i32) (result i32) (i32.const 1024))
        (func (export "rendered_get_edges_ref") (param i32) (result i32) (i32.const 2048))
        (func (export "rendered_destroy") (param i32))

        ;; nodes: 1.0 2.0 3.0 4.0
        (data (i32.const 1024)
            "\00\00\00\00\00\00\f0\3f\00\00\00\00\00\00\00\40\00\00\00\00\00\00\08\40\00\00\00\00\00\00\10\40")
        ;; edges: 10.0 20.0 30.0 40.0 0.5
        (data (i32.const 2048)
            "\00\00\00\00\00\00\24\40\00\00\00\00\00\00\34\40\00\00\00\00\00\00\3e\40\00\00\00\00\00\00\44\40\00\00\00\00\00\00\e0\3f")
    )
"#;

fn setup() -> (WasmEngine, CompiledModule, Linker<HostContext>) {
    let engine = WasmEngine::new().unwrap();
    let artifact = CompiledModule::from_wat(&engine, FULL_ABI_WAT).unwrap();
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker).unwrap();
    (engine, artifact, linker)
}

fn context() -> HostContext {
    HostContext::new(seeded_source(7))
}

// ============================================================================
// Test: Initialization and Version Guard
// ============================================================================

#[test]
fn test_initialize_with_accepted_build_id() {
    let (engine, artifact, linker) = setup();

    let instance = ModuleInstance::initialize(&engine, &artifact, &linker, context(), "v1.2.3");
    assert!(instance.is_ok());
}

#[test]
fn test_initialize_rejects_mismatched_build_id() {
    let (engine, artifact, linker) = setup();

    let result = ModuleInstance::initialize(&engine, &artifact, &linker, context(), "other");
    match result {
        Err(BridgeError::VersionMismatch { build_id, code }) => {
            assert_eq!(build_id, "other");
            assert_eq!(code, 7);
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
}

#[test]
fn test_development_suffix_bypasses_guard() {
    let (engine, artifact, linker) = setup();

    // The module would reject this identifier; the suffix means it is
    // never asked.
    let instance = ModuleInstance::initialize(
        &engine,
        &artifact,
        &linker,
        context(),
        "other-development",
    );
    assert!(instance.is_ok());
}

#[test]
fn test_instantiation_fails_without_host_imports() {
    let engine = WasmEngine::new().unwrap();
    let artifact = CompiledModule::from_wat(&engine, FULL_ABI_WAT).unwrap();
    let empty_linker = Linker::new(engine.inner());

    let result = ModuleInstance::instantiate(&engine, &artifact, &empty_linker, context());
    assert!(matches!(result, Err(BridgeError::Load { .. })));
}

// ============================================================================
// Test: String Marshaling
// ============================================================================

#[test]
fn test_cstring_round_trip_through_module_memory() {
    let (engine, artifact, linker) = setup();
    let mut instance =
        ModuleInstance::instantiate(&engine, &artifact, &linker, context()).unwrap();

    let buffer = instance.write_cstring("hello module").unwrap();
    let read_back = instance.read_cstring(buffer.ptr).unwrap();
    assert_eq!(read_back, "hello module");
    instance.free(buffer).unwrap();
}

// ============================================================================
// Test: Simulation Lifecycle Against a Real Instance
// ============================================================================

#[test]
fn test_simulation_lifecycle() {
    let (engine, artifact, linker) = setup();
    let instance =
        ModuleInstance::initialize(&engine, &artifact, &linker, context(), "v1.2.3").unwrap();

    let raw = RawSimulationConfig {
        n_particles: Some(2.0),
        collision_enabled: Some(true),
        magnetic_strength: Some(0.25),
        ..Default::default()
    };
    let mut sim = Simulation::new(instance, &raw, SurfaceSize::new(480, 640)).unwrap();

    // Exercises the env::rand01 import.
    sim.update().unwrap();
    sim.set_size(300.0, 400.5).unwrap();
    sim.enable_edges().unwrap();
    sim.disable_collision().unwrap();
    sim.set_electric_strength(1.0, -2.0).unwrap();

    sim.destroy().unwrap();
    assert!(!sim.is_active());
    assert!(matches!(
        sim.update(),
        Err(BridgeError::HandleMisuse { .. })
    ));
}

// ============================================================================
// Test: Frame Geometry Reads
// ============================================================================

#[test]
fn test_rendered_geometry_reads_from_linear_memory() {
    let (engine, artifact, linker) = setup();
    let mut instance =
        ModuleInstance::initialize(&engine, &artifact, &linker, context(), "v1.2.3").unwrap();

    let config = instance.config_create(480, 640, 2, 200.0, 1.0, 5.0).unwrap();
    let state = instance.state_create(config).unwrap();
    let buffer = instance.state_render(state).unwrap();

    assert_eq!(instance.rendered_n_nodes(buffer).unwrap(), 2);
    assert_eq!(instance.rendered_n_edges(buffer).unwrap(), 1);

    let nodes_ptr = instance.rendered_nodes_ptr(buffer).unwrap();
    let nodes = instance.read_f64_slice(nodes_ptr, 4).unwrap();
    assert_eq!(nodes, vec![1.0, 2.0, 3.0, 4.0]);

    let edges_ptr = instance.rendered_edges_ptr(buffer).unwrap();
    let edges = instance.read_f64_slice(edges_ptr, 5).unwrap();
    assert_eq!(edges, vec![10.0, 20.0, 30.0, 40.0, 0.5]);

    instance.rendered_destroy(buffer).unwrap();
    instance.state_destroy(state).unwrap();
}

#[test]
fn test_out_of_range_geometry_read_is_rejected() {
    let (engine, artifact, linker) = setup();
    let mut instance =
        ModuleInstance::initialize(&engine, &artifact, &linker, context(), "v1.2.3").unwrap();

    let result = instance.read_f64_slice(GuestPtr::from_raw(u32::MAX - 7), 4);
    assert!(matches!(result, Err(BridgeError::Memory { .. })));
}
