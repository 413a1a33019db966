//! Core interop layer for particles-bridge.
//!
//! This crate provides the host side of the module boundary:
//! - [`WasmEngine`]: configured Wasmtime engine, shared across instantiations
//! - [`ModuleLoader`] / [`CompiledModule`]: byte acquisition and compile-once caching
//! - [`ModuleInstance`]: one instantiation with its own linear memory, plus the
//!   build-identifier version guard
//! - [`ParticlesAbi`]: the typed seam over the module ABI, with opaque handle newtypes
//! - [`Simulation`]: the handle-based lifecycle for module-owned simulation state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared across all instantiations)                     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              ModuleLoader → CompiledModule              │
//! │  (Compiled once per process, cached)                    │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          ModuleInstance (store + linear memory)         │
//! │  version guard · alloc/free · string + f64 marshaling   │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              Simulation (StateHandle owner)             │
//! │  update · set_size · live parameters · render           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod abi;
pub mod engine;
pub mod instance;
pub mod loader;
pub mod memory;
pub mod simulation;

pub use abi::{ConfigHandle, GuestPtr, ParticlesAbi, RenderBuffer, StateHandle};
pub use engine::WasmEngine;
pub use instance::{AllocatedBuffer, HostContext, ModuleInstance, RandSource};
pub use loader::{CompiledModule, ModuleLoader, ModuleSource};
pub use simulation::Simulation;
