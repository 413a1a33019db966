//! Host functions for the particles bridge.
//!
//! This crate provides the host-side implementations of the imports the
//! particle module declares. The module is otherwise self-contained: the
//! only capability it needs from the outside world is a source of
//! randomness for particle placement and motion.
//!
//! # Interfaces
//!
//! - [`rand`]: Uniform random samples in `[0, 1)`, with a seedable variant
//!   for reproducible runs
//! - [`linker`]: Registration of the import surface on a Wasmtime linker

pub mod linker;
pub mod rand;

pub use linker::{register_all, register_rand01};
pub use self::rand::{random_source, seeded_source};
