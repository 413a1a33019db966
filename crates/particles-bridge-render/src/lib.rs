//! Frame rendering on top of the particle bridge.
//!
//! This crate turns the module's per-frame geometry into draw calls:
//!
//! - [`surface`]: the [`DrawSurface`] abstraction over a 2D drawing target,
//!   plus a recording implementation for tests and headless runs
//! - [`geometry`]: decoding of the module's packed node and edge records
//! - [`pipeline`]: the per-frame render pass and the animation loop
//!
//! The renderer never holds module memory across frames. Each frame renders
//! into a module-owned buffer, is decoded into host-owned geometry, and the
//! buffer is released before the next module call.

pub mod geometry;
pub mod pipeline;
pub mod surface;

pub use geometry::{FrameGeometry, RenderedEdge, RenderedNode};
pub use pipeline::{render_frame, FrameStats, FrameTicker, IntervalTicker, RenderLoop, RunSummary};
pub use surface::{DrawOp, DrawSurface, RecordingSurface};
