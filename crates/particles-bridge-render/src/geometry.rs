//! Decoding of the module's packed frame geometry.
//!
//! After a render call the module exposes two packed arrays of `f64`
//! records in its linear memory:
//!
//! - nodes: 2 values per record, the particle's position
//! - edges: 5 values per record, two endpoint positions plus an opacity
//!
//! Decoding copies both arrays into host-owned vectors so the backing
//! buffer can be released immediately. When a count is zero the matching
//! pointer is never requested; the module may return a null or dangling
//! pointer for an empty array.

use particles_bridge_common::BridgeError;
use particles_bridge_core::{ParticlesAbi, RenderBuffer};

/// `f64` values per node record.
pub const NODE_STRIDE: usize = 2;

/// `f64` values per edge record.
pub const EDGE_STRIDE: usize = 5;

/// One particle's rendered position, in the order the module packs it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedNode {
    pub x: f64,
    pub y: f64,
}

/// One rendered edge between two particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedEdge {
    pub left_x: f64,
    pub left_y: f64,
    pub right_x: f64,
    pub right_y: f64,

    /// Opacity in `[0, 1]`, fading with edge length.
    pub opacity: f64,
}

/// A fully decoded frame, owned by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameGeometry {
    pub nodes: Vec<RenderedNode>,
    pub edges: Vec<RenderedEdge>,
}

impl FrameGeometry {
    /// Decode the geometry behind `buffer` into host-owned vectors.
    ///
    /// The buffer itself is not released here; the caller releases it
    /// whether or not decoding succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if any count, pointer, or memory read fails.
    pub fn decode<A: ParticlesAbi>(abi: &mut A, buffer: RenderBuffer) -> Result<Self, BridgeError> {
        let n_nodes = abi.rendered_n_nodes(buffer)?;
        let n_edges = abi.rendered_n_edges(buffer)?;

        let nodes = if n_nodes == 0 {
            Vec::new()
        } else {
            let ptr = abi.rendered_nodes_ptr(buffer)?;
            let count = n_nodes
                .checked_mul(NODE_STRIDE)
                .ok_or_else(|| BridgeError::memory("Node count overflow"))?;
            let raw = abi.read_f64_slice(ptr, count)?;
            raw.chunks_exact(NODE_STRIDE)
                .map(|record| RenderedNode {
                    x: record[0],
                    y: record[1],
                })
                .collect()
        };

        let edges = if n_edges == 0 {
            Vec::new()
        } else {
            let ptr = abi.rendered_edges_ptr(buffer)?;
            let count = n_edges
                .checked_mul(EDGE_STRIDE)
                .ok_or_else(|| BridgeError::memory("Edge count overflow"))?;
            let raw = abi.read_f64_slice(ptr, count)?;
            raw.chunks_exact(EDGE_STRIDE)
                .map(|record| RenderedEdge {
                    left_x: record[0],
                    left_y: record[1],
                    right_x: record[2],
                    right_y: record[3],
                    opacity: record[4],
                })
                .collect()
        };

        Ok(Self { nodes, edges })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
