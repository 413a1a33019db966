//! The per-frame render pass and the animation loop.
//!
//! A frame is rendered in four steps: ask the module to render into a
//! module-owned buffer, decode the packed geometry into host memory,
//! release the buffer, then replay the geometry as draw calls. The buffer
//! is released even when decoding fails; a leaked buffer accumulates in
//! module memory for the lifetime of the instance.
//!
//! The coordinate order in the draw calls is deliberate: geometry records
//! store `(x, y)` but the surface receives `(y, x)`, matching the axis
//! convention the module's packing and the renderer agreed on.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::geometry::FrameGeometry;
use crate::surface::DrawSurface;
use particles_bridge_common::BridgeError;
use particles_bridge_core::{ParticlesAbi, Simulation};

/// Counts from one rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub nodes: usize,
    pub edges: usize,
}

/// Render the simulation's current state onto `surface`.
///
/// # Errors
///
/// Returns an error if the simulation is destroyed or any module call
/// fails. The module-side frame buffer is released in every case.
pub fn render_frame<A: ParticlesAbi, S: DrawSurface>(
    simulation: &mut Simulation<A>,
    surface: &mut S,
) -> Result<FrameStats, BridgeError> {
    let style = simulation.config().clone();
    let state = simulation
        .state_handle()
        .ok_or_else(|| BridgeError::handle_misuse("Cannot render a destroyed simulation"))?;

    let abi = simulation.abi_mut();
    let buffer = abi.state_render(state)?;

    // Release the buffer regardless of how decoding went.
    let decoded = FrameGeometry::decode(abi, buffer);
    let released = abi.rendered_destroy(buffer);
    let geometry = decoded?;
    released?;

    draw_geometry(
        surface,
        &style.node_color,
        &style.line_color,
        &geometry,
        style.node_radius,
        style.line_width,
    );

    trace!(
        nodes = geometry.nodes.len(),
        edges = geometry.edges.len(),
        "Frame rendered"
    );

    Ok(FrameStats {
        nodes: geometry.nodes.len(),
        edges: geometry.edges.len(),
    })
}

fn draw_geometry<S: DrawSurface>(
    surface: &mut S,
    node_color: &str,
    line_color: &str,
    geometry: &FrameGeometry,
    node_radius: f64,
    line_width: f64,
) {
    surface.clear();
    surface.set_fill_color(node_color);
    surface.set_stroke_color(line_color);
    surface.set_line_width(line_width);
    surface.set_global_alpha(1.0);

    for node in &geometry.nodes {
        surface.fill_circle(node.y, node.x, node_radius);
    }

    for edge in &geometry.edges {
        surface.set_global_alpha(edge.opacity);
        surface.stroke_line(edge.left_y, edge.left_x, edge.right_y, edge.right_x);
    }
}

/// Identifies one scheduled frame.
///
/// A token is only valid until the loop stops or restarts; a stale token
/// never matches the loop's current schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Stopped,
    Scheduled(FrameToken),
}

/// Waits out the gap between animation frames.
///
/// Injected into [`RenderLoop::run`] so tests can drive the loop without
/// real time passing.
#[async_trait]
pub trait FrameTicker {
    async fn wait(&mut self);
}

/// A [`FrameTicker`] that paces frames at a fixed rate.
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    /// Tick `fps` times per second. A zero `fps` is treated as 1.
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        let period = std::time::Duration::from_secs_f64(1.0 / f64::from(fps));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl FrameTicker for IntervalTicker {
    async fn wait(&mut self) {
        self.interval.tick().await;
    }
}

/// Totals from a completed [`RenderLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub nodes: usize,
    pub edges: usize,
}

/// The animation loop: advance, render, reschedule.
///
/// At most one frame is ever scheduled. Starting an already-running loop
/// cancels the pending frame and schedules a fresh one, so a double start
/// never doubles the frame rate.
pub struct RenderLoop<A, S> {
    simulation: Simulation<A>,
    surface: S,
    state: LoopState,
    next_token: u64,
}

impl<A: ParticlesAbi, S: DrawSurface> RenderLoop<A, S> {
    pub fn new(simulation: Simulation<A>, surface: S) -> Self {
        Self {
            simulation,
            surface,
            state: LoopState::Stopped,
            next_token: 0,
        }
    }

    /// Schedule the first frame, restarting if already running.
    pub fn begin(&mut self) -> FrameToken {
        let token = self.issue_token();
        if self.state != LoopState::Stopped {
            debug!("Animation restarted; pending frame cancelled");
        }
        self.state = LoopState::Scheduled(token);
        token
    }

    /// Cancel the pending frame. Returns `true` if the loop was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.state != LoopState::Stopped;
        self.state = LoopState::Stopped;
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.state != LoopState::Stopped
    }

    /// Run one frame: advance the simulation, render, and reschedule.
    ///
    /// Returns `None` without touching the module when no frame is
    /// scheduled (the loop was stopped or never started).
    ///
    /// # Errors
    ///
    /// A module failure leaves the loop stopped; the caller decides
    /// whether to [`begin`](Self::begin) again.
    pub fn tick(&mut self) -> Result<Option<FrameStats>, BridgeError> {
        let LoopState::Scheduled(_) = self.state else {
            return Ok(None);
        };
        self.state = LoopState::Stopped;

        self.simulation.update()?;
        let stats = render_frame(&mut self.simulation, &mut self.surface)?;

        let token = self.issue_token();
        self.state = LoopState::Scheduled(token);
        Ok(Some(stats))
    }

    /// Drive the loop for up to `frames` frames, paced by `ticker`.
    ///
    /// Stops early if [`stop`](Self::stop) was called between ticks.
    ///
    /// # Errors
    ///
    /// Propagates the first frame failure; the loop is left stopped.
    pub async fn run<T>(&mut self, ticker: &mut T, frames: u64) -> Result<RunSummary, BridgeError>
    where
        T: FrameTicker + Send,
    {
        self.begin();

        let mut summary = RunSummary {
            frames: 0,
            nodes: 0,
            edges: 0,
        };

        while summary.frames < frames {
            ticker.wait().await;
            let Some(stats) = self.tick()? else {
                break;
            };
            summary.frames += 1;
            summary.nodes += stats.nodes;
            summary.edges += stats.edges;
        }

        self.stop();
        Ok(summary)
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation<A> {
        &mut self.simulation
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Tear down the loop and destroy the module-side state.
    ///
    /// # Errors
    ///
    /// Propagates the destroy call's failure.
    pub fn shutdown(mut self) -> Result<S, BridgeError> {
        self.stop();
        self.simulation.destroy()?;
        Ok(self.surface)
    }

    fn issue_token(&mut self) -> FrameToken {
        self.next_token += 1;
        FrameToken(self.next_token)
    }
}
