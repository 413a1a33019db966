//! Particles bridge CLI entry point.
//!
//! Loads the particle module, runs the version guard, and drives the
//! animation loop for a fixed number of frames against a recording
//! surface.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use wasmtime::Linker;

use particles_bridge_common::{BridgeConfigFile, SurfaceSize};
use particles_bridge_core::{
    HostContext, ModuleInstance, ModuleLoader, ModuleSource, Simulation, WasmEngine,
};
use particles_bridge_host::{random_source, register_all, seeded_source};
use particles_bridge_render::{IntervalTicker, RecordingSurface, RenderLoop};

/// The build identifier compiled into this host, used when the
/// configuration does not override it.
const HOST_BUILD_ID: &str = concat!("v", env!("CARGO_PKG_VERSION"));

#[derive(Parser, Debug)]
#[command(name = "particles-bridge", version, about = "Host bridge for the particle simulation module")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the module's `.wasm` file (overrides the config file).
    #[arg(long)]
    module: Option<PathBuf>,

    /// URL to fetch the module from (overrides the config file).
    #[arg(long)]
    url: Option<Url>,

    /// Build identifier to exchange with the module.
    #[arg(long)]
    build_id: Option<String>,

    /// Skip the build identifier check.
    #[arg(long)]
    dev: bool,

    /// Number of frames to render.
    #[arg(long)]
    frames: Option<u64>,

    /// Frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Seed for deterministic runs; omit for real randomness.
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,particles_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => BridgeConfigFile::default(),
    };

    // CLI flags win over the file.
    if let Some(path) = &cli.module {
        config.module.path = Some(path.display().to_string());
    }
    if let Some(url) = &cli.url {
        config.module.url = Some(url.to_string());
    }
    if let Some(build_id) = &cli.build_id {
        config.module.build_id = Some(build_id.clone());
    }
    if cli.dev {
        config.module.dev_mode = true;
    }
    if let Some(frames) = cli.frames {
        config.render.frames = frames;
    }
    if let Some(fps) = cli.fps {
        config.render.fps = fps;
    }

    let source = module_source(&config)?;
    let build_id = config.module.effective_build_id(HOST_BUILD_ID);

    info!(build_id = %build_id, "Starting particles bridge");

    let engine = WasmEngine::new()?;
    let artifact = ModuleLoader::global().load(&engine, &source).await?;

    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker)?;

    let rand01 = match cli.seed {
        Some(seed) => seeded_source(seed),
        None => random_source(),
    };
    let ctx = HostContext::new(rand01);

    let instance = ModuleInstance::initialize(&engine, &artifact, &linker, ctx, &build_id)?;

    let surface_size = SurfaceSize::new(
        dimension(config.simulation.height, 480),
        dimension(config.simulation.width, 640),
    );
    let simulation = Simulation::new(instance, &config.simulation, surface_size)?;

    info!(
        n_particles = simulation.config().n_particles,
        frames = config.render.frames,
        fps = config.render.fps,
        "Simulation created"
    );

    let surface = RecordingSurface::new(surface_size);
    let mut render_loop = RenderLoop::new(simulation, surface);
    let mut ticker = IntervalTicker::new(config.render.fps);

    let summary = render_loop.run(&mut ticker, config.render.frames).await?;

    info!(
        frames = summary.frames,
        nodes = summary.nodes,
        edges = summary.edges,
        "Render run complete"
    );

    render_loop.shutdown()?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(value: Option<f64>, default: u32) -> u32 {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(default, |v| v.floor() as u32)
}

/// Resolve the module source from the merged configuration.
fn module_source(config: &BridgeConfigFile) -> anyhow::Result<ModuleSource> {
    if let Some(path) = &config.module.path {
        return Ok(ModuleSource::File(PathBuf::from(path)));
    }
    if let Some(url) = &config.module.url {
        let url = Url::parse(url).with_context(|| format!("Invalid module URL: {url}"))?;
        return Ok(ModuleSource::Url(url));
    }
    anyhow::bail!("No module source configured; pass --module or --url")
}
