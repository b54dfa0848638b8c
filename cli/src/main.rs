//! Command-line front-end over `substrate-core`.
//!
//! Resolves a device id through the device-spec table (falling back to the
//! raw affinity mask when none is given), builds a pinned thread pool, and,
//! if a Vulkan device is present, a [`substrate_core::vk::Engine`]. Drives a
//! handful of rounds of a no-op placeholder pass to exercise the substrate
//! end-to-end.
//!
//! Exit codes are assigned by *stage*, not by downcasting the error back to
//! `substrate_core::Error` (wrapping an error in `anyhow::Context` changes
//! its concrete type, so a downcast after the fact can't tell configuration
//! mistakes from library failures apart): flag parsing and core-list
//! resolution are configuration errors (1); everything from starting the
//! thread pool onward is a runtime error (2).

use anyhow::{bail, Context};
use std::process::ExitCode;
use substrate_core::{vk, CoreList};
use tracing::{debug, info, warn};

struct Args {
    device: Option<String>,
    threads: Option<usize>,
    size: usize,
    iterations: u32,
    debug: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut pargs = pico_args::Arguments::from_env();
    let args = Args {
        device: pargs.opt_value_from_str("--device")?,
        threads: pargs.opt_value_from_str("--threads")?,
        size: pargs.opt_value_from_str("--size")?.unwrap_or(300_000),
        iterations: pargs.opt_value_from_str("--iterations")?.unwrap_or(1),
        debug: pargs.contains("--debug"),
    };
    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("unrecognized arguments: {remaining:?}");
    }
    Ok(args)
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_target(false).with_env_filter(filter).init();
}

/// Configuration stage: resolves `--device`/`--threads` into a concrete
/// `CoreList`. Every failure here — an unknown device id, a core list that
/// isn't a subset of the process affinity mask — is a configuration error.
fn resolve_cores(args: &Args) -> anyhow::Result<CoreList> {
    let available = substrate_core::affinity::available_cores().context("querying CPU affinity")?;

    let base = match &args.device {
        Some(id) => {
            let spec = substrate_core::lookup_device_spec(id).context("resolving --device")?;
            info!(device = %id, alias = spec.alias, "resolved device spec");
            CoreList::new(
                spec.small_cores
                    .iter()
                    .chain(spec.mid_cores.iter())
                    .chain(spec.big_cores.iter()),
            )
        }
        None => available.clone(),
    };

    let requested = match args.threads {
        Some(n) => CoreList::new(base.iter().take(n.max(1))),
        None => base,
    };

    if !requested.is_subset_of(&available) {
        bail!("requested core list is not a subset of the process affinity mask");
    }
    Ok(requested)
}

/// Runtime stage: starts the pinned thread pool, drives `--iterations`
/// rounds of a placeholder block-range pass, and — if a Vulkan-capable
/// device is present — stands up an [`vk::Engine`] and allocates one
/// placeholder buffer through it to exercise the GPU path. Every failure
/// here is a runtime error.
fn run(cores: CoreList, args: &Args) -> anyhow::Result<()> {
    let pool = substrate_core::ThreadPool::new(&cores).context("starting thread pool")?;
    info!(threads = pool.thread_count(), size = args.size, "substrate ready");

    for iteration in 0..args.iterations {
        let multi = pool
            .submit_blocks(0, args.size, |_start, _end| (), None)
            .context("submitting placeholder pass")?;
        multi.wait().context("waiting for placeholder pass")?;
        info!(iteration, "pass complete");
    }

    match vk::DeviceContext::new() {
        Ok(_) => {
            let shaders = vk::ShaderSearchPath::new(std::env::current_dir().unwrap_or_default());
            let engine = vk::Engine::new(shaders).context("starting vulkan engine")?;
            let placeholder = engine
                .buffer((args.size * std::mem::size_of::<f32>()) as u64)
                .context("allocating placeholder buffer")?;
            debug!(bytes = placeholder.size(), "placeholder buffer ready");
            drop(placeholder);
            drop(engine);
            info!("vulkan engine ready and torn down cleanly");
        }
        Err(e) => warn!(error = %e, "no usable vulkan device, skipping GPU passes"),
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    init_tracing(args.debug);

    let cores = match resolve_cores(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };

    match run(cores, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
