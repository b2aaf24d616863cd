use crate::error::{CliError, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Per-tick pipeline tasks. They fire every tick, so they stay at INFO until `-vvv`.
const TICK_TASKS_TARGET: &str = "molsoup::engine::tasks";
/// Overrides the verbosity flags with a target list, e.g.
/// `molsoup::engine::worker=trace,molsoup=info`.
pub const LOG_ENV: &str = "MOLSOUP_LOG";

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn tick_task_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    match verbosity {
        _ if quiet => LevelFilter::ERROR,
        0 => LevelFilter::WARN,
        1 | 2 => LevelFilter::INFO,
        _ => LevelFilter::TRACE,
    }
}

fn targets(verbosity: u8, quiet: bool, env_override: Option<&str>) -> Result<Targets> {
    if let Some(spec) = env_override.filter(|s| !s.trim().is_empty()) {
        return spec
            .parse::<Targets>()
            .map_err(|e| CliError::Config(format!("invalid {LOG_ENV} value '{spec}': {e}")));
    }
    Ok(Targets::new()
        .with_default(level_filter(verbosity, quiet))
        .with_target(TICK_TASKS_TARGET, tick_task_filter(verbosity, quiet)))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let env_override = std::env::var(LOG_ENV).ok();
    let filter = targets(verbosity, quiet, env_override.as_deref())?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(path).map_err(CliError::Io)?;

        // Thread names identify the chemistry worker; closed spans carry their timings.
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true);

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}
