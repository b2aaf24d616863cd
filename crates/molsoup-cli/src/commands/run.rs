use crate::cli::RunArgs;
use crate::config::{AppConfig, build_config};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use molsoup::core::chemistry::ElementTable;
use molsoup::engine::error::EngineError;
use molsoup::engine::progress::ProgressReporter;
use molsoup::engine::simulation::Simulation;
use molsoup::workflows::run::{self as run_workflow, RunOutcome, RunSample};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
struct SampleRow {
    tick: u64,
    active_atoms: usize,
    bonds: usize,
    bonds_formed: u64,
    bonds_broken: u64,
    mean_speed: f32,
}

impl From<&RunSample> for SampleRow {
    fn from(s: &RunSample) -> Self {
        Self {
            tick: s.tick,
            active_atoms: s.active_atoms,
            bonds: s.bonds,
            bonds_formed: s.bonds_formed,
            bonds_broken: s.bonds_broken,
            mean_speed: s.mean_speed,
        }
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from defaults, file and CLI arguments...");
    let app = build_config(&args)?;

    let elements = load_elements(&app)?;
    info!(elements = elements.len(), "Element table ready.");

    let mut simulation = Simulation::new(app.simulation.clone(), Arc::new(elements))?;
    simulation.spawn_random(app.atoms)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Simulating {} atoms for {} ticks...",
        app.atoms, app.run.ticks
    );
    let outcome = run_workflow::run(&mut simulation, &app.run, &reporter)?;

    print_summary(&outcome);

    if let Some(path) = &app.output_path {
        write_samples(path, &outcome.samples)?;
        println!("✓ Statistics written to: {}", path.display());
    }
    Ok(())
}

fn load_elements(app: &AppConfig) -> Result<ElementTable> {
    match &app.elements_path {
        Some(path) => {
            info!("Loading element table from {:?}", path);
            Ok(ElementTable::load(path).map_err(EngineError::from)?)
        }
        None => Ok(ElementTable::builtin()),
    }
}

fn print_summary(outcome: &RunOutcome) {
    let counters = &outcome.counters;
    println!(
        "Ran {} ticks in {:.2}s.",
        outcome.ticks_run,
        outcome.wall_time.as_secs_f64()
    );
    println!(
        "  Bonds: {} live, {} formed, {} broken ({} by distance, {} thermally)",
        counters.current_bonds,
        counters.bonds_formed,
        counters.bonds_broken(),
        counters.bonds_broken_distance,
        counters.bonds_broken_thermal
    );
    println!(
        "  Events: {} mutations, {} tunnels",
        counters.mutations, counters.tunnels
    );
    if counters.grid_overflow > 0 {
        warn!(
            dropped = counters.grid_overflow,
            "Grid cells overflowed during the run; consider a larger world.max-per-cell."
        );
    }

    if outcome.submitted + outcome.rejected == 0 {
        return;
    }
    println!(
        "  Analysis: {} snapshots analyzed, {} skipped while the worker was busy",
        outcome.reports.len(),
        outcome.rejected
    );
    if let Some(report) = outcome.latest_report() {
        let stats = &report.stats;
        println!(
            "  Last snapshot (tick {}): {} molecules, {} free atoms, largest has {} atoms",
            report.tick, stats.molecules, stats.free_atoms, stats.largest_molecule
        );
        let mut common: Vec<_> = stats.formulas.iter().collect();
        common.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (formula, count) in common.into_iter().take(10) {
            println!("    {formula:<16} × {count}");
        }
    }
    if !outcome.discovered.is_empty() {
        let discovered: Vec<&str> = outcome.discovered.iter().map(String::as_str).collect();
        println!(
            "  Discovered {} formulas: {}",
            discovered.len(),
            discovered.join(", ")
        );
    }
}

fn write_samples(path: &Path, samples: &[RunSample]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for sample in samples {
        writer.serialize(SampleRow::from(sample))?;
    }
    writer.flush()?;
    Ok(())
}
