use crate::engine::config::WorkerConfig;
use crate::engine::counters::CounterSnapshot;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::simulation::Simulation;
use crate::engine::snapshot::RegionOfInterest;
use crate::engine::worker::{ChemistryReport, ChemistryWorker};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

const DRAIN_POLL: Duration = Duration::from_millis(2);
const PROGRESS_CHUNK: u64 = 10;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub ticks: u64,
    /// Submit a snapshot to the chemistry worker every N ticks. `0` disables analysis.
    pub snapshot_interval: u64,
    pub roi: Option<RegionOfInterest>,
    /// Record a [`RunSample`] every N ticks. `0` disables sampling.
    pub sample_interval: u64,
    pub worker: WorkerConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ticks: 1000,
            snapshot_interval: 60,
            roi: None,
            sample_interval: 100,
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSample {
    pub tick: u64,
    pub active_atoms: usize,
    pub bonds: usize,
    pub bonds_formed: u64,
    pub bonds_broken: u64,
    pub mean_speed: f32,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ticks_run: u64,
    pub counters: CounterSnapshot,
    pub reports: Vec<ChemistryReport>,
    pub discovered: BTreeSet<String>,
    pub submitted: u64,
    pub rejected: u64,
    pub samples: Vec<RunSample>,
    pub wall_time: Duration,
}

impl RunOutcome {
    pub fn latest_report(&self) -> Option<&ChemistryReport> {
        self.reports.last()
    }
}

/// Runs the simulation headless for a fixed number of ticks, feeding periodic snapshots
/// to a chemistry worker owned by this workflow.
#[instrument(skip_all, name = "run_workflow")]
pub fn run(
    simulation: &mut Simulation,
    options: &RunOptions,
    reporter: &ProgressReporter,
) -> Result<RunOutcome, EngineError> {
    let started = Instant::now();
    info!(
        ticks = options.ticks,
        atoms = simulation.entities().active_count(),
        "Starting headless run."
    );

    let mut worker = if options.snapshot_interval > 0 {
        Some(ChemistryWorker::start(
            Arc::clone(simulation.elements()),
            options.worker.clone(),
        )?)
    } else {
        None
    };

    let mut outcome = RunOutcome {
        ticks_run: 0,
        counters: CounterSnapshot::default(),
        reports: Vec::new(),
        discovered: BTreeSet::new(),
        submitted: 0,
        rejected: 0,
        samples: Vec::new(),
        wall_time: Duration::ZERO,
    };

    reporter.report(Progress::PhaseStart { name: "Simulating" });
    reporter.report(Progress::RunStart {
        total_ticks: options.ticks,
    });

    for n in 1..=options.ticks {
        simulation.step();
        outcome.ticks_run = n;

        if options.sample_interval > 0 && n % options.sample_interval == 0 {
            outcome.samples.push(sample(simulation));
        }

        if let Some(worker) = worker.as_ref() {
            if n % options.snapshot_interval == 0 {
                if worker.submit_job(simulation.snapshot(), options.roi)? {
                    outcome.submitted += 1;
                } else {
                    outcome.rejected += 1;
                }
            }
            if let Some(report) = worker.get_result() {
                collect(&mut outcome, report, reporter);
            }
        }

        if n % PROGRESS_CHUNK == 0 {
            reporter.report(Progress::TicksAdvanced {
                ticks: PROGRESS_CHUNK,
            });
        }
    }
    let remainder = options.ticks % PROGRESS_CHUNK;
    if remainder > 0 {
        reporter.report(Progress::TicksAdvanced { ticks: remainder });
    }
    reporter.report(Progress::RunFinish);
    reporter.report(Progress::PhaseFinish);

    if let Some(mut worker) = worker.take() {
        reporter.report(Progress::PhaseStart {
            name: "Draining Analysis",
        });
        let deadline = Instant::now() + options.worker.join_timeout;
        while worker.is_busy() && Instant::now() < deadline {
            thread::sleep(DRAIN_POLL);
        }
        if let Some(report) = worker.get_result() {
            collect(&mut outcome, report, reporter);
        }
        worker.stop();
        reporter.report(Progress::PhaseFinish);
    }

    outcome.counters = simulation.counters();
    outcome.wall_time = started.elapsed();
    info!(
        ticks = outcome.ticks_run,
        bonds = outcome.counters.current_bonds,
        formulas = outcome.discovered.len(),
        elapsed_ms = outcome.wall_time.as_millis() as u64,
        "Headless run complete."
    );
    Ok(outcome)
}

fn collect(outcome: &mut RunOutcome, report: ChemistryReport, reporter: &ProgressReporter) {
    reporter.report(Progress::Analysis {
        molecules: report.stats.molecules,
        new_formulas: report.new_formulas.len(),
    });
    outcome.discovered.extend(report.new_formulas.iter().cloned());
    outcome.reports.push(report);
}

fn sample(simulation: &Simulation) -> RunSample {
    let entities = simulation.entities();
    let counters = simulation.counters();
    let active = entities.active_count();
    let speed_sum: f32 = (0..entities.len())
        .filter(|&i| entities.active[i])
        .map(|i| entities.speed(i))
        .sum();
    RunSample {
        tick: simulation.tick(),
        active_atoms: active,
        bonds: simulation.bonds().total_bonds(),
        bonds_formed: counters.bonds_formed,
        bonds_broken: counters.bonds_broken(),
        mean_speed: if active > 0 { speed_sum / active as f32 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chemistry::ElementTable;
    use crate::engine::config::SimulationConfig;
    use std::sync::Mutex;

    fn populated(atoms: usize) -> Simulation {
        let mut config = SimulationConfig::default();
        config.world.width = 1200.0;
        config.world.height = 1200.0;
        let mut sim = Simulation::new(config, Arc::new(ElementTable::builtin())).unwrap();
        sim.spawn_random(atoms).unwrap();
        sim
    }

    #[test]
    fn run_advances_requested_ticks_and_samples() {
        let mut sim = populated(150);
        let options = RunOptions {
            ticks: 45,
            snapshot_interval: 0,
            sample_interval: 15,
            ..RunOptions::default()
        };
        let outcome = run(&mut sim, &options, &ProgressReporter::new()).unwrap();

        assert_eq!(outcome.ticks_run, 45);
        assert_eq!(sim.tick(), 45);
        assert_eq!(outcome.samples.len(), 3);
        assert_eq!(outcome.samples[2].tick, 45);
        assert_eq!(outcome.submitted, 0);
    }

    #[test]
    fn run_reports_progress_and_collects_analysis() {
        let mut sim = populated(200);
        let options = RunOptions {
            ticks: 25,
            snapshot_interval: 5,
            sample_interval: 0,
            ..RunOptions::default()
        };
        let advanced = Mutex::new(0u64);
        let analyses = Mutex::new(0usize);
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::TicksAdvanced { ticks } => *advanced.lock().unwrap() += ticks,
            Progress::Analysis { .. } => *analyses.lock().unwrap() += 1,
            _ => {}
        }));

        let outcome = run(&mut sim, &options, &reporter).unwrap();

        assert_eq!(*advanced.lock().unwrap(), 25);
        assert_eq!(outcome.submitted + outcome.rejected, 5);
        assert!(outcome.submitted >= 1);
        assert_eq!(*analyses.lock().unwrap(), outcome.reports.len());
        assert!(!outcome.reports.is_empty());
    }
}
