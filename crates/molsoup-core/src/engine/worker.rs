//! Off-thread molecular analysis.
//!
//! The simulation thread hands over owned [`ChemistrySnapshot`]s through a bounded job
//! queue and later polls a bounded result queue. Submission never blocks: when the
//! worker falls behind, new jobs are rejected and counted. Results overwrite the oldest
//! unread entry, so a slow consumer always sees the most recent analysis.

use super::config::WorkerConfig;
use super::error::EngineError;
use super::snapshot::{ChemistrySnapshot, RegionOfInterest};
use crate::core::chemistry::ElementTable;
use crossbeam_queue::ArrayQueue;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, instrument, trace, warn};

const WORKER_THREAD_NAME: &str = "molsoup-chemistry";
const STOP_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoleculeStats {
    /// Groups of two or more bonded atoms sharing a molecule id.
    pub molecules: usize,
    pub free_atoms: usize,
    pub bonded_atoms: usize,
    pub largest_molecule: usize,
    /// Hill-order formula → number of molecules with that formula.
    pub formulas: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChemistryReport {
    pub tick: u64,
    pub stats: MoleculeStats,
    /// Formulas seen for the first time by this worker, sorted.
    pub new_formulas: Vec<String>,
    pub total_discovered: usize,
    pub process_time_ms: f64,
    /// Time from submission until the result was published.
    pub latency_ms: f64,
}

struct Job {
    snapshot: ChemistrySnapshot,
    roi: Option<RegionOfInterest>,
    submitted_at: Instant,
}

struct Shared {
    jobs: ArrayQueue<Job>,
    results: ArrayQueue<ChemistryReport>,
    stop: AtomicBool,
    /// Jobs queued or in flight; decremented once the report is published.
    pending: AtomicUsize,
    dropped_jobs: AtomicU64,
    jobs_processed: AtomicU64,
    total_process_us: AtomicU64,
}

impl Shared {
    fn publish(&self, report: ChemistryReport) {
        if self.results.force_push(report).is_some() {
            trace!("Result queue full; oldest unread report discarded.");
        }
    }
}

pub struct ChemistryWorker {
    shared: Arc<Shared>,
    elements: Arc<ElementTable>,
    config: WorkerConfig,
    handle: Option<JoinHandle<()>>,
}

impl ChemistryWorker {
    /// Creates the queues without spawning the thread. Jobs submitted before
    /// [`Self::spawn`] wait in the queue.
    pub fn new(elements: Arc<ElementTable>, config: WorkerConfig) -> Self {
        let shared = Shared {
            jobs: ArrayQueue::new(config.job_capacity.max(1)),
            results: ArrayQueue::new(config.result_capacity.max(1)),
            stop: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            dropped_jobs: AtomicU64::new(0),
            jobs_processed: AtomicU64::new(0),
            total_process_us: AtomicU64::new(0),
        };
        Self {
            shared: Arc::new(shared),
            elements,
            config,
            handle: None,
        }
    }

    /// Creates the worker and spawns its analysis thread.
    pub fn start(elements: Arc<ElementTable>, config: WorkerConfig) -> Result<Self, EngineError> {
        let mut worker = Self::new(elements, config);
        worker.spawn()?;
        Ok(worker)
    }

    /// Spawns the analysis thread. Does nothing if it is already running.
    pub fn spawn(&mut self) -> Result<(), EngineError> {
        if self.is_running() {
            return Ok(());
        }
        self.shared.stop.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let elements = Arc::clone(&self.elements);
        let idle_poll = self.config.idle_poll;
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(&shared, &elements, idle_poll))
            .map_err(|e| EngineError::Worker(format!("failed to spawn worker thread: {e}")))?;
        self.handle = Some(handle);
        info!(thread = WORKER_THREAD_NAME, "Chemistry worker started.");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Queues a snapshot for analysis. Returns `Ok(false)` without blocking when the job
    /// queue is full; the job is dropped and counted. Snapshots whose arrays disagree in
    /// length are rejected before they reach the worker thread.
    pub fn submit_job(
        &self,
        snapshot: ChemistrySnapshot,
        roi: Option<RegionOfInterest>,
    ) -> Result<bool, EngineError> {
        snapshot.check_consistent()?;
        let job = Job {
            snapshot,
            roi,
            submitted_at: Instant::now(),
        };
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        match self.shared.jobs.push(job) {
            Ok(()) => {
                if let Some(handle) = &self.handle {
                    handle.thread().unpark();
                }
                Ok(true)
            }
            Err(rejected) => {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                self.shared.dropped_jobs.fetch_add(1, Ordering::Relaxed);
                trace!(tick = rejected.snapshot.tick, "Job queue full; snapshot skipped.");
                Ok(false)
            }
        }
    }

    /// Drains the result queue and returns the most recent report, if any.
    pub fn get_result(&self) -> Option<ChemistryReport> {
        let mut latest = None;
        while let Some(report) = self.shared.results.pop() {
            latest = Some(report);
        }
        latest
    }

    pub fn is_busy(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) > 0
    }

    pub fn jobs_processed(&self) -> u64 {
        self.shared.jobs_processed.load(Ordering::Relaxed)
    }

    pub fn dropped_jobs(&self) -> u64 {
        self.shared.dropped_jobs.load(Ordering::Relaxed)
    }

    pub fn avg_process_time_ms(&self) -> f64 {
        let processed = self.jobs_processed();
        if processed == 0 {
            return 0.0;
        }
        self.shared.total_process_us.load(Ordering::Relaxed) as f64 / processed as f64 / 1000.0
    }

    /// Signals the thread to stop and waits up to the configured join timeout. A thread
    /// that does not finish in time is detached.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.thread().unpark();

        let deadline = Instant::now() + self.config.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(STOP_POLL);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Chemistry worker thread panicked.");
            }
            info!(
                jobs_processed = self.jobs_processed(),
                dropped_jobs = self.dropped_jobs(),
                "Chemistry worker stopped."
            );
        } else {
            warn!(
                timeout_ms = self.config.join_timeout.as_millis() as u64,
                "Chemistry worker did not stop in time; detaching thread."
            );
        }
    }
}

impl Drop for ChemistryWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, elements: &ElementTable, idle_poll: Duration) {
    let _span = info_span!("chemistry_worker").entered();
    let mut discovered = BTreeSet::new();
    while !shared.stop.load(Ordering::Acquire) {
        let Some(job) = shared.jobs.pop() else {
            thread::park_timeout(idle_poll);
            continue;
        };
        let report = process(job, elements, &mut discovered);
        shared.jobs_processed.fetch_add(1, Ordering::Relaxed);
        shared
            .total_process_us
            .fetch_add((report.process_time_ms * 1000.0) as u64, Ordering::Relaxed);
        debug!(
            tick = report.tick,
            molecules = report.stats.molecules,
            new_formulas = report.new_formulas.len(),
            process_time_ms = report.process_time_ms,
            "Snapshot analyzed."
        );
        shared.publish(report);
        shared.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

#[instrument(skip_all, name = "analysis_task", fields(tick = job.snapshot.tick), level = "debug")]
fn process(job: Job, elements: &ElementTable, discovered: &mut BTreeSet<String>) -> ChemistryReport {
    let started = Instant::now();
    let stats = analyze(&job.snapshot, job.roi.as_ref(), elements);
    let new_formulas: Vec<String> = stats
        .formulas
        .keys()
        .filter(|formula| discovered.insert((*formula).clone()))
        .cloned()
        .collect();
    ChemistryReport {
        tick: job.snapshot.tick,
        stats,
        new_formulas,
        total_discovered: discovered.len(),
        process_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        latency_ms: job.submitted_at.elapsed().as_secs_f64() * 1000.0,
    }
}

/// Groups bonded atoms by molecule id and tallies formulas.
///
/// With a region of interest, entities outside it are treated as bondless and are not
/// counted at all. The snapshot itself is left untouched.
pub fn analyze(
    snapshot: &ChemistrySnapshot,
    roi: Option<&RegionOfInterest>,
    elements: &ElementTable,
) -> MoleculeStats {
    let inside = |i: usize| roi.is_none_or(|r| r.contains(&snapshot.positions[i]));
    let bond_counts: Vec<u32> = (0..snapshot.len())
        .map(|i| if inside(i) { snapshot.bond_counts[i] } else { 0 })
        .collect();

    let mut stats = MoleculeStats::default();
    let groups: HashMap<u32, Vec<usize>> = (0..snapshot.len())
        .filter(|&i| snapshot.active[i] && inside(i))
        .filter(|&i| {
            let bonded = bond_counts[i] > 0;
            if !bonded {
                stats.free_atoms += 1;
            }
            bonded
        })
        .map(|i| (snapshot.molecule_ids[i], i))
        .into_group_map();

    for members in groups.values().filter(|m| m.len() >= 2) {
        stats.molecules += 1;
        stats.bonded_atoms += members.len();
        stats.largest_molecule = stats.largest_molecule.max(members.len());
        let formula = hill_formula(
            members
                .iter()
                .filter_map(|&i| elements.get(snapshot.elements[i]))
                .map(|e| e.symbol.as_str()),
        );
        *stats.formulas.entry(formula).or_default() += 1;
    }
    stats
}

/// Formats a formula in Hill order: carbon, then hydrogen, then the rest alphabetically.
/// Without carbon every symbol is alphabetical. Counts are always written, so water is
/// `H2O1`.
pub fn hill_formula<'a>(symbols: impl IntoIterator<Item = &'a str>) -> String {
    let counts: BTreeMap<&str, usize> = symbols.into_iter().counts().into_iter().collect();
    let has_carbon = counts.contains_key("C");
    let leading: &[&str] = if has_carbon { &["C", "H"] } else { &[] };

    leading
        .iter()
        .filter_map(|symbol| counts.get_key_value(symbol))
        .chain(counts.iter().filter(|(s, _)| !leading.contains(*s)))
        .map(|(symbol, count)| format!("{symbol}{count}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn water_and_methane() -> (ElementTable, ChemistrySnapshot) {
        let table = ElementTable::builtin();
        let id = |s: &str| table.id_of(s).unwrap();
        let layout = [
            ("O", 0, 2, 10.0),
            ("H", 0, 1, 20.0),
            ("H", 0, 1, 30.0),
            ("C", 3, 4, 500.0),
            ("H", 3, 1, 510.0),
            ("H", 3, 1, 520.0),
            ("H", 3, 1, 530.0),
            ("H", 3, 1, 540.0),
            ("N", 8, 0, 900.0),
        ];
        let snapshot = ChemistrySnapshot {
            tick: 42,
            elements: layout.iter().map(|l| id(l.0)).collect(),
            molecule_ids: layout.iter().map(|l| l.1).collect(),
            bond_counts: layout.iter().map(|l| l.2).collect(),
            positions: layout.iter().map(|l| Vector3::new(l.3, 0.0, 0.0)).collect(),
            active: vec![true; layout.len()],
        };
        (table, snapshot)
    }

    fn report(tick: u64) -> ChemistryReport {
        ChemistryReport {
            tick,
            stats: MoleculeStats::default(),
            new_formulas: Vec::new(),
            total_discovered: 0,
            process_time_ms: 0.0,
            latency_ms: 0.0,
        }
    }

    #[test]
    fn hill_formula_orders_carbon_and_hydrogen_first() {
        assert_eq!(hill_formula(["O", "H", "H"]), "H2O1");
        assert_eq!(hill_formula(["H", "O", "C", "H", "H", "H"]), "C1H4O1");
        assert_eq!(hill_formula(["S", "N", "H"]), "H1N1S1");
    }

    #[test]
    fn analyze_groups_bonded_atoms_by_molecule_id() {
        let (table, snapshot) = water_and_methane();
        let stats = analyze(&snapshot, None, &table);

        assert_eq!(stats.molecules, 2);
        assert_eq!(stats.free_atoms, 1);
        assert_eq!(stats.bonded_atoms, 8);
        assert_eq!(stats.largest_molecule, 5);
        assert_eq!(stats.formulas.get("H2O1"), Some(&1));
        assert_eq!(stats.formulas.get("C1H4"), Some(&1));
    }

    #[test]
    fn region_of_interest_excludes_outside_atoms_without_mutating_snapshot() {
        let (table, snapshot) = water_and_methane();
        let before = snapshot.clone();
        let roi = RegionOfInterest::new(0.0, -10.0, 100.0, 10.0);

        let stats = analyze(&snapshot, Some(&roi), &table);

        assert_eq!(stats.molecules, 1);
        assert_eq!(stats.free_atoms, 0);
        assert_eq!(stats.formulas.len(), 1);
        assert_eq!(snapshot, before);
    }

    #[test]
    fn third_submission_is_rejected_while_two_jobs_wait() {
        let worker = ChemistryWorker::new(Arc::new(ElementTable::builtin()), WorkerConfig::default());
        let (_, snapshot) = water_and_methane();

        assert!(worker.submit_job(snapshot.clone(), None).unwrap());
        assert!(worker.submit_job(snapshot.clone(), None).unwrap());
        assert!(!worker.submit_job(snapshot, None).unwrap());
        assert_eq!(worker.dropped_jobs(), 1);
        assert!(worker.is_busy());
    }

    #[test]
    fn mismatched_snapshot_arrays_are_rejected_before_queueing() {
        let worker = ChemistryWorker::new(Arc::new(ElementTable::builtin()), WorkerConfig::default());
        let (_, mut snapshot) = water_and_methane();
        snapshot.positions.pop();

        let result = worker.submit_job(snapshot, None);

        assert!(matches!(result, Err(EngineError::Snapshot(_))));
        assert!(!worker.is_busy());
        assert_eq!(worker.dropped_jobs(), 0);
    }

    #[test]
    fn result_queue_keeps_only_the_newest_reports() {
        let worker = ChemistryWorker::new(Arc::new(ElementTable::builtin()), WorkerConfig::default());
        for tick in 0..6 {
            worker.shared.publish(report(tick));
        }
        assert_eq!(worker.shared.results.len(), 4);
        assert_eq!(worker.get_result().map(|r| r.tick), Some(5));
        assert!(worker.get_result().is_none());
    }

    #[test]
    fn started_worker_processes_jobs_and_tracks_discoveries() {
        let mut worker =
            ChemistryWorker::start(Arc::new(ElementTable::builtin()), WorkerConfig::default()).unwrap();
        let (_, snapshot) = water_and_methane();
        assert!(worker.submit_job(snapshot, None).unwrap());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut result = None;
        while result.is_none() && Instant::now() < deadline {
            result = worker.get_result();
            thread::sleep(Duration::from_millis(2));
        }
        let result = result.expect("worker produced no result");
        assert_eq!(result.tick, 42);
        assert_eq!(result.new_formulas, vec!["C1H4".to_string(), "H2O1".to_string()]);
        assert_eq!(result.total_discovered, 2);

        worker.stop();
        assert!(!worker.is_running());
        assert_eq!(worker.jobs_processed(), 1);
    }

    #[test]
    fn stop_without_spawn_is_a_no_op() {
        let mut worker = ChemistryWorker::new(Arc::new(ElementTable::builtin()), WorkerConfig::default());
        worker.stop();
        assert!(!worker.is_running());
    }
}
