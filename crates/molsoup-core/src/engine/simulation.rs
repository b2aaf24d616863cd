use super::config::SimulationConfig;
use super::context::TickContext;
use super::counters::{CounterSnapshot, SimulationCounters};
use super::error::EngineError;
use super::snapshot::ChemistrySnapshot;
use super::tasks::propagation::{MoleculeLabels, PropagationOutcome};
use super::tasks::{bond_forces, bonding, dihedral, effects, evolution, solver, vsepr};
use crate::core::chemistry::{ElementId, ElementTable};
use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::spatial::SpatialGrid;
use crate::core::utils::random::Stream;
use nalgebra::Vector3;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What happened during one call to [`Simulation::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub bonds_formed: usize,
    pub bonds_broken: usize,
    pub rollbacks: usize,
    pub angular_impulses: usize,
    pub torsion_impulses: usize,
    pub propagation: PropagationOutcome,
    pub relabelled: bool,
    pub mutations: usize,
    pub tunnels: usize,
    pub grid_overflow: usize,
}

/// Owns every piece of simulation state and runs the tick pipeline.
pub struct Simulation {
    config: SimulationConfig,
    elements: Arc<ElementTable>,
    entities: EntityArrays,
    bonds: BondTable,
    labels: MoleculeLabels,
    grid: SpatialGrid,
    counters: SimulationCounters,
    tick: u64,
    overflow_reported: bool,
    /// Set when bonds were removed; split molecules need fresh labels.
    labels_stale: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig, elements: Arc<ElementTable>) -> Result<Self, EngineError> {
        if elements.is_empty() {
            return Err(EngineError::Initialization(
                "element table contains no elements".to_string(),
            ));
        }
        config.validate_for(&elements)?;
        let grid = build_grid(&config);
        let (cols, rows) = grid.dimensions();
        info!(
            width = config.world.width,
            height = config.world.height,
            cols,
            rows,
            elements = elements.len(),
            "Simulation initialized."
        );
        Ok(Self {
            config,
            elements,
            entities: EntityArrays::default(),
            bonds: BondTable::default(),
            labels: MoleculeLabels::default(),
            grid,
            counters: SimulationCounters::default(),
            tick: 0,
            overflow_reported: false,
            labels_stale: false,
        })
    }

    fn context(&self) -> TickContext<'_> {
        TickContext::new(&self.config, &self.elements, &self.counters, self.tick)
    }

    /// Adds one atom. The position is clamped inside the walls.
    pub fn spawn_atom(
        &mut self,
        element: ElementId,
        position: Vector3<f32>,
        velocity: Vector3<f32>,
    ) -> Result<usize, EngineError> {
        if self.entities.len() >= self.config.world.max_entities {
            return Err(EngineError::Capacity {
                capacity: self.config.world.max_entities,
            });
        }
        let data = self
            .elements
            .get(element)
            .ok_or_else(|| EngineError::UnknownElement(format!("#{}", element.0)))?;
        let (radius, max_valence) = (data.radius, data.max_valence);
        let world = &self.config.world;
        let position = solver::wall_clamped(&position, radius, world.width, world.height, world.depth_limit);

        let index = self.entities.push(element, radius, position, velocity);
        self.bonds.push(max_valence);
        self.labels.push();
        Ok(index)
    }

    pub fn spawn_symbol(&mut self, symbol: &str, position: Vector3<f32>) -> Result<usize, EngineError> {
        let element = self
            .elements
            .id_of(symbol)
            .ok_or_else(|| EngineError::UnknownElement(symbol.to_string()))?;
        self.spawn_atom(element, position, Vector3::zeros())
    }

    /// Spawns `count` atoms at uniformly random positions, picking elements by abundance.
    pub fn spawn_random(&mut self, count: usize) -> Result<Vec<usize>, EngineError> {
        let weights: Vec<f32> = self.elements.iter().map(|(_, e)| e.abundance.max(0.0)).collect();
        let picker = WeightedIndex::new(&weights).map_err(|e| {
            EngineError::Initialization(format!("element abundances cannot be sampled: {e}"))
        })?;

        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let index = self.entities.len();
            let mut rng = self.context().rng(index, Stream::Spawn);
            let element = ElementId(picker.sample(&mut rng) as u8);
            let world = &self.config.world;
            let position = Vector3::new(
                rng.gen_range(0.0..world.width),
                rng.gen_range(0.0..world.height),
                0.0,
            );
            spawned.push(self.spawn_atom(element, position, Vector3::zeros())?);
        }
        debug!(count, total = self.entities.len(), "Atoms spawned.");
        Ok(spawned)
    }

    /// Deactivates an entity and breaks all of its bonds. Its index is not reused.
    pub fn despawn(&mut self, index: usize) -> Result<(), EngineError> {
        self.check_index(index)?;
        let former = self.bonds.detach(index);
        self.counters.record_detached(former.len() as u64);
        self.entities.active[index] = false;
        self.entities.velocity[index] = Vector3::zeros();
        if !former.is_empty() {
            self.labels.reset(&self.entities.active, &self.bonds);
        }
        Ok(())
    }

    /// Entities marked unbreakable keep their bonds no matter how far they are stretched.
    pub fn set_breakable(&mut self, index: usize, breakable: bool) -> Result<(), EngineError> {
        self.check_index(index)?;
        self.entities.breakable[index] = breakable;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), EngineError> {
        if index < self.entities.len() {
            Ok(())
        } else {
            Err(EngineError::EntityOutOfRange {
                index,
                len: self.entities.len(),
            })
        }
    }

    /// Advances the world by one tick.
    #[instrument(skip_all, name = "simulation_step", fields(tick = self.tick), level = "debug")]
    pub fn step(&mut self) -> TickSummary {
        self.ensure_grid();
        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };
        let ctx = TickContext::new(&self.config, &self.elements, &self.counters, self.tick);
        let geometry = &self.config.geometry;
        let effect = &self.config.effects;

        solver::predict(&ctx, &mut self.entities);
        self.grid.rebuild(&self.entities.position, &self.entities.active);
        solver::resolve(&ctx, &mut self.entities, &self.grid);
        solver::derive(&ctx, &mut self.entities);

        self.grid.rebuild(&self.entities.position, &self.entities.active);
        summary.grid_overflow = self.grid.overflow();

        let formed = bonding::run(&ctx, &self.entities, &mut self.bonds, &self.grid, self.labels.ids());
        self.labels.merge_pairs(&formed.formed);
        summary.bonds_formed = formed.formed.len();
        summary.rollbacks = formed.rollbacks;

        summary.bonds_broken = bond_forces::run(&ctx, &mut self.entities, &mut self.bonds).broken.len();
        self.labels_stale |= summary.bonds_broken > 0;

        if geometry.vsepr_enabled {
            summary.angular_impulses = vsepr::run(&ctx, &mut self.entities, &self.bonds);
        }
        if geometry.dihedral_enabled {
            summary.torsion_impulses = dihedral::run(&ctx, &mut self.entities, &self.bonds);
        }

        if effect.brownian_enabled {
            effects::brownian(&ctx, &mut self.entities);
        }
        if effect.coulomb_enabled {
            effects::coulomb(&ctx, &mut self.entities, &self.grid);
        }
        effects::relax_depth(&ctx, &mut self.entities, &self.bonds);

        let propagation = &self.config.propagation;
        if self.labels_stale || self.tick % propagation.relabel_interval.max(1) == 0 {
            self.labels.reset(&self.entities.active, &self.bonds);
            self.labels_stale = false;
            summary.relabelled = true;
        }
        summary.propagation = self.labels.propagate(
            &self.entities.active,
            &self.bonds,
            propagation.iterations_per_tick,
        );

        let events = evolution::run(&ctx, &mut self.entities, &mut self.bonds);
        summary.mutations = events.mutations;
        summary.tunnels = events.tunnels;

        solver::clamp_velocities(&ctx, &mut self.entities);

        if summary.grid_overflow > 0 {
            self.counters.record_grid_overflow(summary.grid_overflow as u64);
            if !self.overflow_reported {
                warn!(
                    dropped = summary.grid_overflow,
                    capacity = self.grid.capacity(),
                    "Spatial grid cells overflowed; some neighbors are ignored this tick."
                );
                self.overflow_reported = true;
            }
        }

        debug!(
            formed = summary.bonds_formed,
            broken = summary.bonds_broken,
            total_bonds = self.bonds.total_bonds(),
            grid_overflow = summary.grid_overflow,
            "Tick complete."
        );
        self.tick += 1;
        summary
    }

    fn ensure_grid(&mut self) {
        let world = &self.config.world;
        if !self
            .grid
            .fits(world.width, world.height, world.cell_size, world.max_per_cell)
        {
            debug!(cell_size = world.cell_size, "World layout changed; rebuilding grid.");
            self.grid = build_grid(&self.config);
        }
    }

    /// Radial outward shove around `center` within the configured pulse radius.
    /// Returns the number of entities affected.
    pub fn apply_force_pulse(&mut self, center: Vector3<f32>, power: f32) -> usize {
        let radius = self.config.effects.pulse_radius;
        effects::force_pulse(&mut self.entities, center, radius, power)
    }

    pub fn shake(&mut self, magnitude: f32) {
        let ctx = TickContext::new(&self.config, &self.elements, &self.counters, self.tick);
        effects::shake(&ctx, &mut self.entities, magnitude);
    }

    /// Applies a change to the configuration, keeping the old one if the result is invalid.
    pub fn update_config(&mut self, apply: impl FnOnce(&mut SimulationConfig)) -> Result<(), EngineError> {
        let mut candidate = self.config.clone();
        apply(&mut candidate);
        candidate.validate_for(&self.elements)?;
        self.config = candidate;
        Ok(())
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn elements(&self) -> &Arc<ElementTable> {
        &self.elements
    }

    pub fn entities(&self) -> &EntityArrays {
        &self.entities
    }

    pub fn bonds(&self) -> &BondTable {
        &self.bonds
    }

    pub fn molecule_ids(&self) -> &[u32] {
        self.labels.ids()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Copies the state the chemistry worker needs.
    pub fn snapshot(&self) -> ChemistrySnapshot {
        ChemistrySnapshot {
            tick: self.tick,
            elements: self.entities.element.clone(),
            molecule_ids: self.labels.ids().to_vec(),
            bond_counts: self.bonds.counts_snapshot(),
            positions: self.entities.position.clone(),
            active: self.entities.active.clone(),
        }
    }
}

fn build_grid(config: &SimulationConfig) -> SpatialGrid {
    let world = &config.world;
    SpatialGrid::new(world.width, world.height, world.cell_size, world.max_per_cell)
}
