use crate::core::chemistry::{ElementId, ElementTable};
use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::spatial::SpatialGrid;
use crate::core::utils::random::Stream;
use crate::engine::context::TickContext;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondingOutcome {
    /// Newly formed pairs, lower index first.
    pub formed: Vec<(usize, usize)>,
    pub rollbacks: usize,
}

/// Element roles for clay catalysis, resolved by symbol against the active table.
#[derive(Debug, Clone, Copy)]
struct Catalysis {
    surface: ElementId,
    organic: [Option<ElementId>; 2],
}

impl Catalysis {
    fn resolve(elements: &ElementTable) -> Option<Self> {
        Some(Self {
            surface: elements.id_of("Si")?,
            organic: [elements.id_of("C"), elements.id_of("N")],
        })
    }

    fn is_organic(&self, element: ElementId) -> bool {
        self.organic.contains(&Some(element))
    }

    fn touches_surface(&self, i: usize, entities: &EntityArrays, table: &BondTable) -> bool {
        table
            .neighbors(i)
            .any(|n| entities.element[n] == self.surface)
    }

    /// Whether silicon anchors this pair or templates it through an existing Si bond.
    fn applies(&self, i: usize, j: usize, entities: &EntityArrays, table: &BondTable) -> bool {
        let (a, b) = (entities.element[i], entities.element[j]);
        let anchor = (a == self.surface && self.is_organic(b)) || (b == self.surface && self.is_organic(a));
        anchor
            || (self.is_organic(a)
                && self.is_organic(b)
                && (self.touches_surface(i, entities, table) || self.touches_surface(j, entities, table)))
    }
}

/// One bonding pass over every active entity with spare valence.
///
/// Each entity only proposes partners with a higher index, so every unordered pair is
/// considered by exactly one worker. Valence is claimed on both sides before any slot
/// is written; a failed slot allocation returns both claims and leaves a hole that the
/// closing compaction removes.
///
/// `molecule_ids` are the labels at the start of the pass. Atoms sharing a label close
/// rings without a probability draw when ring closure is enabled.
#[instrument(skip_all, name = "bonding_task", level = "debug")]
pub fn run(
    ctx: &TickContext,
    entities: &EntityArrays,
    bonds: &mut BondTable,
    grid: &SpatialGrid,
    molecule_ids: &[u32],
) -> BondingOutcome {
    let rollbacks = AtomicUsize::new(0);
    let table = &*bonds;
    let catalysis = ctx
        .config
        .bonding
        .clay_catalysis
        .then(|| Catalysis::resolve(ctx.elements))
        .flatten();
    let pass = Pass {
        ctx,
        entities,
        table,
        grid,
        molecule_ids,
        catalysis,
        rollbacks: &rollbacks,
    };

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..entities.len();

    #[cfg(feature = "parallel")]
    let iterator = (0..entities.len()).into_par_iter();

    let per_entity: Vec<Vec<(usize, usize)>> = iterator
        .map(|i| pass.propose(i))
        .collect();

    let holes = bonds.compact();
    let formed: Vec<(usize, usize)> = per_entity.into_iter().flatten().collect();
    let rollbacks = rollbacks.into_inner();

    ctx.counters.record_bonds_formed(formed.len() as u64);
    for _ in 0..rollbacks {
        ctx.counters.record_rollback();
    }
    debug!(formed = formed.len(), rollbacks, holes, "Bonding pass complete.");

    BondingOutcome { formed, rollbacks }
}

struct Pass<'a> {
    ctx: &'a TickContext<'a>,
    entities: &'a EntityArrays,
    table: &'a BondTable,
    grid: &'a SpatialGrid,
    molecule_ids: &'a [u32],
    catalysis: Option<Catalysis>,
    rollbacks: &'a AtomicUsize,
}

impl Pass<'_> {
    /// Bond probability for a candidate pair, after catalysis and the medium effect.
    fn probability(&self, i: usize, j: usize) -> f32 {
        let bonding = &self.ctx.config.bonding;
        let (entities, table) = (self.entities, self.table);
        let (a, b) = (entities.element[i], entities.element[j]);
        let mut probability = (bonding.base_probability * self.ctx.elements.affinity(a, b)).min(1.0);

        let catalysed = self
            .catalysis
            .is_some_and(|c| c.applies(i, j, entities, table));
        if catalysed {
            probability = (probability * bonding.catalysis_boost).min(bonding.catalysis_cap);
        }

        if bonding.medium_polarity > 0.5 {
            let threshold = bonding.hydrophobic_electronegativity;
            let en = |e: ElementId| self.ctx.elements.element(e).electronegativity;
            if en(a) < threshold && en(b) < threshold {
                probability = (probability * bonding.hydrophobic_boost).min(1.0);
            }
        }

        if catalysed && table.neighbor_count(i) >= 2 && table.neighbor_count(j) >= 2 {
            probability *= bonding.catalysis_brake;
        }
        probability
    }

    fn propose(&self, i: usize) -> Vec<(usize, usize)> {
        let (ctx, entities, table) = (self.ctx, self.entities, self.table);
        let mut formed = Vec::new();
        if !entities.active[i] || table.free_valence(i) <= 0 {
            return formed;
        }

        let bonding = &ctx.config.bonding;
        let here = entities.position[i];
        let mut rng = ctx.rng(i, Stream::Bonding);

        for j in self.grid.candidates(&here) {
            if table.free_valence(i) <= 0 {
                break;
            }
            if j <= i || !entities.active[j] || table.free_valence(j) <= 0 {
                continue;
            }
            let distance = (entities.position[j] - here).norm();
            if !(bonding.range_min..=bonding.range_max).contains(&distance) {
                continue;
            }
            if table.is_bonded(i, j) {
                continue;
            }

            let ring = bonding.ring_closure && self.molecule_ids[i] == self.molecule_ids[j];
            if !ring {
                let probability = self.probability(i, j);
                if probability <= 0.0 || (probability < 1.0 && rng.r#gen::<f32>() >= probability) {
                    continue;
                }
            }

            if !table.try_claim_valence(i) {
                break;
            }
            if !table.try_claim_valence(j) {
                table.release_valence(i);
                continue;
            }
            let Some(slot_i) = table.try_push_slot(i, j) else {
                table.release_valence(i);
                table.release_valence(j);
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if table.try_push_slot(j, i).is_none() {
                table.clear_slot(i, slot_i);
                table.release_valence(i);
                table.release_valence(j);
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            formed.push((i, j));
        }

        formed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::bonds::MAX_VALENCE;
    use crate::engine::config::SimulationConfig;
    use crate::engine::counters::SimulationCounters;
    use nalgebra::Vector3;

    struct Fixture {
        config: SimulationConfig,
        elements: ElementTable,
        counters: SimulationCounters,
        entities: EntityArrays,
        bonds: BondTable,
        molecule_ids: Vec<u32>,
    }

    impl Fixture {
        fn new(base_probability: f32) -> Self {
            let mut config = SimulationConfig::default();
            config.bonding.base_probability = base_probability;
            Self {
                config,
                elements: ElementTable::builtin(),
                counters: SimulationCounters::default(),
                entities: EntityArrays::default(),
                bonds: BondTable::default(),
                molecule_ids: Vec::new(),
            }
        }

        fn id(&self, symbol: &str) -> ElementId {
            self.elements.id_of(symbol).unwrap()
        }

        fn add(&mut self, symbol: &str, x: f32, y: f32) -> usize {
            let id = self.elements.id_of(symbol).unwrap();
            let element = self.elements.element(id);
            self.bonds.push(element.max_valence);
            self.molecule_ids.push(self.molecule_ids.len() as u32);
            self.entities
                .push(id, element.radius, Vector3::new(x, y, 0.0), Vector3::zeros())
        }

        fn link(&self, a: usize, b: usize) {
            assert!(self.bonds.try_claim_valence(a) && self.bonds.try_claim_valence(b));
            self.bonds.try_push_slot(a, b).unwrap();
            self.bonds.try_push_slot(b, a).unwrap();
        }

        fn grid(&self) -> SpatialGrid {
            let w = &self.config.world;
            let mut grid = SpatialGrid::new(w.width, w.height, w.cell_size, w.max_per_cell);
            grid.rebuild(&self.entities.position, &self.entities.active);
            grid
        }

        fn pass(&mut self) -> BondingOutcome {
            let grid = self.grid();
            let ctx = TickContext::new(&self.config, &self.elements, &self.counters, 1);
            run(&ctx, &self.entities, &mut self.bonds, &grid, &self.molecule_ids)
        }

        fn probability(&self, i: usize, j: usize) -> f32 {
            let grid = self.grid();
            let ctx = TickContext::new(&self.config, &self.elements, &self.counters, 1);
            let rollbacks = AtomicUsize::new(0);
            let pass = Pass {
                ctx: &ctx,
                entities: &self.entities,
                table: &self.bonds,
                grid: &grid,
                molecule_ids: &self.molecule_ids,
                catalysis: self
                    .config
                    .bonding
                    .clay_catalysis
                    .then(|| Catalysis::resolve(&self.elements))
                    .flatten(),
                rollbacks: &rollbacks,
            };
            pass.probability(i, j)
        }
    }

    #[test]
    fn bond_forms_in_one_pass_at_full_probability() {
        let mut f = Fixture::new(1.0);
        let h = f.add("H", 1000.0, 1000.0);
        let o = f.add("O", 1100.0, 1000.0);

        let outcome = f.pass();

        assert_eq!(outcome.formed, vec![(h, o)]);
        assert!(f.bonds.is_bonded(h, o) && f.bonds.is_bonded(o, h));
        assert_eq!(f.bonds.free_valence(h), 0);
        assert_eq!(f.bonds.free_valence(o), 1);
        assert_eq!(f.counters.snapshot().current_bonds, 1);
    }

    #[test]
    fn no_bond_outside_range_or_at_zero_probability() {
        let mut f = Fixture::new(1.0);
        f.add("H", 1000.0, 1000.0);
        f.add("O", 1300.0, 1000.0);
        assert!(f.pass().formed.is_empty());

        let mut f = Fixture::new(0.0);
        f.add("H", 1000.0, 1000.0);
        f.add("O", 1100.0, 1000.0);
        assert!(f.pass().formed.is_empty());
    }

    #[test]
    fn repeated_passes_never_duplicate_a_bond() {
        let mut f = Fixture::new(1.0);
        let c = f.id("C");
        f.elements.set_affinity(c, c, 1.0);
        f.add("C", 1000.0, 1000.0);
        f.add("C", 1100.0, 1000.0);
        f.pass();
        f.pass();
        assert_eq!(f.bonds.neighbor_count(0), 1);
        assert_eq!(f.bonds.total_bonds(), 1);
    }

    #[test]
    fn atoms_sharing_a_molecule_id_close_the_ring_without_a_draw() {
        let mut f = Fixture::new(0.0);
        let a = f.add("C", 1000.0, 1000.0);
        let b = f.add("C", 1100.0, 1000.0);
        f.molecule_ids[b] = f.molecule_ids[a];

        assert_eq!(f.pass().formed, vec![(a, b)]);
    }

    #[test]
    fn ring_closure_can_be_disabled() {
        let mut f = Fixture::new(0.0);
        f.config.bonding.ring_closure = false;
        let a = f.add("C", 1000.0, 1000.0);
        let b = f.add("C", 1100.0, 1000.0);
        f.molecule_ids[b] = f.molecule_ids[a];

        assert!(f.pass().formed.is_empty());
    }

    #[test]
    fn polar_medium_doubles_probability_for_electropositive_pairs() {
        let mut f = Fixture::new(0.3);
        let c = f.add("C", 1000.0, 1000.0);
        let h = f.add("H", 1100.0, 1000.0);
        let o = f.add("O", 1000.0, 1100.0);
        let plain_ch = f.probability(c, h);
        let plain_co = f.probability(c, o);
        assert!((plain_ch - 0.27).abs() < 1e-6);

        f.config.bonding.medium_polarity = 0.8;
        assert!((f.probability(c, h) - 2.0 * plain_ch).abs() < 1e-6);
        assert_eq!(f.probability(c, o), plain_co, "oxygen is too electronegative");

        f.config.bonding.medium_polarity = 0.5;
        assert_eq!(f.probability(c, h), plain_ch, "threshold is exclusive");
    }

    #[test]
    fn silicon_anchors_organics_with_boosted_capped_probability() {
        let mut f = Fixture::new(0.3);
        let si = f.add("Si", 1000.0, 1000.0);
        let c = f.add("C", 1100.0, 1000.0);
        let h = f.add("H", 1000.0, 1100.0);
        let (si_id, c_id) = (f.id("Si"), f.id("C"));
        let base = 0.3 * f.elements.affinity(si_id, c_id);

        assert!((f.probability(si, c) - base * 5.0).abs() < 1e-6);
        assert!(
            (f.probability(si, h) - 0.3 * f.elements.affinity(si_id, f.id("H"))).abs() < 1e-6,
            "hydrogen is not anchored"
        );

        f.config.bonding.base_probability = 1.0;
        assert!((f.probability(si, c) - 0.98).abs() < 1e-6);

        f.config.bonding.clay_catalysis = false;
        assert!((f.probability(si, c) - f.elements.affinity(si_id, c_id)).abs() < 1e-6);
    }

    #[test]
    fn silicon_templates_organic_pairs_and_brakes_dense_networks() {
        let mut f = Fixture::new(0.3);
        let c = f.add("C", 1000.0, 1000.0);
        let n = f.add("N", 1100.0, 1000.0);
        let si = f.add("Si", 900.0, 1000.0);
        let base = 0.3 * f.elements.affinity(f.id("C"), f.id("N"));
        assert!((f.probability(c, n) - base).abs() < 1e-6);

        f.link(c, si);
        assert!((f.probability(c, n) - base * 5.0).abs() < 1e-6);

        let extra_c = f.add("H", 1000.0, 900.0);
        let extra_n1 = f.add("H", 1100.0, 900.0);
        let extra_n2 = f.add("H", 1100.0, 1100.0);
        f.link(c, extra_c);
        f.link(n, extra_n1);
        f.link(n, extra_n2);
        assert!((f.probability(c, n) - base * 5.0 * 0.1).abs() < 1e-6);
    }

    #[test]
    fn crowded_cluster_respects_valence_and_symmetry() {
        let mut f = Fixture::new(1.0);
        for k in 0..40 {
            let angle = k as f32 * 0.7;
            let r = 20.0 + (k % 7) as f32 * 12.0;
            let symbol = ["C", "H", "O", "N"][k % 4];
            f.add(symbol, 1500.0 + r * angle.cos(), 1500.0 + r * angle.sin());
        }

        f.pass();

        for i in 0..f.entities.len() {
            let element = f.elements.element(f.entities.element[i]);
            let count = f.bonds.neighbor_count(i);
            assert!(count <= MAX_VALENCE);
            assert!(count <= element.max_valence as usize);
            assert!(f.bonds.free_valence(i) >= 0);
            assert_eq!(count as i32 + f.bonds.free_valence(i), element.max_valence as i32);
            for j in f.bonds.neighbors(i) {
                assert!(f.bonds.is_bonded(j, i), "bond {i}->{j} is not reciprocated");
            }
        }
        assert_eq!(
            f.counters.snapshot().current_bonds as usize,
            f.bonds.total_bonds()
        );
    }
}
