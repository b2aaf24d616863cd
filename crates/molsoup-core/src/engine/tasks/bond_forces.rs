use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::utils::geometry::{DEGENERATE_LENGTH, clamp_norm};
use crate::core::utils::random::Stream;
use crate::engine::context::TickContext;
use nalgebra::Vector3;
use rand::Rng;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakCause {
    Distance,
    Thermal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondForceOutcome {
    pub broken: Vec<(usize, usize, BreakCause)>,
}

/// Evaluates breaks for every bonded pair once, commits them, then applies spring and
/// damping forces along the surviving bonds.
#[instrument(skip_all, name = "bond_force_task", level = "debug")]
pub fn run(ctx: &TickContext, entities: &mut EntityArrays, bonds: &mut BondTable) -> BondForceOutcome {
    let broken = collect_breaks(ctx, entities, bonds);

    for &(i, j, cause) in &broken {
        if bonds.break_bond(i, j) {
            match cause {
                BreakCause::Distance => ctx.counters.record_distance_break(),
                BreakCause::Thermal => ctx.counters.record_thermal_break(),
            }
        }
    }

    apply_springs(ctx, entities, bonds);

    if !broken.is_empty() {
        debug!(broken = broken.len(), "Bonds broken this tick.");
    }
    BondForceOutcome { broken }
}

/// Canonical per-pair evaluation: only the lower index of a pair decides its fate.
fn collect_breaks(
    ctx: &TickContext,
    entities: &EntityArrays,
    bonds: &BondTable,
) -> Vec<(usize, usize, BreakCause)> {
    let config = &ctx.config.bonding;
    let temperature = ctx.config.physics.temperature;

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..entities.len();

    #[cfg(feature = "parallel")]
    let iterator = (0..entities.len()).into_par_iter();

    let per_entity: Vec<Vec<(usize, usize, BreakCause)>> = iterator
        .map(|i| {
            let mut out = Vec::new();
            if !entities.active[i] {
                return out;
            }
            let count_i = bonds.neighbor_count(i) as u32;
            let mut rng = None;
            for j in bonds.neighbors(i).filter(|&j| j > i) {
                let distance = (entities.position[j] - entities.position[i]).norm();
                let exempt = !entities.breakable[i] || !entities.breakable[j];
                if distance > config.break_distance && !exempt {
                    out.push((i, j, BreakCause::Distance));
                    continue;
                }
                let connectivity = count_i + bonds.neighbor_count(j) as u32;
                if connectivity > config.saturation_threshold {
                    let excess = (connectivity - config.saturation_threshold) as f32;
                    let probability =
                        config.thermal_break_rate * excess * (temperature + config.thermal_break_floor);
                    let rng = rng.get_or_insert_with(|| ctx.rng(i, Stream::ThermalBreak));
                    if rng.r#gen::<f32>() < probability {
                        out.push((i, j, BreakCause::Thermal));
                    }
                }
            }
            out
        })
        .collect();

    per_entity.into_iter().flatten().collect()
}

fn apply_springs(ctx: &TickContext, entities: &mut EntityArrays, bonds: &BondTable) {
    let config = &ctx.config.bonding;
    let velocity_before = entities.velocity.clone();
    let EntityArrays {
        ref position,
        ref mut velocity,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = velocity.iter_mut().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = velocity.par_iter_mut().enumerate();

    iterator
        .filter(|(i, _)| active[*i] && bonds.neighbor_count(*i) > 0)
        .for_each(|(i, vel)| {
            let mut force = Vector3::zeros();
            for j in bonds.neighbors(i) {
                let delta = position[j] - position[i];
                let distance = delta.norm();
                if distance <= DEGENERATE_LENGTH {
                    continue;
                }
                let direction = delta / distance;
                let stretch = config.spring_k * (distance - config.rest_length);
                let closing = direction.dot(&(velocity_before[j] - velocity_before[i]));
                force += direction * (stretch + config.damping * closing);
            }
            *vel += clamp_norm(force, config.max_force) * config.force_factor;
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chemistry::{ElementId, ElementTable};
    use crate::engine::config::SimulationConfig;
    use crate::engine::counters::SimulationCounters;

    fn pair(distance: f32) -> (EntityArrays, BondTable) {
        let mut entities = EntityArrays::default();
        let mut bonds = BondTable::default();
        for x in [1000.0, 1000.0 + distance] {
            entities.push(ElementId(0), 9.0, Vector3::new(x, 1000.0, 0.0), Vector3::zeros());
            bonds.push(4);
        }
        assert!(bonds.try_claim_valence(0) && bonds.try_claim_valence(1));
        bonds.try_push_slot(0, 1);
        bonds.try_push_slot(1, 0);
        (entities, bonds)
    }

    #[test]
    fn stretched_bond_pulls_endpoints_together() {
        let config = SimulationConfig::default();
        let elements = ElementTable::builtin();
        let counters = SimulationCounters::default();
        let ctx = TickContext::new(&config, &elements, &counters, 0);
        let (mut entities, mut bonds) = pair(150.0);

        let outcome = run(&ctx, &mut entities, &mut bonds);

        assert!(outcome.broken.is_empty());
        assert!(entities.velocity[0].x > 0.0);
        assert!(entities.velocity[1].x < 0.0);
        assert!((entities.velocity[0] + entities.velocity[1]).norm() < 1e-5);
    }

    #[test]
    fn overstretched_bond_breaks_and_restores_valence() {
        let config = SimulationConfig::default();
        let elements = ElementTable::builtin();
        let counters = SimulationCounters::default();
        let ctx = TickContext::new(&config, &elements, &counters, 0);
        let (mut entities, mut bonds) = pair(config.bonding.break_distance + 10.0);
        counters.record_bonds_formed(1);

        let outcome = run(&ctx, &mut entities, &mut bonds);

        assert_eq!(outcome.broken, vec![(0, 1, BreakCause::Distance)]);
        assert_eq!(bonds.total_bonds(), 0);
        assert_eq!(bonds.free_valence(0), 4);
        assert_eq!(bonds.free_valence(1), 4);
        let snap = counters.snapshot();
        assert_eq!(snap.bonds_broken_distance, 1);
        assert_eq!(snap.current_bonds, 0);
    }

    #[test]
    fn unbreakable_endpoint_keeps_overstretched_bond() {
        let config = SimulationConfig::default();
        let elements = ElementTable::builtin();
        let counters = SimulationCounters::default();
        let ctx = TickContext::new(&config, &elements, &counters, 0);
        let (mut entities, mut bonds) = pair(config.bonding.break_distance + 10.0);
        entities.breakable[1] = false;

        let outcome = run(&ctx, &mut entities, &mut bonds);

        assert!(outcome.broken.is_empty());
        assert!(bonds.is_bonded(0, 1));
        assert!(entities.velocity[0].x > 0.0, "spring still applies");
    }

    #[test]
    fn saturated_pair_breaks_thermally_at_certain_probability() {
        let mut config = SimulationConfig::default();
        config.bonding.saturation_threshold = 1;
        config.bonding.thermal_break_rate = 10.0;
        let elements = ElementTable::builtin();
        let counters = SimulationCounters::default();
        let ctx = TickContext::new(&config, &elements, &counters, 0);
        let (mut entities, mut bonds) = pair(100.0);

        let outcome = run(&ctx, &mut entities, &mut bonds);

        assert_eq!(outcome.broken, vec![(0, 1, BreakCause::Thermal)]);
        assert_eq!(counters.snapshot().bonds_broken_thermal, 1);
    }
}
