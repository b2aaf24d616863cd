use crate::core::chemistry::ElementId;
use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::utils::random::Stream;
use crate::engine::context::TickContext;
use crate::engine::tasks::solver::wall_clamped;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Mutate(ElementId),
    Tunnel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvolutionOutcome {
    pub mutations: usize,
    pub tunnels: usize,
}

/// Rare stochastic events: unbonded atoms transmute into another element and very fast
/// atoms jump ahead along their direction of travel.
#[instrument(skip_all, name = "evolution_task", level = "trace")]
pub fn run(ctx: &TickContext, entities: &mut EntityArrays, bonds: &mut BondTable) -> EvolutionOutcome {
    let effects = &ctx.config.effects;
    let tunnel_speed = ctx.config.physics.max_speed * effects.tunnel_speed_fraction;
    let mutation_probability = effects.mutation_probability.clamp(0.0, 1.0);
    let tunnel_probability = effects.tunnel_probability.clamp(0.0, 1.0);
    let weights: Vec<f32> = ctx.elements.iter().map(|(_, e)| e.abundance.max(0.0)).collect();
    let picker = WeightedIndex::new(&weights).ok();

    let events = {
        let entities = &*entities;
        let table = &*bonds;

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..entities.len();

        #[cfg(feature = "parallel")]
        let iterator = (0..entities.len()).into_par_iter();

        iterator
            .filter(|&i| entities.active[i])
            .filter_map(|i| {
                let mut rng = ctx.rng(i, Stream::Evolution);
                if let Some(picker) = &picker {
                    if table.neighbor_count(i) == 0 && rng.gen_bool(mutation_probability) {
                        return Some((i, Event::Mutate(ElementId(picker.sample(&mut rng) as u8))));
                    }
                }
                (entities.speed(i) > tunnel_speed && rng.gen_bool(tunnel_probability))
                    .then_some((i, Event::Tunnel))
            })
            .collect::<Vec<_>>()
    };

    let mut outcome = EvolutionOutcome::default();
    let world = &ctx.config.world;
    for (i, event) in events {
        match event {
            Event::Mutate(element) => {
                let data = ctx.elements.element(element);
                entities.element[i] = element;
                entities.radius[i] = data.radius;
                bonds.reset_valence(i, data.max_valence);
                ctx.counters.record_mutation();
                outcome.mutations += 1;
            }
            Event::Tunnel => {
                let direction = entities.velocity[i] / entities.speed(i);
                let jumped = entities.position[i] + direction * effects.tunnel_distance;
                entities.position[i] = wall_clamped(
                    &jumped,
                    entities.radius[i],
                    world.width,
                    world.height,
                    world.depth_limit,
                );
                ctx.counters.record_tunnel();
                outcome.tunnels += 1;
            }
        }
    }

    if outcome.mutations + outcome.tunnels > 0 {
        debug!(
            mutations = outcome.mutations,
            tunnels = outcome.tunnels,
            "Evolutionary events applied."
        );
    }
    outcome
}
