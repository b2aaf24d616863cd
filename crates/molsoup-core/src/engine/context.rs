use super::config::SimulationConfig;
use super::counters::SimulationCounters;
use crate::core::chemistry::ElementTable;
use crate::core::utils::random::{Stream, entity_rng};
use rand::rngs::SmallRng;

/// Read-only view handed to every pass of a single tick.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub config: &'a SimulationConfig,
    pub elements: &'a ElementTable,
    pub counters: &'a SimulationCounters,
    pub tick: u64,
}

impl<'a> TickContext<'a> {
    pub fn new(
        config: &'a SimulationConfig,
        elements: &'a ElementTable,
        counters: &'a SimulationCounters,
        tick: u64,
    ) -> Self {
        Self {
            config,
            elements,
            counters,
            tick,
        }
    }

    #[inline]
    pub fn rng(&self, index: usize, stream: Stream) -> SmallRng {
        entity_rng(self.config.seed, self.tick, index, stream)
    }

    /// Partial charge of every element, derived from its electronegativity.
    pub fn partial_charges(&self) -> Vec<f32> {
        let effects = &self.config.effects;
        self.elements
            .iter()
            .map(|(_, e)| (e.electronegativity - effects.reference_electronegativity) * effects.charge_factor)
            .collect()
    }
}
