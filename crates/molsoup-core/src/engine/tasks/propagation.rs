//! Connected-component labelling by bounded min-label propagation.
//!
//! After a reset every entity carries its own index as label. Each step, an entity
//! adopts the smallest label among itself and its broadcasting neighbors; adopters start
//! broadcasting too. A chain of `N` entities therefore needs up to `N - 1` steps to
//! converge on its minimum index. The per-tick step budget is fixed, so long chains
//! converge over several ticks instead of stalling a frame.

use crate::core::models::bonds::BondTable;
use tracing::{instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Default)]
pub struct MoleculeLabels {
    ids: Vec<u32>,
    needs_propagate: Vec<bool>,
    next_ids: Vec<u32>,
    next_needs: Vec<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationOutcome {
    pub steps: usize,
    pub changes: usize,
    pub converged: bool,
}

impl MoleculeLabels {
    pub fn push(&mut self) {
        let index = self.ids.len() as u32;
        self.ids.push(index);
        self.needs_propagate.push(false);
        self.next_ids.push(index);
        self.next_needs.push(false);
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn needs_propagate(&self) -> &[bool] {
        &self.needs_propagate
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Every active entity becomes its own molecule; bonded ones start broadcasting.
    pub fn reset(&mut self, active: &[bool], bonds: &BondTable) {
        for (i, (id, needs)) in self
            .ids
            .iter_mut()
            .zip(self.needs_propagate.iter_mut())
            .enumerate()
        {
            *id = i as u32;
            *needs = active[i] && bonds.neighbor_count(i) > 0;
        }
    }

    /// Eagerly joins the labels of freshly bonded pairs so new molecules show a shared
    /// id before propagation catches up.
    pub fn merge_pairs(&mut self, pairs: &[(usize, usize)]) {
        for &(a, b) in pairs {
            let low = self.ids[a].min(self.ids[b]);
            self.ids[a] = low;
            self.ids[b] = low;
            self.needs_propagate[a] = true;
            self.needs_propagate[b] = true;
        }
    }

    /// One synchronous relaxation step. Returns how many labels changed.
    pub fn step(&mut self, active: &[bool], bonds: &BondTable) -> usize {
        let ids = &self.ids;
        let needs = &self.needs_propagate;

        #[cfg(not(feature = "parallel"))]
        let iterator = self
            .next_ids
            .iter_mut()
            .zip(self.next_needs.iter_mut())
            .enumerate();

        #[cfg(feature = "parallel")]
        let iterator = self
            .next_ids
            .par_iter_mut()
            .zip(self.next_needs.par_iter_mut())
            .enumerate();

        let changes: usize = iterator
            .map(|(i, (next_id, next_needs))| {
                let current = ids[i];
                let mut best = current;
                if active[i] {
                    for j in bonds.neighbors(i) {
                        if needs[j] && ids[j] < best {
                            best = ids[j];
                        }
                    }
                }
                *next_id = best;
                *next_needs = needs[i] || best != current;
                usize::from(best != current)
            })
            .sum();

        std::mem::swap(&mut self.ids, &mut self.next_ids);
        std::mem::swap(&mut self.needs_propagate, &mut self.next_needs);
        changes
    }

    /// Runs up to `budget` steps, stopping early once a step changes nothing.
    #[instrument(skip_all, name = "propagation_task", level = "trace")]
    pub fn propagate(&mut self, active: &[bool], bonds: &BondTable, budget: usize) -> PropagationOutcome {
        let mut outcome = PropagationOutcome::default();
        for _ in 0..budget {
            let changed = self.step(active, bonds);
            outcome.steps += 1;
            outcome.changes += changed;
            if changed == 0 {
                outcome.converged = true;
                break;
            }
        }
        trace!(
            steps = outcome.steps,
            changes = outcome.changes,
            converged = outcome.converged,
            "Molecule labels propagated."
        );
        outcome
    }
}
