use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Slot capacity of every entity's neighbor list.
pub const MAX_VALENCE: usize = 8;
pub const EMPTY_SLOT: u32 = u32::MAX;

/// Fixed-capacity bond arena indexed by entity.
///
/// Each entity owns `MAX_VALENCE` consecutive slots. Slots `[0, count)` hold neighbor
/// indices once [`BondTable::compact`] has run; a concurrent bonding pass may leave
/// `EMPTY_SLOT` holes behind a rolled-back allocation until the next compaction.
///
/// Reads and claims go through atomics so that the bonding pass can run one
/// worker per entity. Removal takes `&mut self` and is always two-sided.
#[derive(Debug, Default)]
pub struct BondTable {
    slots: Vec<AtomicU32>,
    counts: Vec<AtomicU32>,
    free_valence: Vec<AtomicI32>,
}

impl BondTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity * MAX_VALENCE),
            counts: Vec::with_capacity(capacity),
            free_valence: Vec::with_capacity(capacity),
        }
    }

    /// Appends an unbonded entity with the given valence budget.
    pub fn push(&mut self, max_valence: u32) -> usize {
        let index = self.counts.len();
        self.slots
            .extend((0..MAX_VALENCE).map(|_| AtomicU32::new(EMPTY_SLOT)));
        self.counts.push(AtomicU32::new(0));
        self.free_valence
            .push(AtomicI32::new(max_valence.min(MAX_VALENCE as u32) as i32));
        index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[inline]
    pub fn neighbor_count(&self, index: usize) -> usize {
        (self.counts[index].load(Ordering::Acquire) as usize).min(MAX_VALENCE)
    }

    #[inline]
    pub fn free_valence(&self, index: usize) -> i32 {
        self.free_valence[index].load(Ordering::Acquire)
    }

    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let base = index * MAX_VALENCE;
        self.slots[base..base + self.neighbor_count(index)]
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|&j| j != EMPTY_SLOT)
            .map(|j| j as usize)
    }

    pub fn is_bonded(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).any(|n| n == b)
    }

    /// Atomically consumes one unit of free valence. Never drives the budget negative.
    pub fn try_claim_valence(&self, index: usize) -> bool {
        let cell = &self.free_valence[index];
        let mut current = cell.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return false;
            }
            match cell.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn release_valence(&self, index: usize) {
        self.free_valence[index].fetch_add(1, Ordering::AcqRel);
    }

    /// Reserves a slot on `index` and writes `neighbor` into it.
    ///
    /// Returns the slot position, or `None` if the arena was already full, in which
    /// case the counter increment has been undone.
    pub fn try_push_slot(&self, index: usize, neighbor: usize) -> Option<usize> {
        let position = self.counts[index].fetch_add(1, Ordering::AcqRel) as usize;
        if position >= MAX_VALENCE {
            self.counts[index].fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        self.slots[index * MAX_VALENCE + position].store(neighbor as u32, Ordering::Release);
        Some(position)
    }

    /// Punches a hole into a slot written by [`Self::try_push_slot`]. The hole is
    /// removed by the next [`Self::compact`].
    pub fn clear_slot(&self, index: usize, position: usize) {
        self.slots[index * MAX_VALENCE + position].store(EMPTY_SLOT, Ordering::Release);
    }

    /// Moves every live neighbor to the front of its entity's slot range and fixes the
    /// counts. Returns the number of holes that were removed.
    pub fn compact(&mut self) -> usize {
        let slots = &self.slots;
        let counts = &self.counts;

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..counts.len();

        #[cfg(feature = "parallel")]
        let iterator = (0..counts.len()).into_par_iter();

        iterator
            .map(|i| {
                let count = (counts[i].load(Ordering::Acquire) as usize).min(MAX_VALENCE);
                let base = i * MAX_VALENCE;
                let mut write = 0;
                for read in 0..count {
                    let value = slots[base + read].load(Ordering::Acquire);
                    if value != EMPTY_SLOT {
                        slots[base + write].store(value, Ordering::Release);
                        write += 1;
                    }
                }
                for rest in write..MAX_VALENCE {
                    slots[base + rest].store(EMPTY_SLOT, Ordering::Release);
                }
                counts[i].store(write as u32, Ordering::Release);
                count - write
            })
            .sum::<usize>()
    }

    /// Removes the bond on both endpoints and returns one valence unit to each.
    /// Returns `false` if the pair was not bonded.
    pub fn break_bond(&mut self, a: usize, b: usize) -> bool {
        let removed_a = self.remove_slot(a, b);
        let removed_b = self.remove_slot(b, a);
        if removed_a {
            self.release_valence(a);
        }
        if removed_b {
            self.release_valence(b);
        }
        removed_a && removed_b
    }

    fn remove_slot(&mut self, index: usize, neighbor: usize) -> bool {
        let base = index * MAX_VALENCE;
        let count = self.neighbor_count(index);
        let Some(position) = (0..count)
            .find(|&k| self.slots[base + k].load(Ordering::Relaxed) == neighbor as u32)
        else {
            return false;
        };
        let last = count - 1;
        let moved = *self.slots[base + last].get_mut();
        *self.slots[base + position].get_mut() = moved;
        *self.slots[base + last].get_mut() = EMPTY_SLOT;
        *self.counts[index].get_mut() = last as u32;
        true
    }

    /// Breaks every bond of `index`, returning the former neighbors.
    pub fn detach(&mut self, index: usize) -> Vec<usize> {
        let neighbors: Vec<usize> = self.neighbors(index).collect();
        for &n in &neighbors {
            self.break_bond(index, n);
        }
        neighbors
    }

    /// Resets the valence budget of an unbonded entity, e.g. after its element changed.
    pub fn reset_valence(&mut self, index: usize, max_valence: u32) {
        let bonded = self.neighbor_count(index) as i32;
        let budget = max_valence.min(MAX_VALENCE as u32) as i32;
        *self.free_valence[index].get_mut() = (budget - bonded).max(0);
    }

    pub fn counts_snapshot(&self) -> Vec<u32> {
        (0..self.len())
            .map(|i| self.neighbor_count(i) as u32)
            .collect()
    }

    /// Number of undirected bonds currently stored.
    pub fn total_bonds(&self) -> usize {
        (0..self.len())
            .map(|i| self.neighbor_count(i))
            .sum::<usize>()
            / 2
    }
}
