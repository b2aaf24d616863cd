use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Monotonic event counters plus the live bond count.
///
/// Written from inside parallel passes, hence atomics; readers take a
/// [`CounterSnapshot`] between ticks.
#[derive(Debug, Default)]
pub struct SimulationCounters {
    bonds_formed: AtomicU64,
    bonds_broken_distance: AtomicU64,
    bonds_broken_thermal: AtomicU64,
    bond_rollbacks: AtomicU64,
    mutations: AtomicU64,
    tunnels: AtomicU64,
    grid_overflow: AtomicU64,
    current_bonds: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub bonds_formed: u64,
    pub bonds_broken_distance: u64,
    pub bonds_broken_thermal: u64,
    pub bond_rollbacks: u64,
    pub mutations: u64,
    pub tunnels: u64,
    pub grid_overflow: u64,
    pub current_bonds: i64,
}

impl CounterSnapshot {
    pub fn bonds_broken(&self) -> u64 {
        self.bonds_broken_distance + self.bonds_broken_thermal
    }
}

impl SimulationCounters {
    pub fn record_bonds_formed(&self, n: u64) {
        self.bonds_formed.fetch_add(n, Ordering::Relaxed);
        self.current_bonds.fetch_add(n as i64, Ordering::Relaxed);
    }

    pub fn record_distance_break(&self) {
        self.bonds_broken_distance.fetch_add(1, Ordering::Relaxed);
        self.current_bonds.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_thermal_break(&self) {
        self.bonds_broken_thermal.fetch_add(1, Ordering::Relaxed);
        self.current_bonds.fetch_sub(1, Ordering::Relaxed);
    }

    /// Bonds removed outside the force pass, e.g. when an entity is despawned.
    pub fn record_detached(&self, n: u64) {
        self.current_bonds.fetch_sub(n as i64, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.bond_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tunnel(&self) {
        self.tunnels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_grid_overflow(&self, n: u64) {
        self.grid_overflow.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            bonds_formed: self.bonds_formed.load(Ordering::Relaxed),
            bonds_broken_distance: self.bonds_broken_distance.load(Ordering::Relaxed),
            bonds_broken_thermal: self.bonds_broken_thermal.load(Ordering::Relaxed),
            bond_rollbacks: self.bond_rollbacks.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
            tunnels: self.tunnels.load(Ordering::Relaxed),
            grid_overflow: self.grid_overflow.load(Ordering::Relaxed),
            current_bonds: self.current_bonds.load(Ordering::Relaxed),
        }
    }
}
