//! # Engine Module
//!
//! The stateful layer: it owns the entity arrays, bond table and spatial grid, and runs
//! the tick pipeline over them.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - tunable parameters grouped by concern, with validation
//! - **Simulation** ([`simulation`]) - the orchestrator owning all state and the tick order
//! - **Tasks** ([`tasks`]) - the individual passes: constraint solver, bonding, bond
//!   forces, VSEPR, dihedral, effects, evolution and molecule-id propagation
//! - **Chemistry worker** ([`worker`]) - off-thread molecule analysis fed by [`snapshot`]s
//! - **Counters** ([`counters`]) - atomic event tallies shared by the parallel passes
//! - **Progress Monitoring** ([`progress`]) - callback-based progress reporting
//! - **Error Handling** ([`error`]) - setup-time errors; the tick itself never fails
//!
//! Every data-parallel pass uses `rayon` when the `parallel` feature is enabled (the
//! default) and falls back to sequential iterators otherwise.

pub mod config;
pub mod context;
pub mod counters;
pub mod error;
pub mod progress;
pub mod simulation;
pub mod snapshot;
pub mod tasks;
pub mod worker;
