//! Per-tick passes of the simulation.
//!
//! Each submodule is one stage of the tick pipeline. Passes receive a [`TickContext`]
//! and the arrays they touch explicitly; none of them keep state between ticks except
//! [`propagation::MoleculeLabels`], which owns its double buffers.
//!
//! [`TickContext`]: crate::engine::context::TickContext

pub mod bond_forces;
pub mod bonding;
pub mod dihedral;
pub mod effects;
pub mod evolution;
pub mod propagation;
pub mod solver;
pub mod vsepr;
