//! # Workflows Module
//!
//! User-facing entry points that drive a [`Simulation`](crate::engine::simulation::Simulation)
//! end to end.
//!
//! - **Headless run** ([`run`]) - advances the world for a fixed number of ticks, hands
//!   periodic snapshots to the chemistry worker, and collects samples and analysis
//!   reports along the way.

pub mod run;
