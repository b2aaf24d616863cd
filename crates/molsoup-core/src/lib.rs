//! # molsoup
//!
//! A real-time particle chemistry sandbox core: atoms move under a position-based
//! dynamics solver, form and break bonds under valence limits, relax toward VSEPR and
//! anti-periplanar geometry, and are grouped into molecules whose formulas are analyzed
//! on a background thread.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data and math: the element table with its
//!   affinity matrix, struct-of-arrays entity storage, the fixed-capacity bond table,
//!   the uniform spatial grid and small geometry helpers.
//!
//! - **[`engine`]: The Logic Core.** The `Simulation` orchestrator and its per-tick
//!   passes, configuration and validation, atomic counters, and the asynchronous
//!   chemistry worker.
//!
//! - **[`workflows`]: The Public API.** Entry points that drive a simulation end to end,
//!   such as a headless run with periodic analysis.

pub mod core;
pub mod engine;
pub mod workflows;
