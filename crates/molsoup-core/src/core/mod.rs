//! # Core Module
//!
//! Stateless building blocks shared by every simulation pass.
//!
//! - **Chemistry data** ([`chemistry`]) - Element properties and the pairwise affinity matrix,
//!   either built in or loaded from TOML
//! - **Entity storage** ([`models`]) - Struct-of-arrays atom state and the fixed-capacity
//!   bond arena with atomic valence accounting
//! - **Spatial partitioning** ([`spatial`]) - Bounded uniform grid rebuilt every tick for
//!   neighborhood queries
//! - **Utilities** ([`utils`]) - Vector geometry helpers and per-entity random streams
//!
//! Nothing in this layer knows about tick ordering; that is the job of [`crate::engine`].

pub mod chemistry;
pub mod models;
pub mod spatial;
pub mod utils;
