//! Entity storage and the bond arena.
//!
//! Both containers are indexed by the dense entity index; neither owns the other.

pub mod bonds;
pub mod entities;
