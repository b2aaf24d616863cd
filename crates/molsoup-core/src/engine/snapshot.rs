use crate::core::chemistry::ElementId;
use crate::engine::error::EngineError;
use nalgebra::Vector3;

/// Owned copy of the chemistry-relevant state at one tick, safe to hand to another thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChemistrySnapshot {
    pub tick: u64,
    pub elements: Vec<ElementId>,
    pub molecule_ids: Vec<u32>,
    pub bond_counts: Vec<u32>,
    pub positions: Vec<Vector3<f32>>,
    pub active: Vec<bool>,
}

impl ChemistrySnapshot {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Every per-entity array must have one entry per element.
    pub fn check_consistent(&self) -> Result<(), EngineError> {
        let expected = self.elements.len();
        let lengths = [
            ("molecule_ids", self.molecule_ids.len()),
            ("bond_counts", self.bond_counts.len()),
            ("positions", self.positions.len()),
            ("active", self.active.len()),
        ];
        match lengths.iter().find(|(_, len)| *len != expected) {
            Some((name, len)) => Err(EngineError::Snapshot(format!(
                "{name} has {len} entries, expected {expected}"
            ))),
            None => Ok(()),
        }
    }
}

/// Axis-aligned planar window. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl RegionOfInterest {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    #[inline]
    pub fn contains(&self, position: &Vector3<f32>) -> bool {
        position.x >= self.min_x
            && position.x <= self.max_x
            && position.y >= self.min_y
            && position.y <= self.max_y
    }
}
