use crate::core::chemistry::ElementId;
use nalgebra::Vector3;

/// Struct-of-arrays storage for every atom in the simulation.
///
/// The dense index into these arrays is the entity's identity. `x` and `y` span the
/// simulation plane and `z` is a bounded pseudo-depth used by the geometry models.
#[derive(Debug, Clone, Default)]
pub struct EntityArrays {
    pub element: Vec<ElementId>,
    pub position: Vec<Vector3<f32>>,
    pub old_position: Vec<Vector3<f32>>,
    pub velocity: Vec<Vector3<f32>>,
    pub radius: Vec<f32>,
    pub active: Vec<bool>,
    /// Entities with `breakable == false` keep their bonds regardless of stretch.
    pub breakable: Vec<bool>,
}

impl EntityArrays {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            element: Vec::with_capacity(capacity),
            position: Vec::with_capacity(capacity),
            old_position: Vec::with_capacity(capacity),
            velocity: Vec::with_capacity(capacity),
            radius: Vec::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
            breakable: Vec::with_capacity(capacity),
        }
    }

    pub fn push(
        &mut self,
        element: ElementId,
        radius: f32,
        position: Vector3<f32>,
        velocity: Vector3<f32>,
    ) -> usize {
        let index = self.element.len();
        self.element.push(element);
        self.position.push(position);
        self.old_position.push(position);
        self.velocity.push(velocity);
        self.radius.push(radius);
        self.active.push(true);
        self.breakable.push(true);
        index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.element.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn speed(&self, index: usize) -> f32 {
        self.velocity[index].norm()
    }
}
