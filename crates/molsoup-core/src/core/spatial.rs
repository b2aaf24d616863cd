use itertools::iproduct;
use nalgebra::Vector3;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub type CellCoord = (usize, usize);

/// Uniform bucket grid over the simulation plane.
///
/// Rebuilt from scratch each time it is queried for a new set of positions. Every cell
/// holds at most `capacity` entries; insertions past that bound are dropped and only
/// counted, so collision and bonding quality degrade gracefully in very dense regions.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f32,
    cols: usize,
    rows: usize,
    capacity: usize,
    counts: Vec<AtomicU32>,
    entries: Vec<AtomicU32>,
    overflow: AtomicUsize,
}

impl SpatialGrid {
    pub fn new(width: f32, height: f32, cell_size: f32, capacity: usize) -> Self {
        let cols = ((width / cell_size).ceil() as usize).max(1);
        let rows = ((height / cell_size).ceil() as usize).max(1);
        let cells = cols * rows;
        Self {
            cell_size,
            cols,
            rows,
            capacity,
            counts: (0..cells).map(|_| AtomicU32::new(0)).collect(),
            entries: (0..cells * capacity)
                .map(|_| AtomicU32::new(u32::MAX))
                .collect(),
            overflow: AtomicUsize::new(0),
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a grid built with these parameters would have the same layout.
    pub fn fits(&self, width: f32, height: f32, cell_size: f32, capacity: usize) -> bool {
        let cols = ((width / cell_size).ceil() as usize).max(1);
        let rows = ((height / cell_size).ceil() as usize).max(1);
        self.cell_size == cell_size && self.capacity == capacity && (cols, rows) == (self.cols, self.rows)
    }

    /// Entities dropped by the most recent [`Self::rebuild`] because their cell was full.
    pub fn overflow(&self) -> usize {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Clears all cells and inserts every active entity by its planar position.
    pub fn rebuild(&mut self, positions: &[Vector3<f32>], active: &[bool]) {
        for count in self.counts.iter_mut() {
            *count.get_mut() = 0;
        }
        *self.overflow.get_mut() = 0;

        let this = &*self;

        #[cfg(not(feature = "parallel"))]
        let iterator = positions.iter().enumerate();

        #[cfg(feature = "parallel")]
        let iterator = positions.par_iter().enumerate();

        iterator
            .filter(|(i, _)| active[*i])
            .for_each(|(i, position)| this.insert(i, position));
    }

    fn insert(&self, index: usize, position: &Vector3<f32>) {
        let cell = self.cell_index(self.cell_of(position));
        let slot = self.counts[cell].fetch_add(1, Ordering::AcqRel) as usize;
        if slot < self.capacity {
            self.entries[cell * self.capacity + slot].store(index as u32, Ordering::Release);
        } else {
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Maps a position to its cell, clamping out-of-bounds (and NaN) coordinates to the
    /// nearest edge cell.
    #[inline]
    pub fn cell_of(&self, position: &Vector3<f32>) -> CellCoord {
        let cx = (position.x / self.cell_size).floor() as isize;
        let cy = (position.y / self.cell_size).floor() as isize;
        (
            cx.clamp(0, self.cols as isize - 1) as usize,
            cy.clamp(0, self.rows as isize - 1) as usize,
        )
    }

    #[inline]
    fn cell_index(&self, (cx, cy): CellCoord) -> usize {
        cy * self.cols + cx
    }

    pub fn occupancy(&self, cell: CellCoord) -> usize {
        (self.counts[self.cell_index(cell)].load(Ordering::Acquire) as usize).min(self.capacity)
    }

    pub fn occupants(&self, cell: CellCoord) -> impl Iterator<Item = usize> + '_ {
        let base = self.cell_index(cell) * self.capacity;
        self.entries[base..base + self.occupancy(cell)]
            .iter()
            .map(|e| e.load(Ordering::Acquire) as usize)
    }

    /// The cell itself and its in-bounds neighbors (up to 3×3).
    pub fn neighbor_cells(&self, (cx, cy): CellCoord) -> impl Iterator<Item = CellCoord> + '_ {
        iproduct!(-1isize..=1, -1isize..=1).filter_map(move |(dx, dy)| {
            let nx = cx as isize + dx;
            let ny = cy as isize + dy;
            (nx >= 0 && ny >= 0 && (nx as usize) < self.cols && (ny as usize) < self.rows)
                .then_some((nx as usize, ny as usize))
        })
    }

    /// Every entity bucketed in the 3×3 neighborhood of `position`'s cell.
    pub fn candidates(&self, position: &Vector3<f32>) -> impl Iterator<Item = usize> + '_ {
        self.neighbor_cells(self.cell_of(position))
            .flat_map(move |cell| self.occupants(cell))
    }
}
