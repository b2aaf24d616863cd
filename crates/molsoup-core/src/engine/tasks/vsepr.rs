//! Angular corrections from valence-shell electron pair repulsion.
//!
//! The ideal angle at a center is derived from its electron domains rather than looked
//! up per molecule: bonding domains plus lone pairs pick a base geometry, each lone pair
//! contracts it slightly, and more electronegative neighbors pull it narrower still.

use crate::core::chemistry::{Element, ElementTable};
use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::utils::geometry::{DEGENERATE_LENGTH, angle_between, try_normalize};
use crate::engine::config::GeometryConfig;
use crate::engine::context::TickContext;
use itertools::Itertools;
use nalgebra::Vector3;
use std::f32::consts::PI;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const LINEAR: f32 = PI;
const TRIGONAL: f32 = 2.094;
const TETRAHEDRAL: f32 = 1.911;
const OCTAHEDRAL: f32 = 1.571;

pub fn lone_pairs(center: &Element, bond_count: usize) -> f32 {
    ((center.valence_electrons as f32 - bond_count as f32) / 2.0).max(0.0)
}

/// Target angle in radians between two bonds of `center`.
pub fn ideal_angle(
    config: &GeometryConfig,
    center: &Element,
    bond_count: usize,
    first: &Element,
    second: &Element,
) -> f32 {
    let lone = lone_pairs(center, bond_count);
    let domains = bond_count as f32 + lone;
    let base = if domains <= 2.1 {
        LINEAR
    } else if (2.9..=3.1).contains(&domains) {
        TRIGONAL
    } else if domains > 4.1 {
        OCTAHEDRAL
    } else {
        TETRAHEDRAL
    };

    let bent = [first, second]
        .iter()
        .map(|n| (n.electronegativity - center.electronegativity) * config.electronegativity_sensitivity)
        .sum::<f32>();

    (base - lone * config.lone_pair_contraction - bent).clamp(0.5, PI)
}

/// Impulses on the two outer atoms of one angle, plus the reaction on the center.
fn angle_impulses(
    config: &GeometryConfig,
    v1: &Vector3<f32>,
    v2: &Vector3<f32>,
    ideal: f32,
) -> Option<(Vector3<f32>, Vector3<f32>)> {
    let current = angle_between(v1, v2)?;
    let error = current - ideal;
    if error.abs() <= config.angle_tolerance {
        return None;
    }
    let axis = try_normalize(&v1.cross(v2), DEGENERATE_LENGTH)?;
    let toward_second = try_normalize(&axis.cross(v1), DEGENERATE_LENGTH)?;
    let toward_first = try_normalize(&v2.cross(&axis), DEGENERATE_LENGTH)?;

    let max = config.max_angular_impulse;
    let magnitude = (error * config.angular_stiffness / max).tanh()
        * max
        * config.angular_factor
        * (1.0 - config.angular_damping);

    Some((toward_second * magnitude, toward_first * magnitude))
}

/// Applies angular corrections for every center with two or more bonds.
#[instrument(skip_all, name = "vsepr_task", level = "trace")]
pub fn run(ctx: &TickContext, entities: &mut EntityArrays, bonds: &BondTable) -> usize {
    let config = &ctx.config.geometry;
    let impulses = collect_impulses(config, ctx.elements, entities, bonds);
    let applied = impulses.len();
    for (index, impulse) in impulses {
        entities.velocity[index] += impulse;
    }
    nudge_out_of_plane(config, entities, bonds);
    applied
}

fn collect_impulses(
    config: &GeometryConfig,
    elements: &ElementTable,
    entities: &EntityArrays,
    bonds: &BondTable,
) -> Vec<(usize, Vector3<f32>)> {
    #[cfg(not(feature = "parallel"))]
    let iterator = 0..entities.len();

    #[cfg(feature = "parallel")]
    let iterator = (0..entities.len()).into_par_iter();

    let per_center: Vec<Vec<(usize, Vector3<f32>)>> = iterator
        .map(|c| {
            let mut out = Vec::new();
            let bond_count = bonds.neighbor_count(c);
            if !entities.active[c] || bond_count < 2 {
                return out;
            }
            let center = elements.element(entities.element[c]);
            let origin = entities.position[c];
            let neighbors: Vec<usize> = bonds.neighbors(c).collect();

            for (a, b) in neighbors.iter().copied().tuple_combinations() {
                let ideal = ideal_angle(
                    config,
                    center,
                    bond_count,
                    elements.element(entities.element[a]),
                    elements.element(entities.element[b]),
                );
                let v1 = entities.position[a] - origin;
                let v2 = entities.position[b] - origin;
                if let Some((on_a, on_b)) = angle_impulses(config, &v1, &v2, ideal) {
                    out.push((a, on_a));
                    out.push((b, on_b));
                    out.push((c, -(on_a + on_b)));
                }
            }
            out
        })
        .collect();

    per_center.into_iter().flatten().collect()
}

/// Pushes bonded atoms that sit flat in the plane toward a small alternating depth, so
/// the angle model always has a non-degenerate rotation axis to work with.
fn nudge_out_of_plane(config: &GeometryConfig, entities: &mut EntityArrays, bonds: &BondTable) {
    let EntityArrays {
        ref position,
        ref mut velocity,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = velocity.iter_mut().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = velocity.par_iter_mut().enumerate();

    iterator
        .filter(|(i, _)| active[*i] && bonds.neighbor_count(*i) > 0)
        .for_each(|(i, vel)| {
            let target = if i % 2 == 0 {
                config.depth_target
            } else {
                -config.depth_target
            };
            let offset = target - position[i].z;
            if offset.abs() > config.depth_nudge_threshold && vel.z.abs() < 1.0 {
                vel.z += config.depth_nudge * offset.signum();
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ElementTable {
        ElementTable::builtin()
    }

    fn element<'a>(table: &'a ElementTable, symbol: &str) -> &'a Element {
        table.element(table.id_of(symbol).unwrap())
    }

    #[test]
    fn water_center_has_two_lone_pairs_and_bent_geometry() {
        let t = table();
        let config = GeometryConfig::default();
        let o = element(&t, "O");
        let h = element(&t, "H");
        assert_eq!(lone_pairs(o, 2), 2.0);

        let ideal = ideal_angle(&config, o, 2, h, h).to_degrees();
        assert!((ideal - 108.7).abs() < 0.2, "got {ideal}");
    }

    #[test]
    fn saturated_carbon_is_tetrahedral_and_carbon_dioxide_is_linear() {
        let t = table();
        let config = GeometryConfig::default();
        let c = element(&t, "C");
        let h = element(&t, "H");
        let o = element(&t, "O");

        let methane = ideal_angle(&config, c, 4, h, h).to_degrees();
        assert!((methane - 109.5).abs() < 1.5, "got {methane}");

        let dioxide = ideal_angle(&config, c, 2, o, o);
        assert_eq!(lone_pairs(c, 2), 1.0);
        assert!(dioxide < PI, "one residual lone pair bends the molecule slightly");
    }

    #[test]
    fn open_angle_is_pushed_closed() {
        let config = GeometryConfig::default();
        let v1 = Vector3::new(1.0, 0.0, 0.0);
        let v2 = Vector3::new(-0.5, 0.866, 0.0);
        let (on_a, on_b) = angle_impulses(&config, &v1, &v2, 90f32.to_radians()).unwrap();

        let closed = angle_between(&(v1 + on_a * 0.01), &(v2 + on_b * 0.01)).unwrap();
        assert!(closed < 120f32.to_radians());
    }

    #[test]
    fn small_errors_are_ignored() {
        let config = GeometryConfig::default();
        let v1 = Vector3::new(1.0, 0.0, 0.0);
        let v2 = Vector3::new(0.0, 1.0, 0.0);
        let ideal = 90.5f32.to_radians();
        assert!(angle_impulses(&config, &v1, &v2, ideal).is_none());
    }

    #[test]
    fn collinear_bonds_have_no_rotation_axis() {
        let config = GeometryConfig::default();
        let v1 = Vector3::new(1.0, 0.0, 0.0);
        let v2 = Vector3::new(-1.0, 0.0, 0.0);
        assert!(angle_impulses(&config, &v1, &v2, 1.9).is_none());
    }
}
