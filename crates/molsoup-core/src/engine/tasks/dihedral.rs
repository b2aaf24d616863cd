use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::utils::geometry::torsion_normals;
use crate::engine::context::TickContext;
use nalgebra::Vector3;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const MIN_NORMAL_LENGTH: f32 = 0.01;
/// Torsions with a cosine at or below this are already close enough to anti-periplanar.
const ANTI_PERIPLANAR_COS: f32 = -0.98;

/// Nudges the outer atoms of every A-B-C-D torsion toward the staggered zig-zag.
#[instrument(skip_all, name = "dihedral_task", level = "trace")]
pub fn run(ctx: &TickContext, entities: &mut EntityArrays, bonds: &BondTable) -> usize {
    let k = ctx.config.geometry.dihedral_k;
    let impulses = collect_impulses(k, entities, bonds);
    let applied = impulses.len();
    for (index, impulse) in impulses {
        entities.velocity[index] += impulse;
    }
    applied
}

fn collect_impulses(k: f32, entities: &EntityArrays, bonds: &BondTable) -> Vec<(usize, Vector3<f32>)> {
    #[cfg(not(feature = "parallel"))]
    let iterator = 0..entities.len();

    #[cfg(feature = "parallel")]
    let iterator = (0..entities.len()).into_par_iter();

    let per_axis: Vec<Vec<(usize, Vector3<f32>)>> = iterator
        .map(|b| {
            let mut out = Vec::new();
            if !entities.active[b] || bonds.neighbor_count(b) < 2 {
                return out;
            }
            let pos = &entities.position;
            for c in bonds.neighbors(b).filter(|&c| c > b) {
                if !entities.active[c] || bonds.neighbor_count(c) < 2 {
                    continue;
                }
                for a in bonds.neighbors(b).filter(|&a| a != c) {
                    for d in bonds.neighbors(c).filter(|&d| d != b && d != a) {
                        let Some((n1, n2, cos)) =
                            torsion_normals(&pos[a], &pos[b], &pos[c], &pos[d], MIN_NORMAL_LENGTH)
                        else {
                            continue;
                        };
                        if cos > ANTI_PERIPLANAR_COS {
                            let strength = (cos + 1.0) * k;
                            out.push((a, -n1 * strength));
                            out.push((d, n2 * strength));
                        }
                    }
                }
            }
            out
        })
        .collect();

    per_axis.into_iter().flatten().collect()
}
