use crate::core::models::bonds::BondTable;
use crate::core::models::entities::EntityArrays;
use crate::core::spatial::SpatialGrid;
use crate::core::utils::random::Stream;
use crate::engine::context::TickContext;
use nalgebra::Vector3;
use rand::Rng;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Mass-scaled random agitation: `v_rms = sqrt(k * (floor + T) / m)`.
#[instrument(skip_all, name = "brownian_task", level = "trace")]
pub fn brownian(ctx: &TickContext, entities: &mut EntityArrays) {
    let effects = &ctx.config.effects;
    let energy = effects.brownian_k * (effects.brownian_floor + ctx.config.physics.temperature);
    let elements = ctx.elements;
    let EntityArrays {
        ref element,
        ref mut velocity,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = velocity.iter_mut().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = velocity.par_iter_mut().enumerate();

    iterator
        .filter(|(i, _)| active[*i])
        .for_each(|(i, vel)| {
            let mass = elements.element(element[i]).mass;
            let v_rms = (energy / mass).sqrt();
            let mut rng = ctx.rng(i, Stream::Brownian);
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let magnitude = v_rms * rng.r#gen::<f32>();
            vel.x += angle.cos() * magnitude;
            vel.y += angle.sin() * magnitude;
        });
}

/// Like-charged neighbors within the interaction shell push each other apart.
#[instrument(skip_all, name = "coulomb_task", level = "trace")]
pub fn coulomb(ctx: &TickContext, entities: &mut EntityArrays, grid: &SpatialGrid) {
    let effects = &ctx.config.effects;
    let charges = ctx.partial_charges();
    let elements = ctx.elements;
    let min_sq = effects.coulomb_min_distance * effects.coulomb_min_distance;
    let EntityArrays {
        ref element,
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
        .filter(|(i, _)| active[*i])
        .for_each(|(i, vel)| {
            let q_i = charges[element[i].index()];
            let mut force = Vector3::zeros();
            for j in grid.candidates(&position[i]) {
                if j == i || !active[j] {
                    continue;
                }
                let q_j = charges[element[j].index()];
                if q_i * q_j <= 0.0 {
                    continue;
                }
                let mut delta = position[i] - position[j];
                delta.z = 0.0;
                let distance = delta.norm();
                if distance <= effects.coulomb_min_distance
                    || distance >= effects.coulomb_max_distance
                {
                    continue;
                }
                let magnitude = effects.coulomb_k * (q_i * q_j).abs() / (distance * distance).max(min_sq);
                force += delta / distance * magnitude;
            }
            let mass = elements.element(element[i]).mass;
            *vel += force / mass * effects.coulomb_response;
        });
}

/// Lets unbonded atoms drift back toward the plane.
pub fn relax_depth(ctx: &TickContext, entities: &mut EntityArrays, bonds: &BondTable) {
    let relaxation = ctx.config.effects.depth_relaxation;
    if relaxation <= 0.0 {
        return;
    }
    let EntityArrays {
        ref mut position,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = position.iter_mut().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = position.par_iter_mut().enumerate();

    iterator
        .filter(|(i, _)| active[*i] && bonds.neighbor_count(*i) == 0)
        .for_each(|(_, pos)| pos.z -= pos.z * relaxation);
}

/// Radial outward shove with linear falloff, e.g. from a pointer click.
pub fn force_pulse(entities: &mut EntityArrays, center: Vector3<f32>, radius: f32, power: f32) -> usize {
    let mut affected = 0;
    for i in 0..entities.len() {
        if !entities.active[i] {
            continue;
        }
        let mut delta = entities.position[i] - center;
        delta.z = 0.0;
        let distance = delta.norm();
        if distance >= radius || distance <= f32::EPSILON {
            continue;
        }
        entities.velocity[i] += delta / distance * power * (1.0 - distance / radius);
        affected += 1;
    }
    affected
}

/// Random planar kick to every active entity, for unjamming dense clusters.
pub fn shake(ctx: &TickContext, entities: &mut EntityArrays, magnitude: f32) {
    for i in 0..entities.len() {
        if entities.active[i] {
            let mut rng = ctx.rng(i, Stream::Shake);
            entities.velocity[i].x += (rng.r#gen::<f32>() - 0.5) * magnitude;
            entities.velocity[i].y += (rng.r#gen::<f32>() - 0.5) * magnitude;
        }
    }
}
