use crate::core::models::entities::EntityArrays;
use crate::core::spatial::SpatialGrid;
use crate::core::utils::geometry::{DEGENERATE_LENGTH, clamp_norm};
use crate::core::utils::random::Stream;
use crate::engine::context::TickContext;
use nalgebra::Vector3;
use rand::Rng;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Applies gravity, thermal kicks and friction, clamps speed, then advances positions.
#[instrument(skip_all, name = "predict_task", level = "trace")]
pub fn predict(ctx: &TickContext, entities: &mut EntityArrays) {
    let physics = &ctx.config.physics;
    let gravity = physics.gravity * physics.gravity_scale;
    let kick = physics.temperature * physics.thermal_impulse_scale;

    let EntityArrays {
        ref mut position,
        ref mut old_position,
        ref mut velocity,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = velocity
        .iter_mut()
        .zip(position.iter_mut())
        .zip(old_position.iter_mut())
        .enumerate();

    #[cfg(feature = "parallel")]
    let iterator = velocity
        .par_iter_mut()
        .zip(position.par_iter_mut())
        .zip(old_position.par_iter_mut())
        .enumerate();

    iterator
        .filter(|(i, _)| active[*i])
        .for_each(|(i, ((vel, pos), old))| {
            vel.y += gravity;
            *vel *= physics.friction;
            if kick > 0.0 {
                let mut rng = ctx.rng(i, Stream::Predict);
                vel.x += (rng.r#gen::<f32>() - 0.5) * kick;
                vel.y += (rng.r#gen::<f32>() - 0.5) * kick;
            }
            *vel = clamp_norm(*vel, physics.max_speed);
            if !vel.iter().all(|c| c.is_finite()) {
                *vel = Vector3::zeros();
            }
            *old = *pos;
            *pos += *vel;
        });
}

/// Runs the configured number of wall and overlap relaxation sweeps.
///
/// Each sweep reads a frozen copy of the positions so that every entity only writes
/// its own half of a pairwise correction.
#[instrument(skip_all, name = "resolve_task", level = "trace")]
pub fn resolve(ctx: &TickContext, entities: &mut EntityArrays, grid: &SpatialGrid) {
    for _ in 0..ctx.config.physics.solver_iterations {
        clamp_to_walls(ctx, entities);
        separate_overlaps(ctx, entities, grid);
    }
    clamp_to_walls(ctx, entities);
}

fn clamp_to_walls(ctx: &TickContext, entities: &mut EntityArrays) {
    let world = &ctx.config.world;
    let EntityArrays {
        ref mut position,
        ref old_position,
        ref radius,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = position.iter_mut().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = position.par_iter_mut().enumerate();

    iterator
        .filter(|(i, _)| active[*i])
        .for_each(|(i, pos)| {
            if !pos.iter().all(|c| c.is_finite()) {
                *pos = old_position[i];
            }
            *pos = wall_clamped(pos, radius[i], world.width, world.height, world.depth_limit);
        });
}

#[inline]
pub(crate) fn wall_clamped(
    pos: &Vector3<f32>,
    radius: f32,
    width: f32,
    height: f32,
    depth_limit: f32,
) -> Vector3<f32> {
    let clamp_axis = |v: f32, lo: f32, hi: f32| {
        if !v.is_finite() || lo > hi {
            (lo + hi) * 0.5
        } else {
            v.clamp(lo, hi)
        }
    };
    Vector3::new(
        clamp_axis(pos.x, radius, width - radius),
        clamp_axis(pos.y, radius, height - radius),
        clamp_axis(pos.z, -depth_limit, depth_limit),
    )
}

fn separate_overlaps(ctx: &TickContext, entities: &mut EntityArrays, grid: &SpatialGrid) {
    let half_stiffness = 0.5 * ctx.config.physics.collision_stiffness;
    let frozen = entities.position.clone();
    let EntityArrays {
        ref mut position,
        ref radius,
        ref active,
        ..
    } = *entities;

    #[cfg(not(feature = "parallel"))]
    let iterator = position.iter_mut().enumerate();

    #[cfg(feature = "parallel")]
    let iterator = position.par_iter_mut().enumerate();

    iterator
        .filter(|(i, _)| active[*i])
        .for_each(|(i, pos)| {
            let here = frozen[i];
            let mut correction = Vector3::zeros();
            for j in grid.candidates(&here) {
                if j == i || !active[j] {
                    continue;
                }
                let delta = here - frozen[j];
                let distance = delta.norm();
                let min_distance = radius[i] + radius[j];
                if distance < min_distance && distance > DEGENERATE_LENGTH {
                    correction += delta * ((min_distance - distance) / distance * half_stiffness);
                }
            }
            *pos += correction;
        });
}

/// Velocity is the positional change scaled by the retention factor.
#[instrument(skip_all, name = "derive_task", level = "trace")]
pub fn derive(ctx: &TickContext, entities: &mut EntityArrays) {
    let retention = ctx.config.physics.velocity_retention;
    let EntityArrays {
        ref position,
        ref old_position,
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
        .for_each(|(i, vel)| *vel = (position[i] - old_position[i]) * retention);
}

/// Final speed clamp; the last pass of every tick.
pub fn clamp_velocities(ctx: &TickContext, entities: &mut EntityArrays) {
    let max_speed = ctx.config.physics.max_speed;

    #[cfg(not(feature = "parallel"))]
    let iterator = entities.velocity.iter_mut();

    #[cfg(feature = "parallel")]
    let iterator = entities.velocity.par_iter_mut();

    iterator.for_each(|vel| {
        *vel = if vel.iter().all(|c| c.is_finite()) {
            clamp_norm(*vel, max_speed)
        } else {
            Vector3::zeros()
        };
    });
}
