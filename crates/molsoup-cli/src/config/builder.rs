use super::defaults::DefaultsConfig;
use super::file::{self, FileConfig};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use molsoup::engine::config::{SimulationConfig, SimulationConfigBuilder};
use molsoup::engine::snapshot::RegionOfInterest;
use molsoup::workflows::run::RunOptions;

/// Layers the configuration: built-in defaults, then the file, then `--set` values,
/// then dedicated CLI flags.
pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let mut table = match &args.config {
        Some(path) => file::read_table(path)?,
        None => toml::Table::new(),
    };
    apply_set_values(&mut table, &args.set_values)?;
    let mut file_config = FileConfig::from_table(table)?;

    let run_file = file_config.run.take().unwrap_or_default();
    let mut simulation = merge_simulation(file_config);

    if let Some(seed) = args.seed.or(run_file.seed) {
        simulation.seed = seed;
    }
    if let Some(temperature) = args.temperature {
        simulation.physics.temperature = temperature;
    }
    let simulation = SimulationConfigBuilder::new()
        .world(simulation.world)
        .physics(simulation.physics)
        .bonding(simulation.bonding)
        .geometry(simulation.geometry)
        .effects(simulation.effects)
        .propagation(simulation.propagation)
        .seed(simulation.seed)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let roi = match (&args.roi, run_file.roi) {
        (Some(text), _) => Some(
            parser::parse_region(text).map_err(|e| CliError::Argument(e.to_string()))?,
        ),
        (None, Some([x0, y0, x1, y1])) => Some(RegionOfInterest::new(x0, y0, x1, y1)),
        (None, None) => None,
    };

    let snapshot_interval = if args.no_analysis {
        0
    } else {
        args.snapshot_interval
            .or(run_file.snapshot_interval)
            .unwrap_or(defaults.snapshot_interval)
    };

    let run = RunOptions {
        ticks: args.ticks.or(run_file.ticks).unwrap_or(defaults.ticks),
        snapshot_interval,
        roi,
        sample_interval: args
            .sample_interval
            .or(run_file.sample_interval)
            .unwrap_or(defaults.sample_interval),
        ..RunOptions::default()
    };

    let atoms = args.atoms.or(run_file.atoms).unwrap_or(defaults.atoms);
    if atoms > simulation.world.max_entities {
        return Err(CliError::Config(format!(
            "{atoms} atoms requested but world.max-entities is {}",
            simulation.world.max_entities
        )));
    }

    Ok(AppConfig {
        simulation,
        run,
        atoms,
        elements_path: args.elements.clone().or(run_file.elements),
        output_path: args.output.clone().or(run_file.output),
    })
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn merge_simulation(file: FileConfig) -> SimulationConfig {
    let mut config = SimulationConfig::default();

    if let Some(w) = file.world {
        let target = &mut config.world;
        set(&mut target.width, w.width);
        set(&mut target.height, w.height);
        set(&mut target.cell_size, w.cell_size);
        set(&mut target.max_per_cell, w.max_per_cell);
        set(&mut target.depth_limit, w.depth_limit);
        set(&mut target.max_entities, w.max_entities);
    }
    if let Some(p) = file.physics {
        let target = &mut config.physics;
        set(&mut target.gravity, p.gravity);
        set(&mut target.gravity_scale, p.gravity_scale);
        set(&mut target.friction, p.friction);
        set(&mut target.temperature, p.temperature);
        set(&mut target.thermal_impulse_scale, p.thermal_impulse_scale);
        set(&mut target.max_speed, p.max_speed);
        set(&mut target.velocity_retention, p.velocity_retention);
        set(&mut target.solver_iterations, p.solver_iterations);
        set(&mut target.collision_stiffness, p.collision_stiffness);
    }
    if let Some(b) = file.bonding {
        let target = &mut config.bonding;
        set(&mut target.range_min, b.range_min);
        set(&mut target.range_max, b.range_max);
        set(&mut target.base_probability, b.base_probability);
        set(&mut target.rest_length, b.rest_length);
        set(&mut target.spring_k, b.spring_k);
        set(&mut target.damping, b.damping);
        set(&mut target.max_force, b.max_force);
        set(&mut target.break_distance, b.break_distance);
        set(&mut target.saturation_threshold, b.saturation_threshold);
        set(&mut target.thermal_break_rate, b.thermal_break_rate);
        set(&mut target.ring_closure, b.ring_closure);
        set(&mut target.medium_polarity, b.medium_polarity);
        set(
            &mut target.hydrophobic_electronegativity,
            b.hydrophobic_electronegativity,
        );
        set(&mut target.hydrophobic_boost, b.hydrophobic_boost);
        set(&mut target.clay_catalysis, b.clay_catalysis);
        set(&mut target.catalysis_boost, b.catalysis_boost);
        set(&mut target.catalysis_cap, b.catalysis_cap);
        set(&mut target.catalysis_brake, b.catalysis_brake);
    }
    if let Some(g) = file.geometry {
        let target = &mut config.geometry;
        set(&mut target.vsepr_enabled, g.vsepr);
        set(&mut target.angular_stiffness, g.angular_stiffness);
        set(&mut target.max_angular_impulse, g.max_angular_impulse);
        set(&mut target.angular_factor, g.angular_factor);
        set(&mut target.angular_damping, g.angular_damping);
        set(
            &mut target.angle_tolerance,
            g.angle_tolerance_degrees.map(f32::to_radians),
        );
        set(&mut target.depth_target, g.depth_target);
        set(&mut target.dihedral_enabled, g.dihedral);
        set(&mut target.dihedral_k, g.dihedral_k);
    }
    if let Some(e) = file.effects {
        let target = &mut config.effects;
        set(&mut target.brownian_enabled, e.brownian);
        set(&mut target.brownian_k, e.brownian_k);
        set(&mut target.coulomb_enabled, e.coulomb);
        set(&mut target.coulomb_k, e.coulomb_k);
        set(&mut target.charge_factor, e.charge_factor);
        set(&mut target.depth_relaxation, e.depth_relaxation);
        set(&mut target.mutation_probability, e.mutation_probability);
        set(&mut target.tunnel_probability, e.tunnel_probability);
        set(&mut target.tunnel_distance, e.tunnel_distance);
        set(&mut target.pulse_radius, e.pulse_radius);
    }
    if let Some(p) = file.propagation {
        set(&mut config.propagation.relabel_interval, p.relabel_interval);
        set(&mut config.propagation.iterations_per_tick, p.iterations_per_tick);
    }
    config
}

fn apply_set_values(table: &mut toml::Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let assignment =
            parser::parse_assignment(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
        let section = table
            .entry(assignment.section.clone())
            .or_insert(toml::Value::Table(toml::Table::new()));
        let toml::Value::Table(section) = section else {
            return Err(CliError::Config(format!(
                "'{}' is not a configuration section",
                assignment.section
            )));
        };
        section.insert(assignment.key, assignment.value);
    }
    Ok(())
}
