use crate::core::chemistry::ElementTable;
use crate::core::models::bonds::MAX_VALENCE;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    /// Must be at least the maximum bond range so a 3×3 window sees every candidate.
    pub cell_size: f32,
    pub max_per_cell: usize,
    /// Pseudo-depth is clamped into `[-depth_limit, depth_limit]`.
    pub depth_limit: f32,
    pub max_entities: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 3000.0,
            height: 3000.0,
            cell_size: 240.0,
            max_per_cell: 64,
            depth_limit: 60.0,
            max_entities: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsConfig {
    pub gravity: f32,
    pub gravity_scale: f32,
    pub friction: f32,
    pub temperature: f32,
    pub thermal_impulse_scale: f32,
    pub max_speed: f32,
    /// Fraction of the positional change kept as velocity after the solver runs.
    pub velocity_retention: f32,
    pub solver_iterations: usize,
    /// `1.0` separates overlapping pairs completely, half the overlap each.
    pub collision_stiffness: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.0,
            gravity_scale: 5.0,
            friction: 0.95,
            temperature: 0.1,
            thermal_impulse_scale: 20.0,
            max_speed: 24.0,
            velocity_retention: 0.9,
            solver_iterations: 3,
            collision_stiffness: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BondingConfig {
    pub range_min: f32,
    pub range_max: f32,
    pub base_probability: f32,
    pub rest_length: f32,
    pub spring_k: f32,
    pub damping: f32,
    pub max_force: f32,
    /// Converts the clamped bond force into a per-tick velocity change.
    pub force_factor: f32,
    pub break_distance: f32,
    /// Pairs whose combined neighbor count exceeds this may break thermally.
    pub saturation_threshold: u32,
    pub thermal_break_rate: f32,
    pub thermal_break_floor: f32,
    /// Atoms already sharing a molecule id bond without a probability draw.
    pub ring_closure: bool,
    /// Polarity of the surrounding medium in `[0, 1]`; above one half, pairs of
    /// electropositive atoms bond more readily.
    pub medium_polarity: f32,
    pub hydrophobic_electronegativity: f32,
    pub hydrophobic_boost: f32,
    /// Silicon anchors carbon and nitrogen, and templates bonds between organic pairs
    /// touching it.
    pub clay_catalysis: bool,
    pub catalysis_boost: f32,
    pub catalysis_cap: f32,
    /// Multiplier applied when both catalysed atoms already have two or more bonds.
    pub catalysis_brake: f32,
}

impl Default for BondingConfig {
    fn default() -> Self {
        Self {
            range_min: 6.0,
            range_max: 210.0,
            base_probability: 0.3,
            rest_length: 105.0,
            spring_k: 1.5,
            damping: 6.0,
            max_force: 60.0,
            force_factor: 0.05,
            break_distance: 315.0,
            saturation_threshold: 5,
            thermal_break_rate: 0.0005,
            thermal_break_floor: 0.05,
            ring_closure: true,
            medium_polarity: 0.0,
            hydrophobic_electronegativity: 2.8,
            hydrophobic_boost: 2.0,
            clay_catalysis: true,
            catalysis_boost: 5.0,
            catalysis_cap: 0.98,
            catalysis_brake: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryConfig {
    pub vsepr_enabled: bool,
    pub angular_stiffness: f32,
    pub max_angular_impulse: f32,
    pub angular_factor: f32,
    pub angular_damping: f32,
    /// Angular errors at or below this many radians are ignored.
    pub angle_tolerance: f32,
    pub lone_pair_contraction: f32,
    pub electronegativity_sensitivity: f32,
    pub depth_target: f32,
    pub depth_nudge: f32,
    pub depth_nudge_threshold: f32,
    pub dihedral_enabled: bool,
    pub dihedral_k: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            vsepr_enabled: true,
            angular_stiffness: 30.0,
            max_angular_impulse: 10.0,
            angular_factor: 0.25,
            angular_damping: 0.2,
            angle_tolerance: 1.5_f32.to_radians(),
            lone_pair_contraction: 0.044,
            electronegativity_sensitivity: 0.03,
            depth_target: 15.0,
            depth_nudge: 5.0,
            depth_nudge_threshold: 10.0,
            dihedral_enabled: true,
            dihedral_k: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectsConfig {
    pub brownian_enabled: bool,
    pub brownian_k: f32,
    pub brownian_floor: f32,
    pub coulomb_enabled: bool,
    pub coulomb_k: f32,
    pub coulomb_min_distance: f32,
    pub coulomb_max_distance: f32,
    pub coulomb_response: f32,
    pub charge_factor: f32,
    pub reference_electronegativity: f32,
    pub depth_relaxation: f32,
    pub mutation_probability: f64,
    pub tunnel_speed_fraction: f32,
    pub tunnel_probability: f64,
    pub tunnel_distance: f32,
    pub pulse_radius: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            brownian_enabled: true,
            brownian_k: 0.1,
            brownian_floor: 0.05,
            coulomb_enabled: true,
            coulomb_k: 50.0,
            coulomb_min_distance: 5.0,
            coulomb_max_distance: 50.0,
            coulomb_response: 0.1,
            charge_factor: 0.2,
            reference_electronegativity: 2.82,
            depth_relaxation: 0.05,
            mutation_probability: 0.00005,
            tunnel_speed_fraction: 0.95,
            tunnel_probability: 0.01,
            tunnel_distance: 60.0,
            pulse_radius: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    /// Molecule ids are reset to self every this many ticks.
    pub relabel_interval: u64,
    pub iterations_per_tick: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            relabel_interval: 20,
            iterations_per_tick: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationConfig {
    pub world: WorldConfig,
    pub physics: PhysicsConfig,
    pub bonding: BondingConfig,
    pub geometry: GeometryConfig,
    pub effects: EffectsConfig,
    pub propagation: PropagationConfig,
    pub seed: u64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.world;
        if !(w.width > 0.0 && w.height > 0.0) {
            return Err(invalid("world.width/height", "must be positive"));
        }
        if !(w.cell_size > 0.0) {
            return Err(invalid("world.cell_size", "must be positive"));
        }
        if w.cell_size < self.bonding.range_max {
            return Err(invalid(
                "world.cell_size",
                format!(
                    "{} is smaller than bonding.range_max ({})",
                    w.cell_size, self.bonding.range_max
                ),
            ));
        }
        if w.max_per_cell == 0 {
            return Err(invalid("world.max_per_cell", "must be at least 1"));
        }
        if w.max_entities == 0 || w.max_entities >= u32::MAX as usize {
            return Err(invalid("world.max_entities", "out of range"));
        }
        if w.depth_limit < 0.0 {
            return Err(invalid("world.depth_limit", "must not be negative"));
        }

        let p = &self.physics;
        if !(0.0..=1.0).contains(&p.friction) {
            return Err(invalid("physics.friction", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&p.velocity_retention) {
            return Err(invalid("physics.velocity_retention", "must be within [0, 1]"));
        }
        if p.temperature < 0.0 {
            return Err(invalid("physics.temperature", "must not be negative"));
        }
        if !(p.max_speed > 0.0) {
            return Err(invalid("physics.max_speed", "must be positive"));
        }
        if p.solver_iterations == 0 {
            return Err(invalid("physics.solver_iterations", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&p.collision_stiffness) {
            return Err(invalid("physics.collision_stiffness", "must be within [0, 1]"));
        }

        let b = &self.bonding;
        if !(b.range_min >= 0.0 && b.range_min < b.range_max) {
            return Err(invalid(
                "bonding.range_min",
                "must be non-negative and below bonding.range_max",
            ));
        }
        if !(0.0..=1.0).contains(&b.base_probability) {
            return Err(invalid("bonding.base_probability", "must be within [0, 1]"));
        }
        if b.break_distance <= b.rest_length {
            return Err(invalid(
                "bonding.break_distance",
                "must exceed bonding.rest_length",
            ));
        }
        if !(b.max_force > 0.0) {
            return Err(invalid("bonding.max_force", "must be positive"));
        }
        if !(0.0..=1.0).contains(&b.medium_polarity) {
            return Err(invalid("bonding.medium_polarity", "must be within [0, 1]"));
        }
        if !(b.hydrophobic_boost >= 0.0 && b.catalysis_boost >= 0.0) {
            return Err(invalid(
                "bonding.hydrophobic_boost/catalysis_boost",
                "must not be negative",
            ));
        }
        if !(0.0..=1.0).contains(&b.catalysis_cap) {
            return Err(invalid("bonding.catalysis_cap", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&b.catalysis_brake) {
            return Err(invalid("bonding.catalysis_brake", "must be within [0, 1]"));
        }
        if b.saturation_threshold as usize > 2 * MAX_VALENCE {
            return Err(invalid(
                "bonding.saturation_threshold",
                format!("cannot exceed {}", 2 * MAX_VALENCE),
            ));
        }

        let g = &self.geometry;
        if !(0.0..1.0).contains(&g.angular_damping) {
            return Err(invalid("geometry.angular_damping", "must be within [0, 1)"));
        }
        if !(g.max_angular_impulse > 0.0) {
            return Err(invalid("geometry.max_angular_impulse", "must be positive"));
        }

        let e = &self.effects;
        if !(0.0..=1.0).contains(&e.mutation_probability) {
            return Err(invalid("effects.mutation_probability", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&e.tunnel_probability) {
            return Err(invalid("effects.tunnel_probability", "must be within [0, 1]"));
        }
        if e.coulomb_min_distance <= 0.0 || e.coulomb_min_distance >= e.coulomb_max_distance {
            return Err(invalid(
                "effects.coulomb_min_distance",
                "must be positive and below effects.coulomb_max_distance",
            ));
        }
        if !(0.0..=1.0).contains(&e.depth_relaxation) {
            return Err(invalid("effects.depth_relaxation", "must be within [0, 1]"));
        }

        if self.propagation.relabel_interval == 0 {
            return Err(invalid("propagation.relabel_interval", "must be at least 1"));
        }

        Ok(())
    }

    /// [`Self::validate`] plus the checks that depend on the element table: a contact
    /// between the two largest atoms must fit inside one cell.
    pub fn validate_for(&self, elements: &ElementTable) -> Result<(), ConfigError> {
        self.validate()?;
        let largest = elements
            .iter()
            .map(|(_, e)| e.radius)
            .fold(0.0_f32, f32::max);
        if self.world.cell_size < 2.0 * largest {
            return Err(invalid(
                "world.cell_size",
                format!(
                    "{} is smaller than twice the largest atomic radius ({largest})",
                    self.world.cell_size
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SimulationConfigBuilder {
    config: SimulationConfig,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world(mut self, world: WorldConfig) -> Self {
        self.config.world = world;
        self
    }
    pub fn physics(mut self, physics: PhysicsConfig) -> Self {
        self.config.physics = physics;
        self
    }
    pub fn bonding(mut self, bonding: BondingConfig) -> Self {
        self.config.bonding = bonding;
        self
    }
    pub fn geometry(mut self, geometry: GeometryConfig) -> Self {
        self.config.geometry = geometry;
        self
    }
    pub fn effects(mut self, effects: EffectsConfig) -> Self {
        self.config.effects = effects;
        self
    }
    pub fn propagation(mut self, propagation: PropagationConfig) -> Self {
        self.config.propagation = propagation;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.physics.temperature = temperature;
        self
    }
    pub fn gravity(mut self, gravity: f32) -> Self {
        self.config.physics.gravity = gravity;
        self
    }
    pub fn base_probability(mut self, probability: f32) -> Self {
        self.config.bonding.base_probability = probability;
        self
    }
    pub fn world_size(mut self, width: f32, height: f32) -> Self {
        self.config.world.width = width;
        self.config.world.height = height;
        self
    }

    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub job_capacity: usize,
    pub result_capacity: usize,
    pub join_timeout: Duration,
    /// How long the idle worker parks before re-checking the stop flag.
    pub idle_poll: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_capacity: 2,
            result_capacity: 4,
            join_timeout: Duration::from_secs(1),
            idle_poll: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chemistry::ElementId;

    #[test]
    fn defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(SimulationConfigBuilder::new().build().is_ok());
    }

    #[test]
    fn builder_overrides_individual_values() {
        let config = SimulationConfigBuilder::new()
            .temperature(0.0)
            .gravity(0.2)
            .base_probability(1.0)
            .world_size(1000.0, 800.0)
            .seed(42)
            .build()
            .unwrap();
        assert_eq!(config.physics.temperature, 0.0);
        assert_eq!(config.physics.gravity, 0.2);
        assert_eq!(config.bonding.base_probability, 1.0);
        assert_eq!(config.world.height, 800.0);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let world = WorldConfig {
            cell_size: 0.0,
            ..WorldConfig::default()
        };
        let err = SimulationConfigBuilder::new().world(world).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "world.cell_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_cell_size_smaller_than_bond_range() {
        let world = WorldConfig {
            cell_size: 100.0,
            ..WorldConfig::default()
        };
        assert!(SimulationConfigBuilder::new().world(world).build().is_err());
    }

    #[test]
    fn rejects_cell_size_smaller_than_largest_atom() {
        let mut elements = ElementTable::builtin();
        let config = SimulationConfig::default();
        assert!(config.validate_for(&elements).is_ok());

        let mut huge = elements.element(ElementId(0)).clone();
        huge.symbol = "Xx".to_string();
        huge.radius = config.world.cell_size;
        elements = ElementTable::with_elements(
            elements.iter().map(|(_, e)| e.clone()).chain([huge]).collect(),
            0.25,
        );
        let err = config.validate_for(&elements).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "world.cell_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_medium_polarity_out_of_range() {
        let bonding = BondingConfig {
            medium_polarity: 1.5,
            ..BondingConfig::default()
        };
        assert!(SimulationConfigBuilder::new().bonding(bonding).build().is_err());
    }

    #[test]
    fn rejects_probability_above_one() {
        assert!(
            SimulationConfigBuilder::new()
                .base_probability(1.5)
                .build()
                .is_err()
        );
    }

    #[test]
    fn rejects_break_distance_below_rest_length() {
        let bonding = BondingConfig {
            break_distance: 50.0,
            ..BondingConfig::default()
        };
        assert!(SimulationConfigBuilder::new().bonding(bonding).build().is_err());
    }

    #[test]
    fn rejects_zero_relabel_interval() {
        let propagation = PropagationConfig {
            relabel_interval: 0,
            ..PropagationConfig::default()
        };
        assert!(
            SimulationConfigBuilder::new()
                .propagation(propagation)
                .build()
                .is_err()
        );
    }
}
