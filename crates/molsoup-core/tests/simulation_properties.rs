use molsoup::core::chemistry::ElementTable;
use molsoup::core::models::bonds::MAX_VALENCE;
use molsoup::engine::config::{SimulationConfig, SimulationConfigBuilder};
use molsoup::engine::simulation::Simulation;
use molsoup::engine::tasks::vsepr;
use nalgebra::Vector3;
use std::collections::BTreeSet;
use std::sync::Arc;

fn crowded_simulation(seed: u64, atoms: usize) -> Simulation {
    let config = SimulationConfigBuilder::new()
        .world_size(1500.0, 1500.0)
        .seed(seed)
        .temperature(0.3)
        .base_probability(0.6)
        .build()
        .unwrap();
    let mut sim = Simulation::new(config, Arc::new(ElementTable::builtin())).unwrap();
    sim.spawn_random(atoms).unwrap();
    sim
}

fn still_config() -> SimulationConfig {
    let mut config = SimulationConfigBuilder::new().temperature(0.0).build().unwrap();
    config.effects.brownian_enabled = false;
    config.effects.coulomb_enabled = false;
    config.effects.mutation_probability = 0.0;
    config.effects.tunnel_probability = 0.0;
    config
}

fn bond_set(sim: &Simulation) -> BTreeSet<(usize, usize)> {
    let bonds = sim.bonds();
    (0..bonds.len())
        .flat_map(|i| bonds.neighbors(i).map(move |j| (i.min(j), i.max(j))))
        .collect()
}

#[test]
fn valence_is_conserved_and_never_negative() {
    let mut sim = crowded_simulation(3, 500);
    for _ in 0..250 {
        sim.step();
        let entities = sim.entities();
        let bonds = sim.bonds();
        for i in 0..entities.len() {
            let max = sim.elements().element(entities.element[i]).max_valence as i32;
            let budget = max.min(MAX_VALENCE as i32);
            let free = bonds.free_valence(i);
            assert!(free >= 0, "entity {i} has negative free valence");
            assert_eq!(
                bonds.neighbor_count(i) as i32 + free,
                budget,
                "valence accounting drifted for entity {i} at tick {}",
                sim.tick()
            );
        }
    }
}

#[test]
fn bonds_stay_symmetric_and_counted() {
    let mut sim = crowded_simulation(5, 500);
    for _ in 0..250 {
        sim.step();
        let bonds = sim.bonds();
        for i in 0..bonds.len() {
            for j in bonds.neighbors(i) {
                assert_ne!(i, j, "self bond on {i}");
                assert!(bonds.is_bonded(j, i), "bond {i}->{j} is one-sided");
            }
            let unique: BTreeSet<usize> = bonds.neighbors(i).collect();
            assert_eq!(unique.len(), bonds.neighbor_count(i), "duplicate bond on {i}");
        }
        assert_eq!(sim.counters().current_bonds, bonds.total_bonds() as i64);
    }
    assert!(sim.counters().bonds_formed > 0);
}

#[test]
fn speeds_never_exceed_the_limit_after_a_tick() {
    let mut sim = crowded_simulation(9, 400);
    let max_speed = sim.config().physics.max_speed;
    for tick in 0..150 {
        if tick % 30 == 0 {
            sim.apply_force_pulse(Vector3::new(750.0, 750.0, 0.0), 500.0);
            sim.shake(200.0);
        }
        sim.step();
        let entities = sim.entities();
        for i in 0..entities.len() {
            assert!(entities.speed(i) <= max_speed * 1.0001, "entity {i} too fast");
            assert!(entities.position[i].iter().all(|c| c.is_finite()));
        }
    }
}

#[test]
fn water_relaxes_toward_its_bent_geometry() {
    let mut elements = ElementTable::builtin();
    let h = elements.id_of("H").unwrap();
    elements.set_affinity(h, h, 0.0);
    let mut config = still_config();
    config.bonding.base_probability = 1.0;
    let mut sim = Simulation::new(config, Arc::new(elements)).unwrap();

    let center = Vector3::new(1500.0, 1500.0, 0.0);
    let half_angle = 75f32.to_radians();
    let rest = sim.config().bonding.rest_length;
    let o = sim.spawn_symbol("O", center).unwrap();
    let h1 = sim
        .spawn_symbol("H", center + Vector3::new(half_angle.cos(), half_angle.sin(), 0.0) * rest)
        .unwrap();
    let h2 = sim
        .spawn_symbol("H", center + Vector3::new(half_angle.cos(), -half_angle.sin(), 0.0) * rest)
        .unwrap();

    for _ in 0..600 {
        sim.step();
    }

    assert!(sim.bonds().is_bonded(o, h1));
    assert!(sim.bonds().is_bonded(o, h2));
    let elements = sim.elements();
    let (oxygen, hydrogen) = (elements.element(sim.entities().element[o]), elements.element(h));
    let geometry = &sim.config().geometry;
    let target = vsepr::ideal_angle(geometry, oxygen, 2, hydrogen, hydrogen).to_degrees();
    let tolerance = geometry.angle_tolerance.to_degrees() + 1.5;

    let p = &sim.entities().position;
    let angle = (p[h1] - p[o]).angle(&(p[h2] - p[o])).to_degrees();
    assert!(
        (angle - target).abs() < tolerance,
        "H-O-H angle settled at {angle:.1}°, target {target:.1}°"
    );
}

#[test]
fn bonding_is_reproducible_for_a_seed_without_contention() {
    let build = |seed| {
        let mut config = still_config();
        config.seed = seed;
        config.bonding.base_probability = 0.5;
        let mut sim = Simulation::new(config, Arc::new(ElementTable::builtin())).unwrap();
        for row in 0..8 {
            for col in 0..8 {
                let origin = Vector3::new(300.0 + col as f32 * 300.0, 300.0 + row as f32 * 300.0, 0.0);
                sim.spawn_symbol("C", origin).unwrap();
                sim.spawn_symbol("N", origin + Vector3::new(60.0, 0.0, 0.0)).unwrap();
            }
        }
        sim.step();
        bond_set(&sim)
    };
    assert_eq!(build(11), build(11));
}

#[test]
fn unbreakable_atoms_survive_being_torn_apart() {
    let mut config = still_config();
    config.bonding.base_probability = 1.0;
    let mut sim = Simulation::new(config, Arc::new(ElementTable::builtin())).unwrap();
    let a = sim.spawn_symbol("O", Vector3::new(1000.0, 1000.0, 0.0)).unwrap();
    let b = sim.spawn_symbol("H", Vector3::new(1080.0, 1000.0, 0.0)).unwrap();
    sim.step();
    assert!(sim.bonds().is_bonded(a, b));
    sim.set_breakable(a, false).unwrap();

    sim.update_config(|c| {
        c.bonding.rest_length = 20.0;
        c.bonding.break_distance = 50.0;
    })
    .unwrap();
    sim.step();

    assert!(sim.bonds().is_bonded(a, b));

    sim.set_breakable(a, true).unwrap();
    sim.step();
    assert!(!sim.bonds().is_bonded(a, b));
    assert_eq!(sim.counters().bonds_broken_distance, 1);
}
