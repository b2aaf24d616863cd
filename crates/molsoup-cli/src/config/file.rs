use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileWorldConfig {
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub cell_size: Option<f32>,
    pub max_per_cell: Option<usize>,
    pub depth_limit: Option<f32>,
    pub max_entities: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePhysicsConfig {
    pub gravity: Option<f32>,
    pub gravity_scale: Option<f32>,
    pub friction: Option<f32>,
    pub temperature: Option<f32>,
    pub thermal_impulse_scale: Option<f32>,
    pub max_speed: Option<f32>,
    pub velocity_retention: Option<f32>,
    pub solver_iterations: Option<usize>,
    pub collision_stiffness: Option<f32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBondingConfig {
    pub range_min: Option<f32>,
    pub range_max: Option<f32>,
    pub base_probability: Option<f32>,
    pub rest_length: Option<f32>,
    pub spring_k: Option<f32>,
    pub damping: Option<f32>,
    pub max_force: Option<f32>,
    pub break_distance: Option<f32>,
    pub saturation_threshold: Option<u32>,
    pub thermal_break_rate: Option<f32>,
    pub ring_closure: Option<bool>,
    pub medium_polarity: Option<f32>,
    pub hydrophobic_electronegativity: Option<f32>,
    pub hydrophobic_boost: Option<f32>,
    pub clay_catalysis: Option<bool>,
    pub catalysis_boost: Option<f32>,
    pub catalysis_cap: Option<f32>,
    pub catalysis_brake: Option<f32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileGeometryConfig {
    pub vsepr: Option<bool>,
    pub angular_stiffness: Option<f32>,
    pub max_angular_impulse: Option<f32>,
    pub angular_factor: Option<f32>,
    pub angular_damping: Option<f32>,
    pub angle_tolerance_degrees: Option<f32>,
    pub depth_target: Option<f32>,
    pub dihedral: Option<bool>,
    pub dihedral_k: Option<f32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileEffectsConfig {
    pub brownian: Option<bool>,
    pub brownian_k: Option<f32>,
    pub coulomb: Option<bool>,
    pub coulomb_k: Option<f32>,
    pub charge_factor: Option<f32>,
    pub depth_relaxation: Option<f32>,
    pub mutation_probability: Option<f64>,
    pub tunnel_probability: Option<f64>,
    pub tunnel_distance: Option<f32>,
    pub pulse_radius: Option<f32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePropagationConfig {
    pub relabel_interval: Option<u64>,
    pub iterations_per_tick: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRunConfig {
    pub ticks: Option<u64>,
    pub atoms: Option<usize>,
    pub seed: Option<u64>,
    pub snapshot_interval: Option<u64>,
    pub sample_interval: Option<u64>,
    /// `[x0, y0, x1, y1]`
    pub roi: Option<[f32; 4]>,
    pub elements: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub world: Option<FileWorldConfig>,
    pub physics: Option<FilePhysicsConfig>,
    pub bonding: Option<FileBondingConfig>,
    pub geometry: Option<FileGeometryConfig>,
    pub effects: Option<FileEffectsConfig>,
    pub propagation: Option<FilePropagationConfig>,
    pub run: Option<FileRunConfig>,
}

/// Reads a config file as a raw table so that `--set` overrides can be layered on
/// before the typed sections are checked.
pub fn read_table(path: &Path) -> Result<toml::Table> {
    debug!("Loading configuration from file: {:?}", path);
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

impl FileConfig {
    pub fn from_table(table: toml::Table) -> Result<Self> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_kebab_case_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [world]
            width = 1600.0
            cell-size = 250.0

            [physics]
            temperature = 0.4

            [geometry]
            dihedral = false

            [run]
            ticks = 500
            roi = [0.0, 0.0, 800.0, 800.0]
            "#,
        )
        .unwrap();

        let config = FileConfig::from_table(read_table(&path).unwrap()).unwrap();

        let world = config.world.unwrap();
        assert_eq!(world.width, Some(1600.0));
        assert_eq!(world.cell_size, Some(250.0));
        assert_eq!(config.physics.unwrap().temperature, Some(0.4));
        assert_eq!(config.geometry.unwrap().dihedral, Some(false));
        let run = config.run.unwrap();
        assert_eq!(run.ticks, Some(500));
        assert_eq!(run.roi, Some([0.0, 0.0, 800.0, 800.0]));
        assert!(config.bonding.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let table: toml::Table = toml::from_str("[physics]\nwarp-speed = 9.0").unwrap();
        assert!(matches!(FileConfig::from_table(table), Err(CliError::Config(_))));
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[world\nwidth = ").unwrap();
        match read_table(&path) {
            Err(CliError::FileParsing { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected a parsing error, got {other:?}"),
        }
    }
}
