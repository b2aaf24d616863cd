use molsoup::engine::config::SimulationConfig;
use molsoup::workflows::run::RunOptions;
use std::path::PathBuf;

pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub run: RunOptions,
    pub atoms: usize,
    pub elements_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}
