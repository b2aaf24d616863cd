pub struct DefaultsConfig {
    pub ticks: u64,
    pub atoms: usize,
    pub snapshot_interval: u64,
    pub sample_interval: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            ticks: 2000,
            atoms: 800,
            snapshot_interval: 60,
            sample_interval: 100,
        }
    }
}
