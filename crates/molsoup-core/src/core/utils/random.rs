use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Independent random streams per tick pass, so parallel kernels never share a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Predict = 1,
    Bonding = 2,
    ThermalBreak = 3,
    Brownian = 4,
    Evolution = 5,
    Spawn = 6,
    Shake = 7,
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Deterministic generator for one entity in one pass of one tick.
pub fn entity_rng(seed: u64, tick: u64, index: usize, stream: Stream) -> SmallRng {
    let mixed = splitmix64(seed ^ splitmix64(tick ^ splitmix64(index as u64 ^ ((stream as u64) << 56))));
    SmallRng::seed_from_u64(mixed)
}
