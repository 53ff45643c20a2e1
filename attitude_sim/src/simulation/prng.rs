// attitude_sim/src/simulation/prng.rs

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// The central, deterministic pseudo-random number generator for a run.
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    /// Seeds from `seed`, or from entropy when none is given. Returns the seed
    /// actually used so the run can be reproduced.
    pub fn seeded(seed: Option<u64>) -> (Self, u64) {
        let seed = seed.unwrap_or_else(rand::random);
        (Self(ChaCha8Rng::seed_from_u64(seed)), seed)
    }
}
