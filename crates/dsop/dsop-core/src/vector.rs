use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// A dense vector of doubles; plain `Vec<f64>` is enough here since, unlike
/// `Matrix`, nothing needs the extra dimension bookkeeping.
pub type Vector = Vec<f64>;

/// Deterministically generate `len` doubles in `[low, high)` from `seed`.
///
/// The harness seeds this per-rank so that every process's input is
/// reproducible given the same `(seed, rank)` pair without any
/// communication. The bit stream is not expected to be portable across
/// RNG implementations, only the determinism contract: same seed, same
/// vector.
pub fn generate_vector(seed: u64, len: usize, low: f64, high: f64) -> Vector {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Uniform::new(low, high);
    (0..len).map(|_| rng.sample(dist)).collect()
}

/// Convenience for tests: seed derived from `(base_seed, rank)` so every
/// rank gets an independent, reproducible stream from one base seed.
pub fn seed_for_rank(base_seed: u64, rank: i32) -> u64 {
    base_seed.wrapping_add(rank as u64).wrapping_mul(0x9E3779B97F4A7C15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_vector() {
        let a = generate_vector(42, 8, -1.0, 1.0);
        let b = generate_vector(42, 8, -1.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn different_ranks_diverge() {
        let a = generate_vector(seed_for_rank(1, 0), 8, -1.0, 1.0);
        let b = generate_vector(seed_for_rank(1, 1), 8, -1.0, 1.0);
        assert_ne!(a, b);
    }

    #[test]
    fn values_stay_in_range() {
        let v = generate_vector(7, 200, -3.0, 5.0);
        assert!(v.iter().all(|&x| x >= -3.0 && x < 5.0));
    }
}
