// Copyright (c) 2018-2022 The MobileCoin Foundation

//! Deterministic randomness for tests.

#[macro_use]
extern crate lazy_static;

pub use rand::{seq::SliceRandom, CryptoRng, Rng, RngCore, SeedableRng};

const NUM_TRIALS: usize = 3;

use rand_hc::Hc128Rng;
pub type RngType = Hc128Rng;
type Seed = <RngType as SeedableRng>::Seed;

// Helper for running a unit test that requires randomness, but doing it
// seeded and deterministically
pub fn run_with_several_seeds<F: FnMut(RngType)>(mut f: F) {
    for seed in *SEEDS {
        f(RngType::from_seed(seed));
    }
}

pub fn run_with_one_seed<F: FnOnce(RngType)>(f: F) {
    f(get_seeded_rng());
}

lazy_static! {
    static ref SEEDS: [Seed; NUM_TRIALS] = get_seeds();
}

fn get_seeds() -> [Seed; NUM_TRIALS] {
    let mut rng = get_seeded_rng();

    let mut result = [[0u8; 32]; NUM_TRIALS];
    for val in &mut result {
        rng.fill_bytes(&mut *val)
    }
    result
}

pub fn get_seeded_rng() -> RngType {
    RngType::from_seed([7u8; 32])
}

/// `num_bytes` random bytes. Zero bytes are as likely as any other value, so
/// callers exercising length handling get embedded NULs for free.
pub fn random_bytes_vec(num_bytes: usize, csprng: &mut (impl CryptoRng + RngCore)) -> Vec<u8> {
    let mut result = vec![0u8; num_bytes];
    csprng.fill_bytes(&mut result);
    result
}

/// Random bytes with at least one zero byte in the middle, for length
/// handling tests that must not stop at the first NUL.
pub fn random_bytes_with_nul(num_bytes: usize, csprng: &mut (impl CryptoRng + RngCore)) -> Vec<u8> {
    let mut result = random_bytes_vec(num_bytes, csprng);
    if num_bytes > 2 {
        let at = csprng.gen_range(1..num_bytes - 1);
        result[at] = 0;
    }
    result
}

pub fn random_str(len: usize, csprng: &mut (impl CryptoRng + RngCore)) -> String {
    use rand::distributions::Alphanumeric;
    csprng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_deterministic() {
        let mut first = Vec::new();
        run_with_several_seeds(|mut rng| first.push(rng.next_u64()));
        let mut second = Vec::new();
        run_with_several_seeds(|mut rng| second.push(rng.next_u64()));
        assert_eq!(first.len(), NUM_TRIALS);
        assert_eq!(first, second);
    }

    #[test]
    fn random_bytes_has_requested_length() {
        run_with_one_seed(|mut rng| {
            assert_eq!(random_bytes_vec(33, &mut rng).len(), 33);
            let with_nul = random_bytes_with_nul(64, &mut rng);
            assert_eq!(with_nul.len(), 64);
            assert!(with_nul[1..63].contains(&0));
        });
    }
}
