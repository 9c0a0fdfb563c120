//! Process-wide CSPRNG.
//!
//! A ChaCha20 generator seeded once from the platform entropy source at
//! first use. Seeding is never time-based. Callers must assume the
//! generator state is mutated by every call.

use std::sync::{Mutex, OnceLock};

use hmac::{Mac, SimpleHmac};
use num_bigint::{BigInt as Inner, RandBigInt};
use rand::{Rng as _, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;
use tracing::error;

use crate::{
    constants::RNG_TAG,
    crypto_tools::bigint::BigInt,
    sdk::api::{DuetError, DuetResult},
};

const SEED_LENGTH_MIN: usize = 4;
const SEED_LENGTH_MAX: usize = 256;

static GLOBAL_RNG: OnceLock<Mutex<ChaCha20Rng>> = OnceLock::new();

fn global() -> &'static Mutex<ChaCha20Rng> {
    GLOBAL_RNG.get_or_init(|| Mutex::new(ChaCha20Rng::from_entropy()))
}

fn with_rng<T>(f: impl FnOnce(&mut ChaCha20Rng) -> T) -> T {
    let mut guard = global()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Uniform in `[0, 2^bits)`.
pub fn uniform_bits(bits: usize) -> BigInt {
    with_rng(|rng| BigInt::from_inner(Inner::from(rng.gen_biguint(bits as u64))))
}

/// Uniform in `[0, bound)`. `bound` must be positive.
pub fn uniform_below(bound: &BigInt) -> BigInt {
    with_rng(|rng| BigInt::from_inner(rng.gen_bigint_range(&Inner::from(0u8), bound.inner())))
}

/// Uniform in `[0, bound)` for machine-sized bounds. `bound` must be
/// positive.
pub fn uniform_usize_below(bound: usize) -> usize {
    with_rng(|rng| rng.gen_range(0..bound))
}

/// A fair coin.
pub fn coin() -> bool {
    with_rng(|rng| rng.gen())
}

/// A probable prime with exactly `bits` bits: sample `bits - 1` random bits,
/// force the top bit, retry until the Miller-Rabin test passes.
pub fn prime_exact(bits: usize, miller_rabin_rounds: usize) -> DuetResult<BigInt> {
    if bits < 2 {
        error!("cannot generate a prime of {} bits", bits);
        return Err(DuetError::InvalidParameter(
            "prime bit length must be at least 2".to_string(),
        ));
    }
    loop {
        let mut candidate = uniform_bits(bits - 1);
        candidate.set_bit(bits - 1)?;
        if candidate.is_prime(miller_rabin_rounds) {
            return Ok(candidate);
        }
    }
}

/// Reseed the generator by hashing the arguments, for reproducible test
/// runs. Homomorphic results are only bit-exact across runs after calling
/// this with identical inputs.
pub fn reseed_deterministic(tag: u8, seed: &[u8]) -> DuetResult<()> {
    if seed.len() < SEED_LENGTH_MIN || seed.len() > SEED_LENGTH_MAX {
        error!(
            "invalid seed length {} not in [{},{}]",
            seed.len(),
            SEED_LENGTH_MIN,
            SEED_LENGTH_MAX
        );
        return Err(DuetError::InvalidParameter(
            "invalid deterministic seed length".to_string(),
        ));
    }

    let mut prf = SimpleHmac::<Sha256>::new_from_slice(seed).map_err(|_| {
        error!("failure to initialize hmac");
        DuetError::InvalidParameter("failure to initialize hmac".to_string())
    })?;

    prf.update(&RNG_TAG.to_be_bytes());
    prf.update(&tag.to_be_bytes());

    let digest = prf.finalize().into_bytes().into();

    let mut guard = global()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = ChaCha20Rng::from_seed(digest);

    Ok(())
}
