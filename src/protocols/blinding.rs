//! Precomputed blinding-factor tuples.
//!
//! Each interactive protocol owns a pool of tuples drawn from the same
//! fixed-capacity ring as the cryptosystems' randomizer caches: every pop
//! returns a distinct fresh tuple until the capacity wraps around. The
//! blinding parameters are sized so a blinded value hides its plaintext up
//! to `2^-kappa`.

use crate::{
    crypto_tools::{
        bigint::BigInt,
        ciphertext::Ciphertext,
        dgk::Dgk,
        paillier::Paillier,
        provider::CryptoProvider,
        randomizer_cache::RandomizerCache,
        rng,
    },
    sdk::api::DuetResult,
};

/// Per-protocol pools reuse the randomizer ring wholesale.
pub type BlindingFactorCache<T> = RandomizerCache<T>;

fn nonzero_bits(bits: usize) -> BigInt {
    loop {
        let r = rng::uniform_bits(bits);
        if !r.is_zero() {
            return r;
        }
    }
}

/// `(r, [r])`, enough to blind a value before handing it to the key
/// holder for decryption.
#[derive(Debug, Clone)]
pub struct DecryptionBlindingFactor<C> {
    pub r: BigInt,
    pub encrypted_r: C,
}

impl<C: Clone> DecryptionBlindingFactor<C> {
    pub fn generate<P: CryptoProvider<Ciphertext = C>>(
        provider: &P,
        operand_bits: usize,
        kappa: usize,
    ) -> DuetResult<Self> {
        let r = rng::uniform_bits(operand_bits + kappa);
        Ok(Self {
            encrypted_r: provider.encrypt(&r)?,
            r,
        })
    }
}

/// `(r1, r2, [-r1], [-r2], [-r1 r2])` for one secure multiplication.
#[derive(Debug, Clone)]
pub struct MultiplicationBlindingFactor<C> {
    pub r1: BigInt,
    pub r2: BigInt,
    pub encrypted_minus_r1: C,
    pub encrypted_minus_r2: C,
    pub encrypted_minus_r1_r2: C,
}

impl<C: Clone> MultiplicationBlindingFactor<C> {
    /// `r1`, `r2` are non-zero with `operand_bits + kappa` bits; non-zero
    /// because they also serve as plaintext factors in the unblinding.
    pub fn generate<P: CryptoProvider<Ciphertext = C>>(
        provider: &P,
        operand_bits: usize,
        kappa: usize,
    ) -> DuetResult<Self> {
        let r1 = nonzero_bits(operand_bits + kappa);
        let r2 = nonzero_bits(operand_bits + kappa);
        Ok(Self {
            encrypted_minus_r1: provider.encrypt(&-&r1)?,
            encrypted_minus_r2: provider.encrypt(&-&r2)?,
            encrypted_minus_r1_r2: provider.encrypt(&-(&r1 * &r2))?,
            r1,
            r2,
        })
    }
}

/// `(r, [r], [r mod 2^l], bits of r mod 2^l)` for one outer comparison.
#[derive(Debug, Clone)]
pub struct ComparisonBlindingFactor {
    pub r: BigInt,
    pub encrypted_r: Ciphertext,
    pub encrypted_r_mod_two_pow_l: Ciphertext,
    /// little-endian bits of `r mod 2^l`
    pub hat_r_bits: Vec<bool>,
}

impl ComparisonBlindingFactor {
    /// `r` stays `kappa + 2` bits below the modulus so the blinded sum
    /// never crosses the positive/negative boundary.
    pub fn generate(paillier: &Paillier, l: usize, kappa: usize) -> DuetResult<Self> {
        let r = rng::uniform_bits(paillier.message_space_bits() - kappa - 2);
        let hat_r = &r % &(BigInt::one() << l);
        let mut hat_r_bits = Vec::with_capacity(l);
        for i in 0..l {
            hat_r_bits.push(hat_r.bit(i)?);
        }
        Ok(Self {
            encrypted_r: paillier.encrypt(&r)?,
            encrypted_r_mod_two_pow_l: paillier.encrypt(&hat_r)?,
            r,
            hat_r_bits,
        })
    }
}

/// Per-bit masking material for the DGK subprotocol: non-zero multipliers
/// for the active positions and encrypted non-zero fillers for the
/// inactive ones.
#[derive(Debug, Clone)]
pub struct DgkComparisonBlindingFactor {
    pub multipliers: Vec<BigInt>,
    pub encrypted_fillers: Vec<Ciphertext>,
}

impl DgkComparisonBlindingFactor {
    pub fn generate(dgk: &Dgk, count: usize) -> DuetResult<Self> {
        let u_minus_one = dgk.message_space_upper() - BigInt::one();
        let mut multipliers = Vec::with_capacity(count);
        let mut encrypted_fillers = Vec::with_capacity(count);
        for _ in 0..count {
            // non-zero scalars modulo the prime u keep "is zero" intact
            multipliers.push(rng::uniform_below(&u_minus_one) + BigInt::one());
            let filler = rng::uniform_below(&u_minus_one) + BigInt::one();
            encrypted_fillers.push(dgk.encrypt(&filler)?);
        }
        Ok(Self {
            multipliers,
            encrypted_fillers,
        })
    }
}

/// Full-width blinder for one packed comparison, together with its
/// per-bucket shares.
#[derive(Debug, Clone)]
pub struct PackedComparisonBlindingFactor {
    pub r: BigInt,
    pub encrypted_r: Ciphertext,
    /// `(r >> (i W)) mod 2^W` for each bucket `i`
    pub bucket_shares: Vec<BigInt>,
}

impl PackedComparisonBlindingFactor {
    pub fn generate(
        paillier: &Paillier,
        bucket_bits: usize,
        bucket_count: usize,
        kappa: usize,
    ) -> DuetResult<Self> {
        let r = rng::uniform_bits(bucket_bits * bucket_count + kappa);
        let bucket_space = BigInt::one() << bucket_bits;
        let bucket_shares = (0..bucket_count)
            .map(|i| (&r >> (i * bucket_bits)) % &bucket_space)
            .collect();
        Ok(Self {
            encrypted_r: paillier.encrypt(&r)?,
            r,
            bucket_shares,
        })
    }
}
