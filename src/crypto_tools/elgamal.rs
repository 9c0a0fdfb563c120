//! Exponential ElGamal cryptosystem.
//!
//! "A secure and optimally efficient multi-authority election scheme",
//! Cramer, Gennaro, Schoenmakers, 1997. Messages ride in the exponent, so
//! the scheme is additively homomorphic but decryption needs a discrete
//! log: a precomputed table of `gq^i mod p` covers two windows around 0
//! and around `q`, the signed message space, with an unused gap in the
//! middle. The zero test `y x^-s mod p = 1` needs no table, as observed in
//! "An Efficient and Verifiable Solution to the Millionaire Problem",
//! Peng, Boyd, Dawson, Lee, 2005.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::Zeroize;

use crate::{
    crypto_tools::{
        bigint::BigInt,
        ciphertext::ElGamalCiphertext,
        provider::CryptoProvider,
        randomizer_cache::RandomizerCache,
        rng,
    },
    sdk::{
        api::{DuetError, DuetResult},
        config::ElGamalConfig,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElGamalPublicKey {
    /// prime modulus, `p = 2 m n q + 1`
    pub p: BigInt,
    /// large prime factor of `p - 1`; the plaintext space is `Z_q`
    pub q: BigInt,
    /// element of order `q` in `Z_p*`
    pub gq: BigInt,
    /// `h = gq^s mod p`
    pub h: BigInt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElGamalPrivateKey {
    pub s: BigInt,
}

impl Zeroize for ElGamalPrivateKey {
    fn zeroize(&mut self) {
        self.s = BigInt::zero();
    }
}

impl Drop for ElGamalPrivateKey {
    fn drop(&mut self) {
        self.zeroize()
    }
}

/// The pair `(gq^r mod p, h^r mod p)` folded into a deterministic
/// encryption to re-randomize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElGamalRandomizer {
    pub x: BigInt,
    pub y: BigInt,
}

#[derive(Debug)]
struct DecryptionContext {
    s: BigInt,
    /// `(gq^i mod p) -> i` over the two signed windows; only built on request
    decryption_map: Option<HashMap<BigInt, BigInt>>,
}

pub struct ElGamal {
    public_key: ElGamalPublicKey,
    decryption: Option<DecryptionContext>,
    modulus: Arc<BigInt>,
    /// `2^message_space_threshold_bits`, the positive/negative boundary
    message_space_threshold: BigInt,
    randomizers: Mutex<RandomizerCache<ElGamalRandomizer>>,
    encrypted_zero: ElGamalCiphertext,
    encrypted_one: ElGamalCiphertext,
}

impl ElGamal {
    /// `p = 2 m n q + 1` for small primes `m`, `n` and a large prime `q`;
    /// `gq = g^(2 m n) mod p` for a generator `g` of `Z_p*` (Menezes,
    /// Algorithm 4.80); `s` random in `[1, q)`; `h = gq^s mod p`.
    pub fn generate_keys(
        config: &ElGamalConfig,
    ) -> DuetResult<(ElGamalPublicKey, ElGamalPrivateKey)> {
        config.validate()?;
        let rounds = config.miller_rabin_rounds;

        let size_r = config.key_bits - config.large_prime_bits;
        let size_mn = (size_r - 1) / 2;

        let (p, q, m, n) = loop {
            let q = rng::prime_exact(config.large_prime_bits, rounds)?;
            let m = rng::prime_exact(size_mn, rounds)?;
            let n = rng::prime_exact(size_mn, rounds)?;
            let r = &m * &n * BigInt::two();
            let p = &q * &r + BigInt::one();
            if p.is_prime(rounds) {
                break (p, q, m, n);
            }
        };

        // generator of Z_p*: survives every maximal-subgroup test
        let exclusions = [
            &q * &m * &n,
            &q * &m * BigInt::two(),
            &q * &n * BigInt::two(),
            &m * &n * BigInt::two(),
        ];
        let g = 'candidate: loop {
            let candidate = rng::uniform_below(&p);
            if !candidate.gcd(&p).is_one() {
                continue;
            }
            for exclusion in &exclusions {
                if candidate.modpow(exclusion, &p)?.is_one() {
                    continue 'candidate;
                }
            }
            break candidate;
        };

        let r = &m * &n * BigInt::two();
        let gq = g.modpow(&r, &p)?;

        let s = loop {
            let s = rng::uniform_below(&q);
            if !s.is_zero() {
                break s;
            }
        };
        let h = gq.modpow(&s, &p)?;

        Ok((ElGamalPublicKey { p, q, gq, h }, ElGamalPrivateKey { s }))
    }

    pub fn from_keypair(
        public_key: ElGamalPublicKey,
        private_key: ElGamalPrivateKey,
        config: &ElGamalConfig,
    ) -> DuetResult<Self> {
        config.validate()?;
        let decryption_map = if config.precompute_decryption_map {
            Some(build_decryption_map(
                &public_key,
                config.message_space_threshold_bits,
            )?)
        } else {
            None
        };
        let decryption = DecryptionContext {
            s: private_key.s.clone(),
            decryption_map,
        };
        Self::build(public_key, Some(decryption), config)
    }

    pub fn from_public_key(public_key: ElGamalPublicKey, config: &ElGamalConfig) -> DuetResult<Self> {
        config.validate()?;
        Self::build(public_key, None, config)
    }

    fn build(
        public_key: ElGamalPublicKey,
        decryption: Option<DecryptionContext>,
        config: &ElGamalConfig,
    ) -> DuetResult<Self> {
        let modulus = Arc::new(public_key.p.clone());
        let message_space_threshold = BigInt::one() << config.message_space_threshold_bits;

        let mut randomizers = RandomizerCache::new(config.randomizer_cache_capacity, || {
            let r = rng::uniform_below(&public_key.q);
            Ok(ElGamalRandomizer {
                x: public_key.gq.modpow(&r, &public_key.p)?,
                y: public_key.h.modpow(&r, &public_key.p)?,
            })
        })?;

        let encrypted_zero = {
            let c = nonrandom(&BigInt::zero(), &public_key, &modulus)?;
            let randomizer = randomizers.pop();
            c.randomized_with(&randomizer.x, &randomizer.y)?
        };
        let encrypted_one = {
            let c = nonrandom(&BigInt::one(), &public_key, &modulus)?;
            let randomizer = randomizers.pop();
            c.randomized_with(&randomizer.x, &randomizer.y)?
        };

        Ok(Self {
            public_key,
            decryption,
            modulus,
            message_space_threshold,
            randomizers: Mutex::new(randomizers),
            encrypted_zero,
            encrypted_one,
        })
    }

    pub fn public_key(&self) -> &ElGamalPublicKey {
        &self.public_key
    }

    pub fn has_private_key(&self) -> bool {
        self.decryption.is_some()
    }

    /// Fast zero test: `m = 0` iff `y x^-s mod p = 1`. No table lookup.
    pub fn is_encrypted_zero(&self, ciphertext: &ElGamalCiphertext) -> DuetResult<bool> {
        Ok(self.shared_secret_quotient(ciphertext)?.is_one())
    }

    /// `y x^-s mod p`, which equals `gq^m mod p`.
    fn shared_secret_quotient(&self, ciphertext: &ElGamalCiphertext) -> DuetResult<BigInt> {
        let context = self
            .decryption
            .as_ref()
            .ok_or(DuetError::SecretKeyRequired)?;
        let x_pow_minus_s = ciphertext
            .x()
            .modpow(&-&context.s, &self.public_key.p)?;
        Ok((ciphertext.y() * &x_pow_minus_s) % &self.public_key.p)
    }

    fn pop_randomizer(&self) -> ElGamalRandomizer {
        self.randomizers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }
}

fn build_decryption_map(
    public_key: &ElGamalPublicKey,
    threshold_bits: usize,
) -> DuetResult<HashMap<BigInt, BigInt>> {
    let threshold = BigInt::one() << threshold_bits;
    let entries = threshold.to_usize().ok_or_else(|| {
        error!("elgamal message-space window too large for a decryption map");
        DuetError::InvalidParameter("message-space window too large".to_string())
    })?;

    let mut map = HashMap::with_capacity(2 * entries);

    // positive window [0, 2^t)
    let mut accumulator = BigInt::one();
    let mut i = BigInt::zero();
    while i < threshold {
        map.insert(accumulator.clone(), i.clone());
        accumulator = (&accumulator * &public_key.gq) % &public_key.p;
        i = i + BigInt::one();
    }

    // negative window (q - 2^t, q); one entry fewer because
    // size(positives \ {0}) = size(negatives)
    let mut i = &public_key.q - &threshold + BigInt::one();
    let mut accumulator = public_key.gq.modpow(&i, &public_key.p)?;
    while i < public_key.q {
        map.insert(accumulator.clone(), i.clone());
        accumulator = (&accumulator * &public_key.gq) % &public_key.p;
        i = i + BigInt::one();
    }

    Ok(map)
}

/// `(x, y) = (1, gq^m mod p)`; re-randomization later replaces `x` with
/// `gq^r` and scales `y` by `h^r`.
fn nonrandom(
    plaintext: &BigInt,
    public_key: &ElGamalPublicKey,
    modulus: &Arc<BigInt>,
) -> DuetResult<ElGamalCiphertext> {
    let m = if plaintext.is_negative() {
        &public_key.q + plaintext
    } else {
        plaintext.clone()
    };
    Ok(ElGamalCiphertext::new(
        BigInt::one(),
        public_key.gq.modpow(&m, &public_key.p)?,
        modulus.clone(),
    ))
}

impl CryptoProvider for ElGamal {
    type Ciphertext = ElGamalCiphertext;

    fn encrypt_nonrandom(&self, plaintext: &BigInt) -> DuetResult<ElGamalCiphertext> {
        nonrandom(plaintext, &self.public_key, &self.modulus)
    }

    fn randomize(&self, ciphertext: &ElGamalCiphertext) -> DuetResult<ElGamalCiphertext> {
        let randomizer = self.pop_randomizer();
        ciphertext.randomized_with(&randomizer.x, &randomizer.y)
    }

    fn decrypt(&self, ciphertext: &ElGamalCiphertext) -> DuetResult<BigInt> {
        let quotient = self.shared_secret_quotient(ciphertext)?;
        if quotient.is_one() {
            return Ok(BigInt::zero());
        }

        let context = self
            .decryption
            .as_ref()
            .ok_or(DuetError::SecretKeyRequired)?;
        let map = context.decryption_map.as_ref().ok_or_else(|| {
            error!("elgamal decryption requires the precomputed decryption map");
            DuetError::InvalidParameter(
                "decryption requires the precomputed decryption map".to_string(),
            )
        })?;

        let output = map.get(&quotient).cloned().ok_or(DuetError::Undecodable)?;
        Ok(self.group_to_signed(output))
    }

    fn add(&self, lhs: &ElGamalCiphertext, rhs: &ElGamalCiphertext) -> DuetResult<ElGamalCiphertext> {
        lhs.homomorphic_add(rhs)
    }

    fn neg(&self, ciphertext: &ElGamalCiphertext) -> DuetResult<ElGamalCiphertext> {
        ciphertext.homomorphic_neg()
    }

    fn mul_plain(&self, lhs: &ElGamalCiphertext, rhs: &BigInt) -> DuetResult<ElGamalCiphertext> {
        lhs.homomorphic_mul_plain(rhs)
    }

    fn message_space_upper(&self) -> &BigInt {
        &self.public_key.q
    }

    /// The signed message space splits into the windows `[0, 2^t)` and
    /// `(q - 2^t, q)`; the threshold is the boundary.
    fn pos_neg_boundary(&self) -> &BigInt {
        &self.message_space_threshold
    }

    fn message_space_bits(&self) -> usize {
        self.public_key.q.bits()
    }

    fn encryption_modulus(&self) -> &BigInt {
        &self.modulus
    }

    fn encrypted_zero(&self, randomized: bool) -> DuetResult<ElGamalCiphertext> {
        if randomized {
            self.randomize(&self.encrypted_zero)
        } else {
            Ok(self.encrypted_zero.clone())
        }
    }

    fn encrypted_one(&self, randomized: bool) -> DuetResult<ElGamalCiphertext> {
        if randomized {
            self.randomize(&self.encrypted_one)
        } else {
            Ok(self.encrypted_one.clone())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config(precompute_decryption_map: bool) -> ElGamalConfig {
        ElGamalConfig {
            key_bits: 192,
            large_prime_bits: 64,
            message_space_threshold_bits: 8,
            precompute_decryption_map,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        }
    }

    pub(crate) fn test_instances() -> (ElGamal, ElGamal) {
        let config = test_config(true);
        let (public_key, private_key) = ElGamal::generate_keys(&config).unwrap();
        let keyed = ElGamal::from_keypair(public_key.clone(), private_key, &config).unwrap();
        let keyless = ElGamal::from_public_key(public_key, &config).unwrap();
        (keyed, keyless)
    }

    #[test]
    fn round_trip_inside_the_windows() {
        let (keyed, _) = test_instances();
        for m in [0i64, 1, 127, -1, -127] {
            let m = BigInt::from(m);
            assert_eq!(keyed.decrypt(&keyed.encrypt(&m).unwrap()).unwrap(), m);
        }
    }

    #[test]
    fn window_edges() {
        let (keyed, _) = test_instances();
        let boundary = keyed.pos_neg_boundary().clone();
        let below = &boundary - BigInt::one();
        assert_eq!(
            keyed.decrypt(&keyed.encrypt(&below).unwrap()).unwrap(),
            below
        );
        let negative_edge = -(&boundary - BigInt::one());
        assert_eq!(
            keyed
                .decrypt(&keyed.encrypt(&negative_edge).unwrap())
                .unwrap(),
            negative_edge
        );
        // the gap between the windows is undecodable
        let in_gap = &boundary + BigInt::one();
        assert_eq!(
            keyed.decrypt(&keyed.encrypt(&in_gap).unwrap()),
            Err(DuetError::Undecodable)
        );
    }

    #[test]
    fn zero_test_without_decryption_map() {
        let config = test_config(false);
        let (public_key, private_key) = ElGamal::generate_keys(&config).unwrap();
        let keyed = ElGamal::from_keypair(public_key, private_key, &config).unwrap();

        assert!(keyed
            .is_encrypted_zero(&keyed.encrypted_zero(true).unwrap())
            .unwrap());
        assert!(!keyed
            .is_encrypted_zero(&keyed.encrypted_one(true).unwrap())
            .unwrap());
        assert!(matches!(
            keyed.decrypt(&keyed.encrypted_one(true).unwrap()),
            Err(DuetError::InvalidParameter(_))
        ));
    }

    #[test]
    fn homomorphic_operations_are_componentwise() {
        let (keyed, _) = test_instances();
        let enc_x = keyed.encrypt(&BigInt::from(2)).unwrap();
        let enc_y = keyed.encrypt(&BigInt::from(-1)).unwrap();

        assert_eq!(
            keyed.decrypt(&keyed.add(&enc_x, &enc_y).unwrap()).unwrap(),
            BigInt::one()
        );
        assert_eq!(
            keyed.decrypt(&keyed.neg(&enc_x).unwrap()).unwrap(),
            BigInt::from(-2)
        );
        assert_eq!(
            keyed.decrypt(&keyed.sub(&enc_x, &enc_y).unwrap()).unwrap(),
            BigInt::from(3)
        );
        assert_eq!(
            keyed
                .decrypt(&keyed.mul_plain(&enc_x, &BigInt::from(-1)).unwrap())
                .unwrap(),
            BigInt::from(-2)
        );
    }

    #[test]
    fn rerandomization_preserves_plaintext() {
        let (keyed, keyless) = test_instances();
        let c = keyless.encrypt(&BigInt::from(42)).unwrap();
        let r = keyless.randomize(&c).unwrap();
        assert!(c.x() != r.x() || c.y() != r.y());
        assert_eq!(keyed.decrypt(&r).unwrap(), BigInt::from(42));
    }
}
