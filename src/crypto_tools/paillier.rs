//! Paillier cryptosystem.
//!
//! "Public-Key Cryptosystems Based on Composite Degree Residuosity
//! Classes", Paillier, 1999. Encryption uses the `g = n + 1` shortcut
//! `c = (1 + n m) r^n mod n^2`; decryption runs through the CRT.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use zeroize::Zeroize;

use crate::{
    crypto_tools::{
        bigint::BigInt,
        ciphertext::Ciphertext,
        provider::CryptoProvider,
        randomizer_cache::RandomizerCache,
        rng,
        utils::{member_of_mod, member_of_mul_group, CrtTerms},
    },
    sdk::{
        api::{DuetError, DuetResult},
        config::PaillierConfig,
    },
};

const KEYGEN_RETRY_BUDGET: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaillierPublicKey {
    pub n: BigInt,
    pub g: BigInt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaillierPrivateKey {
    pub p: BigInt,
    pub q: BigInt,
}

impl Zeroize for PaillierPrivateKey {
    fn zeroize(&mut self) {
        self.p = BigInt::zero();
        self.q = BigInt::zero();
    }
}

impl Drop for PaillierPrivateKey {
    fn drop(&mut self) {
        self.zeroize()
    }
}

/// Values precomputed from the private key to speed up CRT decryption.
#[derive(Debug)]
struct DecryptionContext {
    p: BigInt,
    q: BigInt,
    p_minus_one: BigInt,
    q_minus_one: BigInt,
    p_squared: BigInt,
    q_squared: BigInt,
    /// `L_p(g^(p-1) mod p^2)^-1 mod p`
    hp: BigInt,
    /// `L_q(g^(q-1) mod q^2)^-1 mod q`
    hq: BigInt,
    crt: CrtTerms,
}

pub struct Paillier {
    public_key: PaillierPublicKey,
    decryption: Option<DecryptionContext>,
    n_squared: Arc<BigInt>,
    positive_negative_boundary: BigInt,
    randomizers: Mutex<RandomizerCache<BigInt>>,
    encrypted_zero: Ciphertext,
    encrypted_one: Ciphertext,
}

impl Paillier {
    /// Generate independent primes `p != q` of half the key length and
    /// retry until `n = p q` has exactly the requested bit length.
    pub fn generate_keys(
        config: &PaillierConfig,
    ) -> DuetResult<(PaillierPublicKey, PaillierPrivateKey)> {
        config.validate()?;
        let prime_bits = config.key_bits / 2;

        for attempt in 0..KEYGEN_RETRY_BUDGET {
            let p = rng::prime_exact(prime_bits, config.miller_rabin_rounds)?;
            let mut q = rng::prime_exact(prime_bits, config.miller_rabin_rounds)?;
            while p == q {
                q = rng::prime_exact(prime_bits, config.miller_rabin_rounds)?;
            }

            let n = &p * &q;
            if n.bits() != config.key_bits {
                debug!("paillier keygen attempt {}: modulus too short", attempt);
                continue;
            }

            let g = &n + BigInt::one();
            return Ok((PaillierPublicKey { n, g }, PaillierPrivateKey { p, q }));
        }

        error!("paillier keygen retry budget exhausted");
        Err(DuetError::KeyGenerationFailed(
            "could not reach the requested modulus length".to_string(),
        ))
    }

    pub fn from_keypair(
        public_key: PaillierPublicKey,
        private_key: PaillierPrivateKey,
        config: &PaillierConfig,
    ) -> DuetResult<Self> {
        config.validate()?;
        let decryption = Self::decryption_context(&public_key, &private_key)?;
        Self::build(public_key, Some(decryption), config)
    }

    pub fn from_public_key(public_key: PaillierPublicKey, config: &PaillierConfig) -> DuetResult<Self> {
        config.validate()?;
        Self::build(public_key, None, config)
    }

    fn decryption_context(
        public_key: &PaillierPublicKey,
        private_key: &PaillierPrivateKey,
    ) -> DuetResult<DecryptionContext> {
        let p = private_key.p.clone();
        let q = private_key.q.clone();
        let p_minus_one = &p - BigInt::one();
        let q_minus_one = &q - BigInt::one();
        let p_squared = &p * &p;
        let q_squared = &q * &q;

        let hp = l_function(
            &public_key.g.modpow(&p_minus_one, &p_squared)?,
            &p,
        )
        .invert(&p)?;
        let hq = l_function(
            &public_key.g.modpow(&q_minus_one, &q_squared)?,
            &q,
        )
        .invert(&q)?;

        let crt = CrtTerms::new(&p, &q).map_err(|_| {
            error!("paillier primes are not coprime");
            DuetError::KeyGenerationFailed("p and q are not coprime".to_string())
        })?;

        Ok(DecryptionContext {
            p,
            q,
            p_minus_one,
            q_minus_one,
            p_squared,
            q_squared,
            hp,
            hq,
            crt,
        })
    }

    fn build(
        public_key: PaillierPublicKey,
        decryption: Option<DecryptionContext>,
        config: &PaillierConfig,
    ) -> DuetResult<Self> {
        let n_squared = Arc::new(&public_key.n * &public_key.n);
        let n_minus_one = &public_key.n - BigInt::one();
        let positive_negative_boundary = &public_key.n / BigInt::two();

        let mut randomizers = RandomizerCache::new(config.randomizer_cache_capacity, || {
            sample_randomizer(&public_key.n, &n_minus_one, &n_squared)
        })?;

        let encrypted_zero = nonrandom(&BigInt::zero(), &public_key, &n_squared)?
            .randomized_with(&randomizers.pop())?;
        let encrypted_one = nonrandom(&BigInt::one(), &public_key, &n_squared)?
            .randomized_with(&randomizers.pop())?;

        Ok(Self {
            public_key,
            decryption,
            n_squared,
            positive_negative_boundary,
            randomizers: Mutex::new(randomizers),
            encrypted_zero,
            encrypted_one,
        })
    }

    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.public_key
    }

    pub fn has_private_key(&self) -> bool {
        self.decryption.is_some()
    }

    /// Validate that `plaintext` is a valid input to the encryption.
    pub fn validate_plaintext(&self, plaintext: &BigInt) -> bool {
        member_of_mod(plaintext, &self.public_key.n)
    }

    /// Validate that `ciphertext` is a valid element of the ciphertext
    /// group.
    pub fn validate_ciphertext(&self, ciphertext: &Ciphertext) -> bool {
        member_of_mul_group(ciphertext.data(), &self.n_squared)
    }

    fn pop_randomizer(&self) -> BigInt {
        self.randomizers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }
}

/// `L(u) = (u - 1) / d`
fn l_function(input: &BigInt, d: &BigInt) -> BigInt {
    (input - BigInt::one()) / d
}

/// `r^n mod n^2` for random `r` in `[1, n)`.
fn sample_randomizer(n: &BigInt, n_minus_one: &BigInt, n_squared: &BigInt) -> DuetResult<BigInt> {
    let r = rng::uniform_below(n_minus_one) + BigInt::one();
    r.modpow(n, n_squared)
}

/// `c = (1 + n m) mod n^2` via the `g = n + 1` shortcut, or `g^m mod n^2`
/// for a general `g`.
fn nonrandom(
    plaintext: &BigInt,
    public_key: &PaillierPublicKey,
    n_squared: &Arc<BigInt>,
) -> DuetResult<Ciphertext> {
    let m = plaintext % &public_key.n;
    let data = if public_key.g == &public_key.n + BigInt::one() {
        (BigInt::one() + &public_key.n * &m) % n_squared.as_ref()
    } else {
        public_key.g.modpow(&m, n_squared)?
    };
    Ok(Ciphertext::new(data, n_squared.clone()))
}

impl CryptoProvider for Paillier {
    type Ciphertext = Ciphertext;

    fn encrypt_nonrandom(&self, plaintext: &BigInt) -> DuetResult<Ciphertext> {
        nonrandom(plaintext, &self.public_key, &self.n_squared)
    }

    fn randomize(&self, ciphertext: &Ciphertext) -> DuetResult<Ciphertext> {
        ciphertext.randomized_with(&self.pop_randomizer())
    }

    /// CRT decryption:
    /// `m_p = L_p(c^(p-1) mod p^2) h_p mod p`, `m_q` analogously, then
    /// recombine mod `n` and map back to the signed message space.
    fn decrypt(&self, ciphertext: &Ciphertext) -> DuetResult<BigInt> {
        let context = self
            .decryption
            .as_ref()
            .ok_or(DuetError::SecretKeyRequired)?;

        let mp = (l_function(
            &ciphertext
                .data()
                .modpow(&context.p_minus_one, &context.p_squared)?,
            &context.p,
        ) * &context.hp)
            % &context.p;
        let mq = (l_function(
            &ciphertext
                .data()
                .modpow(&context.q_minus_one, &context.q_squared)?,
            &context.q,
        ) * &context.hq)
            % &context.q;

        let output = context.crt.combine(&mp, &mq, &self.public_key.n);
        Ok(self.group_to_signed(output))
    }

    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> DuetResult<Ciphertext> {
        lhs.homomorphic_add(rhs)
    }

    fn neg(&self, ciphertext: &Ciphertext) -> DuetResult<Ciphertext> {
        ciphertext.homomorphic_neg()
    }

    fn mul_plain(&self, lhs: &Ciphertext, rhs: &BigInt) -> DuetResult<Ciphertext> {
        lhs.homomorphic_mul_plain(rhs)
    }

    fn message_space_upper(&self) -> &BigInt {
        &self.public_key.n
    }

    fn pos_neg_boundary(&self) -> &BigInt {
        &self.positive_negative_boundary
    }

    fn message_space_bits(&self) -> usize {
        self.public_key.n.bits()
    }

    fn encryption_modulus(&self) -> &BigInt {
        &self.n_squared
    }

    fn encrypted_zero(&self, randomized: bool) -> DuetResult<Ciphertext> {
        if randomized {
            self.randomize(&self.encrypted_zero)
        } else {
            Ok(self.encrypted_zero.clone())
        }
    }

    fn encrypted_one(&self, randomized: bool) -> DuetResult<Ciphertext> {
        if randomized {
            self.randomize(&self.encrypted_one)
        } else {
            Ok(self.encrypted_one.clone())
        }
    }
}
