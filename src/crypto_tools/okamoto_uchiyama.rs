//! Okamoto-Uchiyama cryptosystem.
//!
//! "Accelerating Okamoto-Uchiyama's Public-Key Cryptosystem", Coron,
//! Naccache and Paillier, 1999. The modulus is `n = p^2 q`; the plaintext
//! space is `Z_p`, which only the key holder knows. Instances without the
//! private key therefore work against a public power-of-two bound below
//! `p`, leaving an unused gap in the middle of the message space, so their
//! ciphertexts interoperate with keyed instances.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::error;
use zeroize::Zeroize;

use crate::{
    crypto_tools::{
        bigint::BigInt,
        ciphertext::Ciphertext,
        provider::CryptoProvider,
        randomizer_cache::RandomizerCache,
        rng,
    },
    sdk::{
        api::{DuetError, DuetResult},
        config::OkamotoUchiyamaConfig,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkamotoUchiyamaPublicKey {
    pub n: BigInt,
    /// `G = g^u mod n`
    pub g: BigInt,
    /// `H = g'^(n u) mod n`
    pub h: BigInt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkamotoUchiyamaPrivateKey {
    pub p: BigInt,
    pub q: BigInt,
    /// `g_p = g^(p-1) mod p^2`, of order `p`
    pub gp: BigInt,
    /// the prime factor of `p - 1` used as the decryption exponent
    pub t: BigInt,
}

impl Zeroize for OkamotoUchiyamaPrivateKey {
    fn zeroize(&mut self) {
        self.p = BigInt::zero();
        self.q = BigInt::zero();
        self.gp = BigInt::zero();
        self.t = BigInt::zero();
    }
}

impl Drop for OkamotoUchiyamaPrivateKey {
    fn drop(&mut self) {
        self.zeroize()
    }
}

#[derive(Debug)]
struct DecryptionContext {
    p: BigInt,
    p_squared: BigInt,
    t: BigInt,
    /// `L(g_p)^-1 mod p`
    l_gp_inv: BigInt,
}

pub struct OkamotoUchiyama {
    public_key: OkamotoUchiyamaPublicKey,
    decryption: Option<DecryptionContext>,
    modulus: Arc<BigInt>,
    message_space: BigInt,
    message_space_bits: usize,
    positive_negative_boundary: BigInt,
    randomizers: Mutex<RandomizerCache<BigInt>>,
    encrypted_zero: Ciphertext,
    encrypted_one: Ciphertext,
}

impl OkamotoUchiyama {
    /// Primes `p` and `q` of a third of the key length each, with
    /// `p = t u + 1` for a `t_bits`-bit prime `t`, then `n = p^2 q`,
    /// `G = g^u mod n` for a `g` whose `g_p = g^(p-1) mod p^2` has order
    /// `p`, and `H = g'^(n u) mod n` for a second full-order `g'`.
    pub fn generate_keys(
        config: &OkamotoUchiyamaConfig,
    ) -> DuetResult<(OkamotoUchiyamaPublicKey, OkamotoUchiyamaPrivateKey)> {
        config.validate()?;
        let rounds = config.miller_rabin_rounds;
        let prime_bits = config.key_bits / 3;

        let t = rng::prime_exact(config.t_bits, rounds)?;

        // p - 1 = t u for a random u of the complementary size
        let size_u = prime_bits - config.t_bits;
        let (p, u) = loop {
            let mut u = rng::uniform_bits(size_u - 1);
            u.set_bit(size_u - 1)?;
            let p = &t * &u + BigInt::one();
            if p.is_prime(rounds) {
                break (p, u);
            }
        };
        let p_squared = &p * &p;

        let q = rng::prime_exact(prime_bits, rounds)?;
        let n = &p_squared * &q;

        // g in Z_n* whose g_p = g^(p-1) mod p^2 has order exactly p
        let p_minus_one = &p - BigInt::one();
        let (g, gp) = loop {
            let g = rng::uniform_below(&n);
            if !g.gcd(&p).is_one() {
                continue;
            }
            let gp = g.modpow(&p_minus_one, &p_squared)?;
            if !gp.is_one() {
                break (g, gp);
            }
        };

        let big_g = g.modpow(&u, &n)?;

        let g_prime = loop {
            let g_prime = rng::uniform_below(&n);
            if g_prime.gcd(&n).is_one() {
                break g_prime;
            }
        };
        let big_h = g_prime.modpow(&(&n * &u), &n)?;

        Ok((
            OkamotoUchiyamaPublicKey {
                n,
                g: big_g,
                h: big_h,
            },
            OkamotoUchiyamaPrivateKey { p, q, gp, t },
        ))
    }

    pub fn from_keypair(
        public_key: OkamotoUchiyamaPublicKey,
        private_key: OkamotoUchiyamaPrivateKey,
        config: &OkamotoUchiyamaConfig,
    ) -> DuetResult<Self> {
        config.validate()?;
        let p_squared = &private_key.p * &private_key.p;
        let l_gp_inv = l_function(&private_key.gp, &private_key.p)
            .invert(&private_key.p)
            .map_err(|_| {
                error!("L(g_p) is not invertible modulo p");
                DuetError::KeyGenerationFailed("L(g_p) is not invertible".to_string())
            })?;
        let decryption = DecryptionContext {
            p: private_key.p.clone(),
            p_squared,
            t: private_key.t.clone(),
            l_gp_inv,
        };
        Self::build(public_key, Some(decryption), config)
    }

    pub fn from_public_key(
        public_key: OkamotoUchiyamaPublicKey,
        config: &OkamotoUchiyamaConfig,
    ) -> DuetResult<Self> {
        config.validate()?;
        Self::build(public_key, None, config)
    }

    fn build(
        public_key: OkamotoUchiyamaPublicKey,
        decryption: Option<DecryptionContext>,
        config: &OkamotoUchiyamaConfig,
    ) -> DuetResult<Self> {
        let modulus = Arc::new(public_key.n.clone());

        // Without the private key the true bound p must stay hidden, so a
        // public power-of-two bound below p thresholds the message space.
        let (message_space, message_space_bits) = match &decryption {
            Some(context) => (context.p.clone(), context.p.bits()),
            None => (
                BigInt::one() << config.message_space_bits,
                config.message_space_bits,
            ),
        };
        let positive_negative_boundary = &message_space / BigInt::two();

        let n_minus_one = &public_key.n - BigInt::one();
        let mut randomizers = RandomizerCache::new(config.randomizer_cache_capacity, || {
            let r = rng::uniform_below(&n_minus_one) + BigInt::one();
            public_key.h.modpow(&r, &public_key.n)
        })?;

        let encrypted_zero = nonrandom(
            &BigInt::zero(),
            &public_key,
            &message_space,
            decryption.is_some(),
            &modulus,
        )?
        .randomized_with(&randomizers.pop())?;
        let encrypted_one = nonrandom(
            &BigInt::one(),
            &public_key,
            &message_space,
            decryption.is_some(),
            &modulus,
        )?
        .randomized_with(&randomizers.pop())?;

        Ok(Self {
            public_key,
            decryption,
            modulus,
            message_space,
            message_space_bits,
            positive_negative_boundary,
            randomizers: Mutex::new(randomizers),
            encrypted_zero,
            encrypted_one,
        })
    }

    pub fn public_key(&self) -> &OkamotoUchiyamaPublicKey {
        &self.public_key
    }

    pub fn has_private_key(&self) -> bool {
        self.decryption.is_some()
    }

    fn pop_randomizer(&self) -> BigInt {
        self.randomizers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }
}

/// `L(x) = (x - 1) / p`
fn l_function(input: &BigInt, p: &BigInt) -> BigInt {
    (input - BigInt::one()) / p
}

/// `c = G^m mod n`. A negative `m` is remapped to `M + m` when the true
/// bound is known; otherwise `|m|` is encrypted and the ciphertext
/// inverted, a homomorphic multiplication by -1.
fn nonrandom(
    plaintext: &BigInt,
    public_key: &OkamotoUchiyamaPublicKey,
    message_space: &BigInt,
    has_private_key: bool,
    modulus: &Arc<BigInt>,
) -> DuetResult<Ciphertext> {
    let data = if plaintext.is_negative() {
        if has_private_key {
            public_key
                .g
                .modpow(&(message_space + plaintext), &public_key.n)?
        } else {
            public_key
                .g
                .modpow(&plaintext.abs(), &public_key.n)?
                .invert(&public_key.n)?
        }
    } else {
        public_key.g.modpow(plaintext, &public_key.n)?
    };
    Ok(Ciphertext::new(data, modulus.clone()))
}

impl CryptoProvider for OkamotoUchiyama {
    type Ciphertext = Ciphertext;

    fn encrypt_nonrandom(&self, plaintext: &BigInt) -> DuetResult<Ciphertext> {
        nonrandom(
            plaintext,
            &self.public_key,
            &self.message_space,
            self.decryption.is_some(),
            &self.modulus,
        )
    }

    fn randomize(&self, ciphertext: &Ciphertext) -> DuetResult<Ciphertext> {
        ciphertext.randomized_with(&self.pop_randomizer())
    }

    /// `m = L(c^t mod p^2) L(g_p)^-1 mod p`
    fn decrypt(&self, ciphertext: &Ciphertext) -> DuetResult<BigInt> {
        let context = self
            .decryption
            .as_ref()
            .ok_or(DuetError::SecretKeyRequired)?;
        let c_pow_t = ciphertext.data().modpow(&context.t, &context.p_squared)?;
        let output = (l_function(&c_pow_t, &context.p) * &context.l_gp_inv) % &context.p;
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
        &self.message_space
    }

    fn pos_neg_boundary(&self) -> &BigInt {
        &self.positive_negative_boundary
    }

    fn message_space_bits(&self) -> usize {
        self.message_space_bits
    }

    fn encryption_modulus(&self) -> &BigInt {
        &self.modulus
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_config() -> OkamotoUchiyamaConfig {
        OkamotoUchiyamaConfig {
            key_bits: 510,
            t_bits: 80,
            message_space_bits: 64,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        }
    }

    pub(crate) fn test_instances() -> (OkamotoUchiyama, OkamotoUchiyama) {
        let config = test_config();
        let (public_key, private_key) = OkamotoUchiyama::generate_keys(&config).unwrap();
        let keyed =
            OkamotoUchiyama::from_keypair(public_key.clone(), private_key, &config).unwrap();
        let keyless = OkamotoUchiyama::from_public_key(public_key, &config).unwrap();
        (keyed, keyless)
    }

    #[test]
    fn round_trip() {
        let (keyed, _) = test_instances();
        for m in [0i64, 1, -1, 3, -2, 99999, -99999] {
            let m = BigInt::from(m);
            assert_eq!(keyed.decrypt(&keyed.encrypt(&m).unwrap()).unwrap(), m);
        }
    }

    #[test]
    fn boundary_wraps_to_negative() {
        let (keyed, _) = test_instances();
        let boundary = keyed.pos_neg_boundary().clone();
        assert_eq!(
            keyed.decrypt(&keyed.encrypt(&boundary).unwrap()).unwrap(),
            boundary
        );
        assert_eq!(
            keyed
                .decrypt(&keyed.encrypt(&(&boundary + BigInt::one())).unwrap())
                .unwrap(),
            -&boundary
        );
    }

    #[test]
    fn homomorphic_operations() {
        let (keyed, _) = test_instances();
        let enc_x = keyed.encrypt(&BigInt::from(3)).unwrap();
        let enc_y = keyed.encrypt(&BigInt::from(2)).unwrap();

        assert_eq!(
            keyed.decrypt(&keyed.add(&enc_x, &enc_y).unwrap()).unwrap(),
            BigInt::from(5)
        );
        assert_eq!(
            keyed.decrypt(&keyed.sub(&enc_x, &enc_y).unwrap()).unwrap(),
            BigInt::one()
        );
        assert_eq!(
            keyed
                .decrypt(&keyed.mul_plain(&enc_x, &BigInt::from(-2)).unwrap())
                .unwrap(),
            BigInt::from(-6)
        );
    }

    #[test]
    fn keyless_negative_encryption_uses_the_inverse() {
        let (keyed, keyless) = test_instances();
        // the keyless instance cannot remap negatives in plaintext, so it
        // encrypts |m| and inverts the ciphertext
        let c = keyless.encrypt(&BigInt::from(-7)).unwrap();
        assert_eq!(keyed.decrypt(&c).unwrap(), BigInt::from(-7));

        // the public bound is a power of two strictly below p
        assert!(keyless.message_space_upper() < keyed.message_space_upper());
        assert_eq!(keyless.message_space_bits(), 64);
    }

    #[test]
    fn decryption_requires_the_private_key() {
        let (_, keyless) = test_instances();
        let c = keyless.encrypt(&BigInt::one()).unwrap();
        assert_eq!(keyless.decrypt(&c), Err(DuetError::SecretKeyRequired));
    }
}
