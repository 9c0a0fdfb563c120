//! DGK cryptosystem.
//!
//! "Efficient and Secure Comparison for On-Line Auctions", Damgard, Geisler
//! and Kroigaard, 2007, with the 2009 correction. The plaintext space is
//! `Z_u` for a small prime `u`, which makes DGK the carrier for the
//! bitwise comparison subprotocol: encrypted bits decrypt through a small
//! lookup table, and the `c^vp mod p = 1` test decides "is zero?" without
//! any table at all.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

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
        utils::CrtTerms,
    },
    sdk::{
        api::{DuetError, DuetResult},
        config::DgkConfig,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DgkPublicKey {
    pub n: BigInt,
    pub g: BigInt,
    pub h: BigInt,
    /// prime plaintext-space bound, the smallest prime above `2^(l + 2)`
    pub u: BigInt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DgkPrivateKey {
    pub p: BigInt,
    pub q: BigInt,
    pub vp: BigInt,
    pub vq: BigInt,
}

impl Zeroize for DgkPrivateKey {
    fn zeroize(&mut self) {
        self.p = BigInt::zero();
        self.q = BigInt::zero();
        self.vp = BigInt::zero();
        self.vq = BigInt::zero();
    }
}

impl Drop for DgkPrivateKey {
    fn drop(&mut self) {
        self.zeroize()
    }
}

#[derive(Debug)]
struct DecryptionContext {
    p: BigInt,
    q: BigInt,
    vp: BigInt,
    crt: CrtTerms,
    /// `(g^(vp i) mod p) -> i` for `i` in `[0, u)`; only built on request
    decryption_map: Option<HashMap<BigInt, BigInt>>,
}

pub struct Dgk {
    public_key: DgkPublicKey,
    decryption: Option<DecryptionContext>,
    modulus: Arc<BigInt>,
    positive_negative_boundary: BigInt,
    randomizers: Mutex<RandomizerCache<BigInt>>,
    encrypted_zero: Ciphertext,
    encrypted_one: Ciphertext,
}

impl Dgk {
    /// Keygen per the corrected DGK construction: `u` is the smallest prime
    /// above `2^(l+2)`; `vp != vq` are `t`-bit primes;
    /// `p = 2 p_r vp u + 1` and `q = 2 q_r vq u + 1` for primes `p_r`,
    /// `q_r` sized so that `p` and `q` have `keyLength / 2` bits. `h` of
    /// order `vp vq` and `g` of order `u vp vq` are constructed from
    /// maximum-order elements of `Z_n*` (Menezes, Handbook of Applied
    /// Cryptography, Algorithm 4.83) raised to the matching cofactor.
    pub fn generate_keys(config: &DgkConfig) -> DuetResult<(DgkPublicKey, DgkPrivateKey)> {
        config.validate()?;
        let rounds = config.miller_rabin_rounds;

        let u = (BigInt::one() << (config.l + 2)).next_prime(rounds);

        let vp = rng::prime_exact(config.t, rounds)?;
        let mut vq = rng::prime_exact(config.t, rounds)?;
        // vp and vq must not both divide p - 1 and q - 1
        while vq == vp {
            vq = rng::prime_exact(config.t, rounds)?;
        }

        let (p, p_r) = find_prime_factor(config.key_bits / 2, &u, &vp, rounds)?;
        let (q, q_r) = find_prime_factor(config.key_bits / 2, &u, &vq, rounds)?;

        let n = &p * &q;

        // maximum-order elements modulo p and q, combined with the CRT
        let p_exclusions = order_exclusions(&p_r, &vp, &u);
        let q_exclusions = order_exclusions(&q_r, &vq, &u);
        let crt = CrtTerms::new(&p, &q).map_err(|_| {
            error!("dgk primes are not coprime");
            DuetError::KeyGenerationFailed("p and q are not coprime".to_string())
        })?;

        let h_rand_p = max_order_element(&p, &p_exclusions)?;
        let h_rand_q = max_order_element(&q, &q_exclusions)?;
        let h_rand = crt.combine(&h_rand_p, &h_rand_q, &n);
        // h must have order vp vq in Z_n*
        let h = h_rand.modpow(&(BigInt::two() * &u * &p_r * &q_r), &n)?;

        let g_rand_p = max_order_element(&p, &p_exclusions)?;
        let g_rand_q = max_order_element(&q, &q_exclusions)?;
        let g_rand = crt.combine(&g_rand_p, &g_rand_q, &n);
        // g must have order u vp vq in Z_n*
        let g = g_rand.modpow(&(BigInt::two() * &p_r * &q_r), &n)?;

        Ok((
            DgkPublicKey { n, g, h, u },
            DgkPrivateKey { p, q, vp, vq },
        ))
    }

    pub fn from_keypair(
        public_key: DgkPublicKey,
        private_key: DgkPrivateKey,
        config: &DgkConfig,
    ) -> DuetResult<Self> {
        config.validate()?;
        let crt = CrtTerms::new(&private_key.p, &private_key.q).map_err(|_| {
            error!("dgk primes are not coprime");
            DuetError::KeyGenerationFailed("p and q are not coprime".to_string())
        })?;

        let decryption_map = if config.precompute_decryption_map {
            Some(build_decryption_map(&public_key, &private_key)?)
        } else {
            None
        };

        let decryption = DecryptionContext {
            p: private_key.p.clone(),
            q: private_key.q.clone(),
            vp: private_key.vp.clone(),
            crt,
            decryption_map,
        };
        Self::build(public_key, Some(decryption), config)
    }

    pub fn from_public_key(public_key: DgkPublicKey, config: &DgkConfig) -> DuetResult<Self> {
        config.validate()?;
        Self::build(public_key, None, config)
    }

    fn build(
        public_key: DgkPublicKey,
        decryption: Option<DecryptionContext>,
        config: &DgkConfig,
    ) -> DuetResult<Self> {
        let modulus = Arc::new(public_key.n.clone());
        let positive_negative_boundary = &public_key.u / BigInt::two();

        let mut randomizers = RandomizerCache::new(config.randomizer_cache_capacity, || {
            sample_randomizer(&public_key, decryption.as_ref(), config.t)
        })?;

        let encrypted_zero = nonrandom(&BigInt::zero(), &public_key, decryption.as_ref(), &modulus)?
            .randomized_with(&randomizers.pop())?;
        let encrypted_one = nonrandom(&BigInt::one(), &public_key, decryption.as_ref(), &modulus)?
            .randomized_with(&randomizers.pop())?;

        Ok(Self {
            public_key,
            decryption,
            modulus,
            positive_negative_boundary,
            randomizers: Mutex::new(randomizers),
            encrypted_zero,
            encrypted_one,
        })
    }

    pub fn public_key(&self) -> &DgkPublicKey {
        &self.public_key
    }

    pub fn has_private_key(&self) -> bool {
        self.decryption.is_some()
    }

    /// Fast zero test: `m = 0` iff `c^vp mod p = 1`. No table lookup.
    pub fn is_encrypted_zero(&self, ciphertext: &Ciphertext) -> DuetResult<bool> {
        let context = self
            .decryption
            .as_ref()
            .ok_or(DuetError::SecretKeyRequired)?;
        let test = ciphertext.data().modpow(&context.vp, &context.p)?;
        Ok(test.is_one())
    }

    fn pop_randomizer(&self) -> BigInt {
        self.randomizers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
    }
}

/// A prime `2 r v u + 1` with the requested bit length, together with the
/// prime cofactor `r`. The factorization of `p - 1` is needed later for
/// the generator construction.
fn find_prime_factor(
    bits: usize,
    u: &BigInt,
    v: &BigInt,
    rounds: usize,
) -> DuetResult<(BigInt, BigInt)> {
    let aux = BigInt::two() * u * v;
    if bits <= aux.bits() + 1 {
        error!("dgk key length too small for the chosen u and t");
        return Err(DuetError::InvalidParameter(
            "the key length is too small".to_string(),
        ));
    }
    let size_rand = bits - aux.bits();

    let mut attempts = 0usize;
    loop {
        let r = rng::prime_exact(size_rand, rounds)?;
        let candidate = &r * &aux + BigInt::one();
        if candidate.is_prime(rounds) {
            debug!("dgk prime factor found after {} attempts", attempts);
            return Ok((candidate, r));
        }
        attempts += 1;
    }
}

/// The four maximal proper divisors of the group order
/// `p - 1 = 2 r v u`: an element is a generator iff raising it to each of
/// them never yields 1.
fn order_exclusions(r: &BigInt, v: &BigInt, u: &BigInt) -> [BigInt; 4] {
    [
        v * u * BigInt::two(),
        r * u * BigInt::two(),
        r * v * BigInt::two(),
        r * v * u,
    ]
}

/// Menezes Algorithm 4.80: sample until the candidate survives every
/// subgroup-order test.
fn max_order_element(prime: &BigInt, exclusions: &[BigInt; 4]) -> DuetResult<BigInt> {
    'candidate: loop {
        let candidate = rng::uniform_below(prime);
        if candidate.is_one() || !candidate.gcd(prime).is_one() {
            continue;
        }
        for exclusion in exclusions {
            if candidate.modpow(exclusion, prime)?.is_one() {
                continue 'candidate;
            }
        }
        return Ok(candidate);
    }
}

fn build_decryption_map(
    public_key: &DgkPublicKey,
    private_key: &DgkPrivateKey,
) -> DuetResult<HashMap<BigInt, BigInt>> {
    let entries = public_key.u.to_usize().ok_or_else(|| {
        error!("dgk plaintext space too large for a decryption map");
        DuetError::InvalidParameter("plaintext space too large for a decryption map".to_string())
    })?;

    let step = public_key.g.modpow(&private_key.vp, &private_key.p)?;
    let mut map = HashMap::with_capacity(entries);
    let mut accumulator = BigInt::one();
    let mut i = BigInt::zero();
    while i < public_key.u {
        map.insert(accumulator.clone(), i.clone());
        accumulator = (&accumulator * &step) % &private_key.p;
        i = i + BigInt::one();
    }
    Ok(map)
}

/// `h^r mod n` for `r` in `[0, 2^(2t))`, using two half-size
/// exponentiations when the factorization of `n` is available.
fn sample_randomizer(
    public_key: &DgkPublicKey,
    decryption: Option<&DecryptionContext>,
    t: usize,
) -> DuetResult<BigInt> {
    let r = rng::uniform_bits(2 * t);
    match decryption {
        None => public_key.h.modpow(&r, &public_key.n),
        Some(context) => {
            let mod_p = public_key.h.modpow(&r, &context.p)?;
            let mod_q = public_key.h.modpow(&r, &context.q)?;
            Ok(context.crt.combine(&mod_p, &mod_q, &public_key.n))
        }
    }
}

/// `g^m mod n`, with the CRT shortcut when the secret key is present.
fn nonrandom(
    plaintext: &BigInt,
    public_key: &DgkPublicKey,
    decryption: Option<&DecryptionContext>,
    modulus: &Arc<BigInt>,
) -> DuetResult<Ciphertext> {
    let m = plaintext % &public_key.u;
    let data = match decryption {
        None => public_key.g.modpow(&m, &public_key.n)?,
        Some(context) => {
            let mod_p = public_key.g.modpow(&m, &context.p)?;
            let mod_q = public_key.g.modpow(&m, &context.q)?;
            context.crt.combine(&mod_p, &mod_q, &public_key.n)
        }
    };
    Ok(Ciphertext::new(data, modulus.clone()))
}

impl CryptoProvider for Dgk {
    type Ciphertext = Ciphertext;

    fn encrypt_nonrandom(&self, plaintext: &BigInt) -> DuetResult<Ciphertext> {
        nonrandom(
            plaintext,
            &self.public_key,
            self.decryption.as_ref(),
            &self.modulus,
        )
    }

    fn randomize(&self, ciphertext: &Ciphertext) -> DuetResult<Ciphertext> {
        ciphertext.randomized_with(&self.pop_randomizer())
    }

    /// Full decryption requires the precomputed table; without it only the
    /// zero test is decidable.
    fn decrypt(&self, ciphertext: &Ciphertext) -> DuetResult<BigInt> {
        let context = self
            .decryption
            .as_ref()
            .ok_or(DuetError::SecretKeyRequired)?;
        let map = context.decryption_map.as_ref().ok_or_else(|| {
            error!("dgk decryption requires the precomputed decryption map");
            DuetError::InvalidParameter(
                "decryption requires the precomputed decryption map".to_string(),
            )
        })?;

        let c_pow_vp_mod_p = ciphertext.data().modpow(&context.vp, &context.p)?;
        if c_pow_vp_mod_p.is_one() {
            return Ok(BigInt::zero());
        }

        let output = map
            .get(&c_pow_vp_mod_p)
            .cloned()
            .ok_or(DuetError::Undecodable)?;
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
        &self.public_key.u
    }

    fn pos_neg_boundary(&self) -> &BigInt {
        &self.positive_negative_boundary
    }

    fn message_space_bits(&self) -> usize {
        self.public_key.u.bits()
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

    pub(crate) fn test_config(precompute_decryption_map: bool) -> DgkConfig {
        DgkConfig {
            key_bits: 256,
            t: 10,
            l: 8,
            precompute_decryption_map,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        }
    }

    pub(crate) fn test_instances() -> (Dgk, Dgk) {
        let config = test_config(true);
        let (public_key, private_key) = Dgk::generate_keys(&config).unwrap();
        let keyed = Dgk::from_keypair(public_key.clone(), private_key, &config).unwrap();
        let keyless = Dgk::from_public_key(public_key, &config).unwrap();
        (keyed, keyless)
    }

    #[test]
    fn round_trip_with_decryption_map() {
        let (keyed, _) = test_instances();
        for m in [0i64, 1, -1, 13, -200, 511] {
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
    fn zero_test_without_decryption_map() {
        let config = test_config(false);
        let (public_key, private_key) = Dgk::generate_keys(&config).unwrap();
        let keyed = Dgk::from_keypair(public_key, private_key, &config).unwrap();

        assert!(keyed
            .is_encrypted_zero(&keyed.encrypted_zero(true).unwrap())
            .unwrap());
        assert!(!keyed
            .is_encrypted_zero(&keyed.encrypted_one(true).unwrap())
            .unwrap());

        // full decryption demands the table
        assert!(matches!(
            keyed.decrypt(&keyed.encrypted_one(true).unwrap()),
            Err(DuetError::InvalidParameter(_))
        ));
    }

    #[test]
    fn homomorphic_operations() {
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
    fn keyless_instance_encrypts_for_the_keyed_one() {
        let (keyed, keyless) = test_instances();
        let c = keyless.encrypt(&BigInt::from(-3)).unwrap();
        assert_eq!(keyed.decrypt(&c).unwrap(), BigInt::from(-3));
        assert_eq!(
            keyless.is_encrypted_zero(&c),
            Err(DuetError::SecretKeyRequired)
        );
    }

    #[test]
    fn public_key_exposes_prime_plaintext_space() {
        let (keyed, _) = test_instances();
        // u is the smallest prime above 2^(l + 2)
        assert_eq!(keyed.public_key().u, BigInt::from(1031));
        assert_eq!(keyed.message_space_bits(), 11);
    }
}
