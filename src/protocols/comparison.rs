//! Two-party secure comparison.
//!
//! For `l`-bit encrypted inputs the Server obtains `[1]` iff `a <= b`,
//! else `[0]`, without either side learning the operands.
//!
//! Outer (Paillier) step: the Server forms `z = [2^l + b - a]`, whose
//! `l`-th bit is the `a <= b` indicator, blinds it additively and asks the
//! PSP for `[-(d mod 2^l)]`. Reconstructing `z mod 2^l` from the shares
//! `d mod 2^l` and `r mod 2^l` needs an underflow correction `lambda`,
//! produced by the inner DGK step, and the final unblinding multiplies by
//! `2^-l mod n` to isolate the indicator bit.
//!
//! Inner (DGK) step: the PSP commits DGK encryptions of the bits of
//! `d mod 2^l`; the Server walks its own share's bits from the most
//! significant down, maintaining an "already differs?" accumulator, masks
//! each position with a non-zero scalar or an encrypted non-zero filler,
//! appends the differing-LSBs position that removes the equality edge
//! case (compare `2 d + 1` against `2 r`), hides its branch under a fair
//! coin, and sends the `l + 1` ciphertexts through a random permutation.
//! The PSP answers with a Paillier encryption chosen by the "any zero
//! among them?" test.

use std::sync::{Arc, Mutex, Weak};

use tracing::error;

use crate::{
    crypto_tools::{
        bigint::BigInt,
        ciphertext::Ciphertext,
        dgk::Dgk,
        paillier::Paillier,
        permutation::Permutation,
        provider::CryptoProvider,
        rng,
    },
    protocols::blinding::{
        BlindingFactorCache, ComparisonBlindingFactor, DgkComparisonBlindingFactor,
    },
    sdk::{
        api::{DuetError, DuetResult},
        config::ProtocolConfig,
    },
};

fn upgrade<T>(link: &Mutex<Weak<T>>, what: &str) -> DuetResult<Arc<T>> {
    link.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .upgrade()
        .ok_or_else(|| {
            error!("the {} endpoint is gone", what);
            DuetError::InvariantViolation(format!("the {} endpoint is gone", what))
        })
}

/// The operand bit length must leave room for the DGK accumulator sums
/// and for the blinded Paillier values.
fn validate_parameters(
    paillier: &Paillier,
    dgk: &Dgk,
    config: &ProtocolConfig,
) -> DuetResult<()> {
    config.validate_against_modulus_bits(paillier.message_space_bits())?;
    if config.l + 3 > dgk.message_space_bits() {
        error!(
            "{}-bit operands exceed the {}-bit DGK plaintext space",
            config.l,
            dgk.message_space_bits()
        );
        return Err(DuetError::InvalidParameter(
            "operands exceed the DGK plaintext space".to_string(),
        ));
    }
    Ok(())
}

pub struct SecureComparisonServer {
    paillier: Arc<Paillier>,
    dgk_server: Arc<DgkComparisonServer>,
    l: usize,
    two_pow_minus_l_mod_n: BigInt,
    encrypted_two_pow_l: Ciphertext,
    blinding_factors: Mutex<BlindingFactorCache<ComparisonBlindingFactor>>,
    client: Mutex<Weak<SecureComparisonClient>>,
}

impl SecureComparisonServer {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        validate_parameters(&paillier, &dgk, config)?;

        let two_pow_l = BigInt::one() << config.l;
        let two_pow_minus_l_mod_n = two_pow_l.invert(paillier.message_space_upper())?;
        let encrypted_two_pow_l = paillier.encrypt(&two_pow_l)?;

        let blinding_factors = BlindingFactorCache::new(config.blinding_cache_capacity, || {
            ComparisonBlindingFactor::generate(&paillier, config.l, config.kappa)
        })?;

        Ok(Self {
            dgk_server: Arc::new(DgkComparisonServer::new(paillier.clone(), dgk, config)?),
            paillier,
            l: config.l,
            two_pow_minus_l_mod_n,
            encrypted_two_pow_l,
            blinding_factors: Mutex::new(blinding_factors),
            client: Mutex::new(Weak::new()),
        })
    }

    pub fn set_client(&self, client: &Arc<SecureComparisonClient>) {
        *self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(client);
        self.dgk_server.set_client(client.dgk_client());
    }

    pub fn operand_bits(&self) -> usize {
        self.l
    }

    /// `([a], [b]) -> [a <= b ? 1 : 0]`
    pub fn compare(&self, a: &Ciphertext, b: &Ciphertext) -> DuetResult<Ciphertext> {
        // z = [2^l + b - a]; bit l of z is the comparison result
        let z = self
            .paillier
            .add(&self.encrypted_two_pow_l, &self.paillier.sub(b, a)?)?;

        // additively blind before the PSP decrypts
        let factor = self
            .blinding_factors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        let d = self
            .paillier
            .randomize(&self.paillier.add(&z, &factor.encrypted_r)?)?;

        let minus_d_hat = self.client()?.compute_minus_d_mod_two_pow_l(&d)?;

        // d = z + r mod 2^l, so z mod 2^l = (d mod 2^l) - (r mod 2^l),
        // plus 2^l whenever the subtraction underflows. The underflow
        // indicator comes out of the inner DGK protocol as
        // lambda in {[0], [-2^l]}, blinded by the coin s.
        let s = rng::coin();
        let lambda = self.dgk_server.compute_lambda(&factor.hat_r_bits, s)?;

        // [z_l] = ([z] [-(d mod 2^l)] [r mod 2^l] [lambda])^(2^-l mod n)
        let masked = self.paillier.add(
            &self.paillier.add(&z, &minus_d_hat)?,
            &self
                .paillier
                .add(&factor.encrypted_r_mod_two_pow_l, &lambda)?,
        )?;
        self.paillier.mul_plain(&masked, &self.two_pow_minus_l_mod_n)
    }

    fn client(&self) -> DuetResult<Arc<SecureComparisonClient>> {
        upgrade(&self.client, "comparison client")
    }
}

pub struct SecureComparisonClient {
    paillier: Arc<Paillier>,
    dgk_client: Arc<DgkComparisonClient>,
    l: usize,
    two_pow_l: BigInt,
}

impl SecureComparisonClient {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        validate_parameters(&paillier, &dgk, config)?;
        Ok(Self {
            dgk_client: Arc::new(DgkComparisonClient::new(paillier.clone(), dgk, config)?),
            paillier,
            l: config.l,
            two_pow_l: BigInt::one() << config.l,
        })
    }

    /// Both parties must agree on the operand length.
    pub fn set_server(&self, server: &Arc<SecureComparisonServer>) -> DuetResult<()> {
        if self.l != server.operand_bits() {
            error!(
                "comparison endpoints disagree on the operand length: {} vs {}",
                self.l,
                server.operand_bits()
            );
            return Err(DuetError::InvalidParameter(
                "endpoints disagree on the operand length".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dgk_client(&self) -> &Arc<DgkComparisonClient> {
        &self.dgk_client
    }

    /// PSP side: decrypt the blinded sum, keep `d mod 2^l` for the inner
    /// DGK step, and return `[-(d mod 2^l)]`.
    pub(crate) fn compute_minus_d_mod_two_pow_l(&self, d: &Ciphertext) -> DuetResult<Ciphertext> {
        if !self.paillier.validate_ciphertext(d) {
            error!("blinded comparison operand is not a valid ciphertext");
            return Err(DuetError::InvariantViolation(
                "blinded operand is not a valid ciphertext".to_string(),
            ));
        }
        let d_hat = &self.paillier.decrypt(d)? % &self.two_pow_l;
        self.dgk_client.set_hat_d(d_hat.clone());
        self.paillier.encrypt(&-d_hat)
    }
}

/// Server half of the inner bitwise DGK protocol.
pub struct DgkComparisonServer {
    paillier: Arc<Paillier>,
    dgk: Arc<Dgk>,
    l: usize,
    /// `[-2^l]`, deterministic on purpose: it only ever leaves this party
    /// re-randomized or under the coin blinding
    encrypted_minus_two_pow_l: Ciphertext,
    blinding_factors: Mutex<BlindingFactorCache<DgkComparisonBlindingFactor>>,
    client: Mutex<Weak<DgkComparisonClient>>,
}

impl DgkComparisonServer {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        let encrypted_minus_two_pow_l =
            paillier.encrypt_nonrandom(&-(BigInt::one() << config.l))?;
        let blinding_factors = BlindingFactorCache::new(config.blinding_cache_capacity, || {
            DgkComparisonBlindingFactor::generate(&dgk, config.l + 1)
        })?;
        Ok(Self {
            paillier,
            dgk,
            l: config.l,
            encrypted_minus_two_pow_l,
            blinding_factors: Mutex::new(blinding_factors),
            client: Mutex::new(Weak::new()),
        })
    }

    pub fn set_client(&self, client: &Arc<DgkComparisonClient>) {
        *self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(client);
    }

    /// Compute the underflow indicator
    /// `lambda = [-2^l]` iff `(d mod 2^l) < (r mod 2^l)`, else `[0]`,
    /// from the Server's plaintext bits `hat_r_bits` and the PSP's
    /// committed encrypted bits of `d mod 2^l`.
    ///
    /// The equality edge case disappears by comparing `2 hat_d + 1`
    /// against `2 hat_r`: the appended LSBs always differ. `s` hides
    /// which branch this party took.
    pub(crate) fn compute_lambda(&self, hat_r_bits: &[bool], s: bool) -> DuetResult<Ciphertext> {
        let client = self.client()?;
        let hat_d_bits = client.hat_d_bits()?;
        if hat_r_bits.len() != self.l || hat_d_bits.len() != self.l {
            error!("comparison share length mismatch");
            return Err(DuetError::InvariantViolation(
                "comparison share length mismatch".to_string(),
            ));
        }

        let factor = self
            .blinding_factors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        let one = self.dgk.encrypted_one(false)?;

        let mut masked_bits = Vec::with_capacity(self.l + 1);

        // most significant position: the accumulator is still empty, so
        // the position is a witness iff the bits differ the right way
        let msb_r = hat_r_bits[self.l - 1];
        if s == msb_r {
            let witness = if msb_r {
                hat_d_bits[self.l - 1].clone()
            } else {
                self.dgk.sub(&hat_d_bits[self.l - 1], &one)?
            };
            let masked = self.dgk.mul_plain(&witness, &factor.multipliers[self.l])?;
            masked_bits.push(self.dgk.randomize(&masked)?);
        } else {
            masked_bits.push(factor.encrypted_fillers[self.l].clone());
        }

        // sigma accumulates xor(hat_d_i, hat_r_i) over the processed prefix
        let mut sigma = if msb_r {
            self.dgk.sub(&one, &hat_d_bits[self.l - 1])?
        } else {
            hat_d_bits[self.l - 1].clone()
        };

        for i in (0..self.l - 1).rev() {
            if s == hat_r_bits[i] {
                let mut witness = self.dgk.add(&hat_d_bits[i], &sigma)?;
                if !s {
                    // witness = hat_d_i - 1 + 2 sigma: zero iff the prefix
                    // matches and hat_d_i = 1
                    witness = self.dgk.add(&self.dgk.sub(&witness, &one)?, &sigma)?;
                }
                let masked = self.dgk.mul_plain(&witness, &factor.multipliers[i + 1])?;
                masked_bits.push(self.dgk.randomize(&masked)?);
            } else {
                masked_bits.push(factor.encrypted_fillers[i + 1].clone());
            }

            let xor_i = if hat_r_bits[i] {
                self.dgk.sub(&one, &hat_d_bits[i])?
            } else {
                hat_d_bits[i].clone()
            };
            sigma = self.dgk.add(&sigma, &xor_i)?;
        }

        // appended position: LSB(2 hat_d + 1) = 1 and LSB(2 hat_r) = 0,
        // so it witnesses iff everything above matched
        if s {
            masked_bits.push(factor.encrypted_fillers[0].clone());
        } else {
            let masked = self.dgk.mul_plain(&sigma, &factor.multipliers[0])?;
            masked_bits.push(self.dgk.randomize(&masked)?);
        }

        let permutation = Permutation::new(masked_bits.len());
        permutation.permute(&mut masked_bits)?;

        let lambda = client.lambda_from_masked_bits(&masked_bits)?;
        if s {
            Ok(lambda)
        } else {
            self.paillier.sub(&self.encrypted_minus_two_pow_l, &lambda)
        }
    }

    fn client(&self) -> DuetResult<Arc<DgkComparisonClient>> {
        upgrade(&self.client, "DGK comparison client")
    }
}

/// PSP half of the inner bitwise DGK protocol. Holds `d mod 2^l` between
/// the outer exchange and the bitwise evaluation.
pub struct DgkComparisonClient {
    paillier: Arc<Paillier>,
    dgk: Arc<Dgk>,
    l: usize,
    encrypted_minus_two_pow_l: Ciphertext,
    hat_d: Mutex<Option<BigInt>>,
}

impl DgkComparisonClient {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        let encrypted_minus_two_pow_l =
            paillier.encrypt_nonrandom(&-(BigInt::one() << config.l))?;
        Ok(Self {
            paillier,
            dgk,
            l: config.l,
            encrypted_minus_two_pow_l,
            hat_d: Mutex::new(None),
        })
    }

    pub(crate) fn set_hat_d(&self, value: BigInt) {
        *self
            .hat_d
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(value);
    }

    /// DGK encryptions of the bits of `d mod 2^l`, least significant
    /// first.
    pub(crate) fn hat_d_bits(&self) -> DuetResult<Vec<Ciphertext>> {
        let hat_d = self
            .hat_d
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| {
                error!("inner comparison invoked before the outer exchange");
                DuetError::InvariantViolation(
                    "comparison state is not initialized".to_string(),
                )
            })?;

        (0..self.l)
            .map(|i| self.dgk.encrypt(&BigInt::from(hat_d.bit(i)? as u8)))
            .collect()
    }

    /// Any encrypted zero among the masked positions means
    /// `2 (r mod 2^l) > 2 (d mod 2^l) + 1`, an underflow.
    pub(crate) fn lambda_from_masked_bits(&self, masked_bits: &[Ciphertext]) -> DuetResult<Ciphertext> {
        if masked_bits.len() != self.l + 1 {
            error!(
                "expected {} masked positions, got {}",
                self.l + 1,
                masked_bits.len()
            );
            return Err(DuetError::InvariantViolation(
                "masked position count mismatch".to_string(),
            ));
        }
        for ciphertext in masked_bits {
            if self.dgk.is_encrypted_zero(ciphertext)? {
                return self.paillier.randomize(&self.encrypted_minus_two_pow_l);
            }
        }
        self.paillier.encrypted_zero(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto_tools::{
        dgk::{tests as dgk_tests, Dgk},
        paillier::{tests as paillier_tests, Paillier},
    };

    pub(crate) fn test_protocol_config() -> ProtocolConfig {
        ProtocolConfig {
            l: 8,
            kappa: 40,
            blinding_cache_capacity: 4,
        }
    }

    pub(crate) struct ComparisonFixture {
        pub paillier: Arc<Paillier>,
        pub server: Arc<SecureComparisonServer>,
        #[allow(dead_code)]
        pub client: Arc<SecureComparisonClient>,
    }

    pub(crate) fn comparison_fixture() -> ComparisonFixture {
        let paillier_config = paillier_tests::test_config();
        let (paillier_pk, paillier_sk) = Paillier::generate_keys(&paillier_config).unwrap();
        let paillier_keyed = Arc::new(
            Paillier::from_keypair(paillier_pk.clone(), paillier_sk, &paillier_config).unwrap(),
        );
        let paillier_keyless =
            Arc::new(Paillier::from_public_key(paillier_pk, &paillier_config).unwrap());

        let dgk_config = dgk_tests::test_config(false);
        let (dgk_pk, dgk_sk) = Dgk::generate_keys(&dgk_config).unwrap();
        let dgk_keyed = Arc::new(Dgk::from_keypair(dgk_pk.clone(), dgk_sk, &dgk_config).unwrap());
        let dgk_keyless = Arc::new(Dgk::from_public_key(dgk_pk, &dgk_config).unwrap());

        let config = test_protocol_config();
        let server =
            Arc::new(SecureComparisonServer::new(paillier_keyless, dgk_keyless, &config).unwrap());
        let client =
            Arc::new(SecureComparisonClient::new(paillier_keyed.clone(), dgk_keyed, &config).unwrap());
        server.set_client(&client);
        client.set_server(&server).unwrap();

        ComparisonFixture {
            paillier: paillier_keyed,
            server,
            client,
        }
    }

    fn compare_plain(fixture: &ComparisonFixture, a: i64, b: i64) -> i64 {
        let enc_a = fixture.paillier.encrypt(&BigInt::from(a)).unwrap();
        let enc_b = fixture.paillier.encrypt(&BigInt::from(b)).unwrap();
        let result = fixture.server.compare(&enc_a, &enc_b).unwrap();
        fixture
            .paillier
            .decrypt(&result)
            .unwrap()
            .to_u64()
            .unwrap() as i64
    }

    #[test]
    fn orders_encrypted_operands() {
        let fixture = comparison_fixture();
        assert_eq!(compare_plain(&fixture, 42, 100), 1);
        assert_eq!(compare_plain(&fixture, 100, 42), 0);
    }

    #[test]
    fn edge_operands() {
        let fixture = comparison_fixture();
        assert_eq!(compare_plain(&fixture, 7, 7), 1);
        assert_eq!(compare_plain(&fixture, 0, 0), 1);
        assert_eq!(compare_plain(&fixture, 0, 255), 1);
        assert_eq!(compare_plain(&fixture, 255, 0), 0);
        assert_eq!(compare_plain(&fixture, 255, 255), 1);
        assert_eq!(compare_plain(&fixture, 128, 127), 0);
        assert_eq!(compare_plain(&fixture, 127, 128), 1);
    }

    #[test]
    fn random_operands() {
        let fixture = comparison_fixture();
        for _ in 0..12 {
            let a = rng::uniform_bits(8).to_u64().unwrap() as i64;
            let b = rng::uniform_bits(8).to_u64().unwrap() as i64;
            assert_eq!(
                compare_plain(&fixture, a, b),
                (a <= b) as i64,
                "compare({}, {})",
                a,
                b
            );
        }
    }

    #[test]
    fn mismatched_operand_length_is_rejected() {
        let fixture = comparison_fixture();
        let other_config = ProtocolConfig {
            l: 10,
            ..test_protocol_config()
        };
        let dgk_config = crate::sdk::config::DgkConfig {
            key_bits: 256,
            t: 17,
            l: 16,
            ..dgk_tests::test_config(false)
        };
        let (dgk_pk, dgk_sk) = Dgk::generate_keys(&dgk_config).unwrap();
        let dgk = Arc::new(Dgk::from_keypair(dgk_pk, dgk_sk, &dgk_config).unwrap());
        // l = 10 passes the parameter validation against this DGK instance,
        // so only the endpoint handshake catches the mismatch
        let client =
            SecureComparisonClient::new(fixture.paillier.clone(), dgk, &other_config).unwrap();
        assert!(matches!(
            client.set_server(&fixture.server),
            Err(DuetError::InvalidParameter(_))
        ));
    }
}
