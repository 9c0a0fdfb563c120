//! Batched secure comparison against a public threshold.
//!
//! Many `l`-bit values are compared to one threshold `delta` inside a
//! single Paillier ciphertext. Each operand `v_i` rides in a bucket of
//! `W = l + 2` bits holding `2 d_i` with `d_i = 2^l + v_i - delta`; the
//! doubling keeps the bucket LSB clear so the carry from the bucket below
//! cannot disturb the payload. The Server adds a precomputed "partial D"
//! constant, blinds the whole packing with one wide `r`, and the PSP
//! decrypts and splits the blinded sum back into buckets. Per bucket, the
//! MSB of `2 d_i` (the `v_i >= delta` indicator) is recovered as the XOR
//! of the two parties' MSB shares and a borrow, where the borrow comes
//! out of a bitwise DGK evaluation of the bucket's low `l + 1` bits and
//! every share is hidden under a fair coin.

use std::sync::{Arc, Mutex, Weak};

use tracing::error;

use crate::{
    crypto_tools::{
        bigint::BigInt,
        ciphertext::Ciphertext,
        dgk::Dgk,
        paillier::Paillier,
        provider::CryptoProvider,
        rng,
    },
    protocols::blinding::{BlindingFactorCache, PackedComparisonBlindingFactor},
    sdk::{
        api::{DuetError, DuetResult},
        config::ProtocolConfig,
    },
};

pub struct PackedComparisonServer {
    paillier: Arc<Paillier>,
    dgk: Arc<Dgk>,
    l: usize,
    /// bucket width, `l + 2`
    bucket_bits: usize,
    /// comparisons carried by one ciphertext
    buckets_per_ciphertext: usize,
    threshold: BigInt,
    /// `[sum_i 2 (2^l - delta) 2^(i W)]`
    encrypted_partial_d: Ciphertext,
    blinding_factors: Mutex<BlindingFactorCache<PackedComparisonBlindingFactor>>,
    client: Mutex<Weak<PackedComparisonClient>>,
}

impl PackedComparisonServer {
    pub fn new(
        paillier: Arc<Paillier>,
        dgk: Arc<Dgk>,
        threshold: BigInt,
        config: &ProtocolConfig,
    ) -> DuetResult<Self> {
        config.validate()?;
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
        let two_pow_l = BigInt::one() << config.l;
        if threshold.is_negative() || threshold >= two_pow_l {
            return Err(DuetError::InvalidParameter(
                "the threshold must be an l-bit value".to_string(),
            ));
        }

        let bucket_bits = config.l + 2;
        // the blinded packing must stay kappa bits hidden and strictly
        // below the positive/negative boundary
        let usable_bits = paillier
            .message_space_bits()
            .saturating_sub(config.kappa + 3);
        let buckets_per_ciphertext = usable_bits / bucket_bits;
        if buckets_per_ciphertext == 0 {
            error!("no packed bucket fits the Paillier message space");
            return Err(DuetError::InvalidParameter(
                "no bucket fits the message space".to_string(),
            ));
        }

        // [partial D] = [sum_i (2^(l+2))^i 2 (2^l - delta)]
        let twice_two_pow_l_minus_delta = (&two_pow_l - &threshold) * BigInt::two();
        let mut partial_d = BigInt::zero();
        for i in 0..buckets_per_ciphertext {
            partial_d = partial_d + (&twice_two_pow_l_minus_delta << (i * bucket_bits));
        }
        let encrypted_partial_d = paillier.encrypt_nonrandom(&partial_d)?;

        let blinding_factors = BlindingFactorCache::new(config.blinding_cache_capacity, || {
            PackedComparisonBlindingFactor::generate(
                &paillier,
                bucket_bits,
                buckets_per_ciphertext,
                config.kappa,
            )
        })?;

        Ok(Self {
            paillier,
            dgk,
            l: config.l,
            bucket_bits,
            buckets_per_ciphertext,
            threshold,
            encrypted_partial_d,
            blinding_factors: Mutex::new(blinding_factors),
            client: Mutex::new(Weak::new()),
        })
    }

    pub fn set_client(&self, client: &Arc<PackedComparisonClient>) {
        *self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(client);
    }

    pub fn operand_bits(&self) -> usize {
        self.l
    }

    pub fn bucket_bits(&self) -> usize {
        self.bucket_bits
    }

    pub fn buckets_per_ciphertext(&self) -> usize {
        self.buckets_per_ciphertext
    }

    pub fn threshold(&self) -> &BigInt {
        &self.threshold
    }

    /// Pack `2 v_i` at stride `W` and encrypt each full group. Returns the
    /// packed ciphertexts and the operand count in the last one.
    pub fn pack_operands(&self, values: &[BigInt]) -> DuetResult<(Vec<Ciphertext>, usize)> {
        if values.is_empty() {
            return Err(DuetError::InvalidParameter("nothing to pack".to_string()));
        }
        let two_pow_l = BigInt::one() << self.l;
        let mut output = Vec::with_capacity(values.len().div_ceil(self.buckets_per_ciphertext));
        let mut packed = BigInt::zero();
        let mut count = 0usize;

        for value in values {
            if value.is_negative() || value >= &two_pow_l {
                return Err(DuetError::InvalidParameter(
                    "packed operands must be l-bit values".to_string(),
                ));
            }
            if count == self.buckets_per_ciphertext {
                output.push(self.paillier.encrypt(&packed)?);
                packed = BigInt::zero();
                count = 0;
            }
            packed = packed + ((value * BigInt::two()) << (count * self.bucket_bits));
            count += 1;
        }
        output.push(self.paillier.encrypt(&packed)?);

        Ok((output, count))
    }

    /// Compare every packed operand to the threshold. Returns one Paillier
    /// encryption of the indicator `v_i >= delta` per operand, in order.
    pub fn compare(
        &self,
        packed_values: &[Ciphertext],
        count_in_last: usize,
    ) -> DuetResult<Vec<Ciphertext>> {
        if packed_values.is_empty()
            || count_in_last == 0
            || count_in_last > self.buckets_per_ciphertext
        {
            return Err(DuetError::InvariantViolation(
                "unexpected number of packed buckets".to_string(),
            ));
        }
        let client = self.client()?;

        let mut indicators =
            Vec::with_capacity((packed_values.len() - 1) * self.buckets_per_ciphertext + count_in_last);
        for (index, packed) in packed_values.iter().enumerate() {
            let d = self.paillier.add(packed, &self.encrypted_partial_d)?;

            let factor = self
                .blinding_factors
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop();
            let z = self
                .paillier
                .randomize(&self.paillier.add(&d, &factor.encrypted_r)?)?;

            let bucket_count = if index < packed_values.len() - 1 {
                self.buckets_per_ciphertext
            } else {
                count_in_last
            };

            client.unpack_blinded_sum(&z, bucket_count)?;

            for i in 0..bucket_count {
                client.select_bucket(i)?;
                indicators.push(self.bucket_msb(&factor.bucket_shares[i], &client)?);
            }
        }

        Ok(indicators)
    }

    /// Recover the encrypted MSB of one bucket of `D` from the Server's
    /// blinder share and the PSP's blinded share:
    /// `msb(2 d_i) = msb(z_i) xor msb(r_i) xor borrow`.
    fn bucket_msb(
        &self,
        r_share: &BigInt,
        client: &Arc<PackedComparisonClient>,
    ) -> DuetResult<Ciphertext> {
        let coin = rng::coin();
        let borrow_share = self.borrow_share(r_share, coin, client)?;
        let borrow_share = self.dgk.randomize(&borrow_share)?;

        // PSP's share: msb(z_i) xor (borrow xor coin)
        let msb_share = client.msb_xor_share(&borrow_share)?;

        // this party's share: msb(r_i) xor coin
        let r_msb = r_share.bit(self.bucket_bits - 1)?;
        if r_msb != coin {
            self.paillier
                .sub(&self.paillier.encrypted_one(false)?, &msb_share)
        } else {
            Ok(msb_share)
        }
    }

    /// Bitwise evaluation of "is the blinder share greater than the
    /// blinded share?" over the low `l + 1` bucket bits, blinded by
    /// `coin`. Walks the bits least significant first
    /// with the accumulator `t_{i+1} = (1 - (a_i - b_i)^2) t_i + a_i (1 - b_i)`
    /// where `a` is this party's share and `b` the PSP's; each
    /// intermediate crossing the wire hides under its own fair coin.
    fn borrow_share(
        &self,
        r_share: &BigInt,
        coin: bool,
        client: &Arc<PackedComparisonClient>,
    ) -> DuetResult<Ciphertext> {
        let one = self.dgk.encrypted_one(false)?;
        let low_bits = self.bucket_bits - 1;

        let b0 = client.bucket_bit(0)?;
        let mut t = if r_share.bit(0)? {
            self.dgk.sub(&one, &b0)?
        } else {
            self.dgk.encrypted_zero(false)?
        };

        for i in 1..low_bits {
            let step_coin = rng::coin();
            let tau = if step_coin {
                self.dgk.sub(&one, &t)?
            } else {
                t.clone()
            };
            let tau = self.dgk.randomize(&tau)?;

            // [t b_i], unblinded back if the coin flipped tau
            let mut tb = client.masked_and(&tau, i)?;
            let bi = client.bucket_bit(i)?;
            if step_coin {
                tb = self.dgk.sub(&bi, &tb)?;
            }

            t = if r_share.bit(i)? {
                self.dgk.add(&tb, &self.dgk.sub(&one, &bi)?)?
            } else {
                self.dgk.sub(&t, &tb)?
            };
        }

        if coin {
            self.dgk.sub(&one, &t)
        } else {
            Ok(t)
        }
    }

    fn client(&self) -> DuetResult<Arc<PackedComparisonClient>> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upgrade()
            .ok_or_else(|| {
                error!("the packed comparison client endpoint is gone");
                DuetError::InvariantViolation("the client endpoint is gone".to_string())
            })
    }
}

/// PSP side of the packed comparison. Holds the unpacked blinded buckets
/// between the decryption exchange and the per-bucket evaluations.
pub struct PackedComparisonClient {
    paillier: Arc<Paillier>,
    dgk: Arc<Dgk>,
    bucket_bits: usize,
    buckets: Mutex<Vec<BigInt>>,
    selected: Mutex<Option<BigInt>>,
}

impl PackedComparisonClient {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        config.validate()?;
        Ok(Self {
            paillier,
            dgk,
            bucket_bits: config.l + 2,
            buckets: Mutex::new(Vec::new()),
            selected: Mutex::new(None),
        })
    }

    /// Both parties must agree on the bucket geometry.
    pub fn set_server(&self, server: &Arc<PackedComparisonServer>) -> DuetResult<()> {
        if self.bucket_bits != server.bucket_bits() {
            error!(
                "packed comparison endpoints disagree on the bucket width: {} vs {}",
                self.bucket_bits,
                server.bucket_bits()
            );
            return Err(DuetError::InvalidParameter(
                "endpoints disagree on the bucket width".to_string(),
            ));
        }
        Ok(())
    }

    /// Decrypt the blinded packing and split it into bucket shares.
    pub(crate) fn unpack_blinded_sum(&self, z: &Ciphertext, bucket_count: usize) -> DuetResult<()> {
        if !self.paillier.validate_ciphertext(z) {
            error!("blinded packing is not a valid ciphertext");
            return Err(DuetError::InvariantViolation(
                "blinded packing is not a valid ciphertext".to_string(),
            ));
        }
        let plaintext = self.paillier.decrypt(z)?;
        if plaintext.is_negative() {
            error!("blinded packing crossed the signed boundary");
            return Err(DuetError::InvariantViolation(
                "blinded packing crossed the signed boundary".to_string(),
            ));
        }

        let bucket_space = BigInt::one() << self.bucket_bits;
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets.clear();
        for i in 0..bucket_count {
            buckets.push((&plaintext >> (i * self.bucket_bits)) % &bucket_space);
        }
        Ok(())
    }

    /// Select which bucket share the following bitwise exchange works on.
    pub(crate) fn select_bucket(&self, index: usize) -> DuetResult<()> {
        let buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let share = buckets.get(index).cloned().ok_or_else(|| {
            error!("bucket {} was never unpacked", index);
            DuetError::InvariantViolation("bucket index out of range".to_string())
        })?;
        *self
            .selected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(share);
        Ok(())
    }

    /// DGK encryption of bit `index` of the selected bucket share.
    pub(crate) fn bucket_bit(&self, index: usize) -> DuetResult<Ciphertext> {
        let share = self.selected_share()?;
        self.dgk.encrypt(&BigInt::from(share.bit(index)? as u8))
    }

    /// `[tau b_index]`: `[0]` when the bit is clear, `tau` re-randomized
    /// otherwise.
    pub(crate) fn masked_and(&self, tau: &Ciphertext, index: usize) -> DuetResult<Ciphertext> {
        let share = self.selected_share()?;
        let result = if share.bit(index)? {
            tau.clone()
        } else {
            self.dgk.encrypted_zero(false)?
        };
        self.dgk.randomize(&result)
    }

    /// Paillier encryption of `msb(z_i) xor Dec(borrow_share)`, using the
    /// DGK zero test instead of a table lookup.
    pub(crate) fn msb_xor_share(&self, borrow_share: &Ciphertext) -> DuetResult<Ciphertext> {
        let share = self.selected_share()?;
        let borrow_bit = !self.dgk.is_encrypted_zero(borrow_share)?;
        let msb = share.bit(self.bucket_bits - 1)?;
        if msb != borrow_bit {
            self.paillier.encrypted_one(true)
        } else {
            self.paillier.encrypted_zero(true)
        }
    }

    fn selected_share(&self) -> DuetResult<BigInt> {
        self.selected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| {
                error!("bucket evaluation invoked before selection");
                DuetError::InvariantViolation("no bucket selected".to_string())
            })
    }
}
