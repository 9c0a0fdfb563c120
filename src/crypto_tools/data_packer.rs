//! Data packing.
//!
//! Packs a sequence of small non-negative integers into as few ciphertexts
//! as possible using fixed-width buckets with optional padding fields on
//! both sides of the payload. Homomorphic addition of packed ciphertexts
//! adds corresponding buckets independently, and scalar multiplication
//! scales every bucket, provided the chosen widths leave room so no bucket
//! overflows into its neighbor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    crypto_tools::{bigint::BigInt, provider::CryptoProvider},
    sdk::api::{DuetError, DuetResult},
};

/// One bucket: `(front_pad, data, back_pad)`, all non-negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBucket {
    pub front_padding: BigInt,
    pub data: BigInt,
    pub back_padding: BigInt,
}

pub struct DataPacker<P: CryptoProvider> {
    provider: Arc<P>,
    front_padding_bits: usize,
    data_bits: usize,
    back_padding_bits: usize,
    bucket_bits: usize,
    buckets_per_ciphertext: usize,
    front_padding_space: BigInt,
    data_space: BigInt,
    back_padding_space: BigInt,
}

impl<P: CryptoProvider> DataPacker<P> {
    pub fn new(
        provider: Arc<P>,
        data_bits: usize,
        front_padding_bits: usize,
        back_padding_bits: usize,
    ) -> DuetResult<Self> {
        if data_bits == 0 {
            return Err(DuetError::InvalidParameter(
                "the data field must be at least one bit wide".to_string(),
            ));
        }
        let bucket_bits = front_padding_bits + data_bits + back_padding_bits;
        // stay strictly below the positive/negative boundary so a full
        // packing never decrypts to a negative value
        let buckets_per_ciphertext = (provider.message_space_bits() - 1) / bucket_bits;
        if buckets_per_ciphertext == 0 {
            error!(
                "bucket width {} exceeds the {}-bit message space",
                bucket_bits,
                provider.message_space_bits()
            );
            return Err(DuetError::InvalidParameter(
                "a bucket does not fit the message space".to_string(),
            ));
        }

        Ok(Self {
            provider,
            front_padding_bits,
            data_bits,
            back_padding_bits,
            bucket_bits,
            buckets_per_ciphertext,
            front_padding_space: BigInt::one() << front_padding_bits,
            data_space: BigInt::one() << data_bits,
            back_padding_space: BigInt::one() << back_padding_bits,
        })
    }

    pub fn buckets_per_ciphertext(&self) -> usize {
        self.buckets_per_ciphertext
    }

    /// Concatenate the bit patterns of the buckets and encrypt each full
    /// group, ending with a final, possibly partial group.
    pub fn pack(&self, input: &[DataBucket]) -> DuetResult<Vec<P::Ciphertext>> {
        if input.is_empty() {
            return Err(DuetError::InvalidParameter(
                "nothing to pack".to_string(),
            ));
        }

        let mut output = Vec::with_capacity(input.len().div_ceil(self.buckets_per_ciphertext));
        let mut packed_buckets = BigInt::zero();
        let mut packed_bucket_counter = 0usize;

        for bucket in input {
            self.validate_bucket(bucket)?;

            if packed_bucket_counter == self.buckets_per_ciphertext {
                output.push(self.provider.encrypt(&packed_buckets)?);
                packed_buckets = BigInt::zero();
                packed_bucket_counter = 0;
            }

            let offset = packed_bucket_counter * self.bucket_bits;
            if self.front_padding_bits > 0 {
                packed_buckets = packed_buckets + (&bucket.front_padding << offset);
            }
            packed_buckets = packed_buckets + (&bucket.data << (offset + self.front_padding_bits));
            if self.back_padding_bits > 0 {
                packed_buckets = packed_buckets
                    + (&bucket.back_padding << (offset + self.front_padding_bits + self.data_bits));
            }

            packed_bucket_counter += 1;
        }

        // the last group may hold fewer buckets; the caller must remember
        // the total count to unpack
        output.push(self.provider.encrypt(&packed_buckets)?);

        Ok(output)
    }

    /// Decrypt and extract `total_bucket_count` buckets by shift-and-mask.
    pub fn unpack(
        &self,
        input: &[P::Ciphertext],
        total_bucket_count: usize,
    ) -> DuetResult<Vec<DataBucket>> {
        let capacity = input.len() * self.buckets_per_ciphertext;
        let floor = input.len().saturating_sub(1) * self.buckets_per_ciphertext;
        if total_bucket_count == 0 || total_bucket_count > capacity || total_bucket_count <= floor {
            error!(
                "cannot unpack {} buckets from {} ciphertexts holding up to {} each",
                total_bucket_count,
                input.len(),
                self.buckets_per_ciphertext
            );
            return Err(DuetError::InvariantViolation(
                "unexpected number of packed buckets".to_string(),
            ));
        }

        let mut output = Vec::with_capacity(total_bucket_count);
        for ciphertext in input {
            let mut packed_buckets = self.provider.decrypt(ciphertext)?;

            for _ in 0..self.buckets_per_ciphertext {
                let mut bucket = DataBucket::default();

                if self.front_padding_bits > 0 {
                    bucket.front_padding = &packed_buckets % &self.front_padding_space;
                    packed_buckets = packed_buckets >> self.front_padding_bits;
                }

                bucket.data = &packed_buckets % &self.data_space;
                packed_buckets = packed_buckets >> self.data_bits;

                if self.back_padding_bits > 0 {
                    bucket.back_padding = &packed_buckets % &self.back_padding_space;
                    packed_buckets = packed_buckets >> self.back_padding_bits;
                }

                output.push(bucket);
                if output.len() == total_bucket_count {
                    return Ok(output);
                }
            }
        }

        // unreachable thanks to the count check above, but mirror the
        // failure anyway
        Err(DuetError::InvariantViolation(
            "unexpected number of packed buckets".to_string(),
        ))
    }

    /// Bucketwise homomorphic addition.
    pub fn add(
        &self,
        lhs: &[P::Ciphertext],
        rhs: &[P::Ciphertext],
    ) -> DuetResult<Vec<P::Ciphertext>> {
        if lhs.len() != rhs.len() {
            return Err(DuetError::InvariantViolation(
                "packed operands differ in length".to_string(),
            ));
        }
        lhs.iter()
            .zip(rhs.iter())
            .map(|(l, r)| self.provider.add(l, r))
            .collect()
    }

    /// Scale every bucket by the plaintext `factor`.
    pub fn mul_plain(
        &self,
        lhs: &[P::Ciphertext],
        factor: &BigInt,
    ) -> DuetResult<Vec<P::Ciphertext>> {
        lhs.iter()
            .map(|l| self.provider.mul_plain(l, factor))
            .collect()
    }

    fn validate_bucket(&self, bucket: &DataBucket) -> DuetResult<()> {
        let fits = |value: &BigInt, space: &BigInt| !value.is_negative() && value < space;
        if !fits(&bucket.front_padding, &self.front_padding_space)
            || !fits(&bucket.data, &self.data_space)
            || !fits(&bucket.back_padding, &self.back_padding_space)
        {
            error!("bucket value out of range for the declared widths");
            return Err(DuetError::InvalidParameter(
                "bucket value out of range".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_tools::paillier::{tests::test_instances, Paillier};

    fn bucket(front: i64, data: i64, back: i64) -> DataBucket {
        DataBucket {
            front_padding: BigInt::from(front),
            data: BigInt::from(data),
            back_padding: BigInt::from(back),
        }
    }

    fn packer(provider: Arc<Paillier>) -> DataPacker<Paillier> {
        DataPacker::new(provider, 4, 1, 1).unwrap()
    }

    #[test]
    fn pack_unpack_identity() {
        let (keyed, _) = test_instances();
        let packer = packer(Arc::new(keyed));

        let buckets: Vec<_> = (0..30).map(|i| bucket(i % 2, i % 16, 1)).collect();
        let packed = packer.pack(&buckets).unwrap();
        assert!(packed.len() > 0);
        assert_eq!(packer.unpack(&packed, buckets.len()).unwrap(), buckets);
    }

    #[test]
    fn homomorphic_bucket_arithmetic() {
        let (keyed, _) = test_instances();
        let provider = Arc::new(keyed);
        let packer = packer(provider.clone());

        let bucket_count = 30;
        let lhs: Vec<_> = (0..bucket_count).map(|_| bucket(1, 2, 1)).collect();
        let rhs: Vec<_> = (0..bucket_count).map(|_| bucket(0, 3, 0)).collect();

        let packed_lhs = packer.pack(&lhs).unwrap();
        let packed_rhs = packer.pack(&rhs).unwrap();

        let sum = packer.add(&packed_lhs, &packed_rhs).unwrap();
        for b in packer.unpack(&sum, bucket_count).unwrap() {
            assert_eq!(b, bucket(1, 5, 1));
        }

        let doubled = packer.mul_plain(&packed_rhs, &BigInt::two()).unwrap();
        for b in packer.unpack(&doubled, bucket_count).unwrap() {
            assert_eq!(b, bucket(0, 6, 0));
        }
    }

    #[test]
    fn unpack_count_mismatch_is_rejected() {
        let (keyed, _) = test_instances();
        let packer = packer(Arc::new(keyed));

        let buckets: Vec<_> = (0..5).map(|_| bucket(0, 7, 0)).collect();
        let packed = packer.pack(&buckets).unwrap();

        assert!(matches!(
            packer.unpack(&packed, buckets.len() + packer.buckets_per_ciphertext()),
            Err(DuetError::InvariantViolation(_))
        ));
        assert!(packer.unpack(&packed, 0).is_err());
    }

    #[test]
    fn out_of_range_bucket_is_rejected() {
        let (keyed, _) = test_instances();
        let packer = packer(Arc::new(keyed));
        assert!(matches!(
            packer.pack(&[bucket(0, 16, 0)]),
            Err(DuetError::InvalidParameter(_))
        ));
        assert!(packer.pack(&[bucket(2, 0, 0)]).is_err());
    }

    #[test]
    fn operand_length_mismatch_is_rejected() {
        let (keyed, _) = test_instances();
        let provider = Arc::new(keyed);
        let packer = packer(provider.clone());
        let a = packer.pack(&[bucket(0, 1, 0)]).unwrap();
        assert!(packer.add(&a, &[]).is_err());
    }
}
