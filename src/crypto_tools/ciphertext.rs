//! Ciphertext containers.
//!
//! A ciphertext is an opaque group element carrying a shared reference to
//! its encryption modulus. A default-constructed ciphertext has no modulus
//! and may not participate in any operation. Two operands must carry the
//! same modulus; instances that hold equal moduli interoperate even when
//! the references differ.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    crypto_tools::bigint::BigInt,
    sdk::api::{DuetError, DuetResult},
};

/// Ciphertext of the single-component cryptosystems (Paillier, DGK,
/// Okamoto-Uchiyama).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    data: BigInt,
    modulus: Option<Arc<BigInt>>,
}

impl Ciphertext {
    pub(crate) fn new(data: BigInt, modulus: Arc<BigInt>) -> Self {
        Self {
            data,
            modulus: Some(modulus),
        }
    }

    pub fn data(&self) -> &BigInt {
        &self.data
    }

    pub(crate) fn modulus(&self) -> DuetResult<&Arc<BigInt>> {
        self.modulus.as_ref().ok_or_else(|| {
            error!("operation on a ciphertext without a modulus");
            DuetError::InvariantViolation("ciphertext has no modulus".to_string())
        })
    }

    fn common_modulus<'a>(&'a self, rhs: &'a Self) -> DuetResult<&'a Arc<BigInt>> {
        let lhs_modulus = self.modulus()?;
        let rhs_modulus = rhs.modulus()?;
        if !Arc::ptr_eq(lhs_modulus, rhs_modulus) && lhs_modulus != rhs_modulus {
            error!("mismatched ciphertext moduli");
            return Err(DuetError::InvariantViolation(
                "mismatched ciphertext moduli".to_string(),
            ));
        }
        Ok(lhs_modulus)
    }

    /// `[lhs + rhs] = lhs * rhs mod n`
    pub(crate) fn homomorphic_add(&self, rhs: &Self) -> DuetResult<Self> {
        let modulus = self.common_modulus(rhs)?;
        Ok(Self {
            data: (&self.data * &rhs.data) % modulus.as_ref(),
            modulus: Some(modulus.clone()),
        })
    }

    /// `[-c] = c^-1 mod n`
    pub(crate) fn homomorphic_neg(&self) -> DuetResult<Self> {
        let modulus = self.modulus()?;
        Ok(Self {
            data: self.data.invert(modulus)?,
            modulus: Some(modulus.clone()),
        })
    }

    /// `[lhs - rhs] = lhs * rhs^-1 mod n`
    pub(crate) fn homomorphic_sub(&self, rhs: &Self) -> DuetResult<Self> {
        self.homomorphic_add(&rhs.homomorphic_neg()?)
    }

    /// `[c * k] = c^k mod n`, `k != 0`
    pub(crate) fn homomorphic_mul_plain(&self, k: &BigInt) -> DuetResult<Self> {
        if k.is_zero() {
            error!("homomorphic multiplication by zero");
            return Err(DuetError::InvariantViolation(
                "the plaintext factor must not be zero".to_string(),
            ));
        }
        let modulus = self.modulus()?;
        Ok(Self {
            data: self.data.modpow(k, modulus)?,
            modulus: Some(modulus.clone()),
        })
    }

    /// Fold a fresh randomizer into the representation.
    pub(crate) fn randomized_with(&self, randomizer: &BigInt) -> DuetResult<Self> {
        let modulus = self.modulus()?;
        Ok(Self {
            data: (&self.data * randomizer) % modulus.as_ref(),
            modulus: Some(modulus.clone()),
        })
    }
}

/// Exponential-ElGamal ciphertext: a pair over `Z_p`, operated on
/// componentwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    x: BigInt,
    y: BigInt,
    modulus: Option<Arc<BigInt>>,
}

impl ElGamalCiphertext {
    pub(crate) fn new(x: BigInt, y: BigInt, modulus: Arc<BigInt>) -> Self {
        Self {
            x,
            y,
            modulus: Some(modulus),
        }
    }

    pub fn x(&self) -> &BigInt {
        &self.x
    }

    pub fn y(&self) -> &BigInt {
        &self.y
    }

    pub(crate) fn modulus(&self) -> DuetResult<&Arc<BigInt>> {
        self.modulus.as_ref().ok_or_else(|| {
            error!("operation on a ciphertext without a modulus");
            DuetError::InvariantViolation("ciphertext has no modulus".to_string())
        })
    }

    fn common_modulus<'a>(&'a self, rhs: &'a Self) -> DuetResult<&'a Arc<BigInt>> {
        let lhs_modulus = self.modulus()?;
        let rhs_modulus = rhs.modulus()?;
        if !Arc::ptr_eq(lhs_modulus, rhs_modulus) && lhs_modulus != rhs_modulus {
            error!("mismatched ciphertext moduli");
            return Err(DuetError::InvariantViolation(
                "mismatched ciphertext moduli".to_string(),
            ));
        }
        Ok(lhs_modulus)
    }

    pub(crate) fn homomorphic_add(&self, rhs: &Self) -> DuetResult<Self> {
        let modulus = self.common_modulus(rhs)?;
        Ok(Self {
            x: (&self.x * &rhs.x) % modulus.as_ref(),
            y: (&self.y * &rhs.y) % modulus.as_ref(),
            modulus: Some(modulus.clone()),
        })
    }

    pub(crate) fn homomorphic_neg(&self) -> DuetResult<Self> {
        let modulus = self.modulus()?;
        Ok(Self {
            x: self.x.invert(modulus)?,
            y: self.y.invert(modulus)?,
            modulus: Some(modulus.clone()),
        })
    }

    pub(crate) fn homomorphic_sub(&self, rhs: &Self) -> DuetResult<Self> {
        self.homomorphic_add(&rhs.homomorphic_neg()?)
    }

    pub(crate) fn homomorphic_mul_plain(&self, k: &BigInt) -> DuetResult<Self> {
        if k.is_zero() {
            error!("homomorphic multiplication by zero");
            return Err(DuetError::InvariantViolation(
                "the plaintext factor must not be zero".to_string(),
            ));
        }
        let modulus = self.modulus()?;
        Ok(Self {
            x: self.x.modpow(k, modulus)?,
            y: self.y.modpow(k, modulus)?,
            modulus: Some(modulus.clone()),
        })
    }

    pub(crate) fn randomized_with(&self, x: &BigInt, y: &BigInt) -> DuetResult<Self> {
        let modulus = self.modulus()?;
        Ok(Self {
            x: (&self.x * x) % modulus.as_ref(),
            y: (&self.y * y) % modulus.as_ref(),
            modulus: Some(modulus.clone()),
        })
    }
}
