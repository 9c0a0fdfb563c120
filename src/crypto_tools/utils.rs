use crate::crypto_tools::bigint::BigInt;

/// Check if `x` is a member of the integers modulo `Z_n`
pub(crate) fn member_of_mod(x: &BigInt, n: &BigInt) -> bool {
    if x.is_negative() || x >= n {
        return false;
    }

    true
}

/// Check if `x` is a member of the multiplicative group `Z*_n`
pub(crate) fn member_of_mul_group(x: &BigInt, n: &BigInt) -> bool {
    if x < &BigInt::one() || x >= n {
        return false;
    }

    if !x.gcd(n).is_one() {
        return false;
    }

    true
}

/// Precomputed CRT terms for a modulus `n = p q`:
/// `q (q^-1 mod p)` and `p (p^-1 mod q)`.
#[derive(Debug, Clone)]
pub(crate) struct CrtTerms {
    pub q_times_q_inv_mod_p: BigInt,
    pub p_times_p_inv_mod_q: BigInt,
}

impl CrtTerms {
    /// Fails with [crate::sdk::api::DuetError::InverseDoesNotExist] when
    /// `gcd(p, q) != 1`.
    pub fn new(p: &BigInt, q: &BigInt) -> crate::sdk::api::DuetResult<Self> {
        Ok(Self {
            q_times_q_inv_mod_p: q * &q.invert(p)?,
            p_times_p_inv_mod_q: p * &p.invert(q)?,
        })
    }

    /// The unique `x mod n` with `x = a mod p` and `x = b mod q`.
    pub fn combine(&self, a: &BigInt, b: &BigInt, n: &BigInt) -> BigInt {
        (a * &self.q_times_q_inv_mod_p + b * &self.p_times_p_inv_mod_q) % n
    }
}
