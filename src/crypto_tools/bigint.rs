//! Arbitrary-precision signed integers for the cryptosystems and protocols.
//!
//! A thin wrapper around [num_bigint::BigInt] that pins down the arithmetic
//! conventions the rest of the crate relies on: division truncates toward
//! zero, `%` always yields a non-negative remainder for a positive modulus,
//! modular exponentiation accepts negative exponents by going through the
//! modular inverse, and bit access is only defined for non-negative values.

use std::{
    fmt,
    ops::{Add, Div, Mul, Neg, Rem, Shl, Shr, Sub},
};

use num_bigint::BigInt as Inner;
use num_integer::Integer as _;
use num_traits::{FromPrimitive, Num, One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::{
    crypto_tools::rng,
    sdk::api::{DuetError, DuetResult},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BigInt(Inner);

impl BigInt {
    pub fn zero() -> Self {
        Self(Inner::zero())
    }

    pub fn one() -> Self {
        Self(Inner::one())
    }

    pub fn two() -> Self {
        Self(Inner::from(2u8))
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self(inner)
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.0
    }

    /// Parse a base-`radix` string, `2 <= radix <= 36`.
    pub fn from_str_radix(s: &str, radix: u32) -> DuetResult<Self> {
        Inner::from_str_radix(s, radix).map(Self).map_err(|_| {
            DuetError::InvalidParameter(format!("cannot parse {:?} in base {}", s, radix))
        })
    }

    pub fn to_str_radix(&self, radix: u32) -> String {
        self.0.to_str_radix(radix)
    }

    /// Scale `value` by an arbitrary factor and round to the nearest integer.
    pub fn from_f64_scaled(value: f64, scale: f64) -> DuetResult<Self> {
        let scaled = value * scale;
        if !scaled.is_finite() {
            return Err(DuetError::InvalidParameter(
                "scaled value is not finite".to_string(),
            ));
        }
        Inner::from_f64(scaled.round())
            .map(Self)
            .ok_or_else(|| DuetError::InvalidParameter("unrepresentable double".to_string()))
    }

    /// Scale `value` by `10^digits`, then round to nearest or truncate.
    pub fn from_f64_digits(value: f64, digits: u32, truncate: bool) -> DuetResult<Self> {
        let scaled = value * 10f64.powi(digits as i32);
        if !scaled.is_finite() {
            return Err(DuetError::InvalidParameter(
                "scaled value is not finite".to_string(),
            ));
        }
        let scaled = if truncate { scaled.trunc() } else { scaled.round() };
        Inner::from_f64(scaled)
            .map(Self)
            .ok_or_else(|| DuetError::InvalidParameter("unrepresentable double".to_string()))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.0.is_one()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn is_even(&self) -> bool {
        self.0.is_even()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Bit length of the magnitude. Zero has length 0.
    pub fn bits(&self) -> usize {
        self.0.bits() as usize
    }

    /// Number of digits of the magnitude in the given base.
    pub fn size_in_base(&self, base: u32) -> usize {
        if base == 2 {
            return self.bits().max(1);
        }
        self.0.magnitude().to_str_radix(base).len()
    }

    /// Test bit `index`. Defined only for non-negative values.
    pub fn bit(&self, index: usize) -> DuetResult<bool> {
        if self.is_negative() {
            return Err(DuetError::InvariantViolation(
                "bit access on a negative integer".to_string(),
            ));
        }
        Ok((&self.0 >> index).is_odd())
    }

    /// Set bit `index` to 1. Defined only for non-negative values.
    pub fn set_bit(&mut self, index: usize) -> DuetResult<()> {
        if self.is_negative() {
            return Err(DuetError::InvariantViolation(
                "bit access on a negative integer".to_string(),
            ));
        }
        self.0 = &self.0 | (Inner::one() << index);
        Ok(())
    }

    pub fn pow(&self, exponent: usize) -> Self {
        Self(num_traits::pow(self.0.clone(), exponent))
    }

    /// `self^exponent mod modulus` with the result in `[0, modulus)`.
    /// A negative exponent goes through the modular inverse of the base and
    /// fails with [DuetError::InverseDoesNotExist] when that inverse does
    /// not exist.
    pub fn modpow(&self, exponent: &Self, modulus: &Self) -> DuetResult<Self> {
        if !modulus.0.is_positive() {
            return Err(DuetError::InvalidParameter(
                "modulus must be positive".to_string(),
            ));
        }
        if exponent.is_negative() {
            let inverse = self.invert(modulus)?;
            return Ok(Self(inverse.0.modpow(&(-&exponent.0), &modulus.0)));
        }
        Ok(Self(self.0.modpow(&exponent.0, &modulus.0)))
    }

    /// `self^-1 mod modulus`, or [DuetError::InverseDoesNotExist] when
    /// `gcd(self, modulus) != 1`.
    pub fn invert(&self, modulus: &Self) -> DuetResult<Self> {
        self.0
            .modinv(&modulus.0)
            .map(Self)
            .ok_or(DuetError::InverseDoesNotExist)
    }

    pub fn gcd(&self, other: &Self) -> Self {
        Self(self.0.gcd(&other.0))
    }

    pub fn lcm(&self, other: &Self) -> Self {
        Self(self.0.lcm(&other.0))
    }

    /// Miller-Rabin primality test with `rounds` random witnesses; the
    /// false-positive probability is at most `4^-rounds`.
    pub fn is_prime(&self, rounds: usize) -> bool {
        if self.0 < Inner::from(2u8) {
            return false;
        }
        for &p in SMALL_PRIMES {
            let p = Inner::from(p);
            if self.0 == p {
                return true;
            }
            if (&self.0 % &p).is_zero() {
                return false;
            }
        }

        // write self - 1 = d * 2^s with d odd
        let n_minus_one = &self.0 - Inner::one();
        let s = n_minus_one.trailing_zeros().unwrap_or(0) as usize;
        let d = &n_minus_one >> s;

        let witness_bound = Self(&self.0 - Inner::from(3u8));
        'witness: for _ in 0..rounds {
            let a = rng::uniform_below(&witness_bound) + Self::two();
            let mut x = a.0.modpow(&d, &self.0);
            if x.is_one() || x == n_minus_one {
                continue;
            }
            for _ in 1..s {
                x = x.modpow(&Inner::from(2u8), &self.0);
                if x == n_minus_one {
                    continue 'witness;
                }
            }
            return false;
        }
        true
    }

    /// The smallest probable prime strictly greater than `self`.
    pub fn next_prime(&self, rounds: usize) -> Self {
        let mut candidate = &self.0 + Inner::one();
        if candidate <= Inner::from(2u8) {
            return Self::two();
        }
        if candidate.is_even() {
            candidate += Inner::one();
        }
        loop {
            let wrapped = Self(candidate.clone());
            if wrapped.is_prime(rounds) {
                return wrapped;
            }
            candidate += Inner::from(2u8);
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    pub fn to_usize(&self) -> Option<usize> {
        self.0.to_usize()
    }
}

/// First primes, used to cheaply reject composite candidates before the
/// Miller-Rabin rounds.
const SMALL_PRIMES: &[u32] = &[
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191,
    193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! impl_from_machine_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for BigInt {
                fn from(value: $t) -> Self {
                    Self(Inner::from(value))
                }
            }
        )*
    };
}
impl_from_machine_int!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, usize, isize);

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $impl_fn:expr) => {
        impl $trait<&BigInt> for &BigInt {
            type Output = BigInt;
            fn $method(self, rhs: &BigInt) -> BigInt {
                let f: fn(&Inner, &Inner) -> Inner = $impl_fn;
                BigInt(f(&self.0, &rhs.0))
            }
        }
        impl $trait<BigInt> for BigInt {
            type Output = BigInt;
            fn $method(self, rhs: BigInt) -> BigInt {
                $trait::$method(&self, &rhs)
            }
        }
        impl $trait<&BigInt> for BigInt {
            type Output = BigInt;
            fn $method(self, rhs: &BigInt) -> BigInt {
                $trait::$method(&self, rhs)
            }
        }
        impl $trait<BigInt> for &BigInt {
            type Output = BigInt;
            fn $method(self, rhs: BigInt) -> BigInt {
                $trait::$method(self, &rhs)
            }
        }
    };
}

impl_binop!(Add, add, |a, b| a + b);
impl_binop!(Sub, sub, |a, b| a - b);
impl_binop!(Mul, mul, |a, b| a * b);
// division truncates toward zero
impl_binop!(Div, div, |a, b| a / b);
// the remainder is always non-negative for a positive modulus
impl_binop!(Rem, rem, |a, b| a.mod_floor(b));

impl Neg for &BigInt {
    type Output = BigInt;
    fn neg(self) -> BigInt {
        BigInt(-&self.0)
    }
}

impl Neg for BigInt {
    type Output = BigInt;
    fn neg(self) -> BigInt {
        BigInt(-self.0)
    }
}

impl Shl<usize> for &BigInt {
    type Output = BigInt;
    fn shl(self, rhs: usize) -> BigInt {
        BigInt(&self.0 << rhs)
    }
}

impl Shl<usize> for BigInt {
    type Output = BigInt;
    fn shl(self, rhs: usize) -> BigInt {
        BigInt(self.0 << rhs)
    }
}

impl Shr<usize> for &BigInt {
    type Output = BigInt;
    fn shr(self, rhs: usize) -> BigInt {
        BigInt(&self.0 >> rhs)
    }
}

impl Shr<usize> for BigInt {
    type Output = BigInt;
    fn shr(self, rhs: usize) -> BigInt {
        BigInt(self.0 >> rhs)
    }
}
