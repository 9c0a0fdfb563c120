//! The common contract implemented by all four cryptosystems.

use crate::{crypto_tools::bigint::BigInt, sdk::api::DuetResult};

/// An additively homomorphic public-key cryptosystem.
///
/// An instance is built either from a keypair (decryption possible) or from
/// a public key alone (encryption and homomorphic operations only).
/// Plaintexts are signed: a negative `m` is represented inside the group as
/// `M - |m|` where `M` is the message-space upper bound, and decryption
/// maps values above [CryptoProvider::pos_neg_boundary] back to their
/// signed form.
pub trait CryptoProvider {
    type Ciphertext: Clone;

    /// Deterministic encryption. The result must be passed through
    /// [CryptoProvider::randomize] before leaving the local party.
    fn encrypt_nonrandom(&self, plaintext: &BigInt) -> DuetResult<Self::Ciphertext>;

    /// Re-randomize with the next value from the instance's randomizer
    /// cache. Preserves the plaintext.
    fn randomize(&self, ciphertext: &Self::Ciphertext) -> DuetResult<Self::Ciphertext>;

    /// Probabilistic encryption: deterministic encryption followed by
    /// re-randomization.
    fn encrypt(&self, plaintext: &BigInt) -> DuetResult<Self::Ciphertext> {
        let nonrandom = self.encrypt_nonrandom(plaintext)?;
        self.randomize(&nonrandom)
    }

    /// Requires the private key.
    fn decrypt(&self, ciphertext: &Self::Ciphertext) -> DuetResult<BigInt>;

    /// `Dec(add(a, b)) = Dec(a) + Dec(b) mod M`
    fn add(&self, lhs: &Self::Ciphertext, rhs: &Self::Ciphertext) -> DuetResult<Self::Ciphertext>;

    /// `Dec(neg(c)) = -Dec(c) mod M`
    fn neg(&self, ciphertext: &Self::Ciphertext) -> DuetResult<Self::Ciphertext>;

    fn sub(&self, lhs: &Self::Ciphertext, rhs: &Self::Ciphertext) -> DuetResult<Self::Ciphertext> {
        let negated = self.neg(rhs)?;
        self.add(lhs, &negated)
    }

    /// `Dec(mul_plain(c, k)) = Dec(c) * k mod M`, `k != 0`
    fn mul_plain(&self, lhs: &Self::Ciphertext, rhs: &BigInt) -> DuetResult<Self::Ciphertext>;

    fn message_space_upper(&self) -> &BigInt;

    fn pos_neg_boundary(&self) -> &BigInt;

    fn message_space_bits(&self) -> usize;

    fn encryption_modulus(&self) -> &BigInt;

    /// A precomputed `[0]`, optionally re-randomized on fetch.
    fn encrypted_zero(&self, randomized: bool) -> DuetResult<Self::Ciphertext>;

    /// A precomputed `[1]`, optionally re-randomized on fetch.
    fn encrypted_one(&self, randomized: bool) -> DuetResult<Self::Ciphertext>;

    /// Remap a signed plaintext into `[0, M)`.
    fn signed_to_group(&self, plaintext: &BigInt) -> BigInt {
        if plaintext.is_negative() {
            self.message_space_upper() + plaintext
        } else {
            plaintext.clone()
        }
    }

    /// Map a group value back to its signed form.
    fn group_to_signed(&self, value: BigInt) -> BigInt {
        if &value > self.pos_neg_boundary() {
            &value - self.message_space_upper()
        } else {
            value
        }
    }
}
