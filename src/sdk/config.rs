//! Structured configuration for the cryptosystems and the interactive
//! protocols. Every knob has a conservative default; [Config::validate]
//! rejects combinations that violate the documented parameter constraints.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{
    constants::*,
    sdk::api::{DuetError, DuetResult},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaillierConfig {
    /// bit length of the modulus n
    pub key_bits: usize,
    pub miller_rabin_rounds: usize,
    pub randomizer_cache_capacity: usize,
}

impl Default for PaillierConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            miller_rabin_rounds: DEFAULT_MILLER_RABIN_ROUNDS,
            randomizer_cache_capacity: DEFAULT_RANDOMIZER_CACHE_CAPACITY,
        }
    }
}

impl PaillierConfig {
    pub fn validate(&self) -> DuetResult<()> {
        if self.key_bits < 16 || self.key_bits % 2 != 0 {
            error!("paillier key_bits {} too small or odd", self.key_bits);
            return Err(DuetError::InvalidParameter(
                "paillier key length must be even and at least 16 bits".to_string(),
            ));
        }
        validate_common(self.miller_rabin_rounds, self.randomizer_cache_capacity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DgkConfig {
    /// bit length of the modulus n
    pub key_bits: usize,
    /// bit length of the secret primes vp, vq
    pub t: usize,
    /// bit length of the protocol operands; the plaintext space holds l + 2 bits
    pub l: usize,
    /// populate the table required for full decryption (the zero test never needs it)
    pub precompute_decryption_map: bool,
    pub miller_rabin_rounds: usize,
    pub randomizer_cache_capacity: usize,
}

impl Default for DgkConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            t: DEFAULT_DGK_T,
            l: DEFAULT_DGK_L,
            precompute_decryption_map: false,
            miller_rabin_rounds: DEFAULT_MILLER_RABIN_ROUNDS,
            randomizer_cache_capacity: DEFAULT_RANDOMIZER_CACHE_CAPACITY,
        }
    }
}

impl DgkConfig {
    pub fn validate(&self) -> DuetResult<()> {
        if self.l < 8 || self.l > 32 {
            error!("dgk l parameter {} outside [8, 32]", self.l);
            return Err(DuetError::InvalidParameter(
                "the l parameter must obey 8 <= l <= 32".to_string(),
            ));
        }
        if self.t <= self.l {
            return Err(DuetError::InvalidParameter(
                "parameter t must be greater than l".to_string(),
            ));
        }
        if self.key_bits <= self.t {
            return Err(DuetError::InvalidParameter(
                "the key length must be greater than t".to_string(),
            ));
        }
        if self.key_bits % 2 != 0 {
            return Err(DuetError::InvalidParameter(
                "the key length must be even".to_string(),
            ));
        }
        if self.key_bits / 2 < self.l + self.t + 10 {
            return Err(DuetError::InvalidParameter(
                "choose key length, l, t such that keyLength / 2 >= l + t + 10".to_string(),
            ));
        }
        validate_common(self.miller_rabin_rounds, self.randomizer_cache_capacity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkamotoUchiyamaConfig {
    /// bit length of the modulus n = p^2 q
    pub key_bits: usize,
    /// bit length of the prime t dividing p - 1
    pub t_bits: usize,
    /// public message-space bound (in bits) used by instances without the
    /// secret key; must stay below the bit length of p
    pub message_space_bits: usize,
    pub miller_rabin_rounds: usize,
    pub randomizer_cache_capacity: usize,
}

impl Default for OkamotoUchiyamaConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            t_bits: DEFAULT_OU_T_BITS,
            message_space_bits: DEFAULT_OU_MESSAGE_SPACE_BITS,
            miller_rabin_rounds: DEFAULT_MILLER_RABIN_ROUNDS,
            randomizer_cache_capacity: DEFAULT_RANDOMIZER_CACHE_CAPACITY,
        }
    }
}

impl OkamotoUchiyamaConfig {
    pub fn validate(&self) -> DuetResult<()> {
        if self.t_bits + 2 > self.key_bits / 3 {
            error!(
                "ou t_bits {} leaves no room below keyLength / 3 = {}",
                self.t_bits,
                self.key_bits / 3
            );
            return Err(DuetError::InvalidParameter(
                "the key length must be larger than 3 t".to_string(),
            ));
        }
        if self.message_space_bits >= self.key_bits / 3 {
            return Err(DuetError::InvalidParameter(
                "the public message space must be smaller than p".to_string(),
            ));
        }
        validate_common(self.miller_rabin_rounds, self.randomizer_cache_capacity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElGamalConfig {
    /// bit length of the prime modulus p
    pub key_bits: usize,
    /// bit length of the large prime factor q of p - 1
    pub large_prime_bits: usize,
    /// the signed message space is the pair of windows (-2^t, 2^t) around 0 and q
    pub message_space_threshold_bits: usize,
    /// populate the table required for full decryption (the zero test never needs it)
    pub precompute_decryption_map: bool,
    pub miller_rabin_rounds: usize,
    pub randomizer_cache_capacity: usize,
}

impl Default for ElGamalConfig {
    fn default() -> Self {
        Self {
            key_bits: DEFAULT_KEY_BITS,
            large_prime_bits: DEFAULT_ELGAMAL_LARGE_PRIME_BITS,
            message_space_threshold_bits: DEFAULT_ELGAMAL_THRESHOLD_BITS,
            precompute_decryption_map: false,
            miller_rabin_rounds: DEFAULT_MILLER_RABIN_ROUNDS,
            randomizer_cache_capacity: DEFAULT_RANDOMIZER_CACHE_CAPACITY,
        }
    }
}

impl ElGamalConfig {
    pub fn validate(&self) -> DuetResult<()> {
        if self.large_prime_bits >= self.key_bits {
            error!(
                "elgamal large_prime_bits {} >= key_bits {}",
                self.large_prime_bits, self.key_bits
            );
            return Err(DuetError::InvalidParameter(
                "choose a prime factor size smaller than the key length".to_string(),
            ));
        }
        if self.message_space_threshold_bits + 1 >= self.large_prime_bits {
            return Err(DuetError::InvalidParameter(
                "the two message-space windows must fit inside [0, q)".to_string(),
            ));
        }
        validate_common(self.miller_rabin_rounds, self.randomizer_cache_capacity)
    }
}

/// Parameters shared by the interactive protocols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// bit length of protocol operands
    pub l: usize,
    /// statistical security parameter bounding blinding leakage
    pub kappa: usize,
    pub blinding_cache_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            l: DEFAULT_DGK_L,
            kappa: DEFAULT_KAPPA,
            blinding_cache_capacity: DEFAULT_BLINDING_CACHE_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> DuetResult<()> {
        if self.l == 0 {
            return Err(DuetError::InvalidParameter(
                "protocol operand length must be positive".to_string(),
            ));
        }
        if self.kappa < 2 {
            return Err(DuetError::InvalidParameter(
                "kappa must be at least 2".to_string(),
            ));
        }
        if self.blinding_cache_capacity == 0 {
            return Err(DuetError::InvalidParameter(
                "blinding cache capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The blinded values handled by the comparison protocols must fit below
    /// the positive/negative boundary of the Paillier message space.
    pub fn validate_against_modulus_bits(&self, modulus_bits: usize) -> DuetResult<()> {
        self.validate()?;
        if self.l + self.kappa + 4 > modulus_bits {
            error!(
                "operand length {} + kappa {} does not fit a {}-bit message space",
                self.l, self.kappa, modulus_bits
            );
            return Err(DuetError::InvalidParameter(
                "blinded operands do not fit the message space".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything in one record, for deployments that configure the whole stack
/// at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub paillier: PaillierConfig,
    pub dgk: DgkConfig,
    pub okamoto_uchiyama: OkamotoUchiyamaConfig,
    pub elgamal: ElGamalConfig,
    pub protocol: ProtocolConfig,
}

impl Config {
    pub fn validate(&self) -> DuetResult<()> {
        self.paillier.validate()?;
        self.dgk.validate()?;
        self.okamoto_uchiyama.validate()?;
        self.elgamal.validate()?;
        self.protocol.validate()?;
        if self.protocol.l > self.dgk.l {
            return Err(DuetError::InvalidParameter(
                "protocol operand length exceeds the DGK plaintext space".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_common(miller_rabin_rounds: usize, cache_capacity: usize) -> DuetResult<()> {
    if miller_rabin_rounds == 0 {
        return Err(DuetError::InvalidParameter(
            "at least one Miller-Rabin round is required".to_string(),
        ));
    }
    if cache_capacity == 0 {
        return Err(DuetError::InvalidParameter(
            "randomizer cache capacity must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn dgk_constraints() {
        let mut config = DgkConfig::default();
        config.l = 7;
        assert!(matches!(
            config.validate(),
            Err(DuetError::InvalidParameter(_))
        ));

        let mut config = DgkConfig::default();
        config.t = config.l;
        assert!(config.validate().is_err());

        let mut config = DgkConfig::default();
        config.key_bits = 2 * (config.l + config.t + 9);
        assert!(config.validate().is_err());

        let mut config = DgkConfig {
            key_bits: 256,
            t: 10,
            l: 8,
            ..DgkConfig::default()
        };
        config.validate().unwrap();
        config.key_bits = 255;
        assert!(config.validate().is_err());
    }

    #[test]
    fn protocol_constraints() {
        let config = ProtocolConfig {
            l: 16,
            kappa: 40,
            blinding_cache_capacity: 8,
        };
        config.validate_against_modulus_bits(1024).unwrap();
        assert!(config.validate_against_modulus_bits(32).is_err());
    }
}
