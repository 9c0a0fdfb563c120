//! Two-party secure multiplication.
//!
//! The Server holds `[a]`, `[b]` and only the public key; the PSP holds
//! the private key. The Server blinds both operands, the PSP decrypts the
//! blinded pair and returns the encrypted product of the blinded values,
//! and the Server unblinds:
//!
//! `[a b] = [ã b̃] [a]^r2 [b]^r1 [-r1 r2]` with `ã = a - r1`, `b̃ = b - r2`.
//!
//! Neither side learns `a` or `b`; the blinding hides them
//! information-theoretically up to `2^-kappa`.

use std::sync::{Arc, Mutex, Weak};

use tracing::error;

use crate::{
    crypto_tools::provider::CryptoProvider,
    protocols::blinding::{BlindingFactorCache, MultiplicationBlindingFactor},
    sdk::{
        api::{DuetError, DuetResult},
        config::ProtocolConfig,
    },
};

pub struct SecureMultiplicationServer<P: CryptoProvider> {
    provider: Arc<P>,
    blinding_factors: Mutex<BlindingFactorCache<MultiplicationBlindingFactor<P::Ciphertext>>>,
    client: Mutex<Weak<SecureMultiplicationClient<P>>>,
}

impl<P: CryptoProvider> SecureMultiplicationServer<P> {
    pub fn new(provider: Arc<P>, config: &ProtocolConfig) -> DuetResult<Self> {
        config.validate()?;
        // the blinded product must stay inside the signed message space
        if 2 * (config.l + config.kappa) + 2 > provider.message_space_bits() {
            error!(
                "blinded products of {}-bit operands do not fit a {}-bit message space",
                config.l,
                provider.message_space_bits()
            );
            return Err(DuetError::InvalidParameter(
                "blinded products do not fit the message space".to_string(),
            ));
        }

        let blinding_factors = BlindingFactorCache::new(config.blinding_cache_capacity, || {
            MultiplicationBlindingFactor::generate(provider.as_ref(), config.l, config.kappa)
        })?;

        Ok(Self {
            provider,
            blinding_factors: Mutex::new(blinding_factors),
            client: Mutex::new(Weak::new()),
        })
    }

    pub fn set_client(&self, client: &Arc<SecureMultiplicationClient<P>>) {
        *self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::downgrade(client);
    }

    /// `[a] x [b] -> [a b]`
    pub fn multiply(
        &self,
        lhs: &P::Ciphertext,
        rhs: &P::Ciphertext,
    ) -> DuetResult<P::Ciphertext> {
        let factor = self
            .blinding_factors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();

        let blinded_lhs = self.provider.add(lhs, &factor.encrypted_minus_r1)?;
        let blinded_rhs = self.provider.add(rhs, &factor.encrypted_minus_r2)?;

        let blinded_product = self.client()?.multiply(&blinded_lhs, &blinded_rhs)?;

        let output = self
            .provider
            .add(&blinded_product, &self.provider.mul_plain(lhs, &factor.r2)?)?;
        let output = self
            .provider
            .add(&output, &self.provider.mul_plain(rhs, &factor.r1)?)?;
        self.provider.add(&output, &factor.encrypted_minus_r1_r2)
    }

    fn client(&self) -> DuetResult<Arc<SecureMultiplicationClient<P>>> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .upgrade()
            .ok_or_else(|| {
                error!("the multiplication client endpoint is gone");
                DuetError::InvariantViolation("the client endpoint is gone".to_string())
            })
    }
}

pub struct SecureMultiplicationClient<P: CryptoProvider> {
    provider: Arc<P>,
}

impl<P: CryptoProvider> SecureMultiplicationClient<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Both parties must agree on the encryption key.
    pub fn set_server(&self, server: &Arc<SecureMultiplicationServer<P>>) -> DuetResult<()> {
        if self.provider.encryption_modulus() != server.provider.encryption_modulus() {
            error!("multiplication endpoints disagree on the encryption modulus");
            return Err(DuetError::InvalidParameter(
                "endpoints disagree on the encryption modulus".to_string(),
            ));
        }
        Ok(())
    }

    /// PSP side: decrypt the blinded operands and return their encrypted
    /// product.
    pub(crate) fn multiply(
        &self,
        lhs: &P::Ciphertext,
        rhs: &P::Ciphertext,
    ) -> DuetResult<P::Ciphertext> {
        let a = self.provider.decrypt(lhs)?;
        let b = self.provider.decrypt(rhs)?;
        self.provider.encrypt(&(a * b))
    }
}
