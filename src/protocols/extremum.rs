//! Tournament-style secure extremum selection.
//!
//! Adjacent pairs of an encrypted vector are ordered with the secure
//! comparison protocol and merged with the secure multiplication
//! protocol; odd leftovers pass through unchanged. `O(m)` comparisons and
//! multiplications in `ceil(log2 m)` rounds.

use std::sync::Arc;

use crate::{
    crypto_tools::{ciphertext::Ciphertext, dgk::Dgk, paillier::Paillier, provider::CryptoProvider},
    protocols::{
        comparison::{SecureComparisonClient, SecureComparisonServer},
        multiplication::{SecureMultiplicationClient, SecureMultiplicationServer},
    },
    sdk::{
        api::{DuetError, DuetResult},
        config::ProtocolConfig,
    },
};

enum Extremum {
    Minimum,
    Maximum,
}

pub struct SecureExtremumSelectionServer {
    paillier: Arc<Paillier>,
    comparison_server: Arc<SecureComparisonServer>,
    multiplication_server: Arc<SecureMultiplicationServer<Paillier>>,
}

impl SecureExtremumSelectionServer {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        Ok(Self {
            comparison_server: Arc::new(SecureComparisonServer::new(
                paillier.clone(),
                dgk,
                config,
            )?),
            multiplication_server: Arc::new(SecureMultiplicationServer::new(
                paillier.clone(),
                config,
            )?),
            paillier,
        })
    }

    pub fn set_client(&self, client: &Arc<SecureExtremumSelectionClient>) {
        self.comparison_server.set_client(client.comparison_client());
        self.multiplication_server
            .set_client(client.multiplication_client());
    }

    pub fn comparison_server(&self) -> &Arc<SecureComparisonServer> {
        &self.comparison_server
    }

    pub fn multiplication_server(&self) -> &Arc<SecureMultiplicationServer<Paillier>> {
        &self.multiplication_server
    }

    pub fn minimum(&self, items: &[Ciphertext]) -> DuetResult<Ciphertext> {
        self.select(items, Extremum::Minimum)
    }

    pub fn maximum(&self, items: &[Ciphertext]) -> DuetResult<Ciphertext> {
        self.select(items, Extremum::Maximum)
    }

    fn select(&self, items: &[Ciphertext], extremum: Extremum) -> DuetResult<Ciphertext> {
        if items.is_empty() {
            return Err(DuetError::InvariantViolation(
                "extremum of an empty vector".to_string(),
            ));
        }

        let mut current = items.to_vec();
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len() / 2 + current.len() % 2);

            for pair in current.chunks_exact(2) {
                // gamma = [v_i <= v_i+1]
                let gamma = self.comparison_server.compare(&pair[0], &pair[1])?;
                // minimum: gamma (v_i - v_i+1) + v_i+1
                // maximum: gamma (v_i+1 - v_i) + v_i
                let merged = match extremum {
                    Extremum::Minimum => self.paillier.add(
                        &self
                            .multiplication_server
                            .multiply(&gamma, &self.paillier.sub(&pair[0], &pair[1])?)?,
                        &pair[1],
                    )?,
                    Extremum::Maximum => self.paillier.add(
                        &self
                            .multiplication_server
                            .multiply(&gamma, &self.paillier.sub(&pair[1], &pair[0])?)?,
                        &pair[0],
                    )?,
                };
                next.push(merged);
            }

            if current.len() % 2 == 1 {
                next.push(current[current.len() - 1].clone());
            }
            current = next;
        }

        Ok(current.swap_remove(0))
    }
}

pub struct SecureExtremumSelectionClient {
    comparison_client: Arc<SecureComparisonClient>,
    multiplication_client: Arc<SecureMultiplicationClient<Paillier>>,
}

impl SecureExtremumSelectionClient {
    pub fn new(paillier: Arc<Paillier>, dgk: Arc<Dgk>, config: &ProtocolConfig) -> DuetResult<Self> {
        Ok(Self {
            comparison_client: Arc::new(SecureComparisonClient::new(
                paillier.clone(),
                dgk,
                config,
            )?),
            multiplication_client: Arc::new(SecureMultiplicationClient::new(paillier)),
        })
    }

    pub fn set_server(&self, server: &Arc<SecureExtremumSelectionServer>) -> DuetResult<()> {
        self.comparison_client
            .set_server(server.comparison_server())?;
        self.multiplication_client
            .set_server(server.multiplication_server())
    }

    pub fn comparison_client(&self) -> &Arc<SecureComparisonClient> {
        &self.comparison_client
    }

    pub fn multiplication_client(&self) -> &Arc<SecureMultiplicationClient<Paillier>> {
        &self.multiplication_client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_tools::{
        bigint::BigInt,
        dgk::{tests as dgk_tests, Dgk},
        paillier::{tests as paillier_tests, Paillier},
    };

    struct ExtremumFixture {
        paillier: Arc<Paillier>,
        server: Arc<SecureExtremumSelectionServer>,
        #[allow(dead_code)]
        client: Arc<SecureExtremumSelectionClient>,
    }

    fn fixture() -> ExtremumFixture {
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

        let config = ProtocolConfig {
            l: 8,
            kappa: 40,
            blinding_cache_capacity: 4,
        };
        let server = Arc::new(
            SecureExtremumSelectionServer::new(paillier_keyless, dgk_keyless, &config).unwrap(),
        );
        let client = Arc::new(
            SecureExtremumSelectionClient::new(paillier_keyed.clone(), dgk_keyed, &config).unwrap(),
        );
        server.set_client(&client);
        client.set_server(&server).unwrap();

        ExtremumFixture {
            paillier: paillier_keyed,
            server,
            client,
        }
    }

    fn encrypt_all(fixture: &ExtremumFixture, values: &[i64]) -> Vec<Ciphertext> {
        values
            .iter()
            .map(|&v| fixture.paillier.encrypt(&BigInt::from(v)).unwrap())
            .collect()
    }

    #[test]
    fn tournament_finds_both_extrema() {
        let fixture = fixture();
        let items = encrypt_all(&fixture, &[7, 3, 9, 5]);

        let minimum = fixture.server.minimum(&items).unwrap();
        assert_eq!(fixture.paillier.decrypt(&minimum).unwrap(), BigInt::from(3));

        let maximum = fixture.server.maximum(&items).unwrap();
        assert_eq!(fixture.paillier.decrypt(&maximum).unwrap(), BigInt::from(9));
    }

    #[test]
    fn odd_length_and_duplicates() {
        let fixture = fixture();
        let items = encrypt_all(&fixture, &[200, 13, 13, 77, 4]);

        let minimum = fixture.server.minimum(&items).unwrap();
        assert_eq!(fixture.paillier.decrypt(&minimum).unwrap(), BigInt::from(4));

        let maximum = fixture.server.maximum(&items).unwrap();
        assert_eq!(
            fixture.paillier.decrypt(&maximum).unwrap(),
            BigInt::from(200)
        );
    }

    #[test]
    fn single_element_passes_through() {
        let fixture = fixture();
        let items = encrypt_all(&fixture, &[42]);
        let minimum = fixture.server.minimum(&items).unwrap();
        assert_eq!(fixture.paillier.decrypt(&minimum).unwrap(), BigInt::from(42));
    }

    #[test]
    fn empty_vector_is_rejected() {
        let fixture = fixture();
        assert!(matches!(
            fixture.server.minimum(&[]),
            Err(DuetError::InvariantViolation(_))
        ));
    }
}
