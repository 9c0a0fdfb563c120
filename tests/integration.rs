//! End-to-end scenarios exercising the cryptosystems and the interactive
//! protocols together, driven through the top-level configuration record.

use std::sync::Arc;

use tracing_test::traced_test;

use duet::{
    crypto_tools::{
        bigint::BigInt,
        dgk::Dgk,
        elgamal::ElGamal,
        okamoto_uchiyama::OkamotoUchiyama,
        paillier::{Paillier, PaillierPublicKey},
        provider::CryptoProvider,
    },
    protocols::{
        comparison::{SecureComparisonClient, SecureComparisonServer},
        extremum::{SecureExtremumSelectionClient, SecureExtremumSelectionServer},
        multiplication::{SecureMultiplicationClient, SecureMultiplicationServer},
        packed_comparison::{PackedComparisonClient, PackedComparisonServer},
    },
    sdk::{
        api::{deserialize, serialize},
        config::{Config, DgkConfig, ElGamalConfig, OkamotoUchiyamaConfig, PaillierConfig, ProtocolConfig},
    },
};

/// Key sizes trimmed for test runtime; every parameter constraint still
/// holds.
fn test_config() -> Config {
    Config {
        paillier: PaillierConfig {
            key_bits: 512,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        },
        dgk: DgkConfig {
            key_bits: 256,
            t: 10,
            l: 8,
            precompute_decryption_map: false,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        },
        okamoto_uchiyama: OkamotoUchiyamaConfig {
            key_bits: 510,
            t_bits: 80,
            message_space_bits: 64,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        },
        elgamal: ElGamalConfig {
            key_bits: 192,
            large_prime_bits: 64,
            message_space_threshold_bits: 8,
            precompute_decryption_map: true,
            miller_rabin_rounds: 10,
            randomizer_cache_capacity: 4,
        },
        protocol: ProtocolConfig {
            l: 8,
            kappa: 40,
            blinding_cache_capacity: 4,
        },
    }
}

struct Parties {
    /// PSP-side keyed providers
    paillier: Arc<Paillier>,
    dgk: Arc<Dgk>,
    /// Server-side public-key-only providers
    paillier_public: Arc<Paillier>,
    dgk_public: Arc<Dgk>,
    config: Config,
}

fn parties() -> Parties {
    let config = test_config();
    config.validate().unwrap();

    let (paillier_pk, paillier_sk) = Paillier::generate_keys(&config.paillier).unwrap();
    let (dgk_pk, dgk_sk) = Dgk::generate_keys(&config.dgk).unwrap();

    Parties {
        paillier: Arc::new(
            Paillier::from_keypair(paillier_pk.clone(), paillier_sk, &config.paillier).unwrap(),
        ),
        dgk: Arc::new(Dgk::from_keypair(dgk_pk.clone(), dgk_sk, &config.dgk).unwrap()),
        paillier_public: Arc::new(
            Paillier::from_public_key(paillier_pk, &config.paillier).unwrap(),
        ),
        dgk_public: Arc::new(Dgk::from_public_key(dgk_pk, &config.dgk).unwrap()),
        config,
    }
}

#[test]
#[traced_test]
fn paillier_signed_homomorphism_at_full_key_length() {
    let config = PaillierConfig {
        key_bits: 1024,
        ..PaillierConfig::default()
    };
    let (public_key, private_key) = Paillier::generate_keys(&config).unwrap();
    assert_eq!(public_key.n.bits(), 1024);
    let paillier = Paillier::from_keypair(public_key, private_key, &config).unwrap();

    let sum = paillier
        .add(
            &paillier.encrypt(&BigInt::from(3)).unwrap(),
            &paillier.encrypt(&BigInt::from(-2)).unwrap(),
        )
        .unwrap();
    assert_eq!(paillier.decrypt(&sum).unwrap(), BigInt::one());
}

#[test]
fn okamoto_uchiyama_scales_signed_plaintexts() {
    let (keyed, _) = ou_instances();
    let scaled = keyed
        .mul_plain(&keyed.encrypt(&BigInt::from(3)).unwrap(), &BigInt::from(-2))
        .unwrap();
    assert_eq!(keyed.decrypt(&scaled).unwrap(), BigInt::from(-6));
}

fn ou_instances() -> (OkamotoUchiyama, OkamotoUchiyama) {
    let config = test_config().okamoto_uchiyama;
    let (public_key, private_key) = OkamotoUchiyama::generate_keys(&config).unwrap();
    (
        OkamotoUchiyama::from_keypair(public_key.clone(), private_key, &config).unwrap(),
        OkamotoUchiyama::from_public_key(public_key, &config).unwrap(),
    )
}

#[test]
fn dgk_with_wide_operands_and_decryption_table() {
    let config = DgkConfig {
        key_bits: 256,
        t: 17,
        l: 16,
        precompute_decryption_map: true,
        miller_rabin_rounds: 10,
        randomizer_cache_capacity: 4,
    };
    let (public_key, private_key) = Dgk::generate_keys(&config).unwrap();
    assert_eq!(public_key.u, BigInt::from(262147));
    let dgk = Dgk::from_keypair(public_key, private_key, &config).unwrap();

    assert!(dgk
        .is_encrypted_zero(&dgk.encrypt(&BigInt::zero()).unwrap())
        .unwrap());
    assert!(!dgk
        .is_encrypted_zero(&dgk.encrypt(&BigInt::one()).unwrap())
        .unwrap());

    for m in [0i64, 1, -1, 40000, -40000] {
        let m = BigInt::from(m);
        assert_eq!(dgk.decrypt(&dgk.encrypt(&m).unwrap()).unwrap(), m);
    }
}

#[test]
fn elgamal_window_round_trip_and_zero_test() {
    let config = test_config().elgamal;
    let (public_key, private_key) = ElGamal::generate_keys(&config).unwrap();
    let elgamal = ElGamal::from_keypair(public_key, private_key, &config).unwrap();

    for m in [1i64, 127, -1, -127] {
        let m = BigInt::from(m);
        assert_eq!(elgamal.decrypt(&elgamal.encrypt(&m).unwrap()).unwrap(), m);
    }

    assert!(elgamal
        .is_encrypted_zero(&elgamal.encrypt(&BigInt::zero()).unwrap())
        .unwrap());
    assert!(!elgamal
        .is_encrypted_zero(&elgamal.encrypt(&BigInt::one()).unwrap())
        .unwrap());
}

#[test]
fn secure_multiplication_between_the_roles() {
    let parties = parties();

    let server = Arc::new(
        SecureMultiplicationServer::new(parties.paillier_public.clone(), &parties.config.protocol)
            .unwrap(),
    );
    let client = Arc::new(SecureMultiplicationClient::new(parties.paillier.clone()));
    server.set_client(&client);
    client.set_server(&server).unwrap();

    for (a, b) in [(12i64, 11i64), (-9, 8), (0, 100), (-15, -15)] {
        let enc_a = parties.paillier_public.encrypt(&BigInt::from(a)).unwrap();
        let enc_b = parties.paillier_public.encrypt(&BigInt::from(b)).unwrap();
        let product = server.multiply(&enc_a, &enc_b).unwrap();
        assert_eq!(
            parties.paillier.decrypt(&product).unwrap(),
            BigInt::from(a * b)
        );
    }
}

#[test]
fn secure_comparison_between_the_roles() {
    let parties = parties();

    let server = Arc::new(
        SecureComparisonServer::new(
            parties.paillier_public.clone(),
            parties.dgk_public.clone(),
            &parties.config.protocol,
        )
        .unwrap(),
    );
    let client = Arc::new(
        SecureComparisonClient::new(
            parties.paillier.clone(),
            parties.dgk.clone(),
            &parties.config.protocol,
        )
        .unwrap(),
    );
    server.set_client(&client);
    client.set_server(&server).unwrap();

    for (a, b, expected) in [(42i64, 100i64, 1i64), (100, 42, 0), (77, 77, 1)] {
        let enc_a = parties.paillier_public.encrypt(&BigInt::from(a)).unwrap();
        let enc_b = parties.paillier_public.encrypt(&BigInt::from(b)).unwrap();
        let result = server.compare(&enc_a, &enc_b).unwrap();
        assert_eq!(
            parties.paillier.decrypt(&result).unwrap(),
            BigInt::from(expected),
            "compare({}, {})",
            a,
            b
        );
    }
}

#[test]
fn packed_comparison_between_the_roles() {
    let parties = parties();
    let threshold = BigInt::from(100);

    let server = Arc::new(
        PackedComparisonServer::new(
            parties.paillier_public.clone(),
            parties.dgk_public.clone(),
            threshold,
            &parties.config.protocol,
        )
        .unwrap(),
    );
    let client = Arc::new(
        PackedComparisonClient::new(
            parties.paillier.clone(),
            parties.dgk.clone(),
            &parties.config.protocol,
        )
        .unwrap(),
    );
    server.set_client(&client);
    client.set_server(&server).unwrap();

    let values: Vec<BigInt> = [42i64, 100, 101, 0, 255, 99]
        .iter()
        .map(|&v| BigInt::from(v))
        .collect();
    let (packed, count_in_last) = server.pack_operands(&values).unwrap();
    let indicators = server.compare(&packed, count_in_last).unwrap();

    let decrypted: Vec<u64> = indicators
        .iter()
        .map(|c| parties.paillier.decrypt(c).unwrap().to_u64().unwrap())
        .collect();
    assert_eq!(decrypted, vec![0, 1, 1, 0, 1, 0]);
}

#[test]
fn extremum_selection_between_the_roles() {
    let parties = parties();

    let server = Arc::new(
        SecureExtremumSelectionServer::new(
            parties.paillier_public.clone(),
            parties.dgk_public.clone(),
            &parties.config.protocol,
        )
        .unwrap(),
    );
    let client = Arc::new(
        SecureExtremumSelectionClient::new(
            parties.paillier.clone(),
            parties.dgk.clone(),
            &parties.config.protocol,
        )
        .unwrap(),
    );
    server.set_client(&client);
    client.set_server(&server).unwrap();

    let items: Vec<_> = [7i64, 3, 9, 5]
        .iter()
        .map(|&v| parties.paillier_public.encrypt(&BigInt::from(v)).unwrap())
        .collect();

    let minimum = server.minimum(&items).unwrap();
    assert_eq!(parties.paillier.decrypt(&minimum).unwrap(), BigInt::from(3));

    let maximum = server.maximum(&items).unwrap();
    assert_eq!(parties.paillier.decrypt(&maximum).unwrap(), BigInt::from(9));
}

#[test]
fn public_key_and_ciphertext_travel_as_bytes() {
    let parties = parties();

    let pk_bytes = serialize(parties.paillier.public_key()).unwrap();
    let recovered: PaillierPublicKey = deserialize(&pk_bytes).unwrap();
    let remote = Paillier::from_public_key(recovered, &parties.config.paillier).unwrap();

    let ciphertext = remote.encrypt(&BigInt::from(-31)).unwrap();
    let ct_bytes = serialize(&ciphertext).unwrap();
    let ciphertext = deserialize(&ct_bytes).unwrap();

    assert_eq!(
        parties.paillier.decrypt(&ciphertext).unwrap(),
        BigInt::from(-31)
    );
}
