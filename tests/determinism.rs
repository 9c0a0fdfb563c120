//! Reproducibility of deterministic seeding.
//!
//! Kept as the only test in this binary: the generator is process-wide,
//! and concurrent tests would interleave their draws between the reseed
//! and the assertions.

use duet::{
    crypto_tools::{bigint::BigInt, paillier::Paillier, provider::CryptoProvider, rng},
    sdk::config::PaillierConfig,
};

#[test]
fn deterministic_seed_reproduces_the_stream_and_ciphertexts() {
    rng::reseed_deterministic(0x17, b"duet test seed").unwrap();
    let first = rng::uniform_bits(128);
    rng::reseed_deterministic(0x17, b"duet test seed").unwrap();
    assert_eq!(rng::uniform_bits(128), first);

    // a different tag diverges
    rng::reseed_deterministic(0x18, b"duet test seed").unwrap();
    assert_ne!(rng::uniform_bits(128), first);

    // homomorphic results are bit-exact across runs only under a fixed seed
    let config = PaillierConfig {
        key_bits: 512,
        miller_rabin_rounds: 10,
        randomizer_cache_capacity: 4,
    };
    let (public_key, private_key) = Paillier::generate_keys(&config).unwrap();

    rng::reseed_deterministic(0x01, b"integration seed").unwrap();
    let instance =
        Paillier::from_keypair(public_key.clone(), private_key.clone(), &config).unwrap();
    let c1 = instance.encrypt(&BigInt::from(1234)).unwrap();

    rng::reseed_deterministic(0x01, b"integration seed").unwrap();
    let instance = Paillier::from_keypair(public_key, private_key, &config).unwrap();
    let c2 = instance.encrypt(&BigInt::from(1234)).unwrap();

    assert_eq!(c1, c2);
}
