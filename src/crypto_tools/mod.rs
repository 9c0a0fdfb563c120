pub mod bigint;
pub mod ciphertext;
pub mod data_packer;
pub mod dgk;
pub mod elgamal;
pub mod okamoto_uchiyama;
pub mod paillier;
pub mod permutation;
pub mod provider;
pub mod randomizer_cache;
pub mod rng;

pub(crate) mod utils;
