// Domain separation for deterministic RNG seeding
pub const RNG_TAG: u8 = 0x00;

// Configuration defaults
pub const DEFAULT_KEY_BITS: usize = 1024;
pub const DEFAULT_MILLER_RABIN_ROUNDS: usize = 10;
pub const DEFAULT_RANDOMIZER_CACHE_CAPACITY: usize = 32;
pub const DEFAULT_BLINDING_CACHE_CAPACITY: usize = 16;
pub const DEFAULT_DGK_T: usize = 160;
pub const DEFAULT_DGK_L: usize = 16;
pub const DEFAULT_OU_T_BITS: usize = 160;
pub const DEFAULT_OU_MESSAGE_SPACE_BITS: usize = 96;
pub const DEFAULT_ELGAMAL_LARGE_PRIME_BITS: usize = 160;
pub const DEFAULT_ELGAMAL_THRESHOLD_BITS: usize = 16;
pub const DEFAULT_KAPPA: usize = 40;
