mod constants;
pub mod crypto_tools;
pub mod protocols;
pub mod sdk;
