pub mod firebase;
pub mod jwks;
mod payment_token;

pub use firebase::{FirebaseVerifier, IdentityVerifier, VerifiedIdentity};
pub use jwks::JwksCache;
pub use payment_token::*;
