mod admin_auth;
mod identity;

pub use admin_auth::*;
pub use identity::*;
