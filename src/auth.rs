//! Auth-domain models: scopes, secrets, token sets, and identity claims.

pub mod claims;
pub mod scope;
pub mod secret;
pub mod token;

pub use claims::*;
pub use scope::*;
pub use secret::*;
pub use token::*;
