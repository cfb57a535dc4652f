//! Provider-facing state: the validated discovery document and the memoized key set.
//!
//! `metadata` parses and validates `/.well-known/openid-configuration` into
//! [`ProviderMetadata`]. `discovery` and `jwks` hold per-client caches that fetch lazily and
//! keep the first successful result; failures are never cached. Neither cache holds a lock
//! across an `.await`, so concurrent first access may fetch more than once.

pub mod discovery;
pub mod jwks;
pub mod metadata;

pub use discovery::*;
pub use jwks::*;
pub use metadata::*;
