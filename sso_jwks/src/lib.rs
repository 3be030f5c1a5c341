//! Caching of the identity service's public signing keys
//!
//! The identity service publishes the public halves of the keys it signs
//! tokens with as a key-set document. A [`KeySetCache`] holds the most
//! recently fetched document and resolves key identifiers against it,
//! refreshing from the identity service when a key is not yet known.
//!
//! ```no_run
//! use sso_jwks::{Config, KeyIdRef, KeySetCache};
//! use sso_stages::Stage;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = KeySetCache::new()?;
//! cache.configure(Config {
//!     stage: Stage::from_static(sso_stages::TEST),
//! });
//!
//! let key = cache.lookup_key_id(KeyIdRef::from_str("my-key")).await?;
//! let public_key = key.public_key()?;
//! # drop(public_key);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod cache;
mod endpoint;
pub mod error;
mod key_set;

pub use cache::KeySetCache;
pub use endpoint::{Config, Endpoint, PRODUCTION_URL};
pub use error::{ErrorKind, KeySetError, PublicKeyError};
pub use key_set::{KeyId, KeyIdRef, KeySet, KeySets, SIGNING_USE};
