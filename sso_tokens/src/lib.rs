//! Process-local caching of tokens issued by the identity service
//!
//! Signing in to the identity service is slow, and the tokens it issues are
//! good for a while. The caches in this crate hold on to the most recently
//! issued [`TokenPair`] and only sign in again once its access token is about
//! to expire (see [`validity::LOOK_AHEAD`]).
//!
//! Two caches are provided:
//!
//! * [`cached::CachedSignIn`] signs in with a username and password supplied
//!   by the caller. Sign-in attempts are fully serialized.
//! * [`secrets::SecretsSignIn`] fetches the username and password from a
//!   [`SecretStore`][sources::SecretStore] before signing in, and lets
//!   callers that arrive while a refresh is underway skip it.
//!
//! Both take the identity service as an [`IdentityService`][sources::IdentityService]
//! and are plain values, so a process may hold as many as it needs. Neither
//! persists tokens or shares them between processes.
//!
//! Whenever a refresh fails, the cache is reset to the empty pair rather than
//! holding on to a token that is known to be about to expire.
//!
//! ```
//! use sso_tokens::{validity, AccessToken};
//!
//! let token = AccessToken::from_static("not a token");
//! assert!(!validity::is_token_valid(&token));
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

mod braids;
pub mod cached;
pub mod error;
pub mod secrets;
pub mod sources;
mod tokens;
pub mod validity;

pub use braids::*;
pub use error::{ErrorKind, RemoteSignInError, SignInError};
pub use tokens::TokenPair;
