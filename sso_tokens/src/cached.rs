//! A token cache that signs in with credentials supplied by the caller
//!
//! Sign-in attempts are fully serialized: only one attempt runs at a time,
//! and a caller that had to wait re-checks the cached token before deciding
//! whether it needs to sign in itself. A burst of callers arriving at an
//! empty cache thus results in a single call to the identity service.
//!
//! ```
//! # async fn run(identity: impl sso_tokens::sources::IdentityService) -> Result<(), sso_tokens::SignInError> {
//! use sso_stages::Stage;
//! use sso_tokens::{cached, Password, Username};
//!
//! let cache = cached::CachedSignIn::new(identity);
//! cache.configure(cached::Config {
//!     stage: Stage::from_static(sso_stages::TEST),
//! });
//!
//! let username = Username::from_static("machine@example.com");
//! let password = Password::from_static("hunter2");
//!
//! cache.sign_in(&username, &password).await?;
//! let tokens = cache.tokens();
//! # let _ = tokens;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use aliri_clock::{Clock, System};
use arc_swap::{ArcSwap, ArcSwapOption};
use sso_stages::Stage;
use tokio::sync::Mutex;

use crate::{
    sources::IdentityService, validity, PasswordRef, SignInError, TokenPair, UsernameRef,
};

/// Configuration for a [`CachedSignIn`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The stage of the identity service to sign in to
    pub stage: Stage,
}

/// A token cache that signs in with caller-supplied credentials
pub struct CachedSignIn<I, C = System> {
    identity: I,
    config: ArcSwapOption<Config>,
    tokens: ArcSwap<TokenPair>,
    serialize: Mutex<()>,
    clock: C,
}

impl<I> CachedSignIn<I, System> {
    /// Constructs a new, unconfigured token cache
    pub fn new(identity: I) -> Self {
        Self {
            identity,
            config: ArcSwapOption::empty(),
            tokens: ArcSwap::from_pointee(TokenPair::empty()),
            serialize: Mutex::new(()),
            clock: System,
        }
    }
}

impl<I, C> CachedSignIn<I, C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> CachedSignIn<I, D> {
        CachedSignIn {
            identity: self.identity,
            config: self.config,
            tokens: self.tokens,
            serialize: self.serialize,
            clock,
        }
    }

    /// Configures the cache, replacing any earlier configuration
    pub fn configure(&self, config: Config) {
        tracing::debug!(stage = %config.stage, "token cache configured");
        self.config.store(Some(Arc::new(config)));
    }

    /// A snapshot of the cached tokens
    ///
    /// Never waits on a sign-in in progress. Before the first successful
    /// sign-in, and after any failed one, this is the empty pair.
    pub fn tokens(&self) -> Arc<TokenPair> {
        self.tokens.load_full()
    }
}

impl<I, C> CachedSignIn<I, C>
where
    I: IdentityService,
    C: Clock + Send + Sync,
{
    /// Signs in unless the cached access token is still valid
    ///
    /// If the identity service has to be called and fails, the cache is
    /// reset to the empty pair. The same happens when this future is
    /// dropped while the identity service is being called.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(
        &self,
        username: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<(), SignInError> {
        let _serialized = self.serialize.lock().await;

        let config = self.config.load_full().ok_or(SignInError::NotConfigured)?;

        if validity::is_token_valid_with_clock(self.tokens.load().access_token(), &self.clock) {
            tracing::trace!("cached access token still valid");
            return Ok(());
        }

        tracing::debug!(stage = %config.stage, "signing in to identity service");

        let reset = ResetOnDrop::new(&self.tokens);

        match self.identity.sign_in(&config.stage, username, password).await {
            Ok(tokens) => {
                reset.disarm();
                self.tokens.store(Arc::new(tokens));
                tracing::info!("signed in to identity service");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn std::error::Error),
                    "sign in failed; cached tokens cleared"
                );
                Err(error.into())
            }
        }
    }
}

impl<I, C> std::fmt::Debug for CachedSignIn<I, C>
where
    I: std::fmt::Debug,
    C: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CachedSignIn")
            .field("identity", &self.identity)
            .field("config", &*self.config.load())
            .field("tokens", &**self.tokens.load())
            .field("clock", &self.clock)
            .finish()
    }
}

/// Clears the cached tokens unless disarmed
///
/// Covers errors, cancellation and panics alike.
struct ResetOnDrop<'a> {
    tokens: &'a ArcSwap<TokenPair>,
    armed: bool,
}

impl<'a> ResetOnDrop<'a> {
    fn new(tokens: &'a ArcSwap<TokenPair>) -> Self {
        Self {
            tokens,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tokens.store(Arc::new(TokenPair::empty()));
        }
    }
}
