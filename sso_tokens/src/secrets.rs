//! A token cache that signs in with credentials held in a secret store
//!
//! The username and password are fetched from a [`SecretStore`] each time
//! new tokens are needed. To keep the secret store from being hammered when
//! many callers find the cache stale at once, a caller that sees a refresh
//! already in progress returns immediately instead of queueing up another
//! one. Such a caller can await [`SecretsSignIn::tokens()`], which waits for
//! the refresh in progress to finish.
//!
//! This is a best-effort reduction of duplicate refreshes. A caller that
//! passes the in-progress check just before another caller raises the flag
//! will wait for the exclusive lock instead, and then finds the token
//! already refreshed.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use aliri_clock::{Clock, System};
use arc_swap::ArcSwapOption;
use serde::Deserialize;
use sso_stages::Stage;
use tokio::sync::RwLock;

use crate::{
    sources::{IdentityService, SecretStore},
    validity, Password, SecretLocator, SignInError, TokenPair, Username,
};

/// Configuration for a [`SecretsSignIn`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The stage of the identity service to sign in to
    pub stage: Stage,
    /// The account owning the secret store
    pub account: String,
    /// The region of the secret store
    pub region: String,
    /// The name of the secret holding the credentials
    pub secret_name: String,
}

impl Config {
    /// The locator of the secret holding the credentials
    pub fn secret_locator(&self) -> SecretLocator {
        SecretLocator::compose(&self.region, &self.account, &self.secret_name)
    }
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: Username,
    password: Password,
}

/// A token cache that signs in with credentials from a secret store
pub struct SecretsSignIn<S, I, C = System> {
    store: S,
    identity: I,
    config: ArcSwapOption<Config>,
    tokens: RwLock<TokenPair>,
    refreshing: AtomicBool,
    clock: C,
}

impl<S, I> SecretsSignIn<S, I, System> {
    /// Constructs a new, unconfigured token cache
    pub fn new(store: S, identity: I) -> Self {
        Self {
            store,
            identity,
            config: ArcSwapOption::empty(),
            tokens: RwLock::new(TokenPair::empty()),
            refreshing: AtomicBool::new(false),
            clock: System,
        }
    }
}

impl<S, I, C> SecretsSignIn<S, I, C> {
    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> SecretsSignIn<S, I, D> {
        SecretsSignIn {
            store: self.store,
            identity: self.identity,
            config: self.config,
            tokens: self.tokens,
            refreshing: self.refreshing,
            clock,
        }
    }

    /// Configures the cache, replacing any earlier configuration
    pub fn configure(&self, config: Config) {
        tracing::debug!(
            stage = %config.stage,
            secret = %config.secret_locator(),
            "token cache configured"
        );
        self.config.store(Some(Arc::new(config)));
    }

    /// The cached tokens
    ///
    /// Waits for a refresh in progress to finish.
    pub async fn tokens(&self) -> TokenPair {
        self.tokens.read().await.clone()
    }

    /// Whether a refresh is currently in progress
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }
}

impl<S, I, C> SecretsSignIn<S, I, C>
where
    S: SecretStore,
    I: IdentityService,
    C: Clock + Send + Sync,
{
    /// Fetches credentials from the secret store and signs in, unless the
    /// cached access token is still valid
    ///
    /// Returns immediately without error if another refresh is already in
    /// progress. On failure, or when this future is dropped part-way, the
    /// cache is reset to the empty pair.
    #[tracing::instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<(), SignInError> {
        let config = self.config.load_full().ok_or(SignInError::NotConfigured)?;

        if self.is_refreshing() {
            tracing::trace!("refresh already in progress");
            return Ok(());
        }

        let mut tokens = self.tokens.write().await;
        let _refreshing = InProgress::mark(&self.refreshing);

        if validity::is_token_valid_with_clock(tokens.access_token(), &self.clock) {
            tracing::trace!("cached access token still valid");
            return Ok(());
        }

        let slot = ClearOnDrop::new(&mut tokens);

        match self.request_tokens(&config).await {
            Ok(fresh) => {
                slot.fill(fresh);
                tracing::info!("signed in to identity service");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn std::error::Error),
                    "sign in failed; cached tokens cleared"
                );
                Err(error)
            }
        }
    }

    async fn request_tokens(&self, config: &Config) -> Result<TokenPair, SignInError> {
        let locator = config.secret_locator();
        tracing::debug!(secret = %locator, "fetching credentials from secret store");

        let raw = self
            .store
            .get_secret(&locator)
            .await
            .map_err(SignInError::SecretFetch)?;

        let credentials: Credentials =
            serde_json::from_slice(&raw).map_err(SignInError::SecretDecode)?;

        tracing::debug!(
            stage = %config.stage,
            username = %credentials.username,
            "signing in to identity service"
        );

        let tokens = self
            .identity
            .sign_in(&config.stage, &credentials.username, &credentials.password)
            .await?;

        Ok(tokens)
    }
}

impl<S, I, C> fmt::Debug for SecretsSignIn<S, I, C>
where
    S: fmt::Debug,
    I: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SecretsSignIn")
            .field("store", &self.store)
            .field("identity", &self.identity)
            .field("config", &*self.config.load())
            .field("tokens", &self.tokens)
            .field("refreshing", &self.refreshing)
            .field("clock", &self.clock)
            .finish()
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl<'a> InProgress<'a> {
    fn mark(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Empties the token slot unless filled
struct ClearOnDrop<'a> {
    tokens: &'a mut TokenPair,
    filled: bool,
}

impl<'a> ClearOnDrop<'a> {
    fn new(tokens: &'a mut TokenPair) -> Self {
        Self {
            tokens,
            filled: false,
        }
    }

    fn fill(mut self, fresh: TokenPair) {
        *self.tokens = fresh;
        self.filled = true;
    }
}

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        if !self.filled {
            *self.tokens = TokenPair::empty();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU64, AtomicUsize},
            Mutex,
        },
        time::{Duration, SystemTime},
    };

    use aliri_clock::UnixTime;
    use async_trait::async_trait;
    use color_eyre::Result;
    use sso_stages::StageRef;

    use super::*;
    use crate::{
        error::RemoteSignInError, sources::BoxError, validity::test_tokens, ErrorKind,
        PasswordRef, RefreshToken, SecretLocatorRef, UsernameRef,
    };

    const SECRET: &[u8] = br#"{"username":"machine","password":"hunter2"}"#;

    #[derive(Debug)]
    struct FakeStore {
        calls: AtomicUsize,
        locators: Mutex<Vec<String>>,
        payload: Mutex<Option<Vec<u8>>>,
    }

    impl FakeStore {
        fn holding(payload: &[u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                locators: Mutex::new(Vec::new()),
                payload: Mutex::new(Some(payload.to_vec())),
            }
        }

        fn unavailable() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                locators: Mutex::new(Vec::new()),
                payload: Mutex::new(None),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretStore for FakeStore {
        async fn get_secret(&self, locator: &SecretLocatorRef) -> Result<Vec<u8>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.locators
                .lock()
                .unwrap()
                .push(locator.as_str().to_owned());

            self.payload.lock().unwrap().clone().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "store unavailable")
                    .into()
            })
        }
    }

    #[derive(Debug, Default)]
    struct FakeIdentity {
        calls: AtomicUsize,
        delay_ms: AtomicU64,
        reject: AtomicBool,
    }

    #[async_trait]
    impl IdentityService for FakeIdentity {
        async fn sign_in(
            &self,
            stage: &StageRef,
            username: &UsernameRef,
            password: &PasswordRef,
        ) -> Result<TokenPair, RemoteSignInError> {
            assert_eq!(stage.as_str(), sso_stages::STAGING);
            assert_eq!(username.as_str(), "machine");
            assert_eq!(password.as_str(), "hunter2");

            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            if self.reject.load(Ordering::SeqCst) {
                return Err(RemoteSignInError::rejected("account locked"));
            }

            let now = UnixTime::from(SystemTime::now());
            Ok(TokenPair::new(
                test_tokens::expiring_at(now, UnixTime(now.0 + 3600)),
                RefreshToken::from_static("refresh"),
            ))
        }
    }

    type Cache = SecretsSignIn<Arc<FakeStore>, Arc<FakeIdentity>>;

    fn config() -> Config {
        Config {
            stage: Stage::from_static(sso_stages::STAGING),
            account: "123456789012".to_owned(),
            region: "eu-west-1".to_owned(),
            secret_name: "sso/machine".to_owned(),
        }
    }

    fn configured(store: &Arc<FakeStore>, identity: &Arc<FakeIdentity>) -> Cache {
        let cache = SecretsSignIn::new(store.clone(), identity.clone());
        cache.configure(config());
        cache
    }

    #[tokio::test]
    async fn unconfigured_cache_refuses_to_sign_in() {
        let store = Arc::new(FakeStore::holding(SECRET));
        let identity = Arc::new(FakeIdentity::default());
        let cache = SecretsSignIn::new(store.clone(), identity);

        let err = cache.sign_in().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotConfigured);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn signs_in_with_stored_credentials_once() -> Result<()> {
        let store = Arc::new(FakeStore::holding(SECRET));
        let identity = Arc::new(FakeIdentity::default());
        let cache = configured(&store, &identity);

        cache.sign_in().await?;
        cache.sign_in().await?;

        assert_eq!(store.calls(), 1);
        assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
        assert!(!cache.tokens().await.is_empty());
        assert_eq!(
            *store.locators.lock().unwrap(),
            vec!["arn:aws:secretsmanager:eu-west-1:123456789012:secret:sso/machine"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_is_reported_and_clears_cache() {
        let store = Arc::new(FakeStore::unavailable());
        let identity = Arc::new(FakeIdentity::default());
        let cache = configured(&store, &identity);

        let err = cache.sign_in().await.unwrap_err();

        assert!(matches!(err, SignInError::SecretFetch(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(cache.tokens().await.is_empty());
        assert!(!cache.is_refreshing());
        assert_eq!(identity.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_secret_is_a_decode_error() {
        let store = Arc::new(FakeStore::holding(br#"{"username":"machine"}"#));
        let identity = Arc::new(FakeIdentity::default());
        let cache = configured(&store, &identity);

        let err = cache.sign_in().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.to_string(), "failed to unmarshal secret value");
        assert!(cache.tokens().await.is_empty());
    }

    #[tokio::test]
    async fn rejected_credentials_clear_cache() -> Result<()> {
        let store = Arc::new(FakeStore::holding(SECRET));
        let identity = Arc::new(FakeIdentity::default());
        let cache = configured(&store, &identity)
            .with_clock(aliri_clock::TestClock::new(UnixTime(u64::MAX / 2)));

        cache.sign_in().await?;
        assert!(!cache.tokens().await.is_empty());

        identity.reject.store(true, Ordering::SeqCst);
        let err = cache.sign_in().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthFailure);
        assert_eq!(cache.tokens().await, TokenPair::empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() -> Result<()> {
        let store = Arc::new(FakeStore::holding(SECRET));
        let identity = Arc::new(FakeIdentity::default());
        identity.delay_ms.store(50, Ordering::SeqCst);
        let cache = Arc::new(configured(&store, &identity));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.sign_in().await })
            })
            .collect();

        for task in tasks {
            task.await??;
        }

        assert_eq!(store.calls(), 1);
        assert!(!cache.tokens().await.is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn caller_during_refresh_returns_immediately() -> Result<()> {
        let store = Arc::new(FakeStore::holding(SECRET));
        let identity = Arc::new(FakeIdentity::default());
        identity.delay_ms.store(200, Ordering::SeqCst);
        let cache = Arc::new(configured(&store, &identity));

        let refresh = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.sign_in().await })
        };

        while !cache.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        tokio::time::timeout(Duration::from_millis(50), cache.sign_in()).await??;

        let tokens = cache.tokens().await;
        assert!(!tokens.is_empty());

        refresh.await??;
        assert_eq!(store.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_refresh_resets_flag_and_cache() -> Result<()> {
        let store = Arc::new(FakeStore::holding(SECRET));
        let identity = Arc::new(FakeIdentity::default());
        identity.delay_ms.store(10_000, Ordering::SeqCst);
        let cache = configured(&store, &identity);

        let attempt = tokio::time::timeout(Duration::from_millis(20), cache.sign_in()).await;
        assert!(attempt.is_err());
        assert!(!cache.is_refreshing());
        assert!(cache.tokens().await.is_empty());

        identity.delay_ms.store(0, Ordering::SeqCst);
        cache.sign_in().await?;
        assert!(!cache.tokens().await.is_empty());
        Ok(())
    }
}
