use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};

use crate::{
    endpoint::{Config, Endpoint},
    key_set::KeySetDocument,
    KeyIdRef, KeySet, KeySetError, KeySets,
};

#[derive(Debug, Default)]
struct VolatileData {
    key_sets: Arc<KeySets>,
    url: Option<String>,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl VolatileData {
    fn new(key_sets: KeySets) -> Self {
        Self {
            key_sets: Arc::new(key_sets),
            url: None,
            etag: None,
            last_modified: None,
        }
    }

    /// Whether a conditional request for `url` can be made
    fn validators_for(&self, url: &str) -> (Option<&HeaderValue>, Option<&HeaderValue>) {
        if self.url.as_deref() == Some(url) {
            (self.etag.as_ref(), self.last_modified.as_ref())
        } else {
            (None, None)
        }
    }
}

#[derive(Debug)]
struct Inner {
    data: ArcSwap<VolatileData>,
    config: ArcSwapOption<Config>,
    legacy_url: ArcSwapOption<String>,
    client: Client,
}

/// A cache of the public signing keys published by the identity service
///
/// A lookup for a key that is not in the cache refreshes the cache once
/// before giving up, so keys that have been rotated in since the last
/// refresh are picked up.
///
/// Refreshes are not coordinated with each other. Concurrent refreshes may
/// all reach out to the endpoint, and whichever finishes last wins. Each
/// refresh replaces the whole collection at once, so readers never see a
/// partially updated collection.
#[derive(Debug, Clone)]
#[must_use]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

impl KeySetCache {
    /// Constructs a new, empty and unconfigured cache
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("sso_jwks/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client))
    }

    /// Constructs a new, empty and unconfigured cache using the given HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(VolatileData::default()),
                config: ArcSwapOption::empty(),
                legacy_url: ArcSwapOption::empty(),
                client,
            }),
        }
    }

    /// Configures the stage to fetch key sets for
    ///
    /// Once configured, any legacy URL is ignored.
    pub fn configure(&self, config: Config) {
        tracing::debug!(stage = %config.stage, "key set cache configured");
        self.inner.config.store(Some(Arc::new(config)));
    }

    /// Sets the URL to fetch key sets from while no stage is configured
    #[deprecated(note = "configure a stage with `configure()` instead")]
    pub fn set_legacy_url(&self, url: impl Into<String>) {
        self.inner.legacy_url.store(Some(Arc::new(url.into())));
    }

    /// The endpoint key sets are currently fetched from
    pub fn endpoint(&self) -> Endpoint {
        match &*self.inner.config.load() {
            Some(config) => Endpoint::Stage(config.stage.clone()),
            None => Endpoint::Legacy(self.inner.legacy_url.load_full().map(|u| (*u).clone())),
        }
    }

    /// Replaces the cached key sets
    pub fn set_key_sets(&self, key_sets: KeySets) {
        self.inner.data.store(Arc::new(VolatileData::new(key_sets)));
    }

    /// The cached key sets, without ever refreshing
    pub fn cached_key_sets(&self) -> Arc<KeySets> {
        self.inner.data.load().key_sets.clone()
    }

    /// The cached key sets
    ///
    /// If the cache is empty, it is refreshed once first.
    ///
    /// # Errors
    ///
    /// Returns an error if a refresh was needed and failed.
    pub async fn key_sets(&self) -> Result<Arc<KeySets>, KeySetError> {
        if self.cached_key_sets().is_empty() {
            self.refresh().await?;
        }

        Ok(self.cached_key_sets())
    }

    /// Finds the signing key with the given identifier
    ///
    /// If no such key is cached, the cache is refreshed once and searched
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::KeyNotFound`] if the key is not known even after
    /// refreshing, or the refresh error if the refresh failed.
    #[tracing::instrument(skip(self))]
    pub async fn lookup_key_id(&self, kid: &KeyIdRef) -> Result<KeySet, KeySetError> {
        if let Some(key) = self.cached_key_sets().find_signing_key(kid) {
            return Ok(key.clone());
        }

        tracing::debug!("key not cached, refreshing key sets");
        self.refresh().await?;

        self.cached_key_sets()
            .find_signing_key(kid)
            .cloned()
            .ok_or_else(|| KeySetError::KeyNotFound {
                kid: kid.as_str().to_owned(),
            })
    }

    /// Refreshes the key sets from the configured endpoint
    ///
    /// No retries are attempted. If the attempt to refresh the key sets
    /// fails, no change is made to the cached key sets.
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        let endpoint = self.endpoint();
        let url = endpoint.url()?;

        let span = tracing::Span::current();
        span.record("jwks.url", &*url);
        tracing::debug!("refreshing key sets");

        let mut request = self.inner.client.get(&*url);

        {
            let data = self.inner.data.load();
            match data.validators_for(&url) {
                (Some(etag), _) => request = request.header(header::IF_NONE_MATCH, etag),
                (None, Some(last_modified)) => {
                    request = request.header(header::IF_MODIFIED_SINCE, last_modified)
                }
                (None, None) => {}
            }
        }

        let response = request.send().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "key set refresh failed; unable to send request");
            KeySetError::Transport(err)
        })?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("key sets not modified");
            return Ok(());
        } else if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "key set refresh failed; unexpected response status",
            );
            return Err(KeySetError::Transport(err));
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);

        let body = response.bytes().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "key set refresh failed; unable to read body");
            KeySetError::Transport(err)
        })?;

        match serde_json::from_slice::<KeySetDocument>(&body) {
            Ok(document) => {
                let count = document.keys.len();
                self.inner.data.store(Arc::new(VolatileData {
                    key_sets: Arc::new(document.keys),
                    url: Some(url.into_owned()),
                    etag,
                    last_modified,
                }));
                tracing::info!(keys = count, "key sets refreshed");
                Ok(())
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "key set refresh failed; malformed document");
                Err(KeySetError::Decode(err))
            }
        }
    }
}
