use std::{borrow::Cow, fmt};

use sso_stages::Stage;

use crate::KeySetError;

/// The key-set endpoint of the production identity service
pub const PRODUCTION_URL: &str = "https://sso-api.users.enlight.skf.com/jwks";

/// Configuration for a [`KeySetCache`][crate::KeySetCache]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The stage of the identity service whose keys are fetched
    pub stage: Stage,
}

/// Where key sets are fetched from
///
/// A cache that has been configured with a stage derives its endpoint from
/// that stage. One that never was falls back to a URL set explicitly with
/// [`set_legacy_url()`][crate::KeySetCache::set_legacy_url()].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Derived from the configured stage
    Stage(Stage),
    /// Set explicitly, if at all
    Legacy(Option<String>),
}

impl Endpoint {
    /// The URL to fetch key sets from
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::NotConfigured`] for a legacy endpoint without a URL.
    pub fn url(&self) -> Result<Cow<'_, str>, KeySetError> {
        match self {
            Self::Stage(stage) if stage.is_prod() => Ok(Cow::Borrowed(PRODUCTION_URL)),
            Self::Stage(stage) => Ok(Cow::Owned(format!(
                "https://sso-api.{}.users.enlight.skf.com/jwks",
                stage
            ))),
            Self::Legacy(Some(url)) => Ok(Cow::Borrowed(url.as_str())),
            Self::Legacy(None) => Err(KeySetError::NotConfigured),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Legacy(None)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.url() {
            Ok(url) => f.write_str(&url),
            Err(_) => f.write_str("<unconfigured>"),
        }
    }
}
