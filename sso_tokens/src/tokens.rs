use serde::{Deserialize, Serialize};

use crate::{AccessToken, AccessTokenRef, RefreshToken, RefreshTokenRef};

/// An access token and refresh token pair as issued by the identity service
///
/// A cache holds at most one pair and only ever replaces it as a whole. The
/// empty pair (see [`TokenPair::empty()`]) stands for "no usable tokens".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    access_token: AccessToken,
    refresh_token: RefreshToken,
}

impl TokenPair {
    /// Constructs a new token pair
    pub fn new(access_token: AccessToken, refresh_token: RefreshToken) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }

    /// The empty token pair
    pub fn empty() -> Self {
        Self {
            access_token: AccessToken::from_static(""),
            refresh_token: RefreshToken::from_static(""),
        }
    }

    /// Whether this pair holds no access token
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.access_token.as_str().is_empty()
    }

    /// The access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// The refresh token
    #[inline]
    pub fn refresh_token(&self) -> &RefreshTokenRef {
        &self.refresh_token
    }
}

impl Default for TokenPair {
    fn default() -> Self {
        Self::empty()
    }
}
