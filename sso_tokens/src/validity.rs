//! Expiry bookkeeping for cached access tokens
//!
//! **WARNING:** *Nothing in this module verifies the signature of a token.*
//! The claims read here are only used to decide whether a cached token is
//! still worth handing out or whether a new one should be requested. An
//! adversary can place arbitrary data into the header and payload of a JWT,
//! so these claims must never be used to make an authorization decision.
//! Verify the token against the issuer's key set for that.
//!
//! A token is only readable if its header names one of the
//! [`KNOWN_ALGORITHMS`], even though no signature is checked here.

use aliri_base64::Base64Url;
use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use serde::Deserialize;
use thiserror::Error;

use crate::AccessTokenRef;

/// How long before its actual expiry a token stops being handed out
///
/// A token that would expire within this window is treated as already
/// expired, so that a request started with it does not fail half-way.
pub const LOOK_AHEAD: DurationSecs = DurationSecs(300);

/// The `alg` header values a readable token may carry
pub const KNOWN_ALGORITHMS: &[&str] = &[
    "HS256", "HS384", "HS512", "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256",
    "ES384", "ES512", "EdDSA", "none",
];

/// The access token could not be read
#[derive(Debug, Error)]
pub enum MalformedToken {
    /// There is no token
    #[error("token is empty")]
    Empty,
    /// The token does not consist of exactly three sections
    #[error("token does not have three sections")]
    Sections,
    /// A section of the token is not valid base64url
    #[error("token {section} is not valid base64url")]
    Encoding {
        /// The section that failed to decode
        section: &'static str,
        /// The underlying decode error
        source: aliri_base64::InvalidBase64Data,
    },
    /// The header does not name a known signing algorithm
    #[error("token algorithm `{alg}` is not recognized")]
    Algorithm {
        /// The algorithm named in the header, possibly empty
        alg: String,
    },
    /// A section of the token is not the expected JSON
    #[error("token {section} is not valid JSON")]
    Json {
        /// The section that failed to parse
        section: &'static str,
        /// The underlying parse error
        source: serde_json::Error,
    },
}

/// The unverified header of an access token
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UntrustedHeader {
    /// The algorithm the token claims to be signed with
    pub alg: String,
    /// The identifier of the key the token claims to be signed with
    #[serde(default)]
    pub kid: Option<String>,
}

/// The unverified timing claims of an access token
///
/// **WARNING:** *These claims have not been validated and should not be trusted.*
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UntrustedClaims {
    /// Expires
    #[serde(default)]
    pub exp: Option<UnixTime>,
    /// Issued at
    #[serde(default)]
    pub iat: Option<UnixTime>,
    /// Not before
    #[serde(default)]
    pub nbf: Option<UnixTime>,
}

macro_rules! expect_three {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next(), i.next()) {
            (Some(first), Some(second), Some(third), None) => Some((first, second, third)),
            _ => None,
        }
    }};
}

/// Splits an access token into its header and claims without checking the signature
pub fn decompose_unverified(
    token: &AccessTokenRef,
) -> Result<(UntrustedHeader, UntrustedClaims), MalformedToken> {
    if token.as_str().is_empty() {
        return Err(MalformedToken::Empty);
    }

    let (h_str, p_str, _signature) =
        expect_three!(token.as_str().split('.')).ok_or(MalformedToken::Sections)?;

    let header: UntrustedHeader = decode_section(h_str, "header")?;
    if !KNOWN_ALGORITHMS.contains(&header.alg.as_str()) {
        return Err(MalformedToken::Algorithm { alg: header.alg });
    }

    let claims = decode_section(p_str, "payload")?;

    Ok((header, claims))
}

fn decode_section<T>(section: &str, name: &'static str) -> Result<T, MalformedToken>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = Base64Url::from_encoded(section).map_err(|source| MalformedToken::Encoding {
        section: name,
        source,
    })?;

    serde_json::from_slice(raw.as_slice()).map_err(|source| MalformedToken::Json {
        section: name,
        source,
    })
}

impl UntrustedClaims {
    /// Whether these claims are still usable at `time`, allowing for [`LOOK_AHEAD`]
    ///
    /// Absent claims are not checked. The token must still be valid strictly
    /// after the look-ahead window ends, and must not have been issued or
    /// become active after that point.
    pub fn usable_at(&self, time: UnixTime) -> bool {
        let horizon = UnixTime(time.0.saturating_add(LOOK_AHEAD.0));

        self.exp.map_or(true, |exp| horizon < exp)
            && self.iat.map_or(true, |iat| iat <= horizon)
            && self.nbf.map_or(true, |nbf| nbf <= horizon)
    }
}

/// Whether the access token can still be handed out
#[inline]
pub fn is_token_valid(token: &AccessTokenRef) -> bool {
    is_token_valid_with_clock(token, &System)
}

/// Whether the access token can still be handed out according to `clock`
#[inline]
pub fn is_token_valid_with_clock<C: Clock>(token: &AccessTokenRef, clock: &C) -> bool {
    is_token_valid_at(token, clock.now())
}

/// Whether the access token can still be handed out at `time`
pub fn is_token_valid_at(token: &AccessTokenRef, time: UnixTime) -> bool {
    match decompose_unverified(token) {
        Ok((_, claims)) => claims.usable_at(time),
        Err(MalformedToken::Empty) => false,
        Err(error) => {
            tracing::trace!(
                error = (&error as &dyn std::error::Error),
                "cached access token is unreadable"
            );
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use aliri_base64::Base64Url;
    use aliri_clock::UnixTime;

    use crate::AccessToken;

    /// Builds an unsigned token with the given payload
    pub fn with_payload(payload: &str) -> AccessToken {
        let header = Base64Url::from_raw(r#"{"alg":"RS256","kid":"key-1"}"#.as_bytes());
        let payload = Base64Url::from_raw(payload.as_bytes());
        AccessToken::from(format!("{}.{}.c2lnbmF0dXJl", header, payload))
    }

    /// Builds an unsigned token issued at `iat` and expiring at `exp`
    pub fn expiring_at(iat: UnixTime, exp: UnixTime) -> AccessToken {
        with_payload(&format!(
            r#"{{"sub":"machine","iat":{},"nbf":{},"exp":{}}}"#,
            iat.0, iat.0, exp.0
        ))
    }
}
