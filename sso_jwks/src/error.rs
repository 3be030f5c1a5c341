//! Errors raised while resolving signing keys

use thiserror::Error;

/// The broad category of a key-set failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No endpoint to fetch key sets from has been configured
    NotConfigured,
    /// The key-set endpoint could not be reached or answered with an error
    Transport,
    /// The key-set endpoint returned a document that could not be decoded
    Decode,
    /// No signing key with the requested identifier exists, even after a refresh
    KeyNotFound,
}

/// An error while fetching or searching key sets
#[derive(Debug, Error)]
pub enum KeySetError {
    /// Neither a stage nor a legacy URL has been configured
    #[error("key set endpoint is not configured")]
    NotConfigured,
    /// The key sets could not be fetched
    #[error("failed to fetch key sets")]
    Transport(#[source] reqwest::Error),
    /// The key-set document is malformed
    #[error("failed to unmarshal key sets")]
    Decode(#[source] serde_json::Error),
    /// No signing key with the requested identifier is known
    #[error("unable to find public key `{kid}`")]
    KeyNotFound {
        /// The requested key identifier
        kid: String,
    },
}

impl KeySetError {
    /// The broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::KeyNotFound { .. } => ErrorKind::KeyNotFound,
        }
    }
}

/// An error while reconstructing a public key from a key set
#[derive(Debug, Error)]
pub enum PublicKeyError {
    /// A key component is not valid base64url
    #[error("failed to decode key set `{field}`")]
    Decode {
        /// The name of the component, `n` or `e`
        field: &'static str,
        /// The underlying decode error
        source: aliri_base64::InvalidBase64Data,
    },
    /// The public exponent does not fit in 32 bits
    #[error("key set exponent is {len} bytes, more than the 4 supported")]
    ExponentTooLarge {
        /// The length of the decoded exponent
        len: usize,
    },
}
