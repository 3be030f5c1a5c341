//! Errors raised while signing in

use thiserror::Error;

use crate::sources::BoxError;

/// The broad category of a sign-in failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The cache was used before it was configured
    NotConfigured,
    /// A collaborator could not be reached
    Transport,
    /// A collaborator returned data that could not be decoded
    Decode,
    /// The identity service rejected the credentials
    AuthFailure,
}

/// An error returned by an [`IdentityService`][crate::sources::IdentityService]
#[derive(Debug, Error)]
pub enum RemoteSignInError {
    /// The identity service refused to issue tokens for the credentials
    #[error("identity service rejected the credentials: {reason}")]
    Rejected {
        /// The reason given by the identity service
        reason: String,
    },
    /// The identity service could not be reached or did not answer sensibly
    #[error("unable to reach identity service")]
    Transport(#[source] BoxError),
}

impl RemoteSignInError {
    /// Constructs a rejection with the reason given by the identity service
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Constructs a transport failure from its cause
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport(source.into())
    }
}

/// An error while refreshing cached tokens
///
/// Whenever this error is returned from a refresh, the cache has been reset
/// to the empty token pair.
#[derive(Debug, Error)]
pub enum SignInError {
    /// The cache was used before it was configured
    #[error("token cache is not configured")]
    NotConfigured,
    /// The credentials could not be fetched from the secret store
    #[error("failed to get secret value")]
    SecretFetch(#[source] BoxError),
    /// The secret did not hold the expected credentials
    #[error("failed to unmarshal secret value")]
    SecretDecode(#[source] serde_json::Error),
    /// Signing in to the identity service failed
    #[error("failed to sign in")]
    SignIn(#[from] RemoteSignInError),
}

impl SignInError {
    /// The broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::SecretFetch(_) => ErrorKind::Transport,
            Self::SecretDecode(_) => ErrorKind::Decode,
            Self::SignIn(RemoteSignInError::Rejected { .. }) => ErrorKind::AuthFailure,
            Self::SignIn(RemoteSignInError::Transport(_)) => ErrorKind::Transport,
        }
    }
}
