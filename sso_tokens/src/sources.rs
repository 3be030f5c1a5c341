//! Collaborators that tokens and credentials are obtained from

use std::sync::Arc;

use async_trait::async_trait;
use sso_stages::StageRef;

use crate::{error::RemoteSignInError, PasswordRef, SecretLocatorRef, TokenPair, UsernameRef};

/// A boxed error from a collaborator
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The identity service that issues tokens in exchange for credentials
///
/// Implementations are expected to honor cancellation by being dropped:
/// when the caller stops polling the returned future, no further work
/// should be done on its behalf.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Signs in to the identity service deployed to `stage`
    async fn sign_in(
        &self,
        stage: &StageRef,
        username: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<TokenPair, RemoteSignInError>;
}

/// A store holding the credentials used for machine-to-machine sign in
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Gets the raw value of the secret at `locator`
    async fn get_secret(&self, locator: &SecretLocatorRef) -> Result<Vec<u8>, BoxError>;
}

#[async_trait]
impl<T: IdentityService + ?Sized> IdentityService for Arc<T> {
    async fn sign_in(
        &self,
        stage: &StageRef,
        username: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<TokenPair, RemoteSignInError> {
        (**self).sign_in(stage, username, password).await
    }
}

#[async_trait]
impl<'a, T: IdentityService + ?Sized> IdentityService for &'a T {
    async fn sign_in(
        &self,
        stage: &StageRef,
        username: &UsernameRef,
        password: &PasswordRef,
    ) -> Result<TokenPair, RemoteSignInError> {
        (**self).sign_in(stage, username, password).await
    }
}

#[async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    async fn get_secret(&self, locator: &SecretLocatorRef) -> Result<Vec<u8>, BoxError> {
        (**self).get_secret(locator).await
    }
}

#[async_trait]
impl<'a, T: SecretStore + ?Sized> SecretStore for &'a T {
    async fn get_secret(&self, locator: &SecretLocatorRef) -> Result<Vec<u8>, BoxError> {
        (**self).get_secret(locator).await
    }
}
