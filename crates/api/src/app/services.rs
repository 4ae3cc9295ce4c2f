//! Service wiring: identity store, token service and password hashing.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use thiserror::Error;

use userhub_auth::{
    CredentialVerifier, Identity, IdentityLookup, LookupError, PasswordError, Role, TokenError,
    TokenService,
};
use userhub_core::UserId;
use userhub_infra::{IdentityStore, NewUser, StoreError, UserFilter, UserUpdate};

use crate::app::dto::{CreateUserRequest, UpdateUserRequest};
use crate::config::AppConfig;

/// Stand-in password verified for unknown usernames, so a miss costs the same
/// bcrypt work as a wrong password.
const DUMMY_PASSWORD: &str = "userhub-timing-equalizer";

#[derive(Debug, Error)]
pub enum LoginError {
    /// Unknown username or wrong password; the two are never distinguished.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("credential check did not complete: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("password hashing did not complete: {0}")]
    Task(String),
}

/// Shared handles used by the route handlers.
pub struct AppServices {
    pub store: Arc<dyn IdentityStore>,
    pub lookup: Arc<dyn IdentityLookup>,
    pub tokens: Arc<TokenService>,
    pub verifier: CredentialVerifier,
    dummy_hash: String,
}

/// Build the services from configuration over an already-opened store.
pub async fn build_services<S>(config: &AppConfig, store: Arc<S>) -> anyhow::Result<AppServices>
where
    S: IdentityStore + 'static,
{
    let tokens = TokenService::new(config.token.clone()).context("token service configuration")?;
    let verifier = CredentialVerifier::with_cost(config.bcrypt_cost);

    let dummy_hash = tokio::task::spawn_blocking(move || verifier.hash(DUMMY_PASSWORD))
        .await
        .context("dummy hash task failed")?
        .context("hash dummy password")?;

    let lookup: Arc<dyn IdentityLookup> = store.clone();
    Ok(AppServices {
        store,
        lookup,
        tokens: Arc::new(tokens),
        verifier,
        dummy_hash,
    })
}

impl AppServices {
    /// Verify credentials and mint a session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, LoginError> {
        let identity = self.store.lookup_by_username(username).await?;

        let stored_hash = identity
            .as_ref()
            .map(|i| i.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let verified = self.verify_password(password.to_string(), stored_hash).await?;

        match identity {
            Some(identity) if verified => Ok(self.tokens.issue(&identity, Utc::now())?),
            _ => Err(LoginError::InvalidCredentials),
        }
    }

    pub async fn list_users(&self, filter: UserFilter) -> Result<Vec<Identity>, UserServiceError> {
        Ok(self.store.list_users(filter).await?)
    }

    pub async fn get_user(&self, id: UserId) -> Result<Identity, UserServiceError> {
        self.store
            .lookup_by_id(id)
            .await?
            .ok_or(UserServiceError::Store(StoreError::NotFound))
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<Identity, UserServiceError> {
        let password_hash = self.hash_password(req.password).await?;
        let user = NewUser {
            username: req.username,
            password_hash,
            role: req.role.map(Role::new),
        };
        Ok(self.store.create_user(user).await?)
    }

    pub async fn update_user(
        &self,
        id: UserId,
        req: UpdateUserRequest,
    ) -> Result<Identity, UserServiceError> {
        let password_hash = match req.password {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };
        let update = UserUpdate {
            username: req.username,
            password_hash,
            role: req.role.map(Role::new),
        };
        Ok(self.store.update_user(id, update).await?)
    }

    pub async fn delete_user(&self, id: UserId) -> Result<(), UserServiceError> {
        Ok(self.store.delete_user(id).await?)
    }

    async fn hash_password(&self, password: String) -> Result<String, UserServiceError> {
        let verifier = self.verifier;
        let hash = tokio::task::spawn_blocking(move || verifier.hash(&password))
            .await
            .map_err(|e| UserServiceError::Task(e.to_string()))??;
        Ok(hash)
    }

    async fn verify_password(&self, password: String, stored_hash: String) -> Result<bool, LoginError> {
        let verifier = self.verifier;
        tokio::task::spawn_blocking(move || verifier.verify(&password, &stored_hash))
            .await
            .map_err(|e| LoginError::Task(e.to_string()))
    }
}
