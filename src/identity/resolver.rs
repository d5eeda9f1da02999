//! Find-or-create and account linking over an [`IdentityStore`].

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::model::{NewUser, ProfileHints, ProviderCredential, User, UserLookup, UserPatch};
use crate::identity::store::{IdentityStore, StoreError};
use crate::types::{Provider, UserId};

/// Upper bound on create attempts when racing logins collide on a client id.
pub const MAX_CREATE_ATTEMPTS: usize = 3;

/// Resolves provider logins to local users.
pub struct IdentityResolver<S> {
    store: S,
}

impl<S: IdentityStore> IdentityResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Map a provider login to a user, linking or creating as needed.
    ///
    /// In order:
    /// 1. a user already holding this `(provider, client_id)` is returned
    ///    unchanged, with no write;
    /// 2. a numeric `hints.id` links the credential to that user, which must
    ///    exist;
    /// 3. otherwise a new user is created from the hints and credential.
    pub async fn resolve_or_create(
        &self,
        credential: ProviderCredential,
        hints: ProfileHints,
    ) -> Result<User> {
        let lookup = UserLookup::by_credential(&credential);

        if let Some(user) = self.store.find_one(lookup).await? {
            debug!(
                "Login for {} matched existing user {}",
                credential.provider, user.id
            );
            return Ok(user);
        }

        if let Some(id) = hints.numeric_id() {
            return self.link(id, credential).await;
        }

        self.create(credential, hints).await
    }

    /// Remove every field of `provider` from `user` and persist the result.
    ///
    /// Detaching a provider the user never linked still writes and succeeds.
    pub async fn detach_provider(&self, user: &User, provider: Provider) -> Result<User> {
        if !user.is_linked(provider) {
            debug!("User {} has no {} credentials to detach", user.id, provider);
        }

        let stored = self
            .store
            .update(user.id, UserPatch::detach(provider))
            .await
            .map_err(not_found_as_error)?;

        info!("Detached {} from user {}", provider, stored.id);
        Ok(stored)
    }

    /// Look up a user by id.
    pub async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.store.find_one(UserLookup::ById(id)).await?)
    }

    async fn link(&self, id: UserId, credential: ProviderCredential) -> Result<User> {
        if self.store.find_one(UserLookup::ById(id)).await?.is_none() {
            warn!("Id hint {} does not match any user", id);
            return Err(Error::NotFound { id });
        }

        let provider = credential.provider;
        let user = self
            .store
            .update(id, UserPatch::link(credential))
            .await
            .map_err(not_found_as_error)?;

        info!("Linked {} to existing user {}", provider, user.id);
        Ok(user)
    }

    async fn create(&self, credential: ProviderCredential, hints: ProfileHints) -> Result<User> {
        let lookup = UserLookup::by_credential(&credential);
        let provider = credential.provider;
        let new_user = NewUser::from_login(credential, hints);

        let mut last_conflict = None;
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            match self.store.create(new_user.clone()).await {
                Ok(user) => {
                    info!("Created user {} from {} login", user.id, provider);
                    return Ok(user);
                }
                Err(conflict @ StoreError::Conflict { .. }) => {
                    warn!(
                        "Create attempt {}/{} conflicted: {}",
                        attempt, MAX_CREATE_ATTEMPTS, conflict
                    );
                    if let Some(user) = self.store.find_one(lookup.clone()).await? {
                        debug!("Concurrent login already created user {}", user.id);
                        return Ok(user);
                    }
                    last_conflict = Some(conflict);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_conflict
            .unwrap_or_else(|| StoreError::Database("create retries exhausted".to_string()))
            .into())
    }
}

fn not_found_as_error(err: StoreError) -> Error {
    match err {
        StoreError::NotFound { id } => Error::NotFound { id },
        other => Error::Storage(other),
    }
}
