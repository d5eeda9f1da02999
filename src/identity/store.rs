//! Persistence seam for identity resolution.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::identity::model::{NewUser, User, UserLookup, UserPatch};
use crate::types::{ClientId, Provider, UserId};

/// Boxed future returned by [`IdentityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Failures reported by an identity store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Another user already holds this provider identity.
    #[error("{provider} client id {client_id} is already linked to another user")]
    Conflict {
        provider: Provider,
        client_id: ClientId,
    },

    /// The user to update does not exist.
    #[error("User not found: {id}")]
    NotFound { id: UserId },

    /// Backend failure.
    #[error("Database error: {0}")]
    Database(String),
}

/// Storage contract used by the resolver.
///
/// Implementations must reject a `create` or `update` that would give two
/// users the same `(provider, client_id)` with [`StoreError::Conflict`].
pub trait IdentityStore: Send + Sync {
    /// Find the single user matching `lookup`.
    fn find_one(&self, lookup: UserLookup) -> StoreFuture<'_, Option<User>>;

    /// Insert a user and return it with its assigned id.
    fn create(&self, user: NewUser) -> StoreFuture<'_, User>;

    /// Merge `patch` into the stored user, last write wins per field.
    fn update(&self, id: UserId, patch: UserPatch) -> StoreFuture<'_, User>;
}

impl<T: IdentityStore + ?Sized> IdentityStore for Arc<T> {
    fn find_one(&self, lookup: UserLookup) -> StoreFuture<'_, Option<User>> {
        (**self).find_one(lookup)
    }

    fn create(&self, user: NewUser) -> StoreFuture<'_, User> {
        (**self).create(user)
    }

    fn update(&self, id: UserId, patch: UserPatch) -> StoreFuture<'_, User> {
        (**self).update(id, patch)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: u64,
    users: BTreeMap<UserId, User>,
}

impl MemoryState {
    fn check_unique(&self, candidate: &User) -> Result<(), StoreError> {
        for credential in candidate.credentials.values() {
            let lookup = UserLookup::by_credential(credential);
            let taken = self
                .users
                .values()
                .any(|other| other.id != candidate.id && lookup.matches(other));
            if taken {
                return Err(StoreError::Conflict {
                    provider: credential.provider,
                    client_id: credential.client_id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// In-process identity store.
///
/// Ids start at 1 and are never reused. Writes are counted so callers can
/// assert how many persistence round trips an operation made.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    state: RwLock<MemoryState>,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `create` calls.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful `update` calls.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.creates() + self.updates()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.state.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn find_one(&self, lookup: UserLookup) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.users.values().find(|u| lookup.matches(u)).cloned())
        })
    }

    fn create(&self, user: NewUser) -> StoreFuture<'_, User> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let id = UserId::new(state.last_id + 1);
            let created = User {
                id,
                name: user.name,
                avatar: user.avatar,
                credentials: user.credentials,
            };
            state.check_unique(&created)?;

            state.last_id = id.get();
            state.users.insert(id, created.clone());
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(created)
        })
    }

    fn update(&self, id: UserId, patch: UserPatch) -> StoreFuture<'_, User> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let current = state
                .users
                .get(&id)
                .ok_or(StoreError::NotFound { id })?;
            let updated = current.patched(&patch);
            state.check_unique(&updated)?;

            state.users.insert(id, updated.clone());
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::{ProfileHints, ProviderCredential};

    fn login(provider: Provider, client_id: &str) -> NewUser {
        NewUser::from_login(
            ProviderCredential::new(provider, client_id, "token"),
            ProfileHints::new().with_name("N"),
        )
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = MemoryIdentityStore::new();

        let a = store.create(login(Provider::Youtube, "yt1")).await.unwrap();
        let b = store.create(login(Provider::Youtube, "yt2")).await.unwrap();

        assert_eq!(a.id, UserId::new(1));
        assert_eq!(b.id, UserId::new(2));
        assert_eq!(store.creates(), 2);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_client_id() {
        let store = MemoryIdentityStore::new();
        store.create(login(Provider::Youtube, "yt1")).await.unwrap();

        let err = store
            .create(login(Provider::Youtube, "yt1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { provider: Provider::Youtube, ref client_id } if client_id.as_str() == "yt1"
        ));
        assert_eq!(store.creates(), 1);

        // Same client id under a different provider is a different identity.
        store.create(login(Provider::Soundcloud, "yt1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = MemoryIdentityStore::new();
        let err = store
            .update(UserId::new(4), UserPatch::detach(Provider::Youtube))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id } if id == UserId::new(4)));
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_update_rejects_stealing_client_id() {
        let store = MemoryIdentityStore::new();
        store.create(login(Provider::Youtube, "yt1")).await.unwrap();
        let other = store.create(login(Provider::Soundcloud, "sc1")).await.unwrap();

        let err = store
            .update(
                other.id,
                UserPatch::link(ProviderCredential::new(Provider::Youtube, "yt1", "t")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }
}
