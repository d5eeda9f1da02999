//! SurrealDB-backed identity store.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::db::Db;
use crate::db::connection::client_id_index;
use crate::db::schema::{SequenceRecord, UserCreate, UserRecord};
use crate::identity::{
    IdentityStore, NewUser, ProviderCredential, StoreError, StoreFuture, User, UserLookup,
    UserPatch,
};
use crate::types::{ClientId, Provider, UserId};

/// How often a write is re-run after the engine aborts it on a
/// read/write conflict with a concurrent transaction.
const MAX_TRANSACTION_ATTEMPTS: u32 = 16;

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Identity store over the `user` table.
///
/// Uniqueness of every `<provider>_client_id` is enforced by the indexes
/// defined in [`ensure_schema`](crate::db::ensure_schema).
#[derive(Clone)]
pub struct SurrealIdentityStore {
    db: Db,
}

impl SurrealIdentityStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Get a user by its numeric id.
    pub async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        // Ids past the stored integer range cannot exist.
        let Ok(uid) = i64::try_from(id.get()) else {
            return Ok(None);
        };
        let query = "SELECT * FROM user WHERE uid = $uid LIMIT 1";

        let mut res = self.db.query(query).bind(("uid", uid)).await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next().map(UserRecord::into_user))
    }

    /// Get the user holding a provider identity.
    pub async fn get_user_by_client_id(
        &self,
        provider: Provider,
        client_id: &ClientId,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            "SELECT * FROM user WHERE {} = $client_id LIMIT 1",
            provider.field_names().client_id
        );

        let mut res = self
            .db
            .query(query)
            .bind(("client_id", client_id.as_str().to_string()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next().map(UserRecord::into_user))
    }

    /// Reserve the next user id.
    async fn next_uid(&self) -> Result<i64, StoreError> {
        let query = "UPSERT id_counter:user SET value += 1";

        let mut res = self.db.query(query).await?;

        let rows: Vec<SequenceRecord> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(|row| row.value)
            .ok_or_else(|| StoreError::Database("Failed to allocate user id".to_string()))
    }

    async fn insert_user(
        &self,
        content: UserCreate,
        credentials: &[ProviderCredential],
    ) -> Result<User, StoreError> {
        let mut res = self
            .db
            .query("CREATE user CONTENT $content")
            .bind(("content", content))
            .await?;

        let users: Vec<UserRecord> = res
            .take(0)
            .map_err(|e| classify_write_error(e, credentials))?;
        users
            .into_iter()
            .next()
            .map(UserRecord::into_user)
            .ok_or_else(|| StoreError::Database("Failed to create user".to_string()))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let uid = retry_on_transaction_conflict("allocate user id", || self.next_uid()).await?;
        let credentials: Vec<ProviderCredential> = user.credentials.values().cloned().collect();
        let content = UserCreate::new(uid, user);

        // The reserved uid is reused across attempts.
        let user = retry_on_transaction_conflict("create user", || {
            self.insert_user(content.clone(), &credentials)
        })
        .await?;

        debug!("Stored user {}", user.id);
        Ok(user)
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> Result<User, StoreError> {
        retry_on_transaction_conflict("update user", || self.apply_patch(id, &patch)).await
    }

    async fn apply_patch(&self, id: UserId, patch: &UserPatch) -> Result<User, StoreError> {
        if patch.is_empty() {
            return self
                .get_user_by_id(id)
                .await?
                .ok_or(StoreError::NotFound { id });
        }

        // Field name -> new value; `None` unsets the field.
        let mut fields: BTreeMap<&'static str, Option<serde_json::Value>> = BTreeMap::new();

        for provider in &patch.clear {
            for field in provider.field_names().all() {
                fields.insert(field, None);
            }
        }
        if let Some(name) = &patch.name {
            fields.insert("name", Some(json!(name)));
        }
        if let Some(avatar) = &patch.avatar {
            fields.insert("avatar", Some(json!(avatar)));
        }
        for credential in &patch.link {
            let names = credential.provider.field_names();
            fields.insert(names.client_id, Some(json!(credential.client_id.as_str())));
            fields.insert(names.access_token, Some(json!(credential.access_token)));
            if let Some(refresh_token) = &credential.refresh_token {
                fields.insert(names.refresh_token, Some(json!(refresh_token)));
            }
            if let Some(expiry) = credential.refresh_token_expiry {
                fields.insert(names.refresh_token_expiry, Some(json!(expiry)));
            }
        }

        let assignments: Vec<String> = fields
            .iter()
            .map(|(field, value)| match value {
                Some(_) => format!("{field} = ${field}"),
                None => format!("{field} = NONE"),
            })
            .collect();

        let query = format!(
            "UPDATE user SET {} WHERE uid = $uid RETURN AFTER",
            assignments.join(", ")
        );

        let mut query_builder = self.db.query(query).bind(("uid", uid_of(id)?));
        for (field, value) in fields {
            if let Some(value) = value {
                query_builder = query_builder.bind((field.to_string(), value));
            }
        }

        let mut res = query_builder.await?;
        let users: Vec<UserRecord> = res
            .take(0)
            .map_err(|e| classify_write_error(e, &patch.link))?;

        users
            .into_iter()
            .next()
            .map(UserRecord::into_user)
            .ok_or(StoreError::NotFound { id })
    }
}

impl IdentityStore for SurrealIdentityStore {
    fn find_one(&self, lookup: UserLookup) -> StoreFuture<'_, Option<User>> {
        Box::pin(retry_on_transaction_conflict("find user", move || {
            let lookup = lookup.clone();
            async move {
                match lookup {
                    UserLookup::ById(id) => self.get_user_by_id(id).await,
                    UserLookup::ByCredential {
                        provider,
                        client_id,
                    } => self.get_user_by_client_id(provider, &client_id).await,
                }
            }
        }))
    }

    fn create(&self, user: NewUser) -> StoreFuture<'_, User> {
        Box::pin(self.create_user(user))
    }

    fn update(&self, id: UserId, patch: UserPatch) -> StoreFuture<'_, User> {
        Box::pin(self.update_user(id, patch))
    }
}

fn uid_of(id: UserId) -> Result<i64, StoreError> {
    i64::try_from(id.get()).map_err(|_| StoreError::NotFound { id })
}

/// Whether the engine aborted the transaction and asks for it to be re-run.
fn is_transaction_conflict(err: &StoreError) -> bool {
    matches!(err, StoreError::Database(message) if message.contains("can be retried"))
}

async fn retry_on_transaction_conflict<T, F, Fut>(
    operation: &str,
    mut run: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match run().await {
            Err(err) if is_transaction_conflict(&err) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                debug!(
                    "Transaction conflict during {} (attempt {}/{}), retrying",
                    operation, attempt, MAX_TRANSACTION_ATTEMPTS
                );
                tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 5)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Turn a unique index violation on a client id into a conflict.
fn classify_write_error(err: surrealdb::Error, written: &[ProviderCredential]) -> StoreError {
    let message = err.to_string();
    if message.contains("already contains") {
        let conflict = written
            .iter()
            .find(|c| message.contains(&client_id_index(c.provider)));
        if let Some(credential) = conflict {
            return StoreError::Conflict {
                provider: credential.provider,
                client_id: credential.client_id.clone(),
            };
        }
    }
    StoreError::Database(message)
}
