use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::identity::{NewUser, ProviderCredential, User};
use crate::types::{ClientId, Provider, UserId};

/// Persisted representation of a user in SurrealDB (table: `user`).
///
/// Provider credentials are stored flat, one column per field, so each
/// `<provider>_client_id` can carry its own unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier.
    pub id: RecordId,
    /// Store-assigned numeric id exposed to callers.
    pub uid: i64,
    pub name: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub youtube_client_id: Option<String>,
    #[serde(default)]
    pub youtube_access_token: Option<String>,
    #[serde(default)]
    pub youtube_refresh_token: Option<String>,
    #[serde(default)]
    pub youtube_refresh_token_expiry: Option<i64>,
    #[serde(default)]
    pub soundcloud_client_id: Option<String>,
    #[serde(default)]
    pub soundcloud_access_token: Option<String>,
    #[serde(default)]
    pub soundcloud_refresh_token: Option<String>,
    #[serde(default)]
    pub soundcloud_refresh_token_expiry: Option<i64>,
    /// When the user was first stored.
    pub created_at: Option<Datetime>,
    /// Last write time.
    pub updated_at: Option<Datetime>,
}

impl UserRecord {
    /// Credential stored for `provider`, if its client id is set.
    pub fn credential(&self, provider: Provider) -> Option<ProviderCredential> {
        let (client_id, access_token, refresh_token, refresh_token_expiry) = match provider {
            Provider::Youtube => (
                &self.youtube_client_id,
                &self.youtube_access_token,
                &self.youtube_refresh_token,
                self.youtube_refresh_token_expiry,
            ),
            Provider::Soundcloud => (
                &self.soundcloud_client_id,
                &self.soundcloud_access_token,
                &self.soundcloud_refresh_token,
                self.soundcloud_refresh_token_expiry,
            ),
        };

        Some(ProviderCredential {
            provider,
            client_id: ClientId::new(client_id.clone()?),
            access_token: access_token.clone().unwrap_or_default(),
            refresh_token: refresh_token.clone(),
            refresh_token_expiry,
        })
    }

    pub fn into_user(self) -> User {
        let credentials = Provider::ALL
            .into_iter()
            .filter_map(|p| self.credential(p).map(|c| (p, c)))
            .collect();

        User {
            // uids come from `id_counter` and start at 1
            id: UserId::new(u64::try_from(self.uid).unwrap_or_default()),
            name: self.name,
            avatar: self.avatar,
            credentials,
        }
    }
}

/// Payload used when inserting a new user.
///
/// Unset columns are omitted so the unique indexes never see them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCreate {
    pub uid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_refresh_token_expiry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soundcloud_client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soundcloud_access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soundcloud_refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soundcloud_refresh_token_expiry: Option<i64>,
}

impl UserCreate {
    pub fn new(uid: i64, user: NewUser) -> Self {
        let mut create = Self {
            uid,
            name: user.name,
            avatar: user.avatar,
            ..Default::default()
        };
        for credential in user.credentials.values() {
            create.set_credential(credential);
        }
        create
    }

    fn set_credential(&mut self, credential: &ProviderCredential) {
        let (client_id, access_token, refresh_token, refresh_token_expiry) =
            match credential.provider {
                Provider::Youtube => (
                    &mut self.youtube_client_id,
                    &mut self.youtube_access_token,
                    &mut self.youtube_refresh_token,
                    &mut self.youtube_refresh_token_expiry,
                ),
                Provider::Soundcloud => (
                    &mut self.soundcloud_client_id,
                    &mut self.soundcloud_access_token,
                    &mut self.soundcloud_refresh_token,
                    &mut self.soundcloud_refresh_token_expiry,
                ),
            };

        *client_id = Some(credential.client_id.as_str().to_string());
        *access_token = Some(credential.access_token.clone());
        *refresh_token = credential.refresh_token.clone();
        *refresh_token_expiry = credential.refresh_token_expiry;
    }
}

/// Row of the `id_counter` table used to hand out user ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub value: i64,
}
