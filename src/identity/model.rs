//! Users, provider credentials and the values passed to the identity store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ClientId, Provider, UserId};

/// One provider's authentication result for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    /// Provider that issued the credential.
    pub provider: Provider,
    /// Provider-side account identifier, unique per provider.
    pub client_id: ClientId,
    /// Current access token.
    pub access_token: String,
    /// Refresh token, when the provider hands one out.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Refresh token expiry as Unix seconds.
    #[serde(default)]
    pub refresh_token_expiry: Option<i64>,
}

impl ProviderCredential {
    pub fn new(
        provider: Provider,
        client_id: impl Into<ClientId>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            access_token: access_token.into(),
            refresh_token: None,
            refresh_token_expiry: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>, expiry: Option<i64>) -> Self {
        self.refresh_token = Some(token.into());
        self.refresh_token_expiry = expiry;
        self
    }

    /// Whether the stored refresh token expiry lies in the past.
    ///
    /// Credentials without an expiry never report as expired.
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_token_expiry
            .is_some_and(|expiry| expiry <= now.timestamp())
    }

    /// Fold `self` over an existing credential for the same provider.
    ///
    /// Fields set on `self` win; optional fields it leaves unset keep the
    /// existing value.
    pub fn merged_over(&self, existing: Option<&ProviderCredential>) -> ProviderCredential {
        let mut merged = self.clone();
        if let Some(existing) = existing {
            if merged.refresh_token.is_none() {
                merged.refresh_token = existing.refresh_token.clone();
            }
            if merged.refresh_token_expiry.is_none() {
                merged.refresh_token_expiry = existing.refresh_token_expiry;
            }
        }
        merged
    }
}

/// A person known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Linked provider credentials, at most one set per provider.
    #[serde(default)]
    pub credentials: BTreeMap<Provider, ProviderCredential>,
}

impl User {
    pub fn credential(&self, provider: Provider) -> Option<&ProviderCredential> {
        self.credentials.get(&provider)
    }

    pub fn is_linked(&self, provider: Provider) -> bool {
        self.credentials.contains_key(&provider)
    }

    /// Linked providers in a stable order.
    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.credentials.keys().copied()
    }

    /// Copy of this user with every field of `provider` removed.
    pub fn without_provider(&self, provider: Provider) -> User {
        let mut user = self.clone();
        user.credentials.remove(&provider);
        user
    }

    /// Copy of this user with `patch` applied.
    pub fn patched(&self, patch: &UserPatch) -> User {
        let mut user = self.clone();
        for provider in &patch.clear {
            user.credentials.remove(provider);
        }
        if let Some(name) = &patch.name {
            user.name = Some(name.clone());
        }
        if let Some(avatar) = &patch.avatar {
            user.avatar = Some(avatar.clone());
        }
        for credential in &patch.link {
            let merged = credential.merged_over(user.credentials.get(&credential.provider));
            user.credentials.insert(credential.provider, merged);
        }
        user
    }
}

/// Optional display data sent along with a login.
///
/// `id` is whatever the caller sent. Only a non-negative JSON integer is
/// treated as a reference to an existing user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileHints {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl ProfileHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    /// The hinted user id, if it is a usable stored id.
    pub fn numeric_id(&self) -> Option<UserId> {
        let id = self.id.as_ref()?;
        if let Some(id) = id.as_u64() {
            return Some(UserId::new(id));
        }
        // JSON clients may send integral ids as floats (`1.0`).
        let id = id.as_f64()?;
        (id.is_finite() && id >= 0.0 && id.fract() == 0.0 && id <= u64::MAX as f64)
            .then(|| UserId::new(id as u64))
    }
}

/// Payload for inserting a user. Ids are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub credentials: BTreeMap<Provider, ProviderCredential>,
}

impl NewUser {
    /// Combine profile hints with the first credential of a new user.
    ///
    /// The hint id is dropped here; it never reaches the store.
    pub fn from_login(credential: ProviderCredential, hints: ProfileHints) -> Self {
        let mut credentials = BTreeMap::new();
        credentials.insert(credential.provider, credential);
        Self {
            name: hints.name,
            avatar: hints.avatar,
            credentials,
        }
    }
}

/// Exact-match filter for a single user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    ById(UserId),
    ByCredential {
        provider: Provider,
        client_id: ClientId,
    },
}

impl UserLookup {
    pub fn by_credential(credential: &ProviderCredential) -> Self {
        Self::ByCredential {
            provider: credential.provider,
            client_id: credential.client_id.clone(),
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        match self {
            Self::ById(id) => user.id == *id,
            Self::ByCredential {
                provider,
                client_id,
            } => user
                .credential(*provider)
                .is_some_and(|c| &c.client_id == client_id),
        }
    }
}

/// Partial update of a stored user.
///
/// `clear` is applied before `link`; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub link: Vec<ProviderCredential>,
    pub clear: Vec<Provider>,
}

impl UserPatch {
    /// Fold a credential into the user.
    pub fn link(credential: ProviderCredential) -> Self {
        Self {
            link: vec![credential],
            ..Default::default()
        }
    }

    /// Remove every field of `provider`.
    pub fn detach(provider: Provider) -> Self {
        Self {
            clear: vec![provider],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.avatar.is_none() && self.link.is_empty() && self.clear.is_empty()
    }
}
