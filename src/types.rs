//! NewType wrappers for strong typing across identity resolution and tokens.
//!
//! These keep semantically different strings apart (a provider client id is
//! never accepted where a stream token is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Provider-issued identifier for a linked account.
    ///
    /// Unique within one provider; the same value may legitimately appear
    /// under two different providers.
    ClientId
);

newtype_string!(
    /// Lowercase hex HMAC presented as a bearer credential on the stream endpoint.
    StreamToken
);

/// Store-assigned numeric identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted field names for one provider's credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderFields {
    pub client_id: &'static str,
    pub access_token: &'static str,
    pub refresh_token: &'static str,
    pub refresh_token_expiry: &'static str,
}

impl ProviderFields {
    /// All field names in storage order.
    pub fn all(&self) -> [&'static str; 4] {
        [
            self.client_id,
            self.access_token,
            self.refresh_token,
            self.refresh_token_expiry,
        ]
    }
}

/// Third-party authentication source a user can link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Youtube,
    Soundcloud,
}

impl Provider {
    /// Every known provider.
    pub const ALL: [Provider; 2] = [Provider::Youtube, Provider::Soundcloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Soundcloud => "soundcloud",
        }
    }

    /// Flat record field names used for this provider's credential set.
    ///
    /// Every name starts with `<provider>_`; lookups and detach depend on it.
    pub fn field_names(&self) -> ProviderFields {
        match self {
            Self::Youtube => ProviderFields {
                client_id: "youtube_client_id",
                access_token: "youtube_access_token",
                refresh_token: "youtube_refresh_token",
                refresh_token_expiry: "youtube_refresh_token_expiry",
            },
            Self::Soundcloud => ProviderFields {
                client_id: "soundcloud_client_id",
                access_token: "soundcloud_access_token",
                refresh_token: "soundcloud_refresh_token",
                refresh_token_expiry: "soundcloud_refresh_token_expiry",
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(Error::Validation { field: "provider" })
    }
}
