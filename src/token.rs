//! Stream endpoint tokens.
//!
//! A token is the lowercase hex HMAC-SHA256 of `id || name || avatar` under a
//! process-wide secret. The receiving side recomputes the MAC over the same
//! tuple, so the three inputs and their order are part of the wire contract.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::identity::User;
use crate::types::StreamToken;

type HmacSha256 = Hmac<Sha256>;

/// Length of an issued token in hex characters.
pub const TOKEN_HEX_LEN: usize = 64;

/// Signing key for stream tokens. Never printed.
#[derive(Clone)]
pub struct TokenSecret(Vec<u8>);

impl TokenSecret {
    /// Wrap a secret; empty secrets are rejected.
    pub fn new(secret: impl Into<Vec<u8>>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret(..)")
    }
}

/// Mints and checks stream tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    secret: TokenSecret,
}

impl TokenIssuer {
    pub fn new(secret: TokenSecret) -> Self {
        Self { secret }
    }

    /// Issue a token binding `id`, `name` and `avatar`.
    ///
    /// `id` is rendered with `Display`, so numeric ids hash as decimal text.
    /// Each input must be non-empty; the first empty one is reported.
    pub fn issue(&self, id: impl fmt::Display, name: &str, avatar: &str) -> Result<StreamToken> {
        let id = id.to_string();
        let mac = self.mac(&id, name, avatar)?;
        Ok(StreamToken::new(hex::encode(mac.finalize().into_bytes())))
    }

    /// Issue a token for a stored user.
    pub fn issue_for(&self, user: &User) -> Result<StreamToken> {
        self.issue(
            user.id,
            user.name.as_deref().unwrap_or_default(),
            user.avatar.as_deref().unwrap_or_default(),
        )
    }

    /// Check a presented token against the tuple it claims to bind.
    ///
    /// Comparison is constant time. Malformed or empty input never verifies.
    pub fn verify(&self, token: &str, id: impl fmt::Display, name: &str, avatar: &str) -> bool {
        let Ok(presented) = hex::decode(token) else {
            return false;
        };
        let id = id.to_string();
        match self.mac(&id, name, avatar) {
            Ok(mac) => mac.verify_slice(&presented).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, id: &str, name: &str, avatar: &str) -> Result<HmacSha256> {
        if id.is_empty() {
            return Err(Error::Validation { field: "id" });
        }
        if name.is_empty() {
            return Err(Error::Validation { field: "name" });
        }
        if avatar.is_empty() {
            return Err(Error::Validation { field: "avatar" });
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(id.as_bytes());
        mac.update(name.as_bytes());
        mac.update(avatar.as_bytes());
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenSecret::new("test-secret").unwrap())
    }

    #[test]
    fn test_issue_is_deterministic() {
        let a = issuer().issue(7, "Ann", "a.png").unwrap();
        let b = issuer().issue(7, "Ann", "a.png").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), TOKEN_HEX_LEN);
        assert!(
            a.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_issue_matches_reference_hmac() {
        // HMAC-SHA256(key="key", "The quick brown fox jumps over the lazy dog")
        let issuer = TokenIssuer::new(TokenSecret::new("key").unwrap());
        let token = issuer
            .issue("The quick ", "brown fox jumps ", "over the lazy dog")
            .unwrap();
        assert_eq!(
            token.as_str(),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_issue_is_sensitive_to_every_input() {
        let issuer = issuer();
        let base = issuer.issue(7, "Ann", "a.png").unwrap();

        assert_ne!(base, issuer.issue(7, "Ann", "b.png").unwrap());
        assert_ne!(base, issuer.issue(8, "Ann", "a.png").unwrap());
        assert_ne!(base, issuer.issue(7, "Anne", "a.png").unwrap());

        let other = TokenIssuer::new(TokenSecret::new("other-secret").unwrap());
        assert_ne!(base, other.issue(7, "Ann", "a.png").unwrap());
    }

    #[test]
    fn test_numeric_and_string_ids_agree() {
        let issuer = issuer();
        assert_eq!(
            issuer.issue(UserId::new(7), "Ann", "a.png").unwrap(),
            issuer.issue("7", "Ann", "a.png").unwrap()
        );
    }

    #[test]
    fn test_issue_names_missing_field() {
        let issuer = issuer();
        assert!(matches!(
            issuer.issue("", "Ann", "a.png"),
            Err(Error::Validation { field: "id" })
        ));
        assert!(matches!(
            issuer.issue(7, "", "a.png"),
            Err(Error::Validation { field: "name" })
        ));
        assert!(matches!(
            issuer.issue(7, "Ann", ""),
            Err(Error::Validation { field: "avatar" })
        ));
    }

    #[test]
    fn test_issue_for_user_without_avatar() {
        let user = User {
            id: UserId::new(3),
            name: Some("Ann".to_string()),
            avatar: None,
            credentials: Default::default(),
        };
        assert!(matches!(
            issuer().issue_for(&user),
            Err(Error::Validation { field: "avatar" })
        ));
    }

    #[test]
    fn test_verify() {
        let issuer = issuer();
        let token = issuer.issue(7, "Ann", "a.png").unwrap();

        assert!(issuer.verify(token.as_str(), 7, "Ann", "a.png"));
        assert!(!issuer.verify(token.as_str(), 7, "Ann", "b.png"));
        assert!(!issuer.verify("not-hex", 7, "Ann", "a.png"));
        assert!(!issuer.verify(&token.as_str()[..10], 7, "Ann", "a.png"));
        assert!(!issuer.verify(token.as_str(), "", "Ann", "a.png"));
    }

    #[test]
    fn test_long_secrets_are_accepted() {
        // Keys longer than the SHA-256 block are hashed down first.
        let issuer = TokenIssuer::new(TokenSecret::new(vec![7u8; 200]).unwrap());
        let token = issuer.issue(1, "Ann", "a.png").unwrap();
        assert!(issuer.verify(token.as_str(), 1, "Ann", "a.png"));
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = TokenSecret::new("hunter2").unwrap();
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert!(TokenSecret::new("").is_none());
    }
}
