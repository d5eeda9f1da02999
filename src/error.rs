//! Error types for identity resolution, token issuance and configuration.

use thiserror::Error;

use crate::identity::StoreError;
use crate::types::UserId;

const MISSING_SINGLE_VAR: &str = "The following environment variable must be set: ";
const MISSING_MULTI_VARS: &str = "One of the following environment variables must be set: ";

/// Errors surfaced to callers of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input was missing or empty.
    #[error("{field} must be defined")]
    Validation { field: &'static str },

    /// A required configuration value was not set under any candidate name.
    #[error("{}", missing_config_message(.names))]
    MissingConfig { names: Vec<String> },

    /// A configuration value was set but could not be transformed.
    #[error("Invalid value for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },

    /// An id hint did not resolve to a stored user.
    #[error("User not found: {id}")]
    NotFound { id: UserId },

    /// The identity store failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

fn missing_config_message(names: &[String]) -> String {
    let prefix = if names.len() == 1 {
        MISSING_SINGLE_VAR
    } else {
        MISSING_MULTI_VARS
    };
    format!("{}{}", prefix, names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::Validation { field: "avatar" }.to_string(),
            "avatar must be defined"
        );
        assert_eq!(
            Error::NotFound { id: UserId::new(9) }.to_string(),
            "User not found: 9"
        );
    }

    #[test]
    fn test_missing_config_names_every_candidate() {
        let single = Error::MissingConfig {
            names: vec!["TOKEN_SECRET".to_string()],
        };
        assert_eq!(
            single.to_string(),
            "The following environment variable must be set: TOKEN_SECRET"
        );

        let multi = Error::MissingConfig {
            names: vec!["STREAM_TOKEN_SECRET".to_string(), "TOKEN_SECRET".to_string()],
        };
        assert_eq!(
            multi.to_string(),
            "One of the following environment variables must be set: STREAM_TOKEN_SECRET, TOKEN_SECRET"
        );
    }
}
