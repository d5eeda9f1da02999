//! Process configuration resolved once at startup.
//!
//! Values are looked up through a [`VarSource`] so tests can resolve from a
//! plain map instead of the process environment. Required values fail at
//! resolution time, before any identity or token operation runs.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt::Display;
use std::str::FromStr;

use tracing::debug;

use crate::db::DatabaseConfig;
use crate::error::{Error, Result};
use crate::token::TokenSecret;

/// Candidate names for the token-signing secret, in lookup order.
pub const TOKEN_SECRET_VARS: [&str; 2] = ["STREAM_TOKEN_SECRET", "TOKEN_SECRET"];

/// Somewhere configuration variables can be read from.
pub trait VarSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl VarSource for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl VarSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Description of one configuration value.
#[derive(Debug, Clone)]
pub struct EnvVar {
    names: Vec<String>,
    required: bool,
    default: Option<String>,
}

impl EnvVar {
    /// A value looked up under a single name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
            required: false,
            default: None,
        }
    }

    /// A value looked up under several names; the first one set wins.
    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            required: false,
            default: None,
        }
    }

    /// Fail resolution when neither a variable nor a default is available.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Primary name, used when reporting transform failures.
    fn primary(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }
}

/// Resolves [`EnvVar`]s against a [`VarSource`].
#[derive(Debug, Clone, Default)]
pub struct Environment<S = ProcessEnv> {
    source: S,
}

impl Environment<ProcessEnv> {
    pub fn from_process() -> Self {
        Self { source: ProcessEnv }
    }
}

impl<S: VarSource> Environment<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Look up a value, falling back to its default.
    pub fn get(&self, var: &EnvVar) -> Result<Option<String>> {
        let found = var
            .names
            .iter()
            .find_map(|name| self.source.var(name).map(|value| (name, value)));

        let value = match found {
            Some((name, value)) => {
                debug!("Resolved configuration from {}", name);
                Some(value)
            }
            None => var.default.clone(),
        };

        if var.required && value.is_none() {
            return Err(Error::MissingConfig {
                names: var.names.clone(),
            });
        }

        Ok(value)
    }

    /// Look up a value and parse it into `T`.
    pub fn get_parsed<T>(&self, var: &EnvVar) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(var)?
            .map(|raw| {
                raw.parse::<T>().map_err(|e| Error::InvalidConfig {
                    name: var.primary().to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }
}

/// Everything the service needs before it can handle a login.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub token_secret: TokenSecret,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Resolve and validate the full configuration.
    pub fn from_env<S: VarSource>(env: &Environment<S>) -> Result<Self> {
        let secret = env
            .get(&EnvVar::any_of(TOKEN_SECRET_VARS).required())?
            .unwrap_or_default();
        let token_secret = TokenSecret::new(secret).ok_or_else(|| Error::InvalidConfig {
            name: TOKEN_SECRET_VARS[0].to_string(),
            reason: "secret must not be empty".to_string(),
        })?;

        Ok(Self {
            token_secret,
            database: DatabaseConfig::from_env(env)?,
        })
    }
}
