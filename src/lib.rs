// Core modules
pub mod config;
pub mod db;
mod error;
pub mod identity;
pub mod token;
mod types;

// Re-export key types and functions
pub use config::{AppConfig, EnvVar, Environment, ProcessEnv, VarSource};
pub use db::{DatabaseConfig, SurrealIdentityStore, create_connection, ensure_schema};
pub use error::{Error, Result};
pub use identity::{
    IdentityResolver, IdentityStore, MemoryIdentityStore, ProfileHints, ProviderCredential,
    StoreError, User,
};
pub use token::{TokenIssuer, TokenSecret};
pub use types::{ClientId, Provider, ProviderFields, StreamToken, UserId};

use std::sync::Arc;

/// Connect to the configured database and build a resolver over it.
///
/// The schema is applied before the resolver is returned, so the unique
/// client id indexes are in place for the first login.
pub async fn create_resolver(
    config: DatabaseConfig,
) -> anyhow::Result<IdentityResolver<Arc<SurrealIdentityStore>>> {
    let db = create_connection(config).await?;
    ensure_schema(&db).await?;

    Ok(IdentityResolver::new(Arc::new(SurrealIdentityStore::new(db))))
}
