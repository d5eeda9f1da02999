use anyhow::Result;
use serde::{Deserialize, Serialize};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

use crate::config::{EnvVar, Environment, VarSource};
use crate::types::Provider;

pub type Db = Surreal<Any>;

pub const DEFAULT_DB_URL: &str = "memory";
pub const DEFAULT_NAMESPACE: &str = "stream";
pub const DEFAULT_DATABASE: &str = "identity";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DB_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            username: None,
            password: None,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env<S: VarSource>(env: &Environment<S>) -> crate::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            url: env
                .get(&EnvVar::new("SURREALDB_URL").with_default(defaults.url))?
                .unwrap_or_default(),
            namespace: env
                .get(&EnvVar::new("SURREALDB_NAMESPACE").with_default(defaults.namespace))?
                .unwrap_or_default(),
            database: env
                .get(&EnvVar::new("SURREALDB_DATABASE").with_default(defaults.database))?
                .unwrap_or_default(),
            username: env.get(&EnvVar::new("SURREALDB_USERNAME"))?,
            password: env.get(&EnvVar::new("SURREALDB_PASSWORD"))?,
        })
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Index name guarding uniqueness of one provider's client id.
pub fn client_id_index(provider: Provider) -> String {
    format!("user_{}", provider.field_names().client_id)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let mut schema_queries = vec![
        // Users are schemaless so provider fields can be added and unset freely
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS uid ON TABLE user TYPE int;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user VALUE $before OR time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE user VALUE time::now();
         DEFINE INDEX IF NOT EXISTS user_uid ON TABLE user COLUMNS uid UNIQUE;"
            .to_string(),
        // Monotonic id counters
        "DEFINE TABLE IF NOT EXISTS id_counter SCHEMALESS;".to_string(),
    ];

    for provider in Provider::ALL {
        schema_queries.push(format!(
            "DEFINE INDEX IF NOT EXISTS {} ON TABLE user COLUMNS {} UNIQUE;",
            client_id_index(provider),
            provider.field_names().client_id,
        ));
    }

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    debug!("User schema ensured");
    Ok(())
}
