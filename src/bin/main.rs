use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;
use stream_identity::{
    AppConfig, Environment, ProfileHints, Provider, ProviderCredential, TokenIssuer, UserId,
    create_resolver,
};

#[derive(Parser)]
#[command(name = "stream-identity")]
#[command(about = "Provider account linking and stream token issuance")]
struct Cli {
    /// Database URL (overrides SURREALDB_URL)
    #[arg(long, global = true)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,
    /// Resolve a provider login to a user and mint a stream token
    Login {
        /// Provider name (youtube, soundcloud)
        #[arg(long)]
        provider: Provider,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        refresh_token: Option<String>,
        /// Refresh token expiry as Unix seconds
        #[arg(long, requires = "refresh_token")]
        refresh_token_expiry: Option<i64>,
        /// Id of an already signed-in user to link this provider to
        #[arg(long)]
        hint_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Remove a provider's credentials from a user
    Detach {
        user_id: u64,
        #[arg(long)]
        provider: Provider,
    },
    /// Print a stored user
    Show { user_id: u64 },
    /// Mint a stream token from explicit attributes
    Token {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        avatar: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("stream_identity=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    // Resolve everything up front so a missing secret stops us before any work.
    let mut config = AppConfig::from_env(&Environment::from_process())?;
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    let issuer = TokenIssuer::new(config.token_secret.clone());

    match cli.command {
        Commands::Init => {
            info!("Initializing schema at {}", config.database.url);
            create_resolver(config.database).await?;
            println!("Schema ready");
        }
        Commands::Login {
            provider,
            client_id,
            access_token,
            refresh_token,
            refresh_token_expiry,
            hint_id,
            name,
            avatar,
        } => {
            let resolver = create_resolver(config.database).await?;

            let mut credential = ProviderCredential::new(provider, client_id, access_token);
            if let Some(refresh_token) = refresh_token {
                credential = credential.with_refresh_token(refresh_token, refresh_token_expiry);
            }

            let hints = ProfileHints {
                // Numbers arrive as JSON numbers; anything else stays an opaque string.
                id: hint_id.map(|raw| {
                    serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw))
                }),
                name,
                avatar,
            };

            let user = resolver.resolve_or_create(credential, hints).await?;
            let token = match issuer.issue_for(&user) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!("No stream token for user {}: {}", user.id, e);
                    None
                }
            };

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "user": user, "token": token }))?
            );
        }
        Commands::Detach { user_id, provider } => {
            let resolver = create_resolver(config.database).await?;
            let id = UserId::new(user_id);

            let user = resolver
                .find_user(id)
                .await?
                .with_context(|| format!("User {} not found", id))?;
            let user = resolver.detach_provider(&user, provider).await?;

            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Show { user_id } => {
            let resolver = create_resolver(config.database).await?;
            let id = UserId::new(user_id);

            let user = resolver
                .find_user(id)
                .await?
                .with_context(|| format!("User {} not found", id))?;

            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::Token { id, name, avatar } => {
            let token = issuer.issue(&id, &name, &avatar)?;
            println!("{}", token);
        }
    }

    Ok(())
}
