//! Mitho CLI - Operator commands
//!
//! Usage:
//!   mitho migrate
//!   mitho purge-tokens
//!   mitho revoke-sessions <user-id>
//!   mitho gen-secret
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use clap::{Parser, Subcommand};
use mitho_api::store::{PgStore, RefreshTokenStore};
use mitho_core::AppConfig;
use rand::RngCore;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mitho")]
#[command(about = "Mitho authentication service operator CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the database schema
    Migrate,
    /// Delete expired refresh tokens
    PurgeTokens,
    /// Revoke every active refresh token of a user
    RevokeSessions {
        /// User id
        user_id: Uuid,
    },
    /// Print a random signing secret for JWT_SECRET_KEY
    GenSecret {
        /// Number of random bytes
        #[arg(long, default_value_t = 48)]
        bytes: usize,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgStore> {
    let store = PgStore::connect(
        &config.database.postgres_url,
        config.database.postgres_pool_size,
    )
    .await
    .context("failed to connect to PostgreSQL")?;
    Ok(store)
}

fn generate_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mitho_api=info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenSecret { bytes } => {
            anyhow::ensure!(bytes >= 32, "a signing secret needs at least 32 bytes");
            println!("{}", generate_secret(bytes));
        }
        Commands::Migrate => {
            let config = load_config(cli.config)?;
            let store = connect(&config).await?;
            store.migrate().await?;
            println!("Schema is up to date");
        }
        Commands::PurgeTokens => {
            let config = load_config(cli.config)?;
            let store = connect(&config).await?;
            let deleted = store.delete_expired(None).await?;
            println!("Deleted {} expired refresh tokens", deleted);
        }
        Commands::RevokeSessions { user_id } => {
            let config = load_config(cli.config)?;
            let store = connect(&config).await?;
            let revoked = store.revoke_all(None, user_id).await?;
            tracing::info!(%user_id, revoked, "Sessions revoked from CLI");
            println!("Revoked {} sessions for user {}", revoked, user_id);
        }
    }

    Ok(())
}
