//! PrismFit CLI - account and session administration
//!
//! Usage:
//!   prismfit register <email> <password> <nickname> <date-of-birth>
//!   prismfit login <email> <password>
//!   prismfit refresh <refresh-token>
//!   prismfit logout-all <user-id>
//!   prismfit purge-tokens
//!   prismfit migrate
//!
//! Configuration is read the same way as the API server (environment
//! variables, optionally layered over `PRISMFIT_CONFIG`). With the default
//! in-memory backend nothing outlives the process, so point
//! `STORAGE_BACKEND=postgres` at a database for real use.

use anyhow::Context;
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use prismfit_api::{handlers::auth::RegisterRequest, state::AppState};
use prismfit_core::{AppConfig, PgStore, TokenPair};
use uuid::Uuid;
use validator::Validate;

#[derive(Parser)]
#[command(name = "prismfit")]
#[command(about = "PrismFit account and session administration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account and print its first token pair
    Register {
        email: String,
        password: String,
        nickname: String,
        /// Date of birth as YYYY-MM-DD (UTC)
        date_of_birth: NaiveDate,
    },
    /// Log in and print a new token pair
    Login { email: String, password: String },
    /// Exchange a refresh token for a new pair
    Refresh { refresh_token: String },
    /// Revoke every refresh token of a user
    LogoutAll { user_id: Uuid },
    /// Delete expired refresh tokens
    PurgeTokens,
    /// Create the PostgreSQL schema
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;

    match cli.command {
        Commands::Migrate => migrate(&config).await,
        command => run(command, config).await,
    }
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let store = PgStore::connect(
        &config.database.postgres_url,
        config.database.postgres_pool_size,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    store.migrate().await?;
    println!("Schema is up to date");
    Ok(())
}

async fn run(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let auth = &state.auth;

    match command {
        Commands::Register {
            email,
            password,
            nickname,
            date_of_birth,
        } => {
            let request = RegisterRequest {
                email,
                password,
                nickname,
                date_of_birth: date_of_birth
                    .and_time(NaiveTime::MIN)
                    .and_utc()
                    .timestamp_millis(),
            };
            request.validate()?;

            let pair = auth
                .register(
                    &request.email,
                    &request.password,
                    &request.nickname,
                    request.date_of_birth,
                )
                .await?;
            print_pair(&pair)?;
        }
        Commands::Login { email, password } => {
            let pair = auth.login(&email, &password).await?;
            print_pair(&pair)?;
        }
        Commands::Refresh { refresh_token } => {
            let pair = auth.refresh(&refresh_token).await?;
            print_pair(&pair)?;
        }
        Commands::LogoutAll { user_id } => {
            let removed = auth.logout(user_id, None, true).await?;
            println!("Revoked {removed} session(s) for {user_id}");
        }
        Commands::PurgeTokens => {
            let purged = auth.purge_expired_tokens().await?;
            println!("Purged {purged} expired refresh token(s)");
        }
        Commands::Migrate => migrate(&state.config).await?,
    }

    Ok(())
}

fn print_pair(pair: &TokenPair) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(pair)?);
    Ok(())
}
