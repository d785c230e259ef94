//! `wabulk` command-line client.

mod cli;
mod commands;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use wabulk_backend::BackendClient;
use wabulk_common::config::AppConfig;

use crate::cli::{Cli, Commands};
use crate::commands::{BulkArgs, Ctx};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,wabulk_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.backend_url {
        config.backend_api_url = url.trim_end_matches('/').to_string();
    }
    if cli.user_id.is_some() {
        config.user_id = cli.user_id;
    }

    let client = Arc::new(BackendClient::new(
        &config.backend_api_url,
        config.backend_timeout(),
    )?);
    tracing::debug!(backend = %client.base_url(), "Backend client ready");
    let ctx = Ctx { config, client };

    match cli.command {
        Commands::Sessions { watch } => commands::sessions(&ctx, watch).await?,
        Commands::CreateSession => commands::create_session(&ctx).await?,
        Commands::Logout { session } => commands::logout(&ctx, &session).await?,
        Commands::Send {
            session,
            to,
            message,
            media,
        } => {
            commands::send(&ctx, &session, &to, message.as_deref(), media.as_deref()).await?
        }
        Commands::Bulk {
            session,
            file,
            text_file,
            message,
            media,
            delay_ms,
        } => {
            let args = BulkArgs {
                session,
                file,
                text_file,
                message,
                media,
                delay_ms,
            };
            return commands::bulk(&ctx, args).await;
        }
        Commands::Messages {
            session,
            chat,
            limit,
            follow,
        } => commands::messages(&ctx, &session, chat.as_deref(), limit, follow).await?,
        Commands::Chats { session } => commands::chats(&ctx, &session).await?,
    }

    Ok(ExitCode::SUCCESS)
}
