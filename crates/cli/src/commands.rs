//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use wabulk_backend::{BackendClient, HttpTransport, OutboundMessage, SessionWatcher};
use wabulk_common::config::AppConfig;
use wabulk_common::types::ChatMessage;
use wabulk_dispatcher::rows::{parse_delimited, parse_pasted};
use wabulk_dispatcher::{Attachment, BulkDispatcher, DispatchJob};

use crate::output;

/// Everything a handler needs.
pub struct Ctx {
    pub config: AppConfig,
    pub client: Arc<BackendClient>,
}

pub async fn sessions(ctx: &Ctx, watch: bool) -> anyhow::Result<()> {
    let user_id = ctx.config.user_id.as_deref();
    if !watch {
        let sessions = ctx.client.list_sessions(user_id).await?;
        if sessions.is_empty() {
            println!("No sessions.");
        }
        for session in &sessions {
            println!("{}", output::session_line(session));
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let (mut rx, handle) = SessionWatcher::new(ctx.client.clone(), ctx.config.user_id.clone())
        .with_interval(ctx.config.session_poll_interval())
        .spawn(cancel.clone());

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("--- {} ---", chrono::Local::now().format("%H:%M:%S"));
                for session in rx.borrow_and_update().iter() {
                    println!("{}", output::session_line(session));
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    cancel.cancel();
    handle.await?;
    Ok(())
}

pub async fn create_session(ctx: &Ctx) -> anyhow::Result<()> {
    let response = ctx
        .client
        .create_session(ctx.config.user_id.as_deref())
        .await?;

    match (response.qr, response.message) {
        (Some(qr), _) => {
            println!("Scan this QR code from WhatsApp > Linked devices:");
            println!("{}", qr);
        }
        (None, Some(message)) => println!("{}", message),
        (None, None) => println!("Session created."),
    }
    Ok(())
}

pub async fn logout(ctx: &Ctx, session: &str) -> anyhow::Result<()> {
    ctx.client.logout_and_delete(session).await?;
    println!("Session {} logged out.", session);
    Ok(())
}

pub async fn send(
    ctx: &Ctx,
    session: &str,
    to: &str,
    message: Option<&str>,
    media: Option<&Path>,
) -> anyhow::Result<()> {
    let attachment = match media {
        Some(path) => Some(Attachment::from_path(path).await?),
        None => None,
    };
    if message.is_none_or(str::is_empty) && attachment.is_none() {
        anyhow::bail!("nothing to send: pass --message and/or --media");
    }

    ctx.client
        .send_message(OutboundMessage {
            session_id: session,
            number: to,
            message: message.filter(|m| !m.is_empty()),
            attachment: attachment.as_ref(),
        })
        .await?;

    println!("Sent to {}.", to);
    Ok(())
}

/// Options of the `bulk` subcommand.
pub struct BulkArgs {
    pub session: String,
    pub file: Option<PathBuf>,
    pub text_file: Option<PathBuf>,
    pub message: String,
    pub media: Option<PathBuf>,
    pub delay_ms: Option<u64>,
}

/// Run a bulk job in the foreground. Ctrl+C stops it after the in-flight send.
pub async fn bulk(ctx: &Ctx, args: BulkArgs) -> anyhow::Result<ExitCode> {
    let rows = match (&args.file, &args.text_file) {
        (Some(path), _) => parse_delimited(&read_text(path).await?),
        (None, Some(path)) => parse_pasted(&read_text(path).await?),
        (None, None) => anyhow::bail!("pass --file or --text-file"),
    };
    let attachment = match &args.media {
        Some(path) => Some(Attachment::from_path(path).await?),
        None => None,
    };
    let delay = args
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.dispatch_delay());

    let job = DispatchJob::new(args.session, rows)
        .with_message(args.message)
        .with_attachment(attachment)
        .with_delay(delay)
        .with_send_timeout(ctx.config.send_timeout());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current message...");
            on_signal.cancel();
        }
    });

    println!("Sending {} messages via session {}", job.len(), job.session_id);

    let total = job.len();
    let transport = HttpTransport::new(ctx.client.clone());
    let report = BulkDispatcher::new()
        .run(
            &job,
            &transport,
            |event| {
                if let Some(line) = output::event_line(&event, total) {
                    println!("{}", line);
                }
            },
            &cancel,
        )
        .await?;

    println!("{}", output::summary(&report));

    let counts = report.status.counts();
    Ok(if counts.failed > 0 || report.cancelled {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

pub async fn messages(
    ctx: &Ctx,
    session: &str,
    chat: Option<&str>,
    limit: Option<u32>,
    follow: bool,
) -> anyhow::Result<()> {
    let messages = match chat {
        Some(chat) => {
            let limit = limit.unwrap_or(ctx.config.message_fetch_limit);
            ctx.client.chat_messages(session, chat, limit).await?
        }
        None => ctx.client.session_messages(session).await?,
    };

    if messages.is_empty() && !follow {
        println!("No messages.");
    }
    for message in &messages {
        print_message(ctx, session, message).await;
    }
    if !follow {
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut rx = ctx
        .client
        .subscribe_messages(session, cancel.clone())
        .await
        .context("failed to open the live message feed")?;
    eprintln!("Waiting for new messages, Ctrl+C to stop...");

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => {
                    if chat.is_none_or(|chat| in_chat(&message, chat)) {
                        print_message(ctx, session, &message).await;
                    }
                }
                None => {
                    eprintln!("Live feed closed by the backend.");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    cancel.cancel();
    Ok(())
}

async fn print_message(ctx: &Ctx, session: &str, message: &ChatMessage) {
    let sender = match message.from.as_deref() {
        Some(from) => ctx.client.contact_info(number_of(from), session).await.name,
        None => "-".to_string(),
    };
    println!("{}", output::message_line(message, &sender));
}

/// Whether a pushed message belongs to the conversation `chat_id`.
fn in_chat(message: &ChatMessage, chat_id: &str) -> bool {
    let chat = number_of(chat_id);
    [message.from.as_deref(), message.to.as_deref()]
        .into_iter()
        .flatten()
        .any(|party| number_of(party) == chat)
}

pub async fn chats(ctx: &Ctx, session: &str) -> anyhow::Result<()> {
    let chats = ctx.client.all_chats(session).await?;
    if chats.is_empty() {
        println!("No chats.");
    }
    for chat in &chats {
        let name = match chat.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                ctx.client
                    .contact_info(number_of(chat.id.as_str()), session)
                    .await
                    .name
            }
        };
        println!("{}", output::chat_line(chat, &name));
    }
    Ok(())
}

async fn read_text(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// `917302667115@c.us` -> `917302667115`
fn number_of(chat_id: &str) -> &str {
    chat_id.split('@').next().unwrap_or(chat_id)
}
