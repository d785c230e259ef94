//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "wabulk", version, about = "Bulk WhatsApp messaging via the session backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL, overrides BACKEND_API_URL.
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Owner of the sessions, overrides WABULK_USER_ID.
    #[arg(long, global = true)]
    pub user_id: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List linked sessions.
    Sessions {
        /// Keep polling and reprint on every change.
        #[arg(long)]
        watch: bool,
    },
    /// Start linking a new account and print its QR code data URL.
    CreateSession,
    /// Log out a session and delete it on the backend.
    Logout {
        session: String,
    },
    /// Send one message.
    Send {
        #[arg(long)]
        session: String,
        /// Recipient number or chat id.
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: Option<String>,
        /// File to attach.
        #[arg(long)]
        media: Option<PathBuf>,
    },
    /// Send to every recipient of a list, one at a time.
    Bulk {
        #[arg(long)]
        session: String,
        /// CSV export with a header line; first column is the number.
        #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
        file: Option<PathBuf>,
        /// Plain text, one `number[,message]` per line.
        #[arg(long)]
        text_file: Option<PathBuf>,
        /// Shared message; `{column}` placeholders are filled per row.
        #[arg(long, default_value = "")]
        message: String,
        /// File attached to every message.
        #[arg(long)]
        media: Option<PathBuf>,
        /// Pause between sends, overrides DISPATCH_DELAY_MS.
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show stored messages of a session, or the latest messages of one chat.
    Messages {
        #[arg(long)]
        session: String,
        #[arg(long)]
        chat: Option<String>,
        /// Overrides MESSAGE_FETCH_LIMIT.
        #[arg(long, requires = "chat")]
        limit: Option<u32>,
        /// Keep printing messages pushed by the backend until Ctrl+C.
        #[arg(long, short)]
        follow: bool,
    },
    /// List the conversations of a session.
    Chats {
        #[arg(long)]
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk_with_csv() {
        let cli = Cli::try_parse_from([
            "wabulk",
            "bulk",
            "--session",
            "s1",
            "--file",
            "contacts.csv",
            "--message",
            "Hi {name}",
            "--delay-ms",
            "500",
        ])
        .unwrap();

        match cli.command {
            Commands::Bulk {
                session,
                file,
                text_file,
                message,
                delay_ms,
                ..
            } => {
                assert_eq!(session, "s1");
                assert_eq!(file, Some(PathBuf::from("contacts.csv")));
                assert!(text_file.is_none());
                assert_eq!(message, "Hi {name}");
                assert_eq!(delay_ms, Some(500));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_bulk_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["wabulk", "bulk", "--session", "s1"]).is_err());
        assert!(
            Cli::try_parse_from([
                "wabulk",
                "bulk",
                "--session",
                "s1",
                "--file",
                "a.csv",
                "--text-file",
                "b.txt",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_global_backend_override() {
        let cli = Cli::try_parse_from([
            "wabulk",
            "sessions",
            "--watch",
            "--backend-url",
            "http://backend:5000",
        ])
        .unwrap();

        assert_eq!(cli.backend_url.as_deref(), Some("http://backend:5000"));
        assert!(matches!(cli.command, Commands::Sessions { watch: true }));
    }

    #[test]
    fn test_parse_messages_follow() {
        let cli = Cli::try_parse_from([
            "wabulk", "messages", "--session", "s1", "--chat", "911@c.us", "-f",
        ])
        .unwrap();

        match cli.command {
            Commands::Messages {
                session,
                chat,
                follow,
                ..
            } => {
                assert_eq!(session, "s1");
                assert_eq!(chat.as_deref(), Some("911@c.us"));
                assert!(follow);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_limit_requires_chat() {
        assert!(
            Cli::try_parse_from(["wabulk", "messages", "--session", "s1", "--limit", "5"]).is_err()
        );
    }
}
