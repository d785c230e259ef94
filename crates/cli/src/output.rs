//! Terminal output formatting.

use wabulk_common::types::{Chat, ChatMessage, RowStatus, Session};
use wabulk_dispatcher::{DispatchEvent, DispatchReport};

const PREVIEW_CHARS: usize = 60;

/// One progress line per row transition. `Finished` is reported by [`summary`].
pub fn event_line(event: &DispatchEvent<'_>, total: usize) -> Option<String> {
    let DispatchEvent::Row {
        index,
        status,
        preview,
    } = event
    else {
        return None;
    };

    let position = format!("[{}/{}]", index + 1, total);
    let line = match status {
        RowStatus::Sending => {
            let mut line = format!("{} -> {}", position, preview.address);
            if !preview.text.is_empty() {
                line.push_str(&format!(": {}", truncate(&preview.text, PREVIEW_CHARS)));
            }
            if let Some(attachment) = &preview.attachment {
                line.push_str(&format!(" [{}: {}]", attachment.kind, attachment.file_name));
            }
            line
        }
        RowStatus::Sent => format!("{} sent", position),
        RowStatus::Failed => format!("{} FAILED {}", position, preview.address),
        RowStatus::Pending => return None,
    };
    Some(line)
}

pub fn summary(report: &DispatchReport) -> String {
    let counts = report.status.counts();
    let mut line = format!(
        "Done: {} sent, {} failed, {} not attempted",
        counts.sent, counts.failed, counts.pending
    );
    if report.cancelled {
        line.push_str(" (cancelled)");
    }
    line
}

pub fn session_line(session: &Session) -> String {
    format!(
        "{:<24} {:<13} {:<20} {}",
        session.session_id,
        session.state().to_string(),
        session.display_name(),
        session.phone_number.as_deref().unwrap_or("-")
    )
}

pub fn chat_line(chat: &Chat, name: &str) -> String {
    let unread = chat.unread_count.unwrap_or(0);
    if unread > 0 {
        format!("{:<32} {} ({} unread)", chat.id.as_str(), name, unread)
    } else {
        format!("{:<32} {}", chat.id.as_str(), name)
    }
}

pub fn message_line(message: &ChatMessage, sender: &str) -> String {
    let time = message
        .sent_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "----------------".to_string());
    let who = if message.from_me { "me" } else { sender };
    let kind = match message.kind.as_deref() {
        Some(kind) if kind != "chat" && message.text().is_empty() => format!("<{}>", kind),
        _ => message.text().to_string(),
    };
    format!("{}  {:<20} {}", time, who, kind)
}

fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max).collect();
    cut.push_str("...");
    cut
}
