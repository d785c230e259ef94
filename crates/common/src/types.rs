use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recipient entry of a bulk job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRow {
    /// Target phone number or chat id
    pub address: String,
    /// Per-row text, used when the job's shared message is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_override: Option<String>,
    /// Named values available to `{field}` placeholders
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, String>,
}

impl RecipientRow {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_override(mut self, text: impl Into<String>) -> Self {
        self.template_override = Some(text.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_fields.insert(key.into(), value.into());
        self
    }
}

/// Per-recipient delivery status within a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl RowStatus {
    /// `Sent` and `Failed` never change again within a job.
    pub fn is_terminal(self) -> bool {
        matches!(self, RowStatus::Sent | RowStatus::Failed)
    }
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowStatus::Pending => write!(f, "pending"),
            RowStatus::Sending => write!(f, "sending"),
            RowStatus::Sent => write!(f, "sent"),
            RowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A linked WhatsApp account as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub pushname: Option<String>,
    /// Raw status string, not always present
    #[serde(default)]
    pub status: Option<String>,
}

/// Connection state derived from what the backend knows about a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connected,
    Disconnected,
}

impl Session {
    /// A session counts as connected once the backend knows its 12-digit phone
    /// number or a real push name.
    pub fn state(&self) -> SessionState {
        let has_number = self
            .phone_number
            .as_deref()
            .is_some_and(|n| n.len() == 12 && n.bytes().all(|b| b.is_ascii_digit()));
        let has_name = self
            .pushname
            .as_deref()
            .is_some_and(|n| !n.is_empty() && !n.eq_ignore_ascii_case("unknown"));

        if has_number || has_name {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// Label used when listing sessions.
    pub fn display_name(&self) -> &str {
        match self.pushname.as_deref() {
            Some(name) if !name.is_empty() && !name.eq_ignore_ascii_case("unknown") => name,
            _ => "Session",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connected => write!(f, "connected"),
            SessionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Response of `/create-session`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QrResponse {
    /// QR code as a data URL, absent when an existing session was restored
    #[serde(default)]
    pub qr: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A message as stored by the backend.
///
/// Different endpoints fill different subsets of these fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    /// Seconds or milliseconds since the epoch
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ChatMessage {
    pub fn text(&self) -> &str {
        self.body
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or_default()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp?;
        // Anything past year 33658 in seconds is really milliseconds.
        if ts > 1_000_000_000_000 {
            DateTime::from_timestamp_millis(ts)
        } else {
            DateTime::from_timestamp(ts, 0)
        }
    }
}

/// Chat identifier, either a plain string or the backend's `{ _serialized }` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Plain(String),
    Wrapped {
        #[serde(rename = "_serialized")]
        serialized: String,
    },
}

impl ChatId {
    pub fn as_str(&self) -> &str {
        match self {
            ChatId::Plain(id) => id,
            ChatId::Wrapped { serialized } => serialized,
        }
    }
}

/// A conversation listed by `/get-all-chats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unread_count: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Display information for a contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub name: String,
    pub profile_pic: String,
}

impl ContactInfo {
    /// Placeholder shown when the backend has nothing for `number`.
    pub fn fallback(number: &str) -> Self {
        let profile_pic =
            reqwest::Url::parse_with_params("https://ui-avatars.com/api/", &[("name", number)])
                .map(|u| u.to_string())
                .unwrap_or_else(|_| "https://ui-avatars.com/api/".to_string());

        Self {
            name: number.to_string(),
            profile_pic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(phone: Option<&str>, pushname: Option<&str>) -> Session {
        Session {
            session_id: "s1".into(),
            phone_number: phone.map(String::from),
            pushname: pushname.map(String::from),
            status: None,
        }
    }

    #[test]
    fn test_session_state_from_phone_number() {
        assert_eq!(
            session(Some("917302667115"), None).state(),
            SessionState::Connected
        );
        assert_eq!(
            session(Some("91730266711"), None).state(),
            SessionState::Disconnected
        );
        assert_eq!(
            session(Some("91730266711x"), None).state(),
            SessionState::Disconnected
        );
    }

    #[test]
    fn test_session_state_from_pushname() {
        assert_eq!(session(None, Some("Sam")).state(), SessionState::Connected);
        assert_eq!(
            session(None, Some("Unknown")).state(),
            SessionState::Disconnected
        );
        assert_eq!(session(None, None).state(), SessionState::Disconnected);
    }

    #[test]
    fn test_session_decodes_camel_case() {
        let json = serde_json::json!({
            "sessionId": "abc",
            "phoneNumber": "917302667115",
            "pushname": "Sam"
        });
        let s: Session = serde_json::from_value(json).unwrap();
        assert_eq!(s.session_id, "abc");
        assert_eq!(s.display_name(), "Sam");
    }

    #[test]
    fn test_row_status_terminal() {
        assert!(!RowStatus::Pending.is_terminal());
        assert!(!RowStatus::Sending.is_terminal());
        assert!(RowStatus::Sent.is_terminal());
        assert!(RowStatus::Failed.is_terminal());
        assert_eq!(
            serde_json::to_value(RowStatus::Sent).unwrap(),
            serde_json::json!("sent")
        );
    }

    #[test]
    fn test_chat_id_both_shapes() {
        let wrapped: Chat =
            serde_json::from_value(serde_json::json!({"id": {"_serialized": "123@c.us"}}))
                .unwrap();
        let plain: Chat = serde_json::from_value(serde_json::json!({"id": "456@c.us"})).unwrap();
        assert_eq!(wrapped.id.as_str(), "123@c.us");
        assert_eq!(plain.id.as_str(), "456@c.us");
    }

    #[test]
    fn test_message_timestamp_seconds_and_millis() {
        let secs = ChatMessage {
            timestamp: Some(1_700_000_000),
            ..Default::default()
        };
        let millis = ChatMessage {
            timestamp: Some(1_700_000_000_000),
            ..Default::default()
        };
        assert_eq!(secs.sent_at(), millis.sent_at());
    }

    #[test]
    fn test_message_text_prefers_body() {
        let msg: ChatMessage = serde_json::from_value(serde_json::json!({
            "body": "hello",
            "message": "ignored",
            "fromMe": true,
            "type": "chat"
        }))
        .unwrap();
        assert_eq!(msg.text(), "hello");
        assert!(msg.from_me);
        assert_eq!(msg.kind.as_deref(), Some("chat"));
    }

    #[test]
    fn test_contact_fallback_encodes_number() {
        let info = ContactInfo::fallback("+91 7302");
        assert_eq!(info.name, "+91 7302");
        assert!(info.profile_pic.starts_with("https://ui-avatars.com/api/?name="));
        assert!(!info.profile_pic.contains(' '));
    }
}
