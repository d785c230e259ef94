//! REST client for the messaging backend.
//!
//! The backend owns WhatsApp sessions, QR generation and message storage; this
//! client only forwards requests and decodes the JSON it returns.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use wabulk_common::error::AppError;
use wabulk_common::types::{Chat, ChatMessage, ContactInfo, QrResponse, Session};
use wabulk_dispatcher::Attachment;

/// A single outbound message, as posted to `/send`.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    pub session_id: &'a str,
    pub number: &'a str,
    /// Text or media caption; omitted from the form when `None`
    pub message: Option<&'a str>,
    pub attachment: Option<&'a Attachment>,
}

#[derive(Debug, Deserialize)]
struct SessionsResponse {
    #[serde(default)]
    sessions: Vec<Session>,
}

#[derive(Debug, Deserialize)]
struct ChatsResponse {
    #[serde(default)]
    chats: Vec<Chat>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    profile_pic: Option<String>,
}

/// HTTP client for the messaging backend.
pub struct BackendClient {
    client: Client,
    base_url: Url,
    /// Contact lookups are cached per number for the client's lifetime.
    contacts: Mutex<HashMap<String, ContactInfo>>,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid backend URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "backend URL {} cannot carry paths",
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            contacts: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET /sessions — list linked accounts, optionally scoped to a user.
    pub async fn list_sessions(&self, user_id: Option<&str>) -> Result<Vec<Session>, AppError> {
        let mut request = self.client.get(self.endpoint(&["sessions"]));
        if let Some(user_id) = user_id {
            request = request.query(&[("userId", user_id)]);
        }

        let body: SessionsResponse = check(request.send().await?).await?.json().await?;
        Ok(body.sessions)
    }

    /// POST /create-session — ask the backend for a new session and its QR code.
    pub async fn create_session(&self, user_id: Option<&str>) -> Result<QrResponse, AppError> {
        let payload = match user_id {
            Some(user_id) => json!({ "userId": user_id }),
            None => json!({}),
        };

        let response = self
            .client
            .post(self.endpoint(&["create-session"]))
            .json(&payload)
            .send()
            .await?;
        let qr: QrResponse = check(response).await?.json().await?;

        tracing::info!(has_qr = qr.qr.is_some(), "Session creation requested");
        Ok(qr)
    }

    /// POST /logout-and-delete — disconnect a session and drop it on the backend.
    pub async fn logout_and_delete(&self, session_id: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.endpoint(&["logout-and-delete"]))
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await?;
        check(response).await?;

        tracing::info!(session_id, "Session logged out");
        Ok(())
    }

    /// POST /send — multipart form with `sessionId`, `number`, `message`, `media`.
    pub async fn send_message(&self, outbound: OutboundMessage<'_>) -> Result<(), AppError> {
        let mut form = reqwest::multipart::Form::new()
            .text("sessionId", outbound.session_id.to_string())
            .text("number", outbound.number.to_string());

        if let Some(message) = outbound.message {
            form = form.text("message", message.to_string());
        }

        if let Some(attachment) = outbound.attachment {
            let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.mime_type)
                .map_err(|e| {
                    AppError::Validation(format!(
                        "invalid attachment type {}: {}",
                        attachment.mime_type, e
                    ))
                })?;
            form = form.part("media", part);
        }

        let response = self
            .client
            .post(self.endpoint(&["send"]))
            .multipart(form)
            .send()
            .await?;
        check(response).await?;

        tracing::debug!(
            session_id = outbound.session_id,
            number = outbound.number,
            has_media = outbound.attachment.is_some(),
            "Message accepted by backend"
        );
        Ok(())
    }

    /// GET /messages/{sessionId} — messages stored for a session.
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let response = self
            .client
            .get(self.endpoint(&["messages", session_id]))
            .send()
            .await?;
        let messages: Option<Vec<ChatMessage>> = check(response).await?.json().await?;
        Ok(messages.unwrap_or_default())
    }

    /// GET /get-all-chats — conversations of a session.
    pub async fn all_chats(&self, session_id: &str) -> Result<Vec<Chat>, AppError> {
        let response = self
            .client
            .get(self.endpoint(&["get-all-chats"]))
            .query(&[("sessionId", session_id)])
            .send()
            .await?;
        let body: ChatsResponse = check(response).await?.json().await?;
        Ok(body.chats)
    }

    /// GET /get-messages — the latest `limit` messages of one chat.
    pub async fn chat_messages(
        &self,
        session_id: &str,
        chat_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.endpoint(&["get-messages"]))
            .query(&[
                ("sessionId", session_id),
                ("chatId", chat_id),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        let body: MessagesResponse = check(response).await?.json().await?;
        Ok(body.messages)
    }

    /// GET /contact/{number} — display name and avatar for a number.
    ///
    /// Never fails: lookup errors yield a placeholder, which is not cached so
    /// the next call retries.
    pub async fn contact_info(&self, number: &str, session_id: &str) -> ContactInfo {
        if let Some(info) = self.contacts.lock().await.get(number) {
            return info.clone();
        }

        match self.fetch_contact(number, session_id).await {
            Ok(info) => {
                self.contacts
                    .lock()
                    .await
                    .insert(number.to_string(), info.clone());
                info
            }
            Err(e) => {
                tracing::debug!(number, error = %e, "Contact lookup failed, using placeholder");
                ContactInfo::fallback(number)
            }
        }
    }

    async fn fetch_contact(&self, number: &str, session_id: &str) -> Result<ContactInfo, AppError> {
        let response = self
            .client
            .get(self.endpoint(&["contact", number]))
            .query(&[("sessionId", session_id)])
            .send()
            .await?;
        let body: ContactResponse = check(response).await?.json().await?;

        let fallback = ContactInfo::fallback(number);
        Ok(ContactInfo {
            name: body
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or(fallback.name),
            profile_pic: body
                .profile_pic
                .filter(|p| !p.is_empty())
                .unwrap_or(fallback.profile_pic),
        })
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`: the base URL always accepts path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Turn a non-2xx response into `AppError::Backend`.
async fn check(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Backend {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> BackendClient {
        BackendClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let c = client("http://localhost:5000");
        assert_eq!(
            c.endpoint(&["messages", "abc"]).as_str(),
            "http://localhost:5000/messages/abc"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes() {
        let c = client("https://example.com/api/");
        assert_eq!(
            c.endpoint(&["contact", "91 730@c.us"]).as_str(),
            "https://example.com/api/contact/91%20730@c.us"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            BackendClient::new("not a url", Duration::from_secs(1)),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            BackendClient::new("mailto:someone@example.com", Duration::from_secs(1)),
            Err(AppError::Config(_))
        ));
    }
}
