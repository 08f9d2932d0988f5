//! [`Mailbox`] implementation over the Gmail REST API.
//!
//! Authentication uses an OAuth token file with a refresh token; the access
//! token is refreshed on every [`Mailbox::authenticate`] call. Interactive
//! consent is not handled here: the token file has to exist already.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, URL_SAFE};
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::MailboxError;
use crate::mailbox::{Mailbox, MailboxResult};
use crate::models::RawMessage;

/// Gmail bodies are URL-safe base64, sometimes without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Contents of the OAuth token file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Last issued access token
    pub token: Option<String>,
    pub refresh_token: String,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthToken {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Corrupted token file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)
            .with_context(|| format!("Failed to write token file {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    id: String,
    name: String,
}

impl MessagePart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    /// Encoded data of the first `text/html` part, depth first.
    fn html_data(&self) -> Option<&str> {
        if self.mime_type.as_deref() == Some("text/html") {
            if let Some(data) = self.body.as_ref().and_then(|body| body.data.as_deref()) {
                return Some(data);
            }
        }
        self.parts.iter().find_map(MessagePart::html_data)
    }
}

/// Gmail client bound to one account.
pub struct GmailMailbox {
    client: Client,
    base_url: String,
    token_path: PathBuf,
    access_token: RwLock<Option<String>>,
}

impl GmailMailbox {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.mailbox.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.mailbox.api_base_url.trim_end_matches('/').to_string(),
            token_path: config.get_token_path(),
            access_token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn bearer(&self, operation: &str) -> MailboxResult<String> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or_else(|| MailboxError::auth(operation, "not authenticated"))
    }

    /// Sends an authorized request and decodes the JSON response.
    async fn call<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> MailboxResult<T> {
        let token = self.bearer(operation).await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(operation, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MailboxError::permanent(operation, format!("unexpected response: {e}")))
    }
}

/// Maps an HTTP status onto a retry classification.
#[must_use]
pub fn status_error(operation: &str, status: StatusCode, body: &str) -> MailboxError {
    let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MailboxError::auth(operation, message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => MailboxError::transient(operation, message),
        status if status.is_server_error() => MailboxError::transient(operation, message),
        _ => MailboxError::permanent(operation, message),
    }
}

fn transport_error(operation: &str, error: &reqwest::Error) -> MailboxError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        MailboxError::transient(operation, error.to_string())
    } else {
        MailboxError::permanent(operation, error.to_string())
    }
}

/// Received time from the `Date` header, falling back to Gmail's `internalDate`.
fn received_at(date_header: Option<&str>, internal_date: Option<&str>) -> Option<DateTime<FixedOffset>> {
    date_header
        .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
        .or_else(|| {
            internal_date
                .and_then(|millis| millis.parse::<i64>().ok())
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .map(|date| date.fixed_offset())
        })
}

/// Builds the raw RFC 822 message Gmail expects for `messages.send`.
#[must_use]
pub fn encode_raw_message(to: &str, subject: &str, body: &str) -> String {
    URL_SAFE.encode(format!("To: {to}\r\nSubject: {subject}\r\n\r\n{body}"))
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn authenticate(&self) -> MailboxResult<()> {
        const OP: &str = "authenticate";
        let mut token = OAuthToken::load(&self.token_path).map_err(|e| MailboxError::auth(OP, format!("{e:#}")))?;

        let response = self
            .client
            .post(&token.token_uri)
            .form(&[
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
                ("refresh_token", token.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(OP, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                // invalid_grant and friends: the refresh token itself is dead
                StatusCode::BAD_REQUEST => MailboxError::auth(OP, format!("HTTP {status}: {body}")),
                _ => status_error(OP, status, &body),
            });
        }

        let refreshed: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::auth(OP, format!("unexpected token response: {e}")))?;

        token.token = Some(refreshed.access_token.clone());
        if let Err(e) = token.save(&self.token_path) {
            debug!(error = %e, "Could not persist refreshed access token");
        }
        *self.access_token.write().await = Some(refreshed.access_token);
        info!("Gmail credentials refreshed");
        Ok(())
    }

    async fn list_unread(&self, query: &str) -> MailboxResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(self.url("messages")).query(&[("q", query)]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }
            let page: ListResponse = self.call("list_unread", request).await?;
            ids.extend(page.messages.into_iter().map(|message| message.id));
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!(count = ids.len(), "Listed unread messages");
        Ok(ids)
    }

    async fn get(&self, id: &str) -> MailboxResult<RawMessage> {
        const OP: &str = "get";
        let request = self
            .client
            .get(self.url(&format!("messages/{id}")))
            .query(&[("format", "full")]);
        let message: GmailMessage = self.call(OP, request).await?;
        let payload = message.payload.unwrap_or_default();

        let received_at = received_at(payload.header("Date"), message.internal_date.as_deref())
            .ok_or_else(|| MailboxError::permanent(OP, format!("No received date found in message {id}")))?;

        let data = payload
            .html_data()
            .ok_or_else(|| MailboxError::permanent(OP, format!("No HTML content found in message {id}")))?;
        let bytes = URL_SAFE_LENIENT
            .decode(data.trim())
            .map_err(|e| MailboxError::permanent(OP, format!("Undecodable HTML part: {e}")))?;

        Ok(RawMessage {
            id: message.id,
            sender: payload.header("From").map(str::to_string),
            subject: payload.header("Subject").unwrap_or("No Subject").to_string(),
            received_at,
            html_body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    async fn ensure_label(&self, name: &str) -> MailboxResult<String> {
        let existing: LabelList = self.call("ensure_label", self.client.get(self.url("labels"))).await?;
        if let Some(label) = existing.labels.into_iter().find(|label| label.name == name) {
            return Ok(label.id);
        }

        let body = json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        let created: Label = self
            .call("ensure_label", self.client.post(self.url("labels")).json(&body))
            .await?;
        info!(label = name, id = %created.id, "Created label");
        Ok(created.id)
    }

    async fn modify_labels(&self, id: &str, add: &[String], remove: &[String]) -> MailboxResult<()> {
        let body = json!({ "addLabelIds": add, "removeLabelIds": remove });
        let _: serde_json::Value = self
            .call(
                "modify_labels",
                self.client.post(self.url(&format!("messages/{id}/modify"))).json(&body),
            )
            .await?;
        Ok(())
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> MailboxResult<()> {
        let payload = json!({ "raw": encode_raw_message(to, subject, body) });
        let _: serde_json::Value = self
            .call("send", self.client.post(self.url("messages/send")).json(&payload))
            .await?;
        info!(recipient = to, "Error notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(status_error("get", StatusCode::SERVICE_UNAVAILABLE, "").kind.should_retry());
        assert!(status_error("get", StatusCode::TOO_MANY_REQUESTS, "").kind.should_retry());
        assert!(!status_error("get", StatusCode::NOT_FOUND, "").kind.should_retry());
        assert!(status_error("get", StatusCode::UNAUTHORIZED, "").is_auth());
    }

    #[test]
    fn html_part_is_found_in_nested_multipart() {
        let payload: MessagePart = serde_json::from_value(json!({
            "mimeType": "multipart/mixed",
            "headers": [{"name": "Subject", "value": "Jobs"}],
            "parts": [{
                "mimeType": "multipart/alternative",
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "cGxhaW4"}},
                    {"mimeType": "text/html", "body": {"data": "PHA-aGk8L3A-"}}
                ]
            }]
        }))
        .unwrap();

        let data = payload.html_data().unwrap();
        let html = String::from_utf8(URL_SAFE_LENIENT.decode(data).unwrap()).unwrap();
        assert_eq!(html, "<p>hi</p>");
        assert_eq!(payload.header("subject"), Some("Jobs"));
    }

    #[test]
    fn received_at_falls_back_to_internal_date() {
        let parsed = received_at(Some("Tue, 5 Nov 2024 09:30:00 +0100"), None).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-11-05T09:30:00+01:00");

        let fallback = received_at(Some("garbage"), Some("1700000000000")).unwrap();
        assert_eq!(fallback.timestamp(), 1_700_000_000);
        assert!(received_at(None, None).is_none());
    }

    #[test]
    fn raw_message_round_trips() {
        let raw = encode_raw_message("admin@example.com", "Failed", "boom");
        let decoded = String::from_utf8(URL_SAFE_LENIENT.decode(raw).unwrap()).unwrap();
        assert_eq!(decoded, "To: admin@example.com\r\nSubject: Failed\r\n\r\nboom");
    }
}
