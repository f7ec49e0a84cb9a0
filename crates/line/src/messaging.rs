use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Client for the LINE Messaging API endpoints the relay calls.
#[derive(Clone)]
pub struct LineClient {
    http: Client,
    base_url: Url,
    channel_access_token: String,
}

impl LineClient {
    /// Creates a new client. `base_url` is the API root, e.g. `https://api.line.me/`.
    pub fn new(channel_access_token: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            channel_access_token: channel_access_token.into(),
        }
    }

    /// Sends messages with a single-use reply token.
    pub async fn reply_message(&self, request: &ReplyRequest<'_>) -> Result<(), LineError> {
        let url = self.base_url.join("v2/bot/message/reply")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.channel_access_token)
            .json(request)
            .send()
            .await?;

        ensure_success(response).await
    }

    /// Replies with one text message.
    pub async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        self.reply_message(&ReplyRequest {
            reply_token,
            messages: vec![OutgoingMessage::Text { text }],
            notification_disabled: false,
        })
        .await
    }
}

/// Body of `POST /v2/bot/message/reply`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest<'a> {
    pub reply_token: &'a str,
    pub messages: Vec<OutgoingMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub notification_disabled: bool,
}

/// Message objects accepted by the send APIs.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage<'a> {
    Text { text: &'a str },
}

/// Errors produced by the LINE client.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn ensure_success(response: Response) -> Result<(), LineError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(LineError::Status { status, body });
    }
    Ok(())
}
