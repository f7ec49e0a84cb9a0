use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info};

use line_relay_core::{pick_reply, CandidateSelection, CompletionApi, CompletionRequest};
use line_relay_line::{LineClient, LineError};
use line_relay_openai::{ChatMessage, OpenAiClient, OpenAiError, SamplingParams};

/// Source of completion candidates for a user message.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>, OpenAiError>;
}

/// Delivers reply text through the messaging platform.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_text(&self, reply_token: &str, text: &str) -> Result<(), LineError>;
}

/// [`CompletionProvider`] backed by an OpenAI-compatible API.
pub struct OpenAiProvider {
    client: OpenAiClient,
    model: String,
    api: CompletionApi,
    sampling: SamplingParams,
}

impl OpenAiProvider {
    pub fn new(
        client: OpenAiClient,
        model: impl Into<String>,
        api: CompletionApi,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            api,
            sampling,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>, OpenAiError> {
        match self.api {
            CompletionApi::Chat => {
                let messages = [
                    ChatMessage::system(request.system_prompt),
                    ChatMessage::user(&request.user_text),
                ];
                self.client
                    .create_chat_completion(&self.model, &messages, &self.sampling)
                    .await
            }
            // the legacy endpoint has no system role; the user text is the whole prompt
            CompletionApi::Legacy => {
                self.client
                    .create_completion(&self.model, &request.user_text, &self.sampling)
                    .await
            }
        }
    }
}

#[async_trait]
impl ReplySender for LineClient {
    async fn send_text(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        self.reply_text(reply_token, text).await
    }
}

/// Per-event failures. None of them reach the chat user.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("completion failed: {0}")]
    Completion(#[from] OpenAiError),
    #[error("reply delivery failed: {0}")]
    Delivery(#[from] LineError),
}

/// Turns one user message into at most one reply.
#[derive(Clone)]
pub struct ReplyOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    sender: Arc<dyn ReplySender>,
    selection: CandidateSelection,
}

impl ReplyOrchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        sender: Arc<dyn ReplySender>,
        selection: CandidateSelection,
    ) -> Self {
        Self {
            provider,
            sender,
            selection,
        }
    }

    /// Asks the provider for candidates and returns the selected, trimmed text.
    ///
    /// `Ok(None)` means the provider answered but there is nothing to send.
    pub async fn generate_reply(&self, user_text: &str) -> Result<Option<String>, OpenAiError> {
        let request = CompletionRequest::new(user_text);
        let start = Instant::now();
        let result = self.provider.complete(&request).await;
        histogram!("completion_latency_seconds").record(start.elapsed().as_secs_f64());

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(err) => {
                counter!("completion_requests_total", "result" => "error").increment(1);
                return Err(err);
            }
        };

        let reply = pick_reply(&candidates, self.selection);
        let label = if reply.is_some() { "ok" } else { "empty" };
        counter!("completion_requests_total", "result" => label).increment(1);
        debug!(
            stage = "completion",
            candidates = candidates.len(),
            selection = self.selection.as_str(),
            empty = reply.is_none(),
            "completion received"
        );
        Ok(reply)
    }

    /// Sends `text` with the reply token. Called at most once per token.
    pub async fn send(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        match self.sender.send_text(reply_token, text).await {
            Ok(()) => {
                counter!("reply_messages_total", "result" => "ok").increment(1);
                Ok(())
            }
            Err(err) => {
                counter!("reply_messages_total", "result" => "error").increment(1);
                Err(err)
            }
        }
    }

    /// Generates a reply for `user_text` and delivers it if there is one.
    ///
    /// Returns whether a reply was sent.
    pub async fn respond(&self, reply_token: &str, user_text: &str) -> Result<bool, ReplyError> {
        let Some(reply) = self.generate_reply(user_text).await? else {
            info!(stage = "reply", "completion produced no reply; nothing sent");
            return Ok(false);
        };

        self.send(reply_token, &reply).await?;
        Ok(true)
    }
}
