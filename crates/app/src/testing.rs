//! In-memory collaborators for exercising the relay without network access.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use reqwest::StatusCode;

use line_relay_core::CompletionRequest;
use line_relay_line::LineError;
use line_relay_openai::OpenAiError;

use crate::reply::{CompletionProvider, ReplySender};

#[derive(Clone, Default)]
struct StubResponse {
    candidates: Option<Vec<String>>,
    delay: Duration,
}

/// Returns canned candidates keyed by user text. Unknown text yields no candidates.
#[derive(Default)]
pub struct StubProvider {
    responses: HashMap<String, StubResponse>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, user_text: &str, candidates: &[&str]) -> Self {
        let entry = self.responses.entry(user_text.to_string()).or_default();
        entry.candidates = Some(candidates.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn fail(mut self, user_text: &str) -> Self {
        let entry = self.responses.entry(user_text.to_string()).or_default();
        entry.candidates = None;
        self
    }

    pub fn delay(mut self, user_text: &str, delay: Duration) -> Self {
        self.responses
            .entry(user_text.to_string())
            .or_default()
            .delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>, OpenAiError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let Some(response) = self.responses.get(&request.user_text).cloned() else {
            return Ok(Vec::new());
        };
        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        response.candidates.ok_or_else(|| OpenAiError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "stub provider failure".to_string(),
        })
    }
}

/// Records every reply it is asked to deliver.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail_all: bool,
    fail_tokens: HashSet<String>,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn failing_for(token: &str) -> Self {
        Self {
            fail_tokens: HashSet::from([token.to_string()]),
            ..Self::default()
        }
    }

    /// Successfully delivered `(reply_token, text)` pairs in call order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplySender for RecordingSender {
    async fn send_text(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.fail_tokens.contains(reply_token) {
            return Err(LineError::Status {
                status: StatusCode::BAD_REQUEST,
                body: "Invalid reply token".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((reply_token.to_string(), text.to_string()));
        Ok(())
    }
}
