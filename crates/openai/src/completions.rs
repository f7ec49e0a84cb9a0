use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Client for OpenAI-compatible completion endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl OpenAiClient {
    /// Creates a new client. `base_url` is the API root, e.g. `https://api.openai.com/v1/`.
    pub fn new(api_key: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            api_key: api_key.into(),
        }
    }

    /// Calls `POST chat/completions` and returns the message contents in choice order.
    pub async fn create_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage<'_>],
        sampling: &SamplingParams,
    ) -> Result<Vec<String>, OpenAiError> {
        let body = ChatCompletionRequest {
            model,
            messages,
            sampling,
        };
        let response: ChatCompletionResponse = self.post("chat/completions", &body).await?;

        let mut choices = response.choices;
        choices.sort_by_key(|choice| choice.index);
        Ok(choices
            .into_iter()
            .map(|choice| choice.message.content.unwrap_or_default())
            .collect())
    }

    /// Calls the legacy `POST completions` endpoint and returns the choice texts in order.
    pub async fn create_completion(
        &self,
        model: &str,
        prompt: &str,
        sampling: &SamplingParams,
    ) -> Result<Vec<String>, OpenAiError> {
        let body = TextCompletionRequest {
            model,
            prompt,
            sampling,
        };
        let response: TextCompletionResponse = self.post("completions", &body).await?;

        let mut choices = response.choices;
        choices.sort_by_key(|choice| choice.index);
        Ok(choices.into_iter().map(|choice| choice.text).collect())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, OpenAiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        parse_json(response).await
    }
}

/// Sampling parameters shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    /// Number of candidates to generate.
    pub n: u8,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 256,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            n: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

impl<'a> ChatMessage<'a> {
    pub fn system(content: &'a str) -> Self {
        Self {
            role: Role::System,
            content,
        }
    }

    pub fn user(content: &'a str) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage<'a>],
    #[serde(flatten)]
    sampling: &'a SamplingParams,
}

#[derive(Serialize)]
struct TextCompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(flatten)]
    sampling: &'a SamplingParams,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    index: u32,
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextCompletionResponse {
    #[serde(default)]
    choices: Vec<TextChoice>,
}

#[derive(Debug, Deserialize)]
struct TextChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    text: String,
}

/// Errors produced by the completion client.
#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, OpenAiError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(OpenAiError::Status { status, body });
    }

    Ok(response.json().await?)
}
