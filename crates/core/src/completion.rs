use std::str::FromStr;

use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

/// System prompt sent with every chat completion.
pub const SYSTEM_PROMPT: &str = "You are a assistant.";

/// Input for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: &'static str,
    pub user_text: String,
}

impl CompletionRequest {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT,
            user_text: user_text.into(),
        }
    }
}

/// Which completion endpoint the provider is called through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionApi {
    /// `/chat/completions` with a system and a user message.
    #[default]
    Chat,
    /// `/completions` with the user text as the bare prompt.
    Legacy,
}

impl CompletionApi {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Legacy => "legacy",
        }
    }
}

impl FromStr for CompletionApi {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "chat" => Ok(Self::Chat),
            "legacy" | "completions" => Ok(Self::Legacy),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// How one reply is chosen when the provider returns several candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateSelection {
    #[default]
    First,
    /// Uniformly random among the returned candidates.
    Random,
}

impl CandidateSelection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Random => "random",
        }
    }

    /// Picks a candidate using the thread-local RNG.
    pub fn select(self, candidates: &[String]) -> Option<&str> {
        self.select_with(candidates, &mut rand::thread_rng())
    }

    pub fn select_with<'a, R: Rng + ?Sized>(
        self,
        candidates: &'a [String],
        rng: &mut R,
    ) -> Option<&'a str> {
        let picked = match self {
            Self::First => candidates.first(),
            Self::Random => candidates.choose(rng),
        };
        picked.map(String::as_str)
    }
}

impl FromStr for CandidateSelection {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "first" => Ok(Self::First),
            "random" => Ok(Self::Random),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a configuration string names no known variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

/// Selects a candidate and trims it into reply text.
///
/// Returns `None` when there is nothing worth sending: no candidates, or a
/// selected candidate that is blank after trimming.
pub fn pick_reply(candidates: &[String], selection: CandidateSelection) -> Option<String> {
    let text = selection.select(candidates)?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
