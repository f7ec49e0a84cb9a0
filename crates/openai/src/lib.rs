pub mod completions;

pub use completions::{ChatMessage, OpenAiClient, OpenAiError, Role, SamplingParams};
