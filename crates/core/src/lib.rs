//! Protocol logic for the relay: webhook signatures, the event model and
//! reply selection. Nothing here performs I/O.

pub mod completion;
pub mod events;
pub mod signature;

pub use completion::{pick_reply, CandidateSelection, CompletionApi, CompletionRequest};
pub use events::{parse_events, EventBatch, PayloadError, TextMessageEvent, WebhookEvent};
pub use signature::SignatureError;
