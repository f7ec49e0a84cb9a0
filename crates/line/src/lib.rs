pub mod messaging;

pub use messaging::{LineClient, LineError, OutgoingMessage, ReplyRequest};
