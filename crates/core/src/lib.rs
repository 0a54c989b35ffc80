pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{Client, ConversationItem, Message, ReplyCandidate, SourceType};
pub use domain::draft::{Confidence, ConversationEntry, Draft, DraftId, DraftStatus};
pub use domain::run::{PollerRun, RunCounters, RunError, RunStatus};
pub use errors::DomainError;
