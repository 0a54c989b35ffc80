//! Draft Composer: turns a conversation needing a reply into a reviewable
//! draft via one language-model completion per invocation. Stateless between
//! calls.

pub mod composer;
pub mod llm;
pub mod prompt;

pub use composer::DraftComposer;
pub use llm::{AnthropicClient, LlmClient};
