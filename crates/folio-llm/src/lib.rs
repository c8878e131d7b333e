//! Text generation for Folio.
//!
//! Provides the `TextGenerator` capability trait, an OpenAI-compatible
//! chat-completions client (LM Studio and similar local servers), retry with
//! backoff, and a scripted generator for tests.

mod chat;
mod generator;
mod retry;
pub mod scripted;
mod settings;

pub use chat::ChatCompletionsClient;
pub use generator::*;
pub use retry::{generate_with_retry, BackoffPolicy, RetryingGenerator};
pub use scripted::{ScriptedGenerator, Step};
pub use settings::GenerationSettings;
