//! LlmProvider trait definition.
//!
//! This is the abstraction the chat coordinator drives. Uses RPITIT for
//! `complete` and `Pin<Box<dyn Stream>>` for `stream` so callers can hold
//! the stream across await points without naming its type.

use std::pin::Pin;

use futures_util::Stream;

use kindred_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Trait for LLM provider backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition) for
/// `complete`. Implementations live in kindred-infra (e.g.,
/// `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "perplexity", "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// The stream is finite and not restartable. It yields text deltas,
    /// then usage metadata once the provider reports it, then `Done`.
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;
}
