//! Model gateway abstractions.

pub mod provider;

pub use provider::LlmProvider;
