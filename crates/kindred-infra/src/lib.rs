//! Infrastructure implementations for Kindred.
//!
//! Implements the repository traits from `kindred-core` on SQLite (via sqlx
//! with split read/write pools) and the `LlmProvider` trait on any
//! OpenAI-compatible chat completions API.

pub mod llm;
pub mod sqlite;
