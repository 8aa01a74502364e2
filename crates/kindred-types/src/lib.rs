//! Shared domain types for Kindred.
//!
//! This crate contains the core domain types used across the Kindred relay:
//! personas, users, chat sessions, conversation turns, LLM request/response
//! shapes, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod error;
pub mod llm;
pub mod persona;
pub mod user;
