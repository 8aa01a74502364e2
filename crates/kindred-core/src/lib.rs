//! Business logic and repository trait definitions for Kindred.
//!
//! This crate defines the "ports" (repository and provider traits) that the
//! infrastructure layer implements, and the services built on top of them:
//! the persona registry, the daily quota tracker, the session store, and the
//! chat coordinator that drives a full turn. It depends only on
//! `kindred-types` -- never on `kindred-infra` or any database/IO crate.

pub mod chat;
pub mod llm;
pub mod persona;
pub mod quota;
pub mod repository;
