//! HTTP request handlers.

pub mod chat;
pub mod persona;
pub mod session;
pub mod user;
