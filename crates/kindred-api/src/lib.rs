//! REST API application layer for Kindred.

pub mod config;
pub mod http;
pub mod state;
