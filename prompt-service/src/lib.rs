//! Prompt relay service.
//!
//! One invocation resolves a prompt from a loosely-shaped event, asks a hosted
//! model for a completion, records the exchange as a JSON artifact and returns
//! a JSON response. The same [`handler::PromptHandler`] backs both the axum
//! server and the Lambda entrypoint.

pub mod config;
pub mod handler;
pub mod services;
pub mod startup;
