//! Session helper library
//!
//! Lets an AI agent pause and ask a human for input through an IDE extension,
//! correlating each outgoing request with the answer posted back.

pub mod config;
pub mod error;
pub mod history;
pub mod ipc;
pub mod mcp;
pub mod models;
pub mod relay;
pub mod utils;

pub use error::{CheckpointError, HistoryError};
