//! Message channels feeding the dispatcher.

pub mod cli;
pub mod webhook;

pub use webhook::{serve, webhook_routes};
