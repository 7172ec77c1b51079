//! Check-in dispatch: turns text messages into one-shot check-in workers.

pub mod auth;
pub mod channels;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod launcher;
pub mod registry;
pub mod runtime;
pub mod verifier;
