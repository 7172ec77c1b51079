//! CLI channel: dispatch a single message from the command line.

use crate::dispatcher::Dispatcher;

/// Identity used for messages typed on the command line.
pub const CLI_IDENTITY: &str = "cli";

/// Dispatch `message` once and return what would be sent back.
pub async fn run_once(dispatcher: &Dispatcher, message: &str) -> Option<String> {
    dispatcher.reply(CLI_IDENTITY, message).await
}
