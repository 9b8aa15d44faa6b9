//! Binary entrypoint for the interactive chat client.

use std::process::ExitCode;

use agent_chat::start_agent_chat;

/// Start the chat client on stdin/stdout.
fn main() -> ExitCode {
    start_agent_chat::run()
}
