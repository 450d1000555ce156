//! Binary entrypoint that launches the chemistry assistant server.

use std::process::ExitCode;

use rasayan_sahayika::start_server;

/// Start the HTTP server that fronts the Gemini chemistry tutor.
fn main() -> ExitCode {
    start_server::run()
}
