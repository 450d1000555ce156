//! Chemistry assistant server binary for deployments.
//! Run with: cargo run --bin rasayan-server

use std::process::ExitCode;

use rasayan_sahayika::start_server;

fn main() -> ExitCode {
    start_server::run()
}
