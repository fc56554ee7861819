//! Payment engine binary.
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout. Startup wiring lives
//! in [`agentpay_rs::run`].

use std::process;

#[tokio::main]
async fn main() {
    let result = agentpay_rs::run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
