//! Payment engine entrypoint.
//!
//! Launches the JSON-RPC loop over stdin/stdout that exposes the payment
//! surface: payment routing and guard enforcement, payment intents, batch
//! execution, and wallet administration against a programmable wallet
//! provider.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `WALLET_PROVIDER_URL`, `WALLET_PROVIDER_API_KEY` select the provider
//! - `PAYMENT_TIMEOUT_SECS`, `HTTP_TIMEOUT_SECS`, `BATCH_CONCURRENCY` tune limits
//! - `OTEL_*` variables enable tracing to systems like Honeycomb

use dotenvy::dotenv;
use std::sync::Arc;

use crate::config::Config;
use crate::engine::PaymentEngine;
use crate::server::RpcServer;
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;
use crate::wallet::HttpWalletProvider;

/// Initializes the payment engine.
///
/// - Loads `.env` variables.
/// - Initializes OpenTelemetry tracing.
/// - Connects to the configured wallet provider.
/// - Serves JSON-RPC requests from stdin until EOF or a shutdown signal.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    let _telemetry = Telemetry::new();

    let config = Config::load()?;

    let mut provider = HttpWalletProvider::try_new(config.provider_url().clone())?
        .with_timeout(config.http_timeout());
    if let Some(api_key) = config.provider_api_key() {
        provider = provider.with_api_key(api_key);
    }
    let provider = Arc::new(provider);

    // Separate client for paid-resource handshakes, so provider credentials
    // never ride along on requests to arbitrary recipient URLs.
    let resource_client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()?;

    let engine = PaymentEngine::new(provider, resource_client, config.execute_timeout());
    let server = RpcServer::new(engine, config.batch_concurrency());

    let sig_down = SigDown::try_new()?;
    tracing::info!(
        provider_url = %config.provider_url(),
        "Serving payment requests on stdin"
    );
    server
        .serve(
            tokio::io::stdin(),
            tokio::io::stdout(),
            sig_down.cancellation_token(),
        )
        .await?;

    Ok(())
}
