//! Payment routing and guard enforcement for autonomous agents.
//!
//! This crate gives agent runtimes one payment surface over heterogeneous
//! rails: direct stablecoin transfers, HTTP-native [x402](https://www.x402.org)
//! paid resources, and cross-chain gateway payments. Custody stays with a
//! programmable wallet provider; this process decides whether a payment may
//! happen, which rail it takes, and what gets remembered about it.
//!
//! # Overview
//!
//! A payment request names a wallet, a recipient, and an amount. Before
//! anything executes, the request passes through the guard chain attached to
//! the wallet and its wallet set (recipient allow/deny lists, per-payment
//! bounds, rate limits, spending budgets, human confirmation). Approved
//! requests are routed by recipient shape: URLs take the x402 handshake,
//! addresses take a same-chain transfer or a cross-chain gateway depending on
//! the wallet's blockchain. Every executed attempt lands in the transaction
//! ledger that the budget and rate-limit guards read.
//!
//! The binary serves this surface as newline-delimited JSON-RPC 2.0 over
//! stdin/stdout, which lets any agent runtime drive it as a sidecar process
//! without a network listener.
//!
//! # Modules
//!
//! - [`amount`]: decimal money amounts with tolerant parsing and base-unit conversion
//! - [`batch`]: bounded-concurrency batch execution preserving input order
//! - [`config`]: runtime configuration from CLI arguments, JSON file, and environment
//! - [`engine`]: the [`PaymentEngine`](engine::PaymentEngine) orchestrating guards,
//!   routing, execution, and recording
//! - [`guards`]: guard types, scopes, and the ordered evaluation chain
//! - [`intents`]: two-phase payment intents for human-confirmed payments
//! - [`ledger`]: in-memory transaction ledger with windowed spend queries
//! - [`network`]: supported blockchain networks and their testnet flags
//! - [`protocols`]: the [`ProtocolAdapter`](protocols::ProtocolAdapter) trait and the
//!   transfer, x402, and gateway rails
//! - [`router`]: recipient-shape routing across registered adapters
//! - [`server`]: the stdio JSON-RPC server and method dispatch
//! - [`types`]: payment request/result types shared across the crate
//! - [`wallet`]: the [`WalletProvider`](wallet::WalletProvider) trait and HTTP custody client
//!
//! # Feature Highlights
//!
//! - **Guard chain**: deterministic evaluation order with fail-fast rejection
//! - **Three rails**: same-chain transfer, x402 handshake, cross-chain gateway
//! - **Payment intents**: park above-threshold payments until confirmed
//! - **Batch payments**: concurrent execution with per-request error isolation
//! - **OpenTelemetry**: built-in tracing and metrics support

pub mod amount;
pub mod batch;
pub mod config;
pub mod engine;
pub mod guards;
pub mod intents;
pub mod ledger;
pub mod network;
pub mod protocols;
pub mod router;
pub mod run;
pub mod server;
pub mod sig_down;
pub mod telemetry;
pub mod timestamp;
pub mod types;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use run::run;
