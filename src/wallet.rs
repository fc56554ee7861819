//! Wallet service boundary.
//!
//! Key custody, chain submission, and balance authority live in an external
//! wallet service. [`WalletProvider`] is the seam the engine talks through;
//! [`HttpWalletProvider`] is the production implementation, a typed JSON
//! client for that service's REST surface. Tests substitute an in-memory
//! provider behind the same trait.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::amount::MoneyAmount;
use crate::network::Network;
use crate::timestamp::UnixTimestamp;
use crate::types::CrosschainDestination;

/// Header carrying a fresh UUIDv7 per submission so the wallet service can
/// deduplicate retried requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "X-Idempotency-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletState {
    Live,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyType {
    Developer,
    EndUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    #[serde(rename = "EOA")]
    Eoa,
    #[serde(rename = "SCA")]
    Sca,
}

/// Transaction lifecycle as the wallet service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Initiated,
    Queued,
    Sent,
    Confirmed,
    Complete,
    Failed,
    Cancelled,
}

impl TransactionState {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TransactionState::Confirmed
                | TransactionState::Complete
                | TransactionState::Failed
                | TransactionState::Cancelled
        )
    }

    /// Collapses the service's state into the engine's payment status.
    pub fn payment_status(&self) -> crate::types::PaymentStatus {
        use crate::types::PaymentStatus;
        match self {
            TransactionState::Initiated | TransactionState::Queued | TransactionState::Sent => {
                PaymentStatus::Submitted
            }
            TransactionState::Confirmed | TransactionState::Complete => PaymentStatus::Confirmed,
            TransactionState::Failed | TransactionState::Cancelled => PaymentStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeLevel {
    Low,
    Medium,
    High,
}

/// A custodied wallet on one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub address: String,
    pub blockchain: Network,
    pub state: WalletState,
    pub wallet_set_id: Option<String>,
    pub custody_type: CustodyType,
    pub account_type: AccountType,
    pub create_date: UnixTimestamp,
    pub update_date: UnixTimestamp,
}

#[cfg(test)]
impl Wallet {
    pub(crate) fn test_fixture(id: &str, blockchain: Network) -> Self {
        let now = UnixTimestamp::now();
        Wallet {
            id: id.to_string(),
            address: format!("0x{id}00000000000000000000000000000000000000"),
            blockchain,
            state: WalletState::Live,
            wallet_set_id: None,
            custody_type: CustodyType::Developer,
            account_type: AccountType::Eoa,
            create_date: now,
            update_date: now,
        }
    }
}

/// A named group of wallets sharing policy scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSet {
    pub id: String,
    pub name: Option<String>,
    pub custody_type: CustodyType,
    pub create_date: UnixTimestamp,
    pub update_date: UnixTimestamp,
}

/// One transaction as listed by the wallet service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub state: TransactionState,
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub amounts: Vec<MoneyAmount>,
    pub source_address: Option<String>,
    pub destination_address: Option<String>,
    pub blockchain: Network,
    pub fee_level: Option<FeeLevel>,
    pub create_date: UnixTimestamp,
    pub update_date: UnixTimestamp,
}

/// What a transfer submission hands back immediately. The transaction hash
/// may lag; poll [`WalletProvider::transaction`] until it surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_id: String,
    pub tx_hash: Option<String>,
    pub state: TransactionState,
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Transport-level failure talking to the wallet service.
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The service answered, but the body did not decode.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// Non-success status from the service, body preserved for diagnostics.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid wallet service base URL: {0}")]
    InvalidBaseUrl(Url),
    #[error("Wallet not found: {0}")]
    NotFound(String),
    /// The service refused the operation outright, e.g. a frozen wallet.
    #[error("Wallet service rejected the request: {0}")]
    Rejected(String),
}

/// The engine's view of the wallet service. Balances and transaction
/// finality reported here are authoritative.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn create_wallet_set(&self, name: Option<&str>) -> Result<WalletSet, WalletError>;

    async fn create_wallet(
        &self,
        wallet_set_id: &str,
        blockchain: Network,
    ) -> Result<Wallet, WalletError>;

    async fn wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError>;

    /// Wallets, optionally narrowed to one wallet set.
    async fn wallets(&self, wallet_set_id: Option<&str>) -> Result<Vec<Wallet>, WalletError>;

    async fn wallet_sets(&self) -> Result<Vec<WalletSet>, WalletError>;

    /// Spendable balance, in the given token (service default when `None`).
    async fn balance(
        &self,
        wallet_id: &str,
        token: Option<&str>,
    ) -> Result<MoneyAmount, WalletError>;

    async fn transactions(&self, wallet_id: &str) -> Result<Vec<TransactionRecord>, WalletError>;

    async fn transaction(&self, transaction_id: &str) -> Result<TransactionRecord, WalletError>;

    /// Submits a same-chain transfer out of `wallet_id`.
    async fn transfer(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount: MoneyAmount,
    ) -> Result<TransferReceipt, WalletError>;

    /// Submits a cross-chain transfer through the service's bridging rail.
    async fn transfer_crosschain(
        &self,
        wallet_id: &str,
        destination: &CrosschainDestination,
        amount: MoneyAmount,
    ) -> Result<TransferReceipt, WalletError>;
}

/// Typed client for the wallet service REST API.
#[derive(Debug, Clone)]
pub struct HttpWalletProvider {
    base_url: Url,
    client: Client,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl HttpWalletProvider {
    /// Client rooted at `base_url`. A missing trailing slash is added so
    /// endpoint joins resolve under the base path.
    pub fn try_new(base_url: Url) -> Result<Self, WalletError> {
        if base_url.cannot_be_a_base() {
            return Err(WalletError::InvalidBaseUrl(base_url));
        }
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(HttpWalletProvider {
            base_url,
            client: Client::new(),
            api_key: None,
            timeout: None,
        })
    }

    /// Returns a clone carrying a bearer token for every request.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.api_key = Some(api_key.into());
        next
    }

    /// Returns a clone with a per-request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.timeout = Some(timeout);
        next
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str, context: &'static str) -> Result<Url, WalletError> {
        self.base_url
            .join(path)
            .map_err(|source| WalletError::UrlParse { context, source })
    }

    async fn get_json<R>(&self, url: Url, context: &'static str) -> Result<R, WalletError>
    where
        R: DeserializeOwned,
    {
        let mut request = self.client.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|source| WalletError::Http { context, source })?;
        Self::read_json(response, context).await
    }

    async fn post_json<T, R>(
        &self,
        url: Url,
        payload: &T,
        context: &'static str,
    ) -> Result<R, WalletError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(url)
            .json(payload)
            .header(IDEMPOTENCY_KEY_HEADER, Uuid::now_v7().to_string());
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|source| WalletError::Http { context, source })?;
        Self::read_json(response, context).await
    }

    async fn read_json<R>(response: Response, context: &'static str) -> Result<R, WalletError>
    where
        R: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|source| WalletError::ResponseBodyRead { context, source })?;
            return Err(WalletError::HttpStatus {
                context,
                status,
                body,
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|source| WalletError::JsonDeserialization { context, source })
    }
}

impl TryFrom<&str> for HttpWalletProvider {
    type Error = WalletError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim_end_matches('/');
        let base_url = Url::parse(&format!("{trimmed}/")).map_err(|source| {
            WalletError::UrlParse {
                context: "wallet service base URL",
                source,
            }
        })?;
        HttpWalletProvider::try_new(base_url)
    }
}

#[derive(Serialize)]
struct CreateWalletSetBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateWalletBody<'a> {
    wallet_set_id: &'a str,
    blockchain: Network,
}

#[derive(Serialize)]
struct TransferBody<'a> {
    wallet_id: &'a str,
    recipient: &'a str,
    amount: MoneyAmount,
}

#[derive(Serialize)]
struct CrosschainTransferBody<'a> {
    wallet_id: &'a str,
    destination: &'a CrosschainDestination,
    amount: MoneyAmount,
}

#[derive(Deserialize)]
struct BalanceResponse {
    amount: MoneyAmount,
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn create_wallet_set(&self, name: Option<&str>) -> Result<WalletSet, WalletError> {
        let context = "POST /v1/walletSets";
        let url = self.endpoint("./v1/walletSets", context)?;
        self.post_json(url, &CreateWalletSetBody { name }, context)
            .await
    }

    async fn create_wallet(
        &self,
        wallet_set_id: &str,
        blockchain: Network,
    ) -> Result<Wallet, WalletError> {
        let context = "POST /v1/wallets";
        let url = self.endpoint("./v1/wallets", context)?;
        self.post_json(
            url,
            &CreateWalletBody {
                wallet_set_id,
                blockchain,
            },
            context,
        )
        .await
    }

    async fn wallet(&self, wallet_id: &str) -> Result<Wallet, WalletError> {
        let context = "GET /v1/wallets/{id}";
        let url = self.endpoint(&format!("./v1/wallets/{wallet_id}"), context)?;
        match self.get_json(url, context).await {
            Err(WalletError::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(WalletError::NotFound(wallet_id.to_string()))
            }
            other => other,
        }
    }

    async fn wallets(&self, wallet_set_id: Option<&str>) -> Result<Vec<Wallet>, WalletError> {
        let context = "GET /v1/wallets";
        let mut url = self.endpoint("./v1/wallets", context)?;
        if let Some(wallet_set_id) = wallet_set_id {
            url.query_pairs_mut()
                .append_pair("wallet_set_id", wallet_set_id);
        }
        self.get_json(url, context).await
    }

    async fn wallet_sets(&self) -> Result<Vec<WalletSet>, WalletError> {
        let context = "GET /v1/walletSets";
        let url = self.endpoint("./v1/walletSets", context)?;
        self.get_json(url, context).await
    }

    async fn balance(
        &self,
        wallet_id: &str,
        token: Option<&str>,
    ) -> Result<MoneyAmount, WalletError> {
        let context = "GET /v1/wallets/{id}/balance";
        let mut url = self.endpoint(&format!("./v1/wallets/{wallet_id}/balance"), context)?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        let response: BalanceResponse = match self.get_json(url, context).await {
            Err(WalletError::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(WalletError::NotFound(wallet_id.to_string()));
            }
            other => other?,
        };
        Ok(response.amount)
    }

    async fn transactions(&self, wallet_id: &str) -> Result<Vec<TransactionRecord>, WalletError> {
        let context = "GET /v1/wallets/{id}/transactions";
        let url = self.endpoint(&format!("./v1/wallets/{wallet_id}/transactions"), context)?;
        self.get_json(url, context).await
    }

    async fn transaction(&self, transaction_id: &str) -> Result<TransactionRecord, WalletError> {
        let context = "GET /v1/transactions/{id}";
        let url = self.endpoint(&format!("./v1/transactions/{transaction_id}"), context)?;
        match self.get_json(url, context).await {
            Err(WalletError::HttpStatus { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(WalletError::NotFound(transaction_id.to_string()))
            }
            other => other,
        }
    }

    async fn transfer(
        &self,
        wallet_id: &str,
        recipient: &str,
        amount: MoneyAmount,
    ) -> Result<TransferReceipt, WalletError> {
        let context = "POST /v1/transfers";
        let url = self.endpoint("./v1/transfers", context)?;
        self.post_json(
            url,
            &TransferBody {
                wallet_id,
                recipient,
                amount,
            },
            context,
        )
        .await
    }

    async fn transfer_crosschain(
        &self,
        wallet_id: &str,
        destination: &CrosschainDestination,
        amount: MoneyAmount,
    ) -> Result<TransferReceipt, WalletError> {
        let context = "POST /v1/transfers/crosschain";
        let url = self.endpoint("./v1/transfers/crosschain", context)?;
        self.post_json(
            url,
            &CrosschainTransferBody {
                wallet_id,
                destination,
                amount,
            },
            context,
        )
        .await
    }
}
