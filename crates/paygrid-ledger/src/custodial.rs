//! Custodial wallet adapter
//!
//! The custodial wallet holds an agent's earned funds at a wallet provider
//! and is reached only through the provider's API: create wallet, read
//! balance, create transfer, poll transfer status.

use async_trait::async_trait;
use paygrid_types::{ChainAddress, PayGridError, Result, TransferId, TransferStatus, TxHash};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A provider-side wallet handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDescriptor {
    /// Provider-issued wallet id
    pub id: String,
    /// On-chain address backing the wallet
    pub address: ChainAddress,
}

/// Typed access to the custodial wallet provider
#[async_trait]
pub trait CustodialWallet: Send + Sync {
    /// Create a new provider wallet
    async fn create_wallet(&self) -> Result<WalletDescriptor>;

    /// Read the spendable token balance
    async fn token_balance(&self) -> Result<Decimal>;

    /// Submit a transfer to `destination`; returns the provider transfer id
    async fn create_transfer(
        &self,
        destination: &ChainAddress,
        amount: Decimal,
    ) -> Result<TransferId>;

    /// Poll the status of a previously submitted transfer
    async fn transfer_status(&self, id: &TransferId) -> Result<TransferStatus>;
}

// ============================================================================
// In-memory implementation (test fixture / local backend)
// ============================================================================

#[derive(Debug)]
struct MemoryTransfer {
    status: TransferStatus,
    /// Number of status reads that still report Pending before completion
    pending_reads: u32,
}

/// In-memory custodial wallet
///
/// Transfers debit the wallet on submission and credit the linked
/// destination balance when completed; a configurable number of status
/// reads report Pending first, so confirmation polling is exercised.
pub struct MemoryCustodialWallet {
    balance: Arc<RwLock<Decimal>>,
    transfers: Arc<RwLock<HashMap<TransferId, MemoryTransfer>>>,
    /// Destination balance credited when a transfer completes
    destination_credit: Option<Arc<RwLock<Decimal>>>,
    pending_reads: Arc<RwLock<u32>>,
    fail_transfers: Arc<RwLock<bool>>,
    next_id: Arc<RwLock<u64>>,
}

impl MemoryCustodialWallet {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance: Arc::new(RwLock::new(balance)),
            transfers: Arc::new(RwLock::new(HashMap::new())),
            destination_credit: None,
            pending_reads: Arc::new(RwLock::new(0)),
            fail_transfers: Arc::new(RwLock::new(false)),
            next_id: Arc::new(RwLock::new(1)),
        }
    }

    /// Link a destination balance that completed transfers credit
    pub fn with_destination(mut self, destination: Arc<RwLock<Decimal>>) -> Self {
        self.destination_credit = Some(destination);
        self
    }

    /// Report Pending for the first `reads` status polls of each transfer
    pub async fn set_pending_reads(&self, reads: u32) {
        *self.pending_reads.write().await = reads;
    }

    /// Make subsequent transfers terminate as Failed
    pub async fn set_fail_transfers(&self, fail: bool) {
        *self.fail_transfers.write().await = fail;
    }

    /// Count of transfers submitted so far
    pub async fn transfer_count(&self) -> usize {
        self.transfers.read().await.len()
    }
}

#[async_trait]
impl CustodialWallet for MemoryCustodialWallet {
    async fn create_wallet(&self) -> Result<WalletDescriptor> {
        Ok(WalletDescriptor {
            id: "mem-wallet".to_string(),
            address: ChainAddress::new("0xmem0000000000000000000000000000000000000"),
        })
    }

    async fn token_balance(&self) -> Result<Decimal> {
        Ok(*self.balance.read().await)
    }

    async fn create_transfer(
        &self,
        destination: &ChainAddress,
        amount: Decimal,
    ) -> Result<TransferId> {
        let mut balance = self.balance.write().await;
        if *balance < amount {
            return Err(PayGridError::InsufficientCustodialBalance {
                available: *balance,
                minimum: amount,
            });
        }
        *balance -= amount;

        let id = {
            let mut next = self.next_id.write().await;
            let id = TransferId::new(format!("transfer-{next}"));
            *next += 1;
            id
        };

        let status = if *self.fail_transfers.read().await {
            TransferStatus::Failed {
                reason: "provider rejected transfer".to_string(),
            }
        } else {
            if let Some(dest) = &self.destination_credit {
                *dest.write().await += amount;
            }
            TransferStatus::Complete {
                tx_hash: Some(TxHash::new(format!("0xtx{}", id.as_str()))),
            }
        };

        self.transfers.write().await.insert(
            id.clone(),
            MemoryTransfer {
                status,
                pending_reads: *self.pending_reads.read().await,
            },
        );
        info!("Custodial transfer {} of {} to {} submitted", id, amount, destination);
        Ok(id)
    }

    async fn transfer_status(&self, id: &TransferId) -> Result<TransferStatus> {
        let mut transfers = self.transfers.write().await;
        let transfer = transfers
            .get_mut(id)
            .ok_or_else(|| PayGridError::ledger(format!("unknown transfer {id}")))?;
        if transfer.pending_reads > 0 {
            transfer.pending_reads -= 1;
            return Ok(TransferStatus::Pending);
        }
        Ok(transfer.status.clone())
    }
}

// ============================================================================
// HTTP implementation (wallet provider REST API)
// ============================================================================

/// Configuration for the HTTP wallet provider client
#[derive(Debug, Clone)]
pub struct WalletProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

impl WalletProviderConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("PAYGRID_WALLET_PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:7070".to_string()),
            api_key: std::env::var("PAYGRID_WALLET_PROVIDER_KEY").unwrap_or_default(),
        }
    }
}

/// Custodial wallet client over the provider's REST API
pub struct HttpCustodialWallet {
    config: WalletProviderConfig,
    client: reqwest::Client,
    wallet_id: String,
}

#[derive(Serialize)]
struct CreateWalletRequest<'a> {
    network: &'a str,
}

#[derive(Deserialize)]
struct WalletResponse {
    id: String,
    address: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    available: Decimal,
}

#[derive(Serialize)]
struct CreateTransferRequest<'a> {
    destination: &'a str,
    amount: Decimal,
}

#[derive(Deserialize)]
struct TransferResponse {
    id: String,
}

#[derive(Deserialize)]
struct TransferStatusResponse {
    state: String,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl HttpCustodialWallet {
    pub fn new(config: WalletProviderConfig, wallet_id: impl Into<String>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            wallet_id: wallet_id.into(),
        }
    }

    /// Load a persisted wallet id from the store, or create and persist one.
    pub async fn load_or_create(
        config: WalletProviderConfig,
        store: &dyn crate::KeyValueStore,
    ) -> Result<Self> {
        const WALLET_KEY: &str = "custodial_wallet";

        if let Some(saved) = store.load(WALLET_KEY).await? {
            let descriptor: WalletDescriptor = serde_json::from_str(&saved)
                .map_err(|e| PayGridError::ledger(format!("corrupt wallet record: {e}")))?;
            return Ok(Self::new(config, descriptor.id));
        }

        let bootstrap = Self::new(config, String::new());
        let descriptor = bootstrap.create_wallet().await?;
        let serialized = serde_json::to_string(&descriptor)
            .map_err(|e| PayGridError::ledger(format!("serialize wallet record: {e}")))?;
        store.save(WALLET_KEY, &serialized).await?;
        info!("Created custodial wallet {} at {}", descriptor.id, descriptor.address);
        Ok(Self::new(bootstrap.config, descriptor.id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.client
            .get(self.url(path))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| PayGridError::ledger(format!("wallet provider request: {e}")))?
            .error_for_status()
            .map_err(|e| PayGridError::ledger(format!("wallet provider status: {e}")))?
            .json()
            .await
            .map_err(|e| PayGridError::ledger(format!("wallet provider body: {e}")))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| PayGridError::ledger(format!("wallet provider request: {e}")))?
            .error_for_status()
            .map_err(|e| PayGridError::ledger(format!("wallet provider status: {e}")))?
            .json()
            .await
            .map_err(|e| PayGridError::ledger(format!("wallet provider body: {e}")))
    }
}

#[async_trait]
impl CustodialWallet for HttpCustodialWallet {
    async fn create_wallet(&self) -> Result<WalletDescriptor> {
        let response: WalletResponse = self
            .post_json("/v1/wallets", &CreateWalletRequest { network: "base" })
            .await?;
        Ok(WalletDescriptor {
            id: response.id,
            address: ChainAddress::new(response.address),
        })
    }

    async fn token_balance(&self) -> Result<Decimal> {
        let response: BalanceResponse = self
            .get_json(&format!("/v1/wallets/{}/balance", self.wallet_id))
            .await?;
        Ok(response.available)
    }

    async fn create_transfer(
        &self,
        destination: &ChainAddress,
        amount: Decimal,
    ) -> Result<TransferId> {
        let response: TransferResponse = self
            .post_json(
                &format!("/v1/wallets/{}/transfers", self.wallet_id),
                &CreateTransferRequest {
                    destination: destination.as_str(),
                    amount,
                },
            )
            .await?;
        Ok(TransferId::new(response.id))
    }

    async fn transfer_status(&self, id: &TransferId) -> Result<TransferStatus> {
        let response: TransferStatusResponse = self
            .get_json(&format!("/v1/transfers/{}", id.as_str()))
            .await?;
        let status = match response.state.as_str() {
            "pending" => TransferStatus::Pending,
            "complete" => TransferStatus::Complete {
                tx_hash: response.tx_hash.map(TxHash::new),
            },
            "failed" => TransferStatus::Failed {
                reason: response
                    .failure_reason
                    .unwrap_or_else(|| "unspecified".to_string()),
            },
            other => {
                return Err(PayGridError::ledger(format!(
                    "unknown transfer state {other}"
                )))
            }
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn transfer_debits_wallet_and_credits_destination() {
        let destination = Arc::new(RwLock::new(dec!(0)));
        let wallet = MemoryCustodialWallet::new(dec!(50)).with_destination(destination.clone());

        let id = wallet
            .create_transfer(&ChainAddress::new("0xdest"), dec!(20))
            .await
            .unwrap();
        assert_eq!(wallet.token_balance().await.unwrap(), dec!(30));
        assert_eq!(*destination.read().await, dec!(20));
        assert!(matches!(
            wallet.transfer_status(&id).await.unwrap(),
            TransferStatus::Complete { .. }
        ));
    }

    #[tokio::test]
    async fn transfer_over_balance_is_rejected() {
        let wallet = MemoryCustodialWallet::new(dec!(1));
        let err = wallet
            .create_transfer(&ChainAddress::new("0xdest"), dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PayGridError::InsufficientCustodialBalance {
                available,
                minimum,
            } if available == dec!(1) && minimum == dec!(5)
        ));
        assert_eq!(wallet.token_balance().await.unwrap(), dec!(1));
    }

    #[tokio::test]
    async fn status_reports_pending_before_completion() {
        let wallet = MemoryCustodialWallet::new(dec!(10));
        wallet.set_pending_reads(2).await;
        let id = wallet
            .create_transfer(&ChainAddress::new("0xdest"), dec!(5))
            .await
            .unwrap();

        assert_eq!(
            wallet.transfer_status(&id).await.unwrap(),
            TransferStatus::Pending
        );
        assert_eq!(
            wallet.transfer_status(&id).await.unwrap(),
            TransferStatus::Pending
        );
        assert!(wallet.transfer_status(&id).await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn failed_transfers_surface_reason() {
        let wallet = MemoryCustodialWallet::new(dec!(10));
        wallet.set_fail_transfers(true).await;
        let id = wallet
            .create_transfer(&ChainAddress::new("0xdest"), dec!(5))
            .await
            .unwrap();
        assert!(matches!(
            wallet.transfer_status(&id).await.unwrap(),
            TransferStatus::Failed { .. }
        ));
    }
}
