//! Payment facility adapter
//!
//! The facility is a low-latency off-chain balance that settles per-request
//! fees without a blockchain write per request. Deposits move funds from the
//! depositing wallet (the intermediate account) into the facility.

use async_trait::async_trait;
use paygrid_types::{FacilityBalances, PayGridError, Result, TxHash};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Options for a facility withdrawal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawOptions {
    /// Withdraw the full available balance instead of `amount`
    pub all: bool,
}

/// Typed access to the payment facility gateway
#[async_trait]
pub trait PaymentFacility: Send + Sync {
    /// Read facility and depositing-wallet balances
    async fn balances(&self) -> Result<FacilityBalances>;

    /// Deposit `amount` from the depositing wallet into the facility
    async fn deposit(&self, amount: Decimal) -> Result<TxHash>;

    /// Withdraw from the facility back to the depositing wallet
    async fn withdraw(&self, amount: Decimal, opts: WithdrawOptions) -> Result<TxHash>;
}

/// In-memory payment facility
///
/// Linked to the intermediate account's balance so deposits model the real
/// wallet -> facility movement.
pub struct MemoryPaymentFacility {
    facility_available: Arc<RwLock<Decimal>>,
    /// Settling amounts counted in total but not yet available
    facility_settling: Arc<RwLock<Decimal>>,
    wallet_source: Arc<RwLock<Decimal>>,
}

impl MemoryPaymentFacility {
    pub fn new(wallet_source: Arc<RwLock<Decimal>>) -> Self {
        Self {
            facility_available: Arc::new(RwLock::new(Decimal::ZERO)),
            facility_settling: Arc::new(RwLock::new(Decimal::ZERO)),
            wallet_source,
        }
    }

    pub async fn set_available(&self, amount: Decimal) {
        *self.facility_available.write().await = amount;
    }
}

#[async_trait]
impl PaymentFacility for MemoryPaymentFacility {
    async fn balances(&self) -> Result<FacilityBalances> {
        let available = *self.facility_available.read().await;
        let settling = *self.facility_settling.read().await;
        Ok(FacilityBalances {
            facility_available: available,
            facility_total: available + settling,
            wallet_available: *self.wallet_source.read().await,
        })
    }

    async fn deposit(&self, amount: Decimal) -> Result<TxHash> {
        {
            let mut wallet = self.wallet_source.write().await;
            if *wallet < amount {
                return Err(PayGridError::ledger(format!(
                    "depositing wallet balance {wallet} below deposit amount {amount}"
                )));
            }
            *wallet -= amount;
        }
        *self.facility_available.write().await += amount;
        info!("Facility deposit of {} settled", amount);
        Ok(TxHash::new(format!("0xdeposit-{amount}")))
    }

    async fn withdraw(&self, amount: Decimal, opts: WithdrawOptions) -> Result<TxHash> {
        let mut available = self.facility_available.write().await;
        let amount = if opts.all { *available } else { amount };
        if *available < amount {
            return Err(PayGridError::ledger(format!(
                "facility balance {available} below withdrawal amount {amount}"
            )));
        }
        *available -= amount;
        *self.wallet_source.write().await += amount;
        info!("Facility withdrawal of {} settled", amount);
        Ok(TxHash::new(format!("0xwithdraw-{amount}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn facility_with_wallet(wallet: Decimal) -> MemoryPaymentFacility {
        MemoryPaymentFacility::new(Arc::new(RwLock::new(wallet)))
    }

    #[tokio::test]
    async fn deposit_moves_wallet_funds_into_facility() {
        let facility = facility_with_wallet(dec!(20));
        facility.deposit(dec!(20)).await.unwrap();

        let balances = facility.balances().await.unwrap();
        assert_eq!(balances.facility_available, dec!(20));
        assert_eq!(balances.wallet_available, dec!(0));
    }

    #[tokio::test]
    async fn deposit_over_wallet_balance_is_rejected() {
        let facility = facility_with_wallet(dec!(5));
        assert!(facility.deposit(dec!(6)).await.is_err());
        assert_eq!(facility.balances().await.unwrap().wallet_available, dec!(5));
    }

    #[tokio::test]
    async fn withdraw_all_drains_facility() {
        let facility = facility_with_wallet(dec!(10));
        facility.deposit(dec!(10)).await.unwrap();
        facility
            .withdraw(Decimal::ZERO, WithdrawOptions { all: true })
            .await
            .unwrap();

        let balances = facility.balances().await.unwrap();
        assert_eq!(balances.facility_available, dec!(0));
        assert_eq!(balances.wallet_available, dec!(10));
    }
}
