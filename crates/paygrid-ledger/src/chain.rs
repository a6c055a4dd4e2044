//! Intermediate on-chain account adapter
//!
//! An externally-owned account used as a transit point between the custodial
//! wallet and the payment facility. Funds stranded here after a partial
//! rebalance are visible through `native_balance`.

use async_trait::async_trait;
use paygrid_types::{ChainAddress, PayGridError, Result, TxHash};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Typed access to the intermediate on-chain account
#[async_trait]
pub trait ChainAccount: Send + Sync {
    /// The account's address (the destination for custodial transfers)
    fn address(&self) -> &ChainAddress;

    /// Read the native token balance
    async fn native_balance(&self) -> Result<Decimal>;

    /// Send `amount` to `to`
    async fn send(&self, to: &ChainAddress, amount: Decimal) -> Result<TxHash>;
}

/// In-memory intermediate account
pub struct MemoryChainAccount {
    address: ChainAddress,
    balance: Arc<RwLock<Decimal>>,
}

impl MemoryChainAccount {
    pub fn new(address: ChainAddress) -> Self {
        Self {
            address,
            balance: Arc::new(RwLock::new(Decimal::ZERO)),
        }
    }

    /// Shared handle to the balance, for linking fixtures together
    pub fn balance_handle(&self) -> Arc<RwLock<Decimal>> {
        self.balance.clone()
    }

    pub async fn credit(&self, amount: Decimal) {
        *self.balance.write().await += amount;
    }
}

#[async_trait]
impl ChainAccount for MemoryChainAccount {
    fn address(&self) -> &ChainAddress {
        &self.address
    }

    async fn native_balance(&self) -> Result<Decimal> {
        Ok(*self.balance.read().await)
    }

    async fn send(&self, to: &ChainAddress, amount: Decimal) -> Result<TxHash> {
        let mut balance = self.balance.write().await;
        if *balance < amount {
            return Err(PayGridError::ledger(format!(
                "intermediate balance {balance} below send amount {amount}"
            )));
        }
        *balance -= amount;
        Ok(TxHash::new(format!("0xsend-{}-{}", to.as_str(), amount)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn send_debits_balance() {
        let account = MemoryChainAccount::new(ChainAddress::new("0xintermediate"));
        account.credit(dec!(10)).await;
        account
            .send(&ChainAddress::new("0xelsewhere"), dec!(4))
            .await
            .unwrap();
        assert_eq!(account.native_balance().await.unwrap(), dec!(6));
    }

    #[tokio::test]
    async fn overdraw_is_rejected() {
        let account = MemoryChainAccount::new(ChainAddress::new("0xintermediate"));
        let result = account.send(&ChainAddress::new("0xelsewhere"), dec!(1)).await;
        assert!(result.is_err());
    }
}
