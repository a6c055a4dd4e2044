//! PayGrid Treasury - Cross-ledger balance rebalancing
//!
//! A threshold-triggered control loop that keeps the payment facility funded
//! from the custodial wallet so agents never run dry mid-session. Funds move
//! custodial -> intermediate on-chain account -> facility; each step commits
//! independently, there is no cross-step transaction.
//!
//! At most one cycle runs system-wide: an atomic single-flight flag owned by
//! the rebalancer instance turns concurrent triggers into no-ops, never
//! queued retries. Cycle failures are surfaced, not retried; the next
//! scheduled trigger is the retry mechanism.
//!
//! A crash between the custodial transfer and the facility deposit leaves
//! funds in the intermediate account. That balance is read and logged at the
//! start of every cycle but never auto-reconciled; a still-settling transfer
//! is indistinguishable from stranded funds here, and draining the wrong one
//! double-moves money. Operators act on the warning.

use paygrid_ledger::{
    await_confirmation, ChainAccount, CustodialWallet, PaymentFacility, PollConfig, PollOutcome,
    PollProbe,
};
use paygrid_types::{
    PayGridError, RebalanceCycle, RebalanceOutcome, Result, TransferStatus,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Parameters for the refill control loop
#[derive(Debug, Clone)]
pub struct RebalanceConfig {
    /// Facility balance at or above this needs no refill
    pub low_balance_threshold: Decimal,
    /// Target amount to move per cycle, capped by custodial funds
    pub refill_amount: Decimal,
    /// Transfers below this are not worth a transaction
    pub minimum_viable_amount: Decimal,
    /// Bounded confirmation polling for the custodial transfer
    pub poll: PollConfig,
    /// Pause for downstream indexers between transfer and deposit
    pub settle_delay: Duration,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            low_balance_threshold: Decimal::from(5),
            refill_amount: Decimal::from(20),
            minimum_viable_amount: Decimal::ONE,
            poll: PollConfig::default(),
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of one `check_and_refill` invocation
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub refilled: bool,
    /// Facility balance at decision time (fresh after a refill); absent when
    /// the single-flight guard short-circuited before any read
    pub facility_balance: Option<Decimal>,
    /// Custodial balance, read only once the threshold check passes
    pub custodial_balance: Option<Decimal>,
    pub amount_refilled: Option<Decimal>,
    pub outcome: RebalanceOutcome,
}

impl RebalanceReport {
    fn skipped(outcome: RebalanceOutcome) -> Self {
        Self {
            refilled: false,
            facility_balance: None,
            custodial_balance: None,
            amount_refilled: None,
            outcome,
        }
    }
}

/// Threshold-triggered refill loop over the three ledger adapters
pub struct CrossLedgerRebalancer {
    custodial: Arc<dyn CustodialWallet>,
    intermediate: Arc<dyn ChainAccount>,
    facility: Arc<dyn PaymentFacility>,
    config: RebalanceConfig,
    in_flight: AtomicBool,
}

impl CrossLedgerRebalancer {
    pub fn new(
        custodial: Arc<dyn CustodialWallet>,
        intermediate: Arc<dyn ChainAccount>,
        facility: Arc<dyn PaymentFacility>,
        config: RebalanceConfig,
    ) -> Self {
        Self {
            custodial,
            intermediate,
            facility,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one refill cycle unless one is already in flight.
    ///
    /// A concurrent call returns immediately with `refilled=false` and no
    /// ledger reads. Within a cycle the steps run strictly in sequence; a
    /// mid-cycle error aborts the cycle, never the process.
    pub async fn check_and_refill(&self) -> Result<RebalanceReport> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("Rebalance already in flight; skipping");
            return Ok(RebalanceReport::skipped(RebalanceOutcome::AlreadyRunning));
        }

        let result = self.run_cycle().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_cycle(&self) -> Result<RebalanceReport> {
        let cycle_id = Uuid::new_v4();
        let triggered_at = chrono::Utc::now();

        // Stranded-funds surfacing only; see module docs.
        let intermediate_balance = self.intermediate.native_balance().await?;
        if intermediate_balance > Decimal::ZERO {
            warn!(
                "Intermediate account holds {} outside both wallet and facility",
                intermediate_balance
            );
        }

        let facility_before = self.facility.balances().await?.facility_available;
        if facility_before >= self.config.low_balance_threshold {
            return Ok(RebalanceReport {
                refilled: false,
                facility_balance: Some(facility_before),
                custodial_balance: None,
                amount_refilled: None,
                outcome: RebalanceOutcome::AboveThreshold,
            });
        }

        let custodial_before = self.custodial.token_balance().await?;
        let refill = self.config.refill_amount.min(custodial_before);
        if refill < self.config.minimum_viable_amount {
            warn!(
                "Custodial balance {} below minimum viable refill {}; facility stays at {}",
                custodial_before, self.config.minimum_viable_amount, facility_before
            );
            return Ok(RebalanceReport {
                refilled: false,
                facility_balance: Some(facility_before),
                custodial_balance: Some(custodial_before),
                amount_refilled: None,
                outcome: RebalanceOutcome::InsufficientCustodial,
            });
        }

        info!(
            "Refilling facility: moving {} of custodial {} (facility at {})",
            refill, custodial_before, facility_before
        );

        // Step 1 of 2: custodial -> intermediate, confirmed by bounded poll.
        let transfer_id = self
            .custodial
            .create_transfer(self.intermediate.address(), refill)
            .await?;
        let outcome = await_confirmation(&self.config.poll, || {
            let custodial = self.custodial.clone();
            let transfer_id = transfer_id.clone();
            async move {
                let probe = match custodial.transfer_status(&transfer_id).await? {
                    TransferStatus::Pending => PollProbe::Pending,
                    TransferStatus::Complete { tx_hash } => PollProbe::Confirmed(tx_hash),
                    TransferStatus::Failed { reason } => PollProbe::Failed(reason),
                };
                Ok(probe)
            }
        })
        .await?;
        match outcome {
            PollOutcome::Confirmed(_) => {}
            PollOutcome::Failed(reason) => {
                error!("Custodial transfer {} failed: {}", transfer_id, reason);
                return Err(PayGridError::TransferFailed {
                    transfer_id,
                    reason,
                });
            }
            PollOutcome::TimedOut => {
                // The transfer may still land later, stranding funds in the
                // intermediate account; the next cycle's balance read logs it.
                error!(
                    "Custodial transfer {} unconfirmed after {} attempts",
                    transfer_id, self.config.poll.max_attempts
                );
                return Err(PayGridError::TransferTimeout {
                    transfer_id,
                    attempts: self.config.poll.max_attempts,
                });
            }
        }

        // Give downstream readers time to index the transfer. Pragmatic, not
        // provably correct.
        tokio::time::sleep(self.config.settle_delay).await;

        // Step 2 of 2: intermediate -> facility, an independent write.
        self.facility.deposit(refill).await?;

        let facility_after = self.facility.balances().await?.facility_available;
        let cycle = RebalanceCycle {
            id: cycle_id,
            triggered_at,
            facility_before,
            custodial_before,
            amount_moved: refill,
            outcome: RebalanceOutcome::Refilled,
        };
        info!(
            "Rebalance cycle {} complete: moved {}, facility {} -> {}",
            cycle.id, refill, facility_before, facility_after
        );

        Ok(RebalanceReport {
            refilled: true,
            facility_balance: Some(facility_after),
            custodial_balance: Some(custodial_before),
            amount_refilled: Some(refill),
            outcome: RebalanceOutcome::Refilled,
        })
    }

    /// Fixed-interval trigger loop; shares the single-flight guard with
    /// on-demand triggers, so overlap is a no-op.
    pub fn spawn_interval(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.check_and_refill().await {
                    error!("Scheduled rebalance failed: {e}");
                }
            }
        })
    }

    /// Point-in-time read across all three ledgers
    pub async fn snapshot(&self) -> Result<paygrid_types::BalanceSnapshot> {
        let facility = self.facility.balances().await?;
        Ok(paygrid_types::BalanceSnapshot {
            custodial_available: self.custodial.token_balance().await?,
            intermediate_available: self.intermediate.native_balance().await?,
            facility_available: facility.facility_available,
            facility_total: facility.facility_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygrid_ledger::{
        MemoryChainAccount, MemoryCustodialWallet, MemoryPaymentFacility,
    };
    use paygrid_types::ChainAddress;
    use rust_decimal_macros::dec;

    struct Fixture {
        rebalancer: Arc<CrossLedgerRebalancer>,
        custodial: Arc<MemoryCustodialWallet>,
        facility: Arc<MemoryPaymentFacility>,
    }

    fn fast_config() -> RebalanceConfig {
        RebalanceConfig {
            low_balance_threshold: dec!(5),
            refill_amount: dec!(20),
            minimum_viable_amount: dec!(1),
            poll: PollConfig {
                interval: Duration::from_millis(5),
                max_attempts: 5,
            },
            settle_delay: Duration::from_millis(1),
        }
    }

    async fn fixture(custodial_balance: Decimal, facility_balance: Decimal) -> Fixture {
        let intermediate = Arc::new(MemoryChainAccount::new(ChainAddress::new("0xtransit")));
        let custodial = Arc::new(
            MemoryCustodialWallet::new(custodial_balance)
                .with_destination(intermediate.balance_handle()),
        );
        let facility = Arc::new(MemoryPaymentFacility::new(intermediate.balance_handle()));
        facility.set_available(facility_balance).await;

        let rebalancer = Arc::new(CrossLedgerRebalancer::new(
            custodial.clone(),
            intermediate,
            facility.clone(),
            fast_config(),
        ));
        Fixture {
            rebalancer,
            custodial,
            facility,
        }
    }

    #[tokio::test]
    async fn refills_through_both_ledgers() {
        // facility 3 < threshold 5, custodial 50 -> move 20, land at 23
        let fx = fixture(dec!(50), dec!(3)).await;

        let report = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(report.refilled);
        assert_eq!(report.amount_refilled, Some(dec!(20)));
        assert_eq!(report.facility_balance, Some(dec!(23)));
        assert_eq!(report.custodial_balance, Some(dec!(50)));
        assert_eq!(fx.custodial.token_balance().await.unwrap(), dec!(30));
    }

    #[tokio::test]
    async fn above_threshold_is_a_no_op() {
        let fx = fixture(dec!(50), dec!(9)).await;

        let report = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(!report.refilled);
        assert_eq!(report.outcome, RebalanceOutcome::AboveThreshold);
        assert_eq!(report.facility_balance, Some(dec!(9)));
        // Zero mutating calls: no transfer was submitted.
        assert_eq!(fx.custodial.transfer_count().await, 0);
        assert_eq!(fx.custodial.token_balance().await.unwrap(), dec!(50));
    }

    #[tokio::test]
    async fn dust_custodial_aborts_without_transfer() {
        // custodial 0.5 < minimum viable 1
        let fx = fixture(dec!(0.5), dec!(3)).await;

        let report = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(!report.refilled);
        assert_eq!(report.outcome, RebalanceOutcome::InsufficientCustodial);
        assert_eq!(report.facility_balance, Some(dec!(3)));
        assert_eq!(report.custodial_balance, Some(dec!(0.5)));
        assert_eq!(fx.custodial.transfer_count().await, 0);
    }

    #[tokio::test]
    async fn partial_custodial_caps_the_refill() {
        let fx = fixture(dec!(7), dec!(3)).await;

        let report = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(report.refilled);
        assert_eq!(report.amount_refilled, Some(dec!(7)));
        assert_eq!(report.facility_balance, Some(dec!(10)));
        assert_eq!(fx.custodial.token_balance().await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn concurrent_trigger_is_a_guarded_no_op() {
        let fx = fixture(dec!(50), dec!(3)).await;
        // First cycle sits in the confirmation poll long enough for the
        // second trigger to land mid-flight.
        fx.custodial.set_pending_reads(3).await;

        let first = {
            let rebalancer = fx.rebalancer.clone();
            tokio::spawn(async move { rebalancer.check_and_refill().await })
        };
        tokio::time::sleep(Duration::from_millis(8)).await;

        let second = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(!second.refilled);
        assert_eq!(second.outcome, RebalanceOutcome::AlreadyRunning);
        // Guard short-circuits before any balance read.
        assert_eq!(second.custodial_balance, None);
        assert_eq!(second.facility_balance, None);

        let first = first.await.unwrap().unwrap();
        assert!(first.refilled);
        // Exactly one transfer across both calls.
        assert_eq!(fx.custodial.transfer_count().await, 1);
    }

    #[tokio::test]
    async fn guard_resets_after_a_cycle() {
        let fx = fixture(dec!(50), dec!(3)).await;
        let first = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(first.refilled);

        // Facility is above threshold now, but the guard must not linger.
        let second = fx.rebalancer.check_and_refill().await.unwrap();
        assert_eq!(second.outcome, RebalanceOutcome::AboveThreshold);
    }

    #[tokio::test]
    async fn failed_transfer_surfaces_and_releases_guard() {
        let fx = fixture(dec!(50), dec!(3)).await;
        fx.custodial.set_fail_transfers(true).await;

        let err = fx.rebalancer.check_and_refill().await.unwrap_err();
        assert!(matches!(err, PayGridError::TransferFailed { .. }));

        // The next trigger runs a fresh cycle.
        fx.custodial.set_fail_transfers(false).await;
        let report = fx.rebalancer.check_and_refill().await.unwrap();
        assert!(report.refilled);
    }

    #[tokio::test]
    async fn unconfirmed_transfer_times_out() {
        let fx = fixture(dec!(50), dec!(3)).await;
        // More pending reads than the attempt ceiling allows.
        fx.custodial.set_pending_reads(10).await;

        let err = fx.rebalancer.check_and_refill().await.unwrap_err();
        assert!(matches!(
            err,
            PayGridError::TransferTimeout { attempts: 5, .. }
        ));
        // Custodial was debited but the facility never credited; the money
        // sits in the intermediate account until an operator drains it.
        assert_eq!(fx.custodial.token_balance().await.unwrap(), dec!(30));
        assert_eq!(
            fx.facility.balances().await.unwrap().facility_available,
            dec!(3)
        );
    }

    #[tokio::test]
    async fn snapshot_reads_all_three_ledgers() {
        let fx = fixture(dec!(50), dec!(3)).await;
        let snapshot = fx.rebalancer.snapshot().await.unwrap();
        assert_eq!(snapshot.custodial_available, dec!(50));
        assert_eq!(snapshot.intermediate_available, dec!(0));
        assert_eq!(snapshot.facility_available, dec!(3));
    }
}
