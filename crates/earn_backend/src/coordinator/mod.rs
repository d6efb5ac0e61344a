//! Bounty lifecycle coordinator
//!
//! Every workflow runs validation, then the ledger write, then the wait for
//! confirmation, then reconciliation of the off-chain mirror, strictly in
//! that order. The ledger is the system of record for funds; the store is a
//! cache of it and may lag behind.

mod cancel;
mod create;
mod error;
mod events;
mod submit;
mod winners;

use std::sync::Arc;

use chrono::Utc;
use earn_contract::{Confirmation, Ledger, PendingTx, H160};
use log::{info, warn};

pub use cancel::{CancelOutcome, CancelPath, StatusView};
pub use create::CreateOutcome;
pub use error::{ValidationError, WorkflowError};
pub use events::{EventSink, LifecycleEvent, Stage};
pub use submit::SubmitOutcome;
pub use winners::{compute_prizes, validate_selections, WinnerSelection, WinnersOutcome};

use crate::{db::RecordStore, models::Opportunity, submissions::SubmissionAggregator};

/// Wallet, network and clock of whoever invokes a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub chain_id: u64,
    pub caller: H160,
    /// Unix timestamp (seconds)
    pub now: u64,
}

impl CallContext {
    pub fn new(chain_id: u64, caller: H160) -> Self {
        CallContext {
            chain_id,
            caller,
            now: Utc::now().timestamp().max(0) as u64,
        }
    }
}

pub struct Coordinator<L, S> {
    ledger: Arc<L>,
    store: Arc<S>,
    submissions: SubmissionAggregator<L, S>,
    /// Chain every write must be issued on
    chain_id: u64,
}

impl<L: Ledger, S: RecordStore> Coordinator<L, S> {
    pub fn new(ledger: Arc<L>, store: Arc<S>, chain_id: u64) -> Self {
        Coordinator {
            submissions: SubmissionAggregator::new(ledger.clone(), store.clone()),
            ledger,
            store,
            chain_id,
        }
    }

    async fn load_opportunity(&self, id: &str) -> Result<Opportunity, WorkflowError> {
        self.store
            .get_opportunity_by_id(id)
            .await?
            .ok_or_else(|| ValidationError::OpportunityNotFound(id.to_owned()).into())
    }

    /// Returns the linked bounty id or rejects an unlinked opportunity
    fn linked_bounty(opportunity: &Opportunity) -> Result<u64, WorkflowError> {
        opportunity
            .contract_bounty_id
            .ok_or_else(|| ValidationError::NotLinked(opportunity.id.clone()).into())
    }

    /// Make sure the wallet is on the expected chain before any write
    async fn ensure_network(
        &self,
        ctx: &CallContext,
        events: &EventSink,
    ) -> Result<(), WorkflowError> {
        if ctx.chain_id == self.chain_id {
            return Ok(());
        }

        events.emit(LifecycleEvent::SwitchingNetwork {
            chain_id: self.chain_id,
        });
        if self.ledger.switch_network(self.chain_id).await? {
            info!("switched from chain {} to {}", ctx.chain_id, self.chain_id);
            Ok(())
        } else {
            Err(WorkflowError::NetworkSwitchRefused {
                expected: self.chain_id,
                actual: ctx.chain_id,
            })
        }
    }

    /// Surface the pending handle as soon as the node accepts the write
    fn submitted(
        &self,
        events: &EventSink,
        write: Result<PendingTx, earn_contract::LedgerError>,
    ) -> Result<PendingTx, WorkflowError> {
        let pending = write.map_err(|e| WorkflowError::from_write(e, None))?;
        events.emit(LifecycleEvent::Submitted {
            tx_hash: pending.tx_hash,
        });
        Ok(pending)
    }

    async fn confirm(
        &self,
        events: &EventSink,
        pending: PendingTx,
    ) -> Result<Confirmation, WorkflowError> {
        let tx_hash = pending.tx_hash;
        events.emit(LifecycleEvent::WaitingForConfirmation { tx_hash });

        let confirmation = self.ledger.await_confirmation(pending).await.map_err(|e| {
            if e.is_unknown_outcome() {
                warn!("outcome of {tx_hash:?} unknown: {e}");
            }
            WorkflowError::from_write(e, Some(tx_hash))
        })?;

        if !confirmation.success {
            return Err(WorkflowError::Rejected {
                reason: "transaction reverted".into(),
                tx_hash: Some(tx_hash),
            });
        }

        events.emit(LifecycleEvent::Confirmed {
            tx_hash,
            block: confirmation.receipt.block_number.map(|b| b.as_u64()),
        });
        Ok(confirmation)
    }
}
