use earn_contract::{Bounty, Ledger, WinnerRecord, H256};
use log::{error, info, warn};
use serde::Serialize;

use super::{CallContext, Coordinator, EventSink, LifecycleEvent, ValidationError, WorkflowError};
use crate::{
    db::RecordStore,
    models::{OpportunityPatch, OpportunityStatus},
};

/// Which way a cancellation went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPath {
    /// Never escrowed, only the mirror changed
    OffChain,
    /// `refundBounty`, nobody had submitted
    Refund,
    /// `cancelBounty(reason)`, submitted work is discarded
    CancelWithReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub path: CancelPath,
    pub tx_hash: Option<H256>,
    pub status: OpportunityStatus,
    /// Set when the chain changed but the mirror could not be updated
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub opportunity_id: String,
    pub status: OpportunityStatus,
    pub bounty: Option<Bounty>,
    pub winners: Vec<WinnerRecord>,
}

/// Status implied by the ledger. A closed bounty without winners went
/// through refund when nobody had submitted and through cancel otherwise.
fn derive_status(bounty: &Bounty, winners: &[WinnerRecord]) -> OpportunityStatus {
    if !bounty.is_closed {
        OpportunityStatus::Open
    } else if !winners.is_empty() {
        OpportunityStatus::Completed
    } else if bounty.total_submissions == 0 {
        OpportunityStatus::Refunded
    } else {
        OpportunityStatus::Cancelled
    }
}

impl<L: Ledger, S: RecordStore> Coordinator<L, S> {
    /// Withdraw an opportunity. Refund or cancel-with-reason is chosen from the
    /// bounty's submission count, not by the caller.
    pub async fn cancel(
        &self,
        ctx: CallContext,
        opportunity_id: &str,
        reason: Option<String>,
        events: &EventSink,
    ) -> Result<CancelOutcome, WorkflowError> {
        let res = self.run_cancel(ctx, opportunity_id, reason, events).await;
        events.finish(res)
    }

    async fn run_cancel(
        &self,
        ctx: CallContext,
        opportunity_id: &str,
        reason: Option<String>,
        events: &EventSink,
    ) -> Result<CancelOutcome, WorkflowError> {
        let opportunity = self.load_opportunity(opportunity_id).await?;
        if opportunity.status != OpportunityStatus::Open {
            return Err(ValidationError::AlreadyClosed(opportunity_id.to_owned()).into());
        }

        let Some(bounty_id) = opportunity.contract_bounty_id else {
            // an unresolved creation may still have escrowed funds
            if opportunity.needs_reconciliation {
                return Err(ValidationError::PendingReconciliation(opportunity_id.to_owned()).into());
            }
            if opportunity.creator != ctx.caller {
                return Err(ValidationError::NotCreator.into());
            }
            self.store
                .update_opportunity(opportunity_id, OpportunityPatch::status(OpportunityStatus::Cancelled))
                .await?;
            info!("cancelled unlinked opportunity {opportunity_id}");
            events.emit(LifecycleEvent::Reconciled {
                opportunity_id: opportunity_id.to_owned(),
            });
            return Ok(CancelOutcome {
                path: CancelPath::OffChain,
                tx_hash: None,
                status: OpportunityStatus::Cancelled,
                warning: None,
            });
        };

        let bounty = self.ledger.read_bounty(bounty_id).await?;
        if bounty.is_closed {
            return Err(ValidationError::BountyClosed(bounty_id).into());
        }
        if !self.ledger.read_winners(bounty_id).await?.is_empty() {
            return Err(ValidationError::WinnersAlreadySelected(bounty_id).into());
        }
        if bounty.creator != ctx.caller {
            return Err(ValidationError::NotCreator.into());
        }
        if !bounty.deadline_passed(ctx.now) {
            return Err(ValidationError::DeadlineNotPassed(bounty_id).into());
        }

        let (path, status) = if bounty.total_submissions == 0 {
            (CancelPath::Refund, OpportunityStatus::Refunded)
        } else {
            (CancelPath::CancelWithReason, OpportunityStatus::Cancelled)
        };
        let reason = reason.map(|r| r.trim().to_owned()).unwrap_or_default();
        if path == CancelPath::CancelWithReason && reason.is_empty() {
            return Err(ValidationError::MissingReason.into());
        }

        self.ensure_network(&ctx, events).await?;
        let write = match path {
            CancelPath::Refund => self.ledger.write_refund_bounty(bounty_id).await,
            _ => self.ledger.write_cancel_bounty(bounty_id, &reason).await,
        };
        let pending = self.submitted(events, write)?;
        self.confirm(events, pending).await?;
        info!("bounty {bounty_id} closed via {path:?}");

        // the ledger is authoritative from here, the mirror is best-effort
        let warning = match self
            .store
            .update_opportunity(opportunity_id, OpportunityPatch::status(status))
            .await
        {
            Ok(_) => {
                events.emit(LifecycleEvent::Reconciled {
                    opportunity_id: opportunity_id.to_owned(),
                });
                None
            },
            Err(e) => {
                error!("bounty {bounty_id} closed by {:?} but status not saved: {e}", pending.tx_hash);
                let message = format!(
                    "on-chain action succeeded; local record not saved (transaction {:?})",
                    pending.tx_hash
                );
                events.warn(message.clone());
                Some(message)
            },
        };

        Ok(CancelOutcome {
            path,
            tx_hash: Some(pending.tx_hash),
            status,
            warning,
        })
    }

    /// Re-derive an opportunity's status from a fresh ledger read, repairing a
    /// stale mirror on the way
    pub async fn refresh_status(&self, opportunity_id: &str) -> Result<StatusView, WorkflowError> {
        let opportunity = self.load_opportunity(opportunity_id).await?;
        let Some(bounty_id) = opportunity.contract_bounty_id else {
            return Ok(StatusView {
                opportunity_id: opportunity.id,
                status: opportunity.status,
                bounty: None,
                winners: vec![],
            });
        };

        let (bounty, winners) = futures::try_join!(
            self.ledger.read_bounty(bounty_id),
            self.ledger.read_winners(bounty_id)
        )?;

        let status = derive_status(&bounty, &winners);

        if status != opportunity.status {
            info!("{opportunity_id} was {:?}, ledger says {status:?}", opportunity.status);
            if let Err(e) = self
                .store
                .update_opportunity(opportunity_id, OpportunityPatch::status(status))
                .await
            {
                warn!("could not repair status of {opportunity_id}: {e}");
            }
        }

        Ok(StatusView {
            opportunity_id: opportunity.id,
            status,
            bounty: Some(bounty),
            winners,
        })
    }
}
