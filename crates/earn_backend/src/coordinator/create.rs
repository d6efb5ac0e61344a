use earn_contract::{extract_bounty_id, Category, Ledger, H256, U256};
use log::{error, info, warn};
use serde::Serialize;

use super::{CallContext, Coordinator, EventSink, LifecycleEvent, ValidationError, WorkflowError};
use crate::{
    db::RecordStore,
    models::{NewOpportunity, Opportunity, OpportunityDraft, OpportunityPatch, OpportunityStatus},
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CreateOutcome {
    /// Escrowed on-chain and mirrored with its bounty id
    Linked { opportunity: Opportunity },
    /// Mirrored, but the bounty id is not known yet and needs reconciling
    Unreconciled {
        opportunity: Opportunity,
        reason: String,
    },
    /// Funds are escrowed but the local record was not saved. Retry the save,
    /// never the chain write.
    RecordNotSaved {
        bounty_id: Option<u64>,
        tx_hash: H256,
        draft: OpportunityDraft,
        error: String,
    },
}

impl CreateOutcome {
    /// Completed, but the caller has something to follow up on
    pub fn is_warning(&self) -> bool {
        !matches!(self, CreateOutcome::Linked { .. })
    }
}

/// Local checks for a draft, returning the parsed category
fn validate_draft(draft: &OpportunityDraft, now: u64) -> Result<Category, ValidationError> {
    if draft.title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if draft.stake_amount == U256::zero() {
        return Err(ValidationError::ZeroStake);
    }
    if draft.deadline <= now {
        return Err(ValidationError::DeadlineNotInFuture {
            deadline: draft.deadline,
            now,
        });
    }
    draft
        .category
        .parse::<Category>()
        .map_err(|_| ValidationError::UnknownCategory(draft.category.clone()))
}

impl<L: Ledger, S: RecordStore> Coordinator<L, S> {
    /// Escrow the stake on-chain and mirror the new bounty off-chain
    pub async fn create_and_link(
        &self,
        ctx: CallContext,
        draft: OpportunityDraft,
        events: &EventSink,
    ) -> Result<CreateOutcome, WorkflowError> {
        let res = self.run_create(ctx, draft, events).await;
        events.finish(res)
    }

    async fn run_create(
        &self,
        ctx: CallContext,
        draft: OpportunityDraft,
        events: &EventSink,
    ) -> Result<CreateOutcome, WorkflowError> {
        let category = validate_draft(&draft, ctx.now)?;
        self.ensure_network(&ctx, events).await?;

        let pending = self.submitted(
            events,
            self.ledger
                .write_create_bounty(&draft.description, draft.deadline, category, draft.stake_amount)
                .await,
        )?;
        let tx_hash = pending.tx_hash;

        let (bounty_id, unresolved) = match self.confirm(events, pending).await {
            Ok(confirmation) => {
                let source = extract_bounty_id(&confirmation.receipt, self.ledger.contract_address());
                info!("createBounty {tx_hash:?} confirmed, bounty id from {source:?}");
                match source.bounty_id() {
                    Some(id) => (Some(id), None),
                    None => (None, Some("bounty id missing from the creation receipt".to_owned())),
                }
            },
            // keep the hash on record so the creation can be reconciled
            // instead of being re-sent
            Err(WorkflowError::OutcomeUnknown { reason, .. }) => (None, Some(reason)),
            Err(e) => return Err(e),
        };

        let fields = NewOpportunity::from_draft(&draft, category, ctx.caller, bounty_id, Some(tx_hash));
        let opportunity = match self.store.create_opportunity(fields).await {
            Ok(opportunity) => opportunity,
            Err(e) => {
                error!("bounty {bounty_id:?} escrowed by {tx_hash:?} but not saved: {e}");
                events.warn(format!(
                    "on-chain action succeeded; local record not saved. Contact support with transaction {tx_hash:?}"
                ));
                return Ok(CreateOutcome::RecordNotSaved {
                    bounty_id,
                    tx_hash,
                    draft,
                    error: e.to_string(),
                });
            },
        };

        match unresolved {
            None => {
                events.emit(LifecycleEvent::Reconciled {
                    opportunity_id: opportunity.id.clone(),
                });
                Ok(CreateOutcome::Linked { opportunity })
            },
            Some(reason) => {
                warn!("opportunity {} saved without bounty id: {reason}", opportunity.id);
                events.warn(format!(
                    "could not confirm the bounty id ({reason}); verify transaction {tx_hash:?} before retrying"
                ));
                Ok(CreateOutcome::Unreconciled {
                    opportunity,
                    reason,
                })
            },
        }
    }

    /// Save the record for an already-escrowed bounty. Never writes to the ledger.
    pub async fn retry_save(
        &self,
        ctx: CallContext,
        draft: OpportunityDraft,
        bounty_id: Option<u64>,
        tx_hash: H256,
        events: &EventSink,
    ) -> Result<Opportunity, WorkflowError> {
        let res = self.run_retry_save(ctx, draft, bounty_id, tx_hash, events).await;
        events.finish(res)
    }

    async fn run_retry_save(
        &self,
        ctx: CallContext,
        draft: OpportunityDraft,
        bounty_id: Option<u64>,
        tx_hash: H256,
        events: &EventSink,
    ) -> Result<Opportunity, WorkflowError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }
        let category = draft
            .category
            .parse::<Category>()
            .map_err(|_| ValidationError::UnknownCategory(draft.category.clone()))?;

        let bounty_id = match bounty_id {
            Some(id) => Some(id),
            None => match self.ledger.read_receipt(tx_hash).await? {
                Some(receipt) => extract_bounty_id(&receipt, self.ledger.contract_address()).bounty_id(),
                None => None,
            },
        };

        if let Some(id) = bounty_id {
            // a linked id must point at a real bounty
            let bounty = self.ledger.read_bounty(id).await?;
            if bounty.creator != ctx.caller {
                return Err(ValidationError::NotCreator.into());
            }
            if !self.store.list_opportunities_by_bounty_ids(&[id]).await?.is_empty() {
                return Err(ValidationError::AlreadyLinked(id).into());
            }
        }

        let fields = NewOpportunity::from_draft(&draft, category, ctx.caller, bounty_id, Some(tx_hash));
        let opportunity = self.store.create_opportunity(fields).await?;
        events.emit(LifecycleEvent::Reconciled {
            opportunity_id: opportunity.id.clone(),
        });
        Ok(opportunity)
    }

    /// Recover the bounty id of a creation whose confirmation was never observed
    pub async fn reconcile_link(
        &self,
        opportunity_id: &str,
        events: &EventSink,
    ) -> Result<Opportunity, WorkflowError> {
        let res = self.run_reconcile_link(opportunity_id, events).await;
        events.finish(res)
    }

    async fn run_reconcile_link(
        &self,
        opportunity_id: &str,
        events: &EventSink,
    ) -> Result<Opportunity, WorkflowError> {
        let opportunity = self.load_opportunity(opportunity_id).await?;
        if opportunity.is_linked() && !opportunity.needs_reconciliation {
            return Ok(opportunity);
        }
        let tx_hash = opportunity
            .transaction_hash
            .ok_or_else(|| ValidationError::NothingToReconcile(opportunity_id.to_owned()))?;

        let receipt = self
            .ledger
            .read_receipt(tx_hash)
            .await?
            .ok_or_else(|| WorkflowError::OutcomeUnknown {
                tx_hash,
                reason: "no receipt yet".into(),
            })?;

        let patch = if receipt.status.map(|s| s.as_u64()) == Some(1) {
            let id = extract_bounty_id(&receipt, self.ledger.contract_address())
                .bounty_id()
                .ok_or(ValidationError::BountyIdUnrecoverable(tx_hash))?;
            self.ledger.read_bounty(id).await?;
            OpportunityPatch {
                contract_bounty_id: Some(id),
                needs_reconciliation: Some(false),
                ..Default::default()
            }
        } else {
            // the creation reverted, nothing was escrowed
            warn!("creation {tx_hash:?} of {opportunity_id} reverted");
            OpportunityPatch {
                status: Some(OpportunityStatus::Cancelled),
                needs_reconciliation: Some(false),
                ..Default::default()
            }
        };

        let opportunity = self.store.update_opportunity(opportunity_id, patch).await?;
        events.emit(LifecycleEvent::Reconciled {
            opportunity_id: opportunity.id.clone(),
        });
        Ok(opportunity)
    }
}
