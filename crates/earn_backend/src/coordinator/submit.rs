use earn_contract::{Ledger, SubmissionLinks, H256};
use log::info;
use serde::Serialize;

use super::{CallContext, Coordinator, EventSink, ValidationError, WorkflowError};
use crate::db::RecordStore;

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub bounty_id: u64,
    pub tx_hash: H256,
}

impl<L: Ledger, S: RecordStore> Coordinator<L, S> {
    /// Submit work to a linked bounty. Submissions only live on-chain.
    pub async fn submit_work(
        &self,
        ctx: CallContext,
        opportunity_id: &str,
        links: SubmissionLinks,
        events: &EventSink,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let res = self.run_submit(ctx, opportunity_id, links, events).await;
        events.finish(res)
    }

    async fn run_submit(
        &self,
        ctx: CallContext,
        opportunity_id: &str,
        links: SubmissionLinks,
        events: &EventSink,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let missing = links.missing_required();
        if !missing.is_empty() {
            return Err(ValidationError::MissingLinks(
                missing.into_iter().map(String::from).collect(),
            )
            .into());
        }

        let opportunity = self.load_opportunity(opportunity_id).await?;
        let bounty_id = Self::linked_bounty(&opportunity)?;

        let bounty = self.ledger.read_bounty(bounty_id).await?;
        if bounty.is_closed {
            return Err(ValidationError::BountyClosed(bounty_id).into());
        }
        if bounty.deadline_passed(ctx.now) {
            return Err(ValidationError::DeadlinePassed(bounty_id).into());
        }
        if self.ledger.read_has_submitted(bounty_id, ctx.caller).await? {
            return Err(ValidationError::AlreadySubmitted(bounty_id).into());
        }

        self.ensure_network(&ctx, events).await?;
        let pending = self.submitted(events, self.ledger.write_submit_work(bounty_id, &links).await)?;
        self.confirm(events, pending).await?;

        info!("{:?} submitted work to bounty {bounty_id}", ctx.caller);
        Ok(SubmitOutcome {
            bounty_id,
            tx_hash: pending.tx_hash,
        })
    }
}
