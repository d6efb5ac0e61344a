use std::collections::HashSet;

use earn_contract::{Ledger, WinnerRecord, H256, U256};
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{CallContext, Coordinator, EventSink, ValidationError, WorkflowError};
use crate::{db::RecordStore, submissions::SubmissionView};

const MAX_WINNERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerSelection {
    pub submission_id: u64,
    /// 1 is first place
    pub rank: u8,
    /// Whole-percent share of the stake
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WinnersOutcome {
    pub bounty_id: u64,
    pub tx_hash: H256,
    pub prize_amounts: Vec<U256>,
    /// Fresh view after confirmation, empty if the refresh failed
    pub submissions: Vec<SubmissionView>,
    pub winners: Vec<WinnerRecord>,
    pub warning: Option<String>,
}

/// Checks that need neither the ledger nor the store
pub fn validate_selections(selections: &[WinnerSelection]) -> Result<(), ValidationError> {
    if selections.is_empty() {
        return Err(ValidationError::NoWinners);
    }
    if selections.len() > MAX_WINNERS {
        return Err(ValidationError::TooManyWinners(selections.len()));
    }

    let mut ranks = HashSet::new();
    let mut ids = HashSet::new();
    for selection in selections {
        if !(1..=MAX_WINNERS as u8).contains(&selection.rank) {
            return Err(ValidationError::RankOutOfRange(selection.rank));
        }
        if !ranks.insert(selection.rank) {
            return Err(ValidationError::DuplicateRank(selection.rank));
        }
        if !ids.insert(selection.submission_id) {
            return Err(ValidationError::DuplicateSubmission(selection.submission_id));
        }
        if selection.percentage == 0 {
            return Err(ValidationError::ZeroShare(selection.submission_id));
        }
    }

    let total: u64 = selections.iter().map(|s| u64::from(s.percentage)).sum();
    if total != 100 {
        return Err(ValidationError::ShareSum(total));
    }
    Ok(())
}

/// `stake * pct / 100` per winner, rounded down. Whatever the rounding leaves
/// over goes to the best-ranked winner so the prizes add up to the stake.
pub fn compute_prizes(stake: U256, selections: &[WinnerSelection]) -> Vec<U256> {
    let mut prizes: Vec<U256> = selections
        .iter()
        .map(|s| stake * U256::from(s.percentage) / U256::from(100))
        .collect();

    let distributed = prizes.iter().fold(U256::zero(), |acc, p| acc + *p);
    let top = selections
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.rank)
        .map(|(i, _)| i);
    if let Some(top) = top {
        prizes[top] += stake.saturating_sub(distributed);
    }
    prizes
}

impl<L: Ledger, S: RecordStore> Coordinator<L, S> {
    /// Pick up to three winners and pay out the escrow in one transaction
    pub async fn select_winners(
        &self,
        ctx: CallContext,
        opportunity_id: &str,
        selections: Vec<WinnerSelection>,
        events: &EventSink,
    ) -> Result<WinnersOutcome, WorkflowError> {
        let res = self.run_select_winners(ctx, opportunity_id, selections, events).await;
        events.finish(res)
    }

    async fn run_select_winners(
        &self,
        ctx: CallContext,
        opportunity_id: &str,
        selections: Vec<WinnerSelection>,
        events: &EventSink,
    ) -> Result<WinnersOutcome, WorkflowError> {
        validate_selections(&selections)?;

        let opportunity = self.load_opportunity(opportunity_id).await?;
        let bounty_id = Self::linked_bounty(&opportunity)?;

        let bounty = self.ledger.read_bounty(bounty_id).await?;
        if bounty.creator != ctx.caller {
            return Err(ValidationError::NotCreator.into());
        }
        if bounty.is_closed {
            return Err(ValidationError::BountyClosed(bounty_id).into());
        }

        let count = self.ledger.read_submission_count(bounty_id).await?;
        if let Some(unknown) = selections.iter().find(|s| s.submission_id >= count) {
            return Err(ValidationError::UnknownSubmission(unknown.submission_id).into());
        }
        let selected = join_all(
            selections
                .iter()
                .map(|s| self.ledger.read_submission(bounty_id, s.submission_id)),
        )
        .await;
        for submission in selected {
            let submission = submission?;
            if submission.is_winner {
                return Err(ValidationError::AlreadyWinner(submission.index).into());
            }
        }

        let prize_amounts = compute_prizes(bounty.stake_amount, &selections);
        let submission_ids = selections.iter().map(|s| s.submission_id).collect();
        let ranks = selections.iter().map(|s| s.rank).collect();

        self.ensure_network(&ctx, events).await?;
        let pending = self.submitted(
            events,
            self.ledger
                .write_select_winners(bounty_id, submission_ids, ranks, prize_amounts.clone())
                .await,
        )?;
        self.confirm(events, pending).await?;
        info!("winners selected for bounty {bounty_id}: {prize_amounts:?}");

        // winner state lives on-chain, so refreshing is a re-read
        let (submissions, winners) = futures::join!(
            self.submissions.fetch(bounty_id),
            self.ledger.read_winners(bounty_id)
        );
        let mut warning = None;
        let submissions = submissions.unwrap_or_else(|e| {
            warn!("refresh of submissions for bounty {bounty_id} failed: {e}");
            warning = Some(format!("winners selected; could not refresh submissions: {e}"));
            vec![]
        });
        let winners = winners.unwrap_or_else(|e| {
            warn!("refresh of winners for bounty {bounty_id} failed: {e}");
            warning = Some(format!("winners selected; could not refresh winners: {e}"));
            vec![]
        });
        if let Some(message) = &warning {
            events.warn(message.clone());
        }

        Ok(WinnersOutcome {
            bounty_id,
            tx_hash: pending.tx_hash,
            prize_amounts,
            submissions,
            winners,
            warning,
        })
    }
}
