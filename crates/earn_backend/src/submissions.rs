//! Read side of a bounty's submissions joined with submitter profiles

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use earn_contract::{Ledger, LedgerError, Submission, H160};
use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;

use crate::{db::RecordStore, models::UserProfile};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SubmitterProfile {
    Known(UserProfile),
    /// Lookup failed or the wallet has no profile
    Unknown,
}

impl SubmitterProfile {
    pub fn display_name(&self) -> &str {
        match self {
            SubmitterProfile::Known(profile) => &profile.username,
            SubmitterProfile::Unknown => "Unknown user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionView {
    pub submission: Submission,
    pub submitter: SubmitterProfile,
    /// Name to show for the submitter, "Unknown user" without a profile
    pub submitter_name: String,
}

pub struct SubmissionAggregator<L, S> {
    ledger: Arc<L>,
    store: Arc<S>,
}

impl<L: Ledger, S: RecordStore> SubmissionAggregator<L, S> {
    pub fn new(ledger: Arc<L>, store: Arc<S>) -> Self {
        SubmissionAggregator { ledger, store }
    }

    /// All submissions of a bounty in submission order.
    ///
    /// Individual reads are issued together; one that fails is left out and
    /// not retried. Only a failed count read fails the whole call.
    pub async fn fetch(&self, bounty_id: u64) -> Result<Vec<SubmissionView>, LedgerError> {
        let count = self.ledger.read_submission_count(bounty_id).await?;
        debug!("bounty {bounty_id} has {count} submissions");

        let reads = join_all((0..count).map(|i| self.ledger.read_submission(bounty_id, i))).await;
        let submissions: Vec<Submission> = reads
            .into_iter()
            .enumerate()
            .filter_map(|(i, res)| match res {
                Ok(submission) => Some(submission),
                Err(e) => {
                    warn!("dropping submission {i} of bounty {bounty_id}: {e}");
                    None
                },
            })
            .collect();

        let profiles = self.resolve_profiles(&submissions).await;

        Ok(submissions
            .into_iter()
            .map(|submission| {
                let submitter = profiles
                    .get(&submission.submitter)
                    .cloned()
                    .unwrap_or(SubmitterProfile::Unknown);
                SubmissionView {
                    submitter_name: submitter.display_name().to_owned(),
                    submission,
                    submitter,
                }
            })
            .collect())
    }

    async fn resolve_profiles(&self, submissions: &[Submission]) -> HashMap<H160, SubmitterProfile> {
        let wallets: BTreeSet<H160> = submissions.iter().map(|s| s.submitter).collect();

        let lookups = join_all(wallets.into_iter().map(|wallet| async move {
            let profile = match self.store.get_user_by_wallet(wallet).await {
                Ok(Some(user)) => SubmitterProfile::Known(user),
                Ok(None) => SubmitterProfile::Unknown,
                Err(e) => {
                    warn!("profile lookup for {wallet:?} failed: {e}");
                    SubmitterProfile::Unknown
                },
            };
            (wallet, profile)
        }))
        .await;

        lookups.into_iter().collect()
    }
}
