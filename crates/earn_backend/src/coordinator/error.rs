use earn_contract::{LedgerError, H256};
use thiserror::Error;

use super::Stage;
use crate::db::StoreError;

/// Local rejections raised before anything is written to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("stake amount must be greater than zero")]
    ZeroStake,

    #[error("deadline {deadline} is not in the future (now {now})")]
    DeadlineNotInFuture { deadline: u64, now: u64 },

    #[error("unknown category {0}")]
    UnknownCategory(String),

    #[error("missing required links: {}", .0.join(", "))]
    MissingLinks(Vec<String>),

    #[error("at least one winner must be selected")]
    NoWinners,

    #[error("at most 3 winners can be selected, got {0}")]
    TooManyWinners(usize),

    #[error("rank {0} is outside 1..=3")]
    RankOutOfRange(u8),

    #[error("rank {0} assigned more than once")]
    DuplicateRank(u8),

    #[error("submission {0} selected more than once")]
    DuplicateSubmission(u64),

    #[error("submission {0} has a zero prize share")]
    ZeroShare(u64),

    #[error("prize shares must sum to exactly 100, got {0}")]
    ShareSum(u64),

    #[error("submission {0} does not exist")]
    UnknownSubmission(u64),

    #[error("submission {0} is already a winner")]
    AlreadyWinner(u64),

    #[error("a cancellation reason is required once work has been submitted")]
    MissingReason,

    #[error("opportunity {0} not found")]
    OpportunityNotFound(String),

    #[error("opportunity {0} is not linked to an on-chain bounty")]
    NotLinked(String),

    #[error("opportunity {0} is already closed")]
    AlreadyClosed(String),

    #[error("opportunity {0} has an unconfirmed creation; reconcile it first")]
    PendingReconciliation(String),

    #[error("bounty {0} is already linked to an opportunity")]
    AlreadyLinked(u64),

    #[error("only the bounty creator can do this")]
    NotCreator,

    #[error("bounty {0} is closed")]
    BountyClosed(u64),

    #[error("the deadline of bounty {0} has passed")]
    DeadlinePassed(u64),

    #[error("bounty {0} can only be cancelled after its deadline")]
    DeadlineNotPassed(u64),

    #[error("work was already submitted to bounty {0} from this address")]
    AlreadySubmitted(u64),

    #[error("winners were already selected for bounty {0}")]
    WinnersAlreadySelected(u64),

    #[error("no creation transaction is recorded for opportunity {0}")]
    NothingToReconcile(String),

    #[error("bounty id could not be recovered from transaction {0:?}")]
    BountyIdUnrecoverable(H256),
}

#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("wallet is on chain {actual}, switch to chain {expected} was refused")]
    NetworkSwitchRefused { expected: u64, actual: u64 },

    /// Wallet refusal or contract revert; no funds moved
    #[error("transaction rejected: {reason}")]
    Rejected {
        reason: String,
        tx_hash: Option<H256>,
    },

    /// The transaction may have been mined. Never retry without checking it
    #[error("could not confirm transaction {tx_hash:?} ({reason}); verify it manually before retrying")]
    OutcomeUnknown { tx_hash: H256, reason: String },

    #[error("ledger read failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("record store failed: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn stage(&self) -> Stage {
        match self {
            WorkflowError::Validation(_) => Stage::Validation,
            WorkflowError::NetworkSwitchRefused { .. } => Stage::NetworkSwitch,
            WorkflowError::Rejected { tx_hash: None, .. } => Stage::Submission,
            WorkflowError::Rejected { .. } | WorkflowError::OutcomeUnknown { .. } => {
                Stage::Confirmation
            },
            WorkflowError::Ledger(_) | WorkflowError::Store(_) => Stage::Lookup,
        }
    }

    /// Hash of the transaction the failure concerns, when one was sent
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            WorkflowError::Rejected { tx_hash, .. } => *tx_hash,
            WorkflowError::OutcomeUnknown { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    /// Turn a failed write or confirmation into the caller-facing error,
    /// keeping the ledger's reason verbatim
    pub(crate) fn from_write(e: LedgerError, tx_hash: Option<H256>) -> WorkflowError {
        match e {
            LedgerError::ConfirmationTimeout { tx_hash } => WorkflowError::OutcomeUnknown {
                tx_hash,
                reason: "timed out waiting for the receipt".into(),
            },
            LedgerError::ReceiptUnavailable { tx_hash, reason } => {
                WorkflowError::OutcomeUnknown { tx_hash, reason }
            },
            LedgerError::Reverted(reason) | LedgerError::Rejected(reason) => {
                WorkflowError::Rejected { reason, tx_hash }
            },
            other => WorkflowError::Rejected {
                reason: other.to_string(),
                tx_hash,
            },
        }
    }
}
