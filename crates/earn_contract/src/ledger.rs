use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, H256, U256};
use serde::Serialize;
use thiserror::Error;

use crate::types::{Bounty, Category, RawSubmission, Submission, SubmissionLinks, WinnerRecord};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("bounty {0} not found")]
    NotFound(u64),

    /// The contract reverted; carries the revert reason verbatim
    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// The signer or node refused the transaction before it reached the pool
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("gave up waiting for {tx_hash:?} to be mined")]
    ConfirmationTimeout { tx_hash: H256 },

    #[error("could not fetch receipt for {tx_hash:?}: {reason}")]
    ReceiptUnavailable { tx_hash: H256, reason: String },

    #[error("failed to decode ledger response: {0}")]
    Decode(String),

    #[error("node error: {0}")]
    Transport(String),
}

impl LedgerError {
    /// The transaction may have been mined, we just couldn't observe it
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(
            self,
            LedgerError::ConfirmationTimeout { .. } | LedgerError::ReceiptUnavailable { .. }
        )
    }
}

/// Handle to a transaction accepted into the pending pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingTx {
    pub tx_hash: H256,
}

#[derive(Debug, Clone)]
pub struct Confirmation {
    pub receipt: TransactionReceipt,
    pub success: bool,
}

impl Confirmation {
    pub fn from_receipt(receipt: TransactionReceipt) -> Self {
        let success = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
        Confirmation { receipt, success }
    }
}

/// Read and write surface of the escrow contract.
///
/// Writes return as soon as the node accepts the transaction and are never
/// retried here; [`Ledger::await_confirmation`] blocks until the transaction is
/// mined or a terminal error occurs.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Address of the escrow contract, used to pick its logs out of receipts
    fn contract_address(&self) -> Address;

    /// Ask the wallet to move to `chain_id`. `false` means the switch was refused
    async fn switch_network(&self, chain_id: u64) -> Result<bool, LedgerError>;

    async fn read_bounty(&self, id: u64) -> Result<Bounty, LedgerError>;

    async fn read_submission_count(&self, id: u64) -> Result<u64, LedgerError>;

    /// Submission exactly as the node returned it; callers want [`Ledger::read_submission`]
    async fn read_submission_raw(&self, id: u64, index: u64) -> Result<RawSubmission, LedgerError>;

    async fn read_submission(&self, id: u64, index: u64) -> Result<Submission, LedgerError> {
        self.read_submission_raw(id, index).await?.normalize(index)
    }

    async fn read_winners(&self, id: u64) -> Result<Vec<WinnerRecord>, LedgerError>;

    async fn read_has_submitted(&self, id: u64, submitter: Address) -> Result<bool, LedgerError>;

    async fn read_bounty_count_by_category(&self, category: Category) -> Result<u64, LedgerError>;

    async fn read_active_bounties_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<u64>, LedgerError>;

    async fn read_contract_balance(&self) -> Result<U256, LedgerError>;

    async fn read_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, LedgerError>;

    async fn write_create_bounty(
        &self,
        description: &str,
        deadline: u64,
        category: Category,
        stake: U256,
    ) -> Result<PendingTx, LedgerError>;

    async fn write_submit_work(
        &self,
        id: u64,
        links: &SubmissionLinks,
    ) -> Result<PendingTx, LedgerError>;

    async fn write_select_winners(
        &self,
        id: u64,
        submission_ids: Vec<u64>,
        ranks: Vec<u8>,
        prize_amounts: Vec<U256>,
    ) -> Result<PendingTx, LedgerError>;

    async fn write_refund_bounty(&self, id: u64) -> Result<PendingTx, LedgerError>;

    async fn write_cancel_bounty(&self, id: u64, reason: &str) -> Result<PendingTx, LedgerError>;

    async fn await_confirmation(&self, pending: PendingTx) -> Result<Confirmation, LedgerError>;
}
