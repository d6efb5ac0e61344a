use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ethers::{
    abi::Tokenizable,
    contract::ContractError,
    providers::{Middleware, PendingTransaction},
    types::{Address, TransactionReceipt, H256, U256},
};
use log::{debug, warn};

use crate::{
    abi::EarnBounty,
    ledger::{Confirmation, Ledger, LedgerError, PendingTx},
    types::{to_u64, Bounty, Category, RawSubmission, SubmissionLinks, WinnerRecord},
};

/// [`Ledger`] backed by an ethers middleware stack
pub struct EthersLedger<M> {
    contract: EarnBounty<M>,
    client: Arc<M>,
    confirmations: usize,
    confirmation_timeout: Duration,
}

impl<M: Middleware + 'static> EthersLedger<M> {
    pub fn new(contract: EarnBounty<M>, client: Arc<M>) -> Self {
        EthersLedger {
            contract,
            client,
            confirmations: 1,
            confirmation_timeout: Duration::from_secs(180),
        }
    }

    pub fn with_confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }
}

fn read_error<M: Middleware>(e: ContractError<M>) -> LedgerError {
    match e.decode_revert::<String>() {
        Some(reason) => LedgerError::Reverted(reason),
        None => LedgerError::Transport(e.to_string()),
    }
}

fn write_error<M: Middleware>(e: ContractError<M>) -> LedgerError {
    match e.decode_revert::<String>() {
        Some(reason) => LedgerError::Reverted(reason),
        None => LedgerError::Rejected(e.to_string()),
    }
}

#[async_trait]
impl<M: Middleware + 'static> Ledger for EthersLedger<M> {
    fn contract_address(&self) -> Address {
        self.contract.address()
    }

    async fn switch_network(&self, chain_id: u64) -> Result<bool, LedgerError> {
        // a server-side signer is pinned to its provider's chain
        let current = self
            .client
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        debug!("provider chain {current}, requested {chain_id}");
        Ok(current == U256::from(chain_id))
    }

    async fn read_bounty(&self, id: u64) -> Result<Bounty, LedgerError> {
        let (
            bounty_id,
            creator,
            description,
            stake_amount,
            deadline,
            category,
            is_active,
            is_closed,
            total_submissions,
        ) = self
            .contract
            .get_bounty(U256::from(id))
            .call()
            .await
            .map_err(read_error)?;

        // unknown ids come back zeroed
        if creator == Address::zero() {
            return Err(LedgerError::NotFound(id));
        }

        Ok(Bounty {
            id: to_u64(bounty_id, "id")?,
            creator,
            description,
            stake_amount,
            deadline: to_u64(deadline, "deadline")?,
            category: Category::from_u8(category)
                .ok_or_else(|| LedgerError::Decode(format!("unknown category {category}")))?,
            is_active,
            is_closed,
            total_submissions: to_u64(total_submissions, "totalSubmissions")?,
        })
    }

    async fn read_submission_count(&self, id: u64) -> Result<u64, LedgerError> {
        let count = self
            .contract
            .get_submission_count(U256::from(id))
            .call()
            .await
            .map_err(read_error)?;
        to_u64(count, "submissionCount")
    }

    async fn read_submission_raw(&self, id: u64, index: u64) -> Result<RawSubmission, LedgerError> {
        let tuple = self
            .contract
            .get_submission(U256::from(id), U256::from(index))
            .call()
            .await
            .map_err(read_error)?;
        Ok(RawSubmission::Positional(vec![tuple.into_token()]))
    }

    async fn read_winners(&self, id: u64) -> Result<Vec<WinnerRecord>, LedgerError> {
        let (winners, ranks, prizes) = self
            .contract
            .get_winners(U256::from(id))
            .call()
            .await
            .map_err(read_error)?;

        if winners.len() != ranks.len() || winners.len() != prizes.len() {
            return Err(LedgerError::Decode(format!(
                "getWinners returned mismatched lengths {}/{}/{}",
                winners.len(),
                ranks.len(),
                prizes.len()
            )));
        }

        Ok(winners
            .into_iter()
            .zip(ranks)
            .zip(prizes)
            .map(|((winner, rank), prize_amount)| WinnerRecord {
                winner,
                rank,
                prize_amount,
            })
            .collect())
    }

    async fn read_has_submitted(&self, id: u64, submitter: Address) -> Result<bool, LedgerError> {
        self.contract
            .has_submitted(U256::from(id), submitter)
            .call()
            .await
            .map_err(read_error)
    }

    async fn read_bounty_count_by_category(&self, category: Category) -> Result<u64, LedgerError> {
        let count = self
            .contract
            .get_bounty_count_by_category(category.as_u8())
            .call()
            .await
            .map_err(read_error)?;
        to_u64(count, "bountyCount")
    }

    async fn read_active_bounties_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<u64>, LedgerError> {
        let ids = self
            .contract
            .get_active_bounties_by_category(category.as_u8())
            .call()
            .await
            .map_err(read_error)?;
        ids.into_iter().map(|id| to_u64(id, "bountyId")).collect()
    }

    async fn read_contract_balance(&self) -> Result<U256, LedgerError> {
        self.contract
            .get_contract_balance()
            .call()
            .await
            .map_err(read_error)
    }

    async fn read_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn write_create_bounty(
        &self,
        description: &str,
        deadline: u64,
        category: Category,
        stake: U256,
    ) -> Result<PendingTx, LedgerError> {
        let call = self
            .contract
            .create_bounty(description.to_owned(), U256::from(deadline), category.as_u8())
            .value(stake);
        let pending = call.send().await.map_err(write_error)?;
        debug!("createBounty accepted {:?}", pending.tx_hash());
        Ok(PendingTx {
            tx_hash: pending.tx_hash(),
        })
    }

    async fn write_submit_work(
        &self,
        id: u64,
        links: &SubmissionLinks,
    ) -> Result<PendingTx, LedgerError> {
        let call = self.contract.submit_work(
            U256::from(id),
            links.submission_link.clone(),
            links.tweet_link.clone(),
            links.github_link.clone(),
            links.twitter_link.clone(),
            links.video_link.clone(),
            links.indie_fun_link.clone(),
            links.project_link.clone(),
        );
        let pending = call.send().await.map_err(write_error)?;
        Ok(PendingTx {
            tx_hash: pending.tx_hash(),
        })
    }

    async fn write_select_winners(
        &self,
        id: u64,
        submission_ids: Vec<u64>,
        ranks: Vec<u8>,
        prize_amounts: Vec<U256>,
    ) -> Result<PendingTx, LedgerError> {
        let call = self.contract.select_winners(
            U256::from(id),
            submission_ids.into_iter().map(U256::from).collect(),
            ranks,
            prize_amounts,
        );
        let pending = call.send().await.map_err(write_error)?;
        Ok(PendingTx {
            tx_hash: pending.tx_hash(),
        })
    }

    async fn write_refund_bounty(&self, id: u64) -> Result<PendingTx, LedgerError> {
        let call = self.contract.refund_bounty(U256::from(id));
        let pending = call.send().await.map_err(write_error)?;
        Ok(PendingTx {
            tx_hash: pending.tx_hash(),
        })
    }

    async fn write_cancel_bounty(&self, id: u64, reason: &str) -> Result<PendingTx, LedgerError> {
        let call = self.contract.cancel_bounty(U256::from(id), reason.to_owned());
        let pending = call.send().await.map_err(write_error)?;
        Ok(PendingTx {
            tx_hash: pending.tx_hash(),
        })
    }

    async fn await_confirmation(&self, pending: PendingTx) -> Result<Confirmation, LedgerError> {
        let tx_hash = pending.tx_hash;
        let watcher = PendingTransaction::new(tx_hash, self.client.provider())
            .confirmations(self.confirmations);

        match tokio::time::timeout(self.confirmation_timeout, watcher).await {
            Err(_) => {
                warn!("no receipt for {tx_hash:?} after {:?}", self.confirmation_timeout);
                Err(LedgerError::ConfirmationTimeout { tx_hash })
            },
            Ok(Err(e)) => Err(LedgerError::ReceiptUnavailable {
                tx_hash,
                reason: e.to_string(),
            }),
            Ok(Ok(None)) => Err(LedgerError::ReceiptUnavailable {
                tx_hash,
                reason: "transaction dropped from the pool".into(),
            }),
            Ok(Ok(Some(receipt))) => Ok(Confirmation::from_receipt(receipt)),
        }
    }
}
