//! Test doubles: a ledger that enforces the escrow contract's rules in memory
//! and a record store backed by a vec

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use earn_contract::{
    Bounty, BountyCreatedFilter, Category, Confirmation, Ledger, LedgerError, PendingTx,
    RawSubmission, Submission, SubmissionLinks, TransactionReceipt, WinnerRecord, H160, H256, U256,
};
use ethers::{
    abi::{encode, Token},
    contract::EthEvent,
    types::{Log, U64},
};
use log::LevelFilter;
use serde_json::json;

use crate::{
    coordinator::{CallContext, Coordinator, CreateOutcome, EventSink},
    db::{RecordStore, StoreError},
    models::{NewOpportunity, Opportunity, OpportunityDraft, OpportunityPatch, UserProfile},
};

pub const CHAIN_ID: u64 = 8453;
pub const NOW: u64 = 1_750_000_000;
const WEEK: u64 = 7 * 24 * 60 * 60;

pub const CREATOR: H160 = H160([0xc1; 20]);
pub const ALICE: H160 = H160([0xa1; 20]);
pub const BOB: H160 = H160([0xb0; 20]);
const CONTRACT: H160 = H160([0xee; 20]);

fn init() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Info)
        .is_test(true)
        .try_init();
}

pub fn harness() -> (
    Arc<MockLedger>,
    Arc<MemoryStore>,
    Coordinator<MockLedger, MemoryStore>,
) {
    init();
    let ledger = Arc::new(MockLedger::new());
    let store = Arc::new(MemoryStore::default());
    let coordinator = Coordinator::new(ledger.clone(), store.clone(), CHAIN_ID);
    (ledger, store, coordinator)
}

pub fn ctx(caller: H160) -> CallContext {
    CallContext {
        chain_id: CHAIN_ID,
        caller,
        now: NOW,
    }
}

pub fn draft(stake: u64, category: &str) -> OpportunityDraft {
    OpportunityDraft {
        title: "Build a landing page".into(),
        description: "Responsive landing page for the launch".into(),
        tags: vec!["web".into()],
        skills: vec!["react".into()],
        contact: Some("@sponsor".into()),
        stake_amount: U256::from(stake),
        deadline: NOW + WEEK,
        category: category.into(),
    }
}

pub fn links(name: &str) -> SubmissionLinks {
    SubmissionLinks {
        submission_link: format!("https://{name}.dev/work"),
        tweet_link: format!("https://x.com/{name}/status/1"),
        github_link: format!("https://github.com/{name}/work"),
        twitter_link: format!("https://x.com/{name}"),
        video_link: format!("https://youtu.be/{name}"),
        indie_fun_link: format!("https://indie.fun/{name}"),
        project_link: format!("https://{name}.dev"),
    }
}

/// Escrow a Development bounty through the coordinator
pub async fn linked_opportunity(
    coordinator: &Coordinator<MockLedger, MemoryStore>,
    stake: u64,
) -> Opportunity {
    match coordinator
        .create_and_link(ctx(CREATOR), draft(stake, "Development"), &EventSink::none())
        .await
        .unwrap()
    {
        CreateOutcome::Linked { opportunity } => opportunity,
        other => panic!("expected a linked opportunity, got {other:?}"),
    }
}

/// An opportunity that only exists off-chain
pub async fn unlinked_opportunity(store: &MemoryStore, creator: H160) -> Opportunity {
    let category = Category::Design;
    let fields = NewOpportunity::from_draft(&draft(100, "Design"), category, creator, None, None);
    store.create_opportunity(fields).await.unwrap()
}

/// A bounty with one submission per address, created behind the coordinator's back
pub fn seeded_bounty(ledger: &MockLedger, submitters: &[H160]) -> u64 {
    let id = ledger.seed_bounty(Category::Development, 1000);
    for (i, who) in submitters.iter().enumerate() {
        ledger.seed_submission(id, *who, &links(&format!("user{i}")));
    }
    id
}

struct MockBounty {
    bounty: Bounty,
    submissions: Vec<Submission>,
    winners: Vec<WinnerRecord>,
    cancel_reason: Option<String>,
}

#[derive(Default)]
struct ChainState {
    bounties: Vec<MockBounty>,
    receipts: HashMap<H256, TransactionReceipt>,
    calls: Vec<&'static str>,
    writes: usize,
    next_tx: u64,
    sender: H160,
    now: u64,

    time_out_confirmations: bool,
    refuse_switch: bool,
    undecodable_logs: bool,
    revert_creations: bool,
    hide_submissions: bool,
    alternate_shapes: bool,
    named_next: bool,
    served_positional: bool,
    served_named: bool,
    failing_index: Option<u64>,
}

impl ChainState {
    fn bounty(&mut self, id: u64) -> Result<&mut MockBounty, LedgerError> {
        id.checked_sub(1)
            .and_then(|i| self.bounties.get_mut(i as usize))
            .ok_or(LedgerError::NotFound(id))
    }

    fn insert_bounty(&mut self, creator: H160, stake: U256, deadline: u64, category: Category) -> u64 {
        let id = self.bounties.len() as u64 + 1;
        self.bounties.push(MockBounty {
            bounty: Bounty {
                id,
                creator,
                description: String::new(),
                stake_amount: stake,
                deadline,
                category,
                is_active: true,
                is_closed: false,
                total_submissions: 0,
            },
            submissions: vec![],
            winners: vec![],
            cancel_reason: None,
        });
        id
    }

    /// Record a mined transaction and hand out its hash
    fn mine(&mut self, logs: Vec<Log>) -> PendingTx {
        self.mine_with_status(logs, 1)
    }

    fn mine_with_status(&mut self, logs: Vec<Log>, status: u64) -> PendingTx {
        self.writes += 1;
        self.next_tx += 1;
        let tx_hash = H256::from_low_u64_be(self.next_tx);
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            status: Some(U64::from(status)),
            block_number: Some(U64::from(100 + self.next_tx)),
            logs,
            ..Default::default()
        };
        self.receipts.insert(tx_hash, receipt);
        PendingTx { tx_hash }
    }
}

fn revert(reason: &str) -> LedgerError {
    LedgerError::Reverted(reason.to_owned())
}

fn positional(s: &Submission) -> RawSubmission {
    let l = &s.links;
    RawSubmission::Positional(vec![
        Token::Uint(s.bounty_id.into()),
        Token::Address(s.submitter),
        Token::String(l.submission_link.clone()),
        Token::String(l.tweet_link.clone()),
        Token::String(l.github_link.clone()),
        Token::String(l.twitter_link.clone()),
        Token::String(l.video_link.clone()),
        Token::String(l.indie_fun_link.clone()),
        Token::String(l.project_link.clone()),
        Token::Uint(s.submission_time.into()),
        Token::Bool(s.is_winner),
        Token::Uint(s.rank.into()),
    ])
}

fn named(s: &Submission) -> RawSubmission {
    let l = &s.links;
    RawSubmission::Named(json!({
        "bountyId": s.bounty_id.to_string(),
        "submitter": s.submitter,
        "submissionLink": l.submission_link,
        "tweetLink": l.tweet_link,
        "githubLink": l.github_link,
        "twitterLink": l.twitter_link,
        "videoLink": l.video_link,
        "indieFunLink": l.indie_fun_link,
        "projectLink": l.project_link,
        "submissionTime": format!("{:#x}", s.submission_time),
        "isWinner": s.is_winner,
        "rank": s.rank,
    }))
}

pub struct MockLedger {
    state: Mutex<ChainState>,
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger {
            state: Mutex::new(ChainState {
                sender: CREATOR,
                now: NOW,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn bounty(&self, id: u64) -> Bounty {
        self.state().bounty(id).unwrap().bounty.clone()
    }

    pub fn cancel_reason(&self, id: u64) -> Option<String> {
        self.state().bounty(id).unwrap().cancel_reason.clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> usize {
        self.state().writes
    }

    pub fn set_sender(&self, sender: H160) {
        self.state().sender = sender;
    }

    pub fn set_now(&self, now: u64) {
        self.state().now = now;
    }

    pub fn time_out_confirmations(&self, on: bool) {
        self.state().time_out_confirmations = on;
    }

    pub fn refuse_network_switch(&self, on: bool) {
        self.state().refuse_switch = on;
    }

    pub fn emit_undecodable_creation_logs(&self, on: bool) {
        self.state().undecodable_logs = on;
    }

    /// Accept `createBounty` into the pool but mine it as reverted
    pub fn revert_creations(&self, on: bool) {
        self.state().revert_creations = on;
    }

    /// Make `hasSubmitted` always answer false so only the write catches duplicates
    pub fn hide_submissions_from_lookup(&self, on: bool) {
        self.state().hide_submissions = on;
    }

    /// Flip between positional and named responses on every listing
    pub fn alternate_shapes(&self, on: bool) {
        self.state().alternate_shapes = on;
    }

    pub fn served_both_shapes(&self) -> bool {
        let state = self.state();
        state.served_positional && state.served_named
    }

    pub fn fail_submission_read(&self, index: u64) {
        self.state().failing_index = Some(index);
    }

    pub fn reopen(&self, id: u64) {
        let mut state = self.state();
        let entry = state.bounty(id).unwrap();
        entry.bounty.is_closed = false;
        entry.bounty.is_active = true;
    }

    pub fn seed_bounty(&self, category: Category, stake: u64) -> u64 {
        self.state()
            .insert_bounty(CREATOR, stake.into(), NOW + WEEK, category)
    }

    pub fn seed_submission(&self, id: u64, submitter: H160, links: &SubmissionLinks) {
        let mut state = self.state();
        let now = state.now;
        let entry = state.bounty(id).unwrap();
        entry.submissions.push(Submission {
            bounty_id: id,
            index: entry.submissions.len() as u64,
            submitter,
            links: links.clone(),
            submission_time: now,
            is_winner: false,
            rank: 0,
        });
        entry.bounty.total_submissions += 1;
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn contract_address(&self) -> H160 {
        CONTRACT
    }

    async fn switch_network(&self, _chain_id: u64) -> Result<bool, LedgerError> {
        let mut state = self.state();
        state.calls.push("switchNetwork");
        Ok(!state.refuse_switch)
    }

    async fn read_bounty(&self, id: u64) -> Result<Bounty, LedgerError> {
        let mut state = self.state();
        state.calls.push("getBounty");
        Ok(state.bounty(id)?.bounty.clone())
    }

    async fn read_submission_count(&self, id: u64) -> Result<u64, LedgerError> {
        let mut state = self.state();
        state.calls.push("getSubmissionCount");
        if state.alternate_shapes {
            state.named_next = !state.named_next;
        }
        Ok(state.bounty(id)?.submissions.len() as u64)
    }

    async fn read_submission_raw(&self, id: u64, index: u64) -> Result<RawSubmission, LedgerError> {
        let mut state = self.state();
        state.calls.push("getSubmission");
        if state.failing_index == Some(index) {
            return Err(LedgerError::Transport("connection reset".into()));
        }
        let named_next = state.named_next;
        let submission = state
            .bounty(id)?
            .submissions
            .get(index as usize)
            .cloned()
            .ok_or_else(|| revert("Invalid submission index"))?;
        if named_next {
            state.served_named = true;
            Ok(named(&submission))
        } else {
            state.served_positional = true;
            Ok(positional(&submission))
        }
    }

    async fn read_winners(&self, id: u64) -> Result<Vec<WinnerRecord>, LedgerError> {
        let mut state = self.state();
        state.calls.push("getWinners");
        Ok(state.bounty(id)?.winners.clone())
    }

    async fn read_has_submitted(&self, id: u64, submitter: H160) -> Result<bool, LedgerError> {
        let mut state = self.state();
        state.calls.push("hasSubmitted");
        let hide = state.hide_submissions;
        let entry = state.bounty(id)?;
        Ok(!hide && entry.submissions.iter().any(|s| s.submitter == submitter))
    }

    async fn read_bounty_count_by_category(&self, category: Category) -> Result<u64, LedgerError> {
        let mut state = self.state();
        state.calls.push("getBountyCountByCategory");
        Ok(state
            .bounties
            .iter()
            .filter(|b| b.bounty.category == category)
            .count() as u64)
    }

    async fn read_active_bounties_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<u64>, LedgerError> {
        let mut state = self.state();
        state.calls.push("getActiveBountiesByCategory");
        Ok(state
            .bounties
            .iter()
            .filter(|b| b.bounty.category == category && b.bounty.is_active)
            .map(|b| b.bounty.id)
            .collect())
    }

    async fn read_contract_balance(&self) -> Result<U256, LedgerError> {
        let mut state = self.state();
        state.calls.push("getContractBalance");
        Ok(state
            .bounties
            .iter()
            .filter(|b| !b.bounty.is_closed)
            .fold(U256::zero(), |acc, b| acc + b.bounty.stake_amount))
    }

    async fn read_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, LedgerError> {
        let mut state = self.state();
        state.calls.push("getTransactionReceipt");
        Ok(state.receipts.get(&tx_hash).cloned())
    }

    async fn write_create_bounty(
        &self,
        _description: &str,
        deadline: u64,
        category: Category,
        stake: U256,
    ) -> Result<PendingTx, LedgerError> {
        let mut state = self.state();
        state.calls.push("createBounty");
        if stake.is_zero() {
            return Err(revert("Stake must be positive"));
        }
        if deadline <= state.now {
            return Err(revert("Deadline must be in the future"));
        }

        if state.revert_creations {
            return Ok(state.mine_with_status(vec![], 0));
        }

        let creator = state.sender;
        let id = state.insert_bounty(creator, stake, deadline, category);
        let log = if state.undecodable_logs {
            Log {
                address: CONTRACT,
                topics: vec![H256::repeat_byte(0x11), H256::from_low_u64_be(id)],
                ..Default::default()
            }
        } else {
            Log {
                address: CONTRACT,
                topics: vec![
                    BountyCreatedFilter::signature(),
                    H256::from_low_u64_be(id),
                    H256::from(creator),
                ],
                data: encode(&[
                    Token::Uint(stake),
                    Token::Uint(deadline.into()),
                    Token::Uint(category.as_u8().into()),
                ])
                .into(),
                ..Default::default()
            }
        };
        Ok(state.mine(vec![log]))
    }

    async fn write_submit_work(
        &self,
        id: u64,
        links: &SubmissionLinks,
    ) -> Result<PendingTx, LedgerError> {
        let mut state = self.state();
        state.calls.push("submitWork");
        let (sender, now) = (state.sender, state.now);
        let entry = state.bounty(id)?;
        if entry.bounty.is_closed {
            return Err(revert("Bounty is closed"));
        }
        if entry.bounty.deadline < now {
            return Err(revert("Deadline passed"));
        }
        if entry.submissions.iter().any(|s| s.submitter == sender) {
            return Err(revert("Already submitted"));
        }
        entry.submissions.push(Submission {
            bounty_id: id,
            index: entry.submissions.len() as u64,
            submitter: sender,
            links: links.clone(),
            submission_time: now,
            is_winner: false,
            rank: 0,
        });
        entry.bounty.total_submissions += 1;
        Ok(state.mine(vec![]))
    }

    async fn write_select_winners(
        &self,
        id: u64,
        submission_ids: Vec<u64>,
        ranks: Vec<u8>,
        prize_amounts: Vec<U256>,
    ) -> Result<PendingTx, LedgerError> {
        let mut state = self.state();
        state.calls.push("selectWinners");
        let sender = state.sender;
        let entry = state.bounty(id)?;
        if entry.bounty.creator != sender {
            return Err(revert("Only creator"));
        }
        if entry.bounty.is_closed {
            return Err(revert("Bounty is closed"));
        }
        let total = prize_amounts.iter().fold(U256::zero(), |acc, p| acc + *p);
        if total > entry.bounty.stake_amount {
            return Err(revert("Prizes exceed stake"));
        }
        for sid in &submission_ids {
            match entry.submissions.get(*sid as usize) {
                Some(s) if !s.is_winner => {},
                _ => return Err(revert("Invalid submission")),
            }
        }

        for ((sid, rank), prize) in submission_ids.into_iter().zip(ranks).zip(prize_amounts) {
            let submission = &mut entry.submissions[sid as usize];
            submission.is_winner = true;
            submission.rank = rank;
            entry.winners.push(WinnerRecord {
                winner: submission.submitter,
                rank,
                prize_amount: prize,
            });
        }
        entry.bounty.is_closed = true;
        entry.bounty.is_active = false;
        Ok(state.mine(vec![]))
    }

    async fn write_refund_bounty(&self, id: u64) -> Result<PendingTx, LedgerError> {
        let mut state = self.state();
        state.calls.push("refundBounty");
        let (sender, now) = (state.sender, state.now);
        let entry = state.bounty(id)?;
        if entry.bounty.creator != sender {
            return Err(revert("Only creator"));
        }
        if entry.bounty.is_closed {
            return Err(revert("Bounty is closed"));
        }
        if entry.bounty.total_submissions > 0 {
            return Err(revert("Bounty has submissions"));
        }
        if entry.bounty.deadline >= now {
            return Err(revert("Deadline not passed"));
        }
        entry.bounty.is_closed = true;
        entry.bounty.is_active = false;
        Ok(state.mine(vec![]))
    }

    async fn write_cancel_bounty(&self, id: u64, reason: &str) -> Result<PendingTx, LedgerError> {
        let mut state = self.state();
        state.calls.push("cancelBounty");
        let sender = state.sender;
        let entry = state.bounty(id)?;
        if entry.bounty.creator != sender {
            return Err(revert("Only creator"));
        }
        if entry.bounty.is_closed {
            return Err(revert("Bounty is closed"));
        }
        if !entry.winners.is_empty() {
            return Err(revert("Winners already selected"));
        }
        if reason.is_empty() {
            return Err(revert("Reason required"));
        }
        entry.bounty.is_closed = true;
        entry.bounty.is_active = false;
        entry.cancel_reason = Some(reason.to_owned());
        Ok(state.mine(vec![]))
    }

    async fn await_confirmation(&self, pending: PendingTx) -> Result<Confirmation, LedgerError> {
        let state = self.state();
        if state.time_out_confirmations {
            return Err(LedgerError::ConfirmationTimeout {
                tx_hash: pending.tx_hash,
            });
        }
        state
            .receipts
            .get(&pending.tx_hash)
            .cloned()
            .map(Confirmation::from_receipt)
            .ok_or_else(|| LedgerError::ReceiptUnavailable {
                tx_hash: pending.tx_hash,
                reason: "unknown transaction".into(),
            })
    }
}

#[derive(Default)]
struct StoreState {
    opportunities: Vec<Opportunity>,
    users: Vec<UserProfile>,
    next_id: u64,
    fail_creates: bool,
    fail_updates: bool,
    failing_wallets: HashSet<H160>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn len(&self) -> usize {
        self.state().opportunities.len()
    }

    pub fn get(&self, id: &str) -> Opportunity {
        self.state()
            .opportunities
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .unwrap()
    }

    pub fn fail_creates(&self, on: bool) {
        self.state().fail_creates = on;
    }

    pub fn fail_updates(&self, on: bool) {
        self.state().fail_updates = on;
    }

    pub fn fail_user_lookup(&self, wallet: H160) {
        self.state().failing_wallets.insert(wallet);
    }

    pub fn insert_user(&self, username: &str, wallet: H160) {
        self.state().users.push(UserProfile {
            username: username.into(),
            wallet_address: wallet,
            avatar: None,
        });
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_opportunity_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError> {
        Ok(self.state().opportunities.iter().find(|o| o.id == id).cloned())
    }

    async fn create_opportunity(&self, fields: NewOpportunity) -> Result<Opportunity, StoreError> {
        let mut state = self.state();
        if state.fail_creates {
            return Err(StoreError::DataAccess("connection refused".into()));
        }
        state.next_id += 1;
        let opportunity = fields.into_opportunity(format!("opp{}", state.next_id));
        state.opportunities.push(opportunity.clone());
        Ok(opportunity)
    }

    async fn update_opportunity(
        &self,
        id: &str,
        patch: OpportunityPatch,
    ) -> Result<Opportunity, StoreError> {
        let mut state = self.state();
        if state.fail_updates {
            return Err(StoreError::DataAccess("connection refused".into()));
        }
        let opportunity = state
            .opportunities
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if let Some(status) = patch.status {
            opportunity.status = status;
        }
        if let Some(bounty_id) = patch.contract_bounty_id {
            opportunity.contract_bounty_id = Some(bounty_id);
        }
        if let Some(flag) = patch.needs_reconciliation {
            opportunity.needs_reconciliation = flag;
        }
        Ok(opportunity.clone())
    }

    async fn list_opportunities_by_bounty_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<Opportunity>, StoreError> {
        Ok(self
            .state()
            .opportunities
            .iter()
            .filter(|o| o.contract_bounty_id.map_or(false, |id| ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn get_user_by_wallet(&self, wallet: H160) -> Result<Option<UserProfile>, StoreError> {
        let state = self.state();
        if state.failing_wallets.contains(&wallet) {
            return Err(StoreError::DataAccess("timeout".into()));
        }
        Ok(state.users.iter().find(|u| u.wallet_address == wallet).cloned())
    }
}

