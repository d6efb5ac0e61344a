use chrono::{DateTime, TimeZone, Utc};
use earn_contract::{Category, H160, H256, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    /// Wallet the user submits work from
    pub wallet_address: H160,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityStatus {
    Open,
    /// Winners were paid out
    Completed,
    /// Stake returned, no submissions were affected
    Refunded,
    Cancelled,
}

/// Off-chain mirror of a bounty plus its presentation fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub contact: Option<String>,
    pub creator: H160,
    pub stake_amount: U256,
    pub deadline: DateTime<Utc>,
    pub category: Category,
    pub status: OpportunityStatus,
    /// Id of the escrow bounty once linked
    pub contract_bounty_id: Option<u64>,
    /// Hash of the `createBounty` transaction
    pub transaction_hash: Option<H256>,
    /// Set when the chain write landed but the bounty id couldn't be recovered
    #[serde(default)]
    pub needs_reconciliation: bool,
    pub created: DateTime<Utc>,
}

impl Opportunity {
    pub fn is_linked(&self) -> bool {
        self.contract_bounty_id.is_some()
    }
}

/// What a sponsor fills in before a bounty exists anywhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub contact: Option<String>,
    pub stake_amount: U256,
    /// Unix timestamp (seconds)
    pub deadline: u64,
    pub category: String,
}

/// Fields written into the store for a new opportunity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOpportunity {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub contact: Option<String>,
    pub creator: H160,
    pub stake_amount: U256,
    pub deadline: DateTime<Utc>,
    pub category: Category,
    pub status: OpportunityStatus,
    pub contract_bounty_id: Option<u64>,
    pub transaction_hash: Option<H256>,
    pub needs_reconciliation: bool,
    pub created: DateTime<Utc>,
}

impl NewOpportunity {
    pub fn from_draft(
        draft: &OpportunityDraft,
        category: Category,
        creator: H160,
        contract_bounty_id: Option<u64>,
        transaction_hash: Option<H256>,
    ) -> NewOpportunity {
        NewOpportunity {
            title: draft.title.clone(),
            description: draft.description.clone(),
            tags: draft.tags.clone(),
            skills: draft.skills.clone(),
            contact: draft.contact.clone(),
            creator,
            stake_amount: draft.stake_amount,
            deadline: unix_to_datetime(draft.deadline),
            category,
            status: OpportunityStatus::Open,
            contract_bounty_id,
            transaction_hash,
            needs_reconciliation: transaction_hash.is_some() && contract_bounty_id.is_none(),
            created: Utc::now(),
        }
    }

    pub fn into_opportunity(self, id: String) -> Opportunity {
        Opportunity {
            id,
            title: self.title,
            description: self.description,
            tags: self.tags,
            skills: self.skills,
            contact: self.contact,
            creator: self.creator,
            stake_amount: self.stake_amount,
            deadline: self.deadline,
            category: self.category,
            status: self.status,
            contract_bounty_id: self.contract_bounty_id,
            transaction_hash: self.transaction_hash,
            needs_reconciliation: self.needs_reconciliation,
            created: self.created,
        }
    }
}

/// Partial update, `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OpportunityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_bounty_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_reconciliation: Option<bool>,
}

impl OpportunityPatch {
    pub fn status(status: OpportunityStatus) -> Self {
        OpportunityPatch {
            status: Some(status),
            ..Default::default()
        }
    }
}

pub fn unix_to_datetime(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
