//! Per-category browsing: on-chain bounty lists joined with their mirrors

use std::{collections::HashSet, sync::Arc};

use earn_contract::{Category, Ledger, LedgerError, U256};
use futures::future::try_join_all;
use serde::Serialize;

use crate::{coordinator::WorkflowError, db::RecordStore, models::Opportunity};

#[derive(Debug, Clone, Serialize)]
pub struct CategoryListing {
    pub category: Category,
    /// Mirrors of the category's active bounties, in ledger order
    pub opportunities: Vec<Opportunity>,
    /// Active bounties that have no off-chain record
    pub unlisted: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStat {
    pub category: Category,
    pub bounty_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketStats {
    pub categories: Vec<CategoryStat>,
    pub contract_balance: U256,
}

pub struct CategoryAggregator<L, S> {
    ledger: Arc<L>,
    store: Arc<S>,
}

impl<L: Ledger, S: RecordStore> CategoryAggregator<L, S> {
    pub fn new(ledger: Arc<L>, store: Arc<S>) -> Self {
        CategoryAggregator { ledger, store }
    }

    pub async fn listing(&self, category: Category) -> Result<CategoryListing, WorkflowError> {
        let ids = self.ledger.read_active_bounties_by_category(category).await?;
        let mut mirrors = self.store.list_opportunities_by_bounty_ids(&ids).await?;

        let mut opportunities = Vec::with_capacity(ids.len());
        let mut unlisted = vec![];
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match mirrors
                .iter()
                .position(|o| o.contract_bounty_id == Some(id))
            {
                Some(pos) => opportunities.push(mirrors.swap_remove(pos)),
                None => unlisted.push(id),
            }
        }

        Ok(CategoryListing {
            category,
            opportunities,
            unlisted,
        })
    }

    pub async fn stats(&self) -> Result<MarketStats, LedgerError> {
        let counts = try_join_all(Category::ALL.iter().map(|&category| async move {
            let bounty_count = self.ledger.read_bounty_count_by_category(category).await?;
            Ok::<_, LedgerError>(CategoryStat {
                category,
                bounty_count,
            })
        }));
        let (categories, contract_balance) =
            futures::try_join!(counts, self.ledger.read_contract_balance())?;

        Ok(MarketStats {
            categories,
            contract_balance,
        })
    }
}
