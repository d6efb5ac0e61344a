use async_trait::async_trait;
use earn_contract::H160;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use surrealdb::{
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
    sql::Thing,
    Surreal,
};
use thiserror::Error;

use crate::models::{NewOpportunity, Opportunity, OpportunityPatch, UserProfile};

pub type DBConnection = Surreal<Client>;

const OPPORTUNITY: &str = "Opportunity";

pub async fn connect(
    connection_string: &str,
    username: &str,
    password: &str,
    namespace: &str,
    database: &str,
) -> surrealdb::Result<DBConnection> {
    let db = Surreal::new::<Ws>(connection_string).await?;

    db.signin(Root { username, password }).await?;

    db.use_ns(namespace).use_db(database).await?;

    info!("Successfully connected to database");

    Ok(db)
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),

    #[error("data access error: {0}")]
    DataAccess(String),
}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        StoreError::DataAccess(e.to_string())
    }
}

/// Off-chain store of opportunities and user profiles.
///
/// No operation spans more than one row and there are no transactions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_opportunity_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError>;

    async fn create_opportunity(&self, fields: NewOpportunity) -> Result<Opportunity, StoreError>;

    async fn update_opportunity(
        &self,
        id: &str,
        patch: OpportunityPatch,
    ) -> Result<Opportunity, StoreError>;

    /// Opportunities linked to any of the given bounty ids
    async fn list_opportunities_by_bounty_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<Opportunity>, StoreError>;

    async fn get_user_by_wallet(&self, wallet: H160) -> Result<Option<UserProfile>, StoreError>;
}

/// Opportunity as stored, with surreal's record id
#[derive(Debug, Serialize, Deserialize)]
struct OpportunityRow {
    id: Thing,
    #[serde(flatten)]
    fields: NewOpportunity,
}

impl From<OpportunityRow> for Opportunity {
    fn from(row: OpportunityRow) -> Self {
        row.fields.into_opportunity(row.id.id.to_raw())
    }
}

pub struct SurrealStore {
    db_conn: DBConnection,
}

impl SurrealStore {
    pub fn new(db_conn: DBConnection) -> Self {
        SurrealStore { db_conn }
    }
}

#[async_trait]
impl RecordStore for SurrealStore {
    async fn get_opportunity_by_id(&self, id: &str) -> Result<Option<Opportunity>, StoreError> {
        let row: Option<OpportunityRow> = self.db_conn.select((OPPORTUNITY, id)).await?;
        Ok(row.map(Opportunity::from))
    }

    async fn create_opportunity(&self, fields: NewOpportunity) -> Result<Opportunity, StoreError> {
        let rows: Vec<OpportunityRow> = self.db_conn.create(OPPORTUNITY).content(fields).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::DataAccess("create returned no record".into()))?;
        debug!("created opportunity {}", row.id);
        Ok(row.into())
    }

    async fn update_opportunity(
        &self,
        id: &str,
        patch: OpportunityPatch,
    ) -> Result<Opportunity, StoreError> {
        let row: Option<OpportunityRow> =
            self.db_conn.update((OPPORTUNITY, id)).merge(patch).await?;
        row.map(Opportunity::from)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    async fn list_opportunities_by_bounty_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<Opportunity>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let mut res = self
            .db_conn
            .query("SELECT * FROM Opportunity WHERE contract_bounty_id INSIDE $ids")
            .bind(("ids", ids.to_vec()))
            .await?;
        let rows: Vec<OpportunityRow> = res.take(0)?;
        Ok(rows.into_iter().map(Opportunity::from).collect())
    }

    async fn get_user_by_wallet(&self, wallet: H160) -> Result<Option<UserProfile>, StoreError> {
        let mut res = self
            .db_conn
            .query("SELECT * FROM Users WHERE wallet_address = $wallet LIMIT 1")
            .bind(("wallet", wallet))
            .await?;
        let users: Vec<UserProfile> = res.take(0)?;
        Ok(users.into_iter().next())
    }
}
