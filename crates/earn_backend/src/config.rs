use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub contract_address: String,
    /// Chain every write must land on
    pub chain_id: u64,
    pub wallet_private_key: String,
    pub confirmation_timeout: Duration,
    pub confirmations: usize,

    pub db_url: String,
    pub db_username: String,
    pub db_password: String,
    pub db_namespace: String,
    pub db_database: String,

    /// Directory holding `cert.pem` and `key.pem`
    pub cert_dir: PathBuf,
}

fn var(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("Couldn't get {key} env var"))
}

fn var_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Config> {
        Ok(Config {
            rpc_url: var("RPC_URL")?,
            contract_address: var("CONTRACT_ADDRESS")?,
            chain_id: var("CHAIN_ID")?
                .parse()
                .context("CHAIN_ID must be an integer")?,
            wallet_private_key: var("WALLET_PRIVATE_KEY")?,
            confirmation_timeout: Duration::from_secs(var_or("CONFIRMATION_TIMEOUT_SECS", 180)?),
            confirmations: var_or("CONFIRMATIONS", 1)?,
            db_url: var("DB_URL")?,
            db_username: var("DB_USERNAME")?,
            db_password: var("DB_PASSWORD")?,
            db_namespace: var("DB_NAMESPACE")?,
            db_database: var("DB_DATABASE")?,
            cert_dir: PathBuf::from(var_or("CERT_DIR", String::from("certs"))?),
        })
    }
}
