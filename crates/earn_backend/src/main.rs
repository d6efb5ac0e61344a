use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{http::header, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use earn_contract::{get_contract, EthersLedger, SignerClient, H160};
use ethers::providers::Middleware;
use log::{debug, info, warn};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    category::CategoryAggregator,
    config::Config,
    coordinator::{CallContext, Coordinator},
    db::SurrealStore,
    submissions::SubmissionAggregator,
};

mod api;
mod category;
mod config;
mod coordinator;
mod db;
mod models;
mod submissions;
#[cfg(test)]
mod testing;

type Chain = EthersLedger<SignerClient>;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator<Chain, SurrealStore>>,
    submissions: Arc<SubmissionAggregator<Chain, SurrealStore>>,
    categories: Arc<CategoryAggregator<Chain, SurrealStore>>,
    /// Address the backend signs every write with
    signer: H160,
    /// Chain the signer's provider is connected to
    wallet_chain_id: u64,
}

impl AppState {
    pub async fn init(config: &Config) -> anyhow::Result<AppState> {
        let db_conn = db::connect(
            &config.db_url,
            &config.db_username,
            &config.db_password,
            &config.db_namespace,
            &config.db_database,
        )
        .await
        .context("Couldn't connect to database")?;
        let store = Arc::new(SurrealStore::new(db_conn));

        let (contract, client) = get_contract(
            &config.rpc_url,
            &config.contract_address,
            &config.wallet_private_key,
            config.chain_id,
        )
        .await?;
        let signer = client.address();
        let wallet_chain_id = client
            .get_chainid()
            .await
            .context("Couldn't reach RPC node")?
            .as_u64();
        if wallet_chain_id != config.chain_id {
            warn!(
                "RPC node is on chain {wallet_chain_id} but writes require chain {}",
                config.chain_id
            );
        }

        let ledger = Arc::new(
            EthersLedger::new(contract, client)
                .with_confirmations(config.confirmations)
                .with_confirmation_timeout(config.confirmation_timeout),
        );
        info!("Signing as {signer:?} against contract {}", config.contract_address);

        Ok(AppState {
            coordinator: Arc::new(Coordinator::new(
                ledger.clone(),
                store.clone(),
                config.chain_id,
            )),
            submissions: Arc::new(SubmissionAggregator::new(ledger.clone(), store.clone())),
            categories: Arc::new(CategoryAggregator::new(ledger, store)),
            signer,
            wallet_chain_id,
        })
    }

    pub fn call_context(&self) -> CallContext {
        CallContext::new(self.wallet_chain_id, self.signer)
    }
}

#[derive(Parser, Debug)]
#[command(name = "earn")]
#[command(bin_name = "earn")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Flag to disable HTTPS
    #[arg(long)]
    no_https: bool,

    /// Port to listen on
    #[arg(long, default_value_t = 3001)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp(None).init();

    let cli = Cli::parse();

    if dotenvy::dotenv().is_err() {
        warn!("Error reading .env file");
    } else {
        debug!("Loaded .env file");
    }

    let config = Config::from_env()?;
    let app_state = AppState::init(&config).await?;

    let cors = CorsLayer::new()
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .allow_methods(Any)
        .allow_origin(Any);

    let app = Router::new()
        .merge(api::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    if cli.no_https {
        info!("Starting server on {addr} with HTTPS disabled...");

        axum_server::bind(addr)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!("Starting server on {addr} with HTTPS...");

        let rustls_config = RustlsConfig::from_pem_file(
            config.cert_dir.join("cert.pem"),
            config.cert_dir.join("key.pem"),
        )
        .await
        .with_context(|| format!("Couldn't load certs from {}", config.cert_dir.display()))?;

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await?;
    }

    Ok(())
}
