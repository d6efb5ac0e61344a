use std::sync::Arc;

use ethers::{
    prelude::{k256::ecdsa::SigningKey, SignerMiddleware},
    providers::{Http, Provider},
    signers::{Signer, Wallet},
    types::Address,
};

mod abi {
    use ethers::prelude::abigen;

    abigen!(
        EarnBounty,
        r#"[
            function createBounty(string description, uint256 deadline, uint8 category) external payable returns (uint256)
            function submitWork(uint256 bountyId, string submissionLink, string tweetLink, string githubLink, string twitterLink, string videoLink, string indieFunLink, string projectLink) external
            function selectWinners(uint256 bountyId, uint256[] submissionIds, uint8[] ranks, uint256[] prizeDistribution) external
            function refundBounty(uint256 bountyId) external
            function cancelBounty(uint256 bountyId, string reason) external
            function getBounty(uint256 bountyId) external view returns (uint256 id, address creator, string description, uint256 stakeAmount, uint256 deadline, uint8 category, bool isActive, bool isClosed, uint256 totalSubmissions)
            function getSubmission(uint256 bountyId, uint256 index) external view returns (uint256 forBounty, address submitter, string submissionLink, string tweetLink, string githubLink, string twitterLink, string videoLink, string indieFunLink, string projectLink, uint256 submissionTime, bool isWinner, uint8 rank)
            function getSubmissionCount(uint256 bountyId) external view returns (uint256)
            function getWinners(uint256 bountyId) external view returns (address[] winners, uint8[] ranks, uint256[] prizeAmounts)
            function hasSubmitted(uint256 bountyId, address submitter) external view returns (bool)
            function getBountyCountByCategory(uint8 category) external view returns (uint256)
            function getActiveBountiesByCategory(uint8 category) external view returns (uint256[])
            function getContractBalance() external view returns (uint256)
            event BountyCreated(uint256 indexed bountyId, address indexed creator, uint256 stakeAmount, uint256 deadline, uint8 category)
            event WorkSubmitted(uint256 indexed bountyId, address indexed submitter, uint256 submissionId)
            event WinnersSelected(uint256 indexed bountyId, address[] winners, uint256[] prizeAmounts)
            event BountyRefunded(uint256 indexed bountyId, address indexed creator, uint256 amount)
            event BountyCancelled(uint256 indexed bountyId, address indexed creator, string reason)
        ]"#
    );
}

pub mod client;
pub mod ledger;
pub mod receipt;
pub mod types;

pub use abi::*;
pub use client::EthersLedger;
pub use ethers::types::{TransactionReceipt, H160, H256, U256};
pub use ledger::{Confirmation, Ledger, LedgerError, PendingTx};
pub use receipt::{extract_bounty_id, BountyIdSource};
pub use types::*;

/// Client that signs every write with the backend's wallet
pub type SignerClient = SignerMiddleware<Provider<Http>, Wallet<SigningKey>>;

pub type Contract = EarnBounty<SignerClient>;

pub async fn get_contract(
    rpc_url: &str,
    contract_address: &str,
    private_key: &str,
    chain_id: u64,
) -> anyhow::Result<(Contract, Arc<SignerClient>)> {
    let provider = Provider::<Http>::try_from(rpc_url)?;
    let wallet = private_key.parse::<Wallet<SigningKey>>()?.with_chain_id(chain_id);
    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    let address: Address = contract_address.parse()?;
    let contract = EarnBounty::new(address, client.clone());

    Ok((contract, client))
}
