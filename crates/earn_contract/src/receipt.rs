use ethers::{
    abi::RawLog,
    contract::EthEvent,
    types::{Address, TransactionReceipt, U256},
};
use log::{debug, warn};
use serde::Serialize;

use crate::abi::BountyCreatedFilter;

/// How a bounty id was recovered from a creation receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BountyIdSource {
    /// Decoded from the `BountyCreated` event
    Event(u64),
    /// Read off the first indexed topic of a log emitted by the contract
    Topic(u64),
    Unknown,
}

impl BountyIdSource {
    pub fn bounty_id(self) -> Option<u64> {
        match self {
            BountyIdSource::Event(id) | BountyIdSource::Topic(id) => Some(id),
            BountyIdSource::Unknown => None,
        }
    }
}

/// Recover the ledger-assigned bounty id from a `createBounty` receipt
pub fn extract_bounty_id(receipt: &TransactionReceipt, contract: Address) -> BountyIdSource {
    for log in receipt.logs.iter().filter(|log| log.address == contract) {
        let raw = RawLog::from(log.clone());
        match BountyCreatedFilter::decode_log(&raw) {
            Ok(event) if event.bounty_id <= U256::from(u64::MAX) => {
                return BountyIdSource::Event(event.bounty_id.as_u64());
            },
            Ok(event) => warn!("BountyCreated id {} overflows u64", event.bounty_id),
            Err(e) => debug!("log is not BountyCreated: {e}"),
        }
    }

    // fallback: first contract log carrying an indexed id
    let topic = receipt
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .find_map(|log| log.topics.get(1).copied());

    match topic {
        Some(topic) => {
            let id = U256::from_big_endian(topic.as_bytes());
            if id <= U256::from(u64::MAX) {
                BountyIdSource::Topic(id.as_u64())
            } else {
                BountyIdSource::Unknown
            }
        },
        None => BountyIdSource::Unknown,
    }
}
