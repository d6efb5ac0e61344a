//! Canonical shapes of the escrow contract's records
//!
//! Everything read from the ledger is turned into one of these types at the
//! client boundary, so callers never inspect raw tuples or JSON.

use std::{fmt, str::FromStr};

use ethers::{
    abi::Token,
    types::{Address, U256},
};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;

/// Bounty category as encoded by the contract's `uint8` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Content,
    Design,
    Development,
    SmartContract,
    SocialMedia,
    FullStack,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Content,
        Category::Design,
        Category::Development,
        Category::SmartContract,
        Category::SocialMedia,
        Category::FullStack,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Category> {
        Self::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown category {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounty {
    pub id: u64,
    pub creator: Address,
    pub description: String,
    /// Total escrowed funds in wei
    pub stake_amount: U256,
    /// Unix timestamp (seconds)
    pub deadline: u64,
    pub category: Category,
    pub is_active: bool,
    pub is_closed: bool,
    pub total_submissions: u64,
}

impl Bounty {
    /// A deadline counts as passed only once `now` is strictly later
    pub fn deadline_passed(&self, now: u64) -> bool {
        self.deadline < now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionLinks {
    pub submission_link: String,
    #[serde(default)]
    pub tweet_link: String,
    pub github_link: String,
    pub twitter_link: String,
    pub video_link: String,
    pub indie_fun_link: String,
    #[serde(default)]
    pub project_link: String,
}

impl SubmissionLinks {
    /// Names of mandatory links that are blank
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("submission_link", &self.submission_link),
            ("github_link", &self.github_link),
            ("twitter_link", &self.twitter_link),
            ("video_link", &self.video_link),
            ("indie_fun_link", &self.indie_fun_link),
        ]
        .into_iter()
        .filter(|(_, link)| link.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub bounty_id: u64,
    /// Position in the bounty's submission list, doubles as the submission id
    pub index: u64,
    pub submitter: Address,
    pub links: SubmissionLinks,
    pub submission_time: u64,
    pub is_winner: bool,
    pub rank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub winner: Address,
    pub rank: u8,
    pub prize_amount: U256,
}

/// A submission as handed back by the node before normalization.
///
/// Depending on how the response was decoded it is either the positional
/// output tuple of `getSubmission` or an object keyed by the output names.
#[derive(Debug, Clone)]
pub enum RawSubmission {
    Positional(Vec<Token>),
    Named(serde_json::Value),
}

impl RawSubmission {
    /// Collapse either shape into the canonical [`Submission`]
    pub fn normalize(self, index: u64) -> Result<Submission, LedgerError> {
        match self {
            RawSubmission::Positional(tokens) => from_tokens(tokens, index),
            RawSubmission::Named(value) => from_named(value, index),
        }
    }
}

fn from_tokens(tokens: Vec<Token>, index: u64) -> Result<Submission, LedgerError> {
    // a decoded tuple may still be wrapped in a single Token::Tuple
    let tokens = match tokens.as_slice() {
        [Token::Tuple(inner)] => inner.clone(),
        _ => tokens,
    };
    if tokens.len() != 12 {
        return Err(LedgerError::Decode(format!(
            "expected 12 submission fields, got {}",
            tokens.len()
        )));
    }

    let mut it = tokens.into_iter();
    let mut next = || it.next().ok_or_else(|| LedgerError::Decode("short tuple".into()));
    let uint = |t: Token, field: &str| {
        t.into_uint()
            .ok_or_else(|| LedgerError::Decode(format!("{field} is not a uint")))
    };
    let string = |t: Token, field: &str| {
        t.into_string()
            .ok_or_else(|| LedgerError::Decode(format!("{field} is not a string")))
    };

    let bounty_id = to_u64(uint(next()?, "bountyId")?, "bountyId")?;
    let submitter = next()?
        .into_address()
        .ok_or_else(|| LedgerError::Decode("submitter is not an address".into()))?;
    let links = SubmissionLinks {
        submission_link: string(next()?, "submissionLink")?,
        tweet_link: string(next()?, "tweetLink")?,
        github_link: string(next()?, "githubLink")?,
        twitter_link: string(next()?, "twitterLink")?,
        video_link: string(next()?, "videoLink")?,
        indie_fun_link: string(next()?, "indieFunLink")?,
        project_link: string(next()?, "projectLink")?,
    };
    let submission_time = to_u64(uint(next()?, "submissionTime")?, "submissionTime")?;
    let is_winner = next()?
        .into_bool()
        .ok_or_else(|| LedgerError::Decode("isWinner is not a bool".into()))?;
    let rank = to_u8(uint(next()?, "rank")?)?;

    Ok(Submission {
        bounty_id,
        index,
        submitter,
        links,
        submission_time,
        is_winner,
        rank,
    })
}

/// Integer that the node may render as a JSON number, a decimal string or a
/// hex quantity
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Quantity {
    Num(u64),
    Str(String),
}

impl Quantity {
    fn into_u256(self) -> Result<U256, LedgerError> {
        match self {
            Quantity::Num(n) => Ok(U256::from(n)),
            Quantity::Str(s) => match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| format!("{e:?}")),
                None => U256::from_dec_str(&s).map_err(|e| format!("{e:?}")),
            }
            .map_err(|e| LedgerError::Decode(format!("bad quantity {s}: {e}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedSubmission {
    #[serde(alias = "forBounty")]
    bounty_id: Quantity,
    submitter: Address,
    submission_link: String,
    #[serde(default)]
    tweet_link: String,
    github_link: String,
    twitter_link: String,
    video_link: String,
    indie_fun_link: String,
    #[serde(default)]
    project_link: String,
    submission_time: Quantity,
    is_winner: bool,
    rank: Quantity,
}

fn from_named(value: serde_json::Value, index: u64) -> Result<Submission, LedgerError> {
    let named: NamedSubmission =
        serde_json::from_value(value).map_err(|e| LedgerError::Decode(e.to_string()))?;

    Ok(Submission {
        bounty_id: to_u64(named.bounty_id.into_u256()?, "bountyId")?,
        index,
        submitter: named.submitter,
        links: SubmissionLinks {
            submission_link: named.submission_link,
            tweet_link: named.tweet_link,
            github_link: named.github_link,
            twitter_link: named.twitter_link,
            video_link: named.video_link,
            indie_fun_link: named.indie_fun_link,
            project_link: named.project_link,
        },
        submission_time: to_u64(named.submission_time.into_u256()?, "submissionTime")?,
        is_winner: named.is_winner,
        rank: to_u8(named.rank.into_u256()?)?,
    })
}

pub(crate) fn to_u64(value: U256, field: &str) -> Result<u64, LedgerError> {
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::Decode(format!("{field} overflows u64")));
    }
    Ok(value.as_u64())
}

fn to_u8(value: U256) -> Result<u8, LedgerError> {
    if value > U256::from(u8::MAX) {
        return Err(LedgerError::Decode("rank overflows u8".into()));
    }
    Ok(value.as_u32() as u8)
}
