//! Block events delivered to registered peer connections.

use crate::DeliveryMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: String,
    pub valid: bool,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            tx_id: Uuid::new_v4().to_string(),
            valid: true,
            payload,
        }
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// A committed block with complete transaction payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub channel: String,
    pub number: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(channel: impl Into<String>, number: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            channel: channel.into(),
            number,
            transactions,
        }
    }

    /// Strips payloads, keeping transaction ids and validation results.
    pub fn filtered(&self) -> FilteredBlock {
        FilteredBlock {
            channel: self.channel.clone(),
            number: self.number,
            transactions: self
                .transactions
                .iter()
                .map(|tx| FilteredTransaction {
                    tx_id: tx.tx_id.clone(),
                    valid: tx.valid,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredTransaction {
    pub tx_id: String,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredBlock {
    pub channel: String,
    pub number: u64,
    pub transactions: Vec<FilteredTransaction>,
}

/// A block as seen by a connection registered in a given [`DeliveryMode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "block", rename_all = "snake_case")]
pub enum BlockEvent {
    Full(Block),
    Filtered(FilteredBlock),
}

impl BlockEvent {
    pub fn for_mode(block: &Block, mode: DeliveryMode) -> Self {
        match mode {
            DeliveryMode::Full => Self::Full(block.clone()),
            DeliveryMode::Filtered => Self::Filtered(block.filtered()),
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            Self::Full(block) => block.number,
            Self::Filtered(block) => block.number,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::Full(block) => &block.channel,
            Self::Filtered(block) => &block.channel,
        }
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::Filtered(_))
    }
}
