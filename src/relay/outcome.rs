// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Result of a relay as reported to callers.

use alloy::primitives::{Address, TxHash};

use crate::storage::RelayStatus;

/// What happened to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub transaction_id: TxHash,
    pub status: RelayStatus,
    /// Set only for deployments.
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
    pub explorer_url: Option<String>,
}

impl RelayOutcome {
    pub fn new(transaction_id: TxHash, status: RelayStatus) -> Self {
        Self {
            transaction_id,
            status,
            contract_address: None,
            block_number: None,
            explorer_url: None,
        }
    }

    pub fn pending(transaction_id: TxHash) -> Self {
        Self::new(transaction_id, RelayStatus::Pending)
    }

    /// Mark the outcome final at the given block.
    pub fn confirmed_at(mut self, block_number: u64) -> Self {
        self.status = RelayStatus::Confirmed;
        self.block_number = Some(block_number);
        self
    }

    pub fn with_contract(mut self, address: Address) -> Self {
        self.contract_address = Some(address);
        self
    }

    pub fn with_explorer_url(mut self, url: Option<String>) -> Self {
        self.explorer_url = url;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == RelayStatus::Pending
    }
}
