// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted records: relayed transactions and owner → proxy bindings.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lowercase `0x` form used for keys and stored addresses.
pub fn address_key(address: &Address) -> String {
    alloy::hex::encode_prefixed(address)
}

/// Outcome state of a relayed transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    /// Broadcast, finality not yet observed
    #[default]
    Pending,
    /// Included and succeeded
    Confirmed,
    /// Reverted, or the forwarded call failed
    Failed,
}

/// What a relayed transaction does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    /// Creation of a UserProxy
    Deploy,
    /// `UserProxy.execute`
    Execute,
}

/// Stored relay record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayRecord {
    /// Transaction hash (0x prefixed)
    pub tx_hash: String,
    pub kind: RelayKind,
    /// Proxy address: the deployed contract, or the one called
    pub proxy: String,
    /// Proxy owner, for deployments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Forwarding target, for executions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Proxy nonce consumed, for executions (decimal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Relayer account sequence used for the broadcast
    pub sequence: u64,
    pub status: RelayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Failure description once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Block explorer URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelayRecord {
    /// Create a new pending record.
    pub fn new_pending(tx_hash: String, kind: RelayKind, proxy: String, sequence: u64) -> Self {
        let now = Utc::now();
        Self {
            tx_hash,
            kind,
            proxy,
            owner: None,
            target: None,
            nonce: None,
            sequence,
            status: RelayStatus::Pending,
            block_number: None,
            gas_used: None,
            error: None,
            explorer_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the record as confirmed.
    pub fn mark_confirmed(&mut self, block_number: u64, gas_used: u64) {
        self.status = RelayStatus::Confirmed;
        self.block_number = Some(block_number);
        self.gas_used = Some(gas_used);
        self.updated_at = Utc::now();
    }

    /// Mark the record as failed.
    pub fn mark_failed(&mut self, block_number: Option<u64>, reason: impl Into<String>) {
        self.status = RelayStatus::Failed;
        self.block_number = block_number;
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
    }
}

/// State of an owner → proxy binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BindingStatus {
    /// Deployment broadcast, not yet confirmed
    Pending,
    /// Proxy deployed and bound to its owner
    Active,
}

/// Which proxy belongs to which owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyBinding {
    pub owner: String,
    pub proxy: String,
    /// Deployment transaction hash
    pub tx_hash: String,
    pub status: BindingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProxyBinding {
    pub fn pending(owner: &Address, proxy: &Address, tx_hash: String) -> Self {
        let now = Utc::now();
        Self {
            owner: address_key(owner),
            proxy: address_key(proxy),
            tx_hash,
            status: BindingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn activate(&mut self) {
        self.status = BindingStatus::Active;
        self.updated_at = Utc::now();
    }

    /// Parsed proxy address.
    pub fn proxy_address(&self) -> Option<Address> {
        self.proxy.parse().ok()
    }
}
