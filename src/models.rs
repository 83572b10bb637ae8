// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the `/server` routes. Field names are
//! camelCase on the wire; addresses and byte strings are `0x`-prefixed hex.
//!
//! Request bodies are parsed into typed values with the `parse_*` helpers
//! so a malformed field is reported by name.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::codec::RelaySignature;
use crate::error::ApiError;
use crate::relay::{RelayOutcome, RelayRequest};
use crate::storage::{address_key, BindingStatus, ProxyBinding, RelayStatus};

// =============================================================================
// Deploy
// =============================================================================

/// Request a proxy for an owner identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Owner address (0x + 40 hex chars)
    pub owner_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    /// Address of the owner's proxy (known before confirmation)
    pub contract_address: String,
    /// Deployment transaction hash
    pub tx_hash: String,
    pub status: RelayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl DeployResponse {
    pub fn from_outcome(outcome: &RelayOutcome) -> Self {
        Self {
            contract_address: outcome
                .contract_address
                .map(|a| a.to_checksum(None))
                .unwrap_or_default(),
            tx_hash: outcome.transaction_id.to_string(),
            status: outcome.status,
            explorer_url: outcome.explorer_url.clone(),
        }
    }
}

// =============================================================================
// Message (relay)
// =============================================================================

/// Nonce as sent by clients: a JSON number or a decimal/hex string.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum NonceValue {
    Number(u64),
    Text(String),
}

/// A signed `SignedAccess` authorization to relay.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// Proxy that verifies and executes
    pub proxy: String,
    /// Contract the proxy calls
    pub target: String,
    /// Calldata forwarded to `target`
    pub data: String,
    /// Recovery id (0, 1, 27 or 28)
    pub v: u8,
    /// 32-byte signature component
    pub r: String,
    /// 32-byte signature component
    pub s: String,
    /// Nonce the signature was made for; read from the proxy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<NonceValue>,
}

impl MessageRequest {
    pub fn into_relay_request(self) -> Result<RelayRequest, ApiError> {
        Ok(RelayRequest {
            proxy: parse_address("proxy", &self.proxy)?,
            target: parse_address("target", &self.target)?,
            data: parse_bytes("data", &self.data)?,
            signature: RelaySignature::new(
                self.v,
                parse_word("r", &self.r)?,
                parse_word("s", &self.s)?,
            ),
            nonce: self.nonce.as_ref().map(parse_nonce).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub tx_hash: String,
    pub status: RelayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl From<RelayOutcome> for MessageResponse {
    fn from(outcome: RelayOutcome) -> Self {
        Self {
            tx_hash: outcome.transaction_id.to_string(),
            status: outcome.status,
            block_number: outcome.block_number,
            explorer_url: outcome.explorer_url,
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub proxy: String,
    /// Current nonce (decimal)
    pub nonce: String,
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryResponse {
    pub owner: String,
    pub proxy: String,
    pub status: BindingStatus,
    pub tx_hash: String,
}

impl From<ProxyBinding> for RegistryResponse {
    fn from(binding: ProxyBinding) -> Self {
        Self {
            owner: binding.owner,
            proxy: binding.proxy,
            status: binding.status,
            tx_hash: binding.tx_hash,
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

pub fn parse_address(field: &str, value: &str) -> Result<Address, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {field}: expected 0x + 40 hex chars")))
}

pub fn parse_bytes(field: &str, value: &str) -> Result<Bytes, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {field}: expected 0x-prefixed hex")))
}

pub fn parse_word(field: &str, value: &str) -> Result<B256, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {field}: expected 0x + 64 hex chars")))
}

pub fn parse_tx_hash(value: &str) -> Result<B256, ApiError> {
    parse_word("transaction hash", value)
}

fn parse_nonce(value: &NonceValue) -> Result<U256, ApiError> {
    match value {
        NonceValue::Number(n) => Ok(U256::from(*n)),
        NonceValue::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request("Invalid nonce: expected an unsigned integer")),
    }
}

/// Wire form of an address in query responses.
pub fn wire_address(address: &Address) -> String {
    address_key(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn message(nonce: Option<NonceValue>) -> MessageRequest {
        MessageRequest {
            proxy: format!("{:#x}", Address::repeat_byte(0x11)),
            target: "0x4cBedDEDA88fDd9e116618a5cD71BB0E440C2A78".into(),
            data: "0xde5f72fd".into(),
            v: 27,
            r: format!("{:#x}", B256::repeat_byte(1)),
            s: format!("{:#x}", B256::repeat_byte(2)),
            nonce,
        }
    }

    #[test]
    fn message_request_parses_into_relay_request() {
        let request = message(Some(NonceValue::Text("7".into())))
            .into_relay_request()
            .unwrap();
        assert_eq!(request.proxy, Address::repeat_byte(0x11));
        assert_eq!(request.data.as_ref(), &[0xde, 0x5f, 0x72, 0xfd]);
        assert_eq!(request.signature.v, 27);
        assert_eq!(request.nonce, Some(U256::from(7)));

        let request = message(None).into_relay_request().unwrap();
        assert_eq!(request.nonce, None);
    }

    #[test]
    fn nonce_accepts_number_or_string() {
        let json = serde_json::json!({
            "proxy": "0x1111111111111111111111111111111111111111",
            "target": "0x4cBedDEDA88fDd9e116618a5cD71BB0E440C2A78",
            "data": "0x",
            "v": 28,
            "r": "0x01",
            "s": "0x02",
            "nonce": 3,
        });
        let parsed: MessageRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.nonce, Some(NonceValue::Number(3)));
    }

    #[test]
    fn malformed_fields_are_bad_requests() {
        let mut bad = message(None);
        bad.target = "0x1234".into();
        let err = bad.into_relay_request().unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("target"));

        let mut bad = message(None);
        bad.data = "not hex".into();
        assert_eq!(bad.into_relay_request().unwrap_err().status, StatusCode::BAD_REQUEST);

        let mut bad = message(Some(NonceValue::Text("-1".into())));
        bad.r = format!("{:#x}", B256::ZERO);
        assert!(bad.into_relay_request().unwrap_err().message.contains("nonce"));
    }

    #[test]
    fn deploy_request_uses_camel_case() {
        let parsed: DeployRequest =
            serde_json::from_str(r#"{"ownerAddress":"0xabc"}"#).unwrap();
        assert_eq!(parsed.owner_address, "0xabc");
    }
}
