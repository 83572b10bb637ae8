// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! UserProxy contract bindings and deployment artifact.

use std::path::Path;

use alloy::{
    primitives::{Address, Bytes},
    sol,
    sol_types::{SolInterface, SolValue},
};
use serde::Deserialize;

use super::client::EvmClientError;
use crate::ledger::ProxyError;

// Must stay in sync with contracts/UserProxy.sol.
sol! {
    #[sol(rpc)]
    interface IUserProxy {
        event Executed(uint256 indexed nonce, address indexed target, bool success, bytes result);

        error InvalidSignature();
        error Unauthorized(address signer);
        error StaleNonce(uint256 expected, uint256 provided);

        function owner() external view returns (address);
        function nonce() external view returns (uint256);
        function execute(
            address target,
            bytes data,
            uint256 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external returns (bool success, bytes result);
    }
}

/// Map revert data from the proxy onto its typed errors.
pub fn decode_revert(data: &[u8]) -> Option<ProxyError> {
    use IUserProxy::IUserProxyErrors as Revert;

    match Revert::abi_decode(data).ok()? {
        Revert::InvalidSignature(_) => Some(ProxyError::InvalidSignature),
        Revert::Unauthorized(e) => Some(ProxyError::Unauthorized { signer: e.signer }),
        Revert::StaleNonce(e) => Some(ProxyError::StaleNonce {
            expected: e.expected,
            provided: e.provided,
        }),
    }
}

#[derive(Deserialize)]
struct ForgeArtifact {
    bytecode: ForgeBytecode,
}

#[derive(Deserialize)]
struct ForgeBytecode {
    object: String,
}

/// Creation bytecode of `UserProxy`, read from a Foundry build artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyArtifact {
    bytecode: Bytes,
}

impl ProxyArtifact {
    /// Load `out/UserProxy.sol/UserProxy.json` as written by `forge build`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EvmClientError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            EvmClientError::Artifact(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, EvmClientError> {
        let artifact: ForgeArtifact = serde_json::from_slice(raw)
            .map_err(|e| EvmClientError::Artifact(format!("invalid artifact JSON: {e}")))?;
        let bytecode = alloy::hex::decode(artifact.bytecode.object.trim())
            .map_err(|e| EvmClientError::Artifact(format!("invalid bytecode hex: {e}")))?;
        if bytecode.is_empty() {
            return Err(EvmClientError::Artifact("bytecode is empty".to_string()));
        }
        Ok(Self {
            bytecode: bytecode.into(),
        })
    }

    /// Creation code with the ABI-encoded `constructor(address owner)` argument.
    pub fn deploy_code(&self, owner: Address) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&owner.abi_encode());
        code.into()
    }
}
