// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Proxy Ledger
//!
//! The per-user `UserProxy` account model and the ledger backends the relay
//! submitter talks to.
//!
//! - [`account`] - the verification/execution state machine of one proxy
//! - [`local`] - an in-process ledger hosting proxies and demo targets
//! - [`faucet`] - demo ERC-20 faucet token used as a forwarding target
//!
//! The RPC backend that talks to a real EVM chain lives in
//! [`crate::blockchain::client`].

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::{AuthorizationRequest, RelaySignature};

pub mod account;
pub mod faucet;
pub mod local;

pub use account::ProxyAccount;
pub use faucet::FaucetToken;
pub use local::LocalLedger;

/// Arguments of `UserProxy.execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteCall {
    pub target: Address,
    pub data: Bytes,
    pub nonce: U256,
    pub signature: RelaySignature,
}

impl ExecuteCall {
    /// The authorization this call claims to carry.
    pub fn request(&self) -> AuthorizationRequest {
        AuthorizationRequest::new(self.target, self.data.clone(), self.nonce)
    }
}

/// Result of the forwarded call made by a proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Bytes,
}

/// A transaction the relayer originates from its fee-paying credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Create a new `UserProxy` bound to `owner`.
    Deploy { owner: Address },
    /// Call `execute` on an existing proxy.
    Execute { proxy: Address, call: ExecuteCall },
}

/// A transaction signed under a relayer sequence, not yet sent.
///
/// The hash is final once signed, so callers can persist it before the
/// transaction reaches the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSubmission {
    pub submission: Submission,
    pub sequence: u64,
    pub tx_hash: TxHash,
    /// Address the contract will occupy, for deployments.
    pub contract_address: Option<Address>,
    /// EIP-2718 encoding, empty for ledgers that do not need one.
    pub raw: Bytes,
}

/// A transaction accepted by the ledger's mempool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    pub tx_hash: TxHash,
    /// Address the contract will occupy, for deployments.
    pub contract_address: Option<Address>,
}

/// Backend-neutral view of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    /// Whether the outer transaction succeeded (did not revert).
    pub success: bool,
    pub contract_address: Option<Address>,
    /// Outcome of the call forwarded by the proxy, when `execute` ran.
    pub forwarded: Option<ExecutionResult>,
    /// Why the proxy rejected the transaction, when it reverted with one of
    /// its own errors.
    pub revert_reason: Option<ProxyError>,
}

/// Rejections raised by the proxy contract itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error("signature is malformed or does not recover")]
    InvalidSignature,

    #[error("signer {signer} is not the proxy owner")]
    Unauthorized { signer: Address },

    #[error("stale nonce: proxy expects {expected}, request carries {provided}")]
    StaleNonce { expected: U256, provided: U256 },

    #[error("proxy owner must be a non-zero address")]
    InvalidOwner,
}

/// Errors from a ledger backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("proxy rejected the call: {0}")]
    Proxy(#[from] ProxyError),

    #[error("no contract deployed at {0}")]
    NoContract(Address),

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("transaction rejected by the ledger: {0}")]
    Rejected(String),

    #[error("ledger transport error: {0}")]
    Transport(String),
}

/// Operations the relay submitter needs from a ledger.
///
/// Implementations must not assign sequence numbers on their own: the caller
/// supplies the relayer account's sequence for every broadcast.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Chain id used in the EIP-712 domain.
    fn chain_id(&self) -> u64;

    /// Address of the fee-paying credential.
    fn relayer_address(&self) -> Address;

    async fn block_number(&self) -> Result<u64, LedgerError>;

    async fn has_code(&self, address: Address) -> Result<bool, LedgerError>;

    async fn proxy_nonce(&self, proxy: Address) -> Result<U256, LedgerError>;

    async fn proxy_owner(&self, proxy: Address) -> Result<Address, LedgerError>;

    /// Dry-run `execute` against current state; rejects what the proxy would reject.
    async fn preflight_execute(
        &self,
        proxy: Address,
        call: &ExecuteCall,
    ) -> Result<(), LedgerError>;

    /// Next sequence number of the relayer account, including pending transactions.
    async fn pending_sequence(&self) -> Result<u64, LedgerError>;

    /// Sign `submission` under `sequence` without sending it.
    async fn sign(
        &self,
        submission: &Submission,
        sequence: u64,
    ) -> Result<SignedSubmission, LedgerError>;

    /// Hand a signed transaction to the ledger.
    async fn send(&self, signed: &SignedSubmission) -> Result<Broadcast, LedgerError>;

    async fn broadcast(
        &self,
        submission: &Submission,
        sequence: u64,
    ) -> Result<Broadcast, LedgerError> {
        let signed = self.sign(submission, sequence).await?;
        self.send(&signed).await
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<LedgerReceipt>, LedgerError>;

    /// Whether the ledger has seen `tx_hash`, mined or still in its mempool.
    async fn knows_transaction(&self, tx_hash: TxHash) -> Result<bool, LedgerError>;
}
