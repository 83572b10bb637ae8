// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay errors.

use alloy::primitives::{Address, TxHash, U256};

use crate::ledger::ProxyError;
use crate::storage::TxDbError;

/// What a caller may do after a failed relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Nothing was consumed; the same signed request may be submitted again.
    RetrySameSignature,
    /// Read the current nonce and sign a fresh request.
    ReSign,
    /// The signer is not allowed to act on this proxy.
    ReAuthorize,
    /// Retrying will not help.
    None,
}

impl RetryHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryHint::RetrySameSignature => "retry_same_signature",
            RetryHint::ReSign => "re_sign",
            RetryHint::ReAuthorize => "re_authorize",
            RetryHint::None => "none",
        }
    }
}

/// Errors reported by the relay submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Signature is malformed or does not recover to an identity")]
    InvalidSignature,

    #[error("Signer {signer} is not the owner of this proxy")]
    Unauthorized { signer: Address },

    #[error("Stale nonce: proxy expects {expected}, request carries {provided}")]
    StaleNonce { expected: U256, provided: U256 },

    #[error("Execution reverted{}: {reason}", tx_suffix(.tx_hash))]
    ExecutionReverted {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    #[error("Failed to submit transaction: {0}")]
    SubmissionFailed(String),

    #[error("Proxy deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

fn tx_suffix(tx_hash: &Option<TxHash>) -> String {
    match tx_hash {
        Some(hash) => format!(" in {hash}"),
        None => String::new(),
    }
}

impl RelayError {
    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::InvalidSignature => "invalid_signature",
            RelayError::Unauthorized { .. } => "unauthorized",
            RelayError::StaleNonce { .. } => "stale_nonce",
            RelayError::ExecutionReverted { .. } => "execution_reverted",
            RelayError::SubmissionFailed(_) => "submission_failed",
            RelayError::DeploymentFailed(_) => "deployment_failed",
            RelayError::NotFound(_) => "not_found",
            RelayError::Unavailable(_) => "ledger_unavailable",
            RelayError::Storage(_) => "storage_error",
        }
    }

    pub fn retry_hint(&self) -> RetryHint {
        match self {
            RelayError::SubmissionFailed(_)
            | RelayError::Unavailable(_)
            | RelayError::Storage(_) => RetryHint::RetrySameSignature,
            RelayError::StaleNonce { .. } | RelayError::ExecutionReverted { .. } => {
                RetryHint::ReSign
            }
            RelayError::Unauthorized { .. } | RelayError::InvalidSignature => {
                RetryHint::ReAuthorize
            }
            RelayError::DeploymentFailed(_) | RelayError::NotFound(_) => RetryHint::None,
        }
    }
}

impl From<ProxyError> for RelayError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::InvalidSignature => RelayError::InvalidSignature,
            ProxyError::Unauthorized { signer } => RelayError::Unauthorized { signer },
            ProxyError::StaleNonce { expected, provided } => {
                RelayError::StaleNonce { expected, provided }
            }
            ProxyError::InvalidOwner => RelayError::DeploymentFailed(err.to_string()),
        }
    }
}

impl From<TxDbError> for RelayError {
    fn from(err: TxDbError) -> Self {
        RelayError::Storage(err.to_string())
    }
}
