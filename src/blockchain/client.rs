// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC ledger: the relayer's view of a real EVM chain.

use alloy::{
    eips::{eip2718::Encodable2718, BlockId},
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    sol_types::{SolCall, SolEvent},
    transports::{RpcError, TransportErrorKind},
};
use async_trait::async_trait;

use super::types::{network_for_chain, NetworkConfig, DEVNET};
use super::user_proxy::{decode_revert, IUserProxy, ProxyArtifact};
use crate::ledger::{
    Broadcast, ExecuteCall, ExecutionResult, LedgerBackend, LedgerError, LedgerReceipt, ProxyError,
    SignedSubmission, Submission,
};

/// Client for an EVM chain reached over HTTP JSON-RPC.
///
/// Transactions are signed locally with the relayer credential, so their hash
/// is known before they are sent. Gas and fees are estimated by the node; the
/// sequence number is always supplied by the caller.
pub struct EvmClient {
    /// Network configuration
    network: NetworkConfig,
    /// Chain ID reported by the node
    chain_id: u64,
    /// Fee-paying account
    relayer: Address,
    /// Alloy HTTP provider
    provider: DynProvider,
    /// Relayer credential
    wallet: EthereumWallet,
    /// UserProxy creation code
    artifact: ProxyArtifact,
}

impl EvmClient {
    /// Connect to `rpc_url` and sign with `signer`.
    pub async fn connect(
        rpc_url: &str,
        signer: PrivateKeySigner,
        artifact: ProxyArtifact,
    ) -> Result<Self, EvmClientError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| EvmClientError::InvalidRpcUrl(e.to_string()))?;

        let relayer = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().connect_http(url).erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| EvmClientError::RpcError(e.to_string()))?;
        let network = network_for_chain(chain_id).unwrap_or(NetworkConfig {
            chain_id,
            ..DEVNET
        });

        tracing::info!(
            chain_id,
            network = network.name,
            relayer = %relayer,
            "Connected to RPC ledger"
        );

        Ok(Self {
            network,
            chain_id,
            relayer,
            provider,
            wallet,
            artifact,
        })
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn proxy(&self, address: Address) -> IUserProxy::IUserProxyInstance<DynProvider> {
        IUserProxy::new(address, self.provider.clone())
    }

    fn transaction(&self, submission: &Submission) -> TransactionRequest {
        match submission {
            Submission::Deploy { owner } => {
                TransactionRequest::default().with_deploy_code(self.artifact.deploy_code(*owner))
            }
            Submission::Execute { proxy, call } => {
                let input = IUserProxy::executeCall {
                    target: call.target,
                    data: call.data.clone(),
                    nonce: call.nonce,
                    v: call.signature.v,
                    r: call.signature.r,
                    s: call.signature.s,
                }
                .abi_encode();
                TransactionRequest::default().with_to(*proxy).with_input(input)
            }
        }
    }

    /// Re-run a reverted `execute` against the state of its block to learn
    /// which proxy error it hit.
    async fn replay_revert(&self, receipt: &TransactionReceipt) -> Option<ProxyError> {
        let proxy = receipt.to?;
        let tx = self
            .provider
            .get_transaction_by_hash(receipt.transaction_hash)
            .await
            .ok()??
            .into_request();
        let replay = TransactionRequest {
            from: Some(self.relayer),
            to: tx.to,
            input: tx.input,
            ..Default::default()
        };
        let block = receipt.block_number?;

        match self.provider.call(replay).block(BlockId::number(block)).await {
            Ok(_) => None,
            Err(err) => match rpc_error(err) {
                LedgerError::Proxy(reason) => {
                    tracing::debug!(proxy = %proxy, reason = %reason, "Decoded proxy revert");
                    Some(reason)
                }
                _ => None,
            },
        }
    }

    async fn require_code(&self, address: Address) -> Result<(), LedgerError> {
        if self.has_code(address).await? {
            Ok(())
        } else {
            Err(LedgerError::NoContract(address))
        }
    }
}

/// Map a failed `eth_call` onto the ledger taxonomy.
fn contract_error(err: alloy::contract::Error) -> LedgerError {
    match err.as_revert_data() {
        Some(data) => match decode_revert(&data) {
            Some(proxy) => LedgerError::Proxy(proxy),
            None => LedgerError::Reverted(alloy::hex::encode_prefixed(&data)),
        },
        None => LedgerError::Transport(err.to_string()),
    }
}

/// Map a failed RPC request. Node-side rejections (error responses) are
/// distinguished from transport faults; revert data from gas estimation is
/// decoded like an `eth_call` revert.
fn rpc_error(err: RpcError<TransportErrorKind>) -> LedgerError {
    match err.as_error_resp() {
        Some(payload) => match payload.as_revert_data() {
            Some(data) => match decode_revert(&data) {
                Some(proxy) => LedgerError::Proxy(proxy),
                None => LedgerError::Reverted(payload.message.to_string()),
            },
            None => LedgerError::Rejected(payload.message.to_string()),
        },
        None => LedgerError::Transport(err.to_string()),
    }
}

fn to_ledger_receipt(
    receipt: TransactionReceipt,
    revert_reason: Option<ProxyError>,
) -> LedgerReceipt {
    let forwarded = receipt
        .inner
        .logs()
        .iter()
        .filter(|log| Some(log.inner.address) == receipt.to)
        .find_map(|log| IUserProxy::Executed::decode_log_data(&log.inner.data).ok())
        .map(|event| ExecutionResult {
            success: event.success,
            output: event.result,
        });

    LedgerReceipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number.unwrap_or(0),
        gas_used: receipt.gas_used,
        success: receipt.status(),
        contract_address: receipt.contract_address,
        forwarded,
        revert_reason,
    }
}

#[async_trait]
impl LedgerBackend for EvmClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn relayer_address(&self) -> Address {
        self.relayer
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.provider.get_block_number().await.map_err(rpc_error)
    }

    async fn has_code(&self, address: Address) -> Result<bool, LedgerError> {
        let code = self.provider.get_code_at(address).await.map_err(rpc_error)?;
        Ok(!code.is_empty())
    }

    async fn proxy_nonce(&self, proxy: Address) -> Result<U256, LedgerError> {
        self.require_code(proxy).await?;
        self.proxy(proxy).nonce().call().await.map_err(contract_error)
    }

    async fn proxy_owner(&self, proxy: Address) -> Result<Address, LedgerError> {
        self.require_code(proxy).await?;
        self.proxy(proxy).owner().call().await.map_err(contract_error)
    }

    async fn preflight_execute(
        &self,
        proxy: Address,
        call: &ExecuteCall,
    ) -> Result<(), LedgerError> {
        self.require_code(proxy).await?;
        let sig = call.signature;
        self.proxy(proxy)
            .execute(call.target, call.data.clone(), call.nonce, sig.v, sig.r, sig.s)
            .from(self.relayer)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(())
    }

    async fn pending_sequence(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_transaction_count(self.relayer)
            .pending()
            .await
            .map_err(rpc_error)
    }

    async fn sign(
        &self,
        submission: &Submission,
        sequence: u64,
    ) -> Result<SignedSubmission, LedgerError> {
        let tx = self
            .transaction(submission)
            .with_from(self.relayer)
            .with_nonce(sequence)
            .with_chain_id(self.chain_id);

        let gas = self.provider.estimate_gas(tx.clone()).await.map_err(rpc_error)?;
        let fees = self.provider.estimate_eip1559_fees().await.map_err(rpc_error)?;
        let envelope = tx
            .with_gas_limit(gas)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
            .build(&self.wallet)
            .await
            .map_err(|e| LedgerError::Rejected(format!("cannot sign transaction: {e}")))?;

        let contract_address = match submission {
            Submission::Deploy { .. } => Some(self.relayer.create(sequence)),
            Submission::Execute { .. } => None,
        };
        Ok(SignedSubmission {
            submission: submission.clone(),
            sequence,
            tx_hash: *envelope.tx_hash(),
            contract_address,
            raw: envelope.encoded_2718().into(),
        })
    }

    async fn send(&self, signed: &SignedSubmission) -> Result<Broadcast, LedgerError> {
        let pending = self
            .provider
            .send_raw_transaction(&signed.raw)
            .await
            .map_err(rpc_error)?;
        if *pending.tx_hash() != signed.tx_hash {
            tracing::warn!(
                expected = %signed.tx_hash,
                reported = %pending.tx_hash(),
                "Node reported a different transaction hash"
            );
        }
        Ok(Broadcast {
            tx_hash: signed.tx_hash,
            contract_address: signed.contract_address,
        })
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<LedgerReceipt>, LedgerError> {
        let Some(receipt) = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)?
        else {
            return Ok(None);
        };
        let revert_reason = if receipt.status() {
            None
        } else {
            self.replay_revert(&receipt).await
        };
        Ok(Some(to_ledger_receipt(receipt, revert_reason)))
    }

    async fn knows_transaction(&self, tx_hash: TxHash) -> Result<bool, LedgerError> {
        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(rpc_error)?;
        Ok(tx.is_some())
    }
}

/// Errors that can occur while setting up the RPC ledger.
#[derive(Debug, thiserror::Error)]
pub enum EvmClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid proxy artifact: {0}")]
    Artifact(String),

    #[error("RPC error: {0}")]
    RpcError(String),
}
