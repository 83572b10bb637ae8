// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger.
//!
//! Hosts [`ProxyAccount`]s and plain call targets behind the same
//! [`LedgerBackend`] interface the RPC ledger implements. Used for
//! `LEDGER_MODE=local` and by the test suite.
//!
//! Transactions are sequenced by the relayer account's nonce exactly like an
//! EVM mempool: a broadcast with the wrong sequence is rejected. By default
//! each broadcast is mined into its own block immediately; with auto-mining
//! off, transactions wait in the mempool until [`LocalLedger::mine`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use tracing::debug;

use super::{
    account::ProxyAccount, Broadcast, ExecuteCall, LedgerBackend, LedgerError, LedgerReceipt,
    SignedSubmission, Submission,
};
use crate::codec::ProxyDomain;

/// Gas charged per mined transaction; only reported, never enforced.
const FLAT_GAS: u64 = 21_000;

/// A contract that can receive forwarded calls.
///
/// `Ok` carries return data, `Err` carries revert data.
pub trait CallTarget: Send {
    fn call(&mut self, sender: Address, data: &Bytes) -> Result<Bytes, Bytes>;
}

struct ChainState {
    block_number: u64,
    next_sequence: u64,
    auto_mine: bool,
    fail_next_broadcast: Option<String>,
    mempool: Vec<SignedSubmission>,
    proxies: HashMap<Address, ProxyAccount>,
    targets: HashMap<Address, Box<dyn CallTarget>>,
    receipts: HashMap<TxHash, LedgerReceipt>,
}

/// Ledger state held in memory.
pub struct LocalLedger {
    chain_id: u64,
    relayer: Address,
    state: Mutex<ChainState>,
}

impl LocalLedger {
    pub fn new(chain_id: u64, relayer: Address) -> Self {
        Self {
            chain_id,
            relayer,
            state: Mutex::new(ChainState {
                block_number: 0,
                next_sequence: 0,
                auto_mine: true,
                fail_next_broadcast: None,
                mempool: Vec::new(),
                proxies: HashMap::new(),
                targets: HashMap::new(),
                receipts: HashMap::new(),
            }),
        }
    }

    /// Install a call target at `address`.
    pub fn with_target(self, address: Address, target: impl CallTarget + 'static) -> Self {
        self.lock().targets.insert(address, Box::new(target));
        self
    }

    /// Toggle immediate mining of broadcasts.
    pub fn set_auto_mine(&self, enabled: bool) {
        self.lock().auto_mine = enabled;
    }

    /// Reject the next broadcast with `reason`, as a node would on a transport fault.
    pub fn fail_next_broadcast(&self, reason: impl Into<String>) {
        self.lock().fail_next_broadcast = Some(reason.into());
    }

    /// Mine every transaction waiting in the mempool into one block.
    pub fn mine(&self) -> usize {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.mempool);
        if pending.is_empty() {
            return 0;
        }
        state.block_number += 1;
        let count = pending.len();
        for tx in pending {
            apply(&mut state, self.chain_id, tx);
        }
        count
    }

    pub fn mempool_len(&self) -> usize {
        self.lock().mempool.len()
    }

    /// Call a target directly (a read, or a call from an externally-owned account).
    pub fn call(&self, from: Address, target: Address, data: &Bytes) -> Result<Bytes, Bytes> {
        let mut state = self.lock();
        match state.targets.get_mut(&target) {
            Some(contract) => contract.call(from, data),
            None => Ok(Bytes::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hash over sender, sequence, chain and payload, so two different
    /// transactions signed under one sequence never share a hash.
    fn tx_hash(&self, submission: &Submission, sequence: u64) -> TxHash {
        let mut preimage = Vec::with_capacity(128);
        preimage.extend_from_slice(self.relayer.as_slice());
        preimage.extend_from_slice(&sequence.to_be_bytes());
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        match submission {
            Submission::Deploy { owner } => {
                preimage.push(0);
                preimage.extend_from_slice(owner.as_slice());
            }
            Submission::Execute { proxy, call } => {
                preimage.push(1);
                preimage.extend_from_slice(proxy.as_slice());
                preimage.extend_from_slice(call.target.as_slice());
                preimage.extend_from_slice(&call.nonce.to_be_bytes::<32>());
                preimage.extend_from_slice(&call.signature.to_bytes());
                preimage.extend_from_slice(&call.data);
            }
        }
        keccak256(preimage)
    }
}

fn apply(state: &mut ChainState, chain_id: u64, tx: SignedSubmission) {
    let ChainState {
        block_number,
        proxies,
        targets,
        receipts,
        ..
    } = state;

    let mut receipt = LedgerReceipt {
        tx_hash: tx.tx_hash,
        block_number: *block_number,
        gas_used: FLAT_GAS,
        success: false,
        contract_address: None,
        forwarded: None,
        revert_reason: None,
    };

    match &tx.submission {
        Submission::Deploy { owner } => {
            let address = tx.contract_address.unwrap_or_default();
            match ProxyAccount::new(ProxyDomain::new(chain_id, address), *owner) {
                Ok(account) => {
                    proxies.insert(address, account);
                    receipt.success = true;
                    receipt.contract_address = Some(address);
                }
                Err(e) => receipt.revert_reason = Some(e),
            }
        }
        Submission::Execute { proxy, call } => {
            if let Some(account) = proxies.get_mut(proxy) {
                let result = account.execute(call, |sender, target, data| {
                    match targets.get_mut(&target) {
                        Some(contract) => contract.call(sender, data),
                        None => Ok(Bytes::new()),
                    }
                });
                match result {
                    Ok(result) => {
                        receipt.success = true;
                        receipt.forwarded = Some(result);
                    }
                    Err(e) => receipt.revert_reason = Some(e),
                }
            }
        }
    }

    debug!(
        tx_hash = %tx.tx_hash,
        block = *block_number,
        success = receipt.success,
        "Mined local transaction"
    );
    receipts.insert(tx.tx_hash, receipt);
}

#[async_trait]
impl LedgerBackend for LocalLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn relayer_address(&self) -> Address {
        self.relayer
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.lock().block_number)
    }

    async fn has_code(&self, address: Address) -> Result<bool, LedgerError> {
        let state = self.lock();
        Ok(state.proxies.contains_key(&address) || state.targets.contains_key(&address))
    }

    async fn proxy_nonce(&self, proxy: Address) -> Result<U256, LedgerError> {
        self.lock()
            .proxies
            .get(&proxy)
            .map(ProxyAccount::nonce)
            .ok_or(LedgerError::NoContract(proxy))
    }

    async fn proxy_owner(&self, proxy: Address) -> Result<Address, LedgerError> {
        self.lock()
            .proxies
            .get(&proxy)
            .map(ProxyAccount::owner)
            .ok_or(LedgerError::NoContract(proxy))
    }

    async fn preflight_execute(
        &self,
        proxy: Address,
        call: &ExecuteCall,
    ) -> Result<(), LedgerError> {
        let state = self.lock();
        let account = state.proxies.get(&proxy).ok_or(LedgerError::NoContract(proxy))?;
        account.authorize(call)?;
        Ok(())
    }

    async fn pending_sequence(&self) -> Result<u64, LedgerError> {
        Ok(self.lock().next_sequence)
    }

    async fn sign(
        &self,
        submission: &Submission,
        sequence: u64,
    ) -> Result<SignedSubmission, LedgerError> {
        let contract_address = match submission {
            Submission::Deploy { .. } => Some(self.relayer.create(sequence)),
            Submission::Execute { .. } => None,
        };
        Ok(SignedSubmission {
            submission: submission.clone(),
            sequence,
            tx_hash: self.tx_hash(submission, sequence),
            contract_address,
            raw: Bytes::new(),
        })
    }

    async fn send(&self, signed: &SignedSubmission) -> Result<Broadcast, LedgerError> {
        let mut state = self.lock();

        if let Some(reason) = state.fail_next_broadcast.take() {
            return Err(LedgerError::Transport(reason));
        }
        if signed.sequence != state.next_sequence {
            let kind = if signed.sequence < state.next_sequence {
                "too low"
            } else {
                "too high"
            };
            return Err(LedgerError::Rejected(format!(
                "nonce {kind}: account expects {}, got {}",
                state.next_sequence, signed.sequence
            )));
        }
        state.next_sequence += 1;

        if state.auto_mine {
            state.block_number += 1;
            apply(&mut state, self.chain_id, signed.clone());
        } else {
            state.mempool.push(signed.clone());
        }

        Ok(Broadcast {
            tx_hash: signed.tx_hash,
            contract_address: signed.contract_address,
        })
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<LedgerReceipt>, LedgerError> {
        Ok(self.lock().receipts.get(&tx_hash).cloned())
    }

    async fn knows_transaction(&self, tx_hash: TxHash) -> Result<bool, LedgerError> {
        let state = self.lock();
        Ok(state.receipts.contains_key(&tx_hash)
            || state.mempool.iter().any(|tx| tx.tx_hash == tx_hash))
    }
}
