// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Submitter
//!
//! Turns signed authorizations into ledger transactions paid for by the
//! relayer credential, and reports their outcome.
//!
//! ## Flow
//!
//! ```text
//! submit_relay(proxy, target, data, sig[, nonce])
//!   1. proxy has code?              no  -> NotFound
//!   2. nonce given? else find the one the owner signed -> StaleNonce
//!   3. preflight execute (eth_call) -> InvalidSignature | Unauthorized | StaleNonce
//!   4. [sequencer lock] claim sequence, sign, send, release
//!   5. wait for finality (bounded)  -> confirmed | failed | pending
//!      reverted by the proxy        -> StaleNonce | Unauthorized
//! ```
//!
//! Only step 4 is serialized. A send failure drops the cached sequence so
//! the next submission re-reads it from the ledger.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::blockchain::NetworkConfig;
use crate::codec::{self, AuthorizationRequest, ProxyDomain, RelaySignature};
use crate::ledger::{
    Broadcast, ExecuteCall, LedgerBackend, LedgerError, LedgerReceipt, SignedSubmission,
    Submission,
};
use crate::registry::ProxyRegistry;
use crate::storage::{
    address_key, NonceCache, ProxyBinding, ProxyState, RelayDatabase, RelayKind, RelayRecord,
};

pub mod error;
pub mod outcome;
pub mod poller;

pub use error::{RelayError, RetryHint};
pub use outcome::RelayOutcome;
pub use poller::PendingPoller;

/// How many nonces below the current one a nonce-less request is matched
/// against before it is treated as a foreign signature.
const STALE_NONCE_WINDOW: u64 = 16;

/// How long and how hard to wait for a transaction to become final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalityPolicy {
    /// Give up waiting (report `pending`) after this long.
    pub timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Blocks required, counting the inclusion block.
    pub confirmations: u64,
}

impl Default for FinalityPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            confirmations: 1,
        }
    }
}

/// A signed authorization to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub proxy: Address,
    pub target: Address,
    pub data: Bytes,
    pub signature: RelaySignature,
    /// Nonce the signer used; read from the proxy when absent.
    pub nonce: Option<U256>,
}

/// Relay service holding the single fee-paying credential.
pub struct RelaySubmitter {
    ledger: Arc<dyn LedgerBackend>,
    db: Arc<RelayDatabase>,
    registry: ProxyRegistry,
    nonces: NonceCache,
    /// Next relayer sequence number; `None` until read from the ledger.
    sequencer: Mutex<Option<u64>>,
    finality: FinalityPolicy,
    network: NetworkConfig,
}

impl RelaySubmitter {
    pub fn new(
        ledger: Arc<dyn LedgerBackend>,
        db: Arc<RelayDatabase>,
        nonces: NonceCache,
        finality: FinalityPolicy,
        network: NetworkConfig,
    ) -> Self {
        Self {
            registry: ProxyRegistry::new(db.clone()),
            ledger,
            db,
            nonces,
            sequencer: Mutex::new(None),
            finality,
            network,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerBackend> {
        &self.ledger
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn registry(&self) -> &ProxyRegistry {
        &self.registry
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Deploy a proxy for `owner`, or return the one already bound to it.
    pub async fn submit_deploy(&self, owner: Address) -> Result<RelayOutcome, RelayError> {
        self.registry.deploy(self, owner).await
    }

    /// The proxy bound to `owner`.
    pub fn lookup(&self, owner: &Address) -> Result<ProxyBinding, RelayError> {
        self.registry.lookup(owner)
    }

    /// Relay a signed authorization to its proxy.
    pub async fn submit_relay(&self, request: RelayRequest) -> Result<RelayOutcome, RelayError> {
        let RelayRequest {
            proxy,
            target,
            data,
            signature,
            nonce,
        } = request;

        if !self.ledger.has_code(proxy).await.map_err(read_error)? {
            return Err(RelayError::NotFound(format!("No proxy deployed at {proxy}")));
        }

        let nonce = match nonce {
            Some(nonce) => nonce,
            None => self.resolve_nonce(proxy, target, &data, &signature).await?,
        };

        let call = ExecuteCall {
            target,
            data,
            nonce,
            signature,
        };
        self.ledger
            .preflight_execute(proxy, &call)
            .await
            .map_err(read_error)?;

        let (sent, sequence) = self
            .broadcast(&Submission::Execute { proxy, call })
            .await
            .map_err(broadcast_error)?;
        self.nonces.invalidate(&proxy);

        info!(
            tx_hash = %sent.tx_hash,
            proxy = %proxy,
            target = %target,
            nonce = %nonce,
            sequence,
            "Relayed execute"
        );

        let mut record = RelayRecord::new_pending(
            sent.tx_hash.to_string(),
            RelayKind::Execute,
            address_key(&proxy),
            sequence,
        );
        record.target = Some(address_key(&target));
        record.nonce = Some(nonce.to_string());
        record.explorer_url = self.network.tx_url(&sent.tx_hash);
        self.store_relay(&record);

        let outcome = RelayOutcome::pending(sent.tx_hash)
            .with_explorer_url(self.network.tx_url(&sent.tx_hash));

        let Some(receipt) = self.wait_for_finality(sent.tx_hash).await else {
            info!(tx_hash = %sent.tx_hash, "Relay still pending after finality timeout");
            return Ok(outcome);
        };

        self.nonces.invalidate(&proxy);
        match self.record_settlement(&receipt) {
            Ok(()) => Ok(outcome.confirmed_at(receipt.block_number)),
            Err(reason) => match receipt.revert_reason {
                // Lost a race to another request for the same nonce.
                Some(rejection) => {
                    info!(tx_hash = %sent.tx_hash, reason = %rejection, "Proxy rejected relay");
                    Err(rejection.into())
                }
                None => Err(RelayError::ExecutionReverted {
                    tx_hash: Some(sent.tx_hash),
                    reason,
                }),
            },
        }
    }

    /// The nonce a request without one was signed for.
    ///
    /// The signature is tried at the proxy's current nonce first, then at the
    /// nonces just below it. A match below is a replay and is rejected as
    /// stale. With no match the current nonce is returned and preflight
    /// reports the rejection.
    async fn resolve_nonce(
        &self,
        proxy: Address,
        target: Address,
        data: &Bytes,
        signature: &RelaySignature,
    ) -> Result<U256, RelayError> {
        let current = self.ledger.proxy_nonce(proxy).await.map_err(read_error)?;
        let owner = self.ledger.proxy_owner(proxy).await.map_err(read_error)?;
        let domain = ProxyDomain::new(self.ledger.chain_id(), proxy);

        let signed_by_owner = |nonce: U256| {
            let request = AuthorizationRequest::new(target, data.clone(), nonce);
            codec::recover_request_signer(&request, &domain, signature)
                .is_ok_and(|signer| signer == owner)
        };

        if signed_by_owner(current) {
            return Ok(current);
        }
        let floor = current.saturating_sub(U256::from(STALE_NONCE_WINDOW));
        let mut earlier = current;
        while earlier > floor {
            earlier -= U256::from(1);
            if signed_by_owner(earlier) {
                return Err(RelayError::StaleNonce {
                    expected: current,
                    provided: earlier,
                });
            }
        }
        Ok(current)
    }

    /// Owner and nonce of a proxy, served from the nonce cache when fresh.
    pub async fn proxy_state(&self, proxy: Address) -> Result<ProxyState, RelayError> {
        if let Some(state) = self.nonces.get(&proxy) {
            return Ok(state);
        }
        let owner = self.ledger.proxy_owner(proxy).await.map_err(read_error)?;
        let nonce = self.ledger.proxy_nonce(proxy).await.map_err(read_error)?;
        let state = ProxyState { owner, nonce };
        self.nonces.put(proxy, state);
        Ok(state)
    }

    /// Stored record of a relayed transaction.
    pub fn relay_record(&self, tx_hash: &TxHash) -> Result<RelayRecord, RelayError> {
        self.db
            .get_relay(&tx_hash.to_string())?
            .ok_or_else(|| RelayError::NotFound(format!("No relay recorded for {tx_hash}")))
    }

    /// Number of owners whose proxy deployment has not settled yet.
    pub fn pending_deployments(&self) -> Result<usize, RelayError> {
        Ok(self.db.pending_bindings()?.len())
    }

    // =========================================================================
    // Submission plumbing
    // =========================================================================

    /// Take the sequencer lock and claim the next relayer sequence number.
    ///
    /// The lock is held until the slot is sent or dropped, never while
    /// waiting for finality.
    pub(crate) async fn claim_sequence(&self) -> Result<SequenceSlot<'_>, LedgerError> {
        let next = self.sequencer.lock().await;
        let sequence = match *next {
            Some(sequence) => sequence,
            None => self.ledger.pending_sequence().await?,
        };
        Ok(SequenceSlot {
            next,
            sequence,
            ledger: self.ledger.as_ref(),
        })
    }

    /// Claim a sequence number and broadcast `submission` under it.
    pub(crate) async fn broadcast(
        &self,
        submission: &Submission,
    ) -> Result<(Broadcast, u64), LedgerError> {
        let slot = self.claim_sequence().await?;
        let sequence = slot.sequence();
        let signed = slot.sign(submission).await?;
        let sent = slot.send(&signed).await?;
        Ok((sent, sequence))
    }

    /// Poll for a final receipt until the finality timeout.
    ///
    /// `None` means the transaction is still pending; it stays in the relay
    /// database for the [`PendingPoller`].
    pub(crate) async fn wait_for_finality(&self, tx_hash: TxHash) -> Option<LedgerReceipt> {
        let deadline = Instant::now() + self.finality.timeout;

        loop {
            match self.ledger.receipt(tx_hash).await {
                Ok(Some(receipt)) if self.is_final(&receipt).await => return Some(receipt),
                Ok(_) => {}
                Err(e) => debug!(tx_hash = %tx_hash, error = %e, "Receipt poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(self.finality.poll_interval.min(deadline - now)).await;
        }
    }

    pub(crate) async fn is_final(&self, receipt: &LedgerReceipt) -> bool {
        if self.finality.confirmations <= 1 {
            return true;
        }
        match self.ledger.block_number().await {
            Ok(head) => head + 1 >= receipt.block_number + self.finality.confirmations,
            Err(_) => false,
        }
    }

    pub(crate) fn store_relay(&self, record: &RelayRecord) {
        if let Err(e) = self.db.upsert_relay(record) {
            warn!(tx_hash = %record.tx_hash, error = %e, "Failed to persist relay record");
        }
    }

    /// Write the receipt's verdict to the relay record and return it.
    ///
    /// `Err` carries the failure reason: the transaction reverted, or the
    /// proxy's forwarded call failed.
    pub(crate) fn record_settlement(&self, receipt: &LedgerReceipt) -> Result<(), String> {
        let verdict = verdict(receipt);
        let key = receipt.tx_hash.to_string();
        let stored = self.db.update_relay(&key, |record| match &verdict {
            Ok(()) => record.mark_confirmed(receipt.block_number, receipt.gas_used),
            Err(reason) => record.mark_failed(Some(receipt.block_number), reason.clone()),
        });
        if let Err(e) = stored {
            warn!(tx_hash = %key, error = %e, "Failed to update relay record");
        }
        verdict
    }

    /// Resolve pending relay records and proxy bindings whose receipts have
    /// arrived.
    ///
    /// Returns the number of records and bindings settled.
    pub async fn reconcile_pending(&self) -> Result<usize, RelayError> {
        let pending = self.db.pending_relays()?;
        let mut settled = 0;

        for record in pending {
            let Ok(tx_hash) = record.tx_hash.parse::<TxHash>() else {
                warn!(tx_hash = %record.tx_hash, "Skipping relay record with malformed hash");
                continue;
            };
            let receipt = match self.ledger.receipt(tx_hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => continue,
                Err(e) => {
                    debug!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                    continue;
                }
            };
            if !self.is_final(&receipt).await {
                continue;
            }

            let verdict = self.record_settlement(&receipt);
            match record.kind {
                RelayKind::Execute => {
                    if let Ok(proxy) = record.proxy.parse::<Address>() {
                        self.nonces.invalidate(&proxy);
                    }
                }
                RelayKind::Deploy => {
                    if let Some(owner) = record.owner.as_deref().and_then(|o| o.parse().ok()) {
                        self.registry.settle_binding(&owner, verdict.is_ok())?;
                    }
                }
            }

            info!(
                tx_hash = %tx_hash,
                kind = ?record.kind,
                success = verdict.is_ok(),
                "Settled pending relay"
            );
            settled += 1;
        }

        Ok(settled + self.registry.reconcile(self).await?)
    }
}

/// A relayer sequence number held under the sequencer lock.
///
/// Dropping an unsent slot releases the lock and leaves the number for the
/// next claim.
pub(crate) struct SequenceSlot<'a> {
    next: MutexGuard<'a, Option<u64>>,
    sequence: u64,
    ledger: &'a dyn LedgerBackend,
}

impl SequenceSlot<'_> {
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) async fn sign(
        &self,
        submission: &Submission,
    ) -> Result<SignedSubmission, LedgerError> {
        self.ledger.sign(submission, self.sequence).await
    }

    /// Send `signed` and advance the sequencer past it.
    pub(crate) async fn send(
        mut self,
        signed: &SignedSubmission,
    ) -> Result<Broadcast, LedgerError> {
        match self.ledger.send(signed).await {
            Ok(sent) => {
                *self.next = Some(self.sequence + 1);
                Ok(sent)
            }
            Err(err) => {
                *self.next = None;
                warn!(
                    sequence = self.sequence,
                    error = %err,
                    "Broadcast failed, relayer sequence will be re-read"
                );
                Err(err)
            }
        }
    }
}

pub(crate) fn verdict(receipt: &LedgerReceipt) -> Result<(), String> {
    if !receipt.success {
        return Err(match &receipt.revert_reason {
            Some(reason) => reason.to_string(),
            None => "transaction reverted".to_string(),
        });
    }
    match &receipt.forwarded {
        Some(forwarded) if !forwarded.success => Err(format!(
            "forwarded call failed: {}",
            alloy::hex::encode_prefixed(&forwarded.output)
        )),
        _ => Ok(()),
    }
}

/// Map a ledger error raised before anything was broadcast.
fn read_error(err: LedgerError) -> RelayError {
    match err {
        LedgerError::Proxy(proxy) => proxy.into(),
        LedgerError::NoContract(address) => {
            RelayError::NotFound(format!("No proxy deployed at {address}"))
        }
        LedgerError::Reverted(reason) => RelayError::ExecutionReverted {
            tx_hash: None,
            reason,
        },
        LedgerError::Rejected(reason) | LedgerError::Transport(reason) => {
            RelayError::Unavailable(reason)
        }
    }
}

/// Map a ledger error raised while broadcasting.
fn broadcast_error(err: LedgerError) -> RelayError {
    match err {
        LedgerError::Rejected(reason) | LedgerError::Transport(reason) => {
            RelayError::SubmissionFailed(reason)
        }
        other => read_error(other),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blockchain::DEVNET;
    use crate::codec::signing_hash;
    use crate::ledger::{FaucetToken, LocalLedger};
    use crate::ledger::faucet::SEPOLIA_FAUCET_TOKEN;
    use crate::storage::{BindingStatus, RelayStatus};
    use alloy::signers::{local::PrivateKeySigner, SignerSync};

    pub(crate) struct Harness {
        pub ledger: Arc<LocalLedger>,
        pub db: Arc<RelayDatabase>,
        pub submitter: Arc<RelaySubmitter>,
        _dir: tempfile::TempDir,
    }

    pub(crate) fn harness_with(finality: FinalityPolicy) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(RelayDatabase::open(&dir.path().join("relayer.redb")).unwrap());
        let ledger = Arc::new(
            LocalLedger::new(DEVNET.chain_id, Address::repeat_byte(0xee))
                .with_target(SEPOLIA_FAUCET_TOKEN, FaucetToken::new()),
        );
        let submitter = Arc::new(RelaySubmitter::new(
            ledger.clone(),
            db.clone(),
            NonceCache::new(16, Duration::from_secs(60)),
            finality,
            DEVNET,
        ));
        Harness {
            ledger,
            db,
            submitter,
            _dir: dir,
        }
    }

    pub(crate) fn harness() -> Harness {
        harness_with(FinalityPolicy {
            timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(5),
            confirmations: 1,
        })
    }

    pub(crate) fn signed_request(
        owner: &PrivateKeySigner,
        proxy: Address,
        data: Bytes,
        nonce: u64,
    ) -> RelayRequest {
        let request = AuthorizationRequest::new(SEPOLIA_FAUCET_TOKEN, data, U256::from(nonce));
        let domain = ProxyDomain::new(DEVNET.chain_id, proxy);
        let signature: RelaySignature = owner
            .sign_hash_sync(&signing_hash(&request, &domain))
            .unwrap()
            .into();
        RelayRequest {
            proxy,
            target: request.target,
            data: request.data,
            signature,
            nonce: Some(request.nonce),
        }
    }

    async fn deployed(h: &Harness, owner: &PrivateKeySigner) -> Address {
        let outcome = h.submitter.submit_deploy(owner.address()).await.unwrap();
        assert_eq!(outcome.status, RelayStatus::Confirmed);
        outcome.contract_address.unwrap()
    }

    #[tokio::test]
    async fn relay_executes_once_and_replay_is_stale() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        let outcome = h.submitter.submit_relay(request.clone()).await.unwrap();
        assert_eq!(outcome.status, RelayStatus::Confirmed);
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));

        assert_eq!(
            h.submitter.submit_relay(request).await,
            Err(RelayError::StaleNonce {
                expected: U256::from(1),
                provided: U256::ZERO
            })
        );
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));

        let record = h.submitter.relay_record(&outcome.transaction_id).unwrap();
        assert_eq!(record.status, RelayStatus::Confirmed);
        assert_eq!(record.nonce.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn foreign_signer_is_unauthorized_and_nothing_is_broadcast() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let intruder = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;
        let sequence_before = h.ledger.pending_sequence().await.unwrap();

        let request = signed_request(&intruder, proxy, FaucetToken::faucet_calldata(), 0);
        assert_eq!(
            h.submitter.submit_relay(request).await,
            Err(RelayError::Unauthorized {
                signer: intruder.address()
            })
        );
        assert_eq!(h.ledger.pending_sequence().await.unwrap(), sequence_before);
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn tampered_calldata_is_rejected() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let mut request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        request.data = FaucetToken::transfer_calldata(Address::repeat_byte(1), U256::from(1));
        assert!(matches!(
            h.submitter.submit_relay(request).await,
            Err(RelayError::Unauthorized { .. } | RelayError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn signature_for_one_proxy_fails_on_another() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let first = deployed(&h, &owner).await;
        let other_owner = PrivateKeySigner::random();
        let second = deployed(&h, &other_owner).await;

        let mut request = signed_request(&owner, first, FaucetToken::faucet_calldata(), 0);
        request.proxy = second;
        assert!(matches!(
            h.submitter.submit_relay(request).await,
            Err(RelayError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn undeployed_proxy_is_not_found() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let nowhere = Address::repeat_byte(0x99);

        let request = signed_request(&owner, nowhere, FaucetToken::faucet_calldata(), 0);
        let err = h.submitter.submit_relay(request).await.unwrap_err();
        assert_eq!(err.error_code(), "not_found");
        assert_eq!(h.ledger.pending_sequence().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_nonce_is_read_from_the_proxy() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let first = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        h.submitter.submit_relay(first).await.unwrap();

        let mut second = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 1);
        second.nonce = None;
        h.submitter.submit_relay(second).await.unwrap();

        // Signed for 0 but the proxy is at 2.
        let mut stale = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        stale.nonce = None;
        assert_eq!(
            h.submitter.submit_relay(stale).await,
            Err(RelayError::StaleNonce {
                expected: U256::from(2),
                provided: U256::ZERO
            })
        );
        assert_eq!(h.ledger.pending_sequence().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn nonceless_replay_is_stale() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let mut request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        request.nonce = None;
        h.submitter.submit_relay(request.clone()).await.unwrap();

        let err = h.submitter.submit_relay(request).await.unwrap_err();
        assert_eq!(err.error_code(), "stale_nonce");
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));
    }

    #[tokio::test]
    async fn nonceless_foreign_signature_stays_unauthorized() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let intruder = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let mut request = signed_request(&intruder, proxy, FaucetToken::faucet_calldata(), 0);
        request.nonce = None;
        assert_eq!(
            h.submitter.submit_relay(request).await,
            Err(RelayError::Unauthorized {
                signer: intruder.address()
            })
        );
    }

    #[tokio::test]
    async fn failed_forwarded_call_consumes_nonce_and_reports_revert() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let overdraft = FaucetToken::transfer_calldata(Address::repeat_byte(1), U256::from(1));
        let request = signed_request(&owner, proxy, overdraft, 0);
        match h.submitter.submit_relay(request).await {
            Err(RelayError::ExecutionReverted {
                tx_hash: Some(tx_hash),
                reason,
            }) => {
                assert!(reason.starts_with("forwarded call failed"));
                let record = h.submitter.relay_record(&tx_hash).unwrap();
                assert_eq!(record.status, RelayStatus::Failed);
            }
            other => panic!("expected ExecutionReverted, got {other:?}"),
        }
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));
    }

    #[tokio::test]
    async fn racing_relays_with_the_same_nonce_execute_once() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let a = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        let b = signed_request(
            &owner,
            proxy,
            FaucetToken::transfer_calldata(Address::repeat_byte(1), U256::ZERO),
            0,
        );
        let (ra, rb) = tokio::join!(h.submitter.submit_relay(a), h.submitter.submit_relay(b));

        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "{ra:?} / {rb:?}");
        let failure = if ra.is_err() { ra } else { rb };
        assert!(matches!(failure, Err(RelayError::StaleNonce { .. })));
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));
    }

    #[tokio::test]
    async fn same_nonce_mined_in_one_block_reports_stale_nonce() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;
        h.ledger.set_auto_mine(false);

        // Both pass preflight; the block decides.
        let a = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        let b = signed_request(
            &owner,
            proxy,
            FaucetToken::transfer_calldata(Address::repeat_byte(1), U256::ZERO),
            0,
        );
        let miner = async {
            while h.ledger.mempool_len() < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            h.ledger.mine();
        };
        let (ra, rb, ()) = tokio::join!(
            h.submitter.submit_relay(a),
            h.submitter.submit_relay(b),
            miner
        );

        let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "{ra:?} / {rb:?}");
        let failure = if ra.is_err() { ra } else { rb };
        assert_eq!(
            failure,
            Err(RelayError::StaleNonce {
                expected: U256::from(1),
                provided: U256::ZERO
            })
        );
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_relays_get_distinct_sequences() {
        let h = harness();
        let mut proxies = Vec::new();
        for _ in 0..4 {
            let owner = PrivateKeySigner::random();
            let proxy = deployed(&h, &owner).await;
            proxies.push((owner, proxy));
        }

        let mut tasks = Vec::new();
        for (owner, proxy) in &proxies {
            let submitter = h.submitter.clone();
            let request = signed_request(owner, *proxy, FaucetToken::faucet_calldata(), 0);
            tasks.push(tokio::spawn(async move { submitter.submit_relay(request).await }));
        }

        let mut sequences = Vec::new();
        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            let record = h.submitter.relay_record(&outcome.transaction_id).unwrap();
            sequences.push(record.sequence);
        }
        sequences.sort_unstable();
        assert_eq!(sequences, vec![4, 5, 6, 7]);
        for (_, proxy) in &proxies {
            assert_eq!(h.ledger.proxy_nonce(*proxy).await.unwrap(), U256::from(1));
        }
    }

    #[tokio::test]
    async fn broadcast_failure_resyncs_sequence() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        h.ledger.fail_next_broadcast("connection reset");
        let request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        assert_eq!(
            h.submitter.submit_relay(request.clone()).await,
            Err(RelayError::SubmissionFailed("connection reset".into()))
        );
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::ZERO);

        h.submitter.submit_relay(request).await.unwrap();
        assert_eq!(h.ledger.proxy_nonce(proxy).await.unwrap(), U256::from(1));
    }

    #[tokio::test]
    async fn sequence_taken_elsewhere_is_recovered_after_one_failure() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        // Another process spends the relayer's next sequence number.
        h.ledger
            .broadcast(&Submission::Deploy { owner: Address::repeat_byte(7) }, 1)
            .await
            .unwrap();

        let request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        assert!(matches!(
            h.submitter.submit_relay(request.clone()).await,
            Err(RelayError::SubmissionFailed(_))
        ));
        h.submitter.submit_relay(request).await.unwrap();
    }

    #[tokio::test]
    async fn timeout_reports_pending_then_poller_settles() {
        let h = harness_with(FinalityPolicy {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            confirmations: 1,
        });
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;
        h.ledger.set_auto_mine(false);

        let request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        let outcome = h.submitter.submit_relay(request).await.unwrap();
        assert!(outcome.is_pending());
        assert_eq!(h.submitter.reconcile_pending().await.unwrap(), 0);

        h.ledger.mine();
        assert_eq!(h.submitter.reconcile_pending().await.unwrap(), 1);
        let record = h.submitter.relay_record(&outcome.transaction_id).unwrap();
        assert_eq!(record.status, RelayStatus::Confirmed);
        assert_eq!(record.block_number, Some(2));
    }

    #[tokio::test]
    async fn pending_deploy_is_not_duplicated_and_settles_later() {
        let h = harness_with(FinalityPolicy {
            timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            confirmations: 1,
        });
        h.ledger.set_auto_mine(false);
        let owner = Address::repeat_byte(0x42);

        let first = h.submitter.submit_deploy(owner).await.unwrap();
        assert!(first.is_pending());
        let proxy = first.contract_address.unwrap();

        let again = h.submitter.submit_deploy(owner).await.unwrap();
        assert!(again.is_pending());
        assert_eq!(again.contract_address, Some(proxy));
        assert_eq!(h.ledger.mempool_len(), 1);
        assert_eq!(h.submitter.lookup(&owner).unwrap().status, BindingStatus::Pending);

        h.ledger.mine();
        h.submitter.reconcile_pending().await.unwrap();
        let binding = h.submitter.lookup(&owner).unwrap();
        assert_eq!(binding.status, BindingStatus::Active);
        assert_eq!(binding.proxy_address(), Some(proxy));
    }

    #[tokio::test]
    async fn confirmations_wait_for_later_blocks() {
        let h = harness_with(FinalityPolicy {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            confirmations: 2,
        });

        // The deployment is the head block; nothing else is mined afterwards.
        let outcome = h.submitter.submit_deploy(Address::repeat_byte(0x42)).await.unwrap();
        assert!(outcome.is_pending());

        h.ledger
            .broadcast(&Submission::Deploy { owner: Address::repeat_byte(0x43) }, 1)
            .await
            .unwrap();
        assert_eq!(h.submitter.reconcile_pending().await.unwrap(), 1);
        assert_eq!(
            h.submitter.lookup(&Address::repeat_byte(0x42)).unwrap().status,
            BindingStatus::Active
        );
    }

    #[tokio::test]
    async fn proxy_state_is_cached_until_a_relay() {
        let h = harness();
        let owner = PrivateKeySigner::random();
        let proxy = deployed(&h, &owner).await;

        let state = h.submitter.proxy_state(proxy).await.unwrap();
        assert_eq!(state.owner, owner.address());
        assert_eq!(state.nonce, U256::ZERO);

        let request = signed_request(&owner, proxy, FaucetToken::faucet_calldata(), 0);
        h.submitter.submit_relay(request).await.unwrap();
        assert_eq!(h.submitter.proxy_state(proxy).await.unwrap().nonce, U256::from(1));

        assert!(matches!(
            h.submitter.proxy_state(Address::repeat_byte(0x99)).await,
            Err(RelayError::NotFound(_))
        ));
    }
}
