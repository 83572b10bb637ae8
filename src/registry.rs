// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Proxy Registry
//!
//! Owner → proxy bindings. Deployment is idempotent per owner: a second
//! request returns the existing proxy, and a deployment still in flight is
//! awaited rather than repeated.
//!
//! Requests for the same owner are serialized by a per-owner guard; requests
//! for different owners only meet at the relayer's sequencer lock.
//!
//! The deployment is signed first and its binding written as a pending
//! reservation before anything is sent. If the write fails nothing reaches
//! the ledger. A reservation whose transaction the ledger never saw is
//! dropped by the next request for that owner.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::{Address, TxHash};
use tracing::{info, warn};

use crate::ledger::{LedgerError, ProxyError, Submission};
use crate::relay::{verdict, RelayError, RelayOutcome, RelaySubmitter};
use crate::storage::{
    address_key, BindingStatus, ProxyBinding, RelayDatabase, RelayKind, RelayRecord, RelayStatus,
};

type OwnerGuard = Arc<tokio::sync::Mutex<()>>;

pub struct ProxyRegistry {
    db: Arc<RelayDatabase>,
    guards: Mutex<HashMap<Address, OwnerGuard>>,
}

impl ProxyRegistry {
    pub fn new(db: Arc<RelayDatabase>) -> Self {
        Self {
            db,
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// The binding for `owner`, pending or active.
    pub fn lookup(&self, owner: &Address) -> Result<ProxyBinding, RelayError> {
        self.db
            .get_binding(owner)?
            .ok_or_else(|| RelayError::NotFound(format!("No proxy registered for {owner}")))
    }

    /// Deploy a proxy for `owner` through `submitter`, unless one exists.
    pub async fn deploy(
        &self,
        submitter: &RelaySubmitter,
        owner: Address,
    ) -> Result<RelayOutcome, RelayError> {
        if owner == Address::ZERO {
            return Err(ProxyError::InvalidOwner.into());
        }

        let guard = self.guard(owner);
        let result = {
            let _held = guard.lock().await;
            self.deploy_locked(submitter, owner).await
        };
        drop(guard);
        self.prune_guards();
        result
    }

    async fn deploy_locked(
        &self,
        submitter: &RelaySubmitter,
        owner: Address,
    ) -> Result<RelayOutcome, RelayError> {
        let network = submitter.network();

        if let Some(binding) = self.db.get_binding(&owner)? {
            if let Some(outcome) = self.resume(submitter, &owner, &binding).await? {
                return Ok(outcome);
            }
        }

        let slot = submitter.claim_sequence().await.map_err(deploy_error)?;
        let sequence = slot.sequence();
        let signed = slot
            .sign(&Submission::Deploy { owner })
            .await
            .map_err(deploy_error)?;
        let proxy = signed.contract_address.ok_or_else(|| {
            RelayError::DeploymentFailed("ledger reported no contract address".to_string())
        })?;

        // Dropping the slot on a failed write leaves the sequence unspent.
        self.db
            .put_binding(&ProxyBinding::pending(&owner, &proxy, signed.tx_hash.to_string()))?;

        let sent = match slot.send(&signed).await {
            Ok(sent) => sent,
            Err(LedgerError::Transport(reason)) => {
                warn!(
                    owner = %owner,
                    tx_hash = %signed.tx_hash,
                    error = %reason,
                    "Deployment send failed, reservation kept"
                );
                return Err(RelayError::SubmissionFailed(reason));
            }
            Err(err) => {
                self.db.remove_binding(&owner)?;
                return Err(deploy_error(err));
            }
        };

        info!(
            owner = %owner,
            proxy = %proxy,
            tx_hash = %sent.tx_hash,
            sequence,
            "Deploying proxy"
        );

        let mut record = RelayRecord::new_pending(
            sent.tx_hash.to_string(),
            RelayKind::Deploy,
            address_key(&proxy),
            sequence,
        );
        record.owner = Some(address_key(&owner));
        record.explorer_url = network.tx_url(&sent.tx_hash);
        submitter.store_relay(&record);

        let outcome = RelayOutcome::pending(sent.tx_hash)
            .with_contract(proxy)
            .with_explorer_url(network.tx_url(&sent.tx_hash));

        let Some(receipt) = submitter.wait_for_finality(sent.tx_hash).await else {
            info!(owner = %owner, tx_hash = %sent.tx_hash, "Proxy deployment still pending");
            return Ok(outcome);
        };

        let verdict = submitter.record_settlement(&receipt);
        self.settle_binding(&owner, verdict.is_ok())?;
        match verdict {
            Ok(()) => Ok(outcome.confirmed_at(receipt.block_number)),
            Err(reason) => Err(RelayError::DeploymentFailed(reason)),
        }
    }

    /// Outcome of an existing binding, or `None` when the owner needs a new
    /// deployment because the earlier one failed or was never sent.
    async fn resume(
        &self,
        submitter: &RelaySubmitter,
        owner: &Address,
        binding: &ProxyBinding,
    ) -> Result<Option<RelayOutcome>, RelayError> {
        let (proxy, tx_hash) = parse_binding(binding)?;
        let outcome = RelayOutcome::pending(tx_hash)
            .with_contract(proxy)
            .with_explorer_url(submitter.network().tx_url(&tx_hash));

        if binding.status == BindingStatus::Active {
            info!(owner = %owner, proxy = %proxy, "Proxy already deployed");
            return Ok(Some(RelayOutcome {
                status: RelayStatus::Confirmed,
                ..outcome
            }));
        }

        let sent = submitter
            .ledger()
            .knows_transaction(tx_hash)
            .await
            .map_err(|e| RelayError::Unavailable(e.to_string()))?;
        if !sent {
            warn!(owner = %owner, tx_hash = %tx_hash, "Deployment was never sent, redeploying");
            self.db.remove_binding(owner)?;
            return Ok(None);
        }

        let Some(receipt) = submitter.wait_for_finality(tx_hash).await else {
            info!(owner = %owner, tx_hash = %tx_hash, "Proxy deployment still pending");
            return Ok(Some(outcome));
        };
        let verdict = submitter.record_settlement(&receipt);
        self.settle_binding(owner, verdict.is_ok())?;
        if verdict.is_ok() {
            return Ok(Some(outcome.confirmed_at(receipt.block_number)));
        }
        warn!(owner = %owner, tx_hash = %tx_hash, "Earlier deployment failed, redeploying");
        Ok(None)
    }

    /// Activate the owner's pending binding, or drop it when the deployment failed.
    pub(crate) fn settle_binding(&self, owner: &Address, deployed: bool) -> Result<(), RelayError> {
        let Some(mut binding) = self.db.get_binding(owner)? else {
            return Ok(());
        };
        if binding.status == BindingStatus::Active {
            return Ok(());
        }
        if deployed {
            binding.activate();
            self.db.put_binding(&binding)?;
            info!(owner = %owner, proxy = %binding.proxy, "Proxy binding active");
        } else {
            self.db.remove_binding(owner)?;
            warn!(owner = %owner, proxy = %binding.proxy, "Proxy deployment failed, unbound");
        }
        Ok(())
    }

    /// Settle pending bindings whose deployment is final but whose relay
    /// record was settled without them.
    ///
    /// Returns the number of bindings settled.
    pub(crate) async fn reconcile(&self, submitter: &RelaySubmitter) -> Result<usize, RelayError> {
        let mut settled = 0;
        for binding in self.db.pending_bindings()? {
            let (Ok(owner), Ok(tx_hash)) =
                (binding.owner.parse::<Address>(), binding.tx_hash.parse::<TxHash>())
            else {
                warn!(owner = %binding.owner, "Skipping corrupt proxy binding");
                continue;
            };
            let Ok(Some(receipt)) = submitter.ledger().receipt(tx_hash).await else {
                continue;
            };
            if !submitter.is_final(&receipt).await {
                continue;
            }
            self.settle_binding(&owner, verdict(&receipt).is_ok())?;
            settled += 1;
        }
        Ok(settled)
    }

    fn guard(&self, owner: Address) -> OwnerGuard {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(owner)
            .or_default()
            .clone()
    }

    fn prune_guards(&self) {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, guard| Arc::strong_count(guard) > 1);
    }
}

fn parse_binding(binding: &ProxyBinding) -> Result<(Address, TxHash), RelayError> {
    let proxy = binding
        .proxy_address()
        .ok_or_else(|| RelayError::Storage(format!("Corrupt proxy address {}", binding.proxy)))?;
    let tx_hash = binding
        .tx_hash
        .parse()
        .map_err(|_| RelayError::Storage(format!("Corrupt transaction hash {}", binding.tx_hash)))?;
    Ok((proxy, tx_hash))
}

fn deploy_error(err: LedgerError) -> RelayError {
    match err {
        LedgerError::Rejected(reason) | LedgerError::Transport(reason) => {
            RelayError::SubmissionFailed(reason)
        }
        LedgerError::Proxy(proxy) => RelayError::DeploymentFailed(proxy.to_string()),
        other => RelayError::DeploymentFailed(other.to_string()),
    }
}
