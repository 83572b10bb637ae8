// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Pending Relay Poller
//!
//! Background task that settles relays which outlived the finality wait of
//! the request that submitted them. A relay reported as `pending` to its
//! caller ends up `confirmed` or `failed` here; a pending proxy binding
//! becomes active or is dropped.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::RelaySubmitter;

/// Default interval between sweeps.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Background poller that settles pending relay records.
pub struct PendingPoller {
    submitter: Arc<RelaySubmitter>,
    poll_interval: Duration,
}

impl PendingPoller {
    pub fn new(submitter: Arc<RelaySubmitter>) -> Self {
        Self {
            submitter,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Pending relay poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Pending relay poller shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Pending relay poller shutting down");
                    return;
                }
            }
        }
    }

    async fn poll_step(&self) {
        match self.submitter.reconcile_pending().await {
            Ok(0) => debug!("Pending relay poller: nothing to settle"),
            Ok(settled) => info!(settled, "Pending relay poller: settled relays"),
            Err(e) => warn!(error = %e, "Pending relay poller: sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::tests::harness_with;
    use crate::relay::FinalityPolicy;
    use crate::storage::BindingStatus;
    use alloy::primitives::Address;

    #[tokio::test]
    async fn poller_settles_pending_deploy_and_stops_on_cancel() {
        let h = harness_with(FinalityPolicy {
            timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            confirmations: 1,
        });
        h.ledger.set_auto_mine(false);
        let owner = Address::repeat_byte(0x42);
        assert!(h.submitter.submit_deploy(owner).await.unwrap().is_pending());
        h.ledger.mine();

        let shutdown = CancellationToken::new();
        let poller =
            PendingPoller::new(h.submitter.clone()).with_interval(Duration::from_millis(5));
        let task = tokio::spawn(poller.run(shutdown.clone()));

        let mut active = false;
        for _ in 0..100 {
            if h.submitter.lookup(&owner).unwrap().status == BindingStatus::Active {
                active = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(active);

        shutdown.cancel();
        task.await.unwrap();
    }
}
