// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM chain integration.
//!
//! This module provides:
//! - The JSON-RPC ledger backend used against Sepolia or a local node
//! - UserProxy contract bindings and the deployment artifact
//! - Relayer credential loading

pub mod client;
pub mod signing;
pub mod types;
pub mod user_proxy;

pub use client::{EvmClient, EvmClientError};
pub use types::*;
pub use user_proxy::{IUserProxy, ProxyArtifact};
