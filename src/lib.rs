// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User Proxy Relayer - Gasless EIP-712 Relay Service
//!
//! Users sign `SignedAccess(target, data, nonce)` messages off-chain; the
//! relayer submits them to each user's `UserProxy`, which verifies the
//! signature and nonce and forwards the call, while the relayer pays gas.
//!
//! ## Modules
//!
//! - `codec` - EIP-712 message encoding and signer recovery
//! - `ledger` - UserProxy account model and ledger backends
//! - `blockchain` - JSON-RPC ledger (Sepolia / any EVM node)
//! - `registry` - owner → proxy bindings and idempotent deployment
//! - `relay` - relay submitter, finality wait, pending poller
//! - `api` - HTTP API handlers (Axum)
//! - `client` - reference relay client
//! - `storage` - relay database (redb) and nonce cache

pub mod api;
pub mod blockchain;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod registry;
pub mod relay;
pub mod state;
pub mod storage;
