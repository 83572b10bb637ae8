// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Relayer-side persistence. The ledger is the source of truth for proxy
//! state; this module only remembers what the relayer itself did.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   relayer.redb      # proxy_bindings + relays tables
//! ```
//!
//! Proxy nonces are cached in memory only ([`NonceCache`]).

pub mod nonce_cache;
pub mod records;
pub mod relay_db;

pub use nonce_cache::{NonceCache, ProxyState};
pub use records::{address_key, BindingStatus, ProxyBinding, RelayKind, RelayRecord, RelayStatus};
pub use relay_db::{RelayDatabase, TxDbError, TxDbResult};

/// File name of the relay database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "relayer.redb";
