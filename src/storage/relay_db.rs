// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relay database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `proxy_bindings`: lowercase owner address → serialized ProxyBinding
//! - `relays`: tx_hash → serialized RelayRecord
//! - `pending_relays`: tx_hash → relayer sequence, for records still pending

use std::path::Path;

use alloy::primitives::Address;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::records::{address_key, BindingStatus, ProxyBinding, RelayRecord, RelayStatus};

// =============================================================================
// Table Definitions
// =============================================================================

/// Owner → binding (JSON bytes).
const PROXY_BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("proxy_bindings");

/// Transaction hash → relay record (JSON bytes).
const RELAYS: TableDefinition<&str, &[u8]> = TableDefinition::new("relays");

/// Transaction hash → sequence of every pending relay record.
const PENDING_RELAYS: TableDefinition<&str, u64> = TableDefinition::new("pending_relays");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TxDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type TxDbResult<T> = Result<T, TxDbError>;

// =============================================================================
// RelayDatabase
// =============================================================================

/// Embedded store for bindings and relay records.
pub struct RelayDatabase {
    db: Database,
    /// Outcomes for upcoming binding writes; `false` fails the write.
    #[cfg(test)]
    binding_writes: std::sync::Mutex<std::collections::VecDeque<bool>>,
}

impl RelayDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> TxDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PROXY_BINDINGS)?;
            let _ = write_txn.open_table(RELAYS)?;
            let _ = write_txn.open_table(PENDING_RELAYS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            #[cfg(test)]
            binding_writes: Default::default(),
        })
    }

    /// Script the outcome of the next binding writes.
    #[cfg(test)]
    pub(crate) fn script_binding_writes(&self, plan: &[bool]) {
        let mut writes = self
            .binding_writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writes.extend(plan);
    }

    // =========================================================================
    // Proxy bindings
    // =========================================================================

    /// Look up the binding for an owner.
    pub fn get_binding(&self, owner: &Address) -> TxDbResult<Option<ProxyBinding>> {
        let key = address_key(owner);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROXY_BINDINGS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or replace a binding.
    pub fn put_binding(&self, binding: &ProxyBinding) -> TxDbResult<()> {
        #[cfg(test)]
        {
            let next = self
                .binding_writes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front();
            if next == Some(false) {
                return Err(std::io::Error::other("injected write failure").into());
            }
        }

        let json = serde_json::to_vec(binding)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROXY_BINDINGS)?;
            table.insert(binding.owner.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Drop the binding for an owner (a deployment that reverted).
    pub fn remove_binding(&self, owner: &Address) -> TxDbResult<()> {
        let key = address_key(owner);
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PROXY_BINDINGS)?;
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All bindings still awaiting deployment confirmation.
    pub fn pending_bindings(&self) -> TxDbResult<Vec<ProxyBinding>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROXY_BINDINGS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let binding: ProxyBinding = serde_json::from_slice(value.value())?;
            if binding.status == BindingStatus::Pending {
                out.push(binding);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Relay records
    // =========================================================================

    /// Insert or replace a relay record.
    pub fn upsert_relay(&self, record: &RelayRecord) -> TxDbResult<()> {
        let key = record.tx_hash.to_lowercase();
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(RELAYS)?;
            table.insert(key.as_str(), json.as_slice())?;
            let mut pending = write_txn.open_table(PENDING_RELAYS)?;
            index_pending(&mut pending, &key, record)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a single relay record by transaction hash.
    pub fn get_relay(&self, tx_hash: &str) -> TxDbResult<Option<RelayRecord>> {
        let key = tx_hash.to_lowercase();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RELAYS)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Apply `update` to a stored record and write it back.
    pub fn update_relay<F>(&self, tx_hash: &str, update: F) -> TxDbResult<RelayRecord>
    where
        F: FnOnce(&mut RelayRecord),
    {
        let key = tx_hash.to_lowercase();
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut table = write_txn.open_table(RELAYS)?;

            let existing_bytes = {
                let existing = table
                    .get(key.as_str())?
                    .ok_or_else(|| TxDbError::NotFound(format!("Relay {tx_hash}")))?;
                existing.value().to_vec()
            };

            let mut record: RelayRecord = serde_json::from_slice(&existing_bytes)?;
            update(&mut record);

            let json = serde_json::to_vec(&record)?;
            table.insert(key.as_str(), json.as_slice())?;
            let mut pending = write_txn.open_table(PENDING_RELAYS)?;
            index_pending(&mut pending, &key, &record)?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// All relay records still awaiting a receipt, oldest sequence first.
    pub fn pending_relays(&self) -> TxDbResult<Vec<RelayRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PENDING_RELAYS)?;
        let table = read_txn.open_table(RELAYS)?;
        let mut out = Vec::new();
        for entry in index.iter()? {
            let (key, _) = entry?;
            if let Some(value) = table.get(key.value())? {
                out.push(serde_json::from_slice::<RelayRecord>(value.value())?);
            }
        }
        out.sort_by_key(|record| record.sequence);
        Ok(out)
    }
}

/// Keep `key` in the pending index exactly while `record` is pending.
fn index_pending(
    index: &mut redb::Table<'_, &'static str, u64>,
    key: &str,
    record: &RelayRecord,
) -> TxDbResult<()> {
    if record.status == RelayStatus::Pending {
        index.insert(key, record.sequence)?;
    } else {
        index.remove(key)?;
    }
    Ok(())
}
