//! ReDB storage implementation for the validator signer.
//!
//! Provides persistent storage for:
//! - Per-account lock records (`locks` table)
//! - Per-account slashing protection watermarks (`protection` table)
//! - Hash-chained audit log
//!
//! Each table uses string keys and JSON-serialized values for simplicity.
//! Conditional writes run inside a single write transaction; ReDB serializes
//! write transactions, so the read-check-write sequence is atomic.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{SignerError, SignerResult};

// Table definitions
// Using string keys and byte values (JSON serialized)
const LOCKS: TableDefinition<&str, &[u8]> = TableDefinition::new("locks");
const PROTECTION: TableDefinition<&str, &[u8]> = TableDefinition::new("protection");
const AUDIT_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");

/// Outcome of a conditional lock write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionalPut<T> {
    /// No record existed; the new one was written.
    Created,
    /// A stale record existed and was overwritten. Carries the replaced record.
    Replaced(T),
    /// A live record exists; nothing was written. Carries the blocking record.
    Blocked(T),
}

/// Storage wrapper for ReDB.
///
/// Thread-safe via internal Arc. Clone is cheap.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
}

impl Storage {
    /// Open or create a database at the given path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: &Path) -> SignerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path).map_err(|e| SignerError::Storage(e.to_string()))?;
        Self::init_tables(&db)?;

        tracing::info!(path = %path.display(), "Opened storage database");

        Ok(Self { db: Arc::new(db) })
    }

    /// Open an in-memory database for testing.
    pub fn open_memory() -> SignerResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| SignerError::Storage(e.to_string()))?;
        Self::init_tables(&db)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn init_tables(db: &Database) -> SignerResult<()> {
        let write_txn = db.begin_write()?;
        {
            // Just opening the tables creates them if they don't exist
            let _ = write_txn.open_table(LOCKS)?;
            let _ = write_txn.open_table(PROTECTION)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Cheap liveness probe: open a read transaction on the locks table.
    pub fn ping(&self) -> SignerResult<()> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(LOCKS)?;
        Ok(())
    }

    // =========================================================================
    // Locks
    // =========================================================================

    /// Write a lock record for `account_id` unless a live one already exists.
    ///
    /// `is_stale` decides whether an existing record may be overwritten.
    pub fn put_lock_unless_live<T, F>(
        &self,
        account_id: &str,
        record: &T,
        is_stale: F,
    ) -> SignerResult<ConditionalPut<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let value = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;

        let outcome = {
            let mut table = write_txn.open_table(LOCKS)?;
            let existing: Option<T> = table
                .get(account_id)?
                .map(|v| serde_json::from_slice(v.value()))
                .transpose()?;

            match existing {
                Some(current) if !is_stale(&current) => ConditionalPut::Blocked(current),
                Some(current) => {
                    table.insert(account_id, value.as_slice())?;
                    ConditionalPut::Replaced(current)
                }
                None => {
                    table.insert(account_id, value.as_slice())?;
                    ConditionalPut::Created
                }
            }
        };

        if matches!(outcome, ConditionalPut::Blocked(_)) {
            write_txn.abort()?;
        } else {
            write_txn.commit()?;
            tracing::trace!(account_id, "Stored lock record");
        }

        Ok(outcome)
    }

    /// Get the lock record for an account.
    pub fn get_lock<T: DeserializeOwned>(&self, account_id: &str) -> SignerResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LOCKS)?;

        match table.get(account_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Delete the lock record for an account if `owns` accepts it.
    ///
    /// Returns true when a record was deleted.
    pub fn delete_lock_if<T, F>(&self, account_id: &str, owns: F) -> SignerResult<bool>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(LOCKS)?;
            let existing: Option<T> = table
                .get(account_id)?
                .map(|v| serde_json::from_slice(v.value()))
                .transpose()?;

            match existing {
                Some(current) if owns(&current) => table.remove(account_id)?.is_some(),
                _ => false,
            }
        };

        if deleted {
            write_txn.commit()?;
            tracing::trace!(account_id, "Deleted lock record");
        } else {
            write_txn.abort()?;
        }
        Ok(deleted)
    }

    // =========================================================================
    // Slashing protection
    // =========================================================================

    /// Get the protection record for an account.
    pub fn get_protection<T: DeserializeOwned>(
        &self,
        account_id: &str,
    ) -> SignerResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PROTECTION)?;

        match table.get(account_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write the protection record for an account.
    ///
    /// `update` receives the current record (None if absent) and returns the
    /// record to persist. An error from `update` aborts the transaction and
    /// leaves the stored record untouched.
    pub fn update_protection<T, F>(&self, account_id: &str, update: F) -> SignerResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> SignerResult<T>,
    {
        let write_txn = self.db.begin_write()?;

        let next = {
            let mut table = write_txn.open_table(PROTECTION)?;
            let current: Option<T> = table
                .get(account_id)?
                .map(|v| serde_json::from_slice(v.value()))
                .transpose()?;

            match update(current) {
                Ok(next) => {
                    let value = serde_json::to_vec(&next)?;
                    table.insert(account_id, value.as_slice())?;
                    Ok(next)
                }
                Err(e) => Err(e),
            }
        };

        match next {
            Ok(next) => {
                write_txn.commit()?;
                tracing::trace!(account_id, "Stored protection record");
                Ok(next)
            }
            Err(e) => {
                write_txn.abort()?;
                Err(e)
            }
        }
    }

    // =========================================================================
    // Audit Log
    // =========================================================================

    /// Get the latest audit sequence number.
    pub fn get_latest_audit_seq(&self) -> SignerResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        let latest = table.iter()?.last().transpose()?.map(|(k, _)| k.value());

        Ok(latest)
    }

    /// Store a single audit entry by sequence number. Fails if the sequence
    /// number is already taken.
    pub fn put_audit_entry(&self, entry: &crate::audit::AuditEntry) -> SignerResult<()> {
        let value = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        let occupied = {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            let occupied = table.get(entry.seq)?.is_some();
            if !occupied {
                table.insert(entry.seq, value.as_slice())?;
            }
            occupied
        };

        // The log is append-only
        if occupied {
            write_txn.abort()?;
            return Err(SignerError::Storage(format!("Audit entry {} already exists", entry.seq)));
        }
        write_txn.commit()?;
        tracing::trace!(seq = entry.seq, "Stored audit entry");
        Ok(())
    }

    /// Overwrite an audit entry in place, for tamper-detection tests.
    #[cfg(test)]
    pub(crate) fn replace_audit_entry(&self, entry: &crate::audit::AuditEntry) -> SignerResult<()> {
        let value = serde_json::to_vec(entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_LOG)?;
            table.insert(entry.seq, value.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a single audit entry by sequence number.
    pub fn get_audit_entry(&self, seq: u64) -> SignerResult<Option<crate::audit::AuditEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_LOG)?;

        match table.get(seq)? {
            Some(value) => {
                let entry: crate::audit::AuditEntry = serde_json::from_slice(value.value())?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }
}
