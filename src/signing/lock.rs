//! Per-account signing lock backed by durable storage.
//!
//! A lock is a `LockRecord` in the `locks` table, written with a conditional
//! put that only succeeds when no live record exists. Records carry an expiry
//! so a holder that dies mid-request cannot wedge an account: the next
//! acquirer treats an expired record as stale and replaces it.
//!
//! Acquisition returns an [`AccountLockGuard`]. Releasing is explicit on the
//! happy path and falls back to `Drop` on every other path.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SignerError, SignerResult};
use crate::storage::{ConditionalPut, Storage};

const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Persisted lock ownership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Token identifying the acquiring request.
    pub owner: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lock acquisition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Lifetime of a lock record before it may be reclaimed.
    pub ttl: Duration,
    /// Conditional-write attempts before giving up with `LockBusy`.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt; doubles each retry.
    pub initial_backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

impl LockPolicy {
    /// Backoff to sleep after failed attempt number `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
    }
}

/// Acquires per-account locks.
#[derive(Clone)]
pub struct AccountLock {
    storage: Storage,
    policy: LockPolicy,
}

impl AccountLock {
    pub fn new(storage: Storage, policy: LockPolicy) -> Self {
        Self { storage, policy }
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Acquire the lock for `account_id`, retrying with backoff.
    ///
    /// Fails with `LockBusy` when every attempt finds a live record.
    pub async fn lock(&self, account_id: Uuid) -> SignerResult<AccountLockGuard> {
        let key = account_id.to_string();
        let ttl = chrono::Duration::from_std(self.policy.ttl)
            .map_err(|e| SignerError::Internal(format!("Invalid lock TTL: {e}")))?;

        for attempt in 0..self.policy.max_attempts {
            let now = Utc::now();
            let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
                SignerError::Internal("Lock TTL overflows the lock expiry".to_string())
            })?;
            let record = LockRecord {
                owner: Uuid::new_v4(),
                acquired_at: now,
                expires_at,
            };

            let outcome = self
                .storage
                .put_lock_unless_live(&key, &record, |existing: &LockRecord| {
                    existing.is_expired_at(now)
                })?;

            match outcome {
                ConditionalPut::Created => {
                    tracing::debug!(account_id = %key, attempt, "Account lock acquired");
                    return Ok(self.guard(account_id, &record));
                }
                ConditionalPut::Replaced(stale) => {
                    tracing::warn!(
                        account_id = %key,
                        stale_owner = %stale.owner,
                        expired_at = %stale.expires_at,
                        "Reclaimed expired account lock"
                    );
                    return Ok(self.guard(account_id, &record));
                }
                ConditionalPut::Blocked(holder) => {
                    tracing::debug!(
                        account_id = %key,
                        attempt,
                        holder = %holder.owner,
                        expires_at = %holder.expires_at,
                        "Account lock held, retrying"
                    );
                    if attempt + 1 < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        tracing::warn!(
            account_id = %key,
            attempts = self.policy.max_attempts,
            "Failed to acquire account lock"
        );
        Err(SignerError::LockBusy { account_id: key })
    }

    fn guard(&self, account_id: Uuid, record: &LockRecord) -> AccountLockGuard {
        AccountLockGuard {
            storage: self.storage.clone(),
            account_id,
            owner: record.owner,
            acquired_at: record.acquired_at,
            released: false,
        }
    }
}

/// Proof of holding an account lock. Releases the lock when dropped.
pub struct AccountLockGuard {
    storage: Storage,
    account_id: Uuid,
    owner: Uuid,
    acquired_at: DateTime<Utc>,
    released: bool,
}

impl AccountLockGuard {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Delete the lock record.
    ///
    /// Only a record still owned by this guard is deleted; if the lock expired
    /// and was reclaimed meanwhile, the new holder's record is left alone.
    pub fn release(mut self) -> SignerResult<()> {
        self.released = true;
        let deleted = self.delete_record()?;
        let held_ms = (Utc::now() - self.acquired_at).num_milliseconds();

        if deleted {
            tracing::debug!(account_id = %self.account_id, held_ms, "Account lock released");
        } else {
            tracing::warn!(
                account_id = %self.account_id,
                held_ms,
                "Account lock expired and was reclaimed before release"
            );
        }
        Ok(())
    }

    fn delete_record(&self) -> SignerResult<bool> {
        let owner = self.owner;
        self.storage
            .delete_lock_if(&self.account_id.to_string(), |record: &LockRecord| {
                record.owner == owner
            })
    }
}

impl Drop for AccountLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        match self.delete_record() {
            Ok(_) => tracing::debug!(
                account_id = %self.account_id,
                "Account lock released on drop"
            ),
            Err(e) => tracing::error!(
                account_id = %self.account_id,
                error = %e,
                "Failed to release account lock; it will expire after its TTL"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> LockPolicy {
        LockPolicy {
            ttl: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = LockPolicy {
            initial_backoff: Duration::from_millis(100),
            ..LockPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), MAX_BACKOFF);
        assert_eq!(policy.backoff(40), MAX_BACKOFF);
    }

    #[actix_rt::test]
    async fn test_lock_is_exclusive() -> SignerResult<()> {
        let storage = Storage::open_memory()?;
        let locks = AccountLock::new(storage.clone(), fast_policy());
        let account = Uuid::new_v4();

        let guard = locks.lock(account).await?;
        let busy = locks.lock(account).await;
        assert!(matches!(busy, Err(SignerError::LockBusy { .. })));

        // A different account is unaffected
        let other = locks.lock(Uuid::new_v4()).await?;
        other.release()?;

        guard.release()?;
        assert!(storage.get_lock::<LockRecord>(&account.to_string())?.is_none());

        let again = locks.lock(account).await?;
        again.release()?;
        Ok(())
    }

    #[actix_rt::test]
    async fn test_unrepresentable_ttl_is_an_error() -> SignerResult<()> {
        let storage = Storage::open_memory()?;
        let huge = LockPolicy {
            ttl: Duration::from_millis(100_000_000_000_000_000),
            ..fast_policy()
        };
        let account = Uuid::new_v4();

        let result = AccountLock::new(storage.clone(), huge).lock(account).await;
        assert!(matches!(result, Err(SignerError::Internal(_))));
        assert!(storage.get_lock::<LockRecord>(&account.to_string())?.is_none());
        Ok(())
    }

    #[actix_rt::test]
    async fn test_drop_releases_lock() -> SignerResult<()> {
        let storage = Storage::open_memory()?;
        let locks = AccountLock::new(storage.clone(), fast_policy());
        let account = Uuid::new_v4();

        {
            let _guard = locks.lock(account).await?;
            assert!(storage.get_lock::<LockRecord>(&account.to_string())?.is_some());
        }

        assert!(storage.get_lock::<LockRecord>(&account.to_string())?.is_none());
        Ok(())
    }

    #[actix_rt::test]
    async fn test_expired_lock_is_reclaimed() -> SignerResult<()> {
        let storage = Storage::open_memory()?;
        let short = LockPolicy {
            ttl: Duration::from_millis(5),
            ..fast_policy()
        };
        let locks = AccountLock::new(storage.clone(), short);
        let account = Uuid::new_v4();

        let crashed = locks.lock(account).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fresh = AccountLock::new(storage.clone(), fast_policy())
            .lock(account)
            .await?;
        assert_ne!(fresh.owner(), crashed.owner());

        // The previous holder must not delete the new holder's record
        crashed.release()?;
        let record: LockRecord = storage
            .get_lock(&account.to_string())?
            .expect("reclaimed lock present");
        assert_eq!(record.owner, fresh.owner());

        fresh.release()?;
        assert!(storage.get_lock::<LockRecord>(&account.to_string())?.is_none());
        Ok(())
    }
}
