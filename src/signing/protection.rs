//! Slashing protection based on per-account high-water marks.
//!
//! Each account keeps a single record holding the highest attestation
//! (source, target) pair and the highest proposal slot it has signed. A new
//! request is accepted only if it moves strictly past the stored target or
//! slot and does not lower the stored source. Exact replays are rejected.
//!
//! Checks take an [`AccountLockGuard`] so they can only run while the
//! account lock is held; the account id comes from the guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SignerError, SignerResult};
use crate::signing::lock::AccountLockGuard;
use crate::signing::types::AttestationData;
use crate::storage::Storage;

/// Highest signed attestation for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationWatermark {
    pub source_epoch: u64,
    pub target_epoch: u64,
}

/// Persisted high-water marks. Absence of a record means no signing history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRecord {
    #[serde(default)]
    pub highest_attestation: Option<AttestationWatermark>,
    #[serde(default)]
    pub highest_proposal_slot: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reason a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Target epoch at or below one already signed.
    DoubleVote { target_epoch: u64, highest_target: u64 },
    /// Source epoch below one already signed.
    SurroundingVote { source_epoch: u64, highest_source: u64 },
    /// Slot at or below one already proposed.
    DoubleProposal { slot: u64, highest_slot: u64 },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DoubleVote {
                target_epoch,
                highest_target,
            } => write!(
                f,
                "double vote: target epoch {target_epoch} <= signed target epoch {highest_target}"
            ),
            Self::SurroundingVote {
                source_epoch,
                highest_source,
            } => write!(
                f,
                "surrounding vote: source epoch {source_epoch} < signed source epoch {highest_source}"
            ),
            Self::DoubleProposal { slot, highest_slot } => write!(
                f,
                "double proposal: slot {slot} <= signed slot {highest_slot}"
            ),
        }
    }
}

impl From<Violation> for SignerError {
    fn from(violation: Violation) -> Self {
        Self::SlashingViolation(violation.to_string())
    }
}

/// Check an attestation against the stored watermark.
pub fn check_attestation(
    watermark: Option<AttestationWatermark>,
    source_epoch: u64,
    target_epoch: u64,
) -> Result<(), Violation> {
    let Some(highest) = watermark else {
        return Ok(());
    };

    if target_epoch <= highest.target_epoch {
        return Err(Violation::DoubleVote {
            target_epoch,
            highest_target: highest.target_epoch,
        });
    }

    if source_epoch < highest.source_epoch {
        return Err(Violation::SurroundingVote {
            source_epoch,
            highest_source: highest.source_epoch,
        });
    }

    Ok(())
}

/// Check a proposal slot against the stored watermark.
pub fn check_proposal(highest_slot: Option<u64>, slot: u64) -> Result<(), Violation> {
    match highest_slot {
        Some(highest_slot) if slot <= highest_slot => {
            Err(Violation::DoubleProposal { slot, highest_slot })
        }
        _ => Ok(()),
    }
}

/// Sole authority on whether a signature may be produced.
#[derive(Clone)]
pub struct SlashingProtectionGuard {
    storage: Storage,
}

impl SlashingProtectionGuard {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Current record for an account, if any.
    pub fn record(&self, account_id: Uuid) -> SignerResult<Option<ProtectionRecord>> {
        self.storage.get_protection(&account_id.to_string())
    }

    /// Accept or reject an attestation; on acceptance the new (source, target)
    /// becomes the watermark before this returns.
    pub fn check_and_record_attestation(
        &self,
        lock: &AccountLockGuard,
        data: &AttestationData,
    ) -> SignerResult<()> {
        let account_id = lock.account_id().to_string();
        let source_epoch = data.source.epoch;
        let target_epoch = data.target.epoch;

        let result = self.storage.update_protection(
            &account_id,
            |current: Option<ProtectionRecord>| {
                let mut record = current.unwrap_or_default();
                check_attestation(record.highest_attestation, source_epoch, target_epoch)?;

                record.highest_attestation = Some(AttestationWatermark {
                    source_epoch,
                    target_epoch,
                });
                record.updated_at = Some(Utc::now());
                Ok(record)
            },
        );

        match result {
            Ok(_) => {
                tracing::debug!(
                    account_id = %account_id,
                    source_epoch,
                    target_epoch,
                    "Attestation watermark advanced"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    source_epoch,
                    target_epoch,
                    error = %e,
                    "Attestation rejected by slashing protection"
                );
                Err(e)
            }
        }
    }

    /// Accept or reject a proposal; on acceptance `slot` becomes the watermark.
    pub fn check_and_record_proposal(
        &self,
        lock: &AccountLockGuard,
        slot: u64,
    ) -> SignerResult<()> {
        let account_id = lock.account_id().to_string();

        let result = self.storage.update_protection(
            &account_id,
            |current: Option<ProtectionRecord>| {
                let mut record = current.unwrap_or_default();
                check_proposal(record.highest_proposal_slot, slot)?;

                record.highest_proposal_slot = Some(slot);
                record.updated_at = Some(Utc::now());
                Ok(record)
            },
        );

        match result {
            Ok(_) => {
                tracing::debug!(account_id = %account_id, slot, "Proposal watermark advanced");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    slot,
                    error = %e,
                    "Proposal rejected by slashing protection"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::lock::{AccountLock, LockPolicy};
    use crate::signing::types::Checkpoint;

    fn attestation(source: u64, target: u64) -> AttestationData {
        AttestationData {
            slot: target * 32,
            committee_index: 0,
            beacon_block_root: [0; 32],
            source: Checkpoint {
                epoch: source,
                root: [1; 32],
            },
            target: Checkpoint {
                epoch: target,
                root: [2; 32],
            },
        }
    }

    #[test]
    fn test_check_attestation_rules() {
        let wm = Some(AttestationWatermark {
            source_epoch: 2,
            target_epoch: 6,
        });

        assert!(check_attestation(None, 0, 0).is_ok());
        assert!(check_attestation(wm, 2, 7).is_ok());
        assert!(check_attestation(wm, 5, 7).is_ok());
        assert!(matches!(
            check_attestation(wm, 2, 6),
            Err(Violation::DoubleVote { .. })
        ));
        assert!(matches!(
            check_attestation(wm, 3, 5),
            Err(Violation::DoubleVote { .. })
        ));
        assert!(matches!(
            check_attestation(wm, 1, 7),
            Err(Violation::SurroundingVote { .. })
        ));
    }

    #[test]
    fn test_check_proposal_rules() {
        assert!(check_proposal(None, 0).is_ok());
        assert!(check_proposal(Some(10), 11).is_ok());
        assert!(check_proposal(Some(10), 10).is_err());
        assert!(check_proposal(Some(10), 3).is_err());
    }

    #[actix_rt::test]
    async fn test_attestation_watermark_scenario() -> SignerResult<()> {
        let storage = Storage::open_memory()?;
        let guard = SlashingProtectionGuard::new(storage.clone());
        let locks = AccountLock::new(storage, LockPolicy::default());
        let account = Uuid::new_v4();
        let lock = locks.lock(account).await?;

        assert!(guard.record(account)?.is_none());

        guard.check_and_record_attestation(&lock, &attestation(1, 5))?;
        let err = guard
            .check_and_record_attestation(&lock, &attestation(1, 4))
            .unwrap_err();
        assert!(matches!(err, SignerError::SlashingViolation(_)));

        guard.check_and_record_attestation(&lock, &attestation(2, 6))?;
        let err = guard
            .check_and_record_attestation(&lock, &attestation(1, 7))
            .unwrap_err();
        assert!(err.to_string().contains("surrounding vote"));

        let record = guard.record(account)?.expect("record stored");
        assert_eq!(
            record.highest_attestation,
            Some(AttestationWatermark {
                source_epoch: 2,
                target_epoch: 6
            })
        );
        assert!(record.highest_proposal_slot.is_none());

        lock.release()
    }

    #[actix_rt::test]
    async fn test_proposal_watermark_scenario() -> SignerResult<()> {
        let storage = Storage::open_memory()?;
        let guard = SlashingProtectionGuard::new(storage.clone());
        let locks = AccountLock::new(storage, LockPolicy::default());
        let account = Uuid::new_v4();
        let lock = locks.lock(account).await?;

        guard.check_and_record_proposal(&lock, 10)?;
        assert!(matches!(
            guard.check_and_record_proposal(&lock, 10),
            Err(SignerError::SlashingViolation(_))
        ));
        guard.check_and_record_proposal(&lock, 11)?;

        // Proposals and attestations keep separate watermarks
        guard.check_and_record_attestation(&lock, &attestation(0, 1))?;
        let record = guard.record(account)?.expect("record stored");
        assert_eq!(record.highest_proposal_slot, Some(11));

        lock.release()
    }
}
