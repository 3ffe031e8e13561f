//! Hash-chained audit log for signing decisions.
//!
//! Every signing request that resolves to an account produces one entry,
//! whether it was signed or refused; service start and stop are recorded too.
//!
//! Entries are linked by SHA-256: each carries the hash of its predecessor
//! and an Ed25519 signature over its own fields. The signing key is generated
//! per process and its public half is logged at startup, so a chain verifies
//! against the key of the process that wrote it. One logger owns a database.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ed25519_dalek::{SecretKey, Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::{SignerError, SignerResult};
use crate::signing::SigningKind;
use crate::storage::Storage;

/// `prev_hash` of the first entry.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SignAttestation,
    SignProposal,
    SignAggregation,
    ServiceStart,
    ServiceStop,
}

impl From<SigningKind> for AuditEventType {
    fn from(kind: SigningKind) -> Self {
        match kind {
            SigningKind::Attestation => Self::SignAttestation,
            SigningKind::Proposal => Self::SignProposal,
            SigningKind::Aggregation => Self::SignAggregation,
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SignAttestation => "sign_attestation",
            Self::SignProposal => "sign_proposal",
            Self::SignAggregation => "sign_aggregation",
            Self::ServiceStart => "service_start",
            Self::ServiceStop => "service_stop",
        };
        f.write_str(name)
    }
}

/// Who triggered an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditActor {
    /// Request on behalf of a validator key (hex public key).
    Account { public_key: String },
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { reason: String },
}

/// One link of the audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: AuditActor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    pub outcome: AuditOutcome,
    /// Slot, epochs, pipeline stage, error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Hex SHA-256 of the previous entry.
    pub prev_hash: String,
    /// Hex Ed25519 signature over every other field.
    pub signature: String,
}

/// The signed view of an entry: all fields but the signature.
#[derive(Serialize)]
struct SignedFields<'a> {
    seq: u64,
    timestamp: &'a DateTime<Utc>,
    event_type: AuditEventType,
    actor: &'a AuditActor,
    account_id: Option<Uuid>,
    outcome: &'a AuditOutcome,
    context: Option<&'a serde_json::Value>,
    prev_hash: &'a str,
}

/// Why verification stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainBreak {
    PrevHash,
    Signature,
}

impl AuditEntry {
    fn signed_bytes(&self) -> SignerResult<Vec<u8>> {
        Ok(serde_json::to_vec(&SignedFields {
            seq: self.seq,
            timestamp: &self.timestamp,
            event_type: self.event_type,
            actor: &self.actor,
            account_id: self.account_id,
            outcome: &self.outcome,
            context: self.context.as_ref(),
            prev_hash: &self.prev_hash,
        })?)
    }

    /// Hash committed to by the next entry.
    pub fn hash(&self) -> SignerResult<String> {
        let digest = Sha256::new()
            .chain_update(self.signed_bytes()?)
            .chain_update(self.signature.as_bytes())
            .finalize();
        Ok(hex::encode(digest))
    }

    pub fn verify_signature(&self, verifying_key: &VerifyingKey) -> bool {
        let Some(signature) = hex::decode(&self.signature)
            .ok()
            .and_then(|bytes| Signature::from_slice(&bytes).ok())
        else {
            return false;
        };

        self.signed_bytes()
            .is_ok_and(|bytes| verifying_key.verify(&bytes, &signature).is_ok())
    }

    fn check_link(&self, expected_prev: &str, verifying_key: &VerifyingKey) -> Option<ChainBreak> {
        if self.prev_hash != expected_prev {
            Some(ChainBreak::PrevHash)
        } else if !self.verify_signature(verifying_key) {
            Some(ChainBreak::Signature)
        } else {
            None
        }
    }
}

/// Sequence number and hash of the newest entry.
struct ChainHead {
    seq: u64,
    hash: String,
}

/// Appends signed entries to the `audit_log` table.
pub struct AuditLogger {
    storage: Storage,
    signing_key: SigningKey,
    /// Held for the whole append so entries link in order.
    head: Mutex<ChainHead>,
}

impl AuditLogger {
    /// Open the audit log on `storage`, continuing an existing chain.
    pub fn new(storage: Storage) -> SignerResult<Self> {
        let mut secret: SecretKey = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();

        let head = match storage.get_latest_audit_seq()? {
            Some(seq) => ChainHead {
                seq,
                hash: Self::load(&storage, seq)?.hash()?,
            },
            None => ChainHead {
                seq: 0,
                hash: GENESIS_HASH.to_string(),
            },
        };

        Ok(Self {
            storage,
            signing_key,
            head: Mutex::new(head),
        })
    }

    fn load(storage: &Storage, seq: u64) -> SignerResult<AuditEntry> {
        storage
            .get_audit_entry(seq)?
            .ok_or_else(|| SignerError::Storage(format!("Missing audit entry {seq}")))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    /// Sequence number of the newest entry (0 when empty).
    pub fn current_seq(&self) -> u64 {
        self.head
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().seq, |head| head.seq)
    }

    pub fn get_entry(&self, seq: u64) -> SignerResult<Option<AuditEntry>> {
        self.storage.get_audit_entry(seq)
    }

    /// Sign and persist a new entry. Returns its sequence number.
    pub fn append(
        &self,
        event_type: AuditEventType,
        actor: AuditActor,
        account_id: Option<Uuid>,
        outcome: AuditOutcome,
        context: Option<serde_json::Value>,
    ) -> SignerResult<u64> {
        let mut head = self
            .head
            .lock()
            .map_err(|_| SignerError::Internal("Audit chain lock poisoned".to_string()))?;

        let mut entry = AuditEntry {
            seq: head.seq + 1,
            timestamp: Utc::now(),
            event_type,
            actor,
            account_id,
            outcome,
            context,
            prev_hash: head.hash.clone(),
            signature: String::new(),
        };
        entry.signature = hex::encode(self.signing_key.sign(&entry.signed_bytes()?).to_bytes());

        self.storage.put_audit_entry(&entry)?;
        *head = ChainHead {
            seq: entry.seq,
            hash: entry.hash()?,
        };

        tracing::debug!(seq = entry.seq, event_type = %event_type, "Audit entry appended");
        Ok(entry.seq)
    }

    /// Record the outcome of a signing request that resolved to an account.
    ///
    /// Audit failures never change the signing result; they are logged and
    /// swallowed.
    pub fn record_signing(
        &self,
        kind: SigningKind,
        account_id: Uuid,
        public_key_hex: String,
        outcome: AuditOutcome,
        context: serde_json::Value,
    ) {
        if let Err(e) = self.append(
            kind.into(),
            AuditActor::Account {
                public_key: public_key_hex,
            },
            Some(account_id),
            outcome,
            Some(context),
        ) {
            tracing::error!(
                account_id = %account_id,
                kind = %kind,
                error = %e,
                "Failed to append audit entry"
            );
        }
    }

    /// Check links and signatures for entries `start..=end`.
    ///
    /// `Ok(false)` means the chain is broken; errors mean entries are missing
    /// or unreadable.
    pub fn verify_chain(&self, start: u64, end: u64) -> SignerResult<bool> {
        if start == 0 || start > end {
            return Ok(false);
        }

        let verifying_key = self.verifying_key();
        let mut expected_prev = if start == 1 {
            GENESIS_HASH.to_string()
        } else {
            Self::load(&self.storage, start - 1)?.hash()?
        };

        for seq in start..=end {
            let entry = Self::load(&self.storage, seq)?;
            if let Some(problem) = entry.check_link(&expected_prev, &verifying_key) {
                tracing::warn!(seq, problem = ?problem, "Audit chain verification failed");
                return Ok(false);
            }
            expected_prev = entry.hash()?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger() -> (Storage, AuditLogger) {
        let storage = Storage::open_memory().expect("memory storage");
        let logger = AuditLogger::new(storage.clone()).expect("audit logger");
        (storage, logger)
    }

    fn proposal_entry(logger: &AuditLogger, slot: u64) -> u64 {
        logger
            .append(
                AuditEventType::SignProposal,
                AuditActor::Account {
                    public_key: "ab".repeat(32),
                },
                Some(Uuid::new_v4()),
                AuditOutcome::Success,
                Some(serde_json::json!({ "slot": slot })),
            )
            .expect("append")
    }

    #[test]
    fn test_entries_link_to_predecessor() -> SignerResult<()> {
        let (_, logger) = logger();
        assert_eq!(logger.current_seq(), 0);

        for slot in 10..13 {
            proposal_entry(&logger, slot);
        }
        assert_eq!(logger.current_seq(), 3);

        let first = logger.get_entry(1)?.expect("entry 1");
        let second = logger.get_entry(2)?.expect("entry 2");
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash()?);
        assert_eq!(second.context, Some(serde_json::json!({ "slot": 11 })));

        assert!(logger.verify_chain(1, 3)?);
        assert!(logger.verify_chain(2, 3)?);
        Ok(())
    }

    #[test]
    fn test_tampering_is_detected() -> SignerResult<()> {
        let (storage, logger) = logger();
        for slot in 0..3 {
            proposal_entry(&logger, slot);
        }

        let mut entry = logger.get_entry(2)?.expect("entry 2");
        entry.outcome = AuditOutcome::Failure {
            reason: "rewritten".to_string(),
        };
        assert!(storage.put_audit_entry(&entry).is_err());
        storage.replace_audit_entry(&entry)?;

        assert!(logger.verify_chain(1, 1)?);
        assert!(!logger.verify_chain(1, 3)?);
        Ok(())
    }

    #[test]
    fn test_chain_continues_after_reopen() -> SignerResult<()> {
        let (storage, logger) = logger();
        proposal_entry(&logger, 1);
        let last_hash = logger.get_entry(1)?.expect("entry 1").hash()?;

        let reopened = AuditLogger::new(storage)?;
        assert_eq!(reopened.current_seq(), 1);
        let seq = reopened.append(
            AuditEventType::ServiceStart,
            AuditActor::System,
            None,
            AuditOutcome::Success,
            None,
        )?;
        assert_eq!(seq, 2);
        assert_eq!(reopened.get_entry(2)?.expect("entry 2").prev_hash, last_hash);
        Ok(())
    }

    #[test]
    fn test_signature_is_bound_to_key() -> SignerResult<()> {
        let (storage, logger) = logger();
        proposal_entry(&logger, 5);
        let entry = logger.get_entry(1)?.expect("entry 1");

        assert!(entry.verify_signature(&logger.verifying_key()));
        let other = AuditLogger::new(storage)?;
        assert!(!entry.verify_signature(&other.verifying_key()));
        Ok(())
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(AuditEventType::SignAttestation.to_string(), "sign_attestation");
        assert_eq!(
            AuditEventType::from(SigningKind::Aggregation),
            AuditEventType::SignAggregation
        );
        assert_eq!(
            serde_json::to_value(AuditEventType::ServiceStop).expect("serialize"),
            "service_stop"
        );
    }
}
