//! Signing request pipeline.
//!
//! A request moves through `Received → Validated → AccountResolved → Locked →
//! ProtectionChecked → Signed → Recorded → Released → Responded`. Decoding and
//! account lookup happen before any storage write; once the account lock is
//! acquired it is released on every path.

use std::sync::Arc;

use crate::audit::{AuditLogger, AuditOutcome};
use crate::error::{SignerError, SignerResult};
use crate::signing::custody::KeyCustody;
use crate::signing::lock::{AccountLock, AccountLockGuard, LockPolicy};
use crate::signing::protection::SlashingProtectionGuard;
use crate::signing::root::signing_root;
use crate::signing::types::{
    Account, SignAggregationRequest, SignAttestationRequest, SignProposalRequest,
    SignatureResponse, SigningPayload, SigningRequest, SigningStage,
};
use crate::storage::Storage;

/// Signs validator duties without ever producing a slashable signature.
///
/// Instances are cheap to clone and may be shared across workers. One process
/// owns the database; within it the durable lock serialises requests per
/// account and outlives a crash.
#[derive(Clone)]
pub struct SigningService {
    custody: Arc<dyn KeyCustody>,
    locks: AccountLock,
    protection: SlashingProtectionGuard,
    audit: Option<Arc<AuditLogger>>,
}

impl SigningService {
    pub fn new(storage: Storage, custody: Arc<dyn KeyCustody>, policy: LockPolicy) -> Self {
        Self {
            custody,
            locks: AccountLock::new(storage.clone(), policy),
            protection: SlashingProtectionGuard::new(storage),
            audit: None,
        }
    }

    /// Record every resolved request in `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn protection(&self) -> &SlashingProtectionGuard {
        &self.protection
    }

    pub async fn sign_attestation(
        &self,
        request: &SignAttestationRequest,
    ) -> SignerResult<SignatureResponse> {
        self.sign(SigningRequest::try_from(request)?).await
    }

    pub async fn sign_proposal(
        &self,
        request: &SignProposalRequest,
    ) -> SignerResult<SignatureResponse> {
        self.sign(SigningRequest::try_from(request)?).await
    }

    pub async fn sign_aggregation(
        &self,
        request: &SignAggregationRequest,
    ) -> SignerResult<SignatureResponse> {
        self.sign(SigningRequest::try_from(request)?).await
    }

    /// Run a decoded request through the pipeline.
    pub async fn sign(&self, request: SigningRequest) -> SignerResult<SignatureResponse> {
        let kind = request.payload.kind();

        let account = self
            .custody
            .account_by_public_key(&request.public_key)?
            .ok_or_else(|| SignerError::AccountNotFound(hex::encode(&request.public_key)))?;

        let mut stage = SigningStage::AccountResolved;
        let result = self.sign_for_account(&account, &request, &mut stage).await;

        match &result {
            Ok(_) => tracing::info!(
                account_id = %account.id(),
                kind = %kind,
                stage = %SigningStage::Responded,
                "Signed request"
            ),
            Err(e) => tracing::warn!(
                account_id = %account.id(),
                kind = %kind,
                stage = %stage,
                error = %e,
                "Signing request refused"
            ),
        }

        if let Some(audit) = &self.audit {
            let outcome = match &result {
                Ok(_) => AuditOutcome::Success,
                Err(e) => AuditOutcome::Failure {
                    reason: e.to_string(),
                },
            };
            audit.record_signing(
                kind,
                account.id(),
                account.public_key_hex(),
                outcome,
                audit_context(&request, stage, result.as_ref().err()),
            );
        }

        result
    }

    async fn sign_for_account(
        &self,
        account: &Account,
        request: &SigningRequest,
        stage: &mut SigningStage,
    ) -> SignerResult<SignatureResponse> {
        let lock = self.locks.lock(account.id()).await?;
        *stage = SigningStage::Locked;

        let signed = self
            .check_protection(&lock, &request.payload)
            .and_then(|()| {
                *stage = SigningStage::ProtectionChecked;
                let root = signing_root(request);
                self.custody.sign(account, &root).map_err(|e| match e {
                    SignerError::SigningFailed(_) => e,
                    other => SignerError::SigningFailed(other.to_string()),
                })
            });

        if signed.is_ok() {
            // Watermark was committed during the protection check
            *stage = SigningStage::Recorded;
        }

        release(lock);
        let signature = signed?;
        *stage = SigningStage::Released;

        Ok(SignatureResponse {
            signature: hex::encode(signature),
        })
    }

    fn check_protection(
        &self,
        lock: &AccountLockGuard,
        payload: &SigningPayload,
    ) -> SignerResult<()> {
        match payload {
            SigningPayload::Attestation(data) => {
                self.protection.check_and_record_attestation(lock, data)
            }
            SigningPayload::Proposal(header) => {
                self.protection.check_and_record_proposal(lock, header.slot)
            }
            SigningPayload::Aggregation(_) => Ok(()),
        }
    }
}

/// Release the lock, keeping the signing result if the delete fails; the
/// record then expires after its TTL.
fn release(lock: AccountLockGuard) {
    let account_id = lock.account_id();
    if let Err(e) = lock.release() {
        tracing::error!(
            account_id = %account_id,
            error = %e,
            "Failed to release account lock"
        );
    }
}

fn audit_context(
    request: &SigningRequest,
    stage: SigningStage,
    error: Option<&SignerError>,
) -> serde_json::Value {
    let mut context = match &request.payload {
        SigningPayload::Attestation(data) => serde_json::json!({
            "slot": data.slot,
            "source_epoch": data.source.epoch,
            "target_epoch": data.target.epoch,
        }),
        SigningPayload::Proposal(header) => serde_json::json!({
            "slot": header.slot,
            "proposer_index": header.proposer_index,
        }),
        SigningPayload::Aggregation(data) => serde_json::json!({
            "data_len": data.len(),
        }),
    };

    context["domain"] = serde_json::Value::String(hex::encode(request.domain));
    context["stage"] = serde_json::Value::String(stage.to_string());
    if let Some(code) = error.and_then(SignerError::error_code) {
        context["code"] = serde_json::Value::String(code.to_string());
    }
    context
}
