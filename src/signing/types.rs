//! Wire and domain types for signing requests.
//!
//! Wire types mirror the JSON bodies accepted by the HTTP surface: every
//! byte-valued field is a hex string. Domain types are produced by
//! [`crate::signing::decode`] and are the only form the pipeline operates on.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 32-byte SSZ root or domain.
pub type Root = [u8; 32];

// =============================================================================
// Wire types
// =============================================================================

/// Body of `POST /accounts/sign-attestation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignAttestationRequest {
    #[serde(rename = "public_key")]
    pub public_key: String,
    pub domain: String,
    pub slot: u64,
    pub committee_index: u64,
    pub beacon_block_root: String,
    pub source_epoch: u64,
    pub source_root: String,
    pub target_epoch: u64,
    pub target_root: String,
}

/// Body of `POST /accounts/sign-proposal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignProposalRequest {
    #[serde(rename = "public_key")]
    pub public_key: String,
    pub domain: String,
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: String,
    pub state_root: String,
    pub body_root: String,
}

/// Body of `POST /accounts/sign-aggregation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignAggregationRequest {
    #[serde(rename = "public_key")]
    pub public_key: String,
    pub domain: String,
    pub data_to_sign: String,
}

/// Response for every signing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResponse {
    /// Hex-encoded signature.
    pub signature: String,
}

// =============================================================================
// Domain types
// =============================================================================

/// Epoch and block root pair referenced by an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: Root,
}

/// Attestation payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationData {
    pub slot: u64,
    pub committee_index: u64,
    pub beacon_block_root: Root,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

/// Block proposal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: Root,
    pub state_root: Root,
    pub body_root: Root,
}

/// Typed payload of a signing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningPayload {
    Attestation(AttestationData),
    Proposal(BeaconBlockHeader),
    /// Opaque bytes; not subject to slashing protection.
    Aggregation(Vec<u8>),
}

impl SigningPayload {
    /// Short label for logs and audit entries.
    pub fn kind(&self) -> SigningKind {
        match self {
            Self::Attestation(_) => SigningKind::Attestation,
            Self::Proposal(_) => SigningKind::Proposal,
            Self::Aggregation(_) => SigningKind::Aggregation,
        }
    }
}

/// Request kind, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningKind {
    Attestation,
    Proposal,
    Aggregation,
}

impl std::fmt::Display for SigningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attestation => write!(f, "attestation"),
            Self::Proposal => write!(f, "proposal"),
            Self::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// A fully decoded signing request. Constructing one performs no side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub public_key: Vec<u8>,
    pub domain: Root,
    pub payload: SigningPayload,
}

/// Validator account as exposed by key custody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: Uuid,
    public_key: Vec<u8>,
}

impl Account {
    pub fn new(id: Uuid, public_key: Vec<u8>) -> Self {
        Self { id, public_key }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

/// Stages of the signing pipeline, used in logs and audit context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningStage {
    Received,
    Validated,
    AccountResolved,
    Locked,
    ProtectionChecked,
    Signed,
    Recorded,
    Released,
    Responded,
}

impl std::fmt::Display for SigningStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::AccountResolved => "account_resolved",
            Self::Locked => "locked",
            Self::ProtectionChecked => "protection_checked",
            Self::Signed => "signed",
            Self::Recorded => "recorded",
            Self::Released => "released",
            Self::Responded => "responded",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attestation_request_field_names() {
        let body = serde_json::json!({
            "public_key": "ab",
            "domain": "cd",
            "slot": 1,
            "committeeIndex": 2,
            "beaconBlockRoot": "00",
            "sourceEpoch": 3,
            "sourceRoot": "11",
            "targetEpoch": 4,
            "targetRoot": "22"
        });

        let request: SignAttestationRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.public_key, "ab");
        assert_eq!(request.committee_index, 2);
        assert_eq!(request.target_epoch, 4);
    }

    #[test]
    fn test_aggregation_request_field_names() {
        let body = serde_json::json!({
            "public_key": "ab",
            "domain": "cd",
            "dataToSign": "ef"
        });

        let request: SignAggregationRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.data_to_sign, "ef");
    }

    #[test]
    fn test_missing_field_rejected() {
        let body = serde_json::json!({ "public_key": "ab", "domain": "cd" });
        assert!(serde_json::from_value::<SignProposalRequest>(body).is_err());
    }
}
