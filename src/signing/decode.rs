//! Boundary decoding from hex wire requests to typed signing requests.
//!
//! Every byte field is decoded here, before any account lookup or storage
//! access. Any failure is an `InvalidInput` error naming the field.

use crate::error::{SignerError, SignerResult};
use crate::signing::types::{
    AttestationData, BeaconBlockHeader, Checkpoint, Root, SignAggregationRequest,
    SignAttestationRequest, SignProposalRequest, SigningPayload, SigningRequest,
};

/// Decode a hex field into bytes.
fn decode_hex(field: &str, value: &str) -> SignerResult<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| SignerError::InvalidInput(format!("Failed to HEX decode {field}: {e}")))
}

/// Decode a hex field that must be exactly 32 bytes.
fn decode_root(field: &str, value: &str) -> SignerResult<Root> {
    let bytes = decode_hex(field, value)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        SignerError::InvalidInput(format!("Invalid {field} length: expected 32 bytes, got {len}"))
    })
}

fn decode_public_key(value: &str) -> SignerResult<Vec<u8>> {
    let bytes = decode_hex("public key", value)?;
    if bytes.is_empty() {
        return Err(SignerError::InvalidInput("Missing public key".to_string()));
    }
    Ok(bytes)
}

impl TryFrom<&SignAttestationRequest> for SigningRequest {
    type Error = SignerError;

    fn try_from(request: &SignAttestationRequest) -> SignerResult<Self> {
        Ok(Self {
            public_key: decode_public_key(&request.public_key)?,
            domain: decode_root("domain", &request.domain)?,
            payload: SigningPayload::Attestation(AttestationData {
                slot: request.slot,
                committee_index: request.committee_index,
                beacon_block_root: decode_root("beacon block root", &request.beacon_block_root)?,
                source: Checkpoint {
                    epoch: request.source_epoch,
                    root: decode_root("source root", &request.source_root)?,
                },
                target: Checkpoint {
                    epoch: request.target_epoch,
                    root: decode_root("target root", &request.target_root)?,
                },
            }),
        })
    }
}

impl TryFrom<&SignProposalRequest> for SigningRequest {
    type Error = SignerError;

    fn try_from(request: &SignProposalRequest) -> SignerResult<Self> {
        Ok(Self {
            public_key: decode_public_key(&request.public_key)?,
            domain: decode_root("domain", &request.domain)?,
            payload: SigningPayload::Proposal(BeaconBlockHeader {
                slot: request.slot,
                proposer_index: request.proposer_index,
                parent_root: decode_root("parent root", &request.parent_root)?,
                state_root: decode_root("state root", &request.state_root)?,
                body_root: decode_root("body root", &request.body_root)?,
            }),
        })
    }
}

impl TryFrom<&SignAggregationRequest> for SigningRequest {
    type Error = SignerError;

    fn try_from(request: &SignAggregationRequest) -> SignerResult<Self> {
        let data = decode_hex("data to sign", &request.data_to_sign)?;
        if data.is_empty() {
            return Err(SignerError::InvalidInput("Missing data to sign".to_string()));
        }

        Ok(Self {
            public_key: decode_public_key(&request.public_key)?,
            domain: decode_root("domain", &request.domain)?,
            payload: SigningPayload::Aggregation(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_hex(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    fn attestation() -> SignAttestationRequest {
        SignAttestationRequest {
            public_key: "aa".repeat(32),
            domain: root_hex(1),
            slot: 284_115,
            committee_index: 2,
            beacon_block_root: root_hex(2),
            source_epoch: 8877,
            source_root: root_hex(3),
            target_epoch: 8878,
            target_root: root_hex(4),
        }
    }

    #[test]
    fn test_decode_attestation() {
        let request = SigningRequest::try_from(&attestation()).unwrap();
        assert_eq!(request.domain, [1; 32]);
        let SigningPayload::Attestation(data) = request.payload else {
            panic!("expected attestation payload");
        };
        assert_eq!(data.source.epoch, 8877);
        assert_eq!(data.target.root, [4; 32]);
    }

    #[test]
    fn test_malformed_hex_names_field() {
        let mut request = attestation();
        request.target_root = "zz".to_string();
        let err = SigningRequest::try_from(&request).unwrap_err();
        assert!(matches!(err, SignerError::InvalidInput(_)));
        assert!(err.to_string().contains("target root"));
    }

    #[test]
    fn test_short_root_rejected() {
        let mut request = attestation();
        request.domain = "0102".to_string();
        let err = SigningRequest::try_from(&request).unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes, got 2"));
    }

    #[test]
    fn test_empty_public_key_rejected() {
        let mut request = attestation();
        request.public_key = String::new();
        assert!(matches!(
            SigningRequest::try_from(&request),
            Err(SignerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_decode_aggregation() {
        let request = SignAggregationRequest {
            public_key: "bb".repeat(32),
            domain: root_hex(9),
            data_to_sign: "deadbeef".to_string(),
        };
        let decoded = SigningRequest::try_from(&request).unwrap();
        assert_eq!(
            decoded.payload,
            SigningPayload::Aggregation(vec![0xde, 0xad, 0xbe, 0xef])
        );
    }
}
