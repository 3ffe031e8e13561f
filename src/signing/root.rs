//! Signing root computation.
//!
//! The bytes handed to key custody are `hash_tree_root(SigningData)` where
//! `SigningData = (object_root, domain)`, following SSZ merkleization over
//! SHA-256. Binding the domain into the root keeps a signature produced for
//! one context from verifying in another.

use sha2::{Digest, Sha256};

use crate::signing::types::{
    AttestationData, BeaconBlockHeader, Checkpoint, Root, SigningPayload, SigningRequest,
};

const ZERO_CHUNK: Root = [0u8; 32];

fn hash_pair(left: &Root, right: &Root) -> Root {
    Sha256::new()
        .chain_update(left)
        .chain_update(right)
        .finalize()
        .into()
}

/// uint64 serialized little-endian and right-padded to one chunk.
fn uint64_chunk(value: u64) -> Root {
    let mut chunk = ZERO_CHUNK;
    chunk[..8].copy_from_slice(&value.to_le_bytes());
    chunk
}

/// Merkle root of `chunks`, padded with zero chunks to the next power of two.
fn merkleize(chunks: &[Root]) -> Root {
    if chunks.is_empty() {
        return ZERO_CHUNK;
    }

    let mut layer = chunks.to_vec();
    layer.resize(chunks.len().next_power_of_two(), ZERO_CHUNK);

    while layer.len() > 1 {
        layer = layer
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }

    layer[0]
}

/// Pack raw bytes into zero-padded chunks and merkleize them.
fn bytes_root(bytes: &[u8]) -> Root {
    let chunks: Vec<Root> = bytes
        .chunks(32)
        .map(|piece| {
            let mut chunk = ZERO_CHUNK;
            chunk[..piece.len()].copy_from_slice(piece);
            chunk
        })
        .collect();
    merkleize(&chunks)
}

fn checkpoint_root(checkpoint: &Checkpoint) -> Root {
    merkleize(&[uint64_chunk(checkpoint.epoch), checkpoint.root])
}

fn attestation_root(data: &AttestationData) -> Root {
    merkleize(&[
        uint64_chunk(data.slot),
        uint64_chunk(data.committee_index),
        data.beacon_block_root,
        checkpoint_root(&data.source),
        checkpoint_root(&data.target),
    ])
}

fn block_header_root(header: &BeaconBlockHeader) -> Root {
    merkleize(&[
        uint64_chunk(header.slot),
        uint64_chunk(header.proposer_index),
        header.parent_root,
        header.state_root,
        header.body_root,
    ])
}

/// Object root of the request payload.
pub fn object_root(payload: &SigningPayload) -> Root {
    match payload {
        SigningPayload::Attestation(data) => attestation_root(data),
        SigningPayload::Proposal(header) => block_header_root(header),
        SigningPayload::Aggregation(bytes) => bytes_root(bytes),
    }
}

/// Root that custody signs for `request`.
pub fn signing_root(request: &SigningRequest) -> Root {
    merkleize(&[object_root(&request.payload), request.domain])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_checkpoint_root() {
        // hash(zero_chunk || zero_chunk), the first SSZ zero-hash
        let root = checkpoint_root(&Checkpoint {
            epoch: 0,
            root: ZERO_CHUNK,
        });
        assert_eq!(
            hex::encode(root),
            "f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b"
        );
    }

    #[test]
    fn test_single_chunk_is_its_own_root() {
        let data = [7u8; 32];
        assert_eq!(bytes_root(&data), data);
    }

    #[test]
    fn test_aggregation_signing_root() {
        let data = [7u8; 32];
        let domain = [9u8; 32];
        let request = SigningRequest {
            public_key: vec![1],
            domain,
            payload: SigningPayload::Aggregation(data.to_vec()),
        };

        let expected: Root = Sha256::new()
            .chain_update(data)
            .chain_update(domain)
            .finalize()
            .into();
        assert_eq!(signing_root(&request), expected);
    }

    #[test]
    fn test_domain_changes_signing_root() {
        let header = BeaconBlockHeader {
            slot: 10,
            proposer_index: 3,
            parent_root: [1; 32],
            state_root: [2; 32],
            body_root: [3; 32],
        };
        let a = SigningRequest {
            public_key: vec![1],
            domain: [0; 32],
            payload: SigningPayload::Proposal(header),
        };
        let b = SigningRequest {
            domain: [1; 32],
            ..a.clone()
        };
        assert_ne!(signing_root(&a), signing_root(&b));
    }

    #[test]
    fn test_uint64_chunk_is_little_endian() {
        let chunk = uint64_chunk(0x0102);
        assert_eq!(chunk[0], 0x02);
        assert_eq!(chunk[1], 0x01);
        assert!(chunk[2..].iter().all(|b| *b == 0));
    }
}
