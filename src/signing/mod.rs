//! Validator signing core.
//!
//! ## Components
//!
//! - [`AccountLock`]: durable per-account mutual exclusion with TTL reclaim
//! - [`SlashingProtectionGuard`]: per-account attestation/proposal watermarks
//! - [`KeyCustody`]: account lookup and raw signing
//! - [`SigningService`]: the request pipeline tying them together
//!
//! Wire requests carry hex strings; [`SigningRequest`] is the decoded form and
//! is only built through `TryFrom` on the wire types.

pub mod custody;
mod decode;
pub mod lock;
pub mod protection;
pub mod root;
pub mod service;
pub mod types;

pub use custody::{KeyCustody, LocalKeyCustody};
pub use lock::{AccountLock, AccountLockGuard, LockPolicy, LockRecord};
pub use protection::{ProtectionRecord, SlashingProtectionGuard, Violation};
pub use root::signing_root;
pub use service::SigningService;
pub use types::{
    Account, AttestationData, BeaconBlockHeader, Checkpoint, Root, SignAggregationRequest,
    SignAttestationRequest, SignProposalRequest, SignatureResponse, SigningKind, SigningPayload,
    SigningRequest, SigningStage,
};
