//! Storage layer for the validator signer.
//!
//! Uses ReDB for embedded key-value storage with ACID transactions.
//! Lock records and protection watermarks live in the same database file,
//! which is the only coordination medium between signing requests.

pub mod redb;

pub use self::redb::{ConditionalPut, Storage};
