//! Errors raised while building or comparing the normalized program model.
//!
//! Comparison outcomes that merely fail to match are never errors; these are reserved for inputs
//! that violate the model's invariants (inconsistent geometry, dangling references, ...).

use crate::address::{Address, AddressRegion};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Arithmetic, ordering, or ranging requested on an address that is not rangeable
    #[error("address {0} is not rangeable")]
    NotRangeable(Address),

    /// Two addresses (or spaces) from different regions were combined
    #[error("region mismatch: {left:?} vs {right:?}")]
    RegionMismatch {
        left: AddressRegion,
        right: AddressRegion,
    },

    #[error("inverted address range [{start}, {end})")]
    InvertedRange { start: Address, end: Address },

    /// Address arithmetic left the representable range
    #[error("address arithmetic overflow at {0}")]
    Overflow(Address),

    #[error("live ranges of variable {0:?} overlap in PC")]
    OverlappingLiveRanges(String),

    /// Two ground-truth varnodes in the same region occupy common bytes
    #[error("self-overlapping varnodes at {left} and {right}")]
    SelfOverlap { left: Address, right: Address },

    #[error("no record for key {0}")]
    MissingKey(String),

    #[error("no root key was set")]
    NoRootKey,

    #[error("more than one root key: {0} and {1}")]
    DuplicateRootKey(String, String),

    /// A reference was resolved to an object of the wrong kind
    #[error("key {key} does not refer to a {expected}")]
    UnexpectedObject { key: String, expected: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formatting error")]
    Fmt(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
