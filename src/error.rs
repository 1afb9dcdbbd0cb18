//! Error type shared by every table operation.

use std::collections::TryReserveError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("allocation failed: {0}")]
    Alloc(#[from] TryReserveError),

    #[error("table needs at least one bucket")]
    NoBuckets,

    #[error("key length {found} does not match table key length {expected}")]
    KeyLength { expected: usize, found: usize },

    #[error("entry already linked into a table")]
    AlreadyLinked,

    #[error("entry is not linked into a table")]
    NotLinked,

    #[error("entry still linked, unlink before destroy")]
    StillLinked,

    #[error("stale entry handle")]
    StaleEntry,

    #[error("bucket {bucket} corrupted: {reason}")]
    Corrupted { bucket: usize, reason: &'static str },

    #[error("table records {recorded} linked entries but {counted} are reachable")]
    CountMismatch { recorded: usize, counted: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
