//! Error types.

use std::io;
use std::num::{ParseFloatError, ParseIntError};

use crate::people::StorageIndex;
use crate::{ModName, NetName, StringId, Uid};

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(String),

    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),
    #[error("toml serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
    #[error("csv error: {0}")]
    CsvError(String),

    #[error("parsing error: {0}")]
    ParsingError(String),
    #[error("failed parsing int: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("failed parsing float: {0}")]
    ParseFloatError(#[from] ParseFloatError),

    #[error("invalid parameter value: {0}")]
    InvalidParam(String),
    #[error("invalid distribution: {0}")]
    InvalidDist(String),

    #[error("stream handle used before registration")]
    StreamHandleInvalid,
    #[error("stream already sampled on this timestep: {0}")]
    StreamAlreadySampled(StringId),
    #[error("stream named \"{0}\" has already been registered")]
    StreamNameTaken(StringId),
    #[error("seed offset {1} for stream \"{0}\" has already been used")]
    StreamSeedTaken(StringId, u64),
    #[error("agent {0} has no slot assigned")]
    NoSlot(Uid),

    #[error("no agent with uid: {0}")]
    NoAgent(Uid),
    #[error("no population state registered under: {}.{}", _0.0, _0.1)]
    NoState(StorageIndex),
    #[error("population state type mismatch for: {}.{}", _0.0, _0.1)]
    StateTypeMismatch(StorageIndex),
    #[error("no network named: {0}")]
    NoNetwork(NetName),
    #[error("no disease named: {0}")]
    NoDisease(ModName),
    #[error("no result series named: {0}.{1}")]
    NoResult(ModName, StringId),

    #[error("failed reading snapshot: {0}")]
    FailedReadingSnapshot(String),
    #[error("failed creating snapshot: {0}")]
    FailedCreatingSnapshot(String),
    #[cfg(feature = "lz4")]
    #[error("failed decompressing snapshot: {0}")]
    SnapshotDecompressionError(String),

    #[error("failed reading scenario: {0}")]
    ScenarioError(String),

    #[error("other error: {0}")]
    Other(String),
}
