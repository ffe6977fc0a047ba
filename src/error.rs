use std::io;

/// Errors surfaced by the patch engine.
///
/// The CLI binary is responsible for mapping these onto the process exit
/// codes described in the tool's usage text; the library itself never
/// exits the process or prints anything.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid magic read from file patch header")]
    InvalidFileMagic,

    #[error("invalid magic read from directory patch header")]
    InvalidDirectoryMagic,

    #[error("crc-32 mismatch: patch was built against a different original")]
    CrcMismatch,

    #[error("crc-32 mismatch while applying directory entry {0:?}")]
    EntryCrcMismatch(String),

    #[error("patch data ended before the declared instruction count was satisfied")]
    TruncatedPatch,

    #[error("decompression failed for a blob using selector {0}")]
    DecompressionFailed(u8),

    #[error("unknown compression selector {0}")]
    UnknownSelector(u8),

    #[error("a stored integer did not fit in its declared width")]
    WidthOverflow,

    #[error("directory entry name exceeded the 7-bit length field")]
    NameTooLong,

    #[error("file entry {0:?} has no operation assigned and cannot be serialized")]
    UnassignedEntry(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::WidthOverflow
    }
}

pub type Result<T> = core::result::Result<T, Error>;
