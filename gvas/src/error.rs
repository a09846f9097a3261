use thiserror::Error;

/// Broad failure classes, used by callers that only care about how to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input is corrupt or truncated.
    MalformedInput,
    /// The input uses a format variant this crate does not implement.
    UnsupportedFormat,
    /// A property type name has no decoder.
    UnknownType,
    /// Two registrations claimed the same name.
    ExtensibilityConflict,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed string: {0}")]
    MalformedString(String),
    #[error("bad magic value: {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("property {name:?} declares {declared} bytes but {actual} were processed")]
    SizeMismatch {
        name: String,
        declared: i64,
        actual: i64,
    },
    #[error(
        "custom header for {save_class:?} declared {declared} bytes but {written} were written"
    )]
    CustomHeaderSizeMismatch {
        save_class: String,
        declared: u64,
        written: u64,
    },
    #[error("{0} bytes remain after the end of the save data")]
    TrailingData(usize),
    #[error("unsupported save game version: {0}")]
    UnsupportedSaveGameVersion(i32),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("unknown property type: {0}")]
    UnknownPropertyType(String),
    #[error("{0:?} is already registered")]
    ExtensibilityConflict(String),
    #[error("{0}")]
    Other(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedString(_)
            | Error::BadMagic(_)
            | Error::SizeMismatch { .. }
            | Error::CustomHeaderSizeMismatch { .. }
            | Error::TrailingData(_)
            | Error::Other(_)
            | Error::Io(_) => ErrorKind::MalformedInput,
            Error::UnsupportedSaveGameVersion(_) | Error::NotSupported(_) => {
                ErrorKind::UnsupportedFormat
            }
            Error::UnknownPropertyType(_) => ErrorKind::UnknownType,
            Error::ExtensibilityConflict(_) => ErrorKind::ExtensibilityConflict,
        }
    }
}

/// An [`Error`] together with the stream offset at which decoding stopped.
#[derive(Error, Debug)]
#[error("at offset {offset}: {error}")]
pub struct ParseError {
    pub offset: usize,
    pub error: Error,
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
