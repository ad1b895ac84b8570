//! Error handling for registry calls.
//!
//! Every native registry function reports a [`Status`]. A non-success status is
//! turned into an [`Error`] by [`classify`], which picks one of the three
//! registry-domain kinds ([`Error::NoSuchKey`], [`Error::NoSuchValue`],
//! [`Error::Registry`]) from the status and the supplied [`Context`].

use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Upper bound, in characters, for each field interpolated into a not-found message.
pub const MESSAGE_FIELD_LIMIT: usize = 200;

/// Raw result code of a native registry call. Zero is success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Status(pub u32);

impl Status {
    /// The operation completed successfully.
    pub const SUCCESS: Self = Self(0);
    /// The system cannot find the file (key or value) specified.
    pub const FILE_NOT_FOUND: Self = Self(2);
    /// Access is denied.
    pub const ACCESS_DENIED: Self = Self(5);
    /// The handle is invalid.
    pub const INVALID_HANDLE: Self = Self(6);
    /// The parameter is incorrect.
    pub const INVALID_PARAMETER: Self = Self(87);
    /// This function is not supported on this system.
    pub const CALL_NOT_IMPLEMENTED: Self = Self(120);
    /// The data area passed to a system call is too small.
    pub const INSUFFICIENT_BUFFER: Self = Self(122);
    /// Unable to lock a region of a file.
    pub const LOCK_FAILED: Self = Self(167);
    /// More data is available.
    pub const MORE_DATA: Self = Self(234);
    /// No more data is available.
    pub const NO_MORE_ITEMS: Self = Self(259);
    /// The configuration registry database is corrupt.
    pub const BADDB: Self = Self(1009);
    /// The configuration registry key is invalid.
    pub const BADKEY: Self = Self(1010);
    /// The configuration registry key could not be opened.
    pub const CANTOPEN: Self = Self(1011);
    /// The configuration registry key could not be read.
    pub const CANTREAD: Self = Self(1012);
    /// The configuration registry key could not be written.
    pub const CANTWRITE: Self = Self(1013);
    /// A registry file had to be recovered from a log or alternate copy.
    pub const REGISTRY_RECOVERED: Self = Self(1014);
    /// The registry is corrupted.
    pub const REGISTRY_CORRUPT: Self = Self(1015);
    /// An I/O operation initiated by the registry failed unrecoverably.
    pub const REGISTRY_IO_FAILED: Self = Self(1016);
    /// The file is not a registry file.
    pub const NOT_REGISTRY_FILE: Self = Self(1017);
    /// Illegal operation attempted on a key marked for deletion.
    pub const KEY_DELETED: Self = Self(1018);
    /// The network path was not found.
    pub const BAD_NETPATH: Self = Self(53);

    /// Returns true for [`Status::SUCCESS`].
    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Returns true for [`Status::FILE_NOT_FOUND`].
    #[inline]
    pub fn is_not_found(self) -> bool {
        self == Self::FILE_NOT_FOUND
    }

    /// Short description of the code. Unknown codes describe as an empty string.
    pub fn description(self) -> &'static str {
        match self {
            Self::FILE_NOT_FOUND => "not found",
            Self::ACCESS_DENIED => "access denied",
            Self::INVALID_HANDLE => "invalid handle",
            Self::INVALID_PARAMETER => "invalid parameter",
            Self::CALL_NOT_IMPLEMENTED => "call not implemented",
            Self::INSUFFICIENT_BUFFER => "insufficient buffer",
            Self::LOCK_FAILED => "lock failed",
            Self::MORE_DATA => "more data",
            Self::NO_MORE_ITEMS => "no more items",
            Self::BADDB => "bad DB",
            Self::BADKEY => "bad key",
            Self::CANTOPEN => "can not open",
            Self::CANTREAD => "can not read",
            Self::CANTWRITE => "can not write",
            Self::REGISTRY_RECOVERED => "registry recovered",
            Self::REGISTRY_CORRUPT => "registry corrupt",
            Self::REGISTRY_IO_FAILED => "registry IO failed",
            Self::NOT_REGISTRY_FILE => "not a registry file",
            Self::KEY_DELETED => "key has been deleted",
            _ => "",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Violations of the contract between this crate and the object layer calling it.
///
/// These never describe a registry condition. They mean the caller's key or
/// value object does not look the way the codec expects, and retrying cannot help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// A required field was absent on a collaborator object.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// The payload held by a value object does not match its declared type.
    #[error("payload `{found}` does not match declared value type {declared}")]
    PayloadMismatch {
        /// Raw declared value type.
        declared: u32,
        /// Name of the payload variant actually held.
        found: &'static str,
    },
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A "not found" status reported while addressing a key.
    #[error("{message}")]
    NoSuchKey {
        /// Operation label and key path.
        message: String,
    },

    /// A "not found" status reported while addressing a value.
    #[error("{message}")]
    NoSuchValue {
        /// Operation label and value name.
        message: String,
    },

    /// Any other failed registry call.
    #[error("{message}")]
    Registry {
        /// The native status code.
        code: Status,
        /// Short description of `code`, empty for unknown codes.
        description: &'static str,
        /// Formatted message including code, description and operation.
        message: String,
    },

    /// An internal buffer could not be allocated.
    #[error("Out of memory: {context}")]
    OutOfMemory {
        /// Which allocation failed.
        context: &'static str,
    },

    /// The calling object layer broke its contract with this crate.
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),
}

/// A specialized `Result` type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a generic registry error carrying `code`.
    pub fn registry(code: Status, operation: &str) -> Self {
        let description = code.description();
        let message = format!(
            "Registry API Error {}, '{}' - '{}'",
            code,
            truncate(description, 128),
            truncate(operation, 256)
        );
        Error::Registry {
            code,
            description,
            message,
        }
    }

    /// Creates an invalid-parameter registry error.
    pub fn invalid_parameter(context: impl AsRef<str>) -> Self {
        Self::registry(Status::INVALID_PARAMETER, context.as_ref())
    }

    /// Creates an out-of-memory error for the named allocation.
    pub fn out_of_memory(context: &'static str) -> Self {
        Error::OutOfMemory { context }
    }

    /// Returns the native status code for registry errors.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Registry { code, .. } => Some(*code),
            Error::NoSuchKey { .. } | Error::NoSuchValue { .. } => Some(Status::FILE_NOT_FOUND),
            _ => None,
        }
    }

    /// Returns true for [`Error::NoSuchKey`] and [`Error::NoSuchValue`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoSuchKey { .. } | Error::NoSuchValue { .. })
    }

    /// Returns true for errors that indicate a broken caller rather than a registry condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }
}

/// Which key or value a failed call was addressing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context<'a> {
    /// Key path, when the call addressed a key.
    pub key: Option<&'a str>,
    /// Value name, when the call addressed a value.
    pub value: Option<&'a str>,
}

impl<'a> Context<'a> {
    /// No key or value context.
    pub const fn none() -> Self {
        Self {
            key: None,
            value: None,
        }
    }

    /// The call addressed the key at `path`.
    pub const fn key(path: &'a str) -> Self {
        Self {
            key: Some(path),
            value: None,
        }
    }

    /// The call addressed the value `name`.
    pub const fn value(name: &'a str) -> Self {
        Self {
            key: None,
            value: Some(name),
        }
    }
}

/// Maps a failed native status to an error.
///
/// A not-found status becomes [`Error::NoSuchKey`] when a key context is given,
/// else [`Error::NoSuchValue`] when a value context is given. Everything else,
/// including not-found without context, becomes [`Error::Registry`].
pub fn classify(status: Status, operation: &str, context: Context<'_>) -> Error {
    warn!(status = status.0, operation, key = ?context.key, value = ?context.value, "registry call failed");

    if !status.is_not_found() {
        return Error::registry(status, operation);
    }

    match (context.key, context.value) {
        (Some(key), _) => Error::NoSuchKey {
            message: format!(
                "{}, key='{}'",
                truncate(operation, MESSAGE_FIELD_LIMIT),
                truncate(key, MESSAGE_FIELD_LIMIT)
            ),
        },
        (None, Some(value)) => Error::NoSuchValue {
            message: format!(
                "{}, value='{}'",
                truncate(operation, MESSAGE_FIELD_LIMIT),
                truncate(value, MESSAGE_FIELD_LIMIT)
            ),
        },
        (None, None) => Error::registry(status, operation),
    }
}

/// Converts a status into `Ok(())` or a classified error.
#[inline]
pub fn check(status: Status, operation: &str, context: Context<'_>) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(classify(status, operation, context))
    }
}

fn truncate(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
