//! The native registry call surface.
//!
//! [`RegistryApi`] is the only way this crate touches a registry. Its methods
//! mirror the ANSI registry functions one to one: they take raw handles and
//! byte strings, fill caller buffers, and report a [`Status`] instead of
//! raising. Everything above this trait (sizing, codec, classification) is
//! platform independent.

use crate::ascii::AsciiString;
use crate::error::Status;
use crate::handle::RawKey;

/// Result of a native call that produces a value on success.
pub type NativeResult<T> = std::result::Result<T, Status>;

/// Registry access rights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Access(pub u32);

impl Access {
    /// Query value access.
    pub const QUERY_VALUE: Self = Self(0x0001);

    /// Set value access.
    pub const SET_VALUE: Self = Self(0x0002);

    /// Create subkey access.
    pub const CREATE_SUB_KEY: Self = Self(0x0004);

    /// Enumerate subkeys access.
    pub const ENUMERATE_SUB_KEYS: Self = Self(0x0008);

    /// Read access.
    pub const READ: Self = Self(0x0002_0019);

    /// Write access.
    pub const WRITE: Self = Self(0x0002_0006);

    /// Execute access, identical to [`Access::READ`].
    pub const EXECUTE: Self = Self(0x0002_0019);

    /// Full access.
    pub const ALL: Self = Self(0x000F_003F);

    /// Maps an access-level ordinal to access rights.
    ///
    /// `0` (default) and `1` map to read, `2` to write, `3` to execute and `4`
    /// to all access. Any other ordinal falls back to read.
    pub fn from_ordinal(ordinal: i32) -> Self {
        match ordinal {
            0 | 1 => Self::READ,
            2 => Self::WRITE,
            3 => Self::EXECUTE,
            4 => Self::ALL,
            _ => Self::READ,
        }
    }

    /// Combines two access flags.
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every right in `other` is granted by `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for Access {
    fn default() -> Self {
        Self::READ
    }
}

/// Whether `create_key` made a new key or opened an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The key did not exist and was created.
    CreatedNewKey,
    /// The key existed and was opened.
    OpenedExistingKey,
}

/// Counts and size bounds reported by `query_info_key`.
///
/// Name lengths are in bytes and exclude the terminator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyInfo {
    /// Number of immediate subkeys.
    pub subkeys: u32,
    /// Longest subkey name.
    pub max_subkey_len: u32,
    /// Longest class name.
    pub max_class_len: u32,
    /// Number of values.
    pub values: u32,
    /// Longest value name.
    pub max_value_name_len: u32,
    /// Largest value data.
    pub max_value_len: u32,
}

/// Outcome of a `query_value` call.
///
/// `size` is the data size in bytes. It is reported for both `SUCCESS` and
/// `MORE_DATA`, so a call without a data buffer doubles as a size probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueQuery {
    /// Native status of the call.
    pub status: Status,
    /// Raw stored value type.
    pub kind: u32,
    /// Data size in bytes.
    pub size: u32,
}

/// The native registry functions this crate is built on.
///
/// A handle passed to any method must be open; using a closed handle is a
/// programming error on the caller's side. Implementations perform no locking
/// beyond what the native registry does.
pub trait RegistryApi: Send + Sync {
    /// `RegConnectRegistry`: connects to a predefined root on `host`.
    fn connect_registry(&self, host: &AsciiString, root: RawKey) -> NativeResult<RawKey>;

    /// `RegOpenKeyEx`: opens an existing subkey.
    fn open_key(&self, parent: RawKey, sub_key: &AsciiString, access: Access) -> NativeResult<RawKey>;

    /// `RegCreateKeyEx`: creates or opens a subkey.
    fn create_key(
        &self,
        parent: RawKey,
        sub_key: &AsciiString,
        class: Option<&AsciiString>,
        access: Access,
    ) -> NativeResult<(RawKey, Disposition)>;

    /// `RegCloseKey`.
    fn close_key(&self, key: RawKey) -> Status;

    /// `RegDeleteKey`: deletes a subkey that has no subkeys of its own.
    fn delete_key(&self, key: RawKey, sub_key: &AsciiString) -> Status;

    /// `RegDeleteValue`.
    fn delete_value(&self, key: RawKey, name: &AsciiString) -> Status;

    /// `RegFlushKey`.
    fn flush_key(&self, key: RawKey) -> Status;

    /// `RegQueryValueEx`: reads a value's type, size and (optionally) data.
    ///
    /// With `data == None` only type and size are reported. With a buffer that
    /// is too small the status is `MORE_DATA` and `size` is the required size.
    /// `name == None` addresses the default (unnamed) value.
    fn query_value(&self, key: RawKey, name: Option<&AsciiString>, data: Option<&mut [u8]>) -> ValueQuery;

    /// `RegSetValueEx`: stores `data` verbatim under `kind`.
    fn set_value(&self, key: RawKey, name: Option<&AsciiString>, kind: u32, data: &[u8]) -> Status;

    /// `RegQueryInfoKey`.
    fn query_info_key(&self, key: RawKey) -> NativeResult<KeyInfo>;

    /// `RegEnumKeyEx`: writes the NUL-terminated name of subkey `index` into
    /// `name` and returns its length without the terminator.
    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u8]) -> NativeResult<usize>;

    /// `RegEnumValue`: like [`RegistryApi::enum_key`] for value names.
    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u8]) -> NativeResult<usize>;

    /// `ExpandEnvironmentStrings`: returns the size of the expansion including
    /// its terminator. The expansion is written only when `dst` is large enough.
    fn expand_environment_strings(&self, src: &AsciiString, dst: Option<&mut [u8]>) -> NativeResult<u32>;
}
