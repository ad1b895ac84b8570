//! Registry key handles and the contracts the object layer implements.
//!
//! A [`RawKey`] is the opaque native handle. The object layer that owns keys and
//! values exposes them through [`KeyObject`] and [`crate::value::ValueObject`];
//! [`resolve`] is the single place a key object is turned into a handle and name.

use crate::error::{IntegrityError, Result};

/// An opaque native registry key handle.
///
/// Predefined roots use the sign-extended values `0x80000000..=0x80000006`,
/// matching the native headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawKey(pub isize);

impl RawKey {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Returns true if this is the null handle.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this handle is one of the predefined local roots.
    #[inline]
    pub fn is_predefined(self) -> bool {
        self.0 >= Predefined::ClassesRoot.raw().0 && self.0 <= Predefined::DynData.raw().0
    }

    /// Returns true if this handle refers to a remote registry connection.
    ///
    /// Predefined roots are always local. Any other handle is remote when its
    /// low bit is set.
    #[inline]
    pub fn is_remote(self) -> bool {
        if self.is_predefined() {
            return false;
        }
        let dw = self.0 as u32;
        (!dw) & 1 == 0
    }
}

/// The predefined root keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Predefined {
    /// HKEY_CLASSES_ROOT - File associations and COM object registration.
    ClassesRoot,
    /// HKEY_CURRENT_USER - Settings for the current user.
    CurrentUser,
    /// HKEY_LOCAL_MACHINE - System-wide settings.
    LocalMachine,
    /// HKEY_USERS - Settings for all user profiles.
    Users,
    /// HKEY_PERFORMANCE_DATA - Performance counters.
    PerformanceData,
    /// HKEY_CURRENT_CONFIG - Current hardware profile.
    CurrentConfig,
    /// HKEY_DYN_DATA - Dynamic data on legacy systems.
    DynData,
}

impl Predefined {
    /// All predefined roots, in handle order.
    pub const ALL: [Self; 7] = [
        Self::ClassesRoot,
        Self::CurrentUser,
        Self::LocalMachine,
        Self::Users,
        Self::PerformanceData,
        Self::CurrentConfig,
        Self::DynData,
    ];

    /// The native handle value of this root.
    #[inline]
    pub const fn raw(self) -> RawKey {
        let base = 0x8000_0000u32 as i32 as isize;
        RawKey(base + self as isize)
    }

    /// The display name used as the root of every full key path.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKEY_CLASSES_ROOT",
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
            Self::Users => "HKEY_USERS",
            Self::PerformanceData => "HKEY_PERFORMANCE_DATA",
            Self::CurrentConfig => "HKEY_CURRENT_CONFIG",
            Self::DynData => "HKEY_DYN_DATA",
        }
    }

    /// Looks up the root for a predefined handle value.
    pub fn from_raw(raw: RawKey) -> Option<Self> {
        Self::ALL.into_iter().find(|root| root.raw() == raw)
    }
}

/// What the object layer must expose for a registry key.
///
/// `None` from an accessor means the object does not carry the field at all,
/// which [`resolve`] reports as an integrity error.
pub trait KeyObject {
    /// The native handle.
    fn raw_key(&self) -> Option<RawKey>;

    /// The fully-qualified key path, e.g. `HKEY_LOCAL_MACHINE\Software\X`.
    fn key_name(&self) -> Option<&str>;

    /// Whether the key was freshly created when it was opened.
    fn was_created(&self) -> bool;
}

/// A key object's handle and recorded path, resolved once per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedKey<'a> {
    /// The native handle.
    pub raw: RawKey,
    /// The recorded full path.
    pub name: &'a str,
}

/// Extracts the native handle and full path name from a key object.
///
/// # Errors
///
/// Returns [`IntegrityError::MissingField`] if the object does not expose a
/// handle or a name.
pub fn resolve<K: KeyObject + ?Sized>(key: &K) -> Result<ResolvedKey<'_>> {
    let raw = key.raw_key().ok_or(IntegrityError::MissingField("key"))?;
    let name = key.key_name().ok_or(IntegrityError::MissingField("name"))?;
    Ok(ResolvedKey { raw, name })
}
