//! The native Windows registry.
//!
//! [`Win32Registry`] forwards every [`RegistryApi`] call to the ANSI registry
//! functions. Handles are passed through unchanged, so predefined roots and
//! remote connections keep their native values.

use crate::ascii::AsciiString;
use crate::error::Status;
use crate::handle::RawKey;
use crate::native::{Access, Disposition, KeyInfo, NativeResult, RegistryApi, ValueQuery};
use std::ffi::c_void;
use windows::core::{PCSTR, PSTR};
use windows::Win32::Foundation::{GetLastError, WIN32_ERROR};
use windows::Win32::System::Environment::ExpandEnvironmentStringsA;
use windows::Win32::System::Registry::{
    RegCloseKey, RegConnectRegistryA, RegCreateKeyExA, RegDeleteKeyA, RegDeleteValueA,
    RegEnumKeyExA, RegEnumValueA, RegFlushKey, RegOpenKeyExA, RegQueryInfoKeyA, RegQueryValueExA,
    RegSetValueExA, HKEY, REG_CREATED_NEW_KEY, REG_CREATE_KEY_DISPOSITION, REG_OPTION_NON_VOLATILE,
    REG_SAM_FLAGS, REG_VALUE_TYPE,
};

fn hkey(key: RawKey) -> HKEY {
    HKEY(key.0 as *mut c_void)
}

fn raw(key: HKEY) -> RawKey {
    RawKey(key.0 as isize)
}

fn status(err: WIN32_ERROR) -> Status {
    Status(err.0)
}

fn result(err: WIN32_ERROR) -> NativeResult<()> {
    match status(err) {
        Status::SUCCESS => Ok(()),
        other => Err(other),
    }
}

fn name_ptr(name: Option<&AsciiString>) -> PCSTR {
    name.map_or(PCSTR::null(), AsciiString::as_pcstr)
}

fn buffer_len(buf: &[u8]) -> u32 {
    u32::try_from(buf.len()).unwrap_or(u32::MAX)
}

/// The native registry of the local machine and its remote connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct Win32Registry;

impl Win32Registry {
    /// Creates a handle to the native registry.
    pub fn new() -> Self {
        Self
    }
}

impl RegistryApi for Win32Registry {
    fn connect_registry(&self, host: &AsciiString, root: RawKey) -> NativeResult<RawKey> {
        let mut out = HKEY::default();
        // SAFETY: host is NUL-terminated and out is a valid output location.
        let err = unsafe { RegConnectRegistryA(host.as_pcstr(), hkey(root), &mut out) };
        result(err).map(|()| raw(out))
    }

    fn open_key(&self, parent: RawKey, sub_key: &AsciiString, access: Access) -> NativeResult<RawKey> {
        let mut out = HKEY::default();
        // SAFETY: sub_key is NUL-terminated and out is a valid output location.
        let err = unsafe {
            RegOpenKeyExA(hkey(parent), sub_key.as_pcstr(), 0, REG_SAM_FLAGS(access.0), &mut out)
        };
        result(err).map(|()| raw(out))
    }

    fn create_key(
        &self,
        parent: RawKey,
        sub_key: &AsciiString,
        class: Option<&AsciiString>,
        access: Access,
    ) -> NativeResult<(RawKey, Disposition)> {
        let mut out = HKEY::default();
        let mut disposition = REG_CREATE_KEY_DISPOSITION::default();
        // SAFETY: both strings are NUL-terminated or null, and the output
        // locations live for the duration of the call.
        let err = unsafe {
            RegCreateKeyExA(
                hkey(parent),
                sub_key.as_pcstr(),
                0,
                name_ptr(class),
                REG_OPTION_NON_VOLATILE,
                REG_SAM_FLAGS(access.0),
                None,
                &mut out,
                Some(&mut disposition),
            )
        };
        result(err)?;
        let disposition = if disposition == REG_CREATED_NEW_KEY {
            Disposition::CreatedNewKey
        } else {
            Disposition::OpenedExistingKey
        };
        Ok((raw(out), disposition))
    }

    fn close_key(&self, key: RawKey) -> Status {
        // SAFETY: the caller passes each owned handle here exactly once.
        status(unsafe { RegCloseKey(hkey(key)) })
    }

    fn delete_key(&self, key: RawKey, sub_key: &AsciiString) -> Status {
        // SAFETY: sub_key is NUL-terminated.
        status(unsafe { RegDeleteKeyA(hkey(key), sub_key.as_pcstr()) })
    }

    fn delete_value(&self, key: RawKey, name: &AsciiString) -> Status {
        // SAFETY: name is NUL-terminated.
        status(unsafe { RegDeleteValueA(hkey(key), name.as_pcstr()) })
    }

    fn flush_key(&self, key: RawKey) -> Status {
        // SAFETY: key is an open handle.
        status(unsafe { RegFlushKey(hkey(key)) })
    }

    fn query_value(&self, key: RawKey, name: Option<&AsciiString>, data: Option<&mut [u8]>) -> ValueQuery {
        let mut kind = REG_VALUE_TYPE::default();
        let (ptr, mut size) = match data {
            Some(buf) => (Some(buf.as_mut_ptr()), buffer_len(buf)),
            None => (None, 0),
        };
        // SAFETY: ptr is either None or points to a buffer of `size` bytes.
        let err = unsafe {
            RegQueryValueExA(
                hkey(key),
                name_ptr(name),
                None,
                Some(&mut kind),
                ptr,
                Some(&mut size),
            )
        };
        ValueQuery {
            status: status(err),
            kind: kind.0,
            size,
        }
    }

    fn set_value(&self, key: RawKey, name: Option<&AsciiString>, kind: u32, data: &[u8]) -> Status {
        // SAFETY: data is borrowed for the duration of the call only.
        status(unsafe { RegSetValueExA(hkey(key), name_ptr(name), 0, REG_VALUE_TYPE(kind), Some(data)) })
    }

    fn query_info_key(&self, key: RawKey) -> NativeResult<KeyInfo> {
        let mut info = KeyInfo::default();
        // SAFETY: every output location is a valid u32 for the duration of the call.
        let err = unsafe {
            RegQueryInfoKeyA(
                hkey(key),
                PSTR::null(),
                None,
                None,
                Some(&mut info.subkeys),
                Some(&mut info.max_subkey_len),
                Some(&mut info.max_class_len),
                Some(&mut info.values),
                Some(&mut info.max_value_name_len),
                Some(&mut info.max_value_len),
                None,
                None,
            )
        };
        result(err).map(|()| info)
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u8]) -> NativeResult<usize> {
        let mut len = buffer_len(name);
        // SAFETY: name is a writable buffer of `len` bytes.
        let err = unsafe {
            RegEnumKeyExA(
                hkey(key),
                index,
                PSTR(name.as_mut_ptr()),
                &mut len,
                None,
                PSTR::null(),
                None,
                None,
            )
        };
        result(err).map(|()| len as usize)
    }

    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u8]) -> NativeResult<usize> {
        let mut len = buffer_len(name);
        // SAFETY: name is a writable buffer of `len` bytes.
        let err = unsafe {
            RegEnumValueA(
                hkey(key),
                index,
                PSTR(name.as_mut_ptr()),
                &mut len,
                None,
                None,
                None,
                None,
            )
        };
        result(err).map(|()| len as usize)
    }

    fn expand_environment_strings(&self, src: &AsciiString, dst: Option<&mut [u8]>) -> NativeResult<u32> {
        // SAFETY: src is NUL-terminated and dst, if any, is a writable slice.
        let size = unsafe { ExpandEnvironmentStringsA(src.as_pcstr(), dst) };
        if size == 0 {
            // SAFETY: reads the calling thread's last-error value.
            return Err(status(unsafe { GetLastError() }));
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Predefined;

    #[test]
    fn test_predefined_handles_match_native() {
        use windows::Win32::System::Registry::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};
        assert_eq!(raw(HKEY_CURRENT_USER), Predefined::CurrentUser.raw());
        assert_eq!(raw(HKEY_LOCAL_MACHINE), Predefined::LocalMachine.raw());
    }

    #[test]
    fn test_query_missing_value() {
        let api = Win32Registry::new();
        let name = AsciiString::new("registry-bridge-missing-value").unwrap();
        let query = api.query_value(Predefined::CurrentUser.raw(), Some(&name), None);
        assert_eq!(query.status, Status::FILE_NOT_FOUND);
    }

    #[test]
    fn test_expand_windir() {
        let api = Win32Registry::new();
        let src = AsciiString::new("%windir%").unwrap();
        let size = api.expand_environment_strings(&src, None).unwrap();
        assert!(size > 1);
    }
}
