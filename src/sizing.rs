//! The two-call buffer-sizing protocol.
//!
//! Variable-length reads first probe the native layer for the required size,
//! then allocate and read. The allocation carries [`SIZE_MARGIN`] extra bytes
//! because the size reported by the probe and by the real read may differ by a
//! terminator.
//!
//! Remote connections on legacy systems under-report the longest subkey and
//! value name. [`remote_corrected`] applies the usual `2 * len + 2` fix to
//! those two bounds only.

use crate::ascii::AsciiString;
use crate::error::{check, classify, Context, Error, Result, Status};
use crate::handle::RawKey;
use crate::native::{KeyInfo, RegistryApi};
use tracing::trace;

/// Extra bytes allocated beyond a probed size.
pub const SIZE_MARGIN: usize = 8;

/// Allocates a zeroed buffer, reporting failure as [`Error::OutOfMemory`].
pub fn alloc_zeroed(len: usize, context: &'static str) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| Error::out_of_memory(context))?;
    buffer.resize(len, 0);
    trace!(len, context, "allocated buffer");
    Ok(buffer)
}

/// Number of bytes to allocate for a probed size.
#[inline]
pub fn allocation_size(probed: u32) -> usize {
    probed as usize + SIZE_MARGIN
}

/// Applies the remote-registry name length correction.
///
/// Returns `2 * len + 2` for remote handles and `len` unchanged otherwise.
#[inline]
pub fn remote_corrected(len: u32, key: RawKey) -> u32 {
    if key.is_remote() {
        len.saturating_mul(2).saturating_add(2)
    } else {
        len
    }
}

/// Type and size of a value, as reported by the size probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Probe {
    /// Raw stored value type.
    pub kind: u32,
    /// Data size in bytes.
    pub size: u32,
}

/// Data returned by the second call of the protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueData {
    /// Raw stored value type.
    pub kind: u32,
    /// Exactly the bytes reported by the native layer.
    pub bytes: Vec<u8>,
}

/// A value name with the label used for it in error messages.
#[derive(Clone, Copy, Debug)]
pub struct ValueRef<'a> {
    /// Native name, `None` for the default value.
    pub name: Option<&'a AsciiString>,
    /// Name shown in messages.
    pub display: &'a str,
}

impl<'a> ValueRef<'a> {
    /// A named value.
    pub fn named(name: &'a AsciiString, display: &'a str) -> Self {
        Self {
            name: Some(name),
            display,
        }
    }

    /// The default (unnamed) value of a key.
    pub fn default_value() -> Self {
        Self {
            name: None,
            display: "(default)",
        }
    }
}

/// First call: asks for the value's type and size without a data buffer.
///
/// `SUCCESS` and `MORE_DATA` are both accepted.
pub fn probe_value(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<Probe> {
    let query = api.query_value(key, value.name, None);
    trace!(value = value.display, status = query.status.0, size = query.size, kind = query.kind, "size probe");
    if query.status != Status::SUCCESS && query.status != Status::MORE_DATA {
        return Err(classify(query.status, "RegQueryValueEx()", Context::value(value.display)));
    }
    Ok(Probe {
        kind: query.kind,
        size: query.size,
    })
}

/// Second call: reads the data into a buffer of `probe.size + SIZE_MARGIN` bytes.
pub fn read_value(
    api: &dyn RegistryApi,
    key: RawKey,
    value: ValueRef<'_>,
    probe: Probe,
) -> Result<ValueData> {
    let mut buffer = alloc_zeroed(allocation_size(probe.size), "value data buffer")?;
    let query = api.query_value(key, value.name, Some(&mut buffer));
    check(query.status, "RegQueryValueEx()", Context::value(value.display))?;
    buffer.truncate(query.size as usize);
    Ok(ValueData {
        kind: query.kind,
        bytes: buffer,
    })
}

/// Runs both calls of the protocol.
pub fn query_value_data(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<ValueData> {
    let probe = probe_value(api, key, value)?;
    read_value(api, key, value, probe)
}

/// Queries key information, classifying failure as a generic registry error.
pub fn query_info(api: &dyn RegistryApi, key: RawKey) -> Result<KeyInfo> {
    api.query_info_key(key)
        .map_err(|status| classify(status, "RegQueryInfoKey()", Context::none()))
}

/// Longest subkey name, corrected for remote handles.
pub fn max_subkey_name_length(api: &dyn RegistryApi, key: RawKey) -> Result<u32> {
    let info = query_info(api, key)?;
    Ok(remote_corrected(info.max_subkey_len, key))
}

/// Longest value name, corrected for remote handles.
pub fn max_value_name_length(api: &dyn RegistryApi, key: RawKey) -> Result<u32> {
    let info = query_info(api, key)?;
    Ok(remote_corrected(info.max_value_name_len, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Predefined;
    use crate::memory::MemoryRegistry;
    use crate::native::Access;
    use proptest::prelude::*;

    fn name(s: &str) -> AsciiString {
        AsciiString::new(s).unwrap()
    }

    #[test]
    fn test_probe_then_read() {
        let api = MemoryRegistry::new();
        let root = Predefined::CurrentUser.raw();
        let value_name = name("Blob");
        api.set_value(root, Some(&value_name), 3, &[1, 2, 3, 4, 5]);

        let before = api.native_calls();
        let data = query_value_data(&api, root, ValueRef::named(&value_name, "Blob")).unwrap();
        assert_eq!(api.native_calls() - before, 2);
        assert_eq!(data.kind, 3);
        assert_eq!(data.bytes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_probe_missing_value_is_no_such_value() {
        let api = MemoryRegistry::new();
        let missing = name("Missing");
        let err = probe_value(&api, Predefined::CurrentUser.raw(), ValueRef::named(&missing, "Missing"))
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchValue { .. }));
    }

    #[test]
    fn test_probe_missing_default_value() {
        let api = MemoryRegistry::new();
        let err = probe_value(&api, Predefined::CurrentUser.raw(), ValueRef::default_value()).unwrap_err();
        assert!(matches!(err, Error::NoSuchValue { ref message } if message.contains("(default)")));
    }

    #[test]
    fn test_remote_correction_applies_to_name_bounds() {
        let api = MemoryRegistry::new();
        let remote = api
            .connect_registry(&name("server01"), Predefined::LocalMachine.raw())
            .unwrap();
        assert!(remote.is_remote());
        let (child, _) = api
            .create_key(remote, &name("Software"), None, Access::ALL)
            .unwrap();
        api.set_value(child, Some(&name("Version")), 1, b"1.0\0");
        let (_, _) = api
            .create_key(child, &name("Vendor"), None, Access::ALL)
            .unwrap();

        assert_eq!(max_subkey_name_length(&api, child).unwrap(), 2 * 6 + 2);
        assert_eq!(max_value_name_length(&api, child).unwrap(), 2 * 7 + 2);
        // Data sizes are never corrected.
        assert_eq!(query_info(&api, child).unwrap().max_value_len, 4);
    }

    proptest! {
        #[test]
        fn prop_allocation_has_margin(size in any::<u32>()) {
            prop_assert!(allocation_size(size) >= size as usize + 8);
        }

        #[test]
        fn prop_remote_correction(len in 0u32..(u32::MAX / 2 - 1), raw in any::<isize>()) {
            let key = RawKey(raw);
            let corrected = remote_corrected(len, key);
            if key.is_remote() {
                prop_assert_eq!(corrected, 2 * len + 2);
            } else {
                prop_assert_eq!(corrected, len);
            }
        }

        #[test]
        fn prop_predefined_never_corrected(len in any::<u32>(), index in 0usize..7) {
            let key = Predefined::ALL[index].raw();
            prop_assert_eq!(remote_corrected(len, key), len);
        }
    }
}
