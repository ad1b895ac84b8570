//! Conversion between typed values and native registry buffers.
//!
//! Reads dispatch on the stored type and follow the two-call protocol from
//! [`crate::sizing`], except DWORD reads which use one call with a four-byte
//! buffer. Writes dispatch on the declared type and issue exactly one
//! `set_value` call; unsupported types are rejected before any native call.

use crate::ascii::{from_ascii_with_len, to_ascii_into, AsciiString};
use crate::error::{check, Context, Error, IntegrityError, Result, Status};
use crate::handle::RawKey;
use crate::native::RegistryApi;
use crate::sizing::{alloc_zeroed, probe_value, read_value, ValueRef};
use crate::value::{Encoding, Payload, ValueKind, ValueObject};
use tracing::debug;

/// Extra bytes allocated past the computed multi-string length.
pub const MULTI_SZ_SLACK: usize = 32;

/// An encoded multi-string: an over-allocated, zeroed buffer and the number of
/// bytes that make up the encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiStringBuffer {
    buffer: Vec<u8>,
    len: usize,
}

impl MultiStringBuffer {
    /// The encoded bytes, including every terminator.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// The whole allocation, including the zeroed slack.
    #[inline]
    pub fn allocated(&self) -> &[u8] {
        &self.buffer
    }

    /// Length of the encoding in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: even an empty list has a final terminator.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encodes a list of strings as NUL-terminated segments plus a final NUL.
///
/// The length is the sum of each element's length plus one, plus one for the
/// final terminator. An empty list encodes to a single NUL, which keeps it
/// distinct from `[""]` (two NULs).
///
/// # Errors
///
/// Elements containing NUL would split on read-back and are rejected with an
/// invalid-parameter error.
pub fn encode_multi_string(items: &[String]) -> Result<MultiStringBuffer> {
    if let Some(index) = items.iter().position(|s| s.contains('\0')) {
        return Err(Error::invalid_parameter(format!(
            "multi-string element {index} contains NUL"
        )));
    }

    let len = items.iter().map(|s| s.chars().count() + 1).sum::<usize>() + 1;
    let mut buffer = alloc_zeroed(len + MULTI_SZ_SLACK, "multi-string buffer")?;

    let mut pos = 0;
    for item in items {
        let end = pos + item.chars().count() + 1;
        pos += to_ascii_into(item, &mut buffer[pos..end]) + 1;
    }
    buffer[pos] = 0;
    debug_assert_eq!(pos + 1, len);

    Ok(MultiStringBuffer { buffer, len })
}

/// Decodes a multi-string buffer of exactly the size reported by the registry.
///
/// The final terminator is dropped, then every NUL ends one element. A trailing
/// segment without a terminator is kept as the last element.
pub fn decode_multi_string(bytes: &[u8]) -> Result<Vec<String>> {
    let body = match bytes.split_last() {
        Some((0, rest)) => rest,
        _ => bytes,
    };

    let terminated = body.iter().filter(|&&b| b == 0).count();
    let unterminated = usize::from(body.last().is_some_and(|&b| b != 0));
    let count = terminated + unterminated;

    let mut items = Vec::new();
    items
        .try_reserve_exact(count)
        .map_err(|_| Error::out_of_memory("multi-string elements"))?;

    let mut start = 0;
    for (i, &b) in body.iter().enumerate() {
        if b == 0 {
            items.push(from_ascii_with_len(&body[start..], i - start));
            start = i + 1;
        }
    }
    if start < body.len() {
        items.push(from_ascii_with_len(&body[start..], body.len() - start));
    }

    debug_assert_eq!(items.len(), count);
    Ok(items)
}

/// Decodes string data, dropping the final terminator if present.
pub fn decode_string(bytes: &[u8]) -> String {
    let len = match bytes.last() {
        Some(0) => bytes.len() - 1,
        _ => bytes.len(),
    };
    from_ascii_with_len(bytes, len)
}

fn expect_kind(actual: u32, accepted: &[ValueKind], what: &str) -> Result<()> {
    if accepted.iter().any(|k| k.raw() == actual) {
        Ok(())
    } else {
        Err(Error::invalid_parameter(format!(
            "type is not {what}, current type = {actual}"
        )))
    }
}

/// Reads a `String` or `ExpandableString` value.
pub fn read_string(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<String> {
    let probe = probe_value(api, key, value)?;
    expect_kind(
        probe.kind,
        &[ValueKind::String, ValueKind::ExpandableString],
        "REG_SZ or REG_EXPAND_SZ",
    )?;
    let data = read_value(api, key, value, probe)?;
    Ok(decode_string(&data.bytes))
}

/// Reads a `MultiString` value, preserving order and empty elements.
pub fn read_multi_string(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<Vec<String>> {
    let probe = probe_value(api, key, value)?;
    expect_kind(probe.kind, &[ValueKind::MultiString], "REG_MULTI_SZ")?;
    let data = read_value(api, key, value, probe)?;
    decode_multi_string(&data.bytes)
}

/// Reads a `Binary` value as exactly the stored bytes.
pub fn read_binary(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<Vec<u8>> {
    let probe = probe_value(api, key, value)?;
    expect_kind(probe.kind, &[ValueKind::Binary], "REG_BINARY")?;
    let data = read_value(api, key, value, probe)?;
    Ok(data.bytes)
}

fn read_four_bytes(
    api: &dyn RegistryApi,
    key: RawKey,
    value: ValueRef<'_>,
    kind: ValueKind,
    what: &str,
) -> Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    let query = api.query_value(key, value.name, Some(&mut buf));
    // A wider value of another type reports MORE_DATA; the type mismatch wins.
    if !(query.status == Status::MORE_DATA && query.kind != kind.raw()) {
        check(query.status, "RegQueryValueEx()", Context::value(value.display))?;
    }
    expect_kind(query.kind, &[kind], what)?;
    Ok(buf)
}

/// Reads a `DWord` value with a single four-byte query.
///
/// Any other stored type, including `DWordBigEndian`, is rejected.
pub fn read_dword(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<u32> {
    read_four_bytes(api, key, value, ValueKind::DWord, "REG_DWORD").map(u32::from_le_bytes)
}

/// Reads a `DWordBigEndian` value with a single four-byte query.
pub fn read_dword_big_endian(api: &dyn RegistryApi, key: RawKey, value: ValueRef<'_>) -> Result<u32> {
    read_four_bytes(api, key, value, ValueKind::DWordBigEndian, "REG_DWORD_BIG_ENDIAN")
        .map(u32::from_be_bytes)
}

/// Reads a value of a known stored type into a payload.
pub fn read_payload(
    api: &dyn RegistryApi,
    key: RawKey,
    value: ValueRef<'_>,
    kind: ValueKind,
) -> Result<Payload> {
    match kind.encoding() {
        Encoding::Text => read_string(api, key, value).map(Payload::Text),
        Encoding::MultiText => read_multi_string(api, key, value).map(Payload::MultiText),
        Encoding::DWord => read_dword(api, key, value).map(Payload::DWord),
        Encoding::DWordBigEndian => read_dword_big_endian(api, key, value).map(Payload::DWord),
        Encoding::Binary => read_binary(api, key, value).map(Payload::Binary),
        Encoding::Unsupported => Err(Error::invalid_parameter(format!(
            "unsupported value type {}",
            kind.raw()
        ))),
    }
}

/// Native bytes ready for a single `set_value` call.
#[derive(Debug)]
pub enum Encoded<'a> {
    /// Borrowed directly from the caller's payload, never copied.
    Pinned(&'a [u8]),
    /// A freshly transcoded string, terminator included.
    Text(AsciiString),
    /// An encoded multi-string.
    Multi(MultiStringBuffer),
    /// A four-byte integer.
    Number([u8; 4]),
}

impl Encoded<'_> {
    /// The bytes to pass to the native call.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Encoded::Pinned(bytes) => bytes,
            Encoded::Text(s) => s.as_bytes_with_nul(),
            Encoded::Multi(m) => m.as_bytes(),
            Encoded::Number(n) => &n[..],
        }
    }
}

/// Encodes a payload for the declared kind.
///
/// # Errors
///
/// Returns an invalid-parameter error naming `type` for kinds without a
/// payload encoding, and an integrity error if the payload shape does not
/// match the kind.
pub fn encode(kind: ValueKind, payload: &Payload) -> Result<Encoded<'_>> {
    let mismatch = || IntegrityError::PayloadMismatch {
        declared: kind.raw(),
        found: payload.variant_name(),
    };

    match (kind.encoding(), payload) {
        (Encoding::Unsupported, _) => Err(Error::invalid_parameter("type")),
        (Encoding::Text, Payload::Text(s)) => Ok(Encoded::Text(AsciiString::new(s)?)),
        (Encoding::MultiText, Payload::MultiText(items)) => {
            Ok(Encoded::Multi(encode_multi_string(items)?))
        }
        (Encoding::DWord, Payload::DWord(v)) => Ok(Encoded::Number(v.to_le_bytes())),
        (Encoding::DWordBigEndian, Payload::DWord(v)) => Ok(Encoded::Number(v.to_be_bytes())),
        (Encoding::Binary, Payload::Binary(bytes)) => Ok(Encoded::Pinned(bytes)),
        _ => Err(mismatch().into()),
    }
}

/// Writes a value object under `name`.
///
/// The declared type is range-checked before anything else; a type above
/// [`ValueKind::MAX`] fails without touching the registry.
pub fn write_value<V: ValueObject + ?Sized>(
    api: &dyn RegistryApi,
    key: RawKey,
    name: &AsciiString,
    value: &V,
) -> Result<()> {
    let raw = value.value_type();
    let kind = ValueKind::from_raw(raw).ok_or_else(|| Error::invalid_parameter("RegistryValue.type"))?;
    let payload = value.data().ok_or(IntegrityError::MissingField("data"))?;
    let encoded = encode(kind, payload)?;
    let bytes = encoded.as_bytes();

    debug!(name = %name.to_string_lossy(), kind = raw, len = bytes.len(), "writing value");
    let status = api.set_value(key, Some(name), raw, bytes);
    check(status, "RegSetValueEx()", Context::none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Predefined;
    use crate::memory::MemoryRegistry;
    use crate::value::RegistryValue;
    use proptest::prelude::*;

    fn name(s: &str) -> AsciiString {
        AsciiString::new(s).unwrap()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct RawValue {
        kind: u32,
        data: Option<Payload>,
    }

    impl ValueObject for RawValue {
        fn value_name(&self) -> &str {
            "Raw"
        }

        fn value_type(&self) -> u32 {
            self.kind
        }

        fn data(&self) -> Option<&Payload> {
            self.data.as_ref()
        }

        fn set_data(&mut self, data: Payload) -> Result<()> {
            self.data = Some(data);
            Ok(())
        }
    }

    #[test]
    fn test_multi_string_layout() {
        let encoded = encode_multi_string(&strings(&["a", "", "bb"])).unwrap();
        assert_eq!(encoded.as_bytes(), b"a\0\0bb\0\0");
        assert_eq!(encoded.allocated().len(), encoded.len() + MULTI_SZ_SLACK);
    }

    #[test]
    fn test_empty_multi_string() {
        let encoded = encode_multi_string(&[]).unwrap();
        assert_eq!(encoded.as_bytes(), b"\0");
        assert_eq!(encoded.len(), 1);
        assert_eq!(decode_multi_string(encoded.as_bytes()).unwrap(), Vec::<String>::new());
        assert_eq!(decode_multi_string(b"").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_single_empty_element() {
        let items = strings(&[""]);
        let encoded = encode_multi_string(&items).unwrap();
        assert_eq!(encoded.as_bytes(), b"\0\0");
        assert_eq!(decode_multi_string(encoded.as_bytes()).unwrap(), items);
    }

    #[test]
    fn test_decode_foreign_layouts() {
        assert_eq!(decode_multi_string(b"one\0two\0\0").unwrap(), strings(&["one", "two"]));
        // Missing final terminator.
        assert_eq!(decode_multi_string(b"one\0two\0").unwrap(), strings(&["one", "two"]));
        // No terminators at all.
        assert_eq!(decode_multi_string(b"one").unwrap(), strings(&["one"]));
    }

    #[test]
    fn test_decode_string_drops_terminator() {
        assert_eq!(decode_string(b"Alice\0"), "Alice");
        assert_eq!(decode_string(b"Alice"), "Alice");
        assert_eq!(decode_string(b""), "");
        assert_eq!(decode_string(b"\0"), "");
    }

    #[test]
    fn test_encode_rejects_unsupported_kind() {
        let payload = Payload::Binary(vec![1]);
        let err = encode(ValueKind::Link, &payload).unwrap_err();
        match err {
            Error::Registry { code, message, .. } => {
                assert_eq!(code, Status::INVALID_PARAMETER);
                assert!(message.ends_with("'type'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_encode_payload_mismatch_is_integrity_error() {
        let payload = Payload::Text("x".into());
        let err = encode(ValueKind::DWord, &payload).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_binary_is_borrowed() {
        let payload = Payload::Binary(vec![9, 8, 7]);
        let encoded = encode(ValueKind::Binary, &payload).unwrap();
        let Payload::Binary(source) = &payload else {
            unreachable!()
        };
        assert!(matches!(encoded, Encoded::Pinned(_)));
        assert_eq!(encoded.as_bytes().as_ptr(), source.as_ptr());
    }

    #[test]
    fn test_dword_byte_order() {
        let payload = Payload::DWord(0x0102_0304);
        assert_eq!(encode(ValueKind::DWord, &payload).unwrap().as_bytes(), &[4, 3, 2, 1]);
        assert_eq!(
            encode(ValueKind::DWordBigEndian, &payload).unwrap().as_bytes(),
            &[1, 2, 3, 4]
        );
    }

    #[test]
    fn test_out_of_range_type_makes_no_native_call() {
        let api = MemoryRegistry::new();
        let value = RawValue {
            kind: ValueKind::MAX + 1,
            data: Some(Payload::DWord(1)),
        };
        let err = write_value(&api, Predefined::CurrentUser.raw(), &name("Raw"), &value).unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PARAMETER));
        assert!(err.to_string().contains("RegistryValue.type"));
        assert_eq!(api.native_calls(), 0);
    }

    #[test]
    fn test_unsupported_type_makes_no_native_call() {
        let api = MemoryRegistry::new();
        let value = RawValue {
            kind: ValueKind::ResourceList.raw(),
            data: Some(Payload::Binary(vec![0])),
        };
        let err = write_value(&api, Predefined::CurrentUser.raw(), &name("Raw"), &value).unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PARAMETER));
        assert_eq!(api.native_calls(), 0);
    }

    #[test]
    fn test_missing_data_is_integrity_error() {
        let api = MemoryRegistry::new();
        let value = RawValue {
            kind: ValueKind::String.raw(),
            data: None,
        };
        let err = write_value(&api, Predefined::CurrentUser.raw(), &name("Raw"), &value).unwrap_err();
        assert!(matches!(err, Error::Integrity(IntegrityError::MissingField("data"))));
        assert_eq!(api.native_calls(), 0);
    }

    #[test]
    fn test_write_issues_one_call_and_reads_issue_two() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Name");

        write_value(&api, key, &value_name, &RegistryValue::string("Name", "Alice")).unwrap();
        assert_eq!(api.native_calls(), 1);

        let read = read_string(&api, key, ValueRef::named(&value_name, "Name")).unwrap();
        assert_eq!(read, "Alice");
        assert_eq!(api.native_calls(), 3);
    }

    #[test]
    fn test_dword_read_is_single_call() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Count");
        write_value(&api, key, &value_name, &RegistryValue::dword("Count", 42)).unwrap();

        let before = api.native_calls();
        let read = read_dword(&api, key, ValueRef::named(&value_name, "Count")).unwrap();
        assert_eq!(read, 42);
        assert_eq!(api.native_calls() - before, 1);
    }

    #[test]
    fn test_dword_read_rejects_big_endian() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Port");
        write_value(&api, key, &value_name, &RegistryValue::dword_big_endian("Port", 8080)).unwrap();

        let err = read_dword(&api, key, ValueRef::named(&value_name, "Port")).unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PARAMETER));
        let read = read_dword_big_endian(&api, key, ValueRef::named(&value_name, "Port")).unwrap();
        assert_eq!(read, 8080);
    }

    #[test]
    fn test_dword_read_rejects_long_string() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Label");
        write_value(&api, key, &value_name, &RegistryValue::string("Label", "Alice Longer")).unwrap();

        let err = read_dword(&api, key, ValueRef::named(&value_name, "Label")).unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PARAMETER));
        assert!(err.to_string().contains("type is not REG_DWORD, current type = 1"));
    }

    #[test]
    fn test_dword_read_reports_missing_value() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Missing");
        let err = read_dword(&api, key, ValueRef::named(&value_name, "Missing")).unwrap_err();
        assert!(matches!(err, Error::NoSuchValue { .. }));
    }

    #[test]
    fn test_multi_string_rejects_embedded_nul() {
        let err = encode_multi_string(&strings(&["ok", "a\0b"])).unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PARAMETER));
        assert!(err.to_string().contains("element 1"));

        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value = RegistryValue::multi_string("Tags", ["a\0b"]);
        assert!(write_value(&api, key, &name("Tags"), &value).is_err());
        assert_eq!(api.native_calls(), 0);
    }

    #[test]
    fn test_typed_reads_reject_wrong_kind() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Count");
        write_value(&api, key, &value_name, &RegistryValue::dword("Count", 1)).unwrap();
        let value = ValueRef::named(&value_name, "Count");

        assert!(read_string(&api, key, value).is_err());
        assert!(read_multi_string(&api, key, value).is_err());
        assert!(read_binary(&api, key, value).is_err());
    }

    #[test]
    fn test_zero_length_binary_roundtrip() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Empty");
        write_value(&api, key, &value_name, &RegistryValue::binary("Empty", Vec::new())).unwrap();
        let read = read_binary(&api, key, ValueRef::named(&value_name, "Empty")).unwrap();
        assert!(read.is_empty());
    }

    #[test]
    fn test_read_payload_dispatch() {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name("Path");
        write_value(
            &api,
            key,
            &value_name,
            &RegistryValue::expandable_string("Path", "%SystemRoot%\\System32"),
        )
        .unwrap();
        let payload = read_payload(
            &api,
            key,
            ValueRef::named(&value_name, "Path"),
            ValueKind::ExpandableString,
        )
        .unwrap();
        assert_eq!(payload, Payload::Text("%SystemRoot%\\System32".into()));

        let err = read_payload(&api, key, ValueRef::named(&value_name, "Path"), ValueKind::None).unwrap_err();
        assert_eq!(err.status(), Some(Status::INVALID_PARAMETER));
    }

    fn write_then_read(value: RegistryValue) -> Payload {
        let api = MemoryRegistry::new();
        let key = Predefined::CurrentUser.raw();
        let value_name = name(value.name());
        write_value(&api, key, &value_name, &value).unwrap();
        read_payload(&api, key, ValueRef::named(&value_name, value.name()), value.kind()).unwrap()
    }

    proptest! {
        #[test]
        fn prop_multi_string_preserves_elements(items in prop::collection::vec("[a-zA-Z0-9 .éü]{0,8}", 0..8)) {
            let encoded = encode_multi_string(&items).unwrap();
            prop_assert_eq!(decode_multi_string(encoded.as_bytes()).unwrap(), items);
        }

        #[test]
        fn prop_string_value_roundtrip(s in "[\u{1}-\u{ff}]{0,64}") {
            let payload = write_then_read(RegistryValue::string("S", s.clone()));
            prop_assert_eq!(payload, Payload::Text(s));
        }

        #[test]
        fn prop_dword_value_roundtrip(v in any::<u32>()) {
            prop_assert_eq!(write_then_read(RegistryValue::dword("D", v)), Payload::DWord(v));
        }

        #[test]
        fn prop_binary_value_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
            let payload = write_then_read(RegistryValue::binary("B", bytes.clone()));
            prop_assert_eq!(payload, Payload::Binary(bytes));
        }
    }
}
