//! Registry value types and the value object contract.

use crate::error::{Error, IntegrityError, Result};

/// Native registry value types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValueKind {
    /// REG_NONE - no defined type.
    None = 0,
    /// REG_SZ - a NUL-terminated string.
    String = 1,
    /// REG_EXPAND_SZ - a string with unexpanded `%VAR%` references.
    ExpandableString = 2,
    /// REG_BINARY - raw bytes.
    Binary = 3,
    /// REG_DWORD - a little-endian 32-bit integer.
    DWord = 4,
    /// REG_DWORD_BIG_ENDIAN - a big-endian 32-bit integer.
    DWordBigEndian = 5,
    /// REG_LINK - a symbolic link.
    Link = 6,
    /// REG_MULTI_SZ - a list of NUL-terminated strings.
    MultiString = 7,
    /// REG_RESOURCE_LIST - a device-driver resource list.
    ResourceList = 8,
    /// REG_FULL_RESOURCE_DESCRIPTOR - a hardware resource descriptor.
    FullResourceDescriptor = 9,
    /// REG_RESOURCE_REQUIREMENTS_LIST - a hardware resource requirements list.
    ResourceRequirementsList = 10,
}

/// How a value kind is laid out in a native buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// NUL-terminated byte string.
    Text,
    /// NUL-delimited byte strings followed by a final NUL.
    MultiText,
    /// Four-byte integer, little-endian.
    DWord,
    /// Four-byte integer, big-endian.
    DWordBigEndian,
    /// Raw bytes.
    Binary,
    /// Recognized but not readable or writable by this crate.
    Unsupported,
}

impl ValueKind {
    /// Largest raw type value accepted for writing.
    pub const MAX: u32 = ValueKind::ResourceRequirementsList as u32;

    /// Looks up a kind by its raw value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::String),
            2 => Some(Self::ExpandableString),
            3 => Some(Self::Binary),
            4 => Some(Self::DWord),
            5 => Some(Self::DWordBigEndian),
            6 => Some(Self::Link),
            7 => Some(Self::MultiString),
            8 => Some(Self::ResourceList),
            9 => Some(Self::FullResourceDescriptor),
            10 => Some(Self::ResourceRequirementsList),
            _ => None,
        }
    }

    /// The raw native value.
    #[inline]
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// The buffer layout for this kind.
    pub fn encoding(self) -> Encoding {
        match self {
            Self::String | Self::ExpandableString => Encoding::Text,
            Self::MultiString => Encoding::MultiText,
            Self::DWord => Encoding::DWord,
            Self::DWordBigEndian => Encoding::DWordBigEndian,
            Self::Binary => Encoding::Binary,
            Self::None
            | Self::Link
            | Self::ResourceList
            | Self::FullResourceDescriptor
            | Self::ResourceRequirementsList => Encoding::Unsupported,
        }
    }

    /// Returns true if values of this kind can be read and written.
    #[inline]
    pub fn is_supported(self) -> bool {
        self.encoding() != Encoding::Unsupported
    }
}

/// The data held by a registry value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// String or expandable string data.
    Text(String),
    /// Multi-string data, in order, empty elements allowed.
    MultiText(Vec<String>),
    /// A 32-bit integer.
    DWord(u32),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Payload {
    /// Short name of the variant, used in error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::MultiText(_) => "multi-text",
            Payload::DWord(_) => "dword",
            Payload::Binary(_) => "binary",
        }
    }

    /// Returns true if this payload can be stored as `kind`.
    pub fn fits(&self, kind: ValueKind) -> bool {
        matches!(
            (kind.encoding(), self),
            (Encoding::Text, Payload::Text(_))
                | (Encoding::MultiText, Payload::MultiText(_))
                | (Encoding::DWord | Encoding::DWordBigEndian, Payload::DWord(_))
                | (Encoding::Binary, Payload::Binary(_))
        )
    }
}

/// What the object layer must expose for a value being written.
pub trait ValueObject {
    /// The value name.
    fn value_name(&self) -> &str;

    /// The declared raw value type.
    fn value_type(&self) -> u32;

    /// The payload, or `None` if no data has been set.
    fn data(&self) -> Option<&Payload>;

    /// Replaces the payload.
    fn set_data(&mut self, data: Payload) -> Result<()>;
}

/// A named, typed registry value.
///
/// Values are transient: they carry one read or one write and are never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryValue {
    owner: Option<String>,
    name: String,
    kind: ValueKind,
    data: Option<Payload>,
}

impl RegistryValue {
    /// Creates a value with no data.
    ///
    /// # Errors
    ///
    /// Returns an invalid-parameter error if `kind` has no payload type.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Result<Self> {
        if !kind.is_supported() {
            return Err(Error::invalid_parameter(format!(
                "unsupported value type {}",
                kind.raw()
            )));
        }
        Ok(Self {
            owner: None,
            name: name.into(),
            kind,
            data: None,
        })
    }

    fn with_data(name: impl Into<String>, kind: ValueKind, data: Payload) -> Self {
        Self {
            owner: None,
            name: name.into(),
            kind,
            data: Some(data),
        }
    }

    /// Creates a string value.
    pub fn string(name: impl Into<String>, s: impl Into<String>) -> Self {
        Self::with_data(name, ValueKind::String, Payload::Text(s.into()))
    }

    /// Creates an expandable string value.
    pub fn expandable_string(name: impl Into<String>, s: impl Into<String>) -> Self {
        Self::with_data(name, ValueKind::ExpandableString, Payload::Text(s.into()))
    }

    /// Creates a multi-string value.
    pub fn multi_string<I, S>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        Self::with_data(name, ValueKind::MultiString, Payload::MultiText(items))
    }

    /// Creates a DWORD value.
    pub fn dword(name: impl Into<String>, v: u32) -> Self {
        Self::with_data(name, ValueKind::DWord, Payload::DWord(v))
    }

    /// Creates a big-endian DWORD value.
    pub fn dword_big_endian(name: impl Into<String>, v: u32) -> Self {
        Self::with_data(name, ValueKind::DWordBigEndian, Payload::DWord(v))
    }

    /// Creates a binary value.
    pub fn binary(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::with_data(name, ValueKind::Binary, Payload::Binary(data.into()))
    }

    pub(crate) fn read_from(owner: &str, name: &str, kind: ValueKind, data: Payload) -> Self {
        Self {
            owner: Some(owner.to_string()),
            name: name.to_string(),
            kind,
            data: Some(data),
        }
    }

    /// Full path of the key this value was read from, if any.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// The value name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value type.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The payload, if set.
    pub fn payload(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Gets the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Some(Payload::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Gets the value as a list of strings, if it is one.
    pub fn as_multi_string(&self) -> Option<&[String]> {
        match &self.data {
            Some(Payload::MultiText(v)) => Some(v),
            _ => None,
        }
    }

    /// Gets the value as a u32, if it is one.
    pub fn as_dword(&self) -> Option<u32> {
        match &self.data {
            Some(Payload::DWord(v)) => Some(*v),
            _ => None,
        }
    }

    /// Gets the value as binary data, if it is one.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match &self.data {
            Some(Payload::Binary(v)) => Some(v),
            _ => None,
        }
    }
}

impl ValueObject for RegistryValue {
    fn value_name(&self) -> &str {
        &self.name
    }

    fn value_type(&self) -> u32 {
        self.kind.raw()
    }

    fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    fn set_data(&mut self, data: Payload) -> Result<()> {
        if !data.fits(self.kind) {
            return Err(IntegrityError::PayloadMismatch {
                declared: self.kind.raw(),
                found: data.variant_name(),
            }
            .into());
        }
        self.data = Some(data);
        Ok(())
    }
}

impl std::fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[type={},name={}]", self.kind.raw(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_raw_roundtrip() {
        for raw in 0..=ValueKind::MAX {
            let kind = ValueKind::from_raw(raw).unwrap();
            assert_eq!(kind.raw(), raw);
        }
        assert_eq!(ValueKind::from_raw(ValueKind::MAX + 1), None);
        assert_eq!(ValueKind::MAX, 10);
    }

    #[test]
    fn test_supported_kinds() {
        let supported: Vec<_> = (0..=ValueKind::MAX)
            .filter_map(ValueKind::from_raw)
            .filter(|k| k.is_supported())
            .collect();
        assert_eq!(
            supported,
            vec![
                ValueKind::String,
                ValueKind::ExpandableString,
                ValueKind::Binary,
                ValueKind::DWord,
                ValueKind::DWordBigEndian,
                ValueKind::MultiString,
            ]
        );
    }

    #[test]
    fn test_new_rejects_unsupported_kind() {
        let err = RegistryValue::new("Link", ValueKind::Link).unwrap_err();
        assert_eq!(err.status(), Some(crate::error::Status::INVALID_PARAMETER));
    }

    #[test]
    fn test_set_data_checks_shape() {
        let mut value = RegistryValue::new("Count", ValueKind::DWord).unwrap();
        assert!(value.data().is_none());
        let err = value.set_data(Payload::Text("x".into())).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::PayloadMismatch { declared: 4, found: "text" })
        ));
        assert!(value.data().is_none());
        value.set_data(Payload::DWord(7)).unwrap();
        assert_eq!(value.as_dword(), Some(7));
    }

    #[test]
    fn test_accessors() {
        let value = RegistryValue::multi_string("Tags", ["a", "", "bb"]);
        assert_eq!(value.kind(), ValueKind::MultiString);
        assert_eq!(
            value.as_multi_string(),
            Some(&["a".to_string(), String::new(), "bb".to_string()][..])
        );
        assert_eq!(value.as_str(), None);
        assert_eq!(value.to_string(), "[type=7,name=Tags]");
        assert_eq!(value.owner(), None);
    }
}
