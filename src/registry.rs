//! Registry keys and the operations on them.
//!
//! A [`RegistryKey`] pairs a native handle with the key's full path. Every
//! operation resolves the handle through [`crate::handle::resolve`], makes its
//! native calls through the key's [`RegistryApi`], and classifies failures
//! with [`crate::error::classify`].

use crate::ascii::{from_ascii_with_len, AsciiString};
use crate::codec;
use crate::env;
use crate::error::{check, classify, Context, Error, Result, Status};
use crate::handle::{self, KeyObject, Predefined, RawKey};
use crate::native::{Access, Disposition, RegistryApi};
use crate::sizing::{self, alloc_zeroed, probe_value, ValueRef};
use crate::value::{RegistryValue, ValueKind, ValueObject};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Separator between path segments.
pub const PATH_SEPARATOR: char = '\\';

/// Joins a parent key's full path and a child path.
///
/// # Errors
///
/// Returns [`Error::OutOfMemory`] if the path cannot be allocated.
pub fn full_key_name(parent: &str, child: &str) -> Result<String> {
    let mut name = String::new();
    name.try_reserve_exact(parent.len() + 1 + child.len())
        .map_err(|_| Error::out_of_memory("full key name"))?;
    name.push_str(parent);
    name.push(PATH_SEPARATOR);
    name.push_str(child);
    Ok(name)
}

/// An open registry key.
///
/// Keys opened or created through this type are closed when dropped.
/// Predefined roots are never closed.
///
/// # Example
///
/// ```
/// use registry_bridge::prelude::*;
/// use std::sync::Arc;
///
/// let hkcu = RegistryKey::root(Arc::new(MemoryRegistry::new()), Predefined::CurrentUser);
/// let key = hkcu.create_subkey("Software\\Test", None, Access::ALL)?;
/// key.set_value("Name", &RegistryValue::string("Name", "Alice"))?;
/// assert_eq!(key.get_string_value("Name")?, "Alice");
/// assert_eq!(key.full_name(), "HKEY_CURRENT_USER\\Software\\Test");
/// # Ok::<(), registry_bridge::error::Error>(())
/// ```
pub struct RegistryKey {
    api: Arc<dyn RegistryApi>,
    raw: RawKey,
    name: String,
    created: bool,
    owned: bool,
}

impl fmt::Debug for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryKey")
            .field("raw", &self.raw)
            .field("name", &self.name)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl KeyObject for RegistryKey {
    fn raw_key(&self) -> Option<RawKey> {
        Some(self.raw)
    }

    fn key_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn was_created(&self) -> bool {
        self.created
    }
}

impl RegistryKey {
    /// Returns a predefined root key.
    pub fn root(api: Arc<dyn RegistryApi>, root: Predefined) -> Self {
        Self {
            api,
            raw: root.raw(),
            name: root.name().to_string(),
            created: false,
            owned: false,
        }
    }

    fn child(&self, raw: RawKey, name: String, created: bool) -> Self {
        Self {
            api: Arc::clone(&self.api),
            raw,
            name,
            created,
            owned: true,
        }
    }

    /// The last segment of the key's path.
    pub fn name(&self) -> &str {
        self.name.rsplit(PATH_SEPARATOR).next().unwrap_or(&self.name)
    }

    /// The fully-qualified path, e.g. `HKEY_LOCAL_MACHINE\Software\X`.
    pub fn full_name(&self) -> &str {
        &self.name
    }

    /// Returns true if the key did not exist before it was created.
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Returns the native handle.
    pub fn as_raw(&self) -> RawKey {
        self.raw
    }

    /// Returns the native API this key calls into.
    pub fn api(&self) -> &Arc<dyn RegistryApi> {
        &self.api
    }

    /// Connects to this root key on a remote host.
    ///
    /// The returned key is recorded under this key's name.
    pub fn connect_registry(&self, host: &str) -> Result<RegistryKey> {
        let key = handle::resolve(self)?;
        let host_name = AsciiString::new(host)?;
        let raw = self
            .api
            .connect_registry(&host_name, key.raw)
            .map_err(|status| classify(status, "RegConnectRegistry()", Context::none()))?;
        debug!(host, root = key.name, remote = raw.is_remote(), "connected registry");
        Ok(self.child(raw, key.name.to_string(), false))
    }

    /// Opens an existing subkey.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchKey`] if the subkey does not exist.
    pub fn open_subkey(&self, path: &str, access: Access) -> Result<RegistryKey> {
        let key = handle::resolve(self)?;
        let full = full_key_name(key.name, path)?;
        let sub_key = AsciiString::new(path)?;
        let raw = self
            .api
            .open_key(key.raw, &sub_key, access)
            .map_err(|status| classify(status, "RegOpenKeyEx()", Context::key(&full)))?;
        debug!(key = %full, access = access.0, "opened key");
        Ok(self.child(raw, full, false))
    }

    /// Opens an existing subkey for reading.
    pub fn open_subkey_default(&self, path: &str) -> Result<RegistryKey> {
        self.open_subkey(path, Access::READ)
    }

    /// Creates a subkey, or opens it if it already exists.
    ///
    /// [`RegistryKey::was_created`] on the result tells the two apart.
    pub fn create_subkey(&self, path: &str, class: Option<&str>, access: Access) -> Result<RegistryKey> {
        let key = handle::resolve(self)?;
        let full = full_key_name(key.name, path)?;
        let sub_key = AsciiString::new(path)?;
        let class = class.map(AsciiString::new).transpose()?;
        let (raw, disposition) = self
            .api
            .create_key(key.raw, &sub_key, class.as_ref(), access)
            .map_err(|status| classify(status, "RegCreateKeyEx()", Context::none()))?;
        let created = disposition == Disposition::CreatedNewKey;
        debug!(key = %full, created, "created key");
        Ok(self.child(raw, full, created))
    }

    /// Creates or opens a subkey for writing, with no class.
    pub fn create_subkey_default(&self, path: &str) -> Result<RegistryKey> {
        self.create_subkey(path, None, Access::WRITE)
    }

    fn release(&mut self) {
        if !self.owned {
            return;
        }
        self.owned = false;
        let status = self.api.close_key(self.raw);
        if status.is_success() {
            debug!(key = %self.name, "closed key");
        } else {
            warn!(key = %self.name, status = status.0, "close failed, status discarded");
        }
    }

    /// Closes the key.
    ///
    /// The native status is discarded. Dropping the key has the same effect.
    pub fn close(mut self) {
        self.release();
    }

    /// Deletes a value of this key.
    pub fn delete_value(&self, name: &str) -> Result<()> {
        let key = handle::resolve(self)?;
        let value_name = AsciiString::new(name)?;
        let status = self.api.delete_value(key.raw, &value_name);
        check(status, "RegDeleteValue()", Context::value(name))?;
        debug!(key = key.name, value = name, "deleted value");
        Ok(())
    }

    /// Deletes a subkey. The subkey must not have subkeys of its own.
    pub fn delete_subkey(&self, name: &str) -> Result<()> {
        let key = handle::resolve(self)?;
        let full = full_key_name(key.name, name)?;
        let sub_key = AsciiString::new(name)?;
        let status = self.api.delete_key(key.raw, &sub_key);
        check(status, "RegDeleteKey()", Context::key(&full))?;
        debug!(key = %full, "deleted key");
        Ok(())
    }

    /// Writes the key's changes to disk.
    pub fn flush(&self) -> Result<()> {
        let key = handle::resolve(self)?;
        check(self.api.flush_key(key.raw), "RegFlushKey()", Context::none())
    }

    /// Reads a `String` or `ExpandableString` value.
    pub fn get_string_value(&self, name: &str) -> Result<String> {
        let key = handle::resolve(self)?;
        let value_name = AsciiString::new(name)?;
        codec::read_string(&*self.api, key.raw, ValueRef::named(&value_name, name))
    }

    /// Reads the key's default (unnamed) value as a string.
    pub fn get_default_value(&self) -> Result<String> {
        let key = handle::resolve(self)?;
        codec::read_string(&*self.api, key.raw, ValueRef::default_value())
    }

    /// Returns true if the default value holds more than a bare terminator.
    pub fn has_default_value(&self) -> Result<bool> {
        let key = handle::resolve(self)?;
        let query = self.api.query_value(key.raw, None, None);
        check(query.status, "RegQueryValueEx()", Context::value("(default)"))?;
        Ok(query.size > 1)
    }

    /// Returns true if the default value is the key's only value and is set.
    pub fn has_only_default_value(&self) -> Result<bool> {
        let key = handle::resolve(self)?;
        let info = self
            .api
            .query_info_key(key.raw)
            .map_err(|status| classify(status, "RegQueryInfoKey()", Context::key(key.name)))?;
        if info.values != 1 {
            return Ok(false);
        }
        self.has_default_value()
    }

    /// Writes `value` under `name`.
    ///
    /// The value's declared type decides the encoding. Types outside the
    /// native range fail before any native call is made.
    pub fn set_value<V: ValueObject + ?Sized>(&self, name: &str, value: &V) -> Result<()> {
        let key = handle::resolve(self)?;
        let value_name = AsciiString::new(name)?;
        codec::write_value(&*self.api, key.raw, &value_name, value)
    }

    /// Writes a value under its own name.
    pub fn set_registry_value(&self, value: &RegistryValue) -> Result<()> {
        self.set_value(value.name(), value)
    }

    /// Number of immediate subkeys.
    pub fn subkey_count(&self) -> Result<u32> {
        let key = handle::resolve(self)?;
        Ok(sizing::query_info(&*self.api, key.raw)?.subkeys)
    }

    /// Length of the longest subkey name, corrected for remote keys.
    pub fn max_subkey_name_length(&self) -> Result<u32> {
        let key = handle::resolve(self)?;
        sizing::max_subkey_name_length(&*self.api, key.raw)
    }

    /// Number of values.
    pub fn value_count(&self) -> Result<u32> {
        let key = handle::resolve(self)?;
        Ok(sizing::query_info(&*self.api, key.raw)?.values)
    }

    /// Size of the largest value's data in bytes.
    pub fn max_value_data_length(&self) -> Result<u32> {
        let key = handle::resolve(self)?;
        Ok(sizing::query_info(&*self.api, key.raw)?.max_value_len)
    }

    /// Length of the longest value name, corrected for remote keys.
    pub fn max_value_name_length(&self) -> Result<u32> {
        let key = handle::resolve(self)?;
        sizing::max_value_name_length(&*self.api, key.raw)
    }

    /// Name of the subkey at `index`.
    ///
    /// # Errors
    ///
    /// Past the last subkey the error carries [`Status::NO_MORE_ITEMS`].
    pub fn enum_subkey(&self, index: u32) -> Result<String> {
        let key = handle::resolve(self)?;
        let max = sizing::max_subkey_name_length(&*self.api, key.raw)?;
        let mut buffer = alloc_zeroed(max as usize + 2, "subkey name buffer")?;
        let len = self
            .api
            .enum_key(key.raw, index, &mut buffer)
            .map_err(|status| classify(status, "RegEnumKeyEx()", Context::none()))?;
        Ok(from_ascii_with_len(&buffer, len))
    }

    /// Name of the value at `index`.
    ///
    /// # Errors
    ///
    /// Past the last value the error carries [`Status::NO_MORE_ITEMS`].
    pub fn enum_value(&self, index: u32) -> Result<String> {
        let key = handle::resolve(self)?;
        let max = sizing::max_value_name_length(&*self.api, key.raw)?;
        let mut buffer = alloc_zeroed(max as usize + 2, "value name buffer")?;
        let len = self
            .api
            .enum_value(key.raw, index, &mut buffer)
            .map_err(|status| classify(status, "RegEnumValue()", Context::none()))?;
        Ok(from_ascii_with_len(&buffer, len))
    }

    /// Iterates over subkey names.
    ///
    /// The count is taken once up front; an enumeration failure is yielded and
    /// ends the iteration.
    pub fn keys(&self) -> Result<Names<'_>> {
        Ok(Names {
            key: self,
            kind: NameKind::Subkeys,
            index: 0,
            count: self.subkey_count()?,
        })
    }

    /// Iterates over value names, like [`RegistryKey::keys`].
    pub fn values(&self) -> Result<Names<'_>> {
        Ok(Names {
            key: self,
            kind: NameKind::Values,
            index: 0,
            count: self.value_count()?,
        })
    }

    /// Adds one to a DWORD value and returns the new value.
    ///
    /// A value of any other type is treated as zero and becomes a DWORD.
    ///
    /// # Errors
    ///
    /// If the write fails only the error is returned; no new value is
    /// reported and the stored value is unchanged.
    pub fn increment_dword(&self, name: &str) -> Result<u32> {
        self.adjust_dword(name, |v| v.wrapping_add(1))
    }

    /// Subtracts one from a DWORD value and returns the new value.
    ///
    /// A value of any other type is treated as zero, so the result wraps to
    /// `u32::MAX`.
    ///
    /// # Errors
    ///
    /// As for [`RegistryKey::increment_dword`], a failed write surfaces only
    /// the error.
    pub fn decrement_dword(&self, name: &str) -> Result<u32> {
        self.adjust_dword(name, |v| v.wrapping_sub(1))
    }

    fn adjust_dword(&self, name: &str, delta: impl FnOnce(u32) -> u32) -> Result<u32> {
        let key = handle::resolve(self)?;
        let value_name = AsciiString::new(name)?;

        let mut buf = [0u8; 4];
        let query = self.api.query_value(key.raw, Some(&value_name), Some(&mut buf));
        let is_dword = query.kind == ValueKind::DWord.raw();
        if !(query.status == Status::MORE_DATA && !is_dword) {
            check(query.status, "RegQueryValueEx()", Context::value(name))?;
        }
        let current = if is_dword { u32::from_le_bytes(buf) } else { 0 };

        let next = delta(current);
        let status = self.api.set_value(
            key.raw,
            Some(&value_name),
            ValueKind::DWord.raw(),
            &next.to_le_bytes(),
        );
        check(status, "RegSetValueEx()", Context::value(name))?;
        debug!(key = key.name, value = name, current, next, "adjusted counter");
        Ok(next)
    }

    /// Reads a value of any supported type.
    pub fn get_value(&self, name: &str) -> Result<RegistryValue> {
        let key = handle::resolve(self)?;
        let value_name = AsciiString::new(name)?;
        let value = ValueRef::named(&value_name, name);

        let probe = probe_value(&*self.api, key.raw, value)?;
        let kind = ValueKind::from_raw(probe.kind)
            .filter(|kind| kind.is_supported())
            .ok_or_else(|| Error::invalid_parameter(format!("unsupported value type {}", probe.kind)))?;
        let payload = codec::read_payload(&*self.api, key.raw, value, kind)?;
        Ok(RegistryValue::read_from(key.name, name, kind, payload))
    }

    /// Expands `%NAME%` environment references in `template`.
    pub fn expand_environment_strings(&self, template: &str) -> Result<String> {
        env::expand_environment_strings(&*self.api, template)
    }
}

impl Drop for RegistryKey {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NameKind {
    Subkeys,
    Values,
}

/// Iterator over subkey or value names, returned by [`RegistryKey::keys`] and
/// [`RegistryKey::values`].
#[derive(Debug)]
pub struct Names<'a> {
    key: &'a RegistryKey,
    kind: NameKind,
    index: u32,
    count: u32,
}

impl Iterator for Names<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let item = match self.kind {
            NameKind::Subkeys => self.key.enum_subkey(self.index),
            NameKind::Values => self.key.enum_value(self.index),
        };
        // A failure ends the iteration after it is yielded.
        self.index = if item.is_ok() { self.index + 1 } else { self.count };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some((self.count - self.index) as usize))
    }
}
