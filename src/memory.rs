//! An in-process registry.
//!
//! [`MemoryRegistry`] implements [`RegistryApi`] over a tree held in memory. It
//! keeps the native semantics this crate relies on: case-insensitive names,
//! predefined roots that never close, odd handles for remote connections,
//! `MORE_DATA` for short buffers and `NO_MORE_ITEMS` past the end of an
//! enumeration. Every call is counted so tests can assert how many native
//! calls an operation made.

use crate::ascii::{narrow_char, AsciiString};
use crate::error::Status;
use crate::handle::{Predefined, RawKey};
use crate::native::{Access, Disposition, KeyInfo, NativeResult, RegistryApi, ValueQuery};
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering as NameOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};

const FIRST_HANDLE: isize = 0x1000;
const HANDLE_STEP: isize = 4;

/// A native call, used to inject failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `connect_registry`
    Connect,
    /// `open_key`
    OpenKey,
    /// `create_key`
    CreateKey,
    /// `close_key`
    CloseKey,
    /// `delete_key`
    DeleteKey,
    /// `delete_value`
    DeleteValue,
    /// `flush_key`
    FlushKey,
    /// `query_value`
    QueryValue,
    /// `set_value`
    SetValue,
    /// `query_info_key`
    QueryInfoKey,
    /// `enum_key`
    EnumKey,
    /// `enum_value`
    EnumValue,
    /// `expand_environment_strings`
    ExpandEnvironmentStrings,
}

fn narrow(s: &str) -> Vec<u8> {
    s.chars().map(narrow_char).collect()
}

fn name_order(a: &[u8], b: &[u8]) -> NameOrdering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}

fn len32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn longest(lens: impl Iterator<Item = usize>) -> u32 {
    len32(lens.max().unwrap_or(0))
}

fn split_path(path: &[u8]) -> Vec<Vec<u8>> {
    path.split(|&b| b == b'\\')
        .filter(|segment| !segment.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

fn value_name(name: Option<&AsciiString>) -> &[u8] {
    name.map_or(&[][..], AsciiString::as_bytes)
}

fn copy_name(src: &[u8], dst: &mut [u8]) -> NativeResult<usize> {
    if dst.len() <= src.len() {
        return Err(Status::MORE_DATA);
    }
    dst[..src.len()].copy_from_slice(src);
    dst[src.len()] = 0;
    Ok(src.len())
}

fn into_status(result: NativeResult<()>) -> Status {
    result.err().unwrap_or(Status::SUCCESS)
}

#[derive(Debug)]
struct StoredValue {
    name: Vec<u8>,
    kind: u32,
    data: Vec<u8>,
}

/// Subkeys are kept sorted case-insensitively; values keep insertion order.
#[derive(Debug, Default)]
struct Node {
    class: Vec<u8>,
    subkeys: Vec<(Vec<u8>, Node)>,
    values: Vec<StoredValue>,
}

impl Node {
    fn find(&self, name: &[u8]) -> std::result::Result<usize, usize> {
        self.subkeys.binary_search_by(|(n, _)| name_order(n, name))
    }

    fn child(&self, name: &[u8]) -> Option<&Node> {
        self.find(name).ok().map(|i| &self.subkeys[i].1)
    }

    fn child_mut(&mut self, name: &[u8]) -> Option<&mut Node> {
        match self.find(name) {
            Ok(i) => Some(&mut self.subkeys[i].1),
            Err(_) => None,
        }
    }

    fn child_or_insert(&mut self, name: &[u8]) -> (&mut Node, bool) {
        match self.find(name) {
            Ok(i) => (&mut self.subkeys[i].1, false),
            Err(i) => {
                self.subkeys.insert(i, (name.to_vec(), Node::default()));
                (&mut self.subkeys[i].1, true)
            }
        }
    }

    fn descend(&self, path: &[Vec<u8>]) -> Option<&Node> {
        path.iter().try_fold(self, |node, segment| node.child(segment))
    }

    fn descend_mut(&mut self, path: &[Vec<u8>]) -> Option<&mut Node> {
        let mut node = self;
        for segment in path {
            node = node.child_mut(segment)?;
        }
        Some(node)
    }

    fn value_index(&self, name: &[u8]) -> Option<usize> {
        self.values.iter().position(|v| v.name.eq_ignore_ascii_case(name))
    }
}

/// Hives are keyed by lower-cased host (`None` for local) and root.
type HiveId = (Option<Vec<u8>>, Predefined);

#[derive(Clone, Debug)]
struct OpenKey {
    hive: HiveId,
    path: Vec<Vec<u8>>,
    access: Access,
    remote: bool,
}

#[derive(Debug)]
struct State {
    hives: BTreeMap<HiveId, Node>,
    handles: HashMap<isize, OpenKey>,
    next_handle: isize,
    failures: HashMap<Operation, Status>,
}

impl State {
    fn resolve(&mut self, key: RawKey) -> NativeResult<OpenKey> {
        if let Some(root) = Predefined::from_raw(key) {
            let hive = (None, root);
            self.hives.entry(hive.clone()).or_default();
            return Ok(OpenKey {
                hive,
                path: Vec::new(),
                access: Access::ALL,
                remote: false,
            });
        }
        self.handles.get(&key.0).cloned().ok_or(Status::INVALID_HANDLE)
    }

    fn node(&self, open: &OpenKey) -> NativeResult<&Node> {
        self.hives
            .get(&open.hive)
            .and_then(|root| root.descend(&open.path))
            .ok_or(Status::KEY_DELETED)
    }

    fn node_mut(&mut self, open: &OpenKey) -> NativeResult<&mut Node> {
        self.hives
            .get_mut(&open.hive)
            .and_then(|root| root.descend_mut(&open.path))
            .ok_or(Status::KEY_DELETED)
    }

    fn allocate(&mut self, open: OpenKey) -> RawKey {
        let raw = if open.remote {
            self.next_handle | 1
        } else {
            self.next_handle
        };
        self.next_handle += HANDLE_STEP;
        self.handles.insert(raw, open);
        RawKey(raw)
    }
}

/// Configures a [`MemoryRegistry`].
#[derive(Clone, Debug, Default)]
pub struct MemoryRegistryBuilder {
    env: Vec<(Vec<u8>, Vec<u8>)>,
    hosts: Vec<Vec<u8>>,
    under_report_remote: bool,
}

impl MemoryRegistryBuilder {
    /// Defines an environment variable for `expand_environment_strings`.
    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.push((narrow(name), narrow(value)));
        self
    }

    /// Accepts remote connections to `host`.
    ///
    /// Without any host configured every host is accepted. Once at least one
    /// is configured, connecting to any other host fails with `BAD_NETPATH`.
    pub fn host(mut self, host: &str) -> Self {
        self.hosts.push(narrow(host).to_ascii_lowercase());
        self
    }

    /// Halves the longest subkey and value name reported for remote handles,
    /// the way legacy remote registries under-report them.
    pub fn under_report_remote(mut self, enabled: bool) -> Self {
        self.under_report_remote = enabled;
        self
    }

    /// Builds the registry.
    pub fn build(self) -> MemoryRegistry {
        MemoryRegistry {
            state: Mutex::new(State {
                hives: BTreeMap::new(),
                handles: HashMap::new(),
                next_handle: FIRST_HANDLE,
                failures: HashMap::new(),
            }),
            calls: AtomicUsize::new(0),
            env: self.env,
            hosts: self.hosts,
            under_report_remote: self.under_report_remote,
        }
    }
}

/// An in-process [`RegistryApi`] implementation.
///
/// # Example
///
/// ```
/// use registry_bridge::prelude::*;
///
/// let api = MemoryRegistry::builder().env("SystemRoot", "C:\\Windows").build();
/// let root = RegistryKey::root(std::sync::Arc::new(api), Predefined::CurrentUser);
/// let key = root.create_subkey_default("Software\\Demo")?;
/// assert!(key.was_created());
/// # Ok::<(), registry_bridge::error::Error>(())
/// ```
#[derive(Debug)]
pub struct MemoryRegistry {
    state: Mutex<State>,
    calls: AtomicUsize,
    env: Vec<(Vec<u8>, Vec<u8>)>,
    hosts: Vec<Vec<u8>>,
    under_report_remote: bool,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Creates an empty registry with no environment and every host accepted.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for a configured registry.
    pub fn builder() -> MemoryRegistryBuilder {
        MemoryRegistryBuilder::default()
    }

    /// Number of native calls made so far, failed ones included.
    pub fn native_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of handles currently open, predefined roots excluded.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Makes every later call of `op` fail with `status`.
    pub fn fail_on(&self, op: Operation, status: Status) {
        self.state.lock().failures.insert(op, status);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    fn begin(&self, op: Operation) -> NativeResult<MutexGuard<'_, State>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock();
        if let Some(&status) = state.failures.get(&op) {
            trace!(?op, status = status.0, "injected failure");
            return Err(status);
        }
        Ok(state)
    }

    fn lookup_env(&self, name: &[u8]) -> Option<&[u8]> {
        self.env
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Expands `%NAME%` references; unknown names are left as written.
    fn expand(&self, src: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(src.len());
        let mut rest = src;
        while let Some(start) = rest.iter().position(|&b| b == b'%') {
            out.extend_from_slice(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.iter().position(|&b| b == b'%') else {
                out.extend_from_slice(&rest[start..]);
                return out;
            };
            let name = &after[..end];
            match self.lookup_env(name).filter(|_| !name.is_empty()) {
                Some(value) => {
                    out.extend_from_slice(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push(b'%');
                    out.extend_from_slice(name);
                    rest = &after[end..];
                }
            }
        }
        out.extend_from_slice(rest);
        out
    }
}

impl RegistryApi for MemoryRegistry {
    fn connect_registry(&self, host: &AsciiString, root: RawKey) -> NativeResult<RawKey> {
        let mut state = self.begin(Operation::Connect)?;
        let root = Predefined::from_raw(root)
            .filter(|r| {
                matches!(
                    r,
                    Predefined::LocalMachine | Predefined::Users | Predefined::PerformanceData
                )
            })
            .ok_or(Status::INVALID_HANDLE)?;

        let host = host.as_bytes();
        let start = host.iter().position(|&b| b != b'\\').unwrap_or(host.len());
        let host = host[start..].to_ascii_lowercase();

        let (hive, remote) = if host.is_empty() {
            ((None, root), false)
        } else {
            if !self.hosts.is_empty() && !self.hosts.contains(&host) {
                return Err(Status::BAD_NETPATH);
            }
            ((Some(host), root), true)
        };
        state.hives.entry(hive.clone()).or_default();

        let key = state.allocate(OpenKey {
            hive,
            path: Vec::new(),
            access: Access::ALL,
            remote,
        });
        debug!(root = root.name(), remote, handle = key.0, "connected");
        Ok(key)
    }

    fn open_key(&self, parent: RawKey, sub_key: &AsciiString, access: Access) -> NativeResult<RawKey> {
        let mut state = self.begin(Operation::OpenKey)?;
        let parent = state.resolve(parent)?;
        state.node(&parent)?;

        let mut path = parent.path.clone();
        path.extend(split_path(sub_key.as_bytes()));
        let open = OpenKey {
            hive: parent.hive,
            path,
            access,
            remote: parent.remote,
        };
        state.node(&open).map_err(|_| Status::FILE_NOT_FOUND)?;
        Ok(state.allocate(open))
    }

    fn create_key(
        &self,
        parent: RawKey,
        sub_key: &AsciiString,
        class: Option<&AsciiString>,
        access: Access,
    ) -> NativeResult<(RawKey, Disposition)> {
        let mut state = self.begin(Operation::CreateKey)?;
        let parent = state.resolve(parent)?;
        if !parent.access.contains(Access::CREATE_SUB_KEY) {
            return Err(Status::ACCESS_DENIED);
        }

        let segments = split_path(sub_key.as_bytes());
        let created = {
            let mut node = state.node_mut(&parent)?;
            let mut created = false;
            for segment in &segments {
                let (child, new) = node.child_or_insert(segment);
                node = child;
                created = new;
            }
            if let (true, Some(class)) = (created, class) {
                node.class = class.as_bytes().to_vec();
            }
            created
        };

        let mut path = parent.path.clone();
        path.extend(segments);
        let key = state.allocate(OpenKey {
            hive: parent.hive,
            path,
            access,
            remote: parent.remote,
        });
        let disposition = if created {
            Disposition::CreatedNewKey
        } else {
            Disposition::OpenedExistingKey
        };
        Ok((key, disposition))
    }

    fn close_key(&self, key: RawKey) -> Status {
        into_status(self.begin(Operation::CloseKey).and_then(|mut state| {
            if key.is_predefined() {
                return Ok(());
            }
            state
                .handles
                .remove(&key.0)
                .map(|_| ())
                .ok_or(Status::INVALID_HANDLE)
        }))
    }

    fn delete_key(&self, key: RawKey, sub_key: &AsciiString) -> Status {
        into_status(self.begin(Operation::DeleteKey).and_then(|mut state| {
            let open = state.resolve(key)?;
            state.node(&open)?;

            let mut segments = split_path(sub_key.as_bytes());
            let leaf = segments.pop().ok_or(Status::INVALID_PARAMETER)?;
            let mut path = open.path.clone();
            path.extend(segments);
            let parent_key = OpenKey { path, ..open };

            let parent = state
                .node_mut(&parent_key)
                .map_err(|_| Status::FILE_NOT_FOUND)?;
            let index = parent.find(&leaf).map_err(|_| Status::FILE_NOT_FOUND)?;
            if !parent.subkeys[index].1.subkeys.is_empty() {
                return Err(Status::ACCESS_DENIED);
            }
            parent.subkeys.remove(index);
            Ok(())
        }))
    }

    fn delete_value(&self, key: RawKey, name: &AsciiString) -> Status {
        into_status(self.begin(Operation::DeleteValue).and_then(|mut state| {
            let open = state.resolve(key)?;
            if !open.access.contains(Access::SET_VALUE) {
                return Err(Status::ACCESS_DENIED);
            }
            let node = state.node_mut(&open)?;
            let index = node
                .value_index(name.as_bytes())
                .ok_or(Status::FILE_NOT_FOUND)?;
            node.values.remove(index);
            Ok(())
        }))
    }

    fn flush_key(&self, key: RawKey) -> Status {
        into_status(self.begin(Operation::FlushKey).and_then(|mut state| {
            let open = state.resolve(key)?;
            state.node(&open).map(|_| ())
        }))
    }

    fn query_value(&self, key: RawKey, name: Option<&AsciiString>, data: Option<&mut [u8]>) -> ValueQuery {
        let result = self.begin(Operation::QueryValue).and_then(|mut state| {
            let open = state.resolve(key)?;
            if !open.access.contains(Access::QUERY_VALUE) {
                return Err(Status::ACCESS_DENIED);
            }
            let node = state.node(&open)?;
            let index = node
                .value_index(value_name(name))
                .ok_or(Status::FILE_NOT_FOUND)?;
            let value = &node.values[index];

            let status = match data {
                None => Status::SUCCESS,
                Some(buf) if buf.len() < value.data.len() => Status::MORE_DATA,
                Some(buf) => {
                    buf[..value.data.len()].copy_from_slice(&value.data);
                    Status::SUCCESS
                }
            };
            Ok(ValueQuery {
                status,
                kind: value.kind,
                size: len32(value.data.len()),
            })
        });
        result.unwrap_or_else(|status| ValueQuery {
            status,
            kind: 0,
            size: 0,
        })
    }

    fn set_value(&self, key: RawKey, name: Option<&AsciiString>, kind: u32, data: &[u8]) -> Status {
        into_status(self.begin(Operation::SetValue).and_then(|mut state| {
            let open = state.resolve(key)?;
            if !open.access.contains(Access::SET_VALUE) {
                return Err(Status::ACCESS_DENIED);
            }
            let node = state.node_mut(&open)?;
            let name = value_name(name);
            match node.value_index(name) {
                Some(index) => {
                    let stored = &mut node.values[index];
                    stored.kind = kind;
                    stored.data = data.to_vec();
                }
                None => node.values.push(StoredValue {
                    name: name.to_vec(),
                    kind,
                    data: data.to_vec(),
                }),
            }
            Ok(())
        }))
    }

    fn query_info_key(&self, key: RawKey) -> NativeResult<KeyInfo> {
        let mut state = self.begin(Operation::QueryInfoKey)?;
        let open = state.resolve(key)?;
        if !open.access.contains(Access::QUERY_VALUE) {
            return Err(Status::ACCESS_DENIED);
        }
        let node = state.node(&open)?;

        let mut info = KeyInfo {
            subkeys: len32(node.subkeys.len()),
            max_subkey_len: longest(node.subkeys.iter().map(|(n, _)| n.len())),
            max_class_len: longest(node.subkeys.iter().map(|(_, c)| c.class.len())),
            values: len32(node.values.len()),
            max_value_name_len: longest(node.values.iter().map(|v| v.name.len())),
            max_value_len: longest(node.values.iter().map(|v| v.data.len())),
        };
        if open.remote && self.under_report_remote {
            info.max_subkey_len /= 2;
            info.max_value_name_len /= 2;
        }
        Ok(info)
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u8]) -> NativeResult<usize> {
        let mut state = self.begin(Operation::EnumKey)?;
        let open = state.resolve(key)?;
        if !open.access.contains(Access::ENUMERATE_SUB_KEYS) {
            return Err(Status::ACCESS_DENIED);
        }
        let node = state.node(&open)?;
        let (sub_name, _) = node
            .subkeys
            .get(index as usize)
            .ok_or(Status::NO_MORE_ITEMS)?;
        copy_name(sub_name, name)
    }

    fn enum_value(&self, key: RawKey, index: u32, name: &mut [u8]) -> NativeResult<usize> {
        let mut state = self.begin(Operation::EnumValue)?;
        let open = state.resolve(key)?;
        if !open.access.contains(Access::QUERY_VALUE) {
            return Err(Status::ACCESS_DENIED);
        }
        let node = state.node(&open)?;
        let value = node.values.get(index as usize).ok_or(Status::NO_MORE_ITEMS)?;
        copy_name(&value.name, name)
    }

    fn expand_environment_strings(&self, src: &AsciiString, dst: Option<&mut [u8]>) -> NativeResult<u32> {
        drop(self.begin(Operation::ExpandEnvironmentStrings)?);
        let expanded = self.expand(src.as_bytes());
        let size = expanded.len() + 1;
        if let Some(dst) = dst.filter(|d| d.len() >= size) {
            dst[..expanded.len()].copy_from_slice(&expanded);
            dst[expanded.len()] = 0;
        }
        Ok(len32(size))
    }
}
