//! # Registry Bridge
//!
//! A typed layer over the ANSI Windows registry functions.
//!
//! This crate turns raw registry calls into safe, idiomatic Rust operations:
//!
//! - **Error Handling**: native status codes classified into not-found-key,
//!   not-found-value and generic registry errors
//! - **Keys**: open, create, delete, flush, enumerate and close registry keys
//! - **Values**: read and write string, expandable string, multi-string,
//!   DWORD, big-endian DWORD and binary values
//! - **Counters**: read-modify-write increment and decrement of DWORD values
//! - **Remote Registries**: connect to another host, with the legacy size
//!   under-reporting corrected
//! - **Environment**: `%VAR%` expansion
//!
//! ## Quick Start
//!
//! ```
//! use registry_bridge::prelude::*;
//! use std::sync::Arc;
//!
//! let hkcu = RegistryKey::root(Arc::new(MemoryRegistry::new()), Predefined::CurrentUser);
//! let key = hkcu.create_subkey("Software\\Test", None, Access::ALL)?;
//!
//! key.set_registry_value(&RegistryValue::dword("Count", 0))?;
//! key.increment_dword("Count")?;
//! assert_eq!(key.get_value("Count")?.as_dword(), Some(1));
//!
//! key.set_registry_value(&RegistryValue::multi_string("Tags", ["a", "", "bb"]))?;
//! let tags = key.get_value("Tags")?;
//! assert_eq!(tags.as_multi_string().map(<[String]>::len), Some(3));
//! # Ok::<(), registry_bridge::error::Error>(())
//! ```
//!
//! ## Backends
//!
//! Every native call goes through the [`native::RegistryApi`] trait.
//! [`memory::MemoryRegistry`] keeps a registry in process and runs anywhere;
//! on Windows, `win32::Win32Registry` forwards to the real registry.
//!
//! ```ignore
//! use registry_bridge::prelude::*;
//! use registry_bridge::win32::Win32Registry;
//! use std::sync::Arc;
//!
//! let hklm = RegistryKey::root(Arc::new(Win32Registry::new()), Predefined::LocalMachine);
//! let key = hklm.open_subkey_default(r"SOFTWARE\Microsoft\Windows NT\CurrentVersion")?;
//! println!("{}", key.get_string_value("ProductName")?);
//! # Ok::<(), registry_bridge::error::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`error::Result<T>`]:
//!
//! ```
//! use registry_bridge::prelude::*;
//! use std::sync::Arc;
//!
//! let hkcu = RegistryKey::root(Arc::new(MemoryRegistry::new()), Predefined::CurrentUser);
//! match hkcu.open_subkey_default("Software\\Missing") {
//!     Err(Error::NoSuchKey { message }) => assert!(message.contains("Software\\Missing")),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

#![warn(missing_docs)]

// Core modules
pub mod ascii;
pub mod error;
pub mod handle;
pub mod native;

// Protocol and encoding
pub mod codec;
pub mod sizing;
pub mod value;

// Backends
pub mod memory;
#[cfg(windows)]
pub mod win32;

// Operation surface
pub mod env;
pub mod registry;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::ascii::{from_ascii, to_new_ascii, AsciiString};
    pub use crate::env::expand_environment_strings;
    pub use crate::error::{Error, IntegrityError, Result, Status};
    pub use crate::handle::{KeyObject, Predefined, RawKey};
    pub use crate::memory::MemoryRegistry;
    pub use crate::native::{Access, RegistryApi};
    pub use crate::registry::RegistryKey;
    pub use crate::value::{Payload, RegistryValue, ValueKind, ValueObject};
}
