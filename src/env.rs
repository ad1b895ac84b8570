//! Environment variable expansion.
//!
//! Expands `%VARNAME%` references through the native layer, so remote and
//! in-process backends resolve variables the same way registry values are read.

use crate::ascii::{from_ascii_with_len, AsciiString};
use crate::error::{classify, Context, Result};
use crate::native::RegistryApi;
use crate::sizing::{alloc_zeroed, SIZE_MARGIN};
use tracing::trace;

/// Expands environment variable references in a string.
///
/// Replaces `%VARNAME%` with the value of the environment variable. Unknown
/// variables are left as written.
///
/// # Example
///
/// ```
/// use registry_bridge::env::expand_environment_strings;
/// use registry_bridge::memory::MemoryRegistry;
///
/// let api = MemoryRegistry::builder().env("SystemRoot", "C:\\Windows").build();
/// let path = expand_environment_strings(&api, "%SystemRoot%\\System32")?;
/// assert_eq!(path, "C:\\Windows\\System32");
/// # Ok::<(), registry_bridge::error::Error>(())
/// ```
pub fn expand_environment_strings(api: &dyn RegistryApi, template: &str) -> Result<String> {
    let src = AsciiString::new(template)?;
    let fail = |status| classify(status, "ExpandEnvironmentStrings()", Context::none());

    // First call to get the required size
    let size = api.expand_environment_strings(&src, None).map_err(fail)?;
    let mut buffer = alloc_zeroed(size as usize + SIZE_MARGIN, "expand result")?;

    let written = api
        .expand_environment_strings(&src, Some(&mut buffer))
        .map_err(fail)?;
    trace!(template, size, written, "expanded environment strings");

    // The size includes the terminator
    let len = (written as usize).min(buffer.len()).saturating_sub(1);
    Ok(from_ascii_with_len(&buffer, len))
}
