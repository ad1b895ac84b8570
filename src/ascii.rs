//! Single-byte string conversion for the ANSI registry functions.
//!
//! The registry layer works on byte strings. Rust strings are narrowed one
//! character at a time by keeping the low byte of each code point, and bytes are
//! widened back by treating each one as a code point in `0..=255`. Characters
//! above `U+00FF` therefore do not survive a round trip.

use crate::error::{Error, Result};

/// Narrows a character to a single byte by keeping its low byte.
#[inline]
pub fn narrow_char(c: char) -> u8 {
    c as u32 as u8
}

/// Widens a byte to the character with the same code point.
#[inline]
pub fn widen_byte(b: u8) -> char {
    char::from(b)
}

/// Converts a string into a newly allocated NUL-terminated byte buffer.
///
/// The buffer is sized for the UTF-8 length plus the terminator.
///
/// # Errors
///
/// Returns [`Error::OutOfMemory`] if the buffer cannot be allocated.
///
/// # Example
///
/// ```
/// use registry_bridge::ascii::to_new_ascii;
///
/// let ascii = to_new_ascii("Hello").unwrap();
/// assert_eq!(ascii.as_bytes_with_nul(), b"Hello\0");
/// ```
pub fn to_new_ascii(s: &str) -> Result<AsciiString> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(s.len() + 1)
        .map_err(|_| Error::out_of_memory("to_new_ascii"))?;
    buffer.extend(s.chars().map(narrow_char));
    buffer.push(0);
    Ok(AsciiString { buffer })
}

/// Converts a string into a fixed-capacity buffer.
///
/// Copies at most `buf.len() - 1` characters and always NUL-terminates when the
/// buffer is non-empty. Excess characters are dropped silently. Returns the
/// number of characters copied, not counting the terminator.
///
/// # Example
///
/// ```
/// use registry_bridge::ascii::to_ascii_into;
///
/// let mut buf = [0xffu8; 4];
/// assert_eq!(to_ascii_into("Hello", &mut buf), 3);
/// assert_eq!(&buf, b"Hel\0");
/// ```
pub fn to_ascii_into(s: &str, buf: &mut [u8]) -> usize {
    let Some(limit) = buf.len().checked_sub(1) else {
        return 0;
    };
    let mut copied = 0;
    for (slot, c) in buf[..limit].iter_mut().zip(s.chars()) {
        *slot = narrow_char(c);
        copied += 1;
    }
    buf[copied] = 0;
    copied
}

/// Widens a byte buffer into a `String`, stopping at the first NUL if present.
#[inline]
pub fn from_ascii(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    from_ascii_with_len(bytes, len)
}

/// Widens exactly `len` bytes (clamped to the buffer) into a `String`.
///
/// Unlike [`from_ascii`], embedded NULs are kept.
#[inline]
pub fn from_ascii_with_len(bytes: &[u8], len: usize) -> String {
    bytes[..len.min(bytes.len())]
        .iter()
        .copied()
        .map(widen_byte)
        .collect()
}

/// An owned NUL-terminated byte string for passing names to the native layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsciiString {
    buffer: Vec<u8>,
}

impl AsciiString {
    /// Creates a new `AsciiString` from a Rust string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the buffer cannot be allocated.
    #[inline]
    pub fn new(s: &str) -> Result<Self> {
        to_new_ascii(s)
    }

    /// Returns the bytes without the terminator.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len()]
    }

    /// Returns the bytes including the terminator.
    #[inline]
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buffer
    }

    /// Returns a pointer to the null-terminated string.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    /// Returns the string as a PCSTR for use with Windows APIs.
    #[cfg(windows)]
    #[inline]
    pub fn as_pcstr(&self) -> windows::core::PCSTR {
        windows::core::PCSTR::from_raw(self.buffer.as_ptr())
    }

    /// Returns the length in bytes, not including the terminator.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Returns true if the string is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts back to a Rust `String`.
    #[inline]
    pub fn to_string_lossy(&self) -> String {
        from_ascii(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let original = "Software\\Test";
        let ascii = to_new_ascii(original).unwrap();
        assert_eq!(from_ascii(ascii.as_bytes_with_nul()), original);
    }

    #[test]
    fn test_empty_string() {
        let ascii = to_new_ascii("").unwrap();
        assert_eq!(ascii.as_bytes_with_nul(), &[0]);
        assert!(ascii.is_empty());
        assert_eq!(from_ascii(ascii.as_bytes_with_nul()), "");
    }

    #[test]
    fn test_high_code_points_keep_low_byte() {
        // U+00E9 fits a byte, U+0141 keeps 0x41 ('A'), U+1F30D keeps 0x0D.
        let ascii = to_new_ascii("é\u{141}\u{1F30D}").unwrap();
        assert_eq!(ascii.as_bytes(), &[0xE9, 0x41, 0x0D]);
        assert_eq!(ascii.to_string_lossy(), "éA\r");
    }

    #[test]
    fn test_latin1_roundtrip() {
        let original = "Grüße";
        let ascii = to_new_ascii(original).unwrap();
        assert_eq!(ascii.len(), 5);
        assert_eq!(ascii.to_string_lossy(), original);
    }

    #[test]
    fn test_fixed_buffer_truncates() {
        let mut buf = [0xAAu8; 6];
        let copied = to_ascii_into("abcdefgh", &mut buf);
        assert_eq!(copied, 5);
        assert_eq!(&buf, b"abcde\0");
    }

    #[test]
    fn test_fixed_buffer_short_input() {
        let mut buf = [0xAAu8; 6];
        let copied = to_ascii_into("ab", &mut buf);
        assert_eq!(copied, 2);
        assert_eq!(&buf[..3], b"ab\0");
        assert_eq!(buf[3], 0xAA);
    }

    #[test]
    fn test_fixed_buffer_degenerate_capacities() {
        let mut empty: [u8; 0] = [];
        assert_eq!(to_ascii_into("abc", &mut empty), 0);

        let mut one = [0xAAu8; 1];
        assert_eq!(to_ascii_into("abc", &mut one), 0);
        assert_eq!(one, [0]);
    }

    #[test]
    fn test_from_ascii_with_len_keeps_nuls() {
        assert_eq!(from_ascii_with_len(b"a\0b", 3), "a\0b");
        assert_eq!(from_ascii_with_len(b"abc", 10), "abc");
        assert_eq!(from_ascii(b"a\0b"), "a");
    }
}
