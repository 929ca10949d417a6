//! Immutable byte-oriented string payload.
//!
//! Sparkling strings are immutable byte strings with a lazily cached
//! content hash. Every public operation is pure: it allocates and returns
//! a new string, never mutating the receiver.

use crate::error::RuntimeError;
use rustc_hash::FxHasher;
use std::borrow::Cow;
use std::cell::Cell;
use std::hash::Hasher;

/// Hash a byte slice with the same function `SparkString` caches.
///
/// `HashMap::get_strkey` uses this to probe with a borrowed `&str`
/// without allocating a string payload first.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut h = FxHasher::default();
    h.write(bytes);
    h.finish()
}

/// An immutable byte string with length and cached hash.
pub struct SparkString {
    bytes: Box<[u8]>,
    /// Content hash, computed on first use
    hash: Cell<Option<u64>>,
}

impl SparkString {
    /// Copying constructor: duplicates the caller's buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        SparkString {
            bytes: bytes.to_vec().into_boxed_slice(),
            hash: Cell::new(None),
        }
    }

    /// Owning constructor: takes over a caller-allocated buffer.
    pub fn from_owned(bytes: Vec<u8>) -> Self {
        SparkString {
            bytes: bytes.into_boxed_slice(),
            hash: Cell::new(None),
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lossy UTF-8 view, used for display and for OS-facing calls.
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Content hash, cached after the first call.
    pub fn hash(&self) -> u64 {
        match self.hash.get() {
            Some(h) => h,
            None => {
                let h = hash_bytes(&self.bytes);
                self.hash.set(Some(h));
                h
            }
        }
    }

    /// Concatenation of two strings, as a new string.
    pub fn concat(&self, other: &SparkString) -> SparkString {
        let mut buf = Vec::with_capacity(self.len() + other.len());
        buf.extend_from_slice(&self.bytes);
        buf.extend_from_slice(&other.bytes);
        SparkString::from_owned(buf)
    }

    /// Find the first occurrence of `needle` at or after `offset`.
    ///
    /// A negative offset counts from the end of the string. The normalized
    /// offset must land within `[0, len]`. Returns -1 when not found.
    pub fn find(&self, needle: &SparkString, offset: i64) -> Result<i64, RuntimeError> {
        let len = self.len() as i64;
        let off = if offset < 0 { len + offset } else { offset };

        if off < 0 || off > len {
            return Err(RuntimeError::new("normalized search offset out of bounds"));
        }

        let hay = &self.bytes[off as usize..];
        if needle.is_empty() {
            return Ok(off);
        }

        let found = hay
            .windows(needle.len())
            .position(|w| w == needle.as_bytes());

        Ok(match found {
            Some(i) => off + i as i64,
            None => -1,
        })
    }

    /// Substring of `length` bytes starting at `start`.
    ///
    /// Requires `0 <= start <= len`, `0 <= length` and `start + length <= len`;
    /// each violated bound is reported separately.
    pub fn substr(&self, start: i64, length: i64) -> Result<SparkString, RuntimeError> {
        let len = self.len() as i64;

        if start < 0 || start > len {
            return Err(RuntimeError::new("starting index is negative or too high"));
        }
        if length < 0 || length > len {
            return Err(RuntimeError::new("length is negative or too big"));
        }
        if start + length > len {
            return Err(RuntimeError::new("end of substring is out of bounds"));
        }

        Ok(SparkString::from_bytes(
            &self.bytes[start as usize..(start + length) as usize],
        ))
    }

    /// Prefix of `length` bytes.
    pub fn substr_to(&self, length: i64) -> Result<SparkString, RuntimeError> {
        self.substr(0, length)
    }

    /// Suffix starting at `start`.
    pub fn substr_from(&self, start: i64) -> Result<SparkString, RuntimeError> {
        self.substr(start, self.len() as i64 - start)
    }

    /// Split on a non-empty separator, keeping empty pieces.
    pub fn split(&self, sep: &SparkString) -> Result<Vec<SparkString>, RuntimeError> {
        if sep.is_empty() {
            return Err(RuntimeError::new("cannot split on empty string"));
        }

        let mut pieces = Vec::new();
        let mut rest = &self.bytes[..];

        loop {
            let found = rest.windows(sep.len()).position(|w| w == sep.as_bytes());
            match found {
                Some(i) => {
                    pieces.push(SparkString::from_bytes(&rest[..i]));
                    rest = &rest[i + sep.len()..];
                }
                None => {
                    pieces.push(SparkString::from_bytes(rest));
                    break;
                }
            }
        }

        Ok(pieces)
    }

    /// The string repeated `n` times; `n` must not be negative.
    pub fn repeat(&self, n: i64) -> Result<SparkString, RuntimeError> {
        if n < 0 {
            return Err(RuntimeError::new("repeat count must not be negative"));
        }

        let mut buf = Vec::with_capacity(self.len() * n as usize);
        for _ in 0..n {
            buf.extend_from_slice(&self.bytes);
        }
        Ok(SparkString::from_owned(buf))
    }

    /// ASCII-lowercased copy.
    pub fn to_lower(&self) -> SparkString {
        SparkString::from_owned(self.bytes.to_ascii_lowercase())
    }

    /// ASCII-uppercased copy.
    pub fn to_upper(&self) -> SparkString {
        SparkString::from_owned(self.bytes.to_ascii_uppercase())
    }
}

impl PartialEq for SparkString {
    fn eq(&self, other: &Self) -> bool {
        // Cheap rejects first: length, then cached hashes if both are known
        if self.len() != other.len() {
            return false;
        }
        if let (Some(a), Some(b)) = (self.hash.get(), other.hash.get()) {
            if a != b {
                return false;
            }
        }
        self.bytes == other.bytes
    }
}

impl Eq for SparkString {}

impl PartialOrd for SparkString {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SparkString {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl std::fmt::Debug for SparkString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl std::fmt::Display for SparkString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> SparkString {
        SparkString::from_str(text)
    }

    #[test]
    fn test_hash_is_cached_and_content_based() {
        let a = s("hello");
        let b = SparkString::from_owned(b"hello".to_vec());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.hash());
        assert_ne!(a.hash(), s("world").hash());
    }

    #[test]
    fn test_equality_by_bytes() {
        assert_eq!(s("abc"), s("abc"));
        assert_ne!(s("abc"), s("abd"));
        assert_ne!(s("abc"), s("abcd"));
    }

    #[test]
    fn test_find_basic_and_offset() {
        let hay = s("hello world");
        assert_eq!(hay.find(&s("world"), 0).unwrap(), 6);
        assert_eq!(hay.find(&s("o"), 5).unwrap(), 7);
        assert_eq!(hay.find(&s("zzz"), 0).unwrap(), -1);
    }

    #[test]
    fn test_find_negative_offset_counts_from_end() {
        let hay = s("abcabc");
        assert_eq!(hay.find(&s("abc"), -3).unwrap(), 3);
        assert!(hay.find(&s("a"), -7).is_err());
    }

    #[test]
    fn test_substr_boundaries() {
        let str = s("sparkling");
        assert_eq!(str.substr(0, 9).unwrap(), str);
        assert_eq!(str.substr(3, 0).unwrap(), s(""));
        assert_eq!(str.substr(5, 4).unwrap(), s("ling"));
        assert!(str.substr(-1, 2).is_err());
        assert!(str.substr(0, 10).is_err());
        assert!(str.substr(8, 2).is_err());
    }

    #[test]
    fn test_substr_to_and_from() {
        let str = s("sparkling");
        assert_eq!(str.substr_to(5).unwrap(), s("spark"));
        assert_eq!(str.substr_from(5).unwrap(), s("ling"));
    }

    #[test]
    fn test_split_keeps_empty_pieces() {
        let pieces = s(",a,,b,").split(&s(",")).unwrap();
        let texts: Vec<String> = pieces.iter().map(|p| p.to_str_lossy().into_owned()).collect();
        assert_eq!(texts, vec!["", "a", "", "b", ""]);
    }

    #[test]
    fn test_split_rejects_empty_separator() {
        assert!(s("abc").split(&s("")).is_err());
    }

    #[test]
    fn test_split_join_round_trip() {
        let original = s("one::two::three");
        let pieces = original.split(&s("::")).unwrap();
        let mut joined = pieces[0].concat(&s(""));
        for p in &pieces[1..] {
            joined = joined.concat(&s("::")).concat(p);
        }
        assert_eq!(joined, original);
    }

    #[test]
    fn test_repeat() {
        assert_eq!(s("ab").repeat(3).unwrap(), s("ababab"));
        assert_eq!(s("ab").repeat(0).unwrap(), s(""));
        assert!(s("ab").repeat(-1).is_err());
    }

    #[test]
    fn test_case_folding() {
        assert_eq!(s("MiXeD 42!").to_lower(), s("mixed 42!"));
        assert_eq!(s("MiXeD 42!").to_upper(), s("MIXED 42!"));
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(s("abc") < s("abd"));
        assert!(s("ab") < s("abc"));
        assert!(s("b") > s("azz"));
    }
}
