//! Key ordering.

use std::cmp::Ordering;

/// A total order over key blobs.
///
/// A tree binds one comparator at construction and uses it for every
/// ordering decision, so it must stay stable and total for the tree's
/// lifetime. A comparator that changes its answers can make deletion lose
/// its target, which poisons the tree.
pub trait Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

impl<F> Comparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// Byte-wise lexicographic order; a shorter key sorts before its extensions.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lexicographic;

impl Comparator for Lexicographic {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Orders keys holding big-endian unsigned integers.
///
/// Keys are usually 8 bytes wide, but any width orders numerically: leading
/// zero bytes are ignored, so `[1]` and `[0, 1]` are equal and a 9-byte key
/// with a nonzero first byte sorts after every `u64`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BigEndianU64;

impl BigEndianU64 {
    #[inline]
    fn significant(key: &[u8]) -> &[u8] {
        let start = key.iter().position(|&b| b != 0).unwrap_or(key.len());
        &key[start..]
    }
}

impl Comparator for BigEndianU64 {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let (a, b) = (Self::significant(a), Self::significant(b));
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}
