//! # Bit Flags
//!
//! Packed per-entity boolean attributes, 8 flags per byte.
//!
//! Flag `i` lives in byte `i / 8`, bit `i % 8` (LSB first). Unused high bits
//! of the final byte are always reported as zero.

use crate::config::BoundsCheck;
use crate::error::{check_index, CoreError, CoreResult};

/// Fixed-length set of boolean flags packed into bytes.
///
/// # Example
///
/// ```rust
/// use cadence_core::BitFlags;
///
/// let mut flags = BitFlags::new(10);
/// flags.set(3, true)?;
/// flags.set(9, true)?;
/// assert_eq!(flags.to_bytes(), vec![0b0000_1000, 0b0000_0010]);
/// # Ok::<(), cadence_core::CoreError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitFlags {
    /// Packed storage, `ceil(len / 8)` bytes.
    bytes: Vec<u8>,
    /// Number of flags.
    len: usize,
    /// Indexed-access policy.
    bounds: BoundsCheck,
}

#[inline]
const fn byte_len(count: usize) -> usize {
    count.div_ceil(8)
}

/// Mask of the valid bits in the final byte of a `count`-flag set.
#[inline]
const fn tail_mask(count: usize) -> u8 {
    match count % 8 {
        0 => 0xFF,
        rem => (1u8 << rem) - 1,
    }
}

impl BitFlags {
    /// Creates `count` flags, all clear, with checked access.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self::with_bounds(count, BoundsCheck::Checked)
    }

    /// Creates `count` clear flags with the given access policy.
    #[must_use]
    pub fn with_bounds(count: usize, bounds: BoundsCheck) -> Self {
        Self {
            bytes: vec![0u8; byte_len(count)],
            len: count,
            bounds,
        }
    }

    /// Rebuilds a flag set from packed bytes.
    ///
    /// Padding bits beyond `count` are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SizeMismatch`] if `bytes.len() != ceil(count / 8)`.
    pub fn from_bytes(bytes: &[u8], count: usize) -> CoreResult<Self> {
        let expected = byte_len(count);
        if bytes.len() != expected {
            return Err(CoreError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let mut flags = Self {
            bytes: bytes.to_vec(),
            len: count,
            bounds: BoundsCheck::Checked,
        };
        flags.clear_padding();
        Ok(flags)
    }

    /// Number of flags.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the set holds no flags.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of storage bytes, always `ceil(len / 8)`.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Reads flag `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] outside `[0, len)` when checked.
    ///
    /// # Panics
    ///
    /// With [`BoundsCheck::Unchecked`], panics if `index / 8` is past the
    /// storage.
    #[inline]
    pub fn get(&self, index: usize) -> CoreResult<bool> {
        if self.bounds.is_checked() {
            check_index(index, self.len)?;
        }
        Ok(self.bytes[index / 8] & (1 << (index % 8)) != 0)
    }

    /// Writes flag `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] outside `[0, len)` when checked.
    ///
    /// # Panics
    ///
    /// With [`BoundsCheck::Unchecked`], panics if `index / 8` is past the
    /// storage.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) -> CoreResult<()> {
        if self.bounds.is_checked() {
            check_index(index, self.len)?;
        }
        self.write_bit(index, value);
        Ok(())
    }

    /// Writes flag `index`, first growing the set to cover it. New flags
    /// start clear.
    pub fn set_or_grow(&mut self, index: usize, value: bool) {
        if index >= self.len {
            self.resize(index + 1);
        }
        self.write_bit(index, value);
    }

    #[inline]
    fn write_bit(&mut self, index: usize, value: bool) {
        let mask = 1u8 << (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
    }

    /// Sets every flag to `value`.
    pub fn fill(&mut self, value: bool) {
        let byte = if value { 0xFF } else { 0 };
        self.bytes.iter_mut().for_each(|b| *b = byte);
        self.clear_padding();
    }

    /// Number of set flags.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        let Some((last, full)) = self.bytes.split_last() else {
            return 0;
        };
        let full_ones: u32 = full.iter().map(|b| b.count_ones()).sum();
        (full_ones + (last & tail_mask(self.len)).count_ones()) as usize
    }

    /// Changes the number of flags. New flags start clear.
    pub fn resize(&mut self, count: usize) {
        self.clear_padding();
        self.bytes.resize(byte_len(count), 0);
        self.len = count;
        self.clear_padding();
    }

    /// Materializes all flags as bytes, unused high bits zero.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.bytes.clone();
        if let Some(last) = out.last_mut() {
            *last &= tail_mask(self.len);
        }
        out
    }

    /// Materializes flags `start..start + count` as bytes.
    ///
    /// Flag `start` lands in bit 0 of the first output byte.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if the range extends past `len`.
    pub fn to_bytes_range(&self, start: usize, count: usize) -> CoreResult<Vec<u8>> {
        let end = start.checked_add(count).unwrap_or(usize::MAX);
        if end > self.len {
            return Err(CoreError::IndexOutOfRange {
                index: end.saturating_sub(1),
                len: self.len,
            });
        }

        let mut out = vec![0u8; byte_len(count)];
        for (offset, index) in (start..end).enumerate() {
            if self.bytes[index / 8] & (1 << (index % 8)) != 0 {
                out[offset / 8] |= 1 << (offset % 8);
            }
        }
        Ok(out)
    }

    /// Iterates the flags in index order.
    ///
    /// The iterator is finite and cloneable; calling `iter` again restarts
    /// from index 0.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            flags: self,
            index: 0,
        }
    }

    fn clear_padding(&mut self) {
        let mask = tail_mask(self.len);
        if let Some(last) = self.bytes.last_mut() {
            *last &= mask;
        }
    }
}

/// Iterator over a [`BitFlags`] set.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    flags: &'a BitFlags,
    index: usize,
}

impl Iterator for Iter<'_> {
    type Item = bool;

    #[inline]
    fn next(&mut self) -> Option<bool> {
        if self.index >= self.flags.len {
            return None;
        }
        let i = self.index;
        self.index += 1;
        Some(self.flags.bytes[i / 8] & (1 << (i % 8)) != 0)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.flags.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a BitFlags {
    type Item = bool;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_flags_pack_into_two_bytes() {
        let mut flags = BitFlags::new(10);
        flags.set(3, true).unwrap();
        flags.set(9, true).unwrap();

        let bytes = flags.to_bytes();
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes, vec![0b0000_1000, 0b0000_0010]);
        assert_eq!(flags.count_ones(), 2);
    }

    #[test]
    fn test_byte_length_is_ceiling() {
        assert_eq!(BitFlags::new(0).byte_len(), 0);
        assert_eq!(BitFlags::new(1).byte_len(), 1);
        assert_eq!(BitFlags::new(8).byte_len(), 1);
        assert_eq!(BitFlags::new(9).byte_len(), 2);
    }

    #[test]
    fn test_single_flag_container() {
        let mut flags = BitFlags::new(1);
        flags.set(0, true).unwrap();
        assert!(flags.get(0).unwrap());
        assert_eq!(flags.to_bytes(), vec![1]);
    }

    #[test]
    fn test_out_of_range() {
        let mut flags = BitFlags::new(10);
        assert_eq!(
            flags.get(10),
            Err(CoreError::IndexOutOfRange { index: 10, len: 10 })
        );
        assert!(flags.set(11, true).is_err());
    }

    #[test]
    fn test_clear_flag() {
        let mut flags = BitFlags::new(16);
        flags.set(12, true).unwrap();
        flags.set(12, false).unwrap();
        assert!(!flags.get(12).unwrap());
        assert_eq!(flags.count_ones(), 0);
    }

    #[test]
    fn test_fill_keeps_padding_clear() {
        let mut flags = BitFlags::new(10);
        flags.fill(true);
        assert_eq!(flags.to_bytes(), vec![0xFF, 0b0000_0011]);
        assert_eq!(flags.count_ones(), 10);
    }

    #[test]
    fn test_sub_range() {
        let mut flags = BitFlags::new(20);
        flags.set(5, true).unwrap();
        flags.set(6, true).unwrap();
        flags.set(14, true).unwrap();

        // Flags 4..14: bit 1 and bit 2 set, flag 14 excluded.
        assert_eq!(flags.to_bytes_range(4, 10).unwrap(), vec![0b0000_0110, 0]);
        // Flags 6..15: bit 0 and bit 8.
        assert_eq!(flags.to_bytes_range(6, 9).unwrap(), vec![0b0000_0001, 0b0000_0001]);
        assert!(flags.to_bytes_range(15, 6).is_err());
        assert!(flags.to_bytes_range(20, 0).unwrap().is_empty());
    }

    #[test]
    fn test_iteration_is_restartable() {
        let mut flags = BitFlags::new(5);
        flags.set(1, true).unwrap();
        flags.set(4, true).unwrap();

        let first: Vec<bool> = flags.iter().collect();
        let second: Vec<bool> = (&flags).into_iter().collect();
        assert_eq!(first, vec![false, true, false, false, true]);
        assert_eq!(first, second);
        assert_eq!(flags.iter().len(), 5);
    }

    #[test]
    fn test_from_bytes() {
        let flags = BitFlags::from_bytes(&[0xFF, 0xFF], 10).unwrap();
        assert_eq!(flags.count_ones(), 10);
        assert_eq!(flags.to_bytes(), vec![0xFF, 0b0000_0011]);

        assert_eq!(
            BitFlags::from_bytes(&[0], 10),
            Err(CoreError::SizeMismatch { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn test_resize() {
        let mut flags = BitFlags::new(3);
        flags.fill(true);
        flags.resize(12);
        assert_eq!(flags.len(), 12);
        assert_eq!(flags.count_ones(), 3);
        assert!(!flags.get(11).unwrap());

        flags.resize(2);
        assert_eq!(flags.count_ones(), 2);
        assert_eq!(flags.byte_len(), 1);
    }

    #[test]
    fn test_set_or_grow() {
        let mut flags = BitFlags::new(0);
        flags.set_or_grow(9, true);
        assert_eq!(flags.len(), 10);
        assert_eq!(flags.to_bytes(), vec![0, 0b10]);

        flags.set_or_grow(3, true);
        flags.set_or_grow(9, false);
        assert_eq!(flags.len(), 10);
        assert_eq!(flags.to_bytes(), vec![0b1000, 0]);
    }

    #[test]
    fn test_unchecked_padding_write_is_masked() {
        let mut flags = BitFlags::with_bounds(10, BoundsCheck::Unchecked);
        // Index 12 is past len but inside the final byte.
        flags.set(12, true).unwrap();
        assert_eq!(flags.to_bytes(), vec![0, 0]);
        assert_eq!(flags.count_ones(), 0);
    }
}
