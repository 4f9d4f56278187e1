use std::fmt;

/// An LSB ordered bitmap with a fixed length.
///
/// Used for column validity (bit set means valid) and for the batch skip
/// mask (bit set means the row slot is absent).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    len: usize,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new_with_val(val: bool, len: usize) -> Self {
        let fill = if val { u8::MAX } else { 0 };
        Bitmap {
            len,
            data: vec![fill; len.div_ceil(8)],
        }
    }

    pub fn new_with_all_true(len: usize) -> Self {
        Self::new_with_val(true, len)
    }

    pub fn new_with_all_false(len: usize) -> Self {
        Self::new_with_val(false, len)
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set every bit to `val` without touching the allocation.
    pub fn reset(&mut self, val: bool) {
        let fill = if val { u8::MAX } else { 0 };
        self.data.iter_mut().for_each(|b| *b = fill);
    }

    /// Number of set bits within the logical length.
    pub fn count_trues(&self) -> usize {
        let full_bytes = self.len / 8;
        let mut count: usize = self.data[..full_bytes]
            .iter()
            .map(|b| b.count_ones() as usize)
            .sum();

        let rem = self.len % 8;
        if rem != 0 {
            let mask = (1u8 << rem) - 1;
            count += (self.data[full_bytes] & mask).count_ones() as usize;
        }

        count
    }

    /// Get the value at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn value(&self, idx: usize) -> bool {
        (self.data[idx >> 3] >> (idx & 7)) & 1 != 0
    }

    /// Set a bit at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn set_unchecked(&mut self, idx: usize, val: bool) {
        let bit = 1 << (idx & 7);
        if val {
            self.data[idx >> 3] |= bit;
        } else {
            self.data[idx >> 3] &= !bit;
        }
    }

    /// Iterate all bits in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.value(idx))
    }

    /// Iterate the indices of bits equal to `val` within `0..limit`.
    pub fn index_iter(&self, val: bool, limit: usize) -> impl Iterator<Item = usize> + '_ {
        let limit = usize::min(limit, self.len);
        (0..limit).filter(move |&idx| self.value(idx) == val)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<_> = self.iter().collect();
        f.debug_struct("Bitmap").field("values", &values).finish()
    }
}

impl FromIterator<bool> for Bitmap {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        let mut bitmap = Bitmap::default();
        for (idx, bit) in iter.into_iter().enumerate() {
            if idx % 8 == 0 {
                bitmap.data.push(0);
            }
            bitmap.len += 1;
            bitmap.set_unchecked(idx, bit);
        }
        bitmap
    }
}
