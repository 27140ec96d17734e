use std::fmt;

/// A fixed-length bit set, stored most significant bit first.
///
/// Bit `i` lives in byte `i / 8` under mask `0x80 >> (i % 8)`. Bits past
/// `len` in the last byte are always zero.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Bitmap {
    bytes: Vec<u8>,
    len: usize,
}

impl Bitmap {
    /// A bitmap of `len` clear bits.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Rebuild a bitmap from its wire bytes.
    ///
    /// Returns `None` if `bytes` has the wrong length for `len` or any
    /// padding bit is set.
    pub fn from_bytes(bytes: Vec<u8>, len: usize) -> Option<Self> {
        if bytes.len() != len.div_ceil(8) {
            return None;
        }
        let spare = bytes.len() * 8 - len;
        if spare > 0 {
            let last = *bytes.last()?;
            let mask = (1u8 << spare) - 1;
            if last & mask != 0 {
                return None;
            }
        }
        Some(Self { bytes, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of bit `index`; bits out of range read as clear.
    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bytes[index / 8] & (0x80 >> (index % 8)) != 0
    }

    /// Set bit `index`. Panics if `index >= len`.
    pub fn set(&mut self, index: usize) {
        assert!(index < self.len, "bit {index} out of range for bitmap of {}", self.len);
        self.bytes[index / 8] |= 0x80 >> (index % 8);
    }

    pub fn clear(&mut self, index: usize) {
        if index < self.len {
            self.bytes[index / 8] &= !(0x80 >> (index % 8));
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.get(i))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap(")?;
        for i in 0..self.len {
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        write!(f, ")")
    }
}
