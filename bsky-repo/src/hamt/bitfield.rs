use crate::error::{Error, Result};

/// Number of slots in a node.
const SLOTS: usize = 256;

const WORDS: usize = SLOTS / 64;
const BYTES: usize = SLOTS / 8;

/// Which of the 256 slots of a node are occupied.
///
/// Word `i` holds slots `64 * i .. 64 * (i + 1)`, least significant bit first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitfield([u64; WORDS]);

impl Bitfield {
    pub fn contains(&self, slot: u8) -> bool {
        let (word, bit) = Self::locate(slot);
        self.0[word] >> bit & 1 == 1
    }

    pub fn insert(&mut self, slot: u8) {
        let (word, bit) = Self::locate(slot);
        self.0[word] |= 1 << bit;
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of occupied slots below `slot`, which is the index of `slot` in the dense
    /// pointer array.
    pub fn rank(&self, slot: u8) -> usize {
        let (word, bit) = Self::locate(slot);
        let below: usize = self.0[..word].iter().map(|w| w.count_ones() as usize).sum();
        let mask = (1u64 << bit) - 1;
        below + (self.0[word] & mask).count_ones() as usize
    }

    fn locate(slot: u8) -> (usize, u32) {
        (slot as usize / 64, slot as u32 % 64)
    }

    /// Big endian, slot 255 is the top bit of the first byte.
    pub fn to_bytes(self) -> [u8; BYTES] {
        let mut out = [0u8; BYTES];
        for (chunk, word) in out.chunks_exact_mut(8).zip(self.0.iter().rev()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Inverse of [`Bitfield::to_bytes`]. Shorter input is treated as left padded with zeros.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let pad = BYTES
            .checked_sub(bytes.len())
            .ok_or_else(|| Error::Hamt(format!("bitfield of {} bytes", bytes.len())))?;
        let mut full = [0u8; BYTES];
        full[pad..].copy_from_slice(bytes);

        let mut words = [0u64; WORDS];
        for (word, chunk) in words.iter_mut().rev().zip(full.chunks_exact(8)) {
            let mut be = [0u8; 8];
            be.copy_from_slice(chunk);
            *word = u64::from_be_bytes(be);
        }
        Ok(Self(words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_and_rank() {
        let mut bits = Bitfield::default();
        for slot in [3u8, 64, 130, 255] {
            bits.insert(slot);
        }
        assert!(bits.contains(64));
        assert!(!bits.contains(65));
        assert_eq!(bits.count(), 4);
        assert_eq!(bits.rank(0), 0);
        assert_eq!(bits.rank(3), 0);
        assert_eq!(bits.rank(4), 1);
        assert_eq!(bits.rank(64), 1);
        assert_eq!(bits.rank(200), 3);
        assert_eq!(bits.rank(255), 3);
    }

    #[test]
    fn byte_layout() {
        let mut bits = Bitfield::default();
        assert_eq!(bits.to_bytes(), [0; 32]);

        bits.insert(0);
        bits.insert(255);
        let bytes = bits.to_bytes();
        assert_eq!(bytes[31], 1);
        assert_eq!(bytes[0], 0x80);
        assert_eq!(Bitfield::from_bytes(&bytes).unwrap(), bits);

        assert!(Bitfield::from_bytes(&[0x01]).unwrap().contains(0));
        assert!(Bitfield::from_bytes(&[0; 33]).is_err());
    }
}
