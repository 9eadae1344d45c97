//! Header for all heap objects
//!
//! Carries the collection stamp, the exact footprint recorded at
//! allocation and a couple of state bits.

use std::cell::Cell;

use bitmaps::Bitmap;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderBits(Bitmap<2>);

/// Object is a shared singleton (interned literal, builtin class)
const SHARED_BIT: usize = 0;
/// Object's links may no longer be patched
const FROZEN_BIT: usize = 1;

impl HeaderBits {
    fn with(mut self, bit: usize) -> Self {
        self.0.set(bit, true);
        self
    }

    fn is_set(&self, bit: usize) -> bool {
        self.0.get(bit)
    }
}

/// Object Header
///
/// Marking compares `stamp` against the generation of the current
/// traversal so no unmark pass is needed between traversals.
#[derive(Debug)]
pub struct AllocHeader {
    /// Generation of the last traversal that visited this object
    stamp: Cell<u32>,
    /// Header bits for object state
    bits: Cell<HeaderBits>,
    /// Byte footprint computed before construction
    footprint: u32,
}

impl AllocHeader {
    pub fn new(footprint: usize) -> Self {
        AllocHeader {
            stamp: Cell::new(0),
            bits: Cell::new(HeaderBits::default()),
            footprint: footprint as u32,
        }
    }

    /// Stamp with the generation, returning false if already stamped
    pub fn stamp(&self, generation: u32) -> bool {
        if self.stamp.get() == generation {
            false
        } else {
            self.stamp.set(generation);
            true
        }
    }

    pub fn is_stamped(&self, generation: u32) -> bool {
        self.stamp.get() == generation
    }

    pub fn footprint(&self) -> usize {
        self.footprint as usize
    }

    pub fn set_shared(&self) {
        self.bits.set(self.bits.get().with(SHARED_BIT));
    }

    pub fn is_shared(&self) -> bool {
        self.bits.get().is_set(SHARED_BIT)
    }

    pub fn freeze(&self) {
        self.bits.set(self.bits.get().with(FROZEN_BIT));
    }

    pub fn is_frozen(&self) -> bool {
        self.bits.get().is_set(FROZEN_BIT)
    }
}

#[cfg(test)]
pub mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    pub fn test_expected_bitmap_size() {
        assert_eq!(size_of::<HeaderBits>(), 1);
    }

    #[test]
    pub fn test_expected_header_size() {
        // stamp: ff ff ff ff bits: ff 00 00 00
        // len  : ff ff ff ff
        assert_eq!(size_of::<AllocHeader>(), 12);
    }

    #[test]
    pub fn test_stamp_once_per_generation() {
        let header = AllocHeader::new(32);
        assert!(header.stamp(1));
        assert!(!header.stamp(1));
        assert!(header.is_stamped(1));
        assert!(header.stamp(2));
        assert!(!header.is_stamped(1));
    }

    #[test]
    pub fn test_bits_are_independent() {
        let header = AllocHeader::new(32);
        header.freeze();
        assert!(header.is_frozen());
        assert!(!header.is_shared());
        header.set_shared();
        assert!(header.is_frozen() && header.is_shared());
        assert_eq!(header.footprint(), 32);
    }
}
