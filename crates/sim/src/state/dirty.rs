use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Change flags for the replicated fields of a [`super::SimEntityData`].
///
/// Bit positions are part of the wire format. Bit 3 and bit 8 are unused
/// (bit 8 used to carry the id, which now travels in the frame envelope).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirtyBits(u32);

impl DirtyBits {
    pub const NONE: DirtyBits = DirtyBits(0);
    pub const ALL: DirtyBits = DirtyBits(u32::MAX);

    pub const POSITION: DirtyBits = DirtyBits(1 << 0);
    pub const ROTATION: DirtyBits = DirtyBits(1 << 1);
    pub const VELOCITY: DirtyBits = DirtyBits(1 << 2);
    pub const SCALE: DirtyBits = DirtyBits(1 << 4);
    pub const ACCELERATION: DirtyBits = DirtyBits(1 << 5);
    pub const LABEL: DirtyBits = DirtyBits(1 << 6);
    pub const COLOR: DirtyBits = DirtyBits(1 << 7);
    pub const TYPE: DirtyBits = DirtyBits(1 << 9);
    pub const COLLISION: DirtyBits = DirtyBits(1 << 10);
    /// Tracked locally, never written to the wire.
    pub const BUMPED: DirtyBits = DirtyBits(1 << 11);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when any bit of `other` is also set in `self`.
    pub const fn intersects(self, other: DirtyBits) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: DirtyBits) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DirtyBits {
    type Output = DirtyBits;

    fn bitor(self, rhs: DirtyBits) -> DirtyBits {
        DirtyBits(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyBits {
    fn bitor_assign(&mut self, rhs: DirtyBits) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DirtyBits {
    type Output = DirtyBits;

    fn bitand(self, rhs: DirtyBits) -> DirtyBits {
        DirtyBits(self.0 & rhs.0)
    }
}

impl From<u32> for DirtyBits {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for DirtyBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirtyBits({:#010x})", self.0)
    }
}
