//! Bitsets for entry state and table deferred work.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Resolution and administrative state of an entry.
///
/// The engine only reads these bits in the walker; their meaning belongs to
/// the protocol family.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct NeighFlags(u16);

impl NeighFlags {
    pub const NONE: Self = Self(0);
    /// Resolution request sent, no reply yet.
    pub const INCOMPLETE: Self = Self(0x01);
    pub const REACHABLE: Self = Self(0x02);
    pub const STALE: Self = Self(0x04);
    pub const DELAY: Self = Self(0x08);
    pub const PROBE: Self = Self(0x10);
    pub const FAILED: Self = Self(0x20);
    /// Device needs no resolution (point-to-point, loopback).
    pub const NOARP: Self = Self(0x40);
    /// Administratively configured; never aged out unless asked.
    pub const PERMANENT: Self = Self(0x80);

    const NAMES: [(Self, &'static str); 8] = [
        (Self::INCOMPLETE, "INCOMPLETE"),
        (Self::REACHABLE, "REACHABLE"),
        (Self::STALE, "STALE"),
        (Self::DELAY, "DELAY"),
        (Self::PROBE, "PROBE"),
        (Self::FAILED, "FAILED"),
        (Self::NOARP, "NOARP"),
        (Self::PERMANENT, "PERMANENT"),
    ];

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when at least one bit is set outside `mask`.
    ///
    /// This is the walker's visit test: entries fully covered by the mask
    /// are protected.
    pub const fn escapes(self, mask: Self) -> bool {
        self.0 & !mask.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for NeighFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for NeighFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for NeighFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for NeighFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for NeighFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut rest = *self;
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                rest.remove(flag);
                first = false;
            }
        }
        if !rest.is_empty() {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "{:#x}", rest.0)?;
        }
        Ok(())
    }
}

/// Work a table owes before it is consistent.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub struct DeferredWork(u32);

impl DeferredWork {
    pub const NONE: Self = Self(0);
    /// The pending queue holds entries not yet committed to a bucket.
    pub const PENDING_INSERT: Self = Self(0x1);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}
