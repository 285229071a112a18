use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Per-attribute (and per-resource entry) status bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrFlags(u32);

impl AttrFlags {
    pub const NONE: AttrFlags = AttrFlags(0);
    /// The attribute carries a value.
    pub const SET: AttrFlags = AttrFlags(0x01);
    /// Changed since the last successful save.
    pub const MODIFY: AttrFlags = AttrFlags(0x02);
    /// The value is a server default, not an explicit setting.
    pub const DEFLT: AttrFlags = AttrFlags(0x04);
    /// Encoded cache copy must be regenerated.
    pub const MODCACHE: AttrFlags = AttrFlags(0x08);
    /// Resource value is a reference (`@node`) to another node's resource.
    pub const INDIRECT: AttrFlags = AttrFlags(0x10);
    /// Resource is pointed to by at least one indirect reference.
    pub const TARGET: AttrFlags = AttrFlags(0x20);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> AttrFlags {
        AttrFlags(bits & 0x3f)
    }

    pub fn contains(self, other: AttrFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: AttrFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: AttrFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: AttrFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for AttrFlags {
    type Output = AttrFlags;
    fn bitor(self, rhs: AttrFlags) -> AttrFlags {
        AttrFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AttrFlags {
    fn bitor_assign(&mut self, rhs: AttrFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AttrFlags {
    type Output = AttrFlags;
    fn bitand(self, rhs: AttrFlags) -> AttrFlags {
        AttrFlags(self.0 & rhs.0)
    }
}

impl Not for AttrFlags {
    type Output = AttrFlags;
    fn not(self) -> AttrFlags {
        AttrFlags(!self.0 & 0x3f)
    }
}

impl fmt::Debug for AttrFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(AttrFlags, &str); 6] = [
            (AttrFlags::SET, "SET"),
            (AttrFlags::MODIFY, "MODIFY"),
            (AttrFlags::DEFLT, "DEFLT"),
            (AttrFlags::MODCACHE, "MODCACHE"),
            (AttrFlags::INDIRECT, "INDIRECT"),
            (AttrFlags::TARGET, "TARGET"),
        ];
        let set: Vec<&str> = NAMES.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect();
        write!(f, "AttrFlags({})", set.join("|"))
    }
}
