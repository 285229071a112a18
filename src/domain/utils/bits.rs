/// Declares a transparent bitmask newtype with named flags and set operations.
macro_rules! bit_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($ty:ty) {
            $( $(#[$fmeta:meta])* const $flag:ident = $value:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name($ty);

        #[allow(dead_code)]
        impl $name {
            pub const EMPTY: $name = $name(0);
            $( $(#[$fmeta])* pub const $flag: $name = $name($value); )*

            const NAMED: &'static [($name, &'static str)] = &[$( ($name($value), stringify!($flag)) ),*];

            pub const fn bits(self) -> $ty {
                self.0
            }

            pub const fn from_bits(bits: $ty) -> $name {
                $name(bits)
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = $name;
            fn bitand(self, rhs: $name) -> $name {
                $name(self.0 & rhs.0)
            }
        }

        impl std::ops::BitXor for $name {
            type Output = $name;
            fn bitxor(self, rhs: $name) -> $name {
                $name(self.0 ^ rhs.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let set: Vec<&str> =
                    Self::NAMED.iter().filter(|(flag, _)| flag.0 != 0 && self.contains(*flag)).map(|(_, name)| *name).collect();
                write!(f, "{}({})", stringify!($name), set.join("|"))
            }
        }
    };
}

pub(crate) use bit_set;
