use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $bit:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $(pub const $flag: Self = Self($bit);)+

            pub const fn bits(self) -> u32 {
                self.0
            }

            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let names: Vec<&str> = [$((stringify!($flag), Self::$flag)),+]
                    .iter()
                    .filter(|(_, flag)| self.contains(*flag))
                    .map(|(name, _)| *name)
                    .collect();
                if names.is_empty() {
                    f.write_str("NONE")
                } else {
                    f.write_str(&names.join(" | "))
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

flag_set! {
    /// What an audio service (one driver system) can do.
    ServiceCaps {
        TIME = 0x1,
        LATENCY = 0x2,
        FULL_DUPLEX = 0x4,
        AGGREGATION = 0x8,
        CHANNEL_MASK = 0x10,
        CONTROL_PANEL = 0x20,
        XRUN_DETECTION = 0x40,
    }
}

flag_set! {
    /// What a single device entry in a device list supports.
    DeviceCaps {
        INPUT = 0x1,
        OUTPUT = 0x2,
        LOOPBACK = 0x4,
        HW_DIRECT = 0x8,
        DEFAULT_DEVICE = 0x10,
    }
}

flag_set! {
    /// Filter for device enumeration.
    EnumFlags {
        INPUT = 0x1,
        OUTPUT = 0x2,
        ALL = 0x3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_and_combine() {
        let caps = ServiceCaps::TIME | ServiceCaps::CHANNEL_MASK;
        assert!(caps.contains(ServiceCaps::TIME));
        assert!(caps.contains(ServiceCaps::CHANNEL_MASK));
        assert!(!caps.contains(ServiceCaps::FULL_DUPLEX));
        assert!(ServiceCaps::NONE.is_empty());
    }

    #[test]
    fn all_covers_both_directions() {
        assert!(EnumFlags::ALL.contains(EnumFlags::INPUT));
        assert!(EnumFlags::ALL.contains(EnumFlags::OUTPUT));
        assert!(!EnumFlags::INPUT.contains(EnumFlags::OUTPUT));
    }

    #[test]
    fn debug_lists_flag_names() {
        let caps = DeviceCaps::INPUT | DeviceCaps::HW_DIRECT;
        assert_eq!(format!("{:?}", caps), "INPUT | HW_DIRECT");
        assert_eq!(format!("{}", DeviceCaps::NONE), "NONE");
    }
}
