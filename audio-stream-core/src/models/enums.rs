use std::fmt;

use serde::{Deserialize, Serialize};

use super::sample::SampleType;

/// A concrete driver system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum System {
    Alsa,
    Asio,
    Jack,
    Wasapi,
    PulseAudio,
    DirectSound,
    /// The in-process simulated driver.
    Simulated,
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alsa => "ALSA",
            Self::Asio => "ASIO",
            Self::Jack => "JACK",
            Self::Wasapi => "WASAPI",
            Self::PulseAudio => "PulseAudio",
            Self::DirectSound => "DirectSound",
            Self::Simulated => "Simulated",
        })
    }
}

/// Coarse selection among audio subsystem categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setup {
    ProAudio,
    SystemAudio,
    ConsumerAudio,
}

impl Setup {
    pub const ALL: [Setup; 3] = [Setup::ProAudio, Setup::SystemAudio, Setup::ConsumerAudio];
}

/// Broad classification of a driver fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cause {
    Format,
    Service,
    Generic,
    Unknown,
    Endpoint,
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Format => "format",
            Self::Service => "service",
            Self::Generic => "generic",
            Self::Unknown => "unknown",
            Self::Endpoint => "endpoint",
        })
    }
}

/// Whether the callback touches driver memory directly or goes through a
/// registered safe buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferAccess {
    #[default]
    Raw,
    Safe,
}

/// Bidirectional mapping between an enum and the integer a native driver
/// boundary uses for it.
pub trait NativeEnum: Sized + Copy + PartialEq + 'static {
    const TABLE: &'static [(Self, i32)];

    fn to_native(self) -> i32 {
        Self::TABLE
            .iter()
            .find(|(value, _)| *value == self)
            .map(|(_, native)| *native)
            .unwrap_or_default()
    }

    fn from_native(native: i32) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, n)| *n == native)
            .map(|(value, _)| *value)
    }
}

impl NativeEnum for System {
    const TABLE: &'static [(Self, i32)] = &[
        (System::Alsa, 1),
        (System::Asio, 2),
        (System::Jack, 3),
        (System::Wasapi, 4),
        (System::PulseAudio, 5),
        (System::DirectSound, 6),
        (System::Simulated, 7),
    ];
}

impl NativeEnum for Setup {
    const TABLE: &'static [(Self, i32)] = &[
        (Setup::ProAudio, 0),
        (Setup::SystemAudio, 1),
        (Setup::ConsumerAudio, 2),
    ];
}

impl NativeEnum for SampleType {
    const TABLE: &'static [(Self, i32)] = &[
        (SampleType::UInt8, 0),
        (SampleType::Int16, 1),
        (SampleType::Int24, 2),
        (SampleType::Int32, 3),
        (SampleType::Float32, 4),
        (SampleType::Float64, 5),
    ];
}

impl NativeEnum for Cause {
    const TABLE: &'static [(Self, i32)] = &[
        (Cause::Format, 0),
        (Cause::Service, 1),
        (Cause::Generic, 2),
        (Cause::Unknown, 3),
        (Cause::Endpoint, 4),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systems_start_at_one() {
        assert_eq!(System::Alsa.to_native(), 1);
        assert_eq!(System::from_native(4), Some(System::Wasapi));
        assert_eq!(System::from_native(0), None);
    }

    #[test]
    fn every_table_entry_maps_back() {
        for (system, native) in System::TABLE {
            assert_eq!(System::from_native(*native), Some(*system));
        }
        for sample in SampleType::ALL {
            assert_eq!(SampleType::from_native(sample.to_native()), Some(sample));
        }
        for setup in Setup::ALL {
            assert_eq!(Setup::from_native(setup.to_native()), Some(setup));
        }
    }

    #[test]
    fn unknown_native_value_is_rejected() {
        assert_eq!(Cause::from_native(42), None);
        assert_eq!(SampleType::from_native(-1), None);
    }
}
