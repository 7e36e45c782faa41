use crate::models::error::AudioError;
use crate::models::format::{Channels, Direction, MaskOrder};

/// Maps the logical channels of one direction onto hardware channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRouter {
    hardware: Vec<usize>,
}

impl ChannelRouter {
    pub fn new(channels: &Channels, direction: Direction, order: MaskOrder) -> Self {
        Self {
            hardware: channels.hardware_channels(direction, order),
        }
    }

    /// Number of logical channels.
    pub fn len(&self) -> usize {
        self.hardware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hardware.is_empty()
    }

    /// Hardware channel backing `logical`.
    pub fn hardware(&self, logical: usize) -> usize {
        self.hardware[logical]
    }

    /// `(logical, hardware)` pairs in logical order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.hardware.iter().copied().enumerate()
    }

    /// Fails when any logical channel lands past the device's last channel.
    pub fn check(&self, hardware_count: usize) -> Result<(), AudioError> {
        match self.hardware.iter().find(|&&hw| hw >= hardware_count) {
            Some(hw) => Err(AudioError::UnsupportedFormat(format!(
                "hardware channel {hw} does not exist (device has {hardware_count})"
            ))),
            None => Ok(()),
        }
    }
}
