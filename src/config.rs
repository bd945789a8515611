// SPDX-License-Identifier: Apache-2.0

//! Run configuration for the session controller.

use crate::{
    adc::{ChannelMask, RESULT_MASK},
    completion::SpinLimit,
    pdma::Channel,
};

/// Samples collected per run by the firmware session
pub const SAMPLE_COUNT: usize = 32;

/// Tunables of a session. The sample count of a run is the buffer length of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionConfig {
    /// Transfer engine channel draining the conversion engine
    pub transfer_channel: Channel,
    /// Transfer engine channel used by the checksum cross-check
    pub checksum_channel: Channel,
    /// Bits of a transfer element holding the conversion result
    pub result_mask: u32,
    /// Channels converted in single-ended mode
    pub single_ended_channels: ChannelMask,
    /// Channels converted in differential mode (even channel of each pair)
    pub differential_channels: ChannelMask,
    /// Budget for a scan cycle to complete
    pub conversion_limit: SpinLimit,
    /// Budget for the transfer engine to consume a result, and for its completion flag
    pub transfer_limit: SpinLimit,
}

impl SessionConfig {
    /// Default iteration budget of every busy-wait
    pub const DEFAULT_SPIN_LIMIT: u32 = 1_000_000;

    /// Use `channel` to drain the conversion engine
    pub fn with_transfer_channel(mut self, channel: Channel) -> Self {
        self.transfer_channel = channel;
        self
    }

    /// Use `channel` for the checksum cross-check
    pub fn with_checksum_channel(mut self, channel: Channel) -> Self {
        self.checksum_channel = channel;
        self
    }

    /// Set the result field mask applied during verification
    pub fn with_result_mask(mut self, mask: u32) -> Self {
        self.result_mask = mask;
        self
    }

    /// Set the channel sets of both modes
    pub fn with_channels(mut self, single_ended: ChannelMask, differential: ChannelMask) -> Self {
        self.single_ended_channels = single_ended;
        self.differential_channels = differential;
        self
    }

    /// Set the busy-wait budgets
    pub fn with_spin_limits(mut self, conversion: SpinLimit, transfer: SpinLimit) -> Self {
        self.conversion_limit = conversion;
        self.transfer_limit = transfer;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transfer_channel: Channel::CH2,
            checksum_channel: Channel::CH0,
            result_mask: RESULT_MASK,
            single_ended_channels: ChannelMask::FIRST_FOUR,
            differential_channels: ChannelMask::FIRST_TWO_PAIRS,
            conversion_limit: SpinLimit::Iterations(Self::DEFAULT_SPIN_LIMIT),
            transfer_limit: SpinLimit::Iterations(Self::DEFAULT_SPIN_LIMIT),
        }
    }
}
