// SPDX-License-Identifier: Apache-2.0

//! Conversion engine contract: single-cycle scan over a fixed channel set.
//!
//! One [`trigger`](ConversionEngine::trigger) converts every participating channel once, then
//! raises the done flag. Each converted result is also presented to the transfer engine through
//! the register returned by [`transfer_source`](ConversionEngine::transfer_source).

use core::fmt;

use crate::error::{PipelineError, Result};

/// Number of analog inputs covered by a [`ChannelMask`]
pub const CHANNEL_COUNT: u8 = 8;

/// Width of a conversion result
pub const RESULT_BITS: u32 = 12;

/// Mask selecting the conversion result out of a transfer element
pub const RESULT_MASK: u32 = (1 << RESULT_BITS) - 1;

/// Analog acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputMode {
    /// One reading per channel
    SingleEnded,
    /// One reading per channel pair, reported on the even channel of the pair
    Differential,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputMode::SingleEnded => "single-ended",
            InputMode::Differential => "differential",
        })
    }
}

/// Bit set of enabled analog inputs. Bit `n` enables channel `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// Channels 0, 1, 2 and 3
    pub const FIRST_FOUR: Self = Self(0x0F);
    /// Channels 0 and 2, i.e. differential pairs 0/1 and 2/3
    pub const FIRST_TWO_PAIRS: Self = Self(0x05);

    /// Create a mask from raw bits
    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// `true` if `channel` is enabled
    pub const fn contains(&self, channel: u8) -> bool {
        channel < CHANNEL_COUNT && self.0 & (1 << channel) != 0
    }
}

/// One scalar conversion result, tagged with where it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSample {
    channel: u8,
    mode: InputMode,
    value: u16,
}

impl ChannelSample {
    /// Tag a reading. Odd channels carry no reading in differential mode and are rejected.
    pub fn new(channel: u8, mode: InputMode, value: u16) -> Result<Self> {
        if channel >= CHANNEL_COUNT || (mode == InputMode::Differential && channel % 2 != 0) {
            return Err(PipelineError::InvalidChannel { channel });
        }
        Ok(Self {
            channel,
            mode,
            value,
        })
    }

    /// Channel index. For differential readings this is the even channel of the pair.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Mode the reading was acquired in
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Raw result
    pub fn value(&self) -> u16 {
        self.value
    }
}

/// The channels one trigger converts, in conversion order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanPlan {
    mode: InputMode,
    mask: ChannelMask,
}

impl ScanPlan {
    /// Plan a scan. In differential mode odd bits of `mask` are ignored.
    pub const fn new(mode: InputMode, mask: ChannelMask) -> Self {
        Self { mode, mask }
    }

    /// Acquisition mode
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Participating channels in ascending order
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        let step = match self.mode {
            InputMode::SingleEnded => 1,
            InputMode::Differential => 2,
        };
        (0..CHANNEL_COUNT)
            .step_by(step)
            .filter(move |ch| self.mask.contains(*ch))
    }

    /// Number of results one trigger produces
    pub fn per_trigger(&self) -> usize {
        self.channels().count()
    }
}

/// Hardware contract for the conversion engine
pub trait ConversionEngine {
    /// Select the acquisition mode and participating channels
    fn configure(&mut self, plan: &ScanPlan) -> Result<()>;

    /// Present every converted result to the transfer engine's request line
    fn enable_transfer_requests(&mut self);

    /// Power the converter
    fn power_on(&mut self);

    /// Start one scan cycle. Must not be called before the previous cycle is done.
    fn trigger(&mut self);

    /// `true` once the current scan cycle has converted every participating channel
    fn is_done(&mut self) -> bool;

    /// Clear the done flag
    fn clear_done(&mut self);

    /// Latest result of `channel`. Only meaningful once [`is_done`](Self::is_done) was observed.
    fn read(&self, channel: u8) -> u16;

    /// `true` while a converted result is waiting to be consumed by the transfer engine.
    ///
    /// The next [`trigger`](Self::trigger) must wait for this to clear, otherwise the transfer
    /// engine may miss a result.
    fn request_pending(&self) -> bool;

    /// Address of the data register the transfer engine drains
    fn transfer_source(&self) -> usize;

    /// Power down and release the converter
    fn close(&mut self);

    /// Latest result of `channel` tagged with the acquisition mode
    fn sample(&self, channel: u8, mode: InputMode) -> Result<ChannelSample> {
        ChannelSample::new(channel, mode, self.read(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn single_ended_plan_follows_mask() {
        let plan = ScanPlan::new(InputMode::SingleEnded, ChannelMask::FIRST_FOUR);
        assert_eq!(plan.channels().collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert_eq!(plan.per_trigger(), 4);
    }

    #[test]
    fn differential_plan_only_uses_even_channels() {
        // Odd bits are ignored even when set
        let plan = ScanPlan::new(InputMode::Differential, ChannelMask::new(0xFF));
        assert!(plan.channels().all(|ch| ch % 2 == 0));
        assert_eq!(plan.per_trigger(), 4);

        let plan = ScanPlan::new(InputMode::Differential, ChannelMask::FIRST_TWO_PAIRS);
        assert_eq!(plan.channels().collect::<Vec<_>>(), [0, 2]);
    }

    #[test]
    fn odd_differential_sample_is_rejected() {
        assert_eq!(
            ChannelSample::new(3, InputMode::Differential, 1),
            Err(PipelineError::InvalidChannel { channel: 3 })
        );
        let sample = ChannelSample::new(2, InputMode::Differential, 7).unwrap();
        assert_eq!((sample.channel(), sample.value()), (2, 7));
        assert!(ChannelSample::new(3, InputMode::SingleEnded, 1).is_ok());
        assert!(ChannelSample::new(CHANNEL_COUNT, InputMode::SingleEnded, 1).is_err());
    }
}
