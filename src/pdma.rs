// SPDX-License-Identifier: Apache-2.0

//! Transfer engine contract: descriptor-programmed peripheral DMA channels.
//!
//! A channel is programmed once with a [`TransferDescriptor`], then re-armed with
//! [`reload`](TransferEngine::reload) for every further run. When the configured element count
//! has been retired the channel raises its transfer-done status exactly once and goes idle.

use crate::error::{DescriptorFault, PipelineError, Result};

/// Number of channels a [`ChannelSet`] can describe
pub const MAX_CHANNELS: usize = 12;

/// Largest element count of one transfer (16-bit count field holding `count - 1`)
pub const MAX_TRANSFER_COUNT: usize = 1 << 16;

/// Transfer engine channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel(u8);

impl Channel {
    /// Channel 0
    pub const CH0: Self = Self(0);
    /// Channel 2
    pub const CH2: Self = Self(2);

    /// Create a channel index, if it is in range
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < MAX_CHANNELS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Channel index
    pub const fn index(&self) -> u8 {
        self.0
    }

    /// Status/enable bit of this channel
    pub const fn bit(&self) -> u32 {
        1 << self.0
    }
}

/// Set of channels, laid out like the transfer-done status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelSet(u32);

impl ChannelSet {
    /// No channel
    pub const EMPTY: Self = Self(0);

    /// Build from a status register value. Bits beyond [`MAX_CHANNELS`] are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & ((1u32 << MAX_CHANNELS) - 1))
    }

    /// Raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// `true` if no channel is set
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// `true` if `channel` is set
    pub const fn contains(&self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    /// Add `channel`
    pub fn insert(&mut self, channel: Channel) {
        self.0 |= channel.bit();
    }

    /// Channels in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Channel> {
        let bits = self.0;
        (0..MAX_CHANNELS as u8)
            .filter(move |i| bits & (1 << i) != 0)
            .map(Channel)
    }
}

/// Size of one transferred element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ElementWidth {
    /// 8 bits
    Byte,
    /// 16 bits
    HalfWord,
    /// 32 bits
    Word,
}

impl ElementWidth {
    /// Width in bytes
    pub const fn bytes(&self) -> usize {
        match self {
            ElementWidth::Byte => 1,
            ElementWidth::HalfWord => 2,
            ElementWidth::Word => 4,
        }
    }

    /// Mask of the bits one element can carry
    pub const fn value_mask(&self) -> u32 {
        match self {
            ElementWidth::Byte => 0xFF,
            ElementWidth::HalfWord => 0xFFFF,
            ElementWidth::Word => 0xFFFF_FFFF,
        }
    }
}

/// Address update policy after each element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressStep {
    /// Address stays put (single peripheral register)
    Fixed,
    /// Address advances by the element width (memory buffer)
    Increment,
}

/// What paces the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestSource {
    /// One element per conversion-result request
    AdcResult,
    /// Unpaced memory-to-memory transfer started by [`TransferEngine::software_request`]
    Software,
}

/// Everything needed to program one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferDescriptor {
    /// Address of the first element read
    pub source: usize,
    /// Address of the first element written
    pub destination: usize,
    /// Element width, used for both sides
    pub width: ElementWidth,
    /// Source address policy
    pub source_step: AddressStep,
    /// Destination address policy
    pub destination_step: AddressStep,
    /// Number of elements in one run
    pub count: usize,
    /// Pacing of the channel
    pub request: RequestSource,
    /// Raise the transfer-done interrupt on completion
    pub interrupt: bool,
}

impl TransferDescriptor {
    /// Drain a peripheral data register into a word buffer: fixed source, incrementing
    /// destination, paced by conversion results, interrupt on completion.
    pub const fn peripheral_to_memory(source: usize, destination: usize, count: usize) -> Self {
        Self {
            source,
            destination,
            width: ElementWidth::Word,
            source_step: AddressStep::Fixed,
            destination_step: AddressStep::Increment,
            count,
            request: RequestSource::AdcResult,
            interrupt: true,
        }
    }

    /// Feed a word region into a peripheral data register: incrementing source, fixed
    /// destination, software started, interrupt on completion.
    pub const fn memory_to_peripheral(source: usize, destination: usize, count: usize) -> Self {
        Self {
            source,
            destination,
            width: ElementWidth::Word,
            source_step: AddressStep::Increment,
            destination_step: AddressStep::Fixed,
            count,
            request: RequestSource::Software,
            interrupt: true,
        }
    }

    /// Check count range and address alignment
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 || self.count > MAX_TRANSFER_COUNT {
            return Err(PipelineError::InvalidDescriptor(DescriptorFault::Count(
                self.count,
            )));
        }
        let align = self.width.bytes();
        if self.source % align != 0 {
            return Err(PipelineError::InvalidDescriptor(
                DescriptorFault::SourceAlignment(self.source),
            ));
        }
        if self.destination % align != 0 {
            return Err(PipelineError::InvalidDescriptor(
                DescriptorFault::DestinationAlignment(self.destination),
            ));
        }
        Ok(())
    }
}

/// Per-channel transfer-done status, as seen by the interrupt handler
pub trait TransferStatus {
    /// Read and clear the transfer-done status of every channel
    fn take_completed(&mut self) -> ChannelSet;
}

/// Hardware contract for the transfer engine
pub trait TransferEngine {
    /// Program `channel` with `descriptor`. The descriptor is validated first.
    fn configure(&mut self, channel: Channel, descriptor: &TransferDescriptor) -> Result<()>;

    /// Re-arm a configured channel for another `count` elements, restarting from the
    /// descriptor's source and destination addresses
    fn reload(&mut self, channel: Channel, count: usize) -> Result<()>;

    /// Route the channel's transfer-done status to the interrupt line
    fn enable_interrupt(&mut self, channel: Channel);

    /// Start a channel whose request source is [`RequestSource::Software`]
    fn software_request(&mut self, channel: Channel);

    /// Stop an in-flight channel
    fn abort(&mut self, channel: Channel);

    /// `true` if the channel reported a bus error since it was last programmed
    fn has_fault(&self, channel: Channel) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn descriptor_count_bounds() {
        let mut d = TransferDescriptor::peripheral_to_memory(0x400, 0x2000_0000, 32);
        assert_eq!(d.validate(), Ok(()));

        d.count = 0;
        assert_eq!(
            d.validate(),
            Err(PipelineError::InvalidDescriptor(DescriptorFault::Count(0)))
        );
        d.count = MAX_TRANSFER_COUNT + 1;
        assert!(d.validate().is_err());
        d.count = MAX_TRANSFER_COUNT;
        assert!(d.validate().is_ok());
    }

    #[test]
    fn descriptor_alignment() {
        let d = TransferDescriptor::memory_to_peripheral(0x1002, 0x5000_0008, 4);
        assert_eq!(
            d.validate(),
            Err(PipelineError::InvalidDescriptor(
                DescriptorFault::SourceAlignment(0x1002)
            ))
        );
        let d = TransferDescriptor::memory_to_peripheral(0x1000, 0x5000_0009, 4);
        assert_eq!(
            d.validate(),
            Err(PipelineError::InvalidDescriptor(
                DescriptorFault::DestinationAlignment(0x5000_0009)
            ))
        );
    }

    #[test]
    fn channel_set_iterates_in_order() {
        let set = ChannelSet::from_bits(0b1010_0101 | 1 << 20);
        let channels: Vec<u8> = set.iter().map(|c| c.index()).collect();
        assert_eq!(channels, [0, 2, 5, 7]);
        assert!(Channel::new(MAX_CHANNELS as u8).is_none());
    }
}
