// SPDX-License-Identifier: Apache-2.0

//! Error types for the scan/transfer pipeline.
//!
//! Every error is `Copy` and carries only primitive data, so it can be logged from an interrupt
//! context or stored in a run report without allocation.

use core::fmt;

use crate::{adc::InputMode, pdma::Channel};

/// Result type alias for pipeline operations
pub type Result<T> = core::result::Result<T, PipelineError>;

/// Point at which the foreground path may busy-wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitStage {
    /// Waiting for the conversion engine to finish a scan cycle
    Conversion,
    /// Waiting for the transfer engine to consume the last converted result before re-triggering
    TransferDrain,
    /// Waiting on the completion flag after the expected sample count was collected
    TransferCompletion,
    /// Waiting for the memory-to-CRC transfer of the checksum cross-check
    ChecksumTransfer,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitStage::Conversion => "conversion done",
            WaitStage::TransferDrain => "transfer request drain",
            WaitStage::TransferCompletion => "transfer completion",
            WaitStage::ChecksumTransfer => "checksum transfer",
        })
    }
}

/// Reasons a [`TransferDescriptor`](crate::pdma::TransferDescriptor) is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorFault {
    /// Element count is zero or exceeds [`MAX_TRANSFER_COUNT`](crate::pdma::MAX_TRANSFER_COUNT)
    Count(usize),
    /// Source address is not aligned to the element width
    SourceAlignment(usize),
    /// Destination address is not aligned to the element width
    DestinationAlignment(usize),
}

/// Broad classification of a [`PipelineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultClass {
    /// The data produced by the hardware is inconsistent with its configuration
    Configuration,
    /// The hardware stopped responding or reported a bus fault
    Hardware,
    /// The caller asked for something the backend cannot do
    Usage,
}

/// Errors returned by the pipeline. All of them are local to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PipelineError {
    /// A busy-wait exceeded its iteration budget
    HardwareTimeout {
        /// Which wait gave up
        stage: WaitStage,
    },

    /// A busy-wait was cancelled by the platform
    Cancelled {
        /// Which wait was interrupted
        stage: WaitStage,
    },

    /// CPU-observed and DMA-delivered samples differ after masking
    ConfigurationMismatch {
        /// Number of mismatching indices
        mismatches: u32,
    },

    /// The three checksums of the CRC cross-check are not all equal
    ChecksumDisagreement {
        /// Flash controller checksum command
        flash: u32,
        /// CPU writes into the CRC data register
        cpu: u32,
        /// PDMA writes into the CRC data register
        pdma: u32,
    },

    /// All checksums agree, but on a value that indicates the unit never ran (`0` or all-ones)
    InvalidChecksum {
        /// The agreed value
        value: u32,
    },

    /// The conversion engine cannot acquire in this mode
    UnsupportedMode {
        /// Rejected mode
        mode: InputMode,
    },

    /// The scan plan of a mode selects no channel
    EmptyScan {
        /// Mode whose channel mask is empty
        mode: InputMode,
    },

    /// A transfer descriptor failed validation
    InvalidDescriptor(DescriptorFault),

    /// A channel was reloaded before ever being configured
    ChannelNotConfigured {
        /// Offending channel
        channel: Channel,
    },

    /// Channel index outside of the engine's channel set, or not meaningful in the current mode
    InvalidChannel {
        /// Offending channel index
        channel: u8,
    },

    /// Checksum region length is zero or not a multiple of the word size
    InvalidRegion {
        /// Length in bytes
        len: usize,
    },

    /// The transfer engine reported a bus error on a channel
    TransferFault {
        /// Faulting channel
        channel: Channel,
    },
}

impl PipelineError {
    /// Classify the error. An agreed-but-invalid checksum is a configuration fault, just like a
    /// sample mismatch.
    pub const fn class(&self) -> FaultClass {
        match self {
            PipelineError::ConfigurationMismatch { .. }
            | PipelineError::ChecksumDisagreement { .. }
            | PipelineError::InvalidChecksum { .. } => FaultClass::Configuration,
            PipelineError::HardwareTimeout { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::TransferFault { .. } => FaultClass::Hardware,
            PipelineError::UnsupportedMode { .. }
            | PipelineError::EmptyScan { .. }
            | PipelineError::InvalidDescriptor(_)
            | PipelineError::ChannelNotConfigured { .. }
            | PipelineError::InvalidChannel { .. }
            | PipelineError::InvalidRegion { .. } => FaultClass::Usage,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::HardwareTimeout { stage } => {
                write!(f, "timed out waiting for {}", stage)
            }
            PipelineError::Cancelled { stage } => write!(f, "cancelled while waiting for {}", stage),
            PipelineError::ConfigurationMismatch { mismatches } => {
                write!(f, "{} sample(s) differ between CPU and PDMA", mismatches)
            }
            PipelineError::ChecksumDisagreement { flash, cpu, pdma } => write!(
                f,
                "checksums disagree (flash 0x{:08X}, cpu 0x{:08X}, pdma 0x{:08X})",
                flash, cpu, pdma
            ),
            PipelineError::InvalidChecksum { value } => {
                write!(f, "checksums agree on invalid value 0x{:08X}", value)
            }
            PipelineError::UnsupportedMode { mode } => {
                write!(f, "{} input is not supported by this converter", mode)
            }
            PipelineError::EmptyScan { mode } => write!(f, "no channel enabled for {} input", mode),
            PipelineError::ChannelNotConfigured { channel } => {
                write!(f, "transfer channel {} reloaded before configuration", channel.index())
            }
            PipelineError::InvalidDescriptor(DescriptorFault::Count(count)) => {
                write!(f, "invalid transfer count {}", count)
            }
            PipelineError::InvalidDescriptor(DescriptorFault::SourceAlignment(addr)) => {
                write!(f, "source address 0x{:08X} is misaligned", addr)
            }
            PipelineError::InvalidDescriptor(DescriptorFault::DestinationAlignment(addr)) => {
                write!(f, "destination address 0x{:08X} is misaligned", addr)
            }
            PipelineError::InvalidChannel { channel } => write!(f, "invalid channel {}", channel),
            PipelineError::InvalidRegion { len } => {
                write!(f, "checksum region of {} bytes is not word sized", len)
            }
            PipelineError::TransferFault { channel } => {
                write!(f, "bus error on transfer channel {}", channel.index())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_checksum_is_a_configuration_fault() {
        assert_eq!(
            PipelineError::InvalidChecksum { value: 0xFFFF_FFFF }.class(),
            PipelineError::ConfigurationMismatch { mismatches: 1 }.class()
        );
        assert_eq!(
            PipelineError::HardwareTimeout {
                stage: WaitStage::TransferCompletion
            }
            .class(),
            FaultClass::Hardware
        );
    }

    #[test]
    fn timeout_names_its_stage() {
        let msg = std::format!(
            "{}",
            PipelineError::HardwareTimeout {
                stage: WaitStage::Conversion
            }
        );
        assert_eq!(msg, "timed out waiting for conversion done");
    }
}
