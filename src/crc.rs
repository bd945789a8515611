// SPDX-License-Identifier: Apache-2.0

//! CRC-32 checksum cross-check.
//!
//! The same memory region is checksummed three ways: by the flash controller's checksum command,
//! by the CPU writing each word into the CRC unit, and by the transfer engine feeding the CRC
//! unit's data register. The three results must agree, and must not be a value an idle unit
//! would report.
//!
//! The CRC unit is configured like the usual IEEE CRC-32: polynomial `0x04C11DB7`, seed
//! `0xFFFF_FFFF`, every input byte and the final checksum bit-reversed, checksum complemented.
//! Words are consumed least significant byte first.

use log::{debug, info};

use crate::{
    completion::{CompletionFlags, SpinLimit},
    error::{PipelineError, Result, WaitStage},
    pdma::{Channel, TransferDescriptor, TransferEngine, MAX_TRANSFER_COUNT},
    platform::Platform,
};

/// CRC-32 generator polynomial, normal representation
pub const POLY_CRC32: u32 = 0x04C1_1DB7;

/// Size of the region checksummed by the cross-check
pub const CHECKSUM_REGION_LEN: usize = 2048;

/// CRC unit settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CrcConfig {
    /// Initial register value after [`CrcUnit::reset`]
    pub seed: u32,
    /// Reverse the bit order of each input byte
    pub reverse_input: bool,
    /// Reverse the bit order of the checksum
    pub reverse_output: bool,
    /// Complement the checksum
    pub complement_output: bool,
}

impl CrcConfig {
    /// IEEE CRC-32 as produced by zlib and Ethernet
    pub const CRC32: Self = Self {
        seed: 0xFFFF_FFFF,
        reverse_input: true,
        reverse_output: true,
        complement_output: true,
    };
}

/// Hardware contract for the CRC unit
pub trait CrcUnit {
    /// Apply settings and reset the calculation
    fn configure(&mut self, config: &CrcConfig);

    /// Restart the calculation from `seed`
    fn reset(&mut self, seed: u32);

    /// Feed one 32-bit word
    fn write(&mut self, word: u32);

    /// Checksum of everything written since the last reset
    fn checksum(&self) -> u32;

    /// Bus address of the data register, for transfer engine writes
    fn data_register(&self) -> usize;
}

/// Flash controller checksum command
pub trait FlashChecksum {
    /// Checksum of `region` as computed by the flash controller
    fn checksum(&mut self, region: &[u8]) -> Result<u32>;
}

/// Bitwise software model of the CRC unit
#[derive(Debug, Clone)]
pub struct SoftCrc {
    config: CrcConfig,
    state: u32,
}

impl SoftCrc {
    /// Fresh calculation with `config`
    pub const fn new(config: CrcConfig) -> Self {
        Self {
            config,
            state: config.seed,
        }
    }

    /// Replace settings and restart from their seed
    pub fn set_config(&mut self, config: &CrcConfig) {
        self.config = *config;
        self.state = config.seed;
    }

    /// Restart from `seed`
    pub fn reset(&mut self, seed: u32) {
        self.state = seed;
    }

    /// Feed one byte
    pub fn update_byte(&mut self, byte: u8) {
        let byte = if self.config.reverse_input {
            byte.reverse_bits()
        } else {
            byte
        };
        self.state ^= (byte as u32) << 24;
        for _ in 0..8 {
            self.state = if self.state & 0x8000_0000 != 0 {
                (self.state << 1) ^ POLY_CRC32
            } else {
                self.state << 1
            };
        }
    }

    /// Feed a byte slice
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.update_byte(byte);
        }
    }

    /// Feed one word, least significant byte first
    pub fn update_word(&mut self, word: u32) {
        self.update(&word.to_le_bytes());
    }

    /// Checksum so far, with output reversal and complement applied
    pub fn checksum(&self) -> u32 {
        let mut value = self.state;
        if self.config.reverse_output {
            value = value.reverse_bits();
        }
        if self.config.complement_output {
            value = !value;
        }
        value
    }
}

/// IEEE CRC-32 of `data`
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = SoftCrc::new(CrcConfig::CRC32);
    crc.update(data);
    crc.checksum()
}

/// Results of the three checksum paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChecksumReport {
    /// Flash controller checksum command
    pub flash: u32,
    /// CPU writes into the data register
    pub cpu: u32,
    /// Transfer engine writes into the data register
    pub pdma: u32,
}

impl ChecksumReport {
    /// The agreed checksum, or why the report fails
    pub fn verdict(&self) -> Result<u32> {
        if self.flash != self.cpu || self.cpu != self.pdma {
            return Err(PipelineError::ChecksumDisagreement {
                flash: self.flash,
                cpu: self.cpu,
                pdma: self.pdma,
            });
        }
        if self.flash == 0 || self.flash == 0xFFFF_FFFF {
            return Err(PipelineError::InvalidChecksum { value: self.flash });
        }
        Ok(self.flash)
    }
}

/// Hardware taking part in the cross-check, besides the transfer engine
pub struct ChecksumPort<'a> {
    /// CRC unit
    pub crc: &'a mut dyn CrcUnit,
    /// Flash controller
    pub flash: &'a mut dyn FlashChecksum,
    /// Region to checksum
    pub region: &'a [u8],
}

/// Checksum `port.region` three ways.
///
/// The transfer engine path programs `channel` for a software-started memory-to-peripheral
/// transfer and waits for its completion flag within `limit`.
pub fn cross_check<D, P>(
    port: &mut ChecksumPort<'_>,
    pdma: &mut D,
    flags: &CompletionFlags,
    platform: &mut P,
    channel: Channel,
    limit: SpinLimit,
) -> Result<ChecksumReport>
where
    D: TransferEngine,
    P: Platform,
{
    let region = port.region;
    if region.is_empty() || region.len() % 4 != 0 || region.len() / 4 > MAX_TRANSFER_COUNT {
        return Err(PipelineError::InvalidRegion { len: region.len() });
    }
    let config = CrcConfig::CRC32;
    port.crc.configure(&config);

    // Flash controller command
    let flash = port.flash.checksum(region)?;

    // CPU feeding the data register
    port.crc.reset(config.seed);
    for word in region.chunks_exact(4) {
        port.crc.write(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
    }
    let cpu = port.crc.checksum();

    // Transfer engine feeding the data register
    port.crc.reset(config.seed);
    flags.reset(channel);
    let descriptor = TransferDescriptor::memory_to_peripheral(
        region.as_ptr() as usize,
        port.crc.data_register(),
        region.len() / 4,
    );
    pdma.configure(channel, &descriptor)?;
    pdma.enable_interrupt(channel);
    debug!(
        "crc: {} words from 0x{:08X} on channel {}",
        descriptor.count,
        descriptor.source,
        channel.index()
    );
    pdma.software_request(channel);
    if let Err(err) = flags.wait(channel, limit, WaitStage::ChecksumTransfer, platform) {
        pdma.abort(channel);
        return Err(err);
    }
    if pdma.has_fault(channel) {
        pdma.abort(channel);
        return Err(PipelineError::TransferFault { channel });
    }
    let pdma_checksum = port.crc.checksum();

    let report = ChecksumReport {
        flash,
        cpu,
        pdma: pdma_checksum,
    };
    info!(
        "crc: flash 0x{:08X}, cpu 0x{:08X}, pdma 0x{:08X}",
        report.flash, report.cpu, report.pdma
    );
    Ok(report)
}
