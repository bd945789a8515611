// SPDX-License-Identifier: Apache-2.0

//! Deterministic single-threaded model of the microcontroller, for host tests.
//!
//! [`SimulatedMcu`] owns the state of every modelled peripheral. The handles it hands out
//! ([`SimAdc`], [`SimPdma`], [`SimCrc`], [`SimPlatform`]) only borrow it, so the session can hold
//! them next to each other the way it holds real register blocks. Time advances one tick per
//! [`Platform::relax`]:
//!
//! - a conversion takes [`CONVERSION_TICKS`] per channel and is pushed into the PDMA data
//!   register together with valid, overrun and channel bits above the 12-bit result
//! - a channel paced by [`RequestSource::AdcResult`] moves one element per pending request, a
//!   software-started channel moves up to [`SOFTWARE_BURST`] elements per tick
//! - a finished channel sets its transfer-done bit; if its interrupt is enabled at both the
//!   engine and the NVIC, [`interrupt::on_transfer_complete`] runs before the tick returns
//!
//! Addresses other than the two modelled data registers are plain host memory. Descriptors must
//! therefore point into buffers that stay alive while their channel is active.

use core::{cell::RefCell, fmt, ptr};
use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::{
    adc::{ConversionEngine, ScanPlan, CHANNEL_COUNT, RESULT_MASK},
    completion::CompletionFlags,
    crc::{crc32, CrcConfig, CrcUnit, FlashChecksum, SoftCrc},
    error::{PipelineError, Result},
    interrupt,
    pdma::{
        AddressStep, Channel, ChannelSet, RequestSource, TransferDescriptor, TransferEngine,
        TransferStatus, MAX_CHANNELS,
    },
    platform::{Console, InterruptSource, Platform},
};

/// Bus address of the modelled ADC PDMA data register
pub const ADC_PDMA_REGISTER: usize = 0x400E_0100;
/// Bus address of the modelled CRC data register
pub const CRC_DATA_REGISTER: usize = 0x5003_1008;
/// Ticks needed to convert one channel
pub const CONVERSION_TICKS: u32 = 3;
/// Elements a software-started channel moves per tick
pub const SOFTWARE_BURST: usize = 16;
/// Core clock reported once clocks are initialized
pub const SIM_CORE_CLOCK_HZ: u32 = 72_000_000;

/// Result in the PDMA data register is fresh
pub const PDMA_VALID: u32 = 1 << 16;
/// A result was overwritten before the transfer engine took it
pub const PDMA_OVERRUN: u32 = 1 << 17;
/// Position of the channel number in the PDMA data register
pub const PDMA_CHANNEL_SHIFT: u32 = 24;

/// Injected misbehaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Faults {
    /// The converter never finishes a conversion
    pub stall_adc: bool,
    /// The transfer engine never moves an element
    pub stall_transfers: bool,
    /// Every element moved raises a bus error, latched until the channel is programmed again
    pub bus_error: bool,
    /// Transfer-done never reaches the interrupt handler
    pub drop_interrupts: bool,
    /// XOR the element at this index of a run with the given pattern
    pub corrupt: Option<(usize, u32)>,
    /// [`Platform::cancel_requested`] reports `true`
    pub cancel: bool,
    /// The CRC unit reads back this value regardless of input
    pub crc_stuck: Option<u32>,
}

/// Per-channel counters, for asserting how the engine was driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    /// Full configurations
    pub configures: u32,
    /// Reloads
    pub reloads: u32,
    /// Aborts
    pub aborts: u32,
    /// Elements moved in the current run
    pub moved: usize,
}

/// Source of analog values: `(channel, scan cycle) -> result`
type AnalogSource = Box<dyn FnMut(u8, u32) -> u16>;

#[derive(Default)]
struct AdcState {
    powered: bool,
    requests_enabled: bool,
    order: [u8; CHANNEL_COUNT as usize],
    order_len: usize,
    results: [u16; CHANNEL_COUNT as usize],
    data_register: u32,
    request: bool,
    /// Position in `order` and ticks left for the conversion in progress
    converting: Option<(usize, u32)>,
    done: bool,
    cycle: u32,
}

#[derive(Default)]
struct ChannelState {
    descriptor: Option<TransferDescriptor>,
    remaining: usize,
    active: bool,
    started: bool,
    interrupt: bool,
    transfer_done: bool,
    bus_error: bool,
    stats: ChannelStats,
}

struct State {
    locked: bool,
    clocks_ready: bool,
    console_baud: Option<u32>,
    nvic: [bool; 2],
    adc: AdcState,
    channels: [ChannelState; MAX_CHANNELS],
    crc: SoftCrc,
    source: AnalogSource,
    faults: Faults,
}

impl State {
    fn load(&mut self, address: usize) -> u32 {
        match address {
            ADC_PDMA_REGISTER => {
                self.adc.request = false;
                self.adc.data_register
            }
            CRC_DATA_REGISTER => 0,
            // SAFETY: descriptors of an active channel point into live host buffers
            _ => unsafe { ptr::read_unaligned(address as *const u32) },
        }
    }

    fn store(&mut self, address: usize, value: u32) {
        match address {
            ADC_PDMA_REGISTER => {}
            CRC_DATA_REGISTER => self.crc.update_word(value),
            // SAFETY: descriptors are validated word aligned and point into live host buffers
            _ => unsafe { ptr::write_volatile(address as *mut u32, value) },
        }
    }

    fn step_adc(&mut self) {
        if self.faults.stall_adc {
            return;
        }
        let Some((position, ticks)) = self.adc.converting else {
            return;
        };
        if ticks > 1 {
            self.adc.converting = Some((position, ticks - 1));
            return;
        }
        let channel = self.adc.order[position];
        let value = (self.source)(channel, self.adc.cycle) & RESULT_MASK as u16;
        self.adc.results[channel as usize] = value;
        if self.adc.requests_enabled {
            let overrun = if self.adc.request { PDMA_OVERRUN } else { 0 };
            self.adc.data_register = value as u32
                | PDMA_VALID
                | overrun
                | (channel as u32) << PDMA_CHANNEL_SHIFT;
            self.adc.request = true;
        }
        if position + 1 < self.adc.order_len {
            self.adc.converting = Some((position + 1, CONVERSION_TICKS));
        } else {
            self.adc.converting = None;
            self.adc.done = true;
            self.adc.cycle += 1;
        }
    }

    fn step_pdma(&mut self) {
        if self.faults.stall_transfers {
            return;
        }
        for index in 0..MAX_CHANNELS {
            let ch = &self.channels[index];
            let Some(descriptor) = ch.descriptor else {
                continue;
            };
            if !ch.active || ch.remaining == 0 {
                continue;
            }
            let budget = match descriptor.request {
                RequestSource::AdcResult if self.adc.request => 1,
                RequestSource::AdcResult => 0,
                RequestSource::Software if ch.started => SOFTWARE_BURST,
                RequestSource::Software => 0,
            };
            for _ in 0..budget {
                if !self.move_element(index, &descriptor) {
                    break;
                }
            }
        }
    }

    /// Move one element of channel `index`. Returns `false` once the run is complete.
    fn move_element(&mut self, index: usize, descriptor: &TransferDescriptor) -> bool {
        let moved = self.channels[index].stats.moved;
        let offset = moved * descriptor.width.bytes();
        let source = match descriptor.source_step {
            AddressStep::Fixed => descriptor.source,
            AddressStep::Increment => descriptor.source + offset,
        };
        let destination = match descriptor.destination_step {
            AddressStep::Fixed => descriptor.destination,
            AddressStep::Increment => descriptor.destination + offset,
        };
        let mut value = self.load(source) & descriptor.width.value_mask();
        if let Some((at, pattern)) = self.faults.corrupt {
            if at == moved {
                value ^= pattern;
            }
        }
        self.store(destination, value);

        let ch = &mut self.channels[index];
        ch.bus_error |= self.faults.bus_error;
        ch.stats.moved += 1;
        ch.remaining -= 1;
        if ch.remaining == 0 {
            ch.active = false;
            ch.transfer_done = true;
            trace!("sim: channel {} retired {} elements", index, ch.stats.moved);
            return false;
        }
        true
    }

    fn interrupt_pending(&self) -> bool {
        self.nvic[nvic_slot(InterruptSource::Pdma)]
            && !self.faults.drop_interrupts
            && self
                .channels
                .iter()
                .any(|ch| ch.transfer_done && ch.interrupt)
    }
}

const fn nvic_slot(source: InterruptSource) -> usize {
    match source {
        InterruptSource::Adc => 0,
        InterruptSource::Pdma => 1,
    }
}

/// The simulated microcontroller
pub struct SimulatedMcu<'f> {
    state: RefCell<State>,
    flags: &'f CompletionFlags,
}

impl<'f> SimulatedMcu<'f> {
    /// Power-on state. `source` provides the analog value of a channel in a given scan cycle.
    pub fn new<F>(flags: &'f CompletionFlags, source: F) -> Self
    where
        F: FnMut(u8, u32) -> u16 + 'static,
    {
        Self {
            state: RefCell::new(State {
                locked: true,
                clocks_ready: false,
                console_baud: None,
                nvic: [false; 2],
                adc: AdcState::default(),
                channels: Default::default(),
                crc: SoftCrc::new(CrcConfig::CRC32),
                source: Box::new(source),
                faults: Faults::default(),
            }),
            flags,
        }
    }

    /// Conversion engine handle
    pub fn adc(&self) -> SimAdc<'_> {
        SimAdc { mcu: self }
    }

    /// Transfer engine handle
    pub fn pdma(&self) -> SimPdma<'_> {
        SimPdma { mcu: self }
    }

    /// CRC unit handle
    pub fn crc(&self) -> SimCrc<'_> {
        SimCrc { mcu: self }
    }

    /// Clock, interrupt controller and busy-wait handle
    pub fn platform(&self) -> SimPlatform<'_> {
        SimPlatform { mcu: self }
    }

    /// Replace the injected faults
    pub fn set_faults(&self, faults: Faults) {
        self.state.borrow_mut().faults = faults;
    }

    /// Counters of `channel`
    pub fn channel_stats(&self, channel: Channel) -> ChannelStats {
        self.state.borrow().channels[channel.index() as usize].stats
    }

    /// `true` if clocks were initialized while configuration was unlocked
    pub fn clocks_ready(&self) -> bool {
        self.state.borrow().clocks_ready
    }

    /// `true` while protected registers are locked
    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    /// Baud rate the console was opened with
    pub fn console_baud(&self) -> Option<u32> {
        self.state.borrow().console_baud
    }

    /// `true` if `source` is enabled at the interrupt controller
    pub fn interrupt_enabled(&self, source: InterruptSource) -> bool {
        self.state.borrow().nvic[nvic_slot(source)]
    }

    /// `true` while the converter is powered
    pub fn adc_powered(&self) -> bool {
        self.state.borrow().adc.powered
    }

    /// Advance by one tick, dispatching the transfer-done interrupt if it is raised
    pub fn tick(&self) {
        let raise = {
            let mut state = self.state.borrow_mut();
            state.step_pdma();
            state.step_adc();
            state.interrupt_pending()
        };
        if raise {
            interrupt::on_transfer_complete(&mut self.pdma(), self.flags);
        }
    }
}

/// Conversion engine handle of a [`SimulatedMcu`]
pub struct SimAdc<'m> {
    mcu: &'m SimulatedMcu<'m>,
}

impl ConversionEngine for SimAdc<'_> {
    fn configure(&mut self, plan: &ScanPlan) -> Result<()> {
        let mut state = self.mcu.state.borrow_mut();
        let adc = &mut state.adc;
        adc.order_len = 0;
        for channel in plan.channels() {
            adc.order[adc.order_len] = channel;
            adc.order_len += 1;
        }
        adc.converting = None;
        adc.done = false;
        adc.request = false;
        debug!("sim: adc {} scan over {} channel(s)", plan.mode(), adc.order_len);
        Ok(())
    }

    fn enable_transfer_requests(&mut self) {
        self.mcu.state.borrow_mut().adc.requests_enabled = true;
    }

    fn power_on(&mut self) {
        self.mcu.state.borrow_mut().adc.powered = true;
    }

    fn trigger(&mut self) {
        let mut state = self.mcu.state.borrow_mut();
        if !state.adc.powered || state.adc.order_len == 0 {
            warn!("sim: adc triggered while unpowered or unconfigured");
            return;
        }
        state.adc.done = false;
        state.adc.converting = Some((0, CONVERSION_TICKS));
    }

    fn is_done(&mut self) -> bool {
        self.mcu.state.borrow().adc.done
    }

    fn clear_done(&mut self) {
        self.mcu.state.borrow_mut().adc.done = false;
    }

    fn read(&self, channel: u8) -> u16 {
        self.mcu
            .state
            .borrow()
            .adc
            .results
            .get(channel as usize)
            .copied()
            .unwrap_or_default()
    }

    fn request_pending(&self) -> bool {
        self.mcu.state.borrow().adc.request
    }

    fn transfer_source(&self) -> usize {
        ADC_PDMA_REGISTER
    }

    fn close(&mut self) {
        let mut state = self.mcu.state.borrow_mut();
        state.adc.powered = false;
        state.adc.requests_enabled = false;
        state.adc.converting = None;
    }
}

/// Transfer engine handle of a [`SimulatedMcu`]
pub struct SimPdma<'m> {
    mcu: &'m SimulatedMcu<'m>,
}

impl SimPdma<'_> {
    fn with_channel<R>(&self, channel: Channel, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        f(&mut self.mcu.state.borrow_mut().channels[channel.index() as usize])
    }
}

impl TransferEngine for SimPdma<'_> {
    fn configure(&mut self, channel: Channel, descriptor: &TransferDescriptor) -> Result<()> {
        descriptor.validate()?;
        self.with_channel(channel, |ch| {
            ch.descriptor = Some(*descriptor);
            ch.remaining = descriptor.count;
            ch.active = true;
            ch.started = false;
            ch.transfer_done = false;
            ch.bus_error = false;
            ch.interrupt = descriptor.interrupt && ch.interrupt;
            ch.stats.configures += 1;
            ch.stats.moved = 0;
        });
        Ok(())
    }

    fn reload(&mut self, channel: Channel, count: usize) -> Result<()> {
        let descriptor = self
            .with_channel(channel, |ch| ch.descriptor)
            .ok_or(PipelineError::ChannelNotConfigured { channel })?;
        TransferDescriptor {
            count,
            ..descriptor
        }
        .validate()?;
        self.with_channel(channel, |ch| {
            ch.remaining = count;
            ch.active = true;
            ch.started = false;
            ch.transfer_done = false;
            ch.bus_error = false;
            ch.stats.reloads += 1;
            ch.stats.moved = 0;
        });
        Ok(())
    }

    fn enable_interrupt(&mut self, channel: Channel) {
        self.with_channel(channel, |ch| ch.interrupt = true);
    }

    fn software_request(&mut self, channel: Channel) {
        self.with_channel(channel, |ch| ch.started = true);
    }

    fn abort(&mut self, channel: Channel) {
        self.with_channel(channel, |ch| {
            ch.active = false;
            ch.started = false;
            ch.transfer_done = false;
            ch.stats.aborts += 1;
        });
    }

    fn has_fault(&self, channel: Channel) -> bool {
        self.with_channel(channel, |ch| ch.bus_error)
    }
}

impl TransferStatus for SimPdma<'_> {
    fn take_completed(&mut self) -> ChannelSet {
        let mut state = self.mcu.state.borrow_mut();
        let mut completed = ChannelSet::EMPTY;
        for (index, ch) in state.channels.iter_mut().enumerate() {
            if ch.transfer_done {
                ch.transfer_done = false;
                if let Some(channel) = Channel::new(index as u8) {
                    completed.insert(channel);
                }
            }
        }
        completed
    }
}

/// CRC unit handle of a [`SimulatedMcu`]
pub struct SimCrc<'m> {
    mcu: &'m SimulatedMcu<'m>,
}

impl CrcUnit for SimCrc<'_> {
    fn configure(&mut self, config: &CrcConfig) {
        self.mcu.state.borrow_mut().crc.set_config(config);
    }

    fn reset(&mut self, seed: u32) {
        self.mcu.state.borrow_mut().crc.reset(seed);
    }

    fn write(&mut self, word: u32) {
        self.mcu.state.borrow_mut().crc.update_word(word);
    }

    fn checksum(&self) -> u32 {
        let state = self.mcu.state.borrow();
        state.faults.crc_stuck.unwrap_or_else(|| state.crc.checksum())
    }

    fn data_register(&self) -> usize {
        CRC_DATA_REGISTER
    }
}

/// Flash controller answering the checksum command in software
#[derive(Debug, Clone, Default)]
pub struct SimFlash {
    forced: Option<u32>,
}

impl SimFlash {
    /// Flash controller computing real checksums
    pub fn new() -> Self {
        Self::default()
    }

    /// Flash controller that always answers `value`
    pub fn reporting(value: u32) -> Self {
        Self {
            forced: Some(value),
        }
    }
}

impl FlashChecksum for SimFlash {
    fn checksum(&mut self, region: &[u8]) -> Result<u32> {
        Ok(self.forced.unwrap_or_else(|| crc32(region)))
    }
}

/// Platform handle of a [`SimulatedMcu`]
pub struct SimPlatform<'m> {
    mcu: &'m SimulatedMcu<'m>,
}

impl Platform for SimPlatform<'_> {
    fn initialize_system_clocks(&mut self) {
        let mut state = self.mcu.state.borrow_mut();
        if state.locked {
            warn!("sim: clock registers are locked");
            return;
        }
        state.clocks_ready = true;
    }

    fn initialize_console(&mut self, baud: u32) {
        self.mcu.state.borrow_mut().console_baud = Some(baud);
    }

    fn core_clock_hz(&self) -> u32 {
        if self.mcu.state.borrow().clocks_ready {
            SIM_CORE_CLOCK_HZ
        } else {
            0
        }
    }

    fn unlock_configuration(&mut self) {
        self.mcu.state.borrow_mut().locked = false;
    }

    fn lock_configuration(&mut self) {
        self.mcu.state.borrow_mut().locked = true;
    }

    fn enable_interrupt(&mut self, source: InterruptSource) {
        self.mcu.state.borrow_mut().nvic[nvic_slot(source)] = true;
    }

    fn disable_interrupt(&mut self, source: InterruptSource) {
        self.mcu.state.borrow_mut().nvic[nvic_slot(source)] = false;
    }

    fn relax(&mut self) {
        self.mcu.tick();
    }

    fn cancel_requested(&mut self) -> bool {
        self.mcu.state.borrow().faults.cancel
    }
}

/// Scripted console: keys come from a fixed script, output is collected
#[derive(Debug, Default)]
pub struct SimConsole {
    input: VecDeque<u8>,
    output: String,
}

impl SimConsole {
    /// Console that will answer `keys` in order, then `0`
    pub fn new(keys: &[u8]) -> Self {
        Self {
            input: keys.iter().copied().collect(),
            output: String::new(),
        }
    }

    /// Everything written so far
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Keys not read yet
    pub fn unread(&self) -> usize {
        self.input.len()
    }
}

impl fmt::Write for SimConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.push_str(s);
        Ok(())
    }
}

impl Console for SimConsole {
    fn read_byte(&mut self) -> u8 {
        self.input.pop_front().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adc::{ChannelMask, InputMode},
        completion::SpinLimit,
        crc::{cross_check, ChecksumPort, CHECKSUM_REGION_LEN},
        error::WaitStage,
    };

    #[repr(align(4))]
    struct Region([u8; CHECKSUM_REGION_LEN]);

    fn region() -> Region {
        Region(core::array::from_fn(|i| (i as u8).wrapping_mul(31) ^ 0x5A))
    }

    #[test]
    fn scan_pushes_tagged_results() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |channel, _| 0x100 + channel as u16);
        let mut adc = mcu.adc();
        adc.configure(&ScanPlan::new(InputMode::SingleEnded, ChannelMask::new(0b0110)))
            .unwrap();
        adc.enable_transfer_requests();
        adc.power_on();
        adc.trigger();

        for _ in 0..CONVERSION_TICKS {
            assert!(!adc.is_done());
            mcu.tick();
        }
        assert!(adc.request_pending());
        assert_eq!(adc.read(1), 0x101);
        let mut state = mcu.state.borrow_mut();
        let word = state.load(ADC_PDMA_REGISTER);
        assert_eq!(word, 0x101 | PDMA_VALID | 1 << PDMA_CHANNEL_SHIFT);
        assert!(!state.adc.request);
        drop(state);

        for _ in 0..CONVERSION_TICKS {
            mcu.tick();
        }
        assert!(adc.is_done());
        assert_eq!(adc.read(2), 0x102);
    }

    #[test]
    fn checksum_paths_agree_over_region() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        let (mut platform, mut pdma, mut crc) = (mcu.platform(), mcu.pdma(), mcu.crc());
        let mut flash = SimFlash::new();
        let region = region();
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut port = ChecksumPort {
            crc: &mut crc,
            flash: &mut flash,
            region: &region.0,
        };

        let report = cross_check(
            &mut port,
            &mut pdma,
            &flags,
            &mut platform,
            Channel::CH0,
            SpinLimit::Iterations(1_000),
        )
        .unwrap();
        assert_eq!(report.flash, crc32(&region.0));
        assert_eq!(report.cpu, report.flash);
        assert_eq!(report.pdma, report.flash);
        assert_eq!(report.verdict(), Ok(report.flash));
        assert_eq!(mcu.channel_stats(Channel::CH0).moved, CHECKSUM_REGION_LEN / 4);
    }

    #[test]
    fn idle_crc_unit_is_rejected_even_when_all_agree() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        mcu.set_faults(Faults {
            crc_stuck: Some(0xFFFF_FFFF),
            ..Faults::default()
        });
        let (mut platform, mut pdma, mut crc) = (mcu.platform(), mcu.pdma(), mcu.crc());
        let mut flash = SimFlash::reporting(0xFFFF_FFFF);
        let region = region();
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut port = ChecksumPort {
            crc: &mut crc,
            flash: &mut flash,
            region: &region.0,
        };

        let report = cross_check(
            &mut port,
            &mut pdma,
            &flags,
            &mut platform,
            Channel::CH0,
            SpinLimit::Iterations(1_000),
        )
        .unwrap();
        assert_eq!(report.flash, report.pdma);
        assert_eq!(
            report.verdict(),
            Err(PipelineError::InvalidChecksum { value: 0xFFFF_FFFF })
        );
    }

    #[test]
    fn checksum_transfer_times_out_without_interrupt() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        let (mut platform, mut pdma, mut crc) = (mcu.platform(), mcu.pdma(), mcu.crc());
        let mut flash = SimFlash::new();
        let region = region();
        // NVIC line left disabled
        let mut port = ChecksumPort {
            crc: &mut crc,
            flash: &mut flash,
            region: &region.0,
        };

        let err = cross_check(
            &mut port,
            &mut pdma,
            &flags,
            &mut platform,
            Channel::CH0,
            SpinLimit::Iterations(100),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PipelineError::HardwareTimeout {
                stage: WaitStage::ChecksumTransfer
            }
        );
        assert_eq!(mcu.channel_stats(Channel::CH0).aborts, 1);
    }

    #[test]
    fn checksum_bus_error_aborts_the_channel() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        mcu.set_faults(Faults {
            bus_error: true,
            ..Faults::default()
        });
        let (mut platform, mut pdma, mut crc) = (mcu.platform(), mcu.pdma(), mcu.crc());
        let mut flash = SimFlash::new();
        let region = region();
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut port = ChecksumPort {
            crc: &mut crc,
            flash: &mut flash,
            region: &region.0,
        };

        let err = cross_check(
            &mut port,
            &mut pdma,
            &flags,
            &mut platform,
            Channel::CH0,
            SpinLimit::Iterations(1_000),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PipelineError::TransferFault {
                channel: Channel::CH0
            }
        );
        assert!(flags.is_done(Channel::CH0));
        assert_eq!(mcu.channel_stats(Channel::CH0).aborts, 1);
    }

    #[test]
    fn misaligned_region_is_refused() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        let (mut platform, mut pdma, mut crc) = (mcu.platform(), mcu.pdma(), mcu.crc());
        let mut flash = SimFlash::new();
        let region = region();
        let mut port = ChecksumPort {
            crc: &mut crc,
            flash: &mut flash,
            region: &region.0[..6],
        };
        let err = cross_check(
            &mut port,
            &mut pdma,
            &flags,
            &mut platform,
            Channel::CH0,
            SpinLimit::Iterations(100),
        )
        .unwrap_err();
        assert_eq!(err, PipelineError::InvalidRegion { len: 6 });
    }

    #[test]
    fn reload_requires_configuration() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        let mut pdma = mcu.pdma();
        assert_eq!(
            pdma.reload(Channel::CH2, 4),
            Err(PipelineError::ChannelNotConfigured {
                channel: Channel::CH2
            })
        );
    }

    #[test]
    fn cancellation_is_reported() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |_, _| 0);
        mcu.set_faults(Faults {
            cancel: true,
            ..Faults::default()
        });
        let mut platform = mcu.platform();
        assert!(platform.cancel_requested());
        assert_eq!(
            flags.wait(
                Channel::CH0,
                SpinLimit::Unbounded,
                WaitStage::TransferCompletion,
                &mut platform
            ),
            Err(PipelineError::Cancelled {
                stage: WaitStage::TransferCompletion
            })
        );
    }
}
