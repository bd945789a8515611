// SPDX-License-Identifier: Apache-2.0

//! Menu-driven session controller.
//!
//! Each selection runs one acquisition: the conversion engine scans its channel set once per
//! trigger, the foreground loop harvests every result into the CPU buffer while the transfer
//! engine drains the same results into the DMA buffer, and both buffers are compared once the
//! completion flag is set.

use log::{debug, info, warn};
#[cfg(feature = "trace_samples")]
use log::trace;

use crate::{
    adc::{ConversionEngine, InputMode, ScanPlan},
    buffer::{DmaBuffer, SampleBuffer},
    completion::{spin_until, CompletionFlags},
    components::{Indicator, RunStatus},
    config::SessionConfig,
    crc::{cross_check, ChecksumPort},
    error::{PipelineError, Result, WaitStage},
    pdma::{TransferDescriptor, TransferEngine},
    platform::{Console, Platform},
    verify,
};

/// Where the session controller currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// Menu printed, waiting for a key
    AwaitingModeSelection,
    /// Programming the conversion and transfer engines
    ConfiguringRun,
    /// Trigger/harvest loop
    Acquiring,
    /// Every sample harvested, waiting for the transfer-done flag
    AwaitingTransferCompletion,
    /// Comparing CPU and DMA buffers
    Verifying,
    /// Printing the verdict
    ReportingResult,
    /// An unrecognized key ended the session
    Exited,
}

/// Decoded menu key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Selection {
    /// Scan/transfer run in the given mode
    Scan(InputMode),
    /// CRC-32 cross-check
    Checksum,
    /// Leave the menu
    Exit,
}

/// What a run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunReport {
    /// Acquisition mode
    pub mode: InputMode,
    /// Samples harvested by the foreground loop
    pub samples: usize,
    /// Indices where the CPU and DMA buffers differ
    pub mismatches: u32,
}

impl RunReport {
    /// `Ok` if the buffers agreed
    pub fn verdict(&self) -> Result<()> {
        match self.mismatches {
            0 => Ok(()),
            mismatches => Err(PipelineError::ConfigurationMismatch { mismatches }),
        }
    }
}

/// Tally of every run of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionSummary {
    /// Runs started
    pub runs: u32,
    /// Runs that passed
    pub passes: u32,
    /// Runs that failed, for any reason
    pub failures: u32,
}

/// Session controller collecting `N` samples per run
pub struct Session<'a, P, C, A, D, const N: usize> {
    config: SessionConfig,
    flags: &'a CompletionFlags,
    platform: &'a mut P,
    console: &'a mut C,
    adc: &'a mut A,
    pdma: &'a mut D,
    /// Results read by the foreground loop
    cpu: SampleBuffer<N>,
    /// Transfer engine destination
    dma: DmaBuffer<N>,
    /// Destination the transfer channel was last fully programmed for
    configured_for: Option<usize>,
    checksum: Option<ChecksumPort<'a>>,
    indicator: Option<&'a mut dyn Indicator>,
    state: SessionState,
    summary: SessionSummary,
}

impl<'a, P, C, A, D, const N: usize> Session<'a, P, C, A, D, N>
where
    P: Platform,
    C: Console,
    A: ConversionEngine,
    D: TransferEngine,
{
    /// New session. Nothing is touched until the first run.
    pub fn new(
        config: SessionConfig,
        flags: &'a CompletionFlags,
        platform: &'a mut P,
        console: &'a mut C,
        adc: &'a mut A,
        pdma: &'a mut D,
    ) -> Self {
        Self {
            config,
            flags,
            platform,
            console,
            adc,
            pdma,
            cpu: SampleBuffer::new(),
            dma: DmaBuffer::new(),
            configured_for: None,
            checksum: None,
            indicator: None,
            state: SessionState::AwaitingModeSelection,
            summary: SessionSummary::default(),
        }
    }

    /// Offer the CRC-32 cross-check in the menu
    pub fn with_checksum(mut self, port: ChecksumPort<'a>) -> Self {
        self.checksum = Some(port);
        self
    }

    /// Mirror every run on `indicator`
    pub fn with_indicator(mut self, indicator: &'a mut dyn Indicator) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs so far
    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// CPU buffer of the last run
    pub fn cpu_samples(&self) -> &[u32] {
        self.cpu.as_slice()
    }

    /// Raw DMA buffer of the last run
    pub fn dma_samples(&self) -> [u32; N] {
        self.dma.snapshot()
    }

    /// Give back the borrowed ports
    pub fn release(self) -> (&'a mut P, &'a mut C, &'a mut A, &'a mut D) {
        (self.platform, self.console, self.adc, self.pdma)
    }

    /// Decode a menu key
    pub fn select(&self, key: u8) -> Selection {
        match key {
            b'1' => Selection::Scan(InputMode::SingleEnded),
            b'2' => Selection::Scan(InputMode::Differential),
            b'3' if self.checksum.is_some() => Selection::Checksum,
            _ => Selection::Exit,
        }
    }

    /// Menu loop. Returns once an unrecognized key is read.
    pub fn run(&mut self) -> SessionSummary {
        loop {
            self.state = SessionState::AwaitingModeSelection;
            self.print_menu();
            let key = self.console.read_byte();
            match self.select(key) {
                Selection::Scan(mode) => {
                    let outcome = self.run_scan(mode).and_then(|report| report.verdict());
                    self.conclude(outcome);
                }
                Selection::Checksum => {
                    let outcome = self.run_checksum().map(|_| ());
                    self.conclude(outcome);
                }
                Selection::Exit => {
                    debug!("key 0x{:02X} ends the session", key);
                    self.state = SessionState::Exited;
                    return self.summary;
                }
            }
        }
    }

    /// One scan/transfer run in `mode`, followed by verification.
    ///
    /// Mismatches are printed and counted in the report; only a fault that prevents the
    /// comparison is returned as an error. The transfer channel is aborted on any such fault.
    pub fn run_scan(&mut self, mode: InputMode) -> Result<RunReport> {
        self.summary.runs += 1;
        self.show(RunStatus::Busy);
        self.state = SessionState::ConfiguringRun;
        let mask = match mode {
            InputMode::SingleEnded => self.config.single_ended_channels,
            InputMode::Differential => self.config.differential_channels,
        };
        let plan = ScanPlan::new(mode, mask);
        if plan.per_trigger() == 0 {
            return Err(PipelineError::EmptyScan { mode });
        }
        self.adc.configure(&plan)?;

        self.cpu.clear();
        self.dma.clear();
        self.flags.reset(self.config.transfer_channel);
        self.arm_transfer()?;
        self.adc.enable_transfer_requests();
        self.adc.power_on();
        self.adc.clear_done();
        info!("{} scan of {} channel(s), {} samples", mode, plan.per_trigger(), N);

        self.state = SessionState::Acquiring;
        if let Err(err) = self.acquire(&plan) {
            self.abort_transfer();
            return Err(err);
        }

        self.state = SessionState::AwaitingTransferCompletion;
        let channel = self.config.transfer_channel;
        let waited = self.flags.wait(
            channel,
            self.config.transfer_limit,
            WaitStage::TransferCompletion,
            &mut *self.platform,
        );
        if let Err(err) = waited {
            self.abort_transfer();
            return Err(err);
        }
        if self.pdma.has_fault(channel) {
            self.abort_transfer();
            return Err(PipelineError::TransferFault { channel });
        }

        self.state = SessionState::Verifying;
        let dma = self.dma.snapshot();
        let mut mismatches = 0;
        for m in verify::mismatches(self.cpu.as_slice(), &dma, self.config.result_mask) {
            let cpu = m.cpu.unwrap_or_default();
            let pdma = m.dma.unwrap_or_default();
            warn!("sample {}: cpu 0x{:X}, pdma 0x{:X}", m.index, cpu, pdma);
            let _ = writeln!(
                self.console,
                "*** Count {}, conversion result: 0x{:X}, PDMA result: 0x{:X}.",
                m.index, cpu, pdma
            );
            mismatches += 1;
        }
        Ok(RunReport {
            mode,
            samples: self.cpu.len(),
            mismatches,
        })
    }

    /// CRC-32 cross-check over the attached region. Returns the agreed checksum.
    pub fn run_checksum(&mut self) -> Result<u32> {
        self.summary.runs += 1;
        self.show(RunStatus::Busy);
        self.state = SessionState::ConfiguringRun;
        let Some(port) = self.checksum.as_mut() else {
            return Err(PipelineError::InvalidRegion { len: 0 });
        };
        let channel = self.config.checksum_channel;
        if channel == self.config.transfer_channel {
            self.configured_for = None;
        }
        self.state = SessionState::AwaitingTransferCompletion;
        let report = cross_check(
            port,
            &mut *self.pdma,
            self.flags,
            &mut *self.platform,
            channel,
            self.config.transfer_limit,
        )?;

        self.state = SessionState::Verifying;
        let _ = writeln!(self.console, "First {} bytes checksum:", port.region.len());
        let _ = writeln!(self.console, "   - by flash command: 0x{:08X}", report.flash);
        let _ = writeln!(self.console, "   - by CPU write:     0x{:08X}", report.cpu);
        let _ = writeln!(self.console, "   - by PDMA write:    0x{:08X}", report.pdma);
        report.verdict()
    }

    /// Configure the transfer channel on first use, reload it afterwards
    fn arm_transfer(&mut self) -> Result<()> {
        let channel = self.config.transfer_channel;
        let destination = self.dma.address();
        if self.configured_for == Some(destination) {
            debug!("reload channel {} for {} samples", channel.index(), N);
            self.pdma.reload(channel, N)?;
        } else {
            let descriptor =
                TransferDescriptor::peripheral_to_memory(self.adc.transfer_source(), destination, N);
            debug!(
                "configure channel {}: 0x{:08X} -> 0x{:08X}",
                channel.index(),
                descriptor.source,
                descriptor.destination
            );
            self.pdma.configure(channel, &descriptor)?;
            self.configured_for = Some(destination);
        }
        self.pdma.enable_interrupt(channel);
        Ok(())
    }

    /// Trigger, wait, harvest, repeat until the CPU buffer is full
    fn acquire(&mut self, plan: &ScanPlan) -> Result<()> {
        let mode = plan.mode();
        self.adc.trigger();
        loop {
            spin_until(
                self.config.conversion_limit,
                WaitStage::Conversion,
                &mut *self.platform,
                || self.adc.is_done(),
            )?;
            self.adc.clear_done();

            for channel in plan.channels() {
                let sample = self.adc.sample(channel, mode)?;
                #[cfg(feature = "trace_samples")]
                trace!(
                    "sample {}: channel {} = 0x{:03X}",
                    self.cpu.len(),
                    sample.channel(),
                    sample.value()
                );
                if !self.cpu.push(sample.value() as u32) {
                    break;
                }
            }
            if self.cpu.is_full() {
                return Ok(());
            }

            // The transfer engine must have taken the last result before it is overwritten
            spin_until(
                self.config.transfer_limit,
                WaitStage::TransferDrain,
                &mut *self.platform,
                || !self.adc.request_pending(),
            )?;
            self.adc.trigger();
        }
    }

    fn abort_transfer(&mut self) {
        let channel = self.config.transfer_channel;
        warn!("aborting transfer channel {}", channel.index());
        self.pdma.abort(channel);
        self.configured_for = None;
    }

    fn conclude(&mut self, outcome: Result<()>) {
        self.state = SessionState::ReportingResult;
        match outcome {
            Ok(()) => {
                self.summary.passes += 1;
                info!("run passed");
                let _ = writeln!(self.console, "\n    PASS!");
                self.show(RunStatus::Pass);
            }
            Err(err) => {
                self.summary.failures += 1;
                warn!("run failed: {}", err);
                let _ = writeln!(self.console, "\n    FAIL! ({})", err);
                self.show(RunStatus::Fail);
            }
        }
    }

    fn show(&mut self, status: RunStatus) {
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.show(status);
        }
    }

    fn print_menu(&mut self) {
        let console = &mut *self.console;
        let _ = write!(console, "\n\nSelect input mode:\n  [1] Single-ended input (channel");
        for channel in ScanPlan::new(InputMode::SingleEnded, self.config.single_ended_channels)
            .channels()
        {
            let _ = write!(console, " {}", channel);
        }
        let _ = write!(console, ")\n  [2] Differential input (pair");
        for channel in ScanPlan::new(InputMode::Differential, self.config.differential_channels)
            .channels()
        {
            let _ = write!(console, " {}/{}", channel, channel + 1);
        }
        let _ = writeln!(console, ")");
        if let Some(port) = &self.checksum {
            let _ = writeln!(
                console,
                "  [3] CRC-32 of the first {} bytes (flash, CPU and PDMA)",
                port.region.len()
            );
        }
        let _ = writeln!(console, "  Other keys: exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adc::{ChannelMask, RESULT_MASK},
        completion::SpinLimit,
        crc::{crc32, CHECKSUM_REGION_LEN},
        pdma::Channel,
        platform::InterruptSource,
        sim::{ChannelStats, Faults, SimConsole, SimFlash, SimulatedMcu},
    };
    use std::vec::Vec;

    /// Four channels at 10/20/30/40, identical every cycle
    fn scenario(channel: u8, _cycle: u32) -> u16 {
        [10, 20, 30, 40][channel as usize % 4]
    }

    fn quick() -> SessionConfig {
        SessionConfig::default()
            .with_spin_limits(SpinLimit::Iterations(5_000), SpinLimit::Iterations(5_000))
    }

    #[repr(align(4))]
    struct Region([u8; CHECKSUM_REGION_LEN]);

    #[derive(Default)]
    struct Recorder(Vec<RunStatus>);

    impl Indicator for Recorder {
        fn show(&mut self, status: RunStatus) {
            self.0.push(status);
        }
    }

    #[test]
    fn single_ended_buffers_match() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        let report = session.run_scan(InputMode::SingleEnded).unwrap();
        assert_eq!(report.samples, 32);
        assert_eq!(report.mismatches, 0);
        assert_eq!(session.state(), SessionState::Verifying);

        let cpu = session.cpu_samples();
        for (i, value) in cpu.iter().enumerate() {
            assert_eq!(*value, [10, 20, 30, 40][i % 4]);
        }
        let dma = session.dma_samples();
        assert!(dma.iter().zip(cpu).all(|(d, c)| d & RESULT_MASK == *c));
        // Metadata above the result is present in the raw transfer elements
        assert!(dma.iter().any(|d| d & !RESULT_MASK != 0));
    }

    #[test]
    fn differential_only_populates_even_channels() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, |channel, cycle| (channel as u16) << 8 | cycle as u16);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        let report = session.run_scan(InputMode::Differential).unwrap();
        assert_eq!(report.mismatches, 0);
        for (i, value) in session.cpu_samples().iter().enumerate() {
            let channel = value >> 8;
            assert_eq!(channel % 2, 0);
            assert_eq!(channel, [0, 2][i % 2]);
            assert_eq!(value & 0xFF, (i / 2) as u32);
        }
        for word in session.dma_samples() {
            assert_eq!((word >> 24) & 0xF, (word & RESULT_MASK) >> 8);
        }
    }

    #[test]
    fn second_run_reloads_and_resets_its_flag() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        assert_eq!(session.run_scan(InputMode::SingleEnded).unwrap().mismatches, 0);
        assert!(flags.is_done(Channel::CH2));
        assert_eq!(session.run_scan(InputMode::Differential).unwrap().mismatches, 0);
        let stats = mcu.channel_stats(Channel::CH2);
        assert_eq!(stats.configures, 1);
        assert_eq!(stats.reloads, 1);

        // A stale flag from the last run must not satisfy this one
        mcu.set_faults(Faults {
            drop_interrupts: true,
            ..Faults::default()
        });
        assert_eq!(
            session.run_scan(InputMode::SingleEnded),
            Err(PipelineError::HardwareTimeout {
                stage: WaitStage::TransferCompletion
            })
        );
    }

    #[test]
    fn stalled_engine_times_out_and_recovers() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        mcu.set_faults(Faults {
            stall_transfers: true,
            ..Faults::default()
        });
        assert_eq!(
            session.run_scan(InputMode::SingleEnded),
            Err(PipelineError::HardwareTimeout {
                stage: WaitStage::TransferDrain
            })
        );
        assert_eq!(mcu.channel_stats(Channel::CH2).aborts, 1);

        mcu.set_faults(Faults::default());
        assert_eq!(session.run_scan(InputMode::SingleEnded).unwrap().mismatches, 0);
        assert_eq!(mcu.channel_stats(Channel::CH2).configures, 2);
    }

    #[test]
    fn stalled_converter_times_out_at_conversion() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        mcu.set_faults(Faults {
            stall_adc: true,
            ..Faults::default()
        });
        assert_eq!(
            session.run_scan(InputMode::Differential),
            Err(PipelineError::HardwareTimeout {
                stage: WaitStage::Conversion
            })
        );
        assert_eq!(session.state(), SessionState::Acquiring);
        assert_eq!(mcu.channel_stats(Channel::CH2).aborts, 1);
        assert!(session.cpu_samples().is_empty());
    }

    #[test]
    fn bus_error_fails_the_run_and_aborts_the_channel() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        mcu.set_faults(Faults {
            bus_error: true,
            ..Faults::default()
        });
        assert_eq!(
            session.run_scan(InputMode::SingleEnded),
            Err(PipelineError::TransferFault {
                channel: Channel::CH2
            })
        );
        assert_eq!(mcu.channel_stats(Channel::CH2).aborts, 1);

        // Programming the channel again clears the latched error
        mcu.set_faults(Faults::default());
        assert_eq!(session.run_scan(InputMode::SingleEnded).unwrap().mismatches, 0);
        assert_eq!(mcu.channel_stats(Channel::CH2).configures, 2);
    }

    #[test]
    fn custom_channels_and_result_mask_are_used() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        // Bit 9 belongs to the converter result but not to the configured mask
        mcu.set_faults(Faults {
            corrupt: Some((3, 1 << 9)),
            ..Faults::default()
        });
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let ch5 = Channel::new(5).unwrap();
        let config = quick()
            .with_transfer_channel(ch5)
            .with_result_mask(0xFF)
            .with_channels(ChannelMask::new(0b0110), ChannelMask::new(0b0100));
        let mut session: Session<'_, _, _, _, _, 16> = Session::new(
            config,
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );

        let report = session.run_scan(InputMode::SingleEnded).unwrap();
        assert_eq!(report.mismatches, 0);
        for (i, value) in session.cpu_samples().iter().enumerate() {
            assert_eq!(*value, [20, 30][i % 2]);
        }
        assert_eq!(session.dma_samples()[3] & RESULT_MASK, 30 ^ 1 << 9);

        let report = session.run_scan(InputMode::Differential).unwrap();
        assert_eq!(report.samples, 16);
        assert!(session.cpu_samples().iter().all(|value| *value == 30));

        assert!(flags.is_done(ch5));
        let stats = mcu.channel_stats(ch5);
        assert_eq!((stats.configures, stats.reloads), (1, 1));
        assert_eq!(mcu.channel_stats(Channel::CH2), ChannelStats::default());
    }

    #[test]
    fn shared_channel_is_configured_again_after_checksum() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut crc = mcu.crc();
        let mut flash = SimFlash::new();
        let region = Region(core::array::from_fn(|i| (i * 13) as u8));
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        let ch7 = Channel::new(7).unwrap();
        let config = quick()
            .with_transfer_channel(ch7)
            .with_checksum_channel(ch7);
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            config,
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        )
        .with_checksum(ChecksumPort {
            crc: &mut crc,
            flash: &mut flash,
            region: &region.0,
        });

        assert_eq!(session.run_scan(InputMode::SingleEnded).unwrap().mismatches, 0);
        assert_eq!(session.run_checksum(), Ok(crc32(&region.0)));
        assert_eq!(session.run_scan(InputMode::SingleEnded).unwrap().mismatches, 0);
        let stats = mcu.channel_stats(ch7);
        assert_eq!((stats.configures, stats.reloads), (3, 0));
        assert_eq!(mcu.channel_stats(Channel::CH0), ChannelStats::default());
    }

    #[test]
    fn corrupted_element_inside_mask_is_reported() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        mcu.set_faults(Faults {
            corrupt: Some((21, 1 << 3)),
            ..Faults::default()
        });
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"");
        platform.enable_interrupt(InterruptSource::Pdma);
        {
            let mut session: Session<'_, _, _, _, _, 32> = Session::new(
                quick(),
                &flags,
                &mut platform,
                &mut console,
                &mut adc,
                &mut pdma,
            );
            let report = session.run_scan(InputMode::SingleEnded).unwrap();
            assert_eq!(report.mismatches, 1);
            assert_eq!(
                report.verdict(),
                Err(PipelineError::ConfigurationMismatch { mismatches: 1 })
            );
        }
        assert!(console
            .output()
            .contains("*** Count 21, conversion result: 0x14, PDMA result: 0x101001C."));
    }

    #[test]
    fn menu_runs_until_unknown_key() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut crc = mcu.crc();
        let mut flash = SimFlash::new();
        let region = Region(core::array::from_fn(|i| (i * 7 + 3) as u8));
        let mut console = SimConsole::new(b"123q1");
        let mut leds = Recorder::default();
        platform.enable_interrupt(InterruptSource::Pdma);
        let summary = {
            let mut session: Session<'_, _, _, _, _, 32> = Session::new(
                quick(),
                &flags,
                &mut platform,
                &mut console,
                &mut adc,
                &mut pdma,
            )
            .with_checksum(ChecksumPort {
                crc: &mut crc,
                flash: &mut flash,
                region: &region.0,
            })
            .with_indicator(&mut leds);
            let summary = session.run();
            assert_eq!(session.state(), SessionState::Exited);
            summary
        };

        assert_eq!(
            summary,
            SessionSummary {
                runs: 3,
                passes: 3,
                failures: 0
            }
        );
        let output = console.output();
        assert_eq!(output.matches("PASS!").count(), 3);
        assert!(output.contains("[3] CRC-32 of the first 2048 bytes"));
        assert!(output.contains(&std::format!("0x{:08X}", crc32(&region.0))));
        // The trailing '1' is never read
        assert_eq!(console.unread(), 1);
        assert_eq!(
            leds.0,
            [
                RunStatus::Busy,
                RunStatus::Pass,
                RunStatus::Busy,
                RunStatus::Pass,
                RunStatus::Busy,
                RunStatus::Pass
            ]
        );
    }

    #[test]
    fn checksum_key_exits_without_a_port() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"3");
        let mut session: Session<'_, _, _, _, _, 32> = Session::new(
            quick(),
            &flags,
            &mut platform,
            &mut console,
            &mut adc,
            &mut pdma,
        );
        assert_eq!(session.select(b'3'), Selection::Exit);
        assert_eq!(session.run(), SessionSummary::default());
    }

    #[test]
    fn failed_run_is_counted_and_session_continues() {
        let flags = CompletionFlags::new();
        let mcu = SimulatedMcu::new(&flags, scenario);
        let (mut platform, mut adc, mut pdma) = (mcu.platform(), mcu.adc(), mcu.pdma());
        let mut console = SimConsole::new(b"11x");
        platform.enable_interrupt(InterruptSource::Pdma);
        mcu.set_faults(Faults {
            corrupt: Some((0, 0x1)),
            ..Faults::default()
        });
        let summary = {
            let mut session: Session<'_, _, _, _, _, 32> = Session::new(
                quick(),
                &flags,
                &mut platform,
                &mut console,
                &mut adc,
                &mut pdma,
            );
            session.run()
        };
        // The corruption hits element 0 of every run
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.failures, 2);
        assert_eq!(console.output().matches("FAIL!").count(), 2);
    }
}
