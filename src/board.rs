// SPDX-License-Identifier: Apache-2.0

//! RP2040 implementations of the hardware ports.
//!
//! - [`Rp2040Adc`]: [`rp2040_hal::Adc`] in FIFO mode with DMA requests enabled, round-robin over
//!   the scan's channels and triggered one conversion at a time
//! - [`Rp2040Dma`]: channel programming over the `CHn_*` registers, completion on `DMA_IRQ_0`
//! - [`Rp2040DmaIrq`]: `INTS0` read-and-clear for the interrupt handler
//! - [`Rp2040Platform`]: clock report, NVIC, UART0 line settings
//! - [`UartConsole`]: polled UART0 through [`UartPeripheral`]
//!
//! The DMA engine stays at register level: [`rp2040_hal::dma::single_buffer`] consumes its
//! channel and buffer for a single transfer, and can neither re-arm a channel with a new count
//! nor abort it, both of which the session relies on.
//!
//! The RP2040 ADC has no differential inputs. Only the four GPIO inputs are scanned.

use core::{cell::RefCell, fmt};

use critical_section::Mutex;
use log::{debug, error, warn};
use rp2040_hal::{
    adc::{AdcChannel, AdcFifo, AdcPin, RoundRobin},
    clocks::ClocksManager,
    dma::{Channels, DMAExt},
    fugit::RateExtU32,
    gpio::{
        bank0::{Gpio0, Gpio1, Gpio26, Gpio27, Gpio28, Gpio29},
        FunctionSioInput, FunctionUart, Pin, PullDown, PullNone,
    },
    pac,
    uart::{DataBits, Disabled, Enabled, StopBits, UartConfig, UartPeripheral},
    Adc, Clock,
};

use crate::{
    adc::{ConversionEngine, InputMode, ScanPlan},
    error::{PipelineError, Result},
    pdma::{
        AddressStep, Channel, ChannelSet, ElementWidth, RequestSource, TransferDescriptor,
        TransferEngine, TransferStatus, MAX_CHANNELS,
    },
    platform::{Console, InterruptSource, Platform},
};

/// External crystal on the Pico board
pub const XOSC_FREQ_HZ: u32 = 12_000_000;

/// GPIO inputs of the RP2040 ADC
pub const ADC_INPUTS: usize = 4;

/// Clock the ADC needs for its 500 ksample/s rate
const ADC_CLOCK_HZ: u32 = 48_000_000;

// DMA CHn_CTRL
const CTRL_EN: u32 = 1 << 0;
const CTRL_DATA_SIZE_SHIFT: u32 = 2;
const CTRL_INCR_READ: u32 = 1 << 4;
const CTRL_INCR_WRITE: u32 = 1 << 5;
const CTRL_CHAIN_TO_SHIFT: u32 = 11;
const CTRL_TREQ_SEL_SHIFT: u32 = 15;
const CTRL_IRQ_QUIET: u32 = 1 << 21;
const CTRL_READ_ERROR: u32 = 1 << 30;
const CTRL_WRITE_ERROR: u32 = 1 << 29;
const TREQ_ADC: u32 = 36;
const TREQ_UNPACED: u32 = 0x3F;

/// An analog input with its digital path disabled
pub type AnalogPin<I> = AdcPin<Pin<I, FunctionSioInput, PullNone>>;

/// GPIO26 to GPIO29, handed to the ADC
pub struct AnalogInputs {
    /// ADC channel 0
    pub ain0: AnalogPin<Gpio26>,
    /// ADC channel 1
    pub ain1: AnalogPin<Gpio27>,
    /// ADC channel 2
    pub ain2: AnalogPin<Gpio28>,
    /// ADC channel 3
    pub ain3: AnalogPin<Gpio29>,
}

impl AnalogInputs {
    fn channels(&self) -> [u8; ADC_INPUTS] {
        [
            self.ain0.channel(),
            self.ain1.channel(),
            self.ain2.channel(),
            self.ain3.channel(),
        ]
    }
}

/// Channel of a scan, as the FIFO builder wants it
struct ScanInput(u8);

impl AdcChannel for ScanInput {
    fn channel(&self) -> u8 {
        self.0
    }
}

/// Round-robin set of `order`. Short scans repeat their last channel, which leaves the set
/// unchanged.
fn rotation(order: &[u8]) -> RoundRobin {
    let at = |i: usize| ScanInput(order[i.min(order.len() - 1)]);
    RoundRobin::from((&at(0), &at(1), &at(2), &at(3)))
}

/// Result, FIFO level and FIFO address. Read only, while [`AdcFifo`] owns the converter.
fn adc_registers() -> &'static pac::adc::RegisterBlock {
    // SAFETY: no register is written through this reference
    unsafe { &*pac::ADC::ptr() }
}

/// ADC driven through the FIFO, one triggered conversion per scan channel.
///
/// Every conversion lands in the FIFO, where its DREQ paces the DMA, and in the result register,
/// which is the CPU's copy.
pub struct Rp2040Adc<'a> {
    idle: Option<&'a mut Adc>,
    fifo: Option<AdcFifo<'a, u16>>,
    inputs: AnalogInputs,
    order: [u8; ADC_INPUTS],
    order_len: usize,
    /// Index into `order` of the conversion in progress
    position: usize,
    converting: bool,
    done: bool,
    results: [u16; ADC_INPUTS],
}

impl<'a> Rp2040Adc<'a> {
    /// Scan `inputs` with `adc`
    pub fn new(adc: &'a mut Adc, inputs: AnalogInputs) -> Self {
        Self {
            idle: Some(adc),
            fifo: None,
            inputs,
            order: [0; ADC_INPUTS],
            order_len: 0,
            position: 0,
            converting: false,
            done: false,
            results: [0; ADC_INPUTS],
        }
    }

    /// Stop conversions and drain the FIFO
    fn stop(&mut self) {
        if let Some(fifo) = self.fifo.take() {
            self.idle = Some(fifo.stop());
        }
        self.converting = false;
    }
}

impl ConversionEngine for Rp2040Adc<'_> {
    fn configure(&mut self, plan: &ScanPlan) -> Result<()> {
        if plan.mode() == InputMode::Differential {
            return Err(PipelineError::UnsupportedMode { mode: plan.mode() });
        }
        let wired = self.inputs.channels();
        self.order_len = 0;
        for channel in plan.channels() {
            if !wired.contains(&channel) {
                return Err(PipelineError::InvalidChannel { channel });
            }
            self.order[self.order_len] = channel;
            self.order_len += 1;
        }
        self.stop();
        self.done = false;
        debug!("adc: {} channel(s) per scan", self.order_len);
        Ok(())
    }

    fn enable_transfer_requests(&mut self) {
        if self.order_len == 0 {
            return;
        }
        let Some(adc) = self.idle.take() else {
            return;
        };
        let order = &self.order[..self.order_len];
        let fifo = adc
            .build_fifo()
            .set_channel(&mut ScanInput(order[0]))
            .round_robin(rotation(order))
            .enable_dma()
            .start_paused();
        self.fifo = Some(fifo);
    }

    fn power_on(&mut self) {
        // `Adc::new` enabled the converter, wait out a conversion still in flight
        if let Some(fifo) = self.fifo.as_mut() {
            while !fifo.is_ready() {
                cortex_m::asm::nop();
            }
        }
    }

    fn trigger(&mut self) {
        self.position = 0;
        self.done = false;
        if let Some(fifo) = self.fifo.as_mut() {
            fifo.trigger();
            self.converting = true;
        } else {
            warn!("adc: triggered without transfer requests enabled");
        }
    }

    fn is_done(&mut self) -> bool {
        let Some(fifo) = self.fifo.as_mut() else {
            return self.done;
        };
        if !self.converting || !fifo.is_ready() {
            return self.done;
        }
        let channel = self.order[self.position];
        self.results[channel as usize] = adc_registers().result().read().result().bits();
        self.position += 1;
        if self.position < self.order_len {
            fifo.trigger();
        } else {
            self.converting = false;
            self.done = true;
        }
        self.done
    }

    fn clear_done(&mut self) {
        self.done = false;
    }

    fn read(&self, channel: u8) -> u16 {
        self.results.get(channel as usize).copied().unwrap_or_default()
    }

    fn request_pending(&self) -> bool {
        self.fifo.is_some() && adc_registers().fcs().read().level().bits() > 0
    }

    fn transfer_source(&self) -> usize {
        adc_registers().fifo().as_ptr() as usize
    }

    fn close(&mut self) {
        self.stop();
    }
}

/// DMA controller
pub struct Rp2040Dma {
    /// Held so no other driver can claim a channel
    _channels: Channels,
    descriptors: [Option<TransferDescriptor>; MAX_CHANNELS],
}

impl Rp2040Dma {
    /// Take the DMA controller out of reset
    pub fn new(dma: pac::DMA, resets: &mut pac::RESETS) -> Self {
        Self {
            _channels: dma.split(resets),
            descriptors: [None; MAX_CHANNELS],
        }
    }

    fn registers(&self) -> &pac::dma::RegisterBlock {
        // SAFETY: every channel of the controller is owned by `self`
        unsafe { &*pac::DMA::ptr() }
    }

    fn ctrl(channel: Channel, descriptor: &TransferDescriptor) -> u32 {
        let size = match descriptor.width {
            ElementWidth::Byte => 0,
            ElementWidth::HalfWord => 1,
            ElementWidth::Word => 2,
        };
        let treq = match descriptor.request {
            RequestSource::AdcResult => TREQ_ADC,
            RequestSource::Software => TREQ_UNPACED,
        };
        let mut ctrl = CTRL_EN
            | size << CTRL_DATA_SIZE_SHIFT
            // Chaining to itself disables chaining
            | (channel.index() as u32) << CTRL_CHAIN_TO_SHIFT
            | treq << CTRL_TREQ_SEL_SHIFT;
        if descriptor.source_step == AddressStep::Increment {
            ctrl |= CTRL_INCR_READ;
        }
        if descriptor.destination_step == AddressStep::Increment {
            ctrl |= CTRL_INCR_WRITE;
        }
        if !descriptor.interrupt {
            ctrl |= CTRL_IRQ_QUIET;
        }
        ctrl
    }

    /// Program every channel register. Peripheral-paced channels are armed immediately,
    /// software-started ones wait for [`TransferEngine::software_request`].
    fn program(&mut self, channel: Channel, descriptor: &TransferDescriptor) {
        let ctrl = Self::ctrl(channel, descriptor);
        let ch = self.registers().ch(channel.index() as usize);
        ch.ch_read_addr()
            .write(|w| unsafe { w.bits(descriptor.source as u32) });
        ch.ch_write_addr()
            .write(|w| unsafe { w.bits(descriptor.destination as u32) });
        ch.ch_trans_count()
            .write(|w| unsafe { w.bits(descriptor.count as u32) });
        match descriptor.request {
            RequestSource::Software => ch.ch_al1_ctrl().write(|w| unsafe { w.bits(ctrl) }),
            RequestSource::AdcResult => ch.ch_ctrl_trig().write(|w| unsafe { w.bits(ctrl) }),
        };
    }
}

impl TransferEngine for Rp2040Dma {
    fn configure(&mut self, channel: Channel, descriptor: &TransferDescriptor) -> Result<()> {
        descriptor.validate()?;
        self.program(channel, descriptor);
        self.descriptors[channel.index() as usize] = Some(*descriptor);
        Ok(())
    }

    fn reload(&mut self, channel: Channel, count: usize) -> Result<()> {
        let descriptor = self.descriptors[channel.index() as usize]
            .ok_or(PipelineError::ChannelNotConfigured { channel })?;
        let descriptor = TransferDescriptor {
            count,
            ..descriptor
        };
        descriptor.validate()?;
        // Read and write addresses advanced during the last run, rewrite them as well
        self.program(channel, &descriptor);
        Ok(())
    }

    fn enable_interrupt(&mut self, channel: Channel) {
        self.registers()
            .inte0()
            .modify(|r, w| unsafe { w.bits(r.bits() | channel.bit()) });
    }

    fn software_request(&mut self, channel: Channel) {
        self.registers()
            .multi_chan_trigger()
            .write(|w| unsafe { w.bits(channel.bit()) });
    }

    fn abort(&mut self, channel: Channel) {
        let dma = self.registers();
        dma.chan_abort().write(|w| unsafe { w.bits(channel.bit()) });
        while dma.chan_abort().read().bits() & channel.bit() != 0 {
            cortex_m::asm::nop();
        }
        // A late completion of the aborted run must not be taken for the next one
        dma.ints0().write(|w| unsafe { w.bits(channel.bit()) });
    }

    fn has_fault(&self, channel: Channel) -> bool {
        let ch = self.registers().ch(channel.index() as usize);
        ch.ch_ctrl_trig().read().bits() & (CTRL_READ_ERROR | CTRL_WRITE_ERROR) != 0
    }
}

/// `DMA_IRQ_0` status, for use inside the interrupt handler
pub struct Rp2040DmaIrq {
    _private: (),
}

impl Rp2040DmaIrq {
    /// Access the interrupt status registers.
    ///
    /// # Safety
    ///
    /// Only the `DMA_IRQ_0` handler may hold this, since reading clears the status.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl TransferStatus for Rp2040DmaIrq {
    fn take_completed(&mut self) -> ChannelSet {
        // SAFETY: INTS0 is only touched from the interrupt handler and by `abort` on channels
        // that are no longer running
        let dma = unsafe { &*pac::DMA::ptr() };
        let pending = dma.ints0().read().bits();
        dma.ints0().write(|w| unsafe { w.bits(pending) });
        ChannelSet::from_bits(pending)
    }
}

/// UART0 on GPIO0 (TX) and GPIO1 (RX)
pub type UartPins = (
    Pin<Gpio0, FunctionUart, PullDown>,
    Pin<Gpio1, FunctionUart, PullDown>,
);

/// UART0 before its line settings are known
pub type IdleUart = UartPeripheral<Disabled, pac::UART0, UartPins>;

/// UART0 once [`Platform::initialize_console`] enabled it
pub type ConsoleUart = UartPeripheral<Enabled, pac::UART0, UartPins>;

/// Console UART, shared by the platform that opens it and the console that uses it
static CONSOLE_UART: Mutex<RefCell<Option<ConsoleUart>>> = Mutex::new(RefCell::new(None));

/// Clocks, NVIC and the console's line settings
pub struct Rp2040Platform {
    clocks: ClocksManager,
    uart: Option<IdleUart>,
}

impl Rp2040Platform {
    /// `clocks` must already run: peripherals cannot leave reset before them, so the firmware
    /// starts them before building any port.
    pub fn new(clocks: ClocksManager, uart: IdleUart) -> Self {
        Self {
            clocks,
            uart: Some(uart),
        }
    }

    fn interrupt(source: InterruptSource) -> pac::Interrupt {
        match source {
            InterruptSource::Adc => pac::Interrupt::ADC_IRQ_FIFO,
            InterruptSource::Pdma => pac::Interrupt::DMA_IRQ_0,
        }
    }
}

impl Platform for Rp2040Platform {
    fn initialize_system_clocks(&mut self) {
        let adc = self.clocks.adc_clock.freq().to_Hz();
        debug!(
            "clocks: sys {} Hz, peri {} Hz, adc {} Hz",
            self.clocks.system_clock.freq().to_Hz(),
            self.clocks.peripheral_clock.freq().to_Hz(),
            adc
        );
        if adc != ADC_CLOCK_HZ {
            warn!("adc clock is {} Hz, conversions expect {} Hz", adc, ADC_CLOCK_HZ);
        }
    }

    fn initialize_console(&mut self, baud: u32) {
        let Some(uart) = self.uart.take() else {
            return;
        };
        let config = UartConfig::new(baud.Hz(), DataBits::Eight, None, StopBits::One);
        match uart.enable(config, self.clocks.peripheral_clock.freq()) {
            Ok(uart) => critical_section::with(|cs| {
                CONSOLE_UART.replace(cs, Some(uart));
            }),
            Err(_) => error!("console: {} baud is out of range", baud),
        }
    }

    fn core_clock_hz(&self) -> u32 {
        self.clocks.system_clock.freq().to_Hz()
    }

    fn enable_interrupt(&mut self, source: InterruptSource) {
        // SAFETY: handlers only touch `CompletionFlags`, which is interrupt safe
        unsafe { pac::NVIC::unmask(Self::interrupt(source)) }
    }

    fn disable_interrupt(&mut self, source: InterruptSource) {
        pac::NVIC::mask(Self::interrupt(source));
    }

    fn relax(&mut self) {
        cortex_m::asm::nop();
    }
}

/// Polled console on the UART opened by [`Rp2040Platform`]. Output before that is dropped.
pub struct UartConsole;

impl UartConsole {
    fn send(bytes: &[u8]) {
        critical_section::with(|cs| {
            if let Some(uart) = CONSOLE_UART.borrow_ref(cs).as_ref() {
                uart.write_full_blocking(bytes);
            }
        });
    }
}

impl fmt::Write for UartConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for (i, line) in s.split('\n').enumerate() {
            if i > 0 {
                Self::send(b"\r\n");
            }
            Self::send(line.as_bytes());
        }
        Ok(())
    }
}

impl Console for UartConsole {
    fn read_byte(&mut self) -> u8 {
        let mut byte = [0; 1];
        loop {
            let polled = critical_section::with(|cs| {
                let uart = CONSOLE_UART.borrow_ref(cs);
                let Some(uart) = uart.as_ref() else {
                    // Nothing to read from, a zero key ends the menu
                    return Some(0);
                };
                match uart.read_raw(&mut byte) {
                    Ok(read) => read.first().copied(),
                    Err(_) => None,
                }
            });
            if let Some(key) = polled {
                return key;
            }
            cortex_m::asm::nop();
        }
    }
}
