//! Runs the ADC scan / DMA verification menu on a Raspberry Pi Pico, with the console on UART0
//! (GPIO0 TX, GPIO1 RX), analog inputs on GPIO26 to GPIO29 and status LEDs on GPIO6 to GPIO8.
#![no_std]
#![no_main]
#![doc(html_playground_url = "https://play.rust-lang.org/")]
#![warn(missing_docs)]

use adc_pdma_scan::{
    app::{run_sample, Ports},
    board::{
        AnalogInputs, Rp2040Adc, Rp2040Dma, Rp2040DmaIrq, Rp2040Platform, UartConsole,
        XOSC_FREQ_HZ,
    },
    completion::CompletionFlags,
    components::StatusLeds,
    config::{SessionConfig, SAMPLE_COUNT},
    interrupt::on_transfer_complete,
    logger,
};
use defmt::{debug, info};
#[allow(unused_imports)]
use defmt_rtt as _;
#[allow(unused_imports)]
use panic_probe as _;
use rp2040_hal::{
    adc::AdcPin,
    clocks::init_clocks_and_plls,
    entry,
    gpio::{FunctionUart, Pins},
    pac::{self, interrupt},
    uart::UartPeripheral,
    Adc, Sio, Watchdog,
};

/// Second-stage bootloader, from [rp2040-boot2](https://docs.rs/rp2040-boot2)
#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

/// Completion latches shared with `DMA_IRQ_0`
static COMPLETION: CompletionFlags = CompletionFlags::new();

/// Main operation loop
#[entry]
fn main() -> ! {
    logger::init();
    info!("ADC scan startup");
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    // Peripherals may only leave reset once their clocks run
    let clocks = init_clocks_and_plls(
        XOSC_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let pins = Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );
    let uart_pins = (
        pins.gpio0.into_function::<FunctionUart>(),
        pins.gpio1.into_function::<FunctionUart>(),
    );
    let uart = UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS);
    debug!("init status LEDs");
    let mut leds = StatusLeds::new(
        pins.gpio6.into_push_pull_output(),
        pins.gpio7.into_push_pull_output(),
        pins.gpio8.into_push_pull_output(),
    );

    debug!("init analog inputs");
    let inputs = AnalogInputs {
        ain0: AdcPin::new(pins.gpio26.into_floating_input()).unwrap(),
        ain1: AdcPin::new(pins.gpio27.into_floating_input()).unwrap(),
        ain2: AdcPin::new(pins.gpio28.into_floating_input()).unwrap(),
        ain3: AdcPin::new(pins.gpio29.into_floating_input()).unwrap(),
    };
    let mut hal_adc = Adc::new(pac.ADC, &mut pac.RESETS);
    let mut adc = Rp2040Adc::new(&mut hal_adc, inputs);
    let mut dma = Rp2040Dma::new(pac.DMA, &mut pac.RESETS);
    let mut console = UartConsole;
    let mut platform = Rp2040Platform::new(clocks, uart);

    let summary = run_sample::<_, _, _, _, SAMPLE_COUNT>(
        SessionConfig::default(),
        &COMPLETION,
        Ports {
            platform: &mut platform,
            console: &mut console,
            adc: &mut adc,
            pdma: &mut dma,
            checksum: None,
            indicator: Some(&mut leds),
        },
    );
    info!(
        "session over: {=u32} passed, {=u32} failed",
        summary.passes, summary.failures
    );

    loop {
        cortex_m::asm::wfi();
    }
}

/// Transfer-done interrupt
#[interrupt]
fn DMA_IRQ_0() {
    // SAFETY: this handler is the only user of the DMA interrupt status
    let mut status = unsafe { Rp2040DmaIrq::steal() };
    on_transfer_complete(&mut status, &COMPLETION);
}
