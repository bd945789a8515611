// SPDX-License-Identifier: Apache-2.0

//! The complete sample program, independent of the board it runs on.

use log::info;

use crate::{
    adc::ConversionEngine,
    completion::CompletionFlags,
    components::Indicator,
    config::SessionConfig,
    crc::ChecksumPort,
    pdma::TransferEngine,
    platform::{Console, InterruptSource, Platform, CONSOLE_BAUD},
    session::{Session, SessionSummary},
};

/// Ports a board hands to [`run_sample`]
pub struct Ports<'a, P, C, A, D> {
    /// Clocks, interrupt controller, busy-wait
    pub platform: &'a mut P,
    /// Menu console
    pub console: &'a mut C,
    /// Conversion engine
    pub adc: &'a mut A,
    /// Transfer engine
    pub pdma: &'a mut D,
    /// CRC-32 cross-check hardware, if the board has it
    pub checksum: Option<ChecksumPort<'a>>,
    /// Status LEDs, if the board has them
    pub indicator: Option<&'a mut dyn Indicator>,
}

/// Bring the system up, run the menu until it is left, then shut the converter down.
///
/// `flags` must be the same instance the board's transfer-done interrupt signals.
pub fn run_sample<'a, P, C, A, D, const N: usize>(
    config: SessionConfig,
    flags: &'a CompletionFlags,
    ports: Ports<'a, P, C, A, D>,
) -> SessionSummary
where
    P: Platform,
    C: Console,
    A: ConversionEngine,
    D: TransferEngine,
{
    let Ports {
        platform,
        console,
        adc,
        pdma,
        checksum,
        indicator,
    } = ports;

    platform.unlock_configuration();
    platform.initialize_system_clocks();
    platform.lock_configuration();
    platform.initialize_console(CONSOLE_BAUD);

    let clock = platform.core_clock_hz();
    info!("core clock {} Hz", clock);
    let _ = write!(console, "\nSystem clock rate: {} Hz", clock);
    let _ = write!(
        console,
        "\n+----------------------------------------------------------------------+\n\
         |            ADC single cycle scan mode with PDMA sample code          |\n\
         +----------------------------------------------------------------------+\n"
    );
    platform.enable_interrupt(InterruptSource::Pdma);

    let mut session: Session<'a, P, C, A, D, N> =
        Session::new(config, flags, platform, console, adc, pdma);
    if let Some(port) = checksum {
        session = session.with_checksum(port);
    }
    if let Some(indicator) = indicator {
        session = session.with_indicator(indicator);
    }
    let summary = session.run();
    let (platform, console, adc, _pdma) = session.release();

    adc.close();
    platform.disable_interrupt(InterruptSource::Pdma);
    info!(
        "{} run(s): {} passed, {} failed",
        summary.runs, summary.passes, summary.failures
    );
    let _ = writeln!(console, "\nExit ADC sample code");
    summary
}
