// SPDX-License-Identifier: Apache-2.0

//! Board collaborators: one-shot setup calls, the interrupt controller and the serial console.

use core::fmt;

/// Baud rate of the console UART
pub const CONSOLE_BAUD: u32 = 115_200;

/// Interrupt lines the pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptSource {
    /// Conversion engine
    Adc,
    /// Transfer engine (transfer-done of any channel)
    Pdma,
}

/// Clock, protection and interrupt controller services of the board
pub trait Platform {
    /// Bring up the clock tree. Called once at start.
    fn initialize_system_clocks(&mut self);

    /// Bring up the console UART. Called once at start.
    fn initialize_console(&mut self, baud: u32);

    /// Core clock frequency in Hz
    fn core_clock_hz(&self) -> u32;

    /// Allow writes to protected registers
    fn unlock_configuration(&mut self) {}

    /// Protect registers again
    fn lock_configuration(&mut self) {}

    /// Unmask an interrupt line
    fn enable_interrupt(&mut self, source: InterruptSource);

    /// Mask an interrupt line
    fn disable_interrupt(&mut self, source: InterruptSource);

    /// One iteration of a busy-wait
    fn relax(&mut self);

    /// Polled by every busy-wait; returning `true` abandons the wait
    fn cancel_requested(&mut self) -> bool {
        false
    }
}

/// Line-oriented text console
pub trait Console: fmt::Write {
    /// Block until one byte is received
    fn read_byte(&mut self) -> u8;
}
