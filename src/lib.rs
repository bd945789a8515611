//! ADC single-cycle scan with a DMA drain, verified against the CPU's own view of every
//! conversion.
//!
//! Each run triggers the conversion engine once per scan cycle. The foreground loop reads every
//! result from the per-channel registers while the transfer engine drains the same results,
//! paced by the converter, into a word buffer. The transfer-done interrupt latches a per-channel
//! [`CompletionFlags`](completion::CompletionFlags) entry, after which both buffers are compared
//! under a result mask ([`verify`]). A CRC-32 cross-check ([`crc`]) computes the same checksum
//! through the flash controller, the CPU and the transfer engine.
//!
//! The hardware is reached only through the port traits in [`adc`], [`pdma`], [`crc`] and
//! [`platform`], so the whole pipeline runs on the host against the simulator in `sim`.
//!
//! ## Crate features
//!
//! - `rp2040`: Builds the firmware binary and the [RP2040](rp2040_hal) port implementations in
//!   `board`. Differential inputs and the CRC cross-check are not available on that chip.
//! - `defmt`: Derives `defmt::Format` for the public data types. Enabled by `rp2040`.
//! - `std`: Exposes the simulator (`sim`) outside of this crate's unit tests.
//! - `trace_samples`: Logs every harvested conversion result. Very noisy!
//!
//! ## Demo
//!
//! Wiring the library on a board (see the binary crate for the complete RP2040 version):
//!
//! ```ignore
//! use adc_pdma_scan::{
//!     app::{run_sample, Ports},
//!     completion::CompletionFlags,
//!     config::{SessionConfig, SAMPLE_COUNT},
//!     interrupt::on_transfer_complete,
//! };
//!
//! static COMPLETION: CompletionFlags = CompletionFlags::new();
//!
//! fn main() -> ! {
//!     let summary = run_sample::<_, _, _, _, SAMPLE_COUNT>(
//!         SessionConfig::default(),
//!         &COMPLETION,
//!         Ports {
//!             platform: &mut platform,
//!             console: &mut console,
//!             adc: &mut adc,
//!             pdma: &mut dma,
//!             checksum: None,
//!             indicator: Some(&mut leds),
//!         },
//!     );
//!     loop {
//!         cortex_m::asm::wfi();
//!     }
//! }
//!
//! #[interrupt]
//! fn DMA_IRQ_0() {
//!     on_transfer_complete(&mut dma_status, &COMPLETION);
//! }
//! ```

// Copyright 2024 Cameron Rodriguez
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg), feature(doc_cfg_hide))]

pub mod adc;
pub mod app;
pub mod buffer;
pub mod completion;
pub mod components;
pub mod config;
pub mod crc;
pub mod error;
pub mod interrupt;
pub mod pdma;
pub mod platform;
pub mod session;
pub mod verify;

#[cfg(feature = "rp2040")]
pub mod board;
#[cfg(feature = "rp2040")]
pub mod logger;
#[cfg(any(test, feature = "std"))]
pub mod sim;
