// SPDX-License-Identifier: Apache-2.0

//! Completion handshake between the transfer-done interrupt and the foreground loop, plus the
//! bounded busy-wait used at every blocking point.
//!
//! Each channel has a one-shot latch: the foreground resets it to
//! [`Pending`](CompletionState::Pending) before a run, the interrupt handler sets it to
//! [`Done`](CompletionState::Done), the foreground polls it.

use core::cell::Cell;

use critical_section::Mutex;
use log::{debug, warn};

use crate::{
    error::{PipelineError, Result, WaitStage},
    pdma::{Channel, MAX_CHANNELS},
    platform::Platform,
};

/// State of one channel's completion latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompletionState {
    /// Reset before the run, transfer not observed complete yet
    Pending,
    /// Transfer-done interrupt seen for this channel
    Done,
}

/// Per-channel completion latches, shared by reference between the interrupt handler and the
/// foreground loop
pub struct CompletionFlags {
    channels: [Mutex<Cell<CompletionState>>; MAX_CHANNELS],
}

impl CompletionFlags {
    /// Initial value of each latch
    #[allow(clippy::declare_interior_mutable_const)]
    const PENDING: Mutex<Cell<CompletionState>> = Mutex::new(Cell::new(CompletionState::Pending));

    /// Every channel pending. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            channels: [Self::PENDING; MAX_CHANNELS],
        }
    }

    /// Reset `channel` to pending. Foreground only, before each run.
    pub fn reset(&self, channel: Channel) {
        critical_section::with(|cs| {
            self.latch(channel)
                .borrow(cs)
                .set(CompletionState::Pending)
        });
    }

    /// Mark `channel` done. Interrupt handler only.
    pub fn signal(&self, channel: Channel) {
        critical_section::with(|cs| self.latch(channel).borrow(cs).set(CompletionState::Done));
    }

    /// Current state of `channel`
    pub fn state(&self, channel: Channel) -> CompletionState {
        critical_section::with(|cs| self.latch(channel).borrow(cs).get())
    }

    /// `true` once `channel` was signalled since its last reset
    pub fn is_done(&self, channel: Channel) -> bool {
        self.state(channel) == CompletionState::Done
    }

    /// Busy-wait until `channel` is done
    pub fn wait<P: Platform>(
        &self,
        channel: Channel,
        limit: SpinLimit,
        stage: WaitStage,
        platform: &mut P,
    ) -> Result<()> {
        spin_until(limit, stage, platform, || self.is_done(channel))
    }

    fn latch(&self, channel: Channel) -> &Mutex<Cell<CompletionState>> {
        &self.channels[channel.index() as usize]
    }
}

impl Default for CompletionFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Iteration budget of a busy-wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpinLimit {
    /// Spin forever
    Unbounded,
    /// Give up after this many polls
    Iterations(u32),
}

/// Poll `ready` until it returns `true`, relaxing the platform between polls.
///
/// Fails with [`PipelineError::HardwareTimeout`] once `limit` polls have failed, and with
/// [`PipelineError::Cancelled`] as soon as the platform requests cancellation.
pub fn spin_until<P, F>(limit: SpinLimit, stage: WaitStage, platform: &mut P, mut ready: F) -> Result<()>
where
    P: Platform,
    F: FnMut() -> bool,
{
    let mut polls: u32 = 0;
    loop {
        if ready() {
            if polls > 0 {
                debug!("wait for {} satisfied after {} polls", stage, polls);
            }
            return Ok(());
        }
        if platform.cancel_requested() {
            warn!("wait for {} cancelled", stage);
            return Err(PipelineError::Cancelled { stage });
        }
        if let SpinLimit::Iterations(max) = limit {
            if polls >= max {
                warn!("wait for {} gave up after {} polls", stage, polls);
                return Err(PipelineError::HardwareTimeout { stage });
            }
        }
        polls = polls.saturating_add(1);
        platform.relax();
    }
}
