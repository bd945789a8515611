// SPDX-License-Identifier: Apache-2.0

//! Sample buffers for one run: the CPU-side log and the transfer engine's destination.

use core::cell::UnsafeCell;
use core::ptr;

/// Monotonic counter indicating how many samples a buffer holds
#[derive(Default, Debug, Ord, PartialOrd, Eq, PartialEq, Copy, Clone)]
pub struct SampleCounter(usize);

impl SampleCounter {
    /// Get current counter value
    pub fn get(&self) -> usize {
        self.0
    }

    /// Increment counter, saturating at [`usize::MAX`]
    pub fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// Back to zero
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Samples harvested by the foreground loop from the conversion result registers
pub struct SampleBuffer<const N: usize> {
    /// Raw results, zero past the fill level
    samples: [u32; N],
    /// Number of samples pushed since the last clear
    filled: SampleCounter,
}

impl<const N: usize> SampleBuffer<N> {
    /// Empty buffer
    pub const fn new() -> Self {
        Self {
            samples: [0; N],
            filled: SampleCounter(0),
        }
    }

    /// Reset every slot to the zero sentinel and empty the buffer
    pub fn clear(&mut self) {
        self.samples = [0; N];
        self.filled.reset();
    }

    /// Append a sample. Returns `false` (and drops the sample) when the buffer is full.
    pub fn push(&mut self, sample: u32) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples[self.filled.get()] = sample;
        self.filled.increment();
        true
    }

    /// Samples pushed since the last clear
    pub fn len(&self) -> usize {
        self.filled.get()
    }

    /// `true` if nothing was pushed since the last clear
    pub fn is_empty(&self) -> bool {
        self.filled.get() == 0
    }

    /// `true` once `N` samples were pushed
    pub fn is_full(&self) -> bool {
        self.filled.get() >= N
    }

    /// Every slot, including unfilled (zero) ones
    pub fn as_slice(&self) -> &[u32] {
        &self.samples
    }
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination of a peripheral-to-memory transfer.
///
/// The transfer engine writes the words behind [`address`](Self::address) on its own, so every
/// CPU access goes through volatile reads and writes of the cell contents and no reference to
/// the words ever exists. The CPU must only read the buffer once the channel's completion flag
/// is set.
#[repr(C, align(4))]
pub struct DmaBuffer<const N: usize> {
    words: UnsafeCell<[u32; N]>,
}

impl<const N: usize> DmaBuffer<N> {
    /// Zeroed buffer
    pub const fn new() -> Self {
        Self {
            words: UnsafeCell::new([0; N]),
        }
    }

    /// Bus address of the first word
    pub fn address(&self) -> usize {
        self.words.get() as usize
    }

    /// Reset every word to the zero sentinel
    pub fn clear(&self) {
        let base = self.words.get() as *mut u32;
        for i in 0..N {
            // SAFETY: `i < N` keeps the write inside the array owned by the cell
            unsafe { ptr::write_volatile(base.add(i), 0) };
        }
    }

    /// Read one word, `None` if out of range
    pub fn read(&self, index: usize) -> Option<u32> {
        if index >= N {
            return None;
        }
        // SAFETY: bounds checked above
        Some(unsafe { ptr::read_volatile((self.words.get() as *const u32).add(index)) })
    }

    /// Copy out every word
    pub fn snapshot(&self) -> [u32; N] {
        let mut out = [0; N];
        let base = self.words.get() as *const u32;
        for (i, word) in out.iter_mut().enumerate() {
            // SAFETY: `i < N`
            *word = unsafe { ptr::read_volatile(base.add(i)) };
        }
        out
    }
}

impl<const N: usize> Default for DmaBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
