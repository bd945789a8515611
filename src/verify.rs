// SPDX-License-Identifier: Apache-2.0

//! Cross-check of CPU-observed samples against DMA-delivered samples.

/// One differing index, with both raw values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mismatch {
    /// Position in the run
    pub index: usize,
    /// Value the foreground loop read from the result register, `None` past the end of the CPU
    /// buffer
    pub cpu: Option<u32>,
    /// Raw value the transfer engine delivered, `None` past the end of the DMA buffer
    pub dma: Option<u32>,
}

/// Iterator over every index where `cpu & mask` and `dma & mask` differ.
///
/// The mask strips the metadata bits the transfer element carries beside the conversion result.
/// It is applied to both sides, so a mask of `0` compares nothing. If the buffers differ in
/// length every unmatched tail element is reported.
pub fn mismatches<'a>(
    cpu: &'a [u32],
    dma: &'a [u32],
    mask: u32,
) -> impl Iterator<Item = Mismatch> + 'a {
    let len = cpu.len().max(dma.len());
    (0..len).filter_map(move |index| {
        let c = cpu.get(index).copied();
        let d = dma.get(index).copied();
        match (c, d) {
            (Some(c), Some(d)) if c & mask == d & mask => None,
            _ => Some(Mismatch {
                index,
                cpu: c,
                dma: d,
            }),
        }
    })
}

/// Number of mismatching indices. Zero means the run passed.
pub fn compare(cpu: &[u32], dma: &[u32], mask: u32) -> u32 {
    mismatches(cpu, dma, mask).count() as u32
}
