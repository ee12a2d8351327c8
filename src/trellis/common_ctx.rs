//! Cross-sub-block history shared between the four trellis states.
//!
//! Each state's path needs, when a scan position sits near a sub-block
//! boundary, the absolute levels and coded-sub-block flags of sub-blocks it
//! already finished. Copying that history every position would be quadratic,
//! so it lives here in per-state buffers that are extended only at sub-block
//! boundaries, with a current/previous pair swapped rather than copied.

use alloc::vec::Vec;

/// Buffer id meaning "no history: every earlier position is zero".
///
/// Used by paths that just started or resumed from a sub-block skip.
pub const ZERO_BUF: u8 = 4;

#[derive(Default)]
struct SbbCtx {
    /// Coded flag per sequential sub-block id.
    flags: Vec<u8>,
    /// Absolute level per scan index, saturated to 255.
    levels: Vec<u8>,
}

impl SbbCtx {
    fn reset(&mut self, num_sbb: usize, num_coeff: usize) {
        self.flags.clear();
        self.flags.resize(num_sbb, 0);
        self.levels.clear();
        self.levels.resize(num_coeff, 0);
    }
}

/// Per-state history of completed sub-blocks, double buffered.
///
/// Reads (`level`, `coded`) always address the current generation; `commit`
/// builds the next generation from the previous one after [`swap`]. A state
/// identifies its buffer by the id it held at its sub-block's entry position,
/// since the path may hop between state ids inside a sub-block.
///
/// [`swap`]: SubblockContext::swap
#[derive(Default)]
pub struct SubblockContext {
    curr: [SbbCtx; 4],
    prev: [SbbCtx; 4],
}

impl SubblockContext {
    /// Creates empty buffers; [`reset`](Self::reset) sizes them per unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears and resizes all buffers for one transform unit.
    pub fn reset(&mut self, num_sbb: usize, num_coeff: usize) {
        for b in self.curr.iter_mut().chain(self.prev.iter_mut()) {
            b.reset(num_sbb, num_coeff);
        }
    }

    /// Makes the current generation the previous one.
    pub fn swap(&mut self) {
        core::mem::swap(&mut self.curr, &mut self.prev);
    }

    /// Absolute level at `scan_idx` on the path owning buffer `buf`.
    #[inline]
    pub fn level(&self, buf: u8, scan_idx: usize) -> u32 {
        if buf == ZERO_BUF {
            0
        } else {
            self.curr[buf as usize].levels[scan_idx] as u32
        }
    }

    /// Coded flag of sub-block `sbb_id` on the path owning buffer `buf`.
    #[inline]
    pub fn coded(&self, buf: u8, sbb_id: u16) -> bool {
        buf != ZERO_BUF && self.curr[buf as usize].flags[sbb_id as usize] != 0
    }

    /// Extends buffer `to` (current generation) with the just-finished
    /// sub-block, copying the rest of the history from previous-generation
    /// buffer `from`.
    ///
    /// `in_levels` holds the finished sub-block's levels by in-sub-block
    /// position; its scan indices start at `base_scan`.
    pub fn commit(
        &mut self,
        to: usize,
        from: u8,
        sbb_id: u16,
        base_scan: usize,
        in_levels: &[u8],
        significant: bool,
    ) {
        if from == ZERO_BUF {
            self.curr[to].flags.fill(0);
            self.curr[to].levels.fill(0);
        } else {
            let src = &self.prev[from as usize];
            self.curr[to].flags.copy_from_slice(&src.flags);
            self.curr[to].levels.copy_from_slice(&src.levels);
        }
        let b = &mut self.curr[to];
        b.flags[sbb_id as usize] = significant as u8;
        b.levels[base_scan..base_scan + in_levels.len()].copy_from_slice(in_levels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_buf_reads_as_silence() {
        let mut ctx = SubblockContext::new();
        ctx.reset(4, 64);
        assert_eq!(ctx.level(ZERO_BUF, 17), 0);
        assert!(!ctx.coded(ZERO_BUF, 3));
    }

    #[test]
    fn commit_folds_finished_sub_block() {
        let mut ctx = SubblockContext::new();
        ctx.reset(4, 64);
        ctx.swap();
        ctx.commit(2, ZERO_BUF, 3, 48, &[1, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2], true);
        assert!(ctx.coded(2, 3));
        assert!(!ctx.coded(2, 2));
        assert_eq!(ctx.level(2, 48), 1);
        assert_eq!(ctx.level(2, 50), 4);
        assert_eq!(ctx.level(2, 63), 2);
        assert_eq!(ctx.level(2, 47), 0);
    }

    #[test]
    fn commit_chains_across_generations() {
        let mut ctx = SubblockContext::new();
        ctx.reset(4, 64);
        ctx.swap();
        ctx.commit(0, ZERO_BUF, 3, 48, &[9; 16], true);
        ctx.swap();
        // New generation built from buffer 0 keeps sub-block 3 and adds 2.
        ctx.commit(1, 0, 2, 32, &[7; 16], true);
        assert!(ctx.coded(1, 3) && ctx.coded(1, 2));
        assert_eq!(ctx.level(1, 48), 9);
        assert_eq!(ctx.level(1, 32), 7);
    }
}
