//! Per-state bookkeeping for the trellis search.
//!
//! Exactly four [`CodingState`] values are alive at any scan position; each
//! carries the running RD cost of the best path ending in that state plus
//! everything needed to derive the next position's coding contexts: the
//! levels decided inside the current sub-block, the regular-bin budget, and
//! the sub-block significance count.

use crate::rate::estimator::RateEstimator;
use crate::rate::BYPASS_BIT;
use crate::scan::{ScanGeometry, ScanInfo};
use crate::tables::{GO_RICE_PARS, REG_BINS_FLOOR, SBB_SIZE};
use crate::trellis::common_ctx::{SubblockContext, ZERO_BUF};

/// Predecessor sentinel: the path begins at this position (it is the last
/// significant coefficient).
pub const PREV_START: i8 = -1;

/// Predecessor sentinel: no path reaches this slot.
pub const PREV_NONE: i8 = -2;

/// Cost sentinel for unreachable decisions; far below `i64::MAX` so sums
/// with real costs cannot wrap.
pub const MAX_COST: i64 = i64::MAX >> 8;

/// One entry of the trellis table: the winning way to reach a slot at one
/// scan position.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    /// Accumulated RD cost of the path ending here.
    pub cost: i64,
    /// Absolute level chosen for this position.
    pub abs_level: u32,
    /// Slot at the next-higher scan position this chains from, or a sentinel.
    pub prev_id: i8,
}

impl Default for Decision {
    fn default() -> Self {
        Decision {
            cost: MAX_COST,
            abs_level: 0,
            prev_id: PREV_NONE,
        }
    }
}

/// Coding contexts of one position as seen from one state's path.
#[derive(Debug, Clone, Copy)]
pub struct LevelCtx {
    /// Significance-flag context index.
    pub sig: usize,
    /// Greater-than-x / parity context index.
    pub gtx: usize,
    /// Golomb-Rice parameter for the remainder.
    pub rice: u32,
}

/// One of the four live trellis states.
#[derive(Debug, Clone)]
pub struct CodingState {
    /// State id, 0..4. Ids 0 and 1 quantize with Q0, 2 and 3 with Q1.
    pub id: u8,
    /// A path currently ends in this state.
    pub valid: bool,
    /// Running RD cost of that path.
    pub rd_cost: i64,
    /// Remaining context-coded-bin budget on this path.
    pub rem_reg_bins: i32,
    /// Significant positions decided inside the current sub-block.
    pub num_sig_sbb: u8,
    /// Sequential id of the sub-block this path is currently inside.
    pub sbb_id: u16,
    /// History buffer in [`SubblockContext`]; the state id this path held at
    /// the current sub-block's entry, or [`ZERO_BUF`].
    pub buf_id: u8,
    /// The current sub-block's coded flag is inferred on this path (DC
    /// sub-block, or the path's last-significant position lies inside it).
    pub sbb_implicit: bool,
    /// Levels decided in the current sub-block, by in-sub-block position.
    pub abs_in_sbb: [u8; SBB_SIZE],
}

impl CodingState {
    /// An invalid state with the given id.
    pub fn idle(id: u8) -> Self {
        CodingState {
            id,
            valid: false,
            rd_cost: MAX_COST,
            rem_reg_bins: 0,
            num_sig_sbb: 0,
            sbb_id: 0,
            buf_id: ZERO_BUF,
            sbb_implicit: false,
            abs_in_sbb: [0; SBB_SIZE],
        }
    }

    /// Level decided at scan index `scan_idx` on this path. The index must
    /// be above the position currently being decided.
    #[inline]
    fn decided_level(&self, scan_idx: usize, geom: &ScanGeometry, sbb: &SubblockContext) -> u32 {
        let si = &geom.info[scan_idx];
        if si.sbb_id == self.sbb_id {
            self.abs_in_sbb[si.in_sbb_pos as usize] as u32
        } else {
            sbb.level(self.buf_id, scan_idx)
        }
    }

    /// Derives the coding contexts of position `si` from this path's
    /// neighbor template.
    pub fn ctx(&self, si: &ScanInfo, geom: &ScanGeometry, sbb: &SubblockContext) -> LevelCtx {
        let mut sum_abs = 0u32;
        let mut sum_abs1 = 0u32;
        let mut sum_gt1 = 0u32;

        for k in 0..si.nb_in.num as usize {
            let lvl = self.abs_in_sbb[si.nb_in.off[k] as usize] as u32;
            sum_abs += lvl;
            sum_abs1 += lvl.min(5);
            sum_gt1 += (lvl > 1) as u32;
        }
        for k in 0..si.nb_out.num as usize {
            let n_scan = geom.scan_of_raster[si.nb_out.raster[k] as usize] as usize;
            let lvl = self.decided_level(n_scan, geom, sbb);
            sum_abs += lvl;
            sum_abs1 += lvl.min(5);
            sum_gt1 += (lvl > 1) as u32;
        }

        let bank = if geom.channel.is_chroma() { 8 } else { 12 };
        let bank_idx = (self.id as usize).saturating_sub(1);
        LevelCtx {
            sig: si.sig_region as usize + (((sum_abs1 + 1) >> 1) as usize).min(3) + bank * bank_idx,
            gtx: si.gtx_region as usize + (sum_gt1 as usize).min(4),
            rice: GO_RICE_PARS[sum_abs.min(31) as usize] as u32,
        }
    }

    /// Rate, in fractional bits, of coding absolute level `level` at a
    /// non-last position on this path.
    ///
    /// With the regular-bin budget exhausted the whole level is one
    /// Golomb-Rice codeword with the zero-position remap; otherwise the
    /// usual sig / gt1 / parity / gt3 / remainder split applies. The sign
    /// is a bypass bin either way.
    pub fn level_bits(&self, level: u32, ctx: &LevelCtx, est: &RateEstimator) -> i64 {
        if self.rem_reg_bins < REG_BINS_FLOOR {
            let pos0 = (if self.id < 2 { 1u32 } else { 2 }) << ctx.rice;
            let coded = if level == 0 {
                pos0
            } else if level <= pos0 {
                level - 1
            } else {
                level
            };
            let mut bits = est.remainder_bits(coded, ctx.rice) as i64;
            if level > 0 {
                bits += BYPASS_BIT as i64;
            }
            return bits;
        }
        if level == 0 {
            return est.sig_bits[ctx.sig][0] as i64;
        }
        let mut bits = est.sig_bits[ctx.sig][1] as i64 + BYPASS_BIT as i64;
        bits += est.gt1_bits[ctx.gtx][(level > 1) as usize] as i64;
        if level > 1 {
            bits += est.par_bits[ctx.gtx][((level - 2) & 1) as usize] as i64;
            bits += est.gt2_bits[ctx.gtx][(level > 3) as usize] as i64;
            if level > 3 {
                bits += est.remainder_bits((level - 4) >> 1, ctx.rice) as i64;
            }
        }
        bits
    }

    /// Regular-context bins a decision consumes on this path.
    #[inline]
    pub fn bins_used(&self, level: u32, first: bool) -> i32 {
        bins_for(self.rem_reg_bins, level, first)
    }
}

/// Regular-context bins consumed by coding `level` under `budget`: one for
/// the significance flag, one more for gt1, two more for parity and gt3.
/// Zero once the budget is below the floor (all bins are bypass then), and
/// one less at a path's first position (no significance flag).
#[inline]
pub fn bins_for(budget: i32, level: u32, first: bool) -> i32 {
    if budget < REG_BINS_FLOOR {
        return 0;
    }
    let n = match level {
        0 => 1,
        1 => 2,
        _ => 4,
    };
    n - first as i32
}

/// Rate of a path's first coefficient (the last significant one): no
/// significance flag, reserved contexts, sign as bypass.
pub fn start_level_bits(level: u32, est: &RateEstimator) -> i64 {
    let mut bits = BYPASS_BIT as i64;
    bits += est.gt1_bits[0][(level > 1) as usize] as i64;
    if level > 1 {
        bits += est.par_bits[0][((level - 2) & 1) as usize] as i64;
        bits += est.gt2_bits[0][(level > 3) as usize] as i64;
        if level > 3 {
            bits += est.remainder_bits((level - 4) >> 1, 0) as i64;
        }
    }
    bits
}
