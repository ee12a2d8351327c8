//! Trellis search for dependent quantization.
//!
//! For each scan position, descending from the last possibly-significant
//! coefficient to DC, the search evaluates every admissible level for every
//! incoming state and keeps the single best predecessor per outgoing slot.
//! Eight slots per position: four for the live states, four for paths that
//! force the current sub-block to all-zero. A backward pass over the
//! recorded decisions then emits the winning levels.
//!
//! [`DepQuant`] is a workspace: one instance per worker, reset rather than
//! reallocated across transform units. Nothing in here is shared between
//! concurrent searches.

pub mod common_ctx;
pub mod state;

use alloc::vec::Vec;

use crate::error::{InvariantViolation, QuantError};
use crate::quant::{Candidate, PreQuantizer, QuantParams};
use crate::rate::estimator::RateEstimator;
use crate::rate::RateOracle;
use crate::scan::{ScanCache, ScanGeometry, ScanInfo, NO_SBB};
use crate::tables::STATE_TRANSITION;
use crate::trellis::common_ctx::{SubblockContext, ZERO_BUF};
use crate::trellis::state::{
    bins_for, start_level_bits, CodingState, Decision, MAX_COST, PREV_NONE, PREV_START,
};
use crate::tu::TransformUnit;

/// A path that forced its whole sub-block to zero; carries only the RD cost
/// and the bin budget, no neighbor history.
#[derive(Debug, Clone, Copy)]
struct SkipSlot {
    valid: bool,
    cost: i64,
    rem_reg_bins: i32,
}

impl Default for SkipSlot {
    fn default() -> Self {
        SkipSlot {
            valid: false,
            cost: MAX_COST,
            rem_reg_bins: 0,
        }
    }
}

/// Reusable dependent-quantization workspace.
///
/// Owns the trellis table, the four live states, the sub-block history
/// buffers and the per-unit rate snapshot. All buffers are resized on first
/// use per transform shape and reused afterwards.
pub struct DepQuant {
    estimator: RateEstimator,
    sbb_ctx: SubblockContext,
    states: [CodingState; 4],
    skip: [SkipSlot; 4],
    trellis: Vec<[Decision; 8]>,
    /// Per sub-block: every raw coefficient small enough that forcing the
    /// sub-block to zero is worth evaluating.
    sbb_skippable: Vec<bool>,
    /// Per sub-block: entirely inside the zero-out region, never coded.
    sbb_forced: Vec<bool>,
}

impl Default for DepQuant {
    fn default() -> Self {
        Self::new()
    }
}

impl DepQuant {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        DepQuant {
            estimator: RateEstimator::new(),
            sbb_ctx: SubblockContext::new(),
            states: [
                CodingState::idle(0),
                CodingState::idle(1),
                CodingState::idle(2),
                CodingState::idle(3),
            ],
            skip: [SkipSlot::default(); 4],
            trellis: Vec::new(),
            sbb_skippable: Vec::new(),
            sbb_forced: Vec::new(),
        }
    }

    /// Quantizes one transform unit, writing levels into `tu.levels` and
    /// returning the sum of absolute levels.
    ///
    /// An all-zero outcome is legitimate and returns 0. Transform-skip
    /// units take the plain scalar path without the state machine.
    pub fn quantize<O: RateOracle>(
        &mut self,
        tu: &mut TransformUnit<'_>,
        oracle: &O,
        lambda: f64,
        cache: &mut ScanCache,
    ) -> Result<u64, QuantError> {
        let params = QuantParams::for_tu(tu, lambda)?;
        tu.levels.fill(0);

        if params.transform_skip {
            let pq = PreQuantizer::new(&params);
            let mut sum = 0u64;
            for (lvl, &c) in tu.levels.iter_mut().zip(tu.coeffs.iter()) {
                *lvl = pq.scalar(c);
                sum += lvl.unsigned_abs() as u64;
            }
            return Ok(sum);
        }

        let geometry = cache.get_or_build(tu.log2_w, tu.log2_h, tu.channel);
        if geometry.num_coeff != tu.coeffs.len() {
            return Err(InvariantViolation::ScanMismatch(
                "scan geometry does not match the transform size",
            )
            .into());
        }
        let coeffs = tu.coeffs;

        // Secondary-transform profiles restrict the significant region to
        // the first 8 (4x4) or 16 scan positions.
        let mut cap = geometry.num_coeff;
        if tu.lfnst_active {
            cap = cap.min(if tu.log2_w == 2 && tu.log2_h == 2 { 8 } else { 16 });
        }

        let mut start_idx: isize = -1;
        for p in (0..cap).rev() {
            let si = &geometry.info[p];
            if params.zeroed_out(si.x as usize, si.y as usize) {
                continue;
            }
            if coeffs[si.raster as usize].unsigned_abs() as i64 >= params.thres_last {
                start_idx = p as isize;
                break;
            }
        }
        if start_idx < 0 {
            return Ok(0);
        }
        let start_idx = start_idx as usize;

        self.reset_for(geometry, &params, coeffs, start_idx);
        self.estimator.build(oracle, geometry, tu.cbf);

        let pq = PreQuantizer::new(&params);
        for p in (0..=start_idx).rev() {
            self.decide_position(p, coeffs, &params, &pq, geometry);
        }

        // Terminal: the all-zero unit is the cost-0 baseline; a path wins
        // only by being strictly cheaper.
        let mut best_slot: i8 = PREV_NONE;
        let mut best_cost = 0i64;
        for slot in 0..8 {
            let d = self.trellis[0][slot];
            if d.prev_id != PREV_NONE && d.cost < best_cost {
                best_cost = d.cost;
                best_slot = slot as i8;
            }
        }
        if best_slot == PREV_NONE {
            return Ok(0);
        }

        let mut sum = 0u64;
        let mut slot = best_slot;
        let mut p = 0usize;
        loop {
            if p >= self.trellis.len() {
                return Err(InvariantViolation::BrokenChain {
                    scan_idx: p,
                    slot: slot as usize,
                }
                .into());
            }
            let d = self.trellis[p][slot as usize];
            if d.prev_id == PREV_NONE || d.cost >= MAX_COST {
                return Err(InvariantViolation::BrokenChain {
                    scan_idx: p,
                    slot: slot as usize,
                }
                .into());
            }
            if d.abs_level > 0 {
                let raster = geometry.info[p].raster as usize;
                let lvl = d.abs_level as i32;
                tu.levels[raster] = if coeffs[raster] < 0 { -lvl } else { lvl };
                sum += d.abs_level as u64;
            }
            if d.prev_id == PREV_START {
                break;
            }
            slot = d.prev_id;
            p += 1;
        }
        Ok(sum)
    }

    fn reset_for(
        &mut self,
        geometry: &ScanGeometry,
        params: &QuantParams,
        coeffs: &[i32],
        start_idx: usize,
    ) {
        self.trellis.clear();
        self.trellis.resize(start_idx + 1, [Decision::default(); 8]);
        self.sbb_ctx.reset(geometry.num_sbb, geometry.num_coeff);
        for (i, st) in self.states.iter_mut().enumerate() {
            *st = CodingState::idle(i as u8);
        }
        self.skip = [SkipSlot::default(); 4];

        self.sbb_skippable.clear();
        self.sbb_skippable.resize(geometry.num_sbb, true);
        self.sbb_forced.clear();
        self.sbb_forced.resize(geometry.num_sbb, true);
        for (p, si) in geometry.info.iter().enumerate() {
            if p > start_idx {
                break;
            }
            let sbb = si.sbb_id as usize;
            if params.zeroed_out(si.x as usize, si.y as usize) {
                continue;
            }
            self.sbb_forced[sbb] = false;
            if coeffs[si.raster as usize].unsigned_abs() as i64 > params.thres_sbb {
                self.sbb_skippable[sbb] = false;
            }
        }
    }

    /// Context index of a sub-block's coded flag on `st`'s path: 1 if the
    /// decided sub-block to the right or below was significant.
    fn sbb_flag_ctx(&self, st: &CodingState, geometry: &ScanGeometry, sbb_id: u16) -> usize {
        let adj = &geometry.sbb[sbb_id as usize];
        let mut coded = false;
        for nb in [adj.right, adj.below] {
            if nb == NO_SBB {
                continue;
            }
            if nb == st.sbb_id {
                coded |= st.num_sig_sbb > 0;
            } else {
                coded |= self.sbb_ctx.coded(st.buf_id, nb);
            }
        }
        coded as usize
    }

    /// Flag cost of `st`'s just-finished sub-block, charged when the path
    /// continues past its boundary. Inferred flags cost nothing.
    fn finish_charge(&self, st: &CodingState, geometry: &ScanGeometry) -> i64 {
        if st.sbb_implicit {
            return 0;
        }
        let ctx = self.sbb_flag_ctx(st, geometry, st.sbb_id);
        self.estimator.sig_sbb_bits[ctx][(st.num_sig_sbb > 0) as usize] as i64
    }

    fn decide_position(
        &mut self,
        p: usize,
        coeffs: &[i32],
        params: &QuantParams,
        pq: &PreQuantizer<'_>,
        geometry: &ScanGeometry,
    ) {
        let si: ScanInfo = geometry.info[p];
        let entry = si.sbb_entry;
        let forced_zero = params.zeroed_out(si.x as usize, si.y as usize);
        let abs_raw = coeffs[si.raster as usize].unsigned_abs();
        let cands: [Candidate; 4] = if forced_zero {
            [Candidate::default(); 4]
        } else {
            pq.candidates(abs_raw)
        };

        let mut row = [Decision::default(); 8];
        let consider = |row: &mut [Decision; 8], slot: usize, cost: i64, level: u32, prev: i8| {
            if cost < row[slot].cost {
                row[slot] = Decision {
                    cost,
                    abs_level: level,
                    prev_id: prev,
                };
            }
        };

        // Path start: this position is the last significant coefficient.
        // The state machine begins in state 0 there.
        if !forced_zero {
            let last_base = self
                .estimator
                .last_bits(si.x as usize, si.y as usize);
            for k in [0usize, 2] {
                let level = cands[k].abs_level as u32;
                let t = STATE_TRANSITION[0][(level & 1) as usize] as usize;
                let cost = last_base + cands[k].delta_dist + start_level_bits(level, &self.estimator);
                consider(&mut row, t, cost, level, PREV_START);
            }
        }

        // Continue from the four live states, lowest id first so cost ties
        // resolve to the lowest-index predecessor.
        for s in 0..4usize {
            if !self.states[s].valid || self.states[s].rd_cost >= MAX_COST {
                continue;
            }
            let charge = if entry {
                self.finish_charge(&self.states[s], geometry)
            } else {
                0
            };
            let st = &self.states[s];
            let base = st.rd_cost + charge;
            if forced_zero {
                let t = STATE_TRANSITION[s][0] as usize;
                consider(&mut row, t, base, 0, s as i8);
                continue;
            }
            let ctx = st.ctx(&si, geometry, &self.sbb_ctx);
            let t0 = STATE_TRANSITION[s][0] as usize;
            consider(
                &mut row,
                t0,
                base + st.level_bits(0, &ctx, &self.estimator),
                0,
                s as i8,
            );
            // From state s only quantization indices of parity s >> 1 are
            // representable: candidate slots s>>1 and 2 + (s>>1).
            for k in [s >> 1, 2 + (s >> 1)] {
                let level = cands[k].abs_level as u32;
                let t = STATE_TRANSITION[s][(level & 1) as usize] as usize;
                let cost =
                    base + cands[k].delta_dist + st.level_bits(level, &ctx, &self.estimator);
                consider(&mut row, t, cost, level, s as i8);
            }
        }

        // Resume from sub-block-skip paths; only possible at the first
        // position of the next sub-block, with a silenced neighbor history.
        if entry && !forced_zero {
            for s in 0..4usize {
                if !self.skip[s].valid {
                    continue;
                }
                let mut ghost = CodingState::idle(s as u8);
                ghost.sbb_id = u16::MAX;
                ghost.rem_reg_bins = self.skip[s].rem_reg_bins;
                let ctx = ghost.ctx(&si, geometry, &self.sbb_ctx);
                let base = self.skip[s].cost;
                let t0 = STATE_TRANSITION[s][0] as usize;
                consider(
                    &mut row,
                    t0,
                    base + ghost.level_bits(0, &ctx, &self.estimator),
                    0,
                    (4 + s) as i8,
                );
                for k in [s >> 1, 2 + (s >> 1)] {
                    let level = cands[k].abs_level as u32;
                    let t = STATE_TRANSITION[s][(level & 1) as usize] as usize;
                    let cost = base
                        + cands[k].delta_dist
                        + ghost.level_bits(level, &ctx, &self.estimator);
                    consider(&mut row, t, cost, level, (4 + s) as i8);
                }
            }
        }

        // Skip slots: create at sub-block entries, self-chain in between.
        let sbb = si.sbb_id as usize;
        let may_skip =
            entry && si.sbb_id != 0 && self.sbb_skippable[sbb] && !self.sbb_forced[sbb];
        if may_skip {
            let flag0 = |ctx: usize| self.estimator.sig_sbb_bits[ctx][0] as i64;
            for s in 0..4usize {
                if self.states[s].valid && self.states[s].rd_cost < MAX_COST {
                    let st = &self.states[s];
                    let ctx = self.sbb_flag_ctx(st, geometry, si.sbb_id);
                    let cost = st.rd_cost + self.finish_charge(st, geometry) + flag0(ctx);
                    consider(&mut row, 4 + s, cost, 0, s as i8);
                }
                if self.skip[s].valid {
                    // A path that already skipped the sub-block above sees
                    // no significant neighbors.
                    let cost = self.skip[s].cost + flag0(0);
                    consider(&mut row, 4 + s, cost, 0, (4 + s) as i8);
                }
            }
        } else if entry && self.sbb_forced[sbb] {
            // A fully zeroed-out sub-block costs nothing to traverse; paths
            // that skipped an earlier sub-block stay alive across it so they
            // can resume (or skip again) further down the scan.
            for s in 0..4usize {
                if self.skip[s].valid {
                    row[4 + s] = Decision {
                        cost: self.skip[s].cost,
                        abs_level: 0,
                        prev_id: (4 + s) as i8,
                    };
                }
            }
        } else if !entry {
            for s in 0..4usize {
                if self.skip[s].valid {
                    row[4 + s] = Decision {
                        cost: self.skip[s].cost,
                        abs_level: 0,
                        prev_id: (4 + s) as i8,
                    };
                }
            }
        }

        self.update_states(&si, &row, params, geometry, forced_zero, entry);
        self.trellis[p] = row;
    }

    fn update_states(
        &mut self,
        si: &ScanInfo,
        row: &[Decision; 8],
        params: &QuantParams,
        geometry: &ScanGeometry,
        forced_zero: bool,
        entry: bool,
    ) {
        if entry {
            self.sbb_ctx.swap();
        }
        let prev_states = self.states.clone();
        let prev_skip = self.skip;
        let sbb_size = geometry.sbb_size;
        let in_pos = si.in_sbb_pos as usize;
        let implicit_here = si.sbb_id == 0 || self.sbb_forced[si.sbb_id as usize];

        for t in 0..4usize {
            let d = row[t];
            if d.prev_id == PREV_NONE || d.cost >= MAX_COST {
                self.states[t] = CodingState::idle(t as u8);
                continue;
            }
            let level = d.abs_level;
            let mut ns = CodingState::idle(t as u8);
            ns.valid = true;
            ns.rd_cost = d.cost;
            ns.sbb_id = si.sbb_id;
            ns.abs_in_sbb[in_pos] = level.min(255) as u8;
            ns.num_sig_sbb = (level > 0) as u8;

            match d.prev_id {
                PREV_START => {
                    ns.rem_reg_bins =
                        params.reg_bins_budget() - bins_for(i32::MAX, level, true);
                    ns.buf_id = ZERO_BUF;
                    ns.sbb_implicit = true;
                }
                s @ 0..=3 => {
                    let pred = &prev_states[s as usize];
                    let bins = if forced_zero {
                        0
                    } else {
                        pred.bins_used(level, false)
                    };
                    ns.rem_reg_bins = pred.rem_reg_bins - bins;
                    if entry {
                        self.sbb_ctx.commit(
                            t,
                            pred.buf_id,
                            pred.sbb_id,
                            pred.sbb_id as usize * sbb_size,
                            &pred.abs_in_sbb[..sbb_size],
                            pred.num_sig_sbb > 0,
                        );
                        ns.buf_id = t as u8;
                        ns.sbb_implicit = implicit_here;
                    } else {
                        ns.buf_id = pred.buf_id;
                        ns.sbb_implicit = pred.sbb_implicit;
                        ns.abs_in_sbb = pred.abs_in_sbb;
                        ns.abs_in_sbb[in_pos] = level.min(255) as u8;
                        ns.num_sig_sbb = pred.num_sig_sbb + (level > 0) as u8;
                    }
                }
                sk => {
                    // Resumed from a skip: history is silence.
                    let slot = &prev_skip[(sk - 4) as usize];
                    ns.rem_reg_bins =
                        slot.rem_reg_bins - bins_for(slot.rem_reg_bins, level, false);
                    ns.buf_id = ZERO_BUF;
                    ns.sbb_implicit = implicit_here;
                }
            }
            self.states[t] = ns;
        }

        if entry {
            let mut new_skip = [SkipSlot::default(); 4];
            for s in 0..4usize {
                let d = row[4 + s];
                if d.prev_id == PREV_NONE || d.cost >= MAX_COST {
                    continue;
                }
                let budget = if d.prev_id >= 4 {
                    prev_skip[s].rem_reg_bins
                } else {
                    prev_states[d.prev_id as usize].rem_reg_bins
                };
                new_skip[s] = SkipSlot {
                    valid: true,
                    cost: d.cost,
                    rem_reg_bins: budget,
                };
            }
            self.skip = new_skip;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::UniformRateOracle;
    use crate::tu::{ChannelType, TransformUnit};

    fn quantize_4x4(coeffs: &[i32; 16], qp: i32, lambda: f64) -> ([i32; 16], u64) {
        let mut levels = [0i32; 16];
        let mut tu =
            TransformUnit::new(coeffs, &mut levels, 2, 2, ChannelType::Luma, qp, 10).unwrap();
        let mut dq = DepQuant::new();
        let mut cache = ScanCache::new();
        let sum = dq
            .quantize(&mut tu, &UniformRateOracle, 16.0 * lambda, &mut cache)
            .unwrap();
        (levels, sum)
    }

    #[test]
    fn all_zero_input_stays_zero() {
        let (levels, sum) = quantize_4x4(&[0; 16], 27, 1.0);
        assert_eq!(sum, 0);
        assert_eq!(levels, [0; 16]);
    }

    #[test]
    fn single_dc_coefficient_survives() {
        let mut coeffs = [0i32; 16];
        coeffs[0] = 3000;
        let (levels, sum) = quantize_4x4(&coeffs, 27, 1.0);
        assert!(sum > 0, "large DC coefficient must not be dropped");
        assert_ne!(levels[0], 0);
        assert!(levels[1..].iter().all(|&l| l == 0));
    }

    #[test]
    fn sign_is_carried_from_the_input() {
        let mut coeffs = [0i32; 16];
        coeffs[0] = -3000;
        let (levels, _) = quantize_4x4(&coeffs, 27, 1.0);
        assert!(levels[0] < 0, "negative coefficient must keep its sign");
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let coeffs: [i32; 16] = [
            812, -400, 205, -97, 388, 51, -180, 23, 144, -66, 90, 12, -30, 77, -5, 9,
        ];
        let a = quantize_4x4(&coeffs, 30, 1.0);
        let b = quantize_4x4(&coeffs, 30, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn skip_paths_survive_zeroed_out_sub_blocks() {
        // 64x64: the diagonal sub-block scan interleaves coded groups inside
        // the 32-sample edge with fully zeroed-out ones. Once a path has
        // skipped a coded group, it must stay alive while the scan crosses a
        // zeroed-out group, so it can resume (or keep skipping) further down.
        let n = 64 * 64;
        let mut coeffs = alloc::vec![0i32; n];
        for y in 0..32usize {
            for x in 0..32usize {
                coeffs[y * 64 + x] = 8;
            }
        }
        // Deepest coded group holds the only coefficient large enough to
        // open a path; everything else stays below the group-skip threshold.
        coeffs[31 * 64 + 31] = 2000;
        let mut levels = alloc::vec![0i32; n];
        let mut tu =
            TransformUnit::new(&coeffs, &mut levels, 6, 6, ChannelType::Luma, 63, 10).unwrap();
        let mut dq = DepQuant::new();
        let mut cache = ScanCache::new();
        dq.quantize(&mut tu, &UniformRateOracle, 1.0, &mut cache)
            .unwrap();

        let geom = ScanGeometry::build(6, 6, ChannelType::Luma);
        let forced = |id: u16| {
            let s = &geom.sbb[id as usize];
            s.sx >= 8 || s.sy >= 8
        };
        let alive = |row: &[Decision; 8]| row[4..8].iter().any(|d| d.prev_id != PREV_NONE);

        let mut skip_created = false;
        let mut forced_crossed = false;
        for p in (0..dq.trellis.len()).rev() {
            let si = &geom.info[p];
            if !si.sbb_entry {
                continue;
            }
            if forced(si.sbb_id) {
                if skip_created {
                    assert!(
                        alive(&dq.trellis[p]),
                        "skip paths died entering zeroed-out group {}",
                        si.sbb_id
                    );
                    forced_crossed = true;
                }
            } else if alive(&dq.trellis[p]) {
                skip_created = true;
            }
        }
        assert!(
            skip_created && forced_crossed,
            "scan never interleaved skippable and zeroed-out groups"
        );
    }
}
