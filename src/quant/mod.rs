//! Per-transform-unit quantization parameters and scalar pre-quantization.
//!
//! [`QuantParams`] derives, once per transform unit, the fixed-point shift,
//! scale and rounding constants plus the two zero-out thresholds. The
//! rate-distortion lambda is folded into the distortion scale here so the
//! trellis can compare `distortion + rate` as plain `i64` values.
//!
//! [`PreQuantizer`] turns one raw absolute coefficient into the four
//! candidate (level, delta-distortion) pairs the trellis evaluates: four
//! consecutive quantization indices around the scalar rounding point, one
//! per residue mod 4, so both quantizers and both level parities are always
//! represented.

pub mod dequant;

use crate::error::ConfigError;
use crate::tables::{
    INV_QUANT_SCALES, MAX_LOG2_TR_DYNAMIC_RANGE, QUANT_SCALES, ZERO_OUT_EDGE,
};
use crate::tu::TransformUnit;

/// Largest admissible QP (after slice/CU deltas and bit-depth offset).
pub const MAX_QP: i32 = 63;

/// Minimum effective QP for transform-skip blocks; lower values would expand
/// the residual instead of compressing it.
const TS_MIN_QP: i32 = 4;

/// Shift that may be negative: `v >> s` for `s >= 0`, `v << -s` otherwise.
#[inline]
fn shr(v: i64, s: i32) -> i64 {
    if s >= 0 {
        v >> s
    } else {
        v << (-s)
    }
}

/// `2^k` as f64 for |k| < 62.
#[inline]
fn pow2(k: i32) -> f64 {
    if k >= 0 {
        (1u64 << k) as f64
    } else {
        1.0 / ((1u64 << (-k)) as f64)
    }
}

/// One candidate produced by [`PreQuantizer::candidates`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Candidate {
    /// Absolute quantized level.
    pub abs_level: i32,
    /// Distortion change relative to coding this coefficient as zero, in the
    /// lambda-scaled RD unit system (same units as fractional-bit rate).
    pub delta_dist: i64,
}

/// Fixed-point constants for one transform unit.
#[derive(Debug, Clone)]
pub struct QuantParams {
    /// Forward scale for the `qp % 6` class.
    pub q_scale: i32,
    /// Forward shift; may be negative for extreme bit depths.
    pub q_shift: i32,
    /// Forward rounding term, `-(2^q_shift / 2)` as in the reference design:
    /// the four upward candidate indices then bracket the rounding point.
    pub q_add: i64,
    /// Largest representable quantization index.
    pub max_q_idx: i32,
    /// Raw-coefficient magnitude below which a position cannot be the last
    /// significant coefficient.
    pub thres_last: i64,
    /// Raw-coefficient magnitude below which a whole sub-block of such
    /// coefficients can be forced to zero.
    pub thres_sbb: i64,
    /// Inverse (level) scale including the `qp / 6` power of two.
    pub inv_scale: i64,
    /// Dequantization down-shift.
    pub bd_shift: i32,
    /// Reconstruction clamp: `[-(1 << max_log2), (1 << max_log2) - 1]`.
    pub max_log2_dyn_range: u32,
    /// Effective (non-zeroed-out) width.
    pub effect_w: usize,
    /// Effective (non-zeroed-out) height.
    pub effect_h: usize,
    /// Transform-skip unit: plain scalar quantization, no state machine.
    pub transform_skip: bool,
    /// Scales squared error in the scaled-coefficient domain into RD units.
    dist_factor: f64,
}

impl QuantParams {
    /// Derives the constants for one transform unit.
    ///
    /// `lambda` is the rate-distortion trade-off weight; it is folded into
    /// the distortion scale, so larger lambda makes rate relatively more
    /// expensive.
    pub fn new(
        qp: i32,
        log2_w: u8,
        log2_h: u8,
        bit_depth: u8,
        transform_skip: bool,
        lambda: f64,
    ) -> Result<Self, ConfigError> {
        if log2_w < 1 || log2_h < 1 {
            return Err(ConfigError::BadBlockSize {
                width: 1u32 << log2_w,
                height: 1u32 << log2_h,
            });
        }
        if qp < 0 || qp > MAX_QP {
            return Err(ConfigError::QpOutOfRange { qp, max: MAX_QP });
        }
        if !(8..=16).contains(&bit_depth) {
            return Err(ConfigError::BadBitDepth(bit_depth));
        }
        if !(lambda > 0.0) || !lambda.is_finite() {
            return Err(ConfigError::BadLambda(lambda));
        }

        let w = 1usize << log2_w;
        let h = 1usize << log2_h;
        let sum = (log2_w + log2_h) as i32;
        let needs_sqrt2 = !transform_skip && (sum & 1) == 1;
        let sq2 = needs_sqrt2 as usize;

        // Dependent quantization halves the effective step of the two
        // interleaved quantizers, expressed as a +1 QP offset.
        let qp_eff = if transform_skip {
            qp.max(TS_MIN_QP)
        } else {
            qp + 1
        };
        let per = qp_eff / 6;
        let rem = (qp_eff % 6) as usize;

        let q_scale = QUANT_SCALES[sq2][rem];
        let inv_scale = (INV_QUANT_SCALES[sq2][rem] as i64) << per;

        // Dequant shift: bit depth and transform normalization, one bit
        // regained by the half-step index granularity. Transform-skip
        // residuals are not transform-normalized and use a flat shift.
        let bd_shift = if transform_skip {
            10
        } else {
            bit_depth as i32 + (sum >> 1) + needs_sqrt2 as i32 - 4
        };
        // Forward shift chosen so that forward and inverse scaling invert:
        // q_scale * inv_quant_scale ~= 2^20.
        let q_shift = 20 + per - bd_shift;
        let q_add = -(shr(1, -q_shift) >> 1);

        let max_q_idx = (1i32 << 16) - 2;
        let one_step = shr(1, -q_shift); // 2^q_shift
        let thres_last = (one_step / q_scale as i64).max(1);
        let thres_sbb = ((3 * one_step) / (4 * q_scale as i64)).max(1);

        // Distortion normalization: squared error is measured in the
        // (coeff * q_scale) domain, mapped to the pixel domain through the
        // transform gain, then divided by lambda and expressed in the same
        // 2^15-per-bit units as the rate estimate.
        let ts_shift = MAX_LOG2_TR_DYNAMIC_RANGE as i32 - bit_depth as i32 - (sum >> 1);
        let qs = q_scale as f64;
        let dist_factor = pow2(15 - 2 * ts_shift) / (lambda * qs * qs);

        let (effect_w, effect_h) = if transform_skip {
            (w, h)
        } else {
            (w.min(ZERO_OUT_EDGE), h.min(ZERO_OUT_EDGE))
        };

        Ok(QuantParams {
            q_scale,
            q_shift,
            q_add,
            max_q_idx,
            thres_last,
            thres_sbb,
            inv_scale,
            bd_shift,
            max_log2_dyn_range: MAX_LOG2_TR_DYNAMIC_RANGE,
            effect_w,
            effect_h,
            transform_skip,
            dist_factor,
        })
    }

    /// Derives the constants for the unit `tu` describes.
    pub fn for_tu(tu: &TransformUnit<'_>, lambda: f64) -> Result<Self, ConfigError> {
        Self::new(
            tu.qp,
            tu.log2_w,
            tu.log2_h,
            tu.bit_depth,
            tu.transform_skip,
            lambda,
        )
    }

    /// True if the raster position is inside the zeroed-out high-frequency
    /// region of a large block.
    #[inline]
    pub fn zeroed_out(&self, x: usize, y: usize) -> bool {
        x >= self.effect_w || y >= self.effect_h
    }

    /// Context-coded-bin budget for the whole unit.
    #[inline]
    pub fn reg_bins_budget(&self) -> i32 {
        use crate::tables::{REG_BINS_NUM, REG_BINS_SHIFT};
        (((self.effect_w * self.effect_h) as u32 * REG_BINS_NUM) >> REG_BINS_SHIFT) as i32
    }

    /// Distortion delta, in RD units, for reconstructing at quantization
    /// index `q_idx` instead of zero. `scaled_org` is `abs_coeff * q_scale`.
    #[inline]
    fn delta_dist(&self, scaled_org: i64, q_idx: i64) -> i64 {
        let err = scaled_org - shr(q_idx, -self.q_shift);
        let d = (err * err - scaled_org * scaled_org) as f64 * self.dist_factor;
        d as i64
    }
}

/// Produces the four candidate levels for one coefficient magnitude.
#[derive(Debug)]
pub struct PreQuantizer<'a> {
    params: &'a QuantParams,
}

impl<'a> PreQuantizer<'a> {
    /// Borrows the per-unit constants.
    #[inline]
    pub fn new(params: &'a QuantParams) -> Self {
        Self { params }
    }

    /// Four (level, delta-distortion) candidates for `abs_coeff`, indexed by
    /// quantization-index residue mod 4.
    ///
    /// `abs_coeff` must stay within the profile dynamic range; that bound is
    /// the caller's contract and keeps every product inside `i64`.
    #[inline]
    pub fn candidates(&self, abs_coeff: u32) -> [Candidate; 4] {
        let p = self.params;
        let scaled_org = abs_coeff as i64 * p.q_scale as i64;
        let base = shr(scaled_org + p.q_add, p.q_shift)
            .clamp(1, p.max_q_idx as i64);

        let mut out = [Candidate::default(); 4];
        for k in 0..4i64 {
            let q_idx = base + k;
            let slot = (q_idx & 3) as usize;
            out[slot] = Candidate {
                abs_level: ((q_idx + 1) >> 1) as i32,
                delta_dist: p.delta_dist(scaled_org, q_idx),
            };
        }
        out
    }

    /// Plain scalar quantization for the transform-skip path.
    ///
    /// Without the dependent +1 QP offset one quantization index is one
    /// level, so this rounds straight to the nearest index.
    #[inline]
    pub fn scalar(&self, coeff: i32) -> i32 {
        let p = self.params;
        let sign = coeff < 0;
        let abs = coeff.unsigned_abs() as i64 * p.q_scale as i64;
        let half = shr(1, -p.q_shift) >> 1;
        let level = shr(abs + half, p.q_shift)
            .clamp(0, (p.max_q_idx >> 1) as i64) as i32;
        if sign {
            -level
        } else {
            level
        }
    }
}
