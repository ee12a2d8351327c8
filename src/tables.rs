//! Conformance constant tables for dependent quantization.
//!
//! Every table in this module is mandated by the VVC (H.266) residual coding
//! design. The values are preserved verbatim; changing any of them is a
//! conformance bug, not a tuning knob.

/// Fixed-point precision of the forward quantization scales.
pub const QUANT_SHIFT: u32 = 14;

/// Fixed-point precision of the inverse quantization (level) scales.
pub const IQUANT_SHIFT: u32 = 6;

/// Maximum log2 dynamic range of transform coefficients.
pub const MAX_LOG2_TR_DYNAMIC_RANGE: u32 = 15;

/// Forward quantization scales indexed by `[needs_sqrt2][qp % 6]`.
///
/// Row 1 is row 0 divided by sqrt(2), used when `log2_w + log2_h` is odd and
/// the transform normalization leaves a residual sqrt(2) factor.
pub const QUANT_SCALES: [[i32; 6]; 2] = [
    [26214, 23302, 20560, 18396, 16384, 14564],
    [18396, 16384, 14564, 13107, 11651, 10280],
];

/// Inverse quantization (level) scales indexed by `[needs_sqrt2][qp % 6]`.
pub const INV_QUANT_SCALES: [[i32; 6]; 2] = [
    [40, 45, 51, 57, 64, 72],
    [57, 64, 72, 80, 90, 102],
];

/// Dependent-quantization state transitions: `STATE_TRANSITION[state][level & 1]`.
///
/// States 0 and 1 use quantizer Q0, states 2 and 3 use Q1 (reconstruction
/// offset `state >> 1`). The table is total: every (state, parity) pair maps
/// back into `0..4`.
pub const STATE_TRANSITION: [[u8; 2]; 4] = [[0, 2], [2, 0], [1, 3], [3, 1]];

/// Golomb-Rice parameter from the clipped sum of neighboring absolute levels.
pub const GO_RICE_PARS: [u8; 32] = [
    0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
];

/// Context-coded-bin budget ratio: `(width * height * REG_BINS_NUM) >> REG_BINS_SHIFT`
/// regular bins per transform block. Worst-case CABAC throughput constraint.
pub const REG_BINS_NUM: u32 = 7;
/// See [`REG_BINS_NUM`].
pub const REG_BINS_SHIFT: u32 = 2;

/// Once a state's remaining regular-bin budget drops below this, all later
/// coefficient bins on that path are bypass (Golomb-Rice only) coded.
pub const REG_BINS_FLOOR: i32 = 4;

/// Side length of a coefficient sub-block (coding group).
pub const SBB_LOG2: u8 = 2;
/// Number of coefficients in one sub-block.
pub const SBB_SIZE: usize = 1 << (2 * SBB_LOG2);

/// Largest supported transform block edge: 64 samples.
pub const MAX_TB_LOG2: u8 = 6;

/// Coefficients above this coordinate are zeroed out in large blocks.
pub const ZERO_OUT_EDGE: usize = 32;

/// Group index for a last-significant-coefficient coordinate.
///
/// Coordinates 0..=3 map to themselves; larger values share a group per
/// power-of-two band with one steering bit, giving the truncated-Rice prefix
/// of the last-position binarization.
#[inline]
pub const fn last_group_idx(v: u32) -> u32 {
    if v < 4 {
        v
    } else {
        let log = 31 - (v | 1).leading_zeros();
        (log << 1) + ((v >> (log - 1)) & 1)
    }
}

/// Number of bypass suffix bits for a last-position group.
#[inline]
pub const fn last_suffix_bits(group: u32) -> u32 {
    if group < 4 {
        0
    } else {
        (group >> 1) - 1
    }
}

/// Significance-flag context region offset from the diagonal `d = x + y`.
#[inline]
pub const fn sig_region_offset(d: u32, chroma: bool) -> u8 {
    if chroma {
        if d < 2 {
            4
        } else {
            0
        }
    } else if d < 2 {
        8
    } else if d < 5 {
        4
    } else {
        0
    }
}

/// Greater-than-x flag context region offset from the diagonal `d = x + y`.
///
/// Context 0 of each bank is reserved for the last-significant position, so
/// the returned offsets start at 1.
#[inline]
pub const fn gtx_region_offset(d: u32, chroma: bool) -> u8 {
    if chroma {
        if d == 0 {
            6
        } else {
            1
        }
    } else if d == 0 {
        16
    } else if d < 3 {
        11
    } else if d < 10 {
        6
    } else {
        1
    }
}

/// Number of significance-flag contexts (three quantizer banks of 12 / 8).
pub const N_SIG_CTX_LUMA: usize = 36;
/// Chroma significance-flag context count.
pub const N_SIG_CTX_CHROMA: usize = 24;
/// Number of greater-than-x contexts per flag kind.
pub const N_GTX_CTX_LUMA: usize = 21;
/// Chroma greater-than-x context count.
pub const N_GTX_CTX_CHROMA: usize = 11;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transition_is_total_and_closed() {
        for s in 0..4usize {
            for parity in 0..2usize {
                let next = STATE_TRANSITION[s][parity];
                assert!(next < 4, "T({s}, {parity}) = {next} escapes the state set");
            }
        }
    }

    #[test]
    fn state_transition_zero_run_is_involution() {
        // A sub-block of 16 zeros must return every state to itself; the
        // trellis sub-block-skip shortcut relies on this.
        for s0 in 0..4u8 {
            let mut s = s0;
            for _ in 0..16 {
                s = STATE_TRANSITION[s as usize][0];
            }
            assert_eq!(s, s0, "16 zero-parity steps must be the identity");
        }
    }

    #[test]
    fn quant_scale_rows_are_reciprocal() {
        // Forward scale times level scale approximates 2^(QUANT_SHIFT + IQUANT_SHIFT).
        for rem in 0..6 {
            let prod = QUANT_SCALES[0][rem] as i64 * INV_QUANT_SCALES[0][rem] as i64;
            let target = 1i64 << (QUANT_SHIFT + IQUANT_SHIFT);
            let err = (prod - target).abs() as f64 / target as f64;
            assert!(err < 0.002, "scale pair {rem} off by {err}");
        }
    }

    #[test]
    fn last_group_idx_matches_reference_prefix() {
        let expect: [u32; 16] = [0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7];
        for (v, &g) in expect.iter().enumerate() {
            assert_eq!(last_group_idx(v as u32), g, "group of {v}");
        }
        assert_eq!(last_group_idx(16), 8);
        assert_eq!(last_group_idx(31), 9);
        assert_eq!(last_group_idx(32), 10);
    }

    #[test]
    fn go_rice_pars_monotone() {
        for w in GO_RICE_PARS.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }
}
