//! State-machine dequantization.
//!
//! Walks the scan from the last non-zero position down to DC, replaying the
//! same 4-state transition rule the trellis search obeys. Both the encoder
//! (reconstruction for RDO feedback) and the decoder call this exact
//! routine; any divergence from the trellis transition table is a
//! correctness bug, not a quality regression.

use crate::error::InvariantViolation;
use crate::quant::QuantParams;
use crate::scan::ScanGeometry;
use crate::tables::STATE_TRANSITION;

/// Inverse quantizer for one transform unit.
pub struct Dequantizer;

impl Dequantizer {
    /// Reconstructs coefficients from quantized levels.
    ///
    /// `levels` and `out` are raster-ordered and must match the geometry's
    /// block area. For transform-skip units the state machine is bypassed.
    pub fn dequantize(
        levels: &[i32],
        params: &QuantParams,
        geometry: &ScanGeometry,
        out: &mut [i32],
    ) -> Result<(), InvariantViolation> {
        if levels.len() != geometry.num_coeff {
            return Err(InvariantViolation::ScanMismatch(
                "level buffer does not match scan geometry",
            ));
        }
        if out.len() != geometry.num_coeff {
            return Err(InvariantViolation::ScanMismatch(
                "output buffer does not match scan geometry",
            ));
        }

        out.fill(0);
        if params.transform_skip {
            for (o, &l) in out.iter_mut().zip(levels) {
                *o = Self::reconstruct(l.unsigned_abs() as i64, l < 0, params);
            }
            return Ok(());
        }

        // Last non-zero scan position; all-zero blocks reconstruct to zero.
        let last = match geometry
            .info
            .iter()
            .rposition(|si| levels[si.raster as usize] != 0)
        {
            Some(idx) => idx,
            None => return Ok(()),
        };

        let mut state = 0usize;
        for scan_idx in (0..=last).rev() {
            let raster = geometry.info[scan_idx].raster as usize;
            let level = levels[raster];
            let abs = level.unsigned_abs() as i64;
            if abs != 0 {
                // States 2 and 3 reconstruct on the offset quantizer.
                let q_idx = 2 * abs - (state > 1) as i64;
                out[raster] = Self::reconstruct(q_idx, level < 0, params);
            }
            state = STATE_TRANSITION[state][(abs & 1) as usize] as usize;
        }
        Ok(())
    }

    #[inline]
    fn reconstruct(q_idx: i64, negative: bool, params: &QuantParams) -> i32 {
        let rnd = 1i64 << (params.bd_shift - 1);
        let v = (q_idx * params.inv_scale + rnd) >> params.bd_shift;
        let max = (1i64 << params.max_log2_dyn_range) - 1;
        let v = v.clamp(-max - 1, max) as i32;
        if negative {
            -v
        } else {
            v
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tu::ChannelType;

    #[test]
    fn all_zero_levels_reconstruct_to_zero() {
        let geom = ScanGeometry::build(2, 2, ChannelType::Luma);
        let params = QuantParams::new(27, 2, 2, 10, false, 8.0).unwrap();
        let levels = [0i32; 16];
        let mut out = [99i32; 16];
        Dequantizer::dequantize(&levels, &params, &geom, &mut out).unwrap();
        assert_eq!(out, [0i32; 16]);
    }

    #[test]
    fn rejects_mismatched_buffers() {
        let geom = ScanGeometry::build(2, 2, ChannelType::Luma);
        let params = QuantParams::new(27, 2, 2, 10, false, 8.0).unwrap();
        let levels = [0i32; 8];
        let mut out = [0i32; 16];
        let err = Dequantizer::dequantize(&levels, &params, &geom, &mut out).unwrap_err();
        assert!(matches!(err, InvariantViolation::ScanMismatch(_)));
    }

    #[test]
    fn parity_selects_quantizer() {
        // A single odd level at the last position flips the state for the
        // positions below it, moving them onto the offset quantizer.
        let geom = ScanGeometry::build(2, 2, ChannelType::Luma);
        let params = QuantParams::new(30, 2, 2, 10, false, 8.0).unwrap();

        // Raster layout: scan idx 2 is (1, 0) -> raster 1; DC is raster 0.
        let mut even = [0i32; 16];
        even[1] = 2; // even level above DC
        even[0] = 3;
        let mut out_even = [0i32; 16];
        Dequantizer::dequantize(&even, &params, &geom, &mut out_even).unwrap();

        let mut odd = [0i32; 16];
        odd[1] = 3; // odd level above DC
        odd[0] = 3;
        let mut out_odd = [0i32; 16];
        Dequantizer::dequantize(&odd, &params, &geom, &mut out_odd).unwrap();

        // Same DC level, but the state differs, so reconstruction differs.
        assert_ne!(out_even[0], out_odd[0]);
    }

    #[test]
    fn transform_skip_ignores_state_machine() {
        let geom = ScanGeometry::build(2, 2, ChannelType::Luma);
        let params = QuantParams::new(30, 2, 2, 10, true, 8.0).unwrap();
        let mut levels = [0i32; 16];
        levels[0] = 3;
        levels[5] = -3;
        let mut out = [0i32; 16];
        Dequantizer::dequantize(&levels, &params, &geom, &mut out).unwrap();
        assert_eq!(out[0], -out[5], "same magnitude must reconstruct alike");
    }
}
