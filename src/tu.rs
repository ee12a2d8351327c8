//! Transform-unit view consumed by the quantizer.
//!
//! The transform unit owns its coefficient storage; the quantizer borrows
//! the raw (pre-quantization) coefficients read-only and writes the chosen
//! levels into a distinct buffer owned by the same unit.

use crate::error::ConfigError;
use crate::tables::MAX_TB_LOG2;

/// Color component class. Chroma components share context sets, so only the
/// luma/chroma distinction matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Luma (Y).
    Luma,
    /// Chroma (Cb, Cr, or joint CbCr).
    Chroma,
}

impl ChannelType {
    /// True for chroma components.
    #[inline]
    pub fn is_chroma(self) -> bool {
        matches!(self, ChannelType::Chroma)
    }
}

/// How the coded-block flag of this unit reaches the bitstream.
///
/// An explicitly coded cbf contributes its cost to the decision between an
/// all-zero unit and any non-zero outcome; an inferred cbf (a sibling
/// sub-partition already forced it) costs nothing either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CbfMode {
    /// The flag is coded; the payload is the context class the entropy coder
    /// uses for it.
    Explicit(u8),
    /// The flag is derived by the decoder and never coded.
    Inferred,
}

/// One transform block handed to [`quantize`](crate::DepQuant::quantize) or
/// [`dequantize`](crate::Dequantizer::dequantize).
///
/// `coeffs` and `levels` are raster-ordered (row-major) and must both cover
/// exactly `width * height` entries.
#[derive(Debug)]
pub struct TransformUnit<'a> {
    /// Raw transform coefficients (input, read-only).
    pub coeffs: &'a [i32],
    /// Quantized levels (output of the trellis, input to dequantization).
    pub levels: &'a mut [i32],
    /// log2 of the block width; 1..=6.
    pub log2_w: u8,
    /// log2 of the block height; 1..=6.
    pub log2_h: u8,
    /// Color component class.
    pub channel: ChannelType,
    /// Quantization parameter after slice/CU delta application.
    pub qp: i32,
    /// Channel bit depth, 8..=16.
    pub bit_depth: u8,
    /// Transform-skip block: residuals are coded without the dependent
    /// state machine.
    pub transform_skip: bool,
    /// A low-frequency non-separable transform is active, which restricts
    /// the significant region to the first 8 or 16 scan positions.
    pub lfnst_active: bool,
    /// How the coded-block flag is signaled for this unit.
    pub cbf: CbfMode,
}

impl<'a> TransformUnit<'a> {
    /// Validates buffer lengths and block-size bounds.
    pub fn new(
        coeffs: &'a [i32],
        levels: &'a mut [i32],
        log2_w: u8,
        log2_h: u8,
        channel: ChannelType,
        qp: i32,
        bit_depth: u8,
    ) -> Result<Self, ConfigError> {
        if log2_w < 1 || log2_h < 1 || log2_w > MAX_TB_LOG2 || log2_h > MAX_TB_LOG2 {
            return Err(ConfigError::BadBlockSize {
                width: 1u32 << log2_w,
                height: 1u32 << log2_h,
            });
        }
        let area = 1usize << (log2_w + log2_h);
        if coeffs.len() != area {
            return Err(ConfigError::BadBufferLen {
                got: coeffs.len(),
                expected: area,
            });
        }
        if levels.len() != area {
            return Err(ConfigError::BadBufferLen {
                got: levels.len(),
                expected: area,
            });
        }
        Ok(Self {
            coeffs,
            levels,
            log2_w,
            log2_h,
            channel,
            qp,
            bit_depth,
            transform_skip: false,
            lfnst_active: false,
            cbf: CbfMode::Explicit(0),
        })
    }

    /// Block width in samples.
    #[inline]
    pub fn width(&self) -> usize {
        1 << self.log2_w
    }

    /// Block height in samples.
    #[inline]
    pub fn height(&self) -> usize {
        1 << self.log2_h
    }

    /// Number of coefficients in the block.
    #[inline]
    pub fn area(&self) -> usize {
        1 << (self.log2_w + self.log2_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_sizes() {
        let coeffs = [0i32; 2];
        let mut levels = [0i32; 2];
        let err = TransformUnit::new(&coeffs, &mut levels, 0, 1, ChannelType::Luma, 27, 10)
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadBlockSize { .. }));
    }

    #[test]
    fn rejects_short_buffers() {
        let coeffs = [0i32; 15];
        let mut levels = [0i32; 16];
        let err = TransformUnit::new(&coeffs, &mut levels, 2, 2, ChannelType::Luma, 27, 10)
            .unwrap_err();
        assert!(matches!(err, ConfigError::BadBufferLen { got: 15, .. }));
    }
}
