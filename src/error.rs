//! Error types for the quantization subsystem.
//!
//! Two kinds only: [`ConfigError`] for invalid per-unit parameters (surfaced
//! to the caller before any trellis work), and [`InvariantViolation`] for
//! internal trellis/state-machine inconsistency. The latter can only arise
//! from a bug, never from untrusted input, so callers must abort the unit
//! rather than retry.

use thiserror::Error;

/// Invalid inputs to the per-transform-unit parameter derivation.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// QP outside the representable range for the given bit depth.
    #[error("qp {qp} outside 0..={max}")]
    QpOutOfRange {
        /// The rejected QP value.
        qp: i32,
        /// Largest admissible QP.
        max: i32,
    },
    /// Transform width or height of 1, or larger than the profile maximum.
    #[error("degenerate transform size {width}x{height}")]
    BadBlockSize {
        /// Block width in samples.
        width: u32,
        /// Block height in samples.
        height: u32,
    },
    /// Channel bit depth outside 8..=16.
    #[error("unsupported bit depth {0}")]
    BadBitDepth(u8),
    /// Non-positive or non-finite lambda.
    #[error("invalid lambda {0}")]
    BadLambda(f64),
    /// Coefficient / level buffer length does not match the block area.
    #[error("buffer of {got} coefficients for a {expected}-sample block")]
    BadBufferLen {
        /// Provided buffer length.
        got: usize,
        /// Required length (block area).
        expected: usize,
    },
}

/// Internal trellis or state-machine inconsistency. Always fatal for the
/// affected transform unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum InvariantViolation {
    /// A scan-geometry lookup disagreed with the transform size.
    #[error("scan geometry mismatch: {0}")]
    ScanMismatch(&'static str),
    /// The backward pass followed a predecessor chain that never reached
    /// the start sentinel or referenced an undecided slot.
    #[error("broken predecessor chain at scan index {scan_idx}, slot {slot}")]
    BrokenChain {
        /// Scan index where the walk failed.
        scan_idx: usize,
        /// Decision slot that was invalid.
        slot: usize,
    },
}

/// Umbrella error for the public entry points.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum QuantError {
    /// Invalid per-unit parameters; the unit was rejected before any search.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Internal inconsistency; the unit must be aborted.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Result alias using `At<QuantError>` for automatic location tracking.
///
/// Errors wrapped in `At<>` capture file and line information at the point
/// of conversion, which is the only context an invariant violation has.
pub type QuantResult<T> = core::result::Result<T, whereat::At<QuantError>>;
