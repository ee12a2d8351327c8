//! Fractional-bit rate model.
//!
//! The trellis never talks to a binary arithmetic coder. It sees rate only
//! through [`RateOracle`], which maps a context id to the estimated cost of
//! coding a 0 or a 1 in that context, in fixed-point fractional bits. The
//! per-unit [`estimator::RateEstimator`] snapshots the oracle into flat
//! tables once, so the hot loop is pure array lookups.

pub mod estimator;

/// Fixed-point scale of all rate values: costs are `2^-FRAC_BITS_SCALE` bits.
pub const FRAC_BITS_SCALE: u32 = 15;

/// Cost of one bypass (equiprobable) bin.
pub const BYPASS_BIT: u32 = 1 << FRAC_BITS_SCALE;

/// Prefix cutoff of the remainder binarization; prefixes at or above this
/// escape into exp-Golomb.
const RICE_PREFIX_CUTOFF: u32 = 5;

/// Context identifier handed to the oracle.
///
/// `ctx` is the local index within the named context set; `chroma` selects
/// the per-channel-class bank. The numbering of each set is fixed by the
/// context-derivation rules in [`crate::scan`] and [`crate::tables`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxId {
    /// Coded-sub-block flag; `ctx` is 1 if an adjacent decided sub-block was
    /// significant, else 0.
    SigSbb {
        /// Chroma bank.
        chroma: bool,
        /// Neighbor-significance class, 0 or 1.
        ctx: u8,
    },
    /// Coefficient significance flag.
    Sig {
        /// Chroma bank.
        chroma: bool,
        /// Region offset plus neighbor-sum class.
        ctx: u8,
    },
    /// Level parity flag.
    Par {
        /// Chroma bank.
        chroma: bool,
        /// Region offset plus neighbor class; 0 is reserved for the last
        /// significant position.
        ctx: u8,
    },
    /// Level greater-than-1 flag.
    Gt1 {
        /// Chroma bank.
        chroma: bool,
        /// Same numbering as [`CtxId::Par`].
        ctx: u8,
    },
    /// Level greater-than-3 flag.
    Gt2 {
        /// Chroma bank.
        chroma: bool,
        /// Same numbering as [`CtxId::Par`].
        ctx: u8,
    },
    /// Last-significant-position prefix bin along x.
    LastX {
        /// Chroma bank.
        chroma: bool,
        /// Prefix bin index.
        ctx: u8,
    },
    /// Last-significant-position prefix bin along y.
    LastY {
        /// Chroma bank.
        chroma: bool,
        /// Prefix bin index.
        ctx: u8,
    },
    /// Coded-block flag of the whole unit.
    Cbf {
        /// Chroma bank.
        chroma: bool,
        /// Prediction-mode class supplied by the caller.
        ctx: u8,
    },
}

/// Probability/cost boundary to the entropy-coding subsystem.
///
/// Implementations are read-only for the duration of one
/// [`estimator::RateEstimator::build`]; the estimator owns the snapshot
/// afterwards, so the underlying context models may keep adapting.
pub trait RateOracle {
    /// `[bits_if_zero, bits_if_one]` for `ctx`, in `2^-15`-bit units.
    fn frac_bits(&self, ctx: CtxId) -> [u32; 2];
}

/// Cost of the bypass-coded remainder `value` under Rice parameter `rice`.
///
/// Truncated-Rice prefix below the cutoff, exp-Golomb escape of order
/// `rice + 1` above it. Monotone in `value` for fixed `rice`.
pub fn golomb_rice_bits(value: u32, rice: u32) -> u32 {
    let prefix = value >> rice;
    if prefix < RICE_PREFIX_CUTOFF {
        (prefix + 1 + rice) << FRAC_BITS_SCALE
    } else {
        let mut length = rice;
        let mut code = value - (RICE_PREFIX_CUTOFF << rice);
        while code >= (1u32 << length) {
            code -= 1u32 << length;
            length += 1;
        }
        (RICE_PREFIX_CUTOFF + 1 + (length - rice) + length) << FRAC_BITS_SCALE
    }
}

/// Deterministic oracle with every context at equal probability.
///
/// Stands in for the CABAC context models in tests and benchmarks; every bin
/// costs exactly one bit either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformRateOracle;

impl RateOracle for UniformRateOracle {
    #[inline]
    fn frac_bits(&self, _ctx: CtxId) -> [u32; 2] {
        [BYPASS_BIT, BYPASS_BIT]
    }
}
