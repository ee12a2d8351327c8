//! Dependent quantization for VVC-style residual coding.
//!
//! This crate implements the rate-distortion-optimized coefficient coder of
//! a dependent-quantization video codec: for every transform coefficient in
//! a block it picks the quantized level that minimizes distortion plus a
//! lambda-weighted rate estimate, while obeying the standard's 4-state
//! scalar-quantizer state machine that the decoder replays bit-exactly.
//!
//! # Features
//!
//! - `std` (default): standard library support. Without it the crate is
//!   `no_std` (requires `alloc`).
//!
//! # Quantizing a transform unit
//!
//! [`DepQuant`] is a per-worker workspace, reused across transform units.
//! Rate comes in through the [`RateOracle`] trait, owned by the entropy
//! coding subsystem; [`UniformRateOracle`] stands in for it here:
//!
//! ```rust
//! use zenquant::{ChannelType, DepQuant, ScanCache, TransformUnit, UniformRateOracle};
//!
//! let coeffs = [2400i32, -960, 320, 0, 800, -160, 0, 0, 160, 0, 0, 0, 0, 0, 0, 0];
//! let mut levels = [0i32; 16];
//! let mut tu = TransformUnit::new(&coeffs, &mut levels, 2, 2, ChannelType::Luma, 27, 10)?;
//!
//! let mut workspace = DepQuant::new();
//! let mut scans = ScanCache::new();
//! let abs_sum = workspace.quantize(&mut tu, &UniformRateOracle, 8.0, &mut scans)?;
//!
//! let emitted: u64 = levels.iter().map(|l| l.unsigned_abs() as u64).sum();
//! assert_eq!(abs_sum, emitted);
//! # Ok::<(), zenquant::QuantError>(())
//! ```
//!
//! Reconstruction uses [`Dequantizer`], the same routine the decoder runs:
//! any divergence from the trellis transition table is a correctness bug,
//! not a quality regression.
//!
//! # Safety
//!
//! This crate uses `#![forbid(unsafe_code)]`; there is no unsafe code
//! whatsoever.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

pub mod error;
pub mod quant;
pub mod rate;
pub mod scan;
pub mod tables;
pub mod trellis;
pub mod tu;

pub use error::{ConfigError, InvariantViolation, QuantError, QuantResult};
pub use quant::dequant::Dequantizer;
pub use quant::{Candidate, PreQuantizer, QuantParams};
pub use rate::estimator::RateEstimator;
pub use rate::{CtxId, RateOracle, UniformRateOracle, FRAC_BITS_SCALE};
pub use scan::{ScanCache, ScanGeometry, ScanInfo};
pub use trellis::common_ctx::SubblockContext;
pub use trellis::state::CodingState;
pub use trellis::DepQuant;
pub use tu::{CbfMode, ChannelType, TransformUnit};
