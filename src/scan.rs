//! Scan geometry for coefficient coding.
//!
//! Maps the 1-D coefficient scan to 2-D positions: diagonal (up-right) order
//! inside 4x4 sub-blocks, with the sub-blocks themselves visited in diagonal
//! order. Each position record also carries the precomputed context-template
//! information the trellis needs, split into neighbors inside the same
//! sub-block (in-scan offsets) and neighbors outside it (raster indices,
//! resolved against the cross-sub-block level history).
//!
//! Geometries are immutable once built and shared by reference. The cache is
//! an explicit value passed to every search invocation; there are no lazily
//! initialized process-wide tables.

use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::tables::{gtx_region_offset, sig_region_offset, SBB_LOG2};
use crate::tu::ChannelType;

/// Context-template neighbor offsets: right, right+1, below, below+1, diagonal.
const TEMPLATE: [(u8, u8); 5] = [(1, 0), (2, 0), (0, 1), (0, 2), (1, 1)];

/// Sentinel for "no neighboring sub-block" in [`SbbInfo`].
pub const NO_SBB: u16 = u16::MAX;

/// Template neighbors of one scan position that fall inside its sub-block,
/// stored as in-sub-block scan offsets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NbInSbb {
    /// Number of valid entries in `off`.
    pub num: u8,
    /// In-sub-block scan positions of the neighbors.
    pub off: [u8; 5],
}

/// Template neighbors outside the position's sub-block, as raster indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct NbOutSbb {
    /// Number of valid entries in `raster`.
    pub num: u8,
    /// Raster indices of the neighbors.
    pub raster: [u16; 5],
}

/// Immutable per-scan-position record.
#[derive(Debug, Clone, Copy)]
pub struct ScanInfo {
    /// Raster index (`y * width + x`).
    pub raster: u16,
    /// Horizontal position.
    pub x: u8,
    /// Vertical position.
    pub y: u8,
    /// Sequential id of the containing sub-block along the sub-block scan.
    pub sbb_id: u16,
    /// Scan position within the sub-block (0 = lowest scan index).
    pub in_sbb_pos: u8,
    /// Highest scan index of its sub-block (visited first when descending).
    pub sbb_entry: bool,
    /// Lowest scan index of its sub-block (visited last when descending).
    pub sbb_exit: bool,
    /// Significance context region offset for this position.
    pub sig_region: u8,
    /// Greater-than-x context region offset for this position.
    pub gtx_region: u8,
    /// Template neighbors inside the same sub-block.
    pub nb_in: NbInSbb,
    /// Template neighbors outside the sub-block.
    pub nb_out: NbOutSbb,
}

/// Per-sub-block adjacency used for the coded-sub-block-flag context.
#[derive(Debug, Clone, Copy)]
pub struct SbbInfo {
    /// Sub-block column.
    pub sx: u8,
    /// Sub-block row.
    pub sy: u8,
    /// Sequential id of the sub-block to the right, or [`NO_SBB`].
    pub right: u16,
    /// Sequential id of the sub-block below, or [`NO_SBB`].
    pub below: u16,
}

/// Complete scan geometry for one (width, height, channel) combination.
pub struct ScanGeometry {
    /// log2 block width.
    pub log2_w: u8,
    /// log2 block height.
    pub log2_h: u8,
    /// Channel class the context regions were derived for.
    pub channel: ChannelType,
    /// Number of coefficients in the block.
    pub num_coeff: usize,
    /// Coefficients per sub-block (4, 8 or 16 for narrow blocks).
    pub sbb_size: usize,
    /// Number of sub-blocks.
    pub num_sbb: usize,
    /// Per-scan-position records, indexed by scan position.
    pub info: Vec<ScanInfo>,
    /// Inverse mapping: raster index to scan position.
    pub scan_of_raster: Vec<u16>,
    /// Per-sub-block adjacency, indexed by sequential sub-block id.
    pub sbb: Vec<SbbInfo>,
}

/// Diagonal (up-right) scan over a `w` x `h` grid: within each anti-diagonal
/// `d = x + y`, x ascends (so y descends).
fn diag_positions(w: usize, h: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(w * h);
    for d in 0..(w + h - 1) {
        for x in 0..=d {
            let y = d - x;
            if x < w && y < h {
                out.push((x, y));
            }
        }
    }
    out
}

impl ScanGeometry {
    /// Builds the geometry for a block of `1 << log2_w` by `1 << log2_h`.
    pub fn build(log2_w: u8, log2_h: u8, channel: ChannelType) -> Self {
        let w = 1usize << log2_w;
        let h = 1usize << log2_h;
        let chroma = channel.is_chroma();

        // Narrow blocks use shrunken sub-blocks so a sub-block never spans
        // more than one block row or column group.
        let sbb_log2_w = log2_w.min(SBB_LOG2);
        let sbb_log2_h = log2_h.min(SBB_LOG2);
        let sbb_w = 1usize << sbb_log2_w;
        let sbb_h = 1usize << sbb_log2_h;
        let sbb_size = sbb_w * sbb_h;
        let grid_w = w >> sbb_log2_w;
        let grid_h = h >> sbb_log2_h;
        let num_sbb = grid_w * grid_h;

        let sbb_order = diag_positions(grid_w, grid_h);
        let in_order = diag_positions(sbb_w, sbb_h);

        // Sequential sub-block id by grid raster position.
        let mut sbb_seq_of_grid = alloc::vec![0u16; num_sbb];
        for (seq, &(sx, sy)) in sbb_order.iter().enumerate() {
            sbb_seq_of_grid[sy * grid_w + sx] = seq as u16;
        }

        let mut sbb = Vec::with_capacity(num_sbb);
        for &(sx, sy) in &sbb_order {
            let right = if sx + 1 < grid_w {
                sbb_seq_of_grid[sy * grid_w + sx + 1]
            } else {
                NO_SBB
            };
            let below = if sy + 1 < grid_h {
                sbb_seq_of_grid[(sy + 1) * grid_w + sx]
            } else {
                NO_SBB
            };
            sbb.push(SbbInfo {
                sx: sx as u8,
                sy: sy as u8,
                right,
                below,
            });
        }

        // In-sub-block scan position by local raster offset.
        let mut in_pos_of_local = alloc::vec![0u8; sbb_size];
        for (p, &(lx, ly)) in in_order.iter().enumerate() {
            in_pos_of_local[ly * sbb_w + lx] = p as u8;
        }

        let num_coeff = w * h;
        let mut info = Vec::with_capacity(num_coeff);
        let mut scan_of_raster = alloc::vec![0u16; num_coeff];

        for (seq, &(sx, sy)) in sbb_order.iter().enumerate() {
            for (p, &(lx, ly)) in in_order.iter().enumerate() {
                let x = (sx << sbb_log2_w) + lx;
                let y = (sy << sbb_log2_h) + ly;
                let raster = (y * w + x) as u16;
                let scan_idx = seq * sbb_size + p;
                scan_of_raster[raster as usize] = scan_idx as u16;

                let mut nb_in = NbInSbb::default();
                let mut nb_out = NbOutSbb::default();
                for &(dx, dy) in &TEMPLATE {
                    let nx = x + dx as usize;
                    let ny = y + dy as usize;
                    if nx >= w || ny >= h {
                        continue;
                    }
                    let same_sbb = (nx >> sbb_log2_w) == sx && (ny >> sbb_log2_h) == sy;
                    if same_sbb {
                        let local = ((ny & (sbb_h - 1)) * sbb_w) | (nx & (sbb_w - 1));
                        nb_in.off[nb_in.num as usize] = in_pos_of_local[local];
                        nb_in.num += 1;
                    } else {
                        nb_out.raster[nb_out.num as usize] = (ny * w + nx) as u16;
                        nb_out.num += 1;
                    }
                }

                let d = (x + y) as u32;
                info.push(ScanInfo {
                    raster,
                    x: x as u8,
                    y: y as u8,
                    sbb_id: seq as u16,
                    in_sbb_pos: p as u8,
                    sbb_entry: p == sbb_size - 1,
                    sbb_exit: p == 0,
                    sig_region: sig_region_offset(d, chroma),
                    gtx_region: gtx_region_offset(d, chroma),
                    nb_in,
                    nb_out,
                });
            }
        }

        ScanGeometry {
            log2_w,
            log2_h,
            channel,
            num_coeff,
            sbb_size,
            num_sbb,
            info,
            scan_of_raster,
            sbb,
        }
    }
}

/// Cache of scan geometries keyed by (log2 width, log2 height, channel).
///
/// Owned by the encoder context and passed explicitly to each search; build
/// cost is paid once per distinct transform shape.
#[derive(Default)]
pub struct ScanCache {
    map: HashMap<(u8, u8, ChannelType), ScanGeometry>,
}

impl ScanCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the geometry for the given shape, building it on first use.
    pub fn get_or_build(
        &mut self,
        log2_w: u8,
        log2_h: u8,
        channel: ChannelType,
    ) -> &ScanGeometry {
        self.map
            .entry((log2_w, log2_h, channel))
            .or_insert_with(|| ScanGeometry::build(log2_w, log2_h, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_a_bijection() {
        for (lw, lh) in [(2u8, 2u8), (3, 3), (2, 4), (5, 5), (1, 3), (6, 6)] {
            let g = ScanGeometry::build(lw, lh, ChannelType::Luma);
            let mut seen = alloc::vec![false; g.num_coeff];
            for si in &g.info {
                assert!(!seen[si.raster as usize], "raster {} visited twice", si.raster);
                seen[si.raster as usize] = true;
                assert_eq!(
                    g.scan_of_raster[si.raster as usize] as usize,
                    g.info.iter().position(|o| o.raster == si.raster).unwrap()
                );
            }
            assert!(seen.iter().all(|&b| b), "scan missed positions in {lw}x{lh}");
        }
    }

    #[test]
    fn dc_is_scan_index_zero() {
        let g = ScanGeometry::build(3, 3, ChannelType::Luma);
        assert_eq!(g.info[0].raster, 0);
        assert_eq!(g.info[0].x, 0);
        assert_eq!(g.info[0].y, 0);
        assert!(g.info[0].sbb_exit);
    }

    #[test]
    fn four_by_four_diag_order_matches_reference() {
        let g = ScanGeometry::build(2, 2, ChannelType::Luma);
        let expect: [(u8, u8); 16] = [
            (0, 0), (0, 1), (1, 0), (0, 2), (1, 1), (2, 0), (0, 3), (1, 2),
            (2, 1), (3, 0), (1, 3), (2, 2), (3, 1), (2, 3), (3, 2), (3, 3),
        ];
        for (i, &(x, y)) in expect.iter().enumerate() {
            assert_eq!((g.info[i].x, g.info[i].y), (x, y), "scan index {i}");
        }
    }

    #[test]
    fn template_neighbors_are_already_decided() {
        // Every template neighbor must have a higher scan index than the
        // position it serves (it is decided earlier in the descending pass).
        let g = ScanGeometry::build(3, 2, ChannelType::Chroma);
        for (idx, si) in g.info.iter().enumerate() {
            for k in 0..si.nb_in.num as usize {
                let nb_scan = si.sbb_id as usize * g.sbb_size + si.nb_in.off[k] as usize;
                assert!(nb_scan > idx, "in-sbb neighbor {nb_scan} not above {idx}");
            }
            for k in 0..si.nb_out.num as usize {
                let nb_scan = g.scan_of_raster[si.nb_out.raster[k] as usize] as usize;
                assert!(nb_scan > idx, "out-sbb neighbor {nb_scan} not above {idx}");
            }
        }
    }

    #[test]
    fn sub_block_adjacency_points_to_coded_sbbs() {
        let g = ScanGeometry::build(4, 4, ChannelType::Luma);
        for (seq, s) in g.sbb.iter().enumerate() {
            if s.right != NO_SBB {
                assert!(
                    (s.right as usize) > seq,
                    "right sub-block of {seq} coded later"
                );
            }
            if s.below != NO_SBB {
                assert!((s.below as usize) > seq, "below sub-block of {seq} coded later");
            }
        }
    }
}
