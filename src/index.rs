//! Byte index and main index lookups that narrow an address down to a small
//! window of IP-block positions.

use byteorder::{BigEndian, ByteOrder};
use std::{fmt, net::Ipv4Addr, ops::Range};

use crate::common::Header;

/// Window size at which binary searches hand over to a linear scan.
pub const LINEAR_SCAN_THRESHOLD: usize = 8;

/// Leading octets that never resolve.
pub const RESERVED_OCTETS: [u8; 3] = [0, 10, 127];

/// Read access to the byte index and the main (granule) index.
pub trait IndexSource: fmt::Debug + Send + Sync {
    /// Half-open range of block positions whose address starts with `octet`.
    fn byte_bounds(&self, octet: u8) -> Option<(u32, u32)>;

    /// Boundary address of granule `granule`, big-endian.
    fn granule(&self, granule: usize) -> Option<[u8; 4]>;
}

/// Indexes kept as the raw bytes read from the file and parsed on every access.
#[derive(Debug)]
pub struct PackedIndex {
    byte_index: Vec<u8>,
    main_index: Vec<u8>,
}

impl PackedIndex {
    pub fn new(byte_index: Vec<u8>, main_index: Vec<u8>) -> Self {
        Self {
            byte_index,
            main_index,
        }
    }
}

impl IndexSource for PackedIndex {
    fn byte_bounds(&self, octet: u8) -> Option<(u32, u32)> {
        let start = (octet as usize).checked_sub(1)? * 4;
        let bytes = self.byte_index.get(start..start + 8)?;
        Some((
            BigEndian::read_u32(&bytes[..4]),
            BigEndian::read_u32(&bytes[4..]),
        ))
    }

    fn granule(&self, granule: usize) -> Option<[u8; 4]> {
        let start = granule * 4;
        self.main_index.get(start..start + 4)?.try_into().ok()
    }
}

/// Indexes materialized once at load time: per-octet bounds and fixed
/// 4-byte granule boundaries.
#[derive(Debug)]
pub struct BatchIndex {
    /// `bounds[octet]`; slot 0 is never consulted.
    bounds: Vec<(u32, u32)>,
    granules: Vec<[u8; 4]>,
}

impl BatchIndex {
    pub fn new(byte_index: &[u8], main_index: &[u8]) -> Self {
        let entries: Vec<u32> = byte_index
            .chunks_exact(4)
            .map(BigEndian::read_u32)
            .collect();
        let bounds = std::iter::once((0, 0))
            .chain(entries.windows(2).map(|pair| (pair[0], pair[1])))
            .collect();
        let granules = main_index
            .chunks_exact(4)
            .map(|chunk| [chunk[0], chunk[1], chunk[2], chunk[3]])
            .collect();
        Self { bounds, granules }
    }
}

impl IndexSource for BatchIndex {
    fn byte_bounds(&self, octet: u8) -> Option<(u32, u32)> {
        if octet == 0 {
            return None;
        }
        self.bounds.get(octet as usize).copied()
    }

    fn granule(&self, granule: usize) -> Option<[u8; 4]> {
        self.granules.get(granule).copied()
    }
}

/// Narrow `ip` to a window of block positions.
///
/// Returns `None` for reserved or unindexed leading octets. The window may be
/// empty, which the caller treats as unresolved.
pub fn narrow(index: &dyn IndexSource, header: &Header, ip: Ipv4Addr) -> Option<Range<usize>> {
    let octets = ip.octets();
    let lead = octets[0];
    if RESERVED_OCTETS.contains(&lead) || lead >= header.byte_index_len {
        return None;
    }

    let block_count = header.block_count as usize;
    let (min, max) = index.byte_bounds(lead)?;
    let min = (min as usize).min(block_count);
    let max = (max as usize).min(block_count);
    if max <= min {
        return Some(min..min);
    }

    let range = header.range as usize;
    if max - min <= range {
        return Some(min..max);
    }

    let granule = find_granule(index, octets, min / range, max / range - 1)
        .min(header.main_index_len as usize);
    let lo = (granule * range).max(min);
    let hi = if granule < header.main_index_len as usize {
        (granule + 1) * range
    } else {
        block_count
    };
    let hi = hi.min(max);
    Some(lo..hi.max(lo))
}

/// First granule in `[lo, hi]` whose boundary is at or above `ip`, or `hi + 1`.
///
/// Granules missing from the index compare below every address.
fn find_granule(index: &dyn IndexSource, ip: [u8; 4], mut lo: usize, mut hi: usize) -> usize {
    let below = |granule: usize| index.granule(granule).is_none_or(|boundary| ip > boundary);

    while hi.saturating_sub(lo) > LINEAR_SCAN_THRESHOLD {
        let mid = (lo + hi) >> 1;
        if below(mid) {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    while lo <= hi && below(lo) {
        lo += 1;
    }
    lo
}
