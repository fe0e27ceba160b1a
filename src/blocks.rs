//! Exact range lookup inside a narrowed window of the IP-block table.
//!
//! Every block stores the last three octets of the highest address of its
//! range followed by a big-endian seek pointer. The first block whose suffix
//! is at or above the target owns the target.

use byteorder::{BigEndian, ByteOrder};

use crate::{common::SUFFIX_LEN, index::LINEAR_SCAN_THRESHOLD};

/// Seek pointer of the block covering `tail` within `window`, or 0 when the
/// window is empty.
///
/// `window` holds whole blocks of `block_width` bytes; `tail` is the target
/// address without its leading octet.
pub fn find_seek(window: &[u8], tail: [u8; 3], block_width: usize) -> u32 {
    let count = window.len() / block_width;
    if count == 0 {
        return 0;
    }
    let suffix = |pos: usize| &window[pos * block_width..pos * block_width + SUFFIX_LEN];

    let mut pos = 0;
    if count > 1 {
        let (mut lo, mut hi) = (0, count);
        while hi - lo > LINEAR_SCAN_THRESHOLD {
            let mid = (lo + hi) >> 1;
            if tail[..] > *suffix(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        pos = lo;
        while pos < hi && tail[..] > *suffix(pos) {
            pos += 1;
        }
        pos = pos.min(count - 1);
    }

    // The seek pointer sits right before the cursor once it steps past `pos`.
    let cursor = (pos + 1) * block_width;
    let seek_width = block_width - SUFFIX_LEN;
    BigEndian::read_uint(&window[cursor - seek_width..cursor], seek_width) as u32
}
