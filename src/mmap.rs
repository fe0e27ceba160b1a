use memmap2::{Mmap, MmapOptions};
use std::{borrow::Cow, fs::File};

use crate::{GeoError, Result, common::Geometry, store::BodySource};

/// Body served as slices of a read-only mapping of the database file.
#[derive(Debug)]
pub struct MmapBody {
    mmap: Mmap,
    offset: usize,
}

impl MmapBody {
    /// Map `file`; the body starts at `geometry.blocks_begin`.
    pub fn map(file: &File, geometry: &Geometry) -> Result<Self> {
        let mmap = unsafe { MmapOptions::new().map(file)? };
        let offset = geometry.blocks_begin as usize;
        if offset as u64 + geometry.body_len() > mmap.len() as u64 {
            return Err(GeoError::TruncatedData);
        }
        Ok(Self { mmap, offset })
    }

    fn as_slice(&self) -> &[u8] {
        &self.mmap[self.offset..]
    }
}

impl BodySource for MmapBody {
    fn read(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let start = usize::try_from(offset).map_err(|_| GeoError::TruncatedData)?;
        self.as_slice()
            .get(start..start + len)
            .map(Cow::Borrowed)
            .ok_or(GeoError::TruncatedData)
    }
}
