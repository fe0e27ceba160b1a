use std::{borrow::Cow, fmt, ops::Range};

use tracing::trace;

use crate::{
    GeoError, Result,
    common::Geometry,
    index::IndexSource,
};

/// Kinds of location record, in schema blob order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Country = 0,
    Region = 1,
    City = 2,
}

impl RecordKind {
    /// Section the records of this kind live in.
    ///
    /// Country records sit at the head of the city section, below
    /// `country_section_size`; full city records follow them.
    pub fn section(self) -> Section {
        match self {
            RecordKind::Region => Section::Regions,
            RecordKind::Country | RecordKind::City => Section::Cities,
        }
    }
}

/// Record sections that follow the IP-block table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Regions,
    Cities,
}

/// Byte access to everything after the indexes: the block table followed by
/// the region and city sections.
pub trait BodySource: fmt::Debug + Send + Sync {
    /// Exactly `len` bytes starting `offset` bytes after the start of the block table.
    fn read(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>>;
}

/// Uniform access to indexes, blocks and record sections, whatever backs them.
#[derive(Debug)]
pub struct DataStore {
    index: Box<dyn IndexSource>,
    body: Box<dyn BodySource>,
    geometry: Geometry,
    block_width: usize,
}

impl DataStore {
    pub fn new(
        index: Box<dyn IndexSource>,
        body: Box<dyn BodySource>,
        geometry: Geometry,
        block_width: usize,
    ) -> Self {
        Self {
            index,
            body,
            geometry,
            block_width,
        }
    }

    /// Raw bytes of the blocks at positions `range`.
    pub fn blocks(&self, range: Range<usize>) -> Result<Cow<'_, [u8]>> {
        let start = range.start as u64 * self.block_width as u64;
        let len = range.len() * self.block_width;
        if start + len as u64 > self.geometry.blocks_len {
            return Err(GeoError::TruncatedData);
        }
        self.body.read(start, len)
    }

    /// Up to `len` bytes at `offset` within `section`, clipped at the section end.
    ///
    /// A zero offset or length reads nothing; records are never stored at offset 0.
    pub fn section(&self, section: Section, offset: usize, len: usize) -> Result<Cow<'_, [u8]>> {
        if offset == 0 || len == 0 {
            return Ok(Cow::Borrowed(&[]));
        }
        let (begin, size) = match section {
            Section::Regions => (self.geometry.regions_begin(), self.geometry.region_len),
            Section::Cities => (self.geometry.cities_begin(), self.geometry.city_len),
        };
        let offset = offset as u64;
        if offset >= size {
            return Err(GeoError::TruncatedData);
        }
        let available = (size - offset).min(len as u64) as usize;
        if available < len {
            trace!(?section, offset, len, available, "record read clipped at section end");
        }
        self.body.read(begin + offset, available)
    }
}

impl IndexSource for DataStore {
    fn byte_bounds(&self, octet: u8) -> Option<(u32, u32)> {
        self.index.byte_bounds(octet)
    }

    fn granule(&self, granule: usize) -> Option<[u8; 4]> {
        self.index.granule(granule)
    }
}
