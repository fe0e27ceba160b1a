use std::{borrow::Cow, io::Read};

use crate::{
    GeoError, Result,
    common::{Geometry, read_full},
    store::BodySource,
};

/// Block table and record sections preloaded into one buffer.
#[derive(Debug)]
pub struct MemoryBody {
    data: Box<[u8]>,
}

impl MemoryBody {
    /// Wrap bytes that start at the first IP block.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    /// Read the whole body from a reader positioned at the first IP block.
    pub fn load<R: Read>(reader: &mut R, geometry: &Geometry) -> Result<Self> {
        let len = usize::try_from(geometry.body_len()).map_err(|_| GeoError::TruncatedData)?;
        let mut data = vec![0u8; len];
        read_full(reader, &mut data)?;
        Ok(Self::new(data))
    }

    /// Take the body out of a complete database image.
    pub fn split_from(mut image: Vec<u8>, geometry: &Geometry) -> Result<Self> {
        let begin = geometry.blocks_begin as usize;
        if begin > image.len() {
            return Err(GeoError::TruncatedData);
        }
        let mut body = image.split_off(begin);
        body.truncate(geometry.body_len() as usize);
        Ok(Self::new(body))
    }
}

impl BodySource for MemoryBody {
    fn read(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let start = usize::try_from(offset).map_err(|_| GeoError::TruncatedData)?;
        self.data
            .get(start..start + len)
            .map(Cow::Borrowed)
            .ok_or(GeoError::TruncatedData)
    }
}
