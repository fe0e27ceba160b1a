use std::{
    borrow::Cow,
    io::{Read, Seek, SeekFrom},
    sync::Mutex,
};

use crate::{Result, common::read_full, store::BodySource};

/// Body served by seeking and reading the open database handle per query.
///
/// The handle's position is shared state, so each seek+read pair runs under
/// the lock.
#[derive(Debug)]
pub struct StreamBody<R> {
    reader: Mutex<R>,
    base: u64,
}

impl<R: Read + Seek> StreamBody<R> {
    /// `base` is the absolute offset of the first IP block.
    pub fn new(reader: R, base: u64) -> Self {
        Self {
            reader: Mutex::new(reader),
            base,
        }
    }
}

impl<R: Read + Seek + Send + std::fmt::Debug> BodySource for StreamBody<R> {
    fn read(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let mut buf = vec![0u8; len];
        let mut reader = self
            .reader
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reader.seek(SeekFrom::Start(self.base + offset))?;
        read_full(&mut *reader, &mut buf)?;
        Ok(Cow::Owned(buf))
    }
}
