use std::path::Path;

use bytes::Bytes;
use tracing::info;

use crate::ivf::{self, IvfError, IvfFrame, IvfHeader};

/// Reads compressed frames out of an IVF file held in memory.
pub struct IvfSource {
    header: IvfHeader,
    data: Bytes,
    offset: usize,
    failed: bool,
}

impl IvfSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IvfError> {
        let path = path.as_ref();
        let data = Bytes::from(std::fs::read(path)?);
        info!(path = %path.display(), size = data.len(), "opened IVF file");
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Bytes) -> Result<Self, IvfError> {
        let header = ivf::parse_file_header(&data)?;
        let offset = header.header_len as usize;
        if offset > data.len() {
            return Err(IvfError::TooShort(data.len()));
        }
        Ok(IvfSource {
            header,
            data,
            offset,
            failed: false,
        })
    }

    pub fn header(&self) -> &IvfHeader {
        &self.header
    }
}

impl Iterator for IvfSource {
    type Item = Result<IvfFrame, IvfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match ivf::parse_frame(&self.data, self.offset) {
            Ok(Some((frame, next))) => {
                self.offset = next;
                Some(Ok(frame))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
