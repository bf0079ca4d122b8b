use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

pub const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
pub const FILE_HEADER_SIZE: usize = 32;
pub const FRAME_HEADER_SIZE: usize = 12;
pub const VP9_FOURCC: [u8; 4] = *b"VP90";

#[derive(Debug, Error)]
pub enum IvfError {
    #[error("file is {0} bytes, shorter than the IVF header")]
    TooShort(usize),
    #[error("bad IVF signature {0:?}")]
    BadSignature([u8; 4]),
    #[error("unsupported IVF version {0}")]
    UnsupportedVersion(u16),
    #[error("header length {0} is shorter than the fixed header")]
    BadHeaderLength(u16),
    #[error("truncated frame header at offset {0}")]
    TruncatedFrameHeader(usize),
    #[error("frame at offset {offset} claims {size} bytes, {available} left")]
    TruncatedFrame {
        offset: usize,
        size: usize,
        available: usize,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// IVF file header.
///
/// Layout (little endian):
///   bytes 0-3:   signature "DKIF"
///   bytes 4-5:   version (0)
///   bytes 6-7:   header length in bytes
///   bytes 8-11:  codec fourcc
///   bytes 12-13: width
///   bytes 14-15: height
///   bytes 16-19: time base denominator
///   bytes 20-23: time base numerator
///   bytes 24-27: frame count
///   bytes 28-31: unused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfHeader {
    pub version: u16,
    pub header_len: u16,
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub timebase_den: u32,
    pub timebase_num: u32,
    pub frame_count: u32,
}

impl IvfHeader {
    pub fn is_vp9(&self) -> bool {
        self.fourcc == VP9_FOURCC
    }

    /// Convert a frame timestamp in time base units to microseconds.
    pub fn timestamp_us(&self, timestamp: u64) -> i64 {
        if self.timebase_den == 0 {
            return timestamp as i64;
        }
        let us = timestamp as u128 * self.timebase_num as u128 * 1_000_000
            / self.timebase_den as u128;
        us.min(i64::MAX as u128) as i64
    }
}

/// One compressed frame, sharing the file's memory.
#[derive(Debug, Clone)]
pub struct IvfFrame {
    /// Timestamp in time base units.
    pub timestamp: u64,
    pub data: Bytes,
}

fn u16_le(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn u32_le(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Parse the file header at the start of `data`.
pub fn parse_file_header(data: &Bytes) -> Result<IvfHeader, IvfError> {
    if data.len() < FILE_HEADER_SIZE {
        return Err(IvfError::TooShort(data.len()));
    }

    let signature = [data[0], data[1], data[2], data[3]];
    if &signature != IVF_SIGNATURE {
        return Err(IvfError::BadSignature(signature));
    }

    let version = u16_le(data, 4);
    if version != 0 {
        return Err(IvfError::UnsupportedVersion(version));
    }

    let header_len = u16_le(data, 6);
    if (header_len as usize) < FILE_HEADER_SIZE {
        return Err(IvfError::BadHeaderLength(header_len));
    }

    let header = IvfHeader {
        version,
        header_len,
        fourcc: [data[8], data[9], data[10], data[11]],
        width: u16_le(data, 12),
        height: u16_le(data, 14),
        timebase_den: u32_le(data, 16),
        timebase_num: u32_le(data, 20),
        frame_count: u32_le(data, 24),
    };

    if !header.is_vp9() {
        warn!(fourcc = ?String::from_utf8_lossy(&header.fourcc), "IVF stream is not VP9");
    }
    debug!(
        width = header.width,
        height = header.height,
        frames = header.frame_count,
        "parsed IVF header"
    );
    Ok(header)
}

/// Parse the frame starting at `offset`.
///
/// Frame layout: 4-byte size, 8-byte timestamp, then `size` bytes of payload.
/// Returns the frame and the offset of the next one, or `None` at the end of the data.
pub fn parse_frame(data: &Bytes, offset: usize) -> Result<Option<(IvfFrame, usize)>, IvfError> {
    if offset == data.len() {
        return Ok(None);
    }
    if offset + FRAME_HEADER_SIZE > data.len() {
        return Err(IvfError::TruncatedFrameHeader(offset));
    }

    let size = u32_le(data, offset) as usize;
    let timestamp = u64::from_le_bytes([
        data[offset + 4],
        data[offset + 5],
        data[offset + 6],
        data[offset + 7],
        data[offset + 8],
        data[offset + 9],
        data[offset + 10],
        data[offset + 11],
    ]);

    let start = offset + FRAME_HEADER_SIZE;
    let available = data.len() - start;
    if size > available {
        return Err(IvfError::TruncatedFrame {
            offset,
            size,
            available,
        });
    }

    let frame = IvfFrame {
        timestamp,
        data: data.slice(start..start + size),
    };
    trace!(offset, size, timestamp, "IVF frame");
    Ok(Some((frame, start + size)))
}
