use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

bitflags! {
    /// Per-buffer flags exchanged with the host.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const END_OF_STREAM = 0x0000_0001;
        const DECODE_ONLY = 0x0000_0004;
        const CODEC_CONFIG = 0x0000_0080;
    }
}

/// Memory behind one host buffer.
///
/// The host owns the memory; handles share it by reference and the address is the
/// buffer's identity as far as the backend is concerned.
pub struct HostBuffer {
    ptr: *mut u8,
    capacity: usize,
    backing: Backing,
}

enum Backing {
    /// Heap memory allocated by `from_vec`, freed on drop.
    Owned,
    /// Memory owned elsewhere, kept alive by the guard.
    External(#[allow(dead_code)] Box<dyn Any + Send + Sync>),
    Null,
}

// SAFETY: the memory is only read through bounds-checked slices and only written by
// backends during a call, which is serialized by the owning session.
unsafe impl Send for HostBuffer {}
unsafe impl Sync for HostBuffer {}

impl HostBuffer {
    /// Take ownership of `data` as a host buffer.
    pub fn from_vec(data: Vec<u8>) -> Arc<Self> {
        let boxed = data.into_boxed_slice();
        let capacity = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Arc::new(HostBuffer {
            ptr,
            capacity,
            backing: Backing::Owned,
        })
    }

    /// A zeroed buffer of `capacity` bytes.
    pub fn zeroed(capacity: usize) -> Arc<Self> {
        Self::from_vec(vec![0u8; capacity])
    }

    /// A buffer with no backing memory, as a misbehaving host might present.
    pub fn null() -> Arc<Self> {
        Arc::new(HostBuffer {
            ptr: std::ptr::null_mut(),
            capacity: 0,
            backing: Backing::Null,
        })
    }

    /// Wrap memory owned by someone else.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `capacity` bytes for as long as `guard`
    /// is alive.
    pub unsafe fn from_raw_parts<G>(ptr: *mut u8, capacity: usize, guard: G) -> Arc<Self>
    where
        G: Any + Send + Sync,
    {
        Arc::new(HostBuffer {
            ptr,
            capacity,
            backing: Backing::External(Box::new(guard)),
        })
    }

    pub fn address(&self) -> usize {
        self.ptr as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Borrow `len` bytes starting at `offset`, or `None` if that range is not backed.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&[u8]> {
        if self.ptr.is_null() {
            return None;
        }
        let end = offset.checked_add(len)?;
        if end > self.capacity {
            return None;
        }
        // SAFETY: the range was checked against the backing allocation above.
        Some(unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) })
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        if let Backing::Owned = self.backing {
            // SAFETY: `ptr` and `capacity` came from `Box::into_raw` in `from_vec`.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    self.ptr,
                    self.capacity,
                )))
            };
        }
    }
}

impl fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// One host buffer as presented for a single exchange call.
///
/// The engine never mutates a handle the host passed in; it returns new values instead.
#[derive(Clone, Debug)]
pub struct BufferHandle {
    buffer: Arc<HostBuffer>,
    pub offset: usize,
    pub filled_len: usize,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
    pub flags: BufferFlags,
}

impl BufferHandle {
    /// An empty handle over `buffer`.
    pub fn new(buffer: Arc<HostBuffer>) -> Self {
        BufferHandle {
            buffer,
            offset: 0,
            filled_len: 0,
            timestamp: 0,
            flags: BufferFlags::empty(),
        }
    }

    /// An input handle filled with `payload`.
    pub fn with_payload(payload: Vec<u8>, timestamp: i64, flags: BufferFlags) -> Self {
        let filled_len = payload.len();
        BufferHandle {
            buffer: HostBuffer::from_vec(payload),
            offset: 0,
            filled_len,
            timestamp,
            flags,
        }
    }

    pub fn buffer(&self) -> &Arc<HostBuffer> {
        &self.buffer
    }

    pub fn address(&self) -> usize {
        self.buffer.address()
    }

    /// Whether both handles refer to the same underlying host buffer.
    pub fn same_buffer(&self, other: &BufferHandle) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    /// The filled region of the buffer.
    pub fn payload(&self) -> Option<&[u8]> {
        self.buffer.slice(self.offset, self.filled_len)
    }
}

/// What the host should do with a buffer it presented, decided once per port per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Normal hand-back.
    #[default]
    Consumed,
    /// Present the same buffer again on the next call.
    RetainForRedelivery,
    /// The returned handle is a different buffer than the one presented.
    Overridden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionPair {
    pub input: Retention,
    pub output: Retention,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_respects_offset_and_length() {
        let mut handle = BufferHandle::with_payload(vec![1, 2, 3, 4, 5], 0, BufferFlags::empty());
        handle.offset = 1;
        handle.filled_len = 3;
        assert_eq!(handle.payload(), Some(&[2u8, 3, 4][..]));
    }

    #[test]
    fn test_payload_out_of_bounds() {
        let mut handle = BufferHandle::with_payload(vec![0; 4], 0, BufferFlags::empty());
        handle.offset = 2;
        handle.filled_len = 3;
        assert!(handle.payload().is_none());
    }

    #[test]
    fn test_null_buffer_has_no_payload() {
        let handle = BufferHandle::new(HostBuffer::null());
        assert!(handle.buffer().is_null());
        assert!(handle.payload().is_none());
    }

    #[test]
    fn test_same_buffer_tracks_identity_not_contents() {
        let a = BufferHandle::new(HostBuffer::zeroed(16));
        let b = BufferHandle::new(HostBuffer::zeroed(16));
        let mut a2 = a.clone();
        a2.filled_len = 8;
        assert!(a.same_buffer(&a2));
        assert!(!a.same_buffer(&b));
    }

    #[test]
    fn test_external_guard_kept_alive() {
        let backing = Arc::new(std::sync::Mutex::new(vec![7u8; 8]));
        let ptr = backing.lock().unwrap().as_mut_ptr();
        let buffer = unsafe { HostBuffer::from_raw_parts(ptr, 8, Arc::clone(&backing)) };
        assert_eq!(Arc::strong_count(&backing), 2);
        assert_eq!(buffer.slice(0, 2), Some(&[7u8, 7][..]));
        drop(buffer);
        assert_eq!(Arc::strong_count(&backing), 1);
    }
}
