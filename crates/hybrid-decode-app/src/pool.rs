use std::io;
use std::ptr;
use std::sync::Arc;

use tracing::{debug, info};

use hybrid_decoder::{BufferHandle, HostBuffer};

const PAGE_SIZE: usize = 4096;

/// Anonymous mmap region split into equally sized output buffers.
///
/// Layout:
///   [0 .. slot_size)                  buffer 0
///   [slot_size .. 2 * slot_size)      buffer 1
///   ...
/// `slot_size` is `buffer_size` rounded up to a page so every buffer starts page aligned.
pub struct OutputPool {
    ptr: *mut u8,
    len: usize,
    buffer_size: usize,
    slot_size: usize,
    count: usize,
}

// SAFETY: the region is only written by the backend during a decode call, which the
// owning session serializes.
unsafe impl Send for OutputPool {}
unsafe impl Sync for OutputPool {}

impl OutputPool {
    /// Map `count` buffers of at least `buffer_size` bytes each.
    pub fn allocate(count: usize, buffer_size: usize) -> io::Result<Arc<Self>> {
        if count == 0 || buffer_size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty output pool"));
        }
        let slot_size = buffer_size.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let len = slot_size
            .checked_mul(count)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output pool too large"))?;

        // SAFETY: anonymous private mapping with no address hint.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        info!(count, buffer_size, size = len, "output pool mapped");
        Ok(Arc::new(OutputPool {
            ptr: ptr as *mut u8,
            len,
            buffer_size,
            slot_size,
            count,
        }))
    }

    /// One handle per buffer, each keeping the whole mapping alive.
    pub fn handles(self: &Arc<Self>) -> Vec<BufferHandle> {
        (0..self.count)
            .map(|i| {
                // SAFETY: buffer i lies inside the mapping, which the guard keeps mapped.
                let buffer = unsafe {
                    HostBuffer::from_raw_parts(
                        self.ptr.add(i * self.slot_size),
                        self.buffer_size,
                        Arc::clone(self),
                    )
                };
                BufferHandle::new(buffer)
            })
            .collect()
    }
}

impl Drop for OutputPool {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in allocate.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
        debug!(size = self.len, "output pool unmapped");
    }
}
