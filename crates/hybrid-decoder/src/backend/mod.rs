//! The decoder backend boundary.
//!
//! A backend owns its own pool of frame slots, numbered `0..count` in the order the
//! output buffers were bound in `init`. Everything behind this trait is opaque.

mod library;
mod loopback;

pub use library::{LibraryBackend, DEFAULT_BACKEND_LIBRARY};
pub use loopback::LoopbackBackend;

use crate::error::BackendError;

/// Output pool handed to the backend once, right after `open`.
#[derive(Debug, Clone, Copy)]
pub struct PoolBinding<'a> {
    pub buffer_size: usize,
    pub buffer_stride: u32,
    pub buffer_addresses: &'a [usize],
}

impl PoolBinding<'_> {
    pub fn buffer_count(&self) -> usize {
        self.buffer_addresses.len()
    }
}

/// Capabilities every decoder backend provides.
pub trait DecoderBackend {
    /// Establish a backend session.
    fn open(&mut self) -> Result<(), BackendError>;

    /// Bind the output pool. Called once per session.
    fn init(&mut self, pool: &PoolBinding<'_>) -> Result<(), BackendError>;

    /// Submit one compressed payload. Blocks until the backend has accepted it.
    fn decode(&mut self, payload: &[u8]) -> Result<(), BackendError>;

    /// Whether the backend has room for another submission.
    fn is_buffer_available(&self) -> bool;

    /// Slot id of a completed frame, or `None` if nothing is ready.
    ///
    /// The id is reported as-is; callers must validate it against the pool size.
    fn get_output(&mut self) -> Option<i32>;

    /// Tell the backend the buffer at `address` was consumed downstream and may be reused.
    fn signal_render_done(&mut self, address: usize) -> Result<(), BackendError>;

    /// Release the backend session.
    fn close(&mut self) -> Result<(), BackendError>;
}

impl<B: DecoderBackend + ?Sized> DecoderBackend for Box<B> {
    fn open(&mut self) -> Result<(), BackendError> {
        (**self).open()
    }

    fn init(&mut self, pool: &PoolBinding<'_>) -> Result<(), BackendError> {
        (**self).init(pool)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(), BackendError> {
        (**self).decode(payload)
    }

    fn is_buffer_available(&self) -> bool {
        (**self).is_buffer_available()
    }

    fn get_output(&mut self) -> Option<i32> {
        (**self).get_output()
    }

    fn signal_render_done(&mut self, address: usize) -> Result<(), BackendError> {
        (**self).signal_render_done(address)
    }

    fn close(&mut self) -> Result<(), BackendError> {
        (**self).close()
    }
}
