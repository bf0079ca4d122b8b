use std::collections::VecDeque;

use tracing::{debug, trace};

use super::{DecoderBackend, PoolBinding};
use crate::error::BackendError;

/// Software stand-in for the hybrid decoder.
///
/// Every non-empty submission "decodes" into the lowest free slot. Frames are held back
/// until more than `latency` of them are pending, mimicking reorder delay. A poll with no
/// submission since the previous poll releases a held frame, which is how the backend
/// flushes while the host drains.
#[derive(Debug)]
pub struct LoopbackBackend {
    latency: usize,
    addresses: Vec<usize>,
    free: VecDeque<usize>,
    pending: VecDeque<usize>,
    polled_since_decode: bool,
    opened: bool,
}

impl LoopbackBackend {
    pub fn new(latency: usize) -> Self {
        LoopbackBackend {
            latency,
            addresses: Vec::new(),
            free: VecDeque::new(),
            pending: VecDeque::new(),
            polled_since_decode: false,
            opened: false,
        }
    }

    /// Frames decoded but not yet surfaced.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl DecoderBackend for LoopbackBackend {
    fn open(&mut self) -> Result<(), BackendError> {
        if self.opened {
            return Err(BackendError::new("open"));
        }
        self.opened = true;
        Ok(())
    }

    fn init(&mut self, pool: &PoolBinding<'_>) -> Result<(), BackendError> {
        if !self.opened || pool.buffer_count() == 0 {
            return Err(BackendError::new("init"));
        }
        self.addresses = pool.buffer_addresses.to_vec();
        self.free = (0..self.addresses.len()).collect();
        self.pending.clear();
        debug!(
            buffers = self.addresses.len(),
            size = pool.buffer_size,
            stride = pool.buffer_stride,
            "loopback pool bound"
        );
        Ok(())
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(), BackendError> {
        if !self.opened {
            return Err(BackendError::new("decode"));
        }
        self.polled_since_decode = false;
        if payload.is_empty() {
            return Ok(());
        }
        let slot = self.free.pop_front().ok_or(BackendError::new("decode"))?;
        self.pending.push_back(slot);
        trace!(slot, len = payload.len(), "loopback decoded");
        Ok(())
    }

    fn is_buffer_available(&self) -> bool {
        self.opened && !self.free.is_empty()
    }

    fn get_output(&mut self) -> Option<i32> {
        let flushing = self.polled_since_decode;
        self.polled_since_decode = true;
        if self.pending.len() > self.latency || (flushing && !self.pending.is_empty()) {
            let slot = self.pending.pop_front()?;
            // Pool sizes are bounded by the negotiated buffer count.
            Some(slot as i32)
        } else {
            None
        }
    }

    fn signal_render_done(&mut self, address: usize) -> Result<(), BackendError> {
        let slot = self
            .addresses
            .iter()
            .position(|&a| a == address)
            .ok_or(BackendError::new("signal_render_done"))?;
        if !self.free.contains(&slot) && !self.pending.contains(&slot) {
            self.free.push_back(slot);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.opened = false;
        self.free.clear();
        self.pending.clear();
        Ok(())
    }
}
