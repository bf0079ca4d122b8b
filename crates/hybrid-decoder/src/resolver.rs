use tracing::{error, trace};

use crate::backend::DecoderBackend;
use crate::buffer::{BufferFlags, BufferHandle, Retention};
use crate::error::{DecodeError, Result};
use crate::format::{BufferMode, NegotiatedFormat};
use crate::registry::FrameSlotRegistry;

/// Filled length reported for backend-managed buffers: the payload is a handle, not pixels.
pub const OPAQUE_PAYLOAD_LEN: usize = std::mem::size_of::<*const u8>();

/// A frame the backend finished, bound to its registry buffer.
#[derive(Debug, Clone)]
pub struct ResolvedFrame {
    pub handle: BufferHandle,
    pub slot: usize,
    /// `Overridden` when `handle` is not the buffer the host presented.
    pub retention: Retention,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Ready(ResolvedFrame),
    /// Nothing finished yet. Not an error.
    NotReady,
}

/// Turns backend output notifications into registry buffers.
pub struct RenderResolver<'a> {
    registry: &'a FrameSlotRegistry,
    format: &'a NegotiatedFormat,
}

impl<'a> RenderResolver<'a> {
    pub fn new(registry: &'a FrameSlotRegistry, format: &'a NegotiatedFormat) -> Self {
        RenderResolver { registry, format }
    }

    /// Ask the backend for a finished frame.
    ///
    /// `output` is the buffer the host presented on this call and `input_flags` the flags
    /// of the input that triggered it.
    pub fn resolve<B>(
        &self,
        backend: &mut B,
        output: &BufferHandle,
        input_flags: BufferFlags,
    ) -> Result<Resolution>
    where
        B: DecoderBackend + ?Sized,
    {
        let Some(slot) = backend.get_output() else {
            trace!("no output frame ready");
            return Ok(Resolution::NotReady);
        };

        let Some(bound) = self.registry.lookup(slot) else {
            error!(slot, count = self.registry.len(), "backend reported unknown slot");
            return Err(DecodeError::BackendContractViolation {
                slot,
                count: self.registry.len(),
            });
        };

        let (mut handle, retention) = if bound.same_buffer(output) {
            (output.clone(), Retention::Consumed)
        } else {
            (bound.clone(), Retention::Overridden)
        };

        handle.offset = 0;
        handle.filled_len = match self.format.mode() {
            BufferMode::OpaqueManaged => OPAQUE_PAYLOAD_LEN,
            BufferMode::RawMemory => self.format.geometry().buffer_size(),
        };
        handle.flags = if input_flags.contains(BufferFlags::END_OF_STREAM) {
            BufferFlags::END_OF_STREAM
        } else {
            BufferFlags::empty()
        };

        trace!(slot, ?retention, "resolved output frame");
        Ok(Resolution::Ready(ResolvedFrame {
            handle,
            slot: slot as usize,
            retention,
        }))
    }
}
