use std::path::PathBuf;

use crate::backend::DEFAULT_BACKEND_LIBRARY;
use crate::error::InitError;
use crate::format::{BufferMode, NegotiatedFormat, DEFAULT_DECODE_BORDER};
use crate::port::PortDefinition;

/// Default number of raw output buffers when the host does not say otherwise.
pub const DEFAULT_RAW_OUTPUT_BUFFERS: usize = 6;

/// Everything a host decides before a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: BufferMode,
    pub frame_width: u32,
    pub frame_height: u32,
    pub border: u32,
    /// Output buffer count in raw mode. Opaque mode always uses its own fixed count.
    pub raw_output_buffers: usize,
    /// Give up draining after this many consecutive polls without a frame.
    /// `None` drains until the backend surfaces a frame.
    pub drain_poll_limit: Option<u32>,
    pub backend_library: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            mode: BufferMode::OpaqueManaged,
            frame_width: 1920,
            frame_height: 1080,
            border: DEFAULT_DECODE_BORDER,
            raw_output_buffers: DEFAULT_RAW_OUTPUT_BUFFERS,
            drain_poll_limit: None,
            backend_library: PathBuf::from(DEFAULT_BACKEND_LIBRARY),
        }
    }
}

impl SessionConfig {
    pub fn input_port(&self) -> PortDefinition {
        PortDefinition::vp9_input(self.frame_width, self.frame_height)
    }

    /// Output port as the host configures it, before negotiation.
    pub fn output_port(&self) -> PortDefinition {
        PortDefinition::raw_output(self.frame_width, self.frame_height, self.raw_output_buffers)
    }

    pub fn negotiate(&self) -> Result<NegotiatedFormat, InitError> {
        NegotiatedFormat::negotiate(self.mode, &self.input_port(), &self.output_port(), self.border)
    }
}
