use tracing::debug;

use crate::error::InitError;
use crate::port::{CropRect, NativeBufferUsage, PixelFormat, PortDefinition, OPAQUE_RAW_MIME_TYPE};

/// Reference frames the backend may hold at once.
pub const MAX_REFERENCE_FRAMES: usize = 8;
/// Extra buffers in flight while the backend decodes asynchronously.
pub const ASYNC_PIPELINE_DEPTH: usize = 3;
/// 8 reference + 1 current + 3 for asynchronous mode.
pub const OPAQUE_OUTPUT_BUFFER_COUNT: usize = MAX_REFERENCE_FRAMES + 1 + ASYNC_PIPELINE_DEPTH;

/// Border added on every side of the frame for backend edge extension.
pub const DEFAULT_DECODE_BORDER: u32 = 0;

const HEIGHT_ALIGN: u32 = 32;
const STRIDE_ALIGN: u32 = 32;
const CHROMA_STRIDE_ALIGN: usize = 16;

/// Who owns the memory of the output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Plain host memory; pixels land directly in the buffer.
    #[default]
    RawMemory,
    /// Graphics buffers managed by a buffer-sharing subsystem; the payload is a handle.
    OpaqueManaged,
}

fn align(x: u32, y: u32) -> Option<u32> {
    // y must be a power of 2.
    Some(x.checked_add(y - 1)? & !(y - 1))
}

/// `size` plus `border` on both sides, aligned to `to`.
fn padded(size: u32, border: u32, to: u32) -> Option<u32> {
    align(size.checked_add(border.checked_mul(2)?)?, to)
}

fn align_usize(x: usize, y: usize) -> usize {
    (x + y - 1) & !(y - 1)
}

/// Frame layout of the output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub border: u32,
}

impl Geometry {
    pub fn luma_size(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Chroma planes are half width and half height, each row 16-byte aligned.
    pub fn chroma_stride(&self) -> usize {
        align_usize(self.stride as usize / 2, CHROMA_STRIDE_ALIGN)
    }

    pub fn chroma_size(&self) -> usize {
        self.chroma_stride() * self.height as usize / 2
    }

    /// Bytes one output buffer must hold.
    pub fn buffer_size(&self) -> usize {
        self.luma_size() + 2 * self.chroma_size()
    }
}

/// Outcome of mode negotiation. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedFormat {
    mode: BufferMode,
    /// Visible frame size as configured on the input side.
    visible_width: u32,
    visible_height: u32,
    geometry: Geometry,
    output_port: PortDefinition,
}

impl NegotiatedFormat {
    /// Decide the output layout for `mode`, starting from the host's ports.
    ///
    /// The visible frame size comes from the input port. `border` only applies to
    /// backend-managed buffers; raw buffers are never padded.
    pub fn negotiate(
        mode: BufferMode,
        input_port: &PortDefinition,
        output_port: &PortDefinition,
        border: u32,
    ) -> Result<Self, InitError> {
        let visible_width = input_port.frame_width;
        let visible_height = input_port.frame_height;
        let mut port = output_port.clone();

        let geometry = match mode {
            BufferMode::RawMemory => Geometry {
                width: port.frame_width,
                height: port.frame_height,
                stride: port.stride,
                border: 0,
            },
            BufferMode::OpaqueManaged => {
                let (frame_width, frame_height) = (port.frame_width, port.frame_height);
                let invalid = move || InitError::InvalidGeometry {
                    width: frame_width,
                    height: frame_height,
                    border,
                };
                let width = padded(frame_width, border, 1).ok_or_else(invalid)?;
                let height = padded(frame_height, border, HEIGHT_ALIGN).ok_or_else(invalid)?;
                let stride = align(width, STRIDE_ALIGN).ok_or_else(invalid)?;
                let geometry = Geometry {
                    width,
                    height,
                    stride,
                    border,
                };

                port.buffer_count_min = OPAQUE_OUTPUT_BUFFER_COUNT;
                port.buffer_count_actual = OPAQUE_OUTPUT_BUFFER_COUNT;
                port.mime_type = OPAQUE_RAW_MIME_TYPE;
                port.pixel_format = PixelFormat::Yv12;
                port.frame_width = geometry.width;
                port.frame_height = geometry.height;
                port.stride = geometry.stride;
                port.buffer_size = geometry.buffer_size();
                geometry
            }
        };

        debug!(
            ?mode,
            width = geometry.width,
            height = geometry.height,
            stride = geometry.stride,
            buffers = port.buffer_count_actual,
            "negotiated output format"
        );

        Ok(NegotiatedFormat {
            mode,
            visible_width,
            visible_height,
            geometry,
            output_port: port,
        })
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn output_port(&self) -> &PortDefinition {
        &self.output_port
    }

    /// Upper bound on the number of output buffers the registry may hold.
    pub fn output_buffer_count(&self) -> usize {
        self.output_port.buffer_count_actual
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.output_port.pixel_format
    }

    /// Visible region inside the output buffer.
    pub fn output_crop(&self) -> CropRect {
        CropRect {
            left: self.geometry.border,
            top: self.geometry.border,
            width: self.visible_width,
            height: self.visible_height,
        }
    }

    /// Usage bits to request for output buffers, if they are backend managed.
    pub fn native_buffer_usage(&self) -> Option<NativeBufferUsage> {
        match self.mode {
            BufferMode::OpaqueManaged => Some(NativeBufferUsage::opaque_output()),
            BufferMode::RawMemory => None,
        }
    }
}
