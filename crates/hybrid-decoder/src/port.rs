//! Port definitions and the host-facing queries derived from them.

use bitflags::bitflags;

pub const VP9_MIME_TYPE: &str = "video/x-vnd.on2.vp9";
/// MIME advertised on the output port once buffers are backend managed.
pub const OPAQUE_RAW_MIME_TYPE: &str = "video/x-raw-vaapi";
pub const RAW_MIME_TYPE: &str = "video/x-raw";

pub const INPUT_MIN_BUFFER_COUNT: usize = 1;
pub const INPUT_ACTUAL_BUFFER_COUNT: usize = 5;
pub const INPUT_BUFFER_SIZE: usize = 1_382_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortIndex {
    Input = 0,
    Output = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Compressed input, no pixel layout.
    Unused,
    /// Planar 4:2:0, Y then U then V.
    Yuv420Planar,
    /// Planar 4:2:0, Y then V then U.
    Yv12,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDefinition {
    pub index: PortIndex,
    pub enabled: bool,
    pub buffer_count_min: usize,
    pub buffer_count_actual: usize,
    pub buffer_size: usize,
    pub mime_type: &'static str,
    pub frame_width: u32,
    pub frame_height: u32,
    pub stride: u32,
    pub pixel_format: PixelFormat,
}

impl PortDefinition {
    /// Compressed VP9 input port.
    pub fn vp9_input(frame_width: u32, frame_height: u32) -> Self {
        PortDefinition {
            index: PortIndex::Input,
            enabled: true,
            buffer_count_min: INPUT_MIN_BUFFER_COUNT,
            buffer_count_actual: INPUT_ACTUAL_BUFFER_COUNT,
            buffer_size: INPUT_BUFFER_SIZE,
            mime_type: VP9_MIME_TYPE,
            frame_width,
            frame_height,
            stride: frame_width,
            pixel_format: PixelFormat::Unused,
        }
    }

    /// Output port carrying raw host memory, before any mode negotiation.
    pub fn raw_output(frame_width: u32, frame_height: u32, buffer_count: usize) -> Self {
        let buffer_size = frame_width as usize * frame_height as usize * 3 / 2;
        PortDefinition {
            index: PortIndex::Output,
            enabled: true,
            buffer_count_min: buffer_count,
            buffer_count_actual: buffer_count,
            buffer_size,
            mime_type: RAW_MIME_TYPE,
            frame_width,
            frame_height,
            stride: frame_width,
            pixel_format: PixelFormat::Yuv420Planar,
        }
    }
}

/// Visible region of a decoded frame inside the padded output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

bitflags! {
    /// Usage bits requested for backend-managed output buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NativeBufferUsage: u32 {
        const SW_READ_NEVER = 0x0000_0000;
        const SW_WRITE_OFTEN = 0x0000_0030;
        const HW_TEXTURE = 0x0000_0100;
        const EXTERNAL_DISP = 0x0000_2000;
    }
}

impl NativeBufferUsage {
    /// Texture sampling, external display, CPU writes and never CPU reads.
    pub fn opaque_output() -> Self {
        NativeBufferUsage::HW_TEXTURE
            | NativeBufferUsage::SW_READ_NEVER
            | NativeBufferUsage::SW_WRITE_OFTEN
            | NativeBufferUsage::EXTERNAL_DISP
    }
}
