//! C ABI of the hybrid decoder backend library.
//!
//! The library exports seven plain C functions; they are resolved with `dlsym` and kept
//! in a capability table until every one of them has been found.

use std::ffi::{c_void, CStr};
use std::os::raw::{c_int, c_uint};

use crate::error::InitError;

pub type OpenFn = unsafe extern "C" fn(ctx: *mut *mut c_void, hybrid_ctx: *mut *mut c_void) -> bool;
pub type InitFn = unsafe extern "C" fn(
    hybrid_ctx: *mut c_void,
    buffer_size: c_uint,
    buffer_stride: c_uint,
    buffer_count: c_int,
    buffer_addresses: *mut usize,
) -> bool;
pub type CloseFn = unsafe extern "C" fn(ctx: *mut c_void, hybrid_ctx: *mut c_void) -> bool;
pub type SignalRenderDoneFn = unsafe extern "C" fn(buffer_address: usize) -> bool;
pub type DecodeFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    hybrid_ctx: *mut c_void,
    payload: *mut u8,
    payload_len: c_uint,
) -> bool;
pub type IsBufferAvailableFn = unsafe extern "C" fn() -> bool;
/// Returns a slot id, or -1 when no frame is ready.
pub type GetOutputFn = unsafe extern "C" fn(ctx: *mut c_void) -> c_int;

pub const GET_OUTPUT_NONE: c_int = -1;

// ── Exported symbol names ──

pub const SYM_OPEN: &CStr = c"Decoder_Open";
pub const SYM_CLOSE: &CStr = c"Decoder_Close";
pub const SYM_INIT: &CStr = c"Decoder_Init";
// Spelling matches the library export.
pub const SYM_SIGNAL_RENDER_DONE: &CStr = c"Decoder_SingalRenderDone";
pub const SYM_DECODE: &CStr = c"Decoder_Decode";
pub const SYM_IS_BUFFER_AVAILABLE: &CStr = c"Decoder_IsBufferAvailable";
pub const SYM_GET_OUTPUT: &CStr = c"Decoder_GetOutput";

/// Entry points as looked up, any of which may be missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityTable {
    pub open: Option<OpenFn>,
    pub close: Option<CloseFn>,
    pub init: Option<InitFn>,
    pub signal_render_done: Option<SignalRenderDoneFn>,
    pub decode: Option<DecodeFn>,
    pub is_buffer_available: Option<IsBufferAvailableFn>,
    pub get_output: Option<GetOutputFn>,
}

/// Entry points after every one of them has been found.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub open: OpenFn,
    pub close: CloseFn,
    pub init: InitFn,
    pub signal_render_done: SignalRenderDoneFn,
    pub decode: DecodeFn,
    pub is_buffer_available: IsBufferAvailableFn,
    pub get_output: GetOutputFn,
}

fn require<F>(f: Option<F>, name: &'static CStr) -> Result<F, InitError> {
    f.ok_or_else(|| InitError::MissingCapability(name.to_str().unwrap_or("<non-utf8 symbol>")))
}

impl CapabilityTable {
    /// Check the whole table at once; the first missing entry point fails initialization.
    pub fn resolve(self) -> Result<Capabilities, InitError> {
        Ok(Capabilities {
            open: require(self.open, SYM_OPEN)?,
            close: require(self.close, SYM_CLOSE)?,
            init: require(self.init, SYM_INIT)?,
            signal_render_done: require(self.signal_render_done, SYM_SIGNAL_RENDER_DONE)?,
            decode: require(self.decode, SYM_DECODE)?,
            is_buffer_available: require(self.is_buffer_available, SYM_IS_BUFFER_AVAILABLE)?,
            get_output: require(self.get_output, SYM_GET_OUTPUT)?,
        })
    }
}
