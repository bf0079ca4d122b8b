pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod port;
pub mod registry;
pub mod resolver;
pub mod session;

mod ffi;

pub use backend::{DecoderBackend, LibraryBackend, LoopbackBackend, PoolBinding};
pub use buffer::{BufferFlags, BufferHandle, HostBuffer, Retention, RetentionPair};
pub use config::SessionConfig;
pub use error::{BackendError, DecodeError, InitError};
pub use format::{BufferMode, Geometry, NegotiatedFormat};
pub use port::{CropRect, NativeBufferUsage, PixelFormat, PortDefinition};
pub use registry::FrameSlotRegistry;
pub use resolver::{RenderResolver, Resolution, ResolvedFrame, OPAQUE_PAYLOAD_LEN};
pub use session::{DecoderSession, Exchange, SessionStats};
