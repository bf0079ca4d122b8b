use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};

use libloading::os::unix;
use tracing::{debug, error, info, warn};

use super::{DecoderBackend, PoolBinding};
use crate::error::{BackendError, InitError};
use crate::ffi::{self, Capabilities, CapabilityTable};

pub const DEFAULT_BACKEND_LIBRARY: &str = "libDecoderVP9Hybrid.so";

/// A loaded shared object, unloaded when dropped.
struct Library {
    inner: libloading::Library,
    path: PathBuf,
}

impl Library {
    fn open(path: &Path) -> Result<Self, InitError> {
        // SAFETY: the backend library runs no initializers beyond its own static setup.
        let inner = unsafe { unix::Library::open(Some(path), unix::RTLD_NOW) }.map_err(|e| {
            error!(path = %path.display(), %e, "dlopen failed");
            InitError::LibraryLoad {
                path: path.to_owned(),
                reason: e.to_string(),
            }
        })?;

        info!(path = %path.display(), "backend library loaded");
        Ok(Library {
            inner: inner.into(),
            path: path.to_owned(),
        })
    }

    /// Look up `name` as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the symbol's real signature.
    unsafe fn symbol<F: Copy>(&self, name: &CStr) -> Option<F> {
        match self.inner.get::<F>(name.to_bytes_with_nul()) {
            Ok(symbol) => Some(*symbol),
            Err(e) => {
                warn!(symbol = ?name, %e, "backend symbol not found");
                None
            }
        }
    }

    /// Look up every backend entry point.
    fn capability_table(&self) -> CapabilityTable {
        // SAFETY: each symbol is looked up with the signature documented for the backend ABI.
        unsafe {
            CapabilityTable {
                open: self.symbol(ffi::SYM_OPEN),
                close: self.symbol(ffi::SYM_CLOSE),
                init: self.symbol(ffi::SYM_INIT),
                signal_render_done: self.symbol(ffi::SYM_SIGNAL_RENDER_DONE),
                decode: self.symbol(ffi::SYM_DECODE),
                is_buffer_available: self.symbol(ffi::SYM_IS_BUFFER_AVAILABLE),
                get_output: self.symbol(ffi::SYM_GET_OUTPUT),
            }
        }
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "unloading backend library");
    }
}

/// Backend implemented by the hybrid decoder shared library.
pub struct LibraryBackend {
    caps: Capabilities,
    ctx: *mut c_void,
    hybrid_ctx: *mut c_void,
    opened: bool,
    // Dropped last so no entry point outlives the mapping.
    library: Library,
}

// SAFETY: the backend contexts are only touched through &mut self or the backend's own
// stateless queries, and a session never shares its backend between threads.
unsafe impl Send for LibraryBackend {}

impl LibraryBackend {
    /// Load the library at `path` and resolve all of its entry points.
    ///
    /// Fails without leaving the library loaded if any entry point is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InitError> {
        let library = Library::open(path.as_ref())?;
        let caps = library.capability_table().resolve()?;
        Ok(LibraryBackend {
            caps,
            ctx: std::ptr::null_mut(),
            hybrid_ctx: std::ptr::null_mut(),
            opened: false,
            library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.library.path
    }
}

impl DecoderBackend for LibraryBackend {
    fn open(&mut self) -> Result<(), BackendError> {
        // SAFETY: both out-pointers are valid for writes.
        let ok = unsafe { (self.caps.open)(&mut self.ctx, &mut self.hybrid_ctx) };
        if !ok {
            error!("open hybrid decoder failed");
            return Err(BackendError::new("Decoder_Open"));
        }
        self.opened = true;
        Ok(())
    }

    fn init(&mut self, pool: &PoolBinding<'_>) -> Result<(), BackendError> {
        let mut addresses = pool.buffer_addresses.to_vec();
        let buffer_size =
            u32::try_from(pool.buffer_size).map_err(|_| BackendError::new("Decoder_Init"))?;
        let buffer_count =
            i32::try_from(addresses.len()).map_err(|_| BackendError::new("Decoder_Init"))?;
        // SAFETY: addresses outlives the call and holds buffer_count entries.
        let ok = unsafe {
            (self.caps.init)(
                self.hybrid_ctx,
                buffer_size,
                pool.buffer_stride,
                buffer_count,
                addresses.as_mut_ptr(),
            )
        };
        if ok {
            Ok(())
        } else {
            Err(BackendError::new("Decoder_Init"))
        }
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(), BackendError> {
        let len = u32::try_from(payload.len()).map_err(|_| BackendError::new("Decoder_Decode"))?;
        // SAFETY: the backend only reads `len` bytes from the payload for the duration of the
        // call.
        let ok = unsafe {
            (self.caps.decode)(self.ctx, self.hybrid_ctx, payload.as_ptr() as *mut u8, len)
        };
        if ok {
            Ok(())
        } else {
            Err(BackendError::new("Decoder_Decode"))
        }
    }

    fn is_buffer_available(&self) -> bool {
        // SAFETY: takes no arguments.
        unsafe { (self.caps.is_buffer_available)() }
    }

    fn get_output(&mut self) -> Option<i32> {
        // SAFETY: ctx came from a successful open.
        match unsafe { (self.caps.get_output)(self.ctx) } {
            ffi::GET_OUTPUT_NONE => None,
            slot => Some(slot),
        }
    }

    fn signal_render_done(&mut self, address: usize) -> Result<(), BackendError> {
        // SAFETY: address names a buffer bound in init.
        if unsafe { (self.caps.signal_render_done)(address) } {
            Ok(())
        } else {
            Err(BackendError::new("Decoder_SingalRenderDone"))
        }
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        // SAFETY: both contexts came from a successful open and are closed once.
        let ok = unsafe { (self.caps.close)(self.ctx, self.hybrid_ctx) };
        self.ctx = std::ptr::null_mut();
        self.hybrid_ctx = std::ptr::null_mut();
        if ok {
            Ok(())
        } else {
            Err(BackendError::new("Decoder_Close"))
        }
    }
}

impl Drop for LibraryBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(%e, "closing backend on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library() {
        let err = LibraryBackend::load("/nonexistent/libDecoderVP9Hybrid.so")
            .err()
            .expect("load should fail");
        assert!(matches!(err, InitError::LibraryLoad { .. }));
    }

    #[test]
    fn test_library_without_backend_symbols() {
        // libc is always loadable and exports none of the decoder entry points.
        let err = LibraryBackend::load("libc.so.6").err().expect("load should fail");
        assert!(matches!(err, InitError::MissingCapability("Decoder_Open")));
    }
}
