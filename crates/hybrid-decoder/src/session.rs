use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::backend::{DecoderBackend, PoolBinding};
use crate::buffer::{BufferFlags, BufferHandle, HostBuffer, Retention, RetentionPair};
use crate::error::{DecodeError, InitError, Result};
use crate::format::NegotiatedFormat;
use crate::port::{CropRect, NativeBufferUsage};
use crate::registry::FrameSlotRegistry;
use crate::resolver::{RenderResolver, Resolution};

/// Handles and retention decisions returned from one exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub input: BufferHandle,
    pub output: BufferHandle,
    pub retention: RetentionPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    /// The backend broke its contract; only teardown is allowed.
    Faulted,
    Closed,
}

/// The end-of-stream input the host was asked to present again.
#[derive(Debug)]
struct Drain {
    input: Arc<HostBuffer>,
    empty_polls: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    pub decoded: u64,
    pub frames_out: u64,
    pub overridden: u64,
    pub not_ready: u64,
}

/// An open decode session: backend, negotiated format and output pool.
///
/// Dropping the session closes the backend if `teardown` was not called.
pub struct DecoderSession<B: DecoderBackend> {
    backend: B,
    format: NegotiatedFormat,
    registry: FrameSlotRegistry,
    state: State,
    output_port_enabled: bool,
    drain: Option<Drain>,
    drain_poll_limit: Option<u32>,
    end_of_stream: bool,
    stats: SessionStats,
}

impl<B: DecoderBackend> DecoderSession<B> {
    /// Open `backend` and bind `output_buffers` as its frame slots.
    ///
    /// Either everything is acquired or nothing is: on failure the backend is closed again
    /// and no registry survives.
    pub fn initialize(
        mut backend: B,
        format: NegotiatedFormat,
        output_buffers: Vec<BufferHandle>,
    ) -> std::result::Result<Self, InitError> {
        let geometry = *format.geometry();
        let registry = FrameSlotRegistry::populate(
            output_buffers,
            format.output_buffer_count(),
            geometry.buffer_size(),
        )?;

        if let Err(e) = backend.open() {
            error!(%e, "backend open failed");
            return Err(InitError::OpenRejected);
        }

        let addresses = registry.addresses();
        let binding = PoolBinding {
            buffer_size: geometry.buffer_size(),
            buffer_stride: geometry.stride,
            buffer_addresses: &addresses,
        };
        if let Err(e) = backend.init(&binding) {
            error!(%e, "backend init failed");
            if let Err(e) = backend.close() {
                warn!(%e, "closing backend after failed init");
            }
            return Err(InitError::InitRejected);
        }

        info!(
            mode = ?format.mode(),
            slots = registry.len(),
            buffer_size = binding.buffer_size,
            stride = binding.buffer_stride,
            "decoder session open"
        );

        Ok(DecoderSession {
            backend,
            format,
            registry,
            state: State::Open,
            output_port_enabled: true,
            drain: None,
            drain_poll_limit: None,
            end_of_stream: false,
            stats: SessionStats::default(),
        })
    }

    /// Stop draining after `limit` consecutive polls without a frame.
    pub fn with_drain_poll_limit(mut self, limit: Option<u32>) -> Self {
        self.drain_poll_limit = limit;
        self
    }

    pub fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    pub fn registry(&self) -> &FrameSlotRegistry {
        &self.registry
    }

    pub fn output_crop(&self) -> CropRect {
        self.format.output_crop()
    }

    pub fn native_buffer_usage(&self) -> Option<NativeBufferUsage> {
        self.format.native_buffer_usage()
    }

    /// Whether an end-of-stream output has been handed back.
    pub fn end_of_stream_reached(&self) -> bool {
        self.end_of_stream
    }

    /// Whether an end-of-stream input is held on the input port.
    pub fn is_draining(&self) -> bool {
        self.drain.is_some()
    }

    pub fn set_output_port_enabled(&mut self, enabled: bool) {
        if self.output_port_enabled != enabled {
            debug!(enabled, "output port state changed");
        }
        self.output_port_enabled = enabled;
    }

    /// Whether the host may call `exchange` now.
    ///
    /// `host_buffers_available` is the host's own baseline check (an input and an output
    /// buffer are queued). A disabled output port or a full backend also blocks.
    pub fn is_available(&self, host_buffers_available: bool) -> bool {
        host_buffers_available
            && self.state == State::Open
            && self.output_port_enabled
            && self.backend.is_buffer_available()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Open => Ok(()),
            State::Faulted | State::Closed => Err(DecodeError::Faulted),
        }
    }

    /// Poll the backend for a finished frame without submitting anything.
    pub fn resolve(&mut self, output: &BufferHandle, input_flags: BufferFlags) -> Result<Resolution> {
        self.ensure_open()?;
        let resolved =
            RenderResolver::new(&self.registry, &self.format).resolve(&mut self.backend, output, input_flags);
        if let Err(DecodeError::BackendContractViolation { .. }) = &resolved {
            self.state = State::Faulted;
        }
        resolved
    }

    /// Run one iteration of the buffer protocol.
    ///
    /// The handles passed in are never modified; the returned `Exchange` holds what the
    /// host takes back and what it must do with each port's buffer.
    pub fn exchange(&mut self, input: &BufferHandle, output: &BufferHandle) -> Result<Exchange> {
        self.ensure_open()?;

        if input.buffer().is_null() {
            error!("buffer to decode is empty");
            return Err(DecodeError::InvalidBuffer("input buffer has no data"));
        }

        let redelivered = match &self.drain {
            Some(drain) if Arc::ptr_eq(&drain.input, input.buffer()) => true,
            Some(_) => {
                warn!("new input presented while an end-of-stream input is retained");
                return Err(DecodeError::InvalidBuffer(
                    "input port is retaining a different buffer",
                ));
            }
            None => false,
        };

        if input.flags.contains(BufferFlags::CODEC_CONFIG) {
            info!("buffer has codec config flag");
        }
        if input.flags.contains(BufferFlags::DECODE_ONLY) {
            warn!("buffer has decode only flag");
        }

        let mut exchange = Exchange {
            input: input.clone(),
            output: output.clone(),
            retention: RetentionPair::default(),
        };

        if input.is_end_of_stream() && input.filled_len == 0 && !redelivered {
            exchange.output.filled_len = 0;
            exchange.output.flags = BufferFlags::END_OF_STREAM;
            self.end_of_stream = true;
            debug!("empty end-of-stream input, signalling end of stream");
            return Ok(exchange);
        }

        if !redelivered {
            let payload = input
                .payload()
                .ok_or(DecodeError::InvalidBuffer("filled range exceeds the input buffer"))?;
            if let Err(e) = self.backend.decode(payload) {
                error!(%e, len = payload.len(), "backend failed to decode frame");
                return Err(DecodeError::BackendRejected);
            }
            self.stats.decoded += 1;
            trace!(len = payload.len(), timestamp = input.timestamp, "submitted input");
        }

        match self.resolve(output, input.flags)? {
            Resolution::Ready(frame) => {
                exchange.output = frame.handle;
                // Inherited from the input that triggered the frame, which may not be the
                // input the frame was decoded from when the backend reorders.
                exchange.output.timestamp = input.timestamp;
                exchange.retention.output = frame.retention;
                self.stats.frames_out += 1;
                if frame.retention == Retention::Overridden {
                    self.stats.overridden += 1;
                }
            }
            Resolution::NotReady => {
                exchange.retention.output = Retention::RetainForRedelivery;
                self.stats.not_ready += 1;
            }
        }

        if input.is_end_of_stream() && !exchange.output.is_end_of_stream() {
            self.continue_drain(input, output, redelivered, &mut exchange);
        } else if input.is_end_of_stream() {
            self.drain = None;
            self.end_of_stream = true;
            debug!("end of stream reached output");
        }

        Ok(exchange)
    }

    /// Keep the end-of-stream input on the port until the backend surfaces its last frame.
    ///
    /// Only redelivered inputs count as drain polls; the call that submitted the payload
    /// does not.
    fn continue_drain(
        &mut self,
        input: &BufferHandle,
        output: &BufferHandle,
        redelivered: bool,
        exchange: &mut Exchange,
    ) {
        let drain = self.drain.get_or_insert_with(|| Drain {
            input: Arc::clone(input.buffer()),
            empty_polls: 0,
        });
        if redelivered {
            drain.empty_polls += 1;
        }

        if let Some(limit) = self.drain_poll_limit {
            if redelivered && drain.empty_polls >= limit {
                warn!(polls = drain.empty_polls, "backend did not flush, ending stream");
                exchange.output = output.clone();
                exchange.output.filled_len = 0;
                exchange.output.flags = BufferFlags::END_OF_STREAM;
                exchange.retention = RetentionPair::default();
                self.drain = None;
                self.end_of_stream = true;
                return;
            }
        }

        // Retained for draining only: it must not be decoded again.
        exchange.input.filled_len = 0;
        exchange.retention.input = Retention::RetainForRedelivery;
        trace!(polls = drain.empty_polls, "retaining end-of-stream input");
    }

    /// Hand an output buffer back to the backend after downstream is done with it.
    pub fn release_output(&mut self, handle: &BufferHandle) -> Result<()> {
        self.ensure_open()?;
        let Some(slot) = self.registry.slot_of(handle) else {
            warn!(address = handle.address(), "released buffer is not in the output pool");
            return Err(DecodeError::InvalidBuffer("buffer is not in the output pool"));
        };
        if let Err(e) = self.backend.signal_render_done(handle.address()) {
            error!(%e, slot, "backend refused render done");
            return Err(DecodeError::BackendRejected);
        }
        trace!(slot, "output buffer released to backend");
        Ok(())
    }

    /// Forget drain progress. The backend has no flush entry point, so nothing is sent to it.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.drain.take().is_some() {
            debug!("flush dropped pending drain");
        }
        Ok(())
    }

    /// Close the backend and clear the registry.
    pub fn teardown(mut self) -> SessionStats {
        self.shutdown();
        self.stats
    }

    fn shutdown(&mut self) {
        if self.state == State::Closed {
            return;
        }
        if let Err(e) = self.backend.close() {
            warn!(%e, "backend close failed");
        }
        self.registry.clear();
        self.drain = None;
        self.state = State::Closed;
        info!(
            decoded = self.stats.decoded,
            frames_out = self.stats.frames_out,
            overridden = self.stats.overridden,
            not_ready = self.stats.not_ready,
            "decoder session closed"
        );
    }
}

impl<B: DecoderBackend> Drop for DecoderSession<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::backend::LoopbackBackend;
    use crate::error::BackendError;
    use crate::format::BufferMode;
    use crate::port::PortDefinition;

    #[derive(Default)]
    struct Calls {
        opened: bool,
        closed: bool,
        decodes: Vec<usize>,
        released: Vec<usize>,
    }

    /// Replays scripted `get_output` answers and records every call.
    struct Script {
        outputs: Vec<Option<i32>>,
        fail_init: bool,
        fail_decode: bool,
        calls: Rc<RefCell<Calls>>,
    }

    impl Script {
        fn new(outputs: Vec<Option<i32>>) -> (Self, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            let script = Script {
                outputs,
                fail_init: false,
                fail_decode: false,
                calls: Rc::clone(&calls),
            };
            (script, calls)
        }
    }

    impl DecoderBackend for Script {
        fn open(&mut self) -> std::result::Result<(), BackendError> {
            self.calls.borrow_mut().opened = true;
            Ok(())
        }
        fn init(&mut self, _: &PoolBinding<'_>) -> std::result::Result<(), BackendError> {
            if self.fail_init {
                return Err(BackendError::new("init"));
            }
            Ok(())
        }
        fn decode(&mut self, payload: &[u8]) -> std::result::Result<(), BackendError> {
            if self.fail_decode {
                return Err(BackendError::new("decode"));
            }
            self.calls.borrow_mut().decodes.push(payload.len());
            Ok(())
        }
        fn is_buffer_available(&self) -> bool {
            true
        }
        fn get_output(&mut self) -> Option<i32> {
            if self.outputs.is_empty() {
                None
            } else {
                self.outputs.remove(0)
            }
        }
        fn signal_render_done(&mut self, address: usize) -> std::result::Result<(), BackendError> {
            self.calls.borrow_mut().released.push(address);
            Ok(())
        }
        fn close(&mut self) -> std::result::Result<(), BackendError> {
            self.calls.borrow_mut().closed = true;
            Ok(())
        }
    }

    fn format(mode: BufferMode, count: usize) -> NegotiatedFormat {
        NegotiatedFormat::negotiate(
            mode,
            &PortDefinition::vp9_input(32, 32),
            &PortDefinition::raw_output(32, 32, count),
            0,
        )
        .unwrap()
    }

    fn pool(format: &NegotiatedFormat, count: usize) -> Vec<BufferHandle> {
        (0..count)
            .map(|_| BufferHandle::new(HostBuffer::zeroed(format.geometry().buffer_size())))
            .collect()
    }

    fn open<B: DecoderBackend>(backend: B, count: usize) -> (DecoderSession<B>, Vec<BufferHandle>) {
        let format = format(BufferMode::OpaqueManaged, count);
        let buffers = pool(&format, count);
        let session = DecoderSession::initialize(backend, format, buffers.clone()).unwrap();
        (session, buffers)
    }

    fn input(len: usize, timestamp: i64, flags: BufferFlags) -> BufferHandle {
        BufferHandle::with_payload(vec![0xab; len], timestamp, flags)
    }

    #[test]
    fn test_empty_eos_short_circuits() {
        let (script, calls) = Script::new(vec![Some(0)]);
        let (mut session, buffers) = open(script, 2);
        let eos = input(0, 7, BufferFlags::END_OF_STREAM);

        let exchange = session.exchange(&eos, &buffers[0]).unwrap();
        assert_eq!(exchange.output.filled_len, 0);
        assert!(exchange.output.is_end_of_stream());
        assert_eq!(exchange.retention, RetentionPair::default());
        assert!(calls.borrow().decodes.is_empty());
        assert!(session.end_of_stream_reached());
    }

    #[test]
    fn test_null_input_is_invalid() {
        let (script, _) = Script::new(vec![]);
        let (mut session, buffers) = open(script, 2);
        let null = BufferHandle::new(HostBuffer::null());
        assert!(matches!(
            session.exchange(&null, &buffers[0]),
            Err(DecodeError::InvalidBuffer(_))
        ));
        // The session stays usable.
        assert!(session.exchange(&input(4, 0, BufferFlags::empty()), &buffers[0]).is_ok());
    }

    #[test]
    fn test_decode_failure_leaves_output_untouched() {
        let (mut script, _) = Script::new(vec![Some(1)]);
        script.fail_decode = true;
        let (mut session, buffers) = open(script, 2);
        let output = buffers[0].clone();
        let err = session
            .exchange(&input(8, 0, BufferFlags::empty()), &output)
            .unwrap_err();
        assert!(matches!(err, DecodeError::BackendRejected));
        assert!(!err.is_fatal());
        assert_eq!(output.filled_len, 0);
    }

    #[test]
    fn test_not_ready_retains_output() {
        let (script, calls) = Script::new(vec![None]);
        let (mut session, buffers) = open(script, 2);
        let exchange = session
            .exchange(&input(16, 100, BufferFlags::empty()), &buffers[0])
            .unwrap();
        assert_eq!(exchange.retention.output, Retention::RetainForRedelivery);
        assert_eq!(exchange.retention.input, Retention::Consumed);
        assert!(exchange.output.same_buffer(&buffers[0]));
        assert_eq!(calls.borrow().decodes, vec![16]);
    }

    #[test]
    fn test_ready_frame_takes_input_timestamp() {
        let (script, _) = Script::new(vec![Some(1)]);
        let (mut session, buffers) = open(script, 2);
        let exchange = session
            .exchange(&input(16, 4242, BufferFlags::empty()), &buffers[0])
            .unwrap();
        assert_eq!(exchange.retention.output, Retention::Overridden);
        assert!(exchange.output.same_buffer(&buffers[1]));
        assert_eq!(exchange.output.timestamp, 4242);
        assert_eq!(exchange.output.filled_len, crate::resolver::OPAQUE_PAYLOAD_LEN);
    }

    #[test]
    fn test_eos_with_payload_drains_until_frame() {
        let (script, calls) = Script::new(vec![None, None, Some(0)]);
        let (mut session, buffers) = open(script, 2);
        let last = input(32, 900, BufferFlags::END_OF_STREAM);

        let first = session.exchange(&last, &buffers[0]).unwrap();
        assert_eq!(first.retention.input, Retention::RetainForRedelivery);
        assert_eq!(first.input.filled_len, 0);
        assert!(first.input.is_end_of_stream());
        assert!(session.is_draining());

        let second = session.exchange(&first.input, &buffers[0]).unwrap();
        assert_eq!(second.retention.input, Retention::RetainForRedelivery);
        assert_eq!(second.retention.output, Retention::RetainForRedelivery);

        let third = session.exchange(&second.input, &buffers[0]).unwrap();
        assert_eq!(third.retention.input, Retention::Consumed);
        assert!(third.output.is_end_of_stream());
        assert!(!session.is_draining());
        assert!(session.end_of_stream_reached());

        // Only the first presentation reached the backend.
        assert_eq!(calls.borrow().decodes, vec![32]);
    }

    #[test]
    fn test_drain_rejects_other_inputs() {
        let (script, _) = Script::new(vec![None]);
        let (mut session, buffers) = open(script, 2);
        session
            .exchange(&input(8, 0, BufferFlags::END_OF_STREAM), &buffers[0])
            .unwrap();
        assert!(matches!(
            session.exchange(&input(8, 1, BufferFlags::empty()), &buffers[0]),
            Err(DecodeError::InvalidBuffer(_))
        ));
    }

    #[test]
    fn test_drain_poll_limit_ends_stream() {
        let (script, _) = Script::new(vec![]);
        let (session, buffers) = open(script, 2);
        let mut session = session.with_drain_poll_limit(Some(2));

        let first = session
            .exchange(&input(8, 0, BufferFlags::END_OF_STREAM), &buffers[0])
            .unwrap();
        assert_eq!(first.retention.input, Retention::RetainForRedelivery);

        let second = session.exchange(&first.input, &buffers[0]).unwrap();
        assert_eq!(second.retention.input, Retention::RetainForRedelivery);
        assert!(!session.end_of_stream_reached());

        let third = session.exchange(&second.input, &buffers[0]).unwrap();
        assert_eq!(third.retention, RetentionPair::default());
        assert!(third.output.is_end_of_stream());
        assert_eq!(third.output.filled_len, 0);
        assert!(session.end_of_stream_reached());
    }

    #[test]
    fn test_drain_poll_limit_counts_only_redelivered_polls() {
        let (session, buffers) = open(LoopbackBackend::new(1), 2);
        let mut session = session.with_drain_poll_limit(Some(1));

        let first = session
            .exchange(&input(8, 0, BufferFlags::END_OF_STREAM), &buffers[0])
            .unwrap();
        assert_eq!(first.retention.input, Retention::RetainForRedelivery);
        assert_eq!(first.retention.output, Retention::RetainForRedelivery);
        assert_eq!(session.backend.pending(), 1);

        // The first drain poll flushes the held frame instead of giving up.
        let second = session.exchange(&first.input, &buffers[0]).unwrap();
        assert_eq!(second.retention.input, Retention::Consumed);
        assert_eq!(second.retention.output, Retention::Consumed);
        assert!(second.output.is_end_of_stream());
        assert_eq!(second.output.filled_len, crate::resolver::OPAQUE_PAYLOAD_LEN);
        assert_eq!(session.backend.pending(), 0);
        assert!(session.end_of_stream_reached());
    }

    #[test]
    fn test_flush_clears_drain() {
        let (script, calls) = Script::new(vec![None, Some(0)]);
        let (mut session, buffers) = open(script, 2);
        session
            .exchange(&input(8, 0, BufferFlags::END_OF_STREAM), &buffers[0])
            .unwrap();
        assert!(session.is_draining());

        session.flush().unwrap();
        assert!(!session.is_draining());
        assert!(!session.end_of_stream_reached());

        let next = session
            .exchange(&input(4, 1, BufferFlags::empty()), &buffers[0])
            .unwrap();
        assert_eq!(next.retention.input, Retention::Consumed);
        assert_eq!(next.retention.output, Retention::Consumed);
        assert_eq!(calls.borrow().decodes, vec![8, 4]);
    }

    #[test]
    fn test_flush_keeps_end_of_stream() {
        let (script, _) = Script::new(vec![]);
        let (mut session, buffers) = open(script, 2);
        session
            .exchange(&input(0, 0, BufferFlags::END_OF_STREAM), &buffers[0])
            .unwrap();
        assert!(session.end_of_stream_reached());

        session.flush().unwrap();
        assert!(session.end_of_stream_reached());
        assert!(!session.is_draining());
    }

    #[test]
    fn test_host_queries_follow_mode() {
        let (script, _) = Script::new(vec![]);
        let (session, _) = open(script, 2);
        let crop = session.output_crop();
        assert_eq!((crop.left, crop.top, crop.width, crop.height), (0, 0, 32, 32));
        assert_eq!(
            session.native_buffer_usage(),
            Some(NativeBufferUsage::opaque_output())
        );

        let raw = format(BufferMode::RawMemory, 2);
        let buffers = pool(&raw, 2);
        let (script, _) = Script::new(vec![]);
        let session = DecoderSession::initialize(script, raw, buffers).unwrap();
        assert!(session.native_buffer_usage().is_none());
    }

    #[test]
    fn test_contract_violation_faults_session() {
        let (script, calls) = Script::new(vec![Some(5)]);
        let (mut session, buffers) = open(script, 2);
        let err = session
            .exchange(&input(8, 0, BufferFlags::empty()), &buffers[0])
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BackendContractViolation { slot: 5, count: 2 }
        ));
        assert!(err.is_fatal());
        assert!(!session.is_available(true));
        assert!(matches!(
            session.exchange(&input(8, 0, BufferFlags::empty()), &buffers[0]),
            Err(DecodeError::Faulted)
        ));
        session.teardown();
        assert!(calls.borrow().closed);
    }

    #[test]
    fn test_availability_gate() {
        let (mut session, buffers) = open(LoopbackBackend::new(0), 1);
        assert!(session.is_available(true));
        assert!(!session.is_available(false));
        session.set_output_port_enabled(false);
        assert!(!session.is_available(true));
        session.set_output_port_enabled(true);

        session
            .exchange(&input(8, 0, BufferFlags::empty()), &buffers[0])
            .unwrap();
        // The only slot is now downstream.
        assert!(!session.is_available(true));
        session.release_output(&buffers[0]).unwrap();
        assert!(session.is_available(true));
    }

    #[test]
    fn test_release_unknown_buffer() {
        let (script, calls) = Script::new(vec![]);
        let (mut session, buffers) = open(script, 2);
        let stranger = BufferHandle::new(HostBuffer::zeroed(16));
        assert!(matches!(
            session.release_output(&stranger),
            Err(DecodeError::InvalidBuffer(_))
        ));
        session.release_output(&buffers[1]).unwrap();
        assert_eq!(calls.borrow().released, vec![buffers[1].address()]);
    }

    #[test]
    fn test_failed_init_closes_backend() {
        let (mut script, calls) = Script::new(vec![]);
        script.fail_init = true;
        let format = format(BufferMode::OpaqueManaged, 2);
        let buffers = pool(&format, 2);
        let err = DecoderSession::initialize(script, format, buffers).err().unwrap();
        assert!(matches!(err, InitError::InitRejected));
        assert!(calls.borrow().opened);
        assert!(calls.borrow().closed);
    }

    #[test]
    fn test_invalid_pool_never_opens_backend() {
        let (script, calls) = Script::new(vec![]);
        let format = format(BufferMode::OpaqueManaged, 2);
        let err = DecoderSession::initialize(script, format, Vec::new()).err().unwrap();
        assert!(matches!(err, InitError::EmptyPool));
        assert!(!calls.borrow().opened);
    }

    #[test]
    fn test_drop_closes_backend() {
        let (script, calls) = Script::new(vec![]);
        let (session, _) = open(script, 2);
        drop(session);
        assert!(calls.borrow().closed);
    }
}
