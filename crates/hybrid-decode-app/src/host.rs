use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::{debug, info, trace, warn};

use hybrid_decoder::{
    BufferFlags, BufferHandle, DecodeError, DecoderBackend, DecoderSession, Retention,
};
use ivf_source::{IvfFrame, IvfHeader};

/// Polls of the availability gate before the host gives up on a busy backend.
const MAX_BUSY_POLLS: u32 = 1000;
const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostReport {
    pub inputs: u64,
    pub frames: u64,
    pub skipped: u64,
    pub retained_inputs: u64,
    pub retained_outputs: u64,
    pub overridden: u64,
    pub end_of_stream: bool,
}

/// Turn compressed frames into input buffers, flagging the last one as end of stream.
///
/// An empty stream yields a single empty end-of-stream buffer.
pub fn input_buffers<I>(header: &IvfHeader, frames: I) -> impl Iterator<Item = BufferHandle>
where
    I: Iterator<Item = IvfFrame>,
{
    let header = header.clone();
    let mut frames = frames.peekable();
    let mut sent_any = false;
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        match frames.next() {
            Some(frame) => {
                sent_any = true;
                let mut flags = BufferFlags::empty();
                if frames.peek().is_none() {
                    flags |= BufferFlags::END_OF_STREAM;
                    done = true;
                }
                Some(BufferHandle::with_payload(
                    frame.data.to_vec(),
                    header.timestamp_us(frame.timestamp),
                    flags,
                ))
            }
            None => {
                done = true;
                (!sent_any).then(|| BufferHandle::with_payload(Vec::new(), 0, BufferFlags::END_OF_STREAM))
            }
        }
    })
}

/// Plays the host side of the buffer protocol until end of stream or `stop`.
///
/// Decoded frames are "rendered" by handing them straight back to the backend.
pub fn run<B, I>(
    session: &mut DecoderSession<B>,
    inputs: I,
    outputs: Vec<BufferHandle>,
    stop: &AtomicBool,
) -> Result<HostReport>
where
    B: DecoderBackend,
    I: IntoIterator<Item = BufferHandle>,
{
    let mut inputs = inputs.into_iter();
    let mut free_outputs: VecDeque<BufferHandle> = outputs.into();
    let mut pending_input: Option<BufferHandle> = None;
    let mut pending_output: Option<BufferHandle> = None;
    let mut report = HostReport::default();

    while !report.end_of_stream {
        if stop.load(Ordering::Acquire) {
            info!("stop requested, leaving host loop");
            break;
        }

        let mut busy_polls = 0;
        while !session.is_available(pending_output.is_some() || !free_outputs.is_empty()) {
            busy_polls += 1;
            if busy_polls > MAX_BUSY_POLLS {
                bail!("decoder stayed unavailable for {busy_polls} polls");
            }
            std::thread::sleep(BUSY_POLL_INTERVAL);
        }

        let input = match pending_input.take() {
            Some(input) => input,
            None => match inputs.next() {
                Some(input) => {
                    report.inputs += 1;
                    input
                }
                None => {
                    warn!("input ran out before end of stream");
                    break;
                }
            },
        };
        let output = match pending_output.take() {
            Some(output) => output,
            None => match free_outputs.pop_front() {
                Some(output) => output,
                None => bail!("no output buffer to present"),
            },
        };

        let exchange = match session.exchange(&input, &output) {
            Ok(exchange) => exchange,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e @ (DecodeError::BackendRejected | DecodeError::InvalidBuffer(_))) => {
                warn!(%e, timestamp = input.timestamp, "skipping input");
                report.skipped += 1;
                pending_output = Some(output);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if exchange.retention.input == Retention::RetainForRedelivery {
            report.retained_inputs += 1;
            pending_input = Some(exchange.input.clone());
        }

        match exchange.retention.output {
            Retention::RetainForRedelivery => {
                report.retained_outputs += 1;
                pending_output = Some(exchange.output);
            }
            retention => {
                if retention == Retention::Overridden {
                    report.overridden += 1;
                    // The presented buffer was never filled; it goes back to the front.
                    free_outputs.push_front(BufferHandle::new(output.buffer().clone()));
                    free_outputs.retain(|h| !h.same_buffer(&exchange.output));
                }
                render(session, &exchange.output, &mut report)?;
                free_outputs.push_back(BufferHandle::new(exchange.output.buffer().clone()));
            }
        }
    }

    info!(
        inputs = report.inputs,
        frames = report.frames,
        skipped = report.skipped,
        retained_inputs = report.retained_inputs,
        retained_outputs = report.retained_outputs,
        overridden = report.overridden,
        end_of_stream = report.end_of_stream,
        "host loop finished"
    );
    Ok(report)
}

fn render<B: DecoderBackend>(
    session: &mut DecoderSession<B>,
    output: &BufferHandle,
    report: &mut HostReport,
) -> Result<()> {
    if output.filled_len > 0 {
        report.frames += 1;
        trace!(
            address = output.address(),
            timestamp = output.timestamp,
            len = output.filled_len,
            "frame out"
        );
    }
    if output.is_end_of_stream() {
        debug!(timestamp = output.timestamp, "end of stream on output");
        report.end_of_stream = true;
    }
    // An empty end-of-stream output may be a buffer the backend never filled.
    if session.registry().slot_of(output).is_some() {
        match session.release_output(output) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!(%e, "render done rejected"),
        }
    }
    Ok(())
}
