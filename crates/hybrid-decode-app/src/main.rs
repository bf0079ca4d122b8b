mod host;
mod pool;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use hybrid_decoder::backend::DEFAULT_BACKEND_LIBRARY;
use hybrid_decoder::{
    BufferMode, DecoderBackend, DecoderSession, LibraryBackend, LoopbackBackend, SessionConfig,
};
use ivf_source::IvfSource;

use crate::pool::OutputPool;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Host-allocated memory output buffers
    Raw,
    /// Native graphics buffers owned by the output port
    Opaque,
}

impl From<Mode> for BufferMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Raw => BufferMode::RawMemory,
            Mode::Opaque => BufferMode::OpaqueManaged,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "hybrid-decode", about = "Drive a VP9 hybrid decoder backend over an IVF file")]
struct Args {
    /// IVF file holding the VP9 stream
    input: PathBuf,

    /// Decoder backend shared library
    #[arg(long, env = "HYBRID_DECODER_LIBRARY", default_value = DEFAULT_BACKEND_LIBRARY)]
    library: PathBuf,

    /// Use the in-process software backend instead of the shared library
    #[arg(long)]
    loopback: bool,

    /// Frames the loopback backend holds back before surfacing one
    #[arg(long, default_value_t = 2)]
    loopback_latency: usize,

    #[arg(long, value_enum, default_value_t = Mode::Opaque)]
    mode: Mode,

    /// Frame width; taken from the IVF header when omitted
    #[arg(long)]
    width: Option<u32>,

    /// Frame height; taken from the IVF header when omitted
    #[arg(long)]
    height: Option<u32>,

    /// Decode border in pixels
    #[arg(long, default_value_t = hybrid_decoder::format::DEFAULT_DECODE_BORDER)]
    border: u32,

    /// Output buffer count in raw mode
    #[arg(long, default_value_t = hybrid_decoder::config::DEFAULT_RAW_OUTPUT_BUFFERS)]
    raw_buffers: usize,

    /// Give up draining after this many polls without a frame
    #[arg(long)]
    drain_poll_limit: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn open_backend(args: &Args, config: &SessionConfig) -> Result<Box<dyn DecoderBackend + Send>> {
    if args.loopback {
        info!(latency = args.loopback_latency, "using loopback backend");
        return Ok(Box::new(LoopbackBackend::new(args.loopback_latency)));
    }
    let backend = LibraryBackend::load(&config.backend_library)
        .with_context(|| format!("loading backend {}", config.backend_library.display()))?;
    info!(path = %backend.path().display(), "using hybrid decoder library");
    Ok(Box::new(backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        "hybrid_decoder=debug,ivf_source=debug,hybrid_decode_app=debug"
    } else {
        "hybrid_decoder=info,ivf_source=info,hybrid_decode_app=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    info!("hybrid-decode starting");

    let source = IvfSource::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let header = source.header().clone();
    if !header.is_vp9() {
        warn!("input is not tagged as VP9, decoding anyway");
    }

    let config = SessionConfig {
        mode: args.mode.into(),
        frame_width: args.width.unwrap_or(header.width as u32),
        frame_height: args.height.unwrap_or(header.height as u32),
        border: args.border,
        raw_output_buffers: args.raw_buffers,
        drain_poll_limit: args.drain_poll_limit,
        backend_library: args.library.clone(),
    };
    if config.frame_width == 0 || config.frame_height == 0 {
        bail!("frame size is unknown, pass --width and --height");
    }

    let format = config.negotiate().context("negotiating output format")?;
    let geometry = *format.geometry();
    info!(
        mode = ?format.mode(),
        width = geometry.width,
        height = geometry.height,
        stride = geometry.stride,
        buffers = format.output_buffer_count(),
        "negotiated output format"
    );

    let pool = OutputPool::allocate(format.output_buffer_count(), geometry.buffer_size())
        .context("allocating output pool")?;
    let outputs = pool.handles();

    let backend = open_backend(&args, &config)?;
    let mut session = DecoderSession::initialize(backend, format, outputs.clone())
        .context("initializing decoder session")?
        .with_drain_poll_limit(config.drain_poll_limit);

    let crop = session.output_crop();
    info!(
        left = crop.left,
        top = crop.top,
        width = crop.width,
        height = crop.height,
        usage = ?session.native_buffer_usage(),
        "output crop and buffer usage"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_ctrlc = Arc::clone(&stop);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutting down...");
        stop_for_ctrlc.store(true, Ordering::Release);
    });

    let frames = source.map_while(|frame| match frame {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(%e, "stopping at malformed frame");
            None
        }
    });

    let run = tokio::task::spawn_blocking(move || {
        let inputs = host::input_buffers(&header, frames);
        let report = host::run(&mut session, inputs, outputs, &stop);
        (report, session.teardown())
    });
    let (report, stats) = run.await.context("host loop panicked")?;
    let report = report?;

    info!(
        inputs = report.inputs,
        frames = report.frames,
        skipped = report.skipped,
        decoded = stats.decoded,
        overridden = stats.overridden,
        not_ready = stats.not_ready,
        end_of_stream = report.end_of_stream,
        "decode finished"
    );
    drop(pool);
    Ok(())
}
