// Snapshot: Init → CaptureAndEncode → write JPEG → Shutdown
//
// Polls until a frame arrives (an idle desktop may time out a few times),
// then captures a short burst to report steady-state latency.
//
// Usage: cargo run --release --example snapshot -- [monitor] [quality] [output.jpg] [codec]
//
// `codec` is "platform" (default), "jpeg" or "wic". Off Windows the synthetic
// backend stands in for the desktop.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stillcapture::image::CodecKind;
use stillcapture::{Backend, CaptureSession, CaptureStatus};

/// Attempts before giving up on the first frame
const MAX_ATTEMPTS: usize = 50;

/// Captures in the latency burst
const BURST_FRAMES: usize = 20;

struct Args {
    monitor: i32,
    quality: i32,
    output: String,
    codec: CodecKind,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let monitor = match args.first() {
        Some(arg) => arg.parse().with_context(|| format!("invalid monitor index: {arg}"))?,
        None => 0,
    };
    let quality = match args.get(1) {
        Some(arg) => arg.parse().with_context(|| format!("invalid quality: {arg}"))?,
        None => 80,
    };
    let output = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "snapshot.jpg".to_string());
    let codec = match args.get(3) {
        Some(arg) => match CodecKind::from_name(arg) {
            Some(codec) => codec,
            None => bail!("unknown codec: {arg} (expected platform, jpeg or wic)"),
        },
        None => CodecKind::default(),
    };
    Ok(Args {
        monitor,
        quality,
        output,
        codec,
    })
}

#[cfg(windows)]
fn backend(codec: CodecKind) -> stillcapture::backend::DuplicationBackend {
    for output in stillcapture::capture::enumerate_outputs().unwrap_or_default() {
        info!(
            index = output.index,
            name = %output.name,
            width = output.width,
            height = output.height,
            attached = output.attached,
            "display output"
        );
    }
    stillcapture::backend::DuplicationBackend::new(codec)
}

#[cfg(not(windows))]
fn backend(codec: CodecKind) -> stillcapture::backend::SyntheticBackend {
    use stillcapture::capture::{FillPattern, SyntheticDisplay};

    stillcapture::backend::SyntheticBackend::new(vec![
        SyntheticDisplay::new(1920, 1080, FillPattern::default()),
        SyntheticDisplay::new(1280, 1024, FillPattern::Gradient),
    ])
    .with_codec(codec)
}

fn run<B: Backend>(session: &CaptureSession<B>, args: &Args) -> Result<()> {
    let output = session
        .init(args.monitor)
        .map_err(|e| anyhow::anyhow!("Init returned {}: {}", e.status_code(), e))?;
    info!(
        index = output.index,
        width = output.width,
        height = output.height,
        "session ready"
    );

    let mut written = false;
    for attempt in 0..MAX_ATTEMPTS {
        let result = session.capture_and_encode(args.quality);
        let status = CaptureStatus::of(&result);
        match result {
            Ok(Some(jpeg)) => {
                std::fs::write(&args.output, &*jpeg)
                    .with_context(|| format!("failed to write {}", args.output))?;
                info!(path = %args.output, bytes = jpeg.len(), attempt, "snapshot written");
                written = true;
                break;
            }
            Ok(None) => continue,
            Err(e) => bail!("CaptureAndEncode returned {}: {}", status as i32, e),
        }
    }
    if !written {
        bail!("no frame arrived after {} attempts", MAX_ATTEMPTS);
    }

    let mut durations = Vec::with_capacity(BURST_FRAMES);
    let mut timeouts = 0usize;
    for _ in 0..BURST_FRAMES {
        let t = Instant::now();
        match session.capture_and_encode(args.quality)? {
            Some(_) => durations.push(t.elapsed().as_secs_f64() * 1000.0),
            None => timeouts += 1,
        }
    }

    if durations.is_empty() {
        warn!(timeouts, "no new frames during burst (idle desktop?)");
    } else {
        durations.sort_by(|a, b| a.total_cmp(b));
        let avg = durations.iter().sum::<f64>() / durations.len() as f64;
        info!(
            frames = durations.len(),
            timeouts,
            avg_ms = avg,
            min_ms = durations[0],
            max_ms = durations[durations.len() - 1],
            "burst latency"
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = parse_args()?;
    info!(codec = ?args.codec, "codec selected");
    let session = CaptureSession::new(backend(args.codec));
    let result = run(&session, &args);
    session.shutdown();
    result
}
