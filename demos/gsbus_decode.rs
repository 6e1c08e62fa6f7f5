//! Example: GSBus round trip
//!
//! Synthesizes a GSBus capture carrying the default sine payload, decodes it
//! and logs the recovered channel values.
//!
//! Usage:
//!   cargo run --release --example gsbus_decode -- \
//!       --frames 8 --channels 8 --data-bits 24 --bits-per-frame 256
//!
//! Decode on a worker thread, streaming frames as they arrive, and interpret
//! values as signed:
//!   cargo run --release --example gsbus_decode -- --worker --signed

use busdecode::nodes::decoders::GSBUS_MINIMUM_SAMPLE_RATE_HZ;
use busdecode::runtime::ChannelId;
use busdecode::{
    Analyzer, BitAlignment, BitOrder, ChannelMessage, DecodeWorker, DecoderEvent, EdgeDirection,
    Frame, GsBusDecoder, GsBusSettings, GsBusSimulator, MemorySink, Sign, WordAlignment,
};
use clap::Parser;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of frames to synthesize
    #[arg(short, long, default_value = "8")]
    frames: u64,

    /// Sub-channels per frame
    #[arg(long, default_value = "8")]
    channels: u32,

    /// Data bits per sub-channel
    #[arg(long, default_value = "24")]
    data_bits: u32,

    /// Bits per frame, padding included
    #[arg(long, default_value = "256")]
    bits_per_frame: u32,

    /// Send least significant bit first
    #[arg(long)]
    lsb_first: bool,

    /// Data is valid on the rising clock edge
    #[arg(long)]
    rising: bool,

    /// Place data at the end of each slot
    #[arg(long)]
    right_aligned: bool,

    /// Data lags frame sync by one bit
    #[arg(long)]
    shifted: bool,

    /// Show values as signed
    #[arg(long)]
    signed: bool,

    /// Frames per second on the synthesized bus
    #[arg(long, default_value = "24000")]
    frame_rate: f64,

    /// Simulation sample rate in Hz
    #[arg(long, default_value_t = GSBUS_MINIMUM_SAMPLE_RATE_HZ)]
    sample_rate: u64,

    /// Decode on a worker thread
    #[arg(long)]
    worker: bool,
}

impl Args {
    fn settings(&self) -> GsBusSettings {
        GsBusSettings::default()
            .with_channels(ChannelId(0), ChannelId(1), ChannelId(2), ChannelId(3))
            .with_layout(self.bits_per_frame, self.channels, self.data_bits)
            .with_bit_order(if self.lsb_first {
                BitOrder::LsbFirst
            } else {
                BitOrder::MsbFirst
            })
            .with_data_valid_edge(if self.rising {
                EdgeDirection::Rising
            } else {
                EdgeDirection::Falling
            })
            .with_word_alignment(if self.right_aligned {
                WordAlignment::RightAligned
            } else {
                WordAlignment::LeftAligned
            })
            .with_bit_alignment(if self.shifted {
                BitAlignment::ShiftedRightOne
            } else {
                BitAlignment::NoShift
            })
            .with_sign(if self.signed { Sign::Signed } else { Sign::Unsigned })
    }
}

fn log_frame(frame: &Frame, settings: &GsBusSettings) {
    if frame.kind.is_error() {
        warn!(
            "{:?} over samples {}..={}",
            frame.kind, frame.start_sample, frame.end_sample
        );
        return;
    }
    match settings.sign {
        Sign::Signed => info!(
            "{:?}: cmd={} stat={} at {}",
            frame.kind,
            frame.signed_data1(settings.data_bits_per_channel),
            frame.signed_data2(settings.data_bits_per_channel),
            frame.start_sample
        ),
        Sign::Unsigned => info!(
            "{:?}: cmd=0x{:X} stat=0x{:X} at {}",
            frame.kind, frame.data1, frame.data2, frame.start_sample
        ),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = args.settings();

    info!("=== GSBus Decode Example ===");
    info!(
        "{} frames, {} ch x {} bits in {} bits/frame",
        args.frames, settings.channels_per_frame, settings.data_bits_per_channel, settings.bits_per_frame
    );

    let mut sim =
        GsBusSimulator::new(settings.clone(), args.sample_rate)?.with_frame_rate(args.frame_rate)?;
    sim.generate_frames(args.frames);
    let capture = sim.to_capture()?;
    let channels: Vec<String> = capture.channel_ids().map(|id| id.to_string()).collect();
    info!("Synthesized {} on {}", capture, channels.join(","));

    let mut decoder = GsBusDecoder::new(settings.clone(), capture)?;

    if args.worker {
        let worker = DecodeWorker::spawn(Box::new(decoder));
        // Log frames while the pass is still running
        for message in worker.events().iter() {
            match message {
                ChannelMessage::Sample(DecoderEvent::Frame(frame)) => log_frame(&frame, &settings),
                ChannelMessage::Sample(_) => {}
                ChannelMessage::EndOfStream => break,
            }
        }
        let summary = worker.join()?;
        info!("Done: {:?}, {} frames", summary.reason, summary.frames);
    } else {
        let mut sink = MemorySink::new();
        let summary = decoder.run(&mut sink, &AtomicBool::new(false))?;
        for frame in sink.frames() {
            log_frame(frame, &settings);
        }
        info!(
            "Done: {:?}, {} frames, {} markers",
            summary.reason,
            summary.frames,
            sink.markers().len()
        );
    }

    Ok(())
}
