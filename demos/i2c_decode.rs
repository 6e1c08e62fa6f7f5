//! Example: I2C round trip
//!
//! Synthesizes I2C transactions, decodes them and logs every byte.
//!
//! Usage:
//!   cargo run --release --example i2c_decode -- \
//!       --transactions 4 --address 0x50 --bytes 3
//!
//! With repeated starts and NAK on the last byte, decoded on a worker:
//!   cargo run --release --example i2c_decode -- --restart --nak --worker

use busdecode::nodes::decoders::I2C_MINIMUM_SAMPLE_RATE_HZ;
use busdecode::{
    Analyzer, BitOrder, DecodeWorker, DecoderEvent, Frame, FrameFlags, I2cDecoder, I2cSettings,
    I2cSimulator, MarkerKind, MemorySink,
};
use clap::Parser;
use std::sync::atomic::AtomicBool;
use tracing::info;

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed
        .map_err(|e| e.to_string())
        .and_then(|a| if a < 0x80 { Ok(a) } else { Err(format!("{} is not a 7-bit address", s)) })
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of transactions to synthesize
    #[arg(short, long, default_value = "4")]
    transactions: u64,

    /// 7-bit target address
    #[arg(short, long, default_value = "0x50", value_parser = parse_address)]
    address: u8,

    /// Data bytes per transaction
    #[arg(short, long, default_value = "2")]
    bytes: usize,

    /// SCL frequency in Hz
    #[arg(long, default_value = "100000")]
    clock: f64,

    /// Chain transactions with repeated starts
    #[arg(long)]
    restart: bool,

    /// NAK the last byte of each transaction
    #[arg(long)]
    nak: bool,

    /// Send least significant bit first
    #[arg(long)]
    lsb_first: bool,

    /// Simulation sample rate in Hz
    #[arg(long, default_value_t = I2C_MINIMUM_SAMPLE_RATE_HZ)]
    sample_rate: u64,

    /// Decode on a worker thread
    #[arg(long)]
    worker: bool,
}

fn log_frame(frame: &Frame) {
    let ack = if frame.flags.contains(FrameFlags::ACK) {
        "ACK"
    } else if frame.flags.contains(FrameFlags::MISSING_ACK) {
        "missing ACK"
    } else {
        "NAK"
    };
    info!(
        "{:?} 0x{:02X} {} [{}..={}]",
        frame.kind, frame.data1, ack, frame.start_sample, frame.end_sample
    );
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

    info!("=== I2C Decode Example ===");
    let settings = I2cSettings::default().with_bit_order(if args.lsb_first {
        BitOrder::LsbFirst
    } else {
        BitOrder::MsbFirst
    });

    let mut sim = I2cSimulator::new(settings.clone(), args.sample_rate)?
        .with_clock_rate(args.clock)?
        .with_address(args.address)
        .with_bytes_per_transaction(args.bytes)
        .with_repeated_start(args.restart)
        .with_nak_last_byte(args.nak);
    sim.generate_transactions(args.transactions);
    let capture = sim.to_capture()?;
    info!("Synthesized {}", capture);

    let mut decoder = I2cDecoder::new(settings, capture)?;

    if args.worker {
        let (events, result) = DecodeWorker::spawn(Box::new(decoder)).collect();
        for event in &events {
            match event {
                DecoderEvent::Frame(frame) => log_frame(frame),
                DecoderEvent::Marker(m) if m.kind == MarkerKind::Start => info!("START @{}", m.sample),
                DecoderEvent::Marker(m) if m.kind == MarkerKind::Stop => info!("STOP  @{}", m.sample),
                _ => {}
            }
        }
        let summary = result?;
        info!("Done: {:?}, {} bytes", summary.reason, summary.frames);
    } else {
        let mut sink = MemorySink::new();
        let summary = decoder.run(&mut sink, &AtomicBool::new(false))?;
        for (i, packet) in sink.packets().iter().enumerate() {
            info!("Packet #{}", i + 1);
            for frame in sink.packet_frames(*packet) {
                log_frame(frame);
            }
        }
        info!("Done: {:?}, {} bytes", summary.reason, summary.frames);
    }

    Ok(())
}
