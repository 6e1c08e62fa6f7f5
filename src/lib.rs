//! Logic-level bus decoding for I2C and GSBus (TDM)
//!
//! Decoders walk captured logic channels edge by edge and emit protocol
//! frames plus display markers. Each bus has a synthesizer that draws a
//! capture decoding back to a known payload.
//!
//! # Architecture
//!
//! - **Capture / cursors**: run-length encoded channels read through
//!   forward-only [`SampleCursor`]s
//! - **Decoders**: [`I2cDecoder`] and [`GsBusDecoder`], both [`Analyzer`]s
//! - **Sinks**: [`MemorySink`] for in-process use, [`ChannelSink`] to stream
//!   events to another thread
//! - **DecodeWorker**: runs one pass on its own thread with a stop signal
//! - **Simulation**: [`I2cSimulator`] and [`GsBusSimulator`]
//!
//! # Example
//!
//! ```no_run
//! use busdecode::{I2cDecoder, I2cSettings, I2cSimulator, DecodeWorker};
//!
//! let mut sim = I2cSimulator::new(I2cSettings::default(), 2_000_000)?;
//! sim.generate_transactions(4);
//! let decoder = I2cDecoder::new(I2cSettings::default(), sim.to_capture()?)?;
//! let (events, summary) = DecodeWorker::spawn(Box::new(decoder)).collect();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

use runtime::ChannelId;

// Re-export decoder data types
pub use nodes::decoders::{
    BitAlignment, BitOrder, EdgeDirection, Frame, FrameFlags, FrameKind, Marker, MarkerKind, Sign,
    WordAlignment,
};

// Re-export decoders
pub use nodes::decoders::{GsBusDecoder, GsBusSettings, I2cDecoder, I2cSettings};

// Re-export synthesizers
pub use nodes::simulation::{GsBusSimulator, I2cSimulator, I2cTransaction};

// Re-export runtime components
pub use runtime::{
    Analyzer, BitLevel, Capture, ChannelCursor, ChannelData, ChannelMessage, ChannelSink,
    DecodeWorker, DecoderEvent, MemorySink, PassSummary, ResultSink, SampleCursor, SampleIndex,
    StopReason, WorkError, WorkResult,
};

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Invalid capture: {0}")]
    InvalidCapture(String),

    #[error("Channel {0} is not part of the capture")]
    MissingChannel(ChannelId),

    #[error(transparent)]
    Work(#[from] WorkError),
}

pub type Result<T> = std::result::Result<T, BusError>;
