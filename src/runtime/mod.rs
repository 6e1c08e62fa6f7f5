//! Runtime support for decode passes

pub mod cursor;
pub mod errors;
pub mod node;
pub mod sample;
pub mod scheduler;
pub mod sink;

pub use cursor::{ChannelCursor, SampleCursor};
pub use errors::{WorkError, WorkResult};
pub use node::{Analyzer, PassSummary, StopReason};
pub use sample::{BitLevel, Capture, ChannelData, ChannelId, SampleIndex};
pub use scheduler::DecodeWorker;
pub use sink::{ChannelMessage, ChannelSink, DecoderEvent, MemorySink, Packet, ResultSink};
