//! Analyzer trait for decode passes
//!
//! Defines the Analyzer trait every bus decoder implements. A pass pulls
//! from sample cursors until the capture is exhausted or a stop is requested,
//! pushing results into a [`ResultSink`].

use std::sync::atomic::AtomicBool;

pub use super::errors::{WorkError, WorkResult};
pub use super::sink::ResultSink;

/// Why a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No protocol unit could be formed from the remaining capture
    EndOfData,
    /// The stop flag was observed between two units
    Stopped,
}

/// Outcome of a completed pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Decoded units (bytes or frame cycles) attempted
    pub units: u64,
    /// Frames emitted
    pub frames: u64,
    pub reason: StopReason,
}

impl PassSummary {
    /// Fold the result of a decode loop into a summary. Running out of
    /// captured data is the normal end of a pass; other errors propagate.
    pub fn from_loop(result: WorkResult<StopReason>, units: u64, frames: u64) -> WorkResult<Self> {
        let reason = match result {
            Ok(reason) => reason,
            Err(WorkError::EndOfData) => StopReason::EndOfData,
            Err(e) => return Err(e),
        };
        Ok(Self {
            units,
            frames,
            reason,
        })
    }
}

/// A bus decoder bound to a capture and a validated configuration
pub trait Analyzer: Send {
    /// Get a debug name for this analyzer
    fn name(&self) -> &str;

    /// Lowest capture rate at which decoding is reliable
    fn minimum_sample_rate_hz(&self) -> u64;

    /// Whether a capture taken at `sample_rate_hz` is fast enough
    fn supports_sample_rate(&self, sample_rate_hz: u64) -> bool {
        sample_rate_hz >= self.minimum_sample_rate_hz()
    }

    /// Decode the whole capture once. `stop` is checked once per decoded
    /// unit; frames emitted before a stop remain in the sink.
    ///
    /// Every call starts from sample 0, so repeated passes over the same
    /// capture produce identical output.
    fn run(&mut self, sink: &mut dyn ResultSink, stop: &AtomicBool) -> WorkResult<PassSummary>;
}
