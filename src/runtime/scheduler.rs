//! Background decode worker
//!
//! Runs one [`Analyzer`] pass on a dedicated thread and streams its events
//! over a bounded crossbeam channel. The caller can stop the pass between
//! decoded units and collect the summary when it finishes.

use super::errors::{WorkError, WorkResult};
use super::node::{Analyzer, PassSummary};
use super::sink::{ChannelMessage, ChannelSink, DecoderEvent};
use crossbeam_channel::{Receiver as CrossbeamReceiver, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Default number of events buffered between worker and consumer
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Handle to a decode pass running on its own thread
pub struct DecodeWorker {
    name: String,
    handle: JoinHandle<WorkResult<PassSummary>>,
    stop_signal: Arc<AtomicBool>,
    events: CrossbeamReceiver<ChannelMessage<DecoderEvent>>,
}

impl DecodeWorker {
    /// Start a pass with the default buffer size
    pub fn spawn(analyzer: Box<dyn Analyzer>) -> Self {
        Self::spawn_with_buffer(analyzer, DEFAULT_BUFFER_SIZE)
    }

    /// Start a pass; the worker blocks once `buffer_size` events are queued.
    pub fn spawn_with_buffer(mut analyzer: Box<dyn Analyzer>, buffer_size: usize) -> Self {
        let (tx, rx) = bounded(buffer_size);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let name = analyzer.name().to_string();
        let thread_name = name.clone();

        debug!("Starting decode worker: {}", name);

        let handle = thread::spawn(move || {
            let mut sink = ChannelSink::new(tx);
            let result = analyzer.run(&mut sink, &thread_stop);
            match &result {
                Ok(summary) => info!(
                    "[{}] Pass finished ({:?}): {} units, {} frames, {} events",
                    thread_name,
                    summary.reason,
                    summary.units,
                    summary.frames,
                    sink.events_sent()
                ),
                Err(e) => error!("[{}] Pass failed: {}", thread_name, e),
            }
            sink.close();
            result
        });

        Self {
            name,
            handle,
            stop_signal,
            events: rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the pass to stop after the unit in progress
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Event stream; ends with `ChannelMessage::EndOfStream`
    pub fn events(&self) -> &CrossbeamReceiver<ChannelMessage<DecoderEvent>> {
        &self.events
    }

    /// Drain every event until end-of-stream, then join the thread
    pub fn collect(self) -> (Vec<DecoderEvent>, WorkResult<PassSummary>) {
        let mut collected = Vec::new();
        while let Ok(ChannelMessage::Sample(event)) = self.events.recv() {
            collected.push(event);
        }
        let result = self.join();
        (collected, result)
    }

    /// Wait for the thread to finish. Undelivered events are discarded; a
    /// worker blocked on a full channel then fails with a send error.
    pub fn join(self) -> WorkResult<PassSummary> {
        drop(self.events);
        match self.handle.join() {
            Ok(result) => result,
            Err(e) => {
                error!("[{}] Thread panicked: {:?}", self.name, e);
                Err(WorkError::InvalidState(format!(
                    "decode worker '{}' panicked",
                    self.name
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::types::{Frame, FrameFlags, FrameKind};
    use crate::runtime::node::{ResultSink, StopReason};

    struct CountingAnalyzer {
        units: u64,
    }

    impl Analyzer for CountingAnalyzer {
        fn name(&self) -> &str {
            "counting"
        }

        fn minimum_sample_rate_hz(&self) -> u64 {
            1
        }

        fn run(
            &mut self,
            sink: &mut dyn ResultSink,
            stop: &AtomicBool,
        ) -> WorkResult<PassSummary> {
            let mut done = 0;
            let loop_result = (|| -> WorkResult<StopReason> {
                while done < self.units {
                    if stop.load(Ordering::Relaxed) {
                        return Ok(StopReason::Stopped);
                    }
                    sink.emit_frame(Frame {
                        kind: FrameKind::Data,
                        start_sample: done,
                        end_sample: done,
                        data1: done,
                        data2: 0,
                        flags: FrameFlags::NONE,
                    })?;
                    sink.commit()?;
                    done += 1;
                }
                Err(WorkError::EndOfData)
            })();
            PassSummary::from_loop(loop_result, done, done)
        }
    }

    #[test]
    fn test_worker_streams_events() {
        let worker = DecodeWorker::spawn(Box::new(CountingAnalyzer { units: 5 }));
        let (events, result) = worker.collect();
        let summary = result.unwrap();
        assert_eq!(summary.reason, StopReason::EndOfData);
        assert_eq!(summary.frames, 5);
        let frames = events
            .iter()
            .filter(|e| matches!(e, DecoderEvent::Frame(_)))
            .count();
        assert_eq!(frames, 5);
        assert_eq!(events.len(), 10);
    }

    #[test]
    fn test_worker_stop_before_start() {
        let worker = DecodeWorker::spawn_with_buffer(
            Box::new(CountingAnalyzer { units: u64::MAX }),
            1,
        );
        worker.stop();
        // Keep draining so a blocked send can make progress until the flag is seen.
        let (_, result) = worker.collect();
        assert_eq!(result.unwrap().reason, StopReason::Stopped);
    }

    #[test]
    fn test_worker_stop_while_streaming() {
        let worker = DecodeWorker::spawn_with_buffer(
            Box::new(CountingAnalyzer { units: u64::MAX }),
            4,
        );
        let mut frames = 0u64;
        for message in worker.events().iter() {
            match message {
                ChannelMessage::Sample(DecoderEvent::Frame(_)) => {
                    frames += 1;
                    if frames == 3 {
                        worker.stop();
                    }
                }
                ChannelMessage::Sample(_) => {}
                ChannelMessage::EndOfStream => break,
            }
        }
        let summary = worker.join().unwrap();
        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.frames, frames);
        assert!(frames >= 3);
    }
}
