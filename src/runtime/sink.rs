//! Result sinks that decoders push frames and markers into
//!
//! - [`MemorySink`] keeps everything in vectors, grouped into packets.
//! - [`ChannelSink`] forwards each event over a crossbeam channel so another
//!   thread can consume results while a pass is still running.

use crossbeam_channel::Sender as CrossbeamSender;

use super::errors::WorkResult;
use super::sample::{ChannelId, SampleIndex};
use crate::nodes::decoders::types::{Frame, Marker, MarkerKind};

/// Destination for decoder output
pub trait ResultSink {
    fn emit_frame(&mut self, frame: Frame) -> WorkResult<()>;

    fn emit_marker(
        &mut self,
        sample: SampleIndex,
        kind: MarkerKind,
        channel: ChannelId,
    ) -> WorkResult<()>;

    /// Flush everything emitted since the previous commit.
    fn commit(&mut self) -> WorkResult<()>;

    /// Close the current packet; later frames belong to a new one.
    fn start_new_packet(&mut self) -> WorkResult<()>;
}

/// Range of frame indices belonging to one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub first_frame: usize,
    /// Exclusive
    pub end_frame: usize,
}

/// In-memory sink
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    frames: Vec<Frame>,
    markers: Vec<Marker>,
    packets: Vec<Packet>,
    packet_start: usize,
    committed_frames: usize,
    commits: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Frames made visible by a `commit()`
    pub fn committed_frames(&self) -> &[Frame] {
        &self.frames[..self.committed_frames]
    }

    /// Closed packets, each holding at least one frame
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn packet_frames(&self, packet: Packet) -> &[Frame] {
        &self.frames[packet.first_frame..packet.end_frame]
    }

    pub fn num_commits(&self) -> usize {
        self.commits
    }
}

impl ResultSink for MemorySink {
    fn emit_frame(&mut self, frame: Frame) -> WorkResult<()> {
        self.frames.push(frame);
        Ok(())
    }

    fn emit_marker(
        &mut self,
        sample: SampleIndex,
        kind: MarkerKind,
        channel: ChannelId,
    ) -> WorkResult<()> {
        self.markers.push(Marker::new(sample, kind, channel));
        Ok(())
    }

    fn commit(&mut self) -> WorkResult<()> {
        self.committed_frames = self.frames.len();
        self.commits += 1;
        Ok(())
    }

    fn start_new_packet(&mut self) -> WorkResult<()> {
        if self.frames.len() > self.packet_start {
            self.packets.push(Packet {
                first_frame: self.packet_start,
                end_frame: self.frames.len(),
            });
        }
        self.packet_start = self.frames.len();
        Ok(())
    }
}

/// Event forwarded by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    Frame(Frame),
    Marker(Marker),
    Commit,
    NewPacket,
}

/// Channel message wrapper for end-of-stream signaling
///
/// Consumers see `EndOfStream` exactly once, after the pass has finished,
/// whether it ran out of data, was stopped, or failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelMessage<T> {
    Sample(T),
    EndOfStream,
}

/// Sink that sends every event over a crossbeam channel
pub struct ChannelSink {
    sender: CrossbeamSender<ChannelMessage<DecoderEvent>>,
    sent: u64,
}

impl ChannelSink {
    pub fn new(sender: CrossbeamSender<ChannelMessage<DecoderEvent>>) -> Self {
        Self { sender, sent: 0 }
    }

    fn send(&mut self, event: DecoderEvent) -> WorkResult<()> {
        self.sender.send(ChannelMessage::Sample(event))?;
        self.sent += 1;
        Ok(())
    }

    /// Number of events delivered so far
    pub fn events_sent(&self) -> u64 {
        self.sent
    }

    /// Signal end-of-stream. Errors are ignored: a vanished consumer has
    /// nothing left to notify.
    pub fn close(&self) {
        let _ = self.sender.send(ChannelMessage::EndOfStream);
    }
}

impl ResultSink for ChannelSink {
    fn emit_frame(&mut self, frame: Frame) -> WorkResult<()> {
        self.send(DecoderEvent::Frame(frame))
    }

    fn emit_marker(
        &mut self,
        sample: SampleIndex,
        kind: MarkerKind,
        channel: ChannelId,
    ) -> WorkResult<()> {
        self.send(DecoderEvent::Marker(Marker::new(sample, kind, channel)))
    }

    fn commit(&mut self) -> WorkResult<()> {
        self.send(DecoderEvent::Commit)
    }

    fn start_new_packet(&mut self) -> WorkResult<()> {
        self.send(DecoderEvent::NewPacket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::types::{FrameFlags, FrameKind};
    use crate::runtime::errors::WorkError;
    use crossbeam_channel::bounded;

    fn frame(start: u64) -> Frame {
        Frame {
            kind: FrameKind::Data,
            start_sample: start,
            end_sample: start + 1,
            data1: 0,
            data2: 0,
            flags: FrameFlags::NONE,
        }
    }

    #[test]
    fn test_memory_sink_packets() {
        let mut sink = MemorySink::new();
        sink.start_new_packet().unwrap();
        sink.emit_frame(frame(0)).unwrap();
        sink.emit_frame(frame(2)).unwrap();
        sink.commit().unwrap();
        sink.start_new_packet().unwrap();
        sink.emit_frame(frame(4)).unwrap();
        sink.start_new_packet().unwrap();

        assert_eq!(sink.packets().len(), 2);
        assert_eq!(sink.packet_frames(sink.packets()[0]).len(), 2);
        assert_eq!(sink.committed_frames().len(), 2);
        assert_eq!(sink.frames().len(), 3);
        assert_eq!(sink.num_commits(), 1);
    }

    #[test]
    fn test_channel_sink_forwards_events() {
        let (tx, rx) = bounded(8);
        let mut sink = ChannelSink::new(tx);
        sink.emit_frame(frame(10)).unwrap();
        sink.emit_marker(3, MarkerKind::Start, ChannelId(1)).unwrap();
        sink.commit().unwrap();
        sink.close();

        assert_eq!(
            rx.recv().unwrap(),
            ChannelMessage::Sample(DecoderEvent::Frame(frame(10)))
        );
        assert_eq!(
            rx.recv().unwrap(),
            ChannelMessage::Sample(DecoderEvent::Marker(Marker::new(
                3,
                MarkerKind::Start,
                ChannelId(1)
            )))
        );
        assert_eq!(rx.recv().unwrap(), ChannelMessage::Sample(DecoderEvent::Commit));
        assert_eq!(rx.recv().unwrap(), ChannelMessage::EndOfStream);
        assert_eq!(sink.events_sent(), 3);
    }

    #[test]
    fn test_channel_sink_disconnected() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        assert!(matches!(sink.commit(), Err(WorkError::SendError(_))));
    }
}

/// Memory sink that raises a stop flag once `limit` frames are committed
#[cfg(test)]
pub(crate) struct StopAfterFrames<'a> {
    pub inner: MemorySink,
    stop: &'a std::sync::atomic::AtomicBool,
    limit: usize,
}

#[cfg(test)]
impl<'a> StopAfterFrames<'a> {
    pub fn new(stop: &'a std::sync::atomic::AtomicBool, limit: usize) -> Self {
        Self {
            inner: MemorySink::new(),
            stop,
            limit,
        }
    }
}

#[cfg(test)]
impl ResultSink for StopAfterFrames<'_> {
    fn emit_frame(&mut self, frame: Frame) -> WorkResult<()> {
        self.inner.emit_frame(frame)
    }

    fn emit_marker(
        &mut self,
        sample: SampleIndex,
        kind: MarkerKind,
        channel: ChannelId,
    ) -> WorkResult<()> {
        self.inner.emit_marker(sample, kind, channel)
    }

    fn commit(&mut self) -> WorkResult<()> {
        self.inner.commit()?;
        if self.inner.committed_frames().len() >= self.limit {
            self.stop
                .store(true, std::sync::atomic::Ordering::Relaxed);
        }
        Ok(())
    }

    fn start_new_packet(&mut self) -> WorkResult<()> {
        self.inner.start_new_packet()
    }
}
