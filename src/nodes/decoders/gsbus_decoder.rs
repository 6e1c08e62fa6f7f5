//! GSBus decoder for the frame-sync delimited TDM bus
//!
//! Every data-valid clock edge samples the command, status and frame-sync
//! lines. A frame starts on the bit where frame sync is first seen LOW after
//! HIGH and runs until the next such bit (exclusive). The collected bits are
//! split evenly into `channels_per_frame` slots and each slot yields one
//! value per data line.
//!
//! Flow per pass:
//!   1. Park the clock so its next edge is the data-valid edge
//!   2. Throw away bits until the first frame boundary
//!   3. Collect one frame, split it into slots, emit frames, commit
//!   4. Repeat until the capture runs out or a stop is requested

use super::types::{
    BitAlignment, BitOrder, DataBuilder, EdgeDirection, Frame, FrameFlags, FrameKind, MarkerKind,
    Sign, WordAlignment,
};
use crate::runtime::cursor::{ChannelCursor, SampleCursor};
use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::node::{Analyzer, PassSummary, ResultSink, StopReason};
use crate::runtime::sample::{BitLevel, Capture, ChannelId, SampleIndex};
use crate::{BusError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info_span, trace, warn};

/// Lowest capture rate the decoder is specified for
pub const GSBUS_MINIMUM_SAMPLE_RATE_HZ: u64 = 100_000_000;

/// GSBus decoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsBusSettings {
    /// CMD_CLK
    pub clock: ChannelId,
    /// CMD_FS
    pub frame: ChannelId,
    /// CMD_D
    pub command: ChannelId,
    /// STAT_D
    pub status: ChannelId,

    /// Bits in one frame on the wire; the synthesizer pads slots to fill it
    pub bits_per_frame: u32,
    pub channels_per_frame: u32,
    pub data_bits_per_channel: u32,

    pub bit_order: BitOrder,
    pub data_valid_edge: EdgeDirection,
    pub word_alignment: WordAlignment,
    pub bit_alignment: BitAlignment,
    pub sign: Sign,
}

impl Default for GsBusSettings {
    fn default() -> Self {
        Self {
            clock: ChannelId(0),
            frame: ChannelId(1),
            command: ChannelId(2),
            status: ChannelId(3),
            bits_per_frame: 256,
            channels_per_frame: 8,
            data_bits_per_channel: 24,
            bit_order: BitOrder::MsbFirst,
            data_valid_edge: EdgeDirection::Falling,
            word_alignment: WordAlignment::LeftAligned,
            bit_alignment: BitAlignment::NoShift,
            sign: Sign::Unsigned,
        }
    }
}

impl GsBusSettings {
    pub fn with_channels(
        mut self,
        clock: ChannelId,
        frame: ChannelId,
        command: ChannelId,
        status: ChannelId,
    ) -> Self {
        self.clock = clock;
        self.frame = frame;
        self.command = command;
        self.status = status;
        self
    }

    pub fn with_layout(
        mut self,
        bits_per_frame: u32,
        channels_per_frame: u32,
        data_bits_per_channel: u32,
    ) -> Self {
        self.bits_per_frame = bits_per_frame;
        self.channels_per_frame = channels_per_frame;
        self.data_bits_per_channel = data_bits_per_channel;
        self
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn with_data_valid_edge(mut self, edge: EdgeDirection) -> Self {
        self.data_valid_edge = edge;
        self
    }

    pub fn with_word_alignment(mut self, alignment: WordAlignment) -> Self {
        self.word_alignment = alignment;
        self
    }

    pub fn with_bit_alignment(mut self, alignment: BitAlignment) -> Self {
        self.bit_alignment = alignment;
        self
    }

    pub fn with_sign(mut self, sign: Sign) -> Self {
        self.sign = sign;
        self
    }

    /// Bits each channel occupies in a full frame
    pub fn slot_bits(&self) -> u32 {
        self.bits_per_frame / self.channels_per_frame.max(1)
    }

    /// Non-data bits in each slot
    pub fn padding_bits(&self) -> u32 {
        self.slot_bits().saturating_sub(self.data_bits_per_channel)
    }

    /// Check the configuration before a pass
    pub fn validate(&self) -> Result<()> {
        let lines = [self.clock, self.frame, self.command, self.status];
        for (i, a) in lines.iter().enumerate() {
            if lines[i + 1..].contains(a) {
                return Err(BusError::InvalidSetting(
                    "Please select different channels for the GSBus signals".to_string(),
                ));
            }
        }

        if !(2..=16).contains(&self.channels_per_frame) || self.channels_per_frame % 2 != 0 {
            return Err(BusError::InvalidSetting(format!(
                "channels per frame must be an even number in 2..=16, got {}",
                self.channels_per_frame
            )));
        }
        if !(1..=64).contains(&self.data_bits_per_channel) {
            return Err(BusError::InvalidSetting(format!(
                "data bits per channel must be in 1..=64, got {}",
                self.data_bits_per_channel
            )));
        }
        if !(2..=512).contains(&self.bits_per_frame) {
            return Err(BusError::InvalidSetting(format!(
                "bits per frame must be in 2..=512, got {}",
                self.bits_per_frame
            )));
        }
        if self.bits_per_frame % self.channels_per_frame != 0 {
            return Err(BusError::InvalidSetting(format!(
                "{} bits per frame do not divide into {} channels",
                self.bits_per_frame, self.channels_per_frame
            )));
        }
        if self.slot_bits() < self.data_bits_per_channel {
            return Err(BusError::InvalidSetting(format!(
                "{}-bit slots cannot hold {} data bits",
                self.slot_bits(),
                self.data_bits_per_channel
            )));
        }
        Ok(())
    }
}

/// Levels of every line at one data-valid clock edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitSample {
    command: BitLevel,
    status: BitLevel,
    frame: BitLevel,
    sample: SampleIndex,
}

/// Bits of the frame being collected
#[derive(Debug, Default)]
struct FrameAssembly {
    command_bits: Vec<BitLevel>,
    status_bits: Vec<BitLevel>,
    valid_edges: Vec<SampleIndex>,
}

impl FrameAssembly {
    fn clear(&mut self) {
        self.command_bits.clear();
        self.status_bits.clear();
        self.valid_edges.clear();
    }

    fn push(&mut self, bit: BitSample) {
        self.command_bits.push(bit.command);
        self.status_bits.push(bit.status);
        self.valid_edges.push(bit.sample);
    }

    fn len(&self) -> usize {
        self.valid_edges.len()
    }
}

/// GSBus decoder bound to one capture
pub struct GsBusDecoder {
    name: String,
    settings: GsBusSettings,
    capture: Capture,
}

impl GsBusDecoder {
    /// Validate `settings` against `capture` and create the decoder
    pub fn new(settings: GsBusSettings, capture: Capture) -> Result<Self> {
        settings.validate()?;
        for id in [
            settings.clock,
            settings.frame,
            settings.command,
            settings.status,
        ] {
            capture.channel(id)?;
        }
        let decoder = Self {
            name: "gsbus_decoder".to_string(),
            settings,
            capture,
        };
        if !decoder.supports_sample_rate(decoder.capture.sample_rate_hz()) {
            warn!(
                "[{}] {} is below the {} Hz minimum; decoding may be unreliable",
                decoder.name,
                decoder.capture,
                decoder.minimum_sample_rate_hz()
            );
        }
        Ok(decoder)
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn settings(&self) -> &GsBusSettings {
        &self.settings
    }

    fn open_cursor(&self, id: ChannelId) -> WorkResult<ChannelCursor> {
        self.capture
            .cursor(id)
            .map_err(|e| WorkError::InvalidState(e.to_string()))
    }
}

impl Analyzer for GsBusDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimum_sample_rate_hz(&self) -> u64 {
        GSBUS_MINIMUM_SAMPLE_RATE_HZ
    }

    fn run(&mut self, sink: &mut dyn ResultSink, stop: &AtomicBool) -> WorkResult<PassSummary> {
        let span = info_span!("gsbus_pass", decoder = %self.name);
        let _enter = span.enter();

        let mut pass = FramePass {
            settings: &self.settings,
            clock: self.open_cursor(self.settings.clock)?,
            frame: self.open_cursor(self.settings.frame)?,
            command: self.open_cursor(self.settings.command)?,
            status: self.open_cursor(self.settings.status)?,
            arrow: match self.settings.data_valid_edge {
                EdgeDirection::Falling => MarkerKind::DownArrow,
                EdgeDirection::Rising => MarkerKind::UpArrow,
            },
            current: None,
            last: None,
            previous_raw_frame: None,
            assembly: FrameAssembly::default(),
            units: 0,
            frames: 0,
        };

        let result = pass.decode(sink, stop);
        debug!(
            "Pass over {} ended after {} frame cycles, {} frames",
            self.capture, pass.units, pass.frames
        );
        PassSummary::from_loop(result, pass.units, pass.frames)
    }
}

/// State of one decode pass
struct FramePass<'a> {
    settings: &'a GsBusSettings,
    clock: ChannelCursor,
    frame: ChannelCursor,
    command: ChannelCursor,
    status: ChannelCursor,
    arrow: MarkerKind,

    /// First bit of the frame about to be collected
    current: Option<BitSample>,
    /// Bit before `current`
    last: Option<BitSample>,
    /// Raw frame-sync level of the previous bit, for one-bit-delayed sync
    previous_raw_frame: Option<BitLevel>,
    assembly: FrameAssembly,

    units: u64,
    frames: u64,
}

impl FramePass<'_> {
    fn decode(&mut self, sink: &mut dyn ResultSink, stop: &AtomicBool) -> WorkResult<StopReason> {
        self.setup_for_getting_first_bit()?;
        self.setup_for_getting_first_frame(sink)?;

        loop {
            if stop.load(Ordering::Relaxed) {
                debug!("Stop requested after {} frame cycles", self.units);
                return Ok(StopReason::Stopped);
            }
            self.get_frame(sink)?;
            self.units += 1;
            self.analyze_frame(sink)?;
            sink.commit()?;
        }
    }

    /// Leave the clock where its next edge is the data-valid edge.
    fn setup_for_getting_first_bit(&mut self) -> WorkResult<()> {
        let idle = match self.settings.data_valid_edge {
            EdgeDirection::Rising => BitLevel::Low,
            EdgeDirection::Falling => BitLevel::High,
        };
        if self.clock.bit_level() != idle {
            self.clock.advance_to_next_edge()?;
        }
        Ok(())
    }

    fn is_frame_boundary(last: Option<BitSample>, current: BitSample) -> bool {
        current.frame == BitLevel::Low && last.is_some_and(|l| l.frame == BitLevel::High)
    }

    fn setup_for_getting_first_frame(&mut self, sink: &mut dyn ResultSink) -> WorkResult<()> {
        // One bit is thrown away to get history on the frame line.
        self.last = Some(self.get_next_bit(sink)?);

        loop {
            let bit = self.get_next_bit(sink)?;
            if Self::is_frame_boundary(self.last, bit) {
                debug!("First frame boundary at sample {}", bit.sample);
                self.current = Some(bit);
                return Ok(());
            }
            self.last = Some(bit);
        }
    }

    /// Collect every bit from `current` up to the next frame boundary.
    fn get_frame(&mut self, sink: &mut dyn ResultSink) -> WorkResult<()> {
        let first = self.current.ok_or_else(|| {
            WorkError::InvalidState("frame collection started before synchronization".into())
        })?;

        self.assembly.clear();
        self.assembly.push(first);
        self.last = Some(first);

        loop {
            let bit = self.get_next_bit(sink)?;
            if Self::is_frame_boundary(self.last, bit) {
                self.current = Some(bit);
                return Ok(());
            }
            self.assembly.push(bit);
            self.last = Some(bit);
        }
    }

    fn analyze_frame(&mut self, sink: &mut dyn ResultSink) -> WorkResult<()> {
        let num_bits = self.assembly.len() as u32;
        let num_channels = self.settings.channels_per_frame;

        if num_bits % num_channels != 0 {
            debug!(
                "{} bits do not divide into {} channels",
                num_bits, num_channels
            );
            return self.emit_error_frame(sink, FrameKind::ErrorUnevenDivision);
        }

        let bits_per_channel = num_bits / num_channels;
        if bits_per_channel < self.settings.data_bits_per_channel {
            debug!(
                "{} bits per channel, need {}",
                bits_per_channel, self.settings.data_bits_per_channel
            );
            return self.emit_error_frame(sink, FrameKind::ErrorTooFewBits);
        }

        for i in 0..num_channels {
            self.analyze_sub_frame(sink, i * bits_per_channel, bits_per_channel, i as u8)?;
        }
        Ok(())
    }

    fn emit_error_frame(&mut self, sink: &mut dyn ResultSink, kind: FrameKind) -> WorkResult<()> {
        let edges = &self.assembly.valid_edges;
        let (Some(&start), Some(&end)) = (edges.first(), edges.last()) else {
            return Err(WorkError::InvalidState("empty frame assembly".into()));
        };
        sink.emit_frame(Frame {
            kind,
            start_sample: start,
            end_sample: end,
            data1: 0,
            data2: 0,
            flags: FrameFlags::DISPLAY_AS_ERROR,
        })?;
        self.frames += 1;
        Ok(())
    }

    /// Pack one slot's data bits into a frame.
    fn analyze_sub_frame(
        &mut self,
        sink: &mut dyn ResultSink,
        slot_start: u32,
        slot_bits: u32,
        channel_index: u8,
    ) -> WorkResult<()> {
        let data_bits = self.settings.data_bits_per_channel;
        let data_start = match self.settings.word_alignment {
            WordAlignment::LeftAligned => slot_start,
            WordAlignment::RightAligned => slot_start + slot_bits - data_bits,
        } as usize;
        let data_range = data_start..data_start + data_bits as usize;

        let mut command = DataBuilder::new(self.settings.bit_order, data_bits);
        let mut status = DataBuilder::new(self.settings.bit_order, data_bits);
        for (&c, &s) in self.assembly.command_bits[data_range.clone()]
            .iter()
            .zip(&self.assembly.status_bits[data_range])
        {
            command.add_bit(c);
            status.add_bit(s);
        }

        let edges = &self.assembly.valid_edges;
        let frame = Frame {
            kind: FrameKind::Channel(channel_index),
            start_sample: edges[slot_start as usize],
            end_sample: edges[(slot_start + slot_bits - 1) as usize],
            data1: command.value(),
            data2: status.value(),
            flags: FrameFlags::NONE,
        };
        trace!(
            "Ch {}: cmd=0x{:X} stat=0x{:X} [{}..={}]",
            channel_index, frame.data1, frame.data2, frame.start_sample, frame.end_sample
        );
        sink.emit_frame(frame)?;
        self.frames += 1;
        Ok(())
    }

    /// Sample every line on the next data-valid clock edge.
    fn get_next_bit(&mut self, sink: &mut dyn ResultSink) -> WorkResult<BitSample> {
        let data_valid_sample = self.clock.advance_to_next_edge()?;

        self.command.advance_to_abs_position(data_valid_sample)?;
        self.status.advance_to_abs_position(data_valid_sample)?;
        self.frame.advance_to_abs_position(data_valid_sample)?;

        let raw_frame = self.frame.bit_level();
        let frame = match self.settings.bit_alignment {
            BitAlignment::NoShift => raw_frame,
            BitAlignment::ShiftedRightOne => {
                self.previous_raw_frame.replace(raw_frame).unwrap_or(raw_frame)
            }
        };

        sink.emit_marker(data_valid_sample, self.arrow, self.settings.clock)?;

        // Step over the other edge so the next advance lands on a valid edge.
        self.clock.advance_to_next_edge()?;

        Ok(BitSample {
            command: self.command.bit_level(),
            status: self.status.bit_level(),
            frame,
            sample: data_valid_sample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::sample::ChannelData;
    use crate::runtime::sink::{MemorySink, StopAfterFrames};

    /// Hand-built capture: each bit is one clock period of 4 samples with the
    /// falling (valid) edge in the middle.
    fn build_capture(frame_bits: &[BitLevel], command: &[BitLevel]) -> Capture {
        let period = 4u64;
        let len = frame_bits.len() as u64 * period + 2;
        let mut clock_edges = Vec::new();
        for i in 0..frame_bits.len() as u64 {
            clock_edges.push(i * period + 1); // rising, lines change
            clock_edges.push(i * period + 3); // falling, data valid
        }

        let level_edges = |bits: &[BitLevel]| {
            let mut edges = Vec::new();
            let mut level = BitLevel::Low;
            for (i, &bit) in bits.iter().enumerate() {
                if bit != level {
                    edges.push(i as u64 * period + 1);
                    level = bit;
                }
            }
            edges
        };

        Capture::new(GSBUS_MINIMUM_SAMPLE_RATE_HZ)
            .with_channel(
                ChannelId(0),
                ChannelData::new(BitLevel::Low, clock_edges, len).unwrap(),
            )
            .with_channel(
                ChannelId(1),
                ChannelData::new(BitLevel::Low, level_edges(frame_bits), len).unwrap(),
            )
            .with_channel(
                ChannelId(2),
                ChannelData::new(BitLevel::Low, level_edges(command), len).unwrap(),
            )
            .with_channel(
                ChannelId(3),
                ChannelData::new(BitLevel::Low, vec![], len).unwrap(),
            )
    }

    /// Frame-sync levels for consecutive frames of the given lengths, each
    /// ending in a one-bit HIGH pulse. The first frame is lost to
    /// synchronization.
    fn frame_line(frame_lengths: &[usize]) -> Vec<BitLevel> {
        let mut bits = Vec::new();
        for &len in frame_lengths {
            bits.extend(std::iter::repeat_n(BitLevel::Low, len - 1));
            bits.push(BitLevel::High);
        }
        // The closing boundary bit needs one more clock period after it.
        bits.extend([BitLevel::Low, BitLevel::Low]);
        bits
    }

    fn decode(settings: GsBusSettings, capture: Capture) -> MemorySink {
        let mut decoder = GsBusDecoder::new(settings, capture).unwrap();
        let mut sink = MemorySink::new();
        decoder.run(&mut sink, &AtomicBool::new(false)).unwrap();
        sink
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = GsBusSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.slot_bits(), 32);
        assert_eq!(settings.padding_bits(), 8);
    }

    #[test]
    fn test_settings_reject_shared_channels() {
        let settings = GsBusSettings::default().with_channels(
            ChannelId(0),
            ChannelId(1),
            ChannelId(1),
            ChannelId(3),
        );
        assert!(matches!(settings.validate(), Err(BusError::InvalidSetting(_))));
    }

    #[test]
    fn test_settings_reject_narrow_slots() {
        let settings = GsBusSettings::default().with_layout(128, 8, 24);
        assert!(settings.validate().is_err());
        let settings = GsBusSettings::default().with_layout(250, 8, 24);
        assert!(settings.validate().is_err());
        let settings = GsBusSettings::default().with_layout(256, 3, 24);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_channel_is_rejected() {
        let capture = Capture::new(GSBUS_MINIMUM_SAMPLE_RATE_HZ);
        assert!(matches!(
            GsBusDecoder::new(GsBusSettings::default(), capture),
            Err(BusError::MissingChannel(_))
        ));
    }

    #[test]
    fn test_full_frame_yields_eight_channels() {
        // lead-in frame, one 256-bit frame
        let frame_bits = frame_line(&[8, 256]);
        let mut command = vec![BitLevel::Low; frame_bits.len()];
        // channel 2 of the 256-bit frame: MSB of the 24-bit word set
        command[8 + 2 * 32] = BitLevel::High;
        let sink = decode(GsBusSettings::default(), build_capture(&frame_bits, &command));

        let frames = sink.frames();
        assert_eq!(frames.len(), 8);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.kind, FrameKind::Channel(i as u8));
            // spans 32 bits, 4 samples per bit
            assert_eq!(frame.end_sample - frame.start_sample, 31 * 4);
        }
        assert_eq!(frames[2].data1, 0x80_0000);
        assert_eq!(frames[1].data1, 0);
    }

    #[test]
    fn test_uneven_frame_yields_single_error() {
        let frame_bits = frame_line(&[8, 255]);
        let command = vec![BitLevel::Low; frame_bits.len()];
        let sink = decode(GsBusSettings::default(), build_capture(&frame_bits, &command));

        assert_eq!(sink.frames().len(), 1);
        let frame = sink.frames()[0];
        assert_eq!(frame.kind, FrameKind::ErrorUnevenDivision);
        assert!(frame.flags.contains(FrameFlags::DISPLAY_AS_ERROR));
    }

    #[test]
    fn test_short_frame_yields_too_few_bits() {
        // 8 channels of 16 bits cannot carry 24-bit words
        let frame_bits = frame_line(&[8, 128]);
        let command = vec![BitLevel::Low; frame_bits.len()];
        let sink = decode(GsBusSettings::default(), build_capture(&frame_bits, &command));

        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.frames()[0].kind, FrameKind::ErrorTooFewBits);
    }

    #[test]
    fn test_markers_on_every_valid_edge() {
        let frame_bits = frame_line(&[8, 256]);
        let command = vec![BitLevel::Low; frame_bits.len()];
        let sink = decode(GsBusSettings::default(), build_capture(&frame_bits, &command));
        assert!(
            sink.markers()
                .iter()
                .all(|m| m.kind == MarkerKind::DownArrow && m.channel == ChannelId(0))
        );
        assert!(sink.markers().len() >= 256);
    }

    #[test]
    fn test_stop_before_first_frame() {
        let frame_bits = frame_line(&[8, 256, 256]);
        let command = vec![BitLevel::Low; frame_bits.len()];
        let mut decoder =
            GsBusDecoder::new(GsBusSettings::default(), build_capture(&frame_bits, &command))
                .unwrap();
        let mut sink = MemorySink::new();
        let summary = decoder.run(&mut sink, &AtomicBool::new(true)).unwrap();
        assert_eq!(summary.reason, StopReason::Stopped);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_stop_mid_pass_keeps_emitted_frames() {
        let frame_bits = frame_line(&[8, 256, 256, 256]);
        let command = vec![BitLevel::Low; frame_bits.len()];
        let mut decoder =
            GsBusDecoder::new(GsBusSettings::default(), build_capture(&frame_bits, &command))
                .unwrap();
        let stop = AtomicBool::new(false);
        let mut sink = StopAfterFrames::new(&stop, 16);
        let summary = decoder.run(&mut sink, &stop).unwrap();

        assert_eq!(summary.reason, StopReason::Stopped);
        assert_eq!(summary.units, 2);
        assert_eq!(summary.frames, 16);
        assert_eq!(sink.inner.frames().len(), 16);
        assert_eq!(sink.inner.committed_frames().len(), 16);
        assert_eq!(sink.inner.num_commits(), 2);
    }

    #[test]
    fn test_low_sample_rate_is_accepted() {
        let mut capture = Capture::new(1_000_000);
        for id in 0..4 {
            capture.insert(ChannelId(id), ChannelData::new(BitLevel::Low, vec![], 16).unwrap());
        }
        let decoder = GsBusDecoder::new(GsBusSettings::default(), capture).unwrap();
        assert!(!decoder.supports_sample_rate(1_000_000));
        assert!(decoder.supports_sample_rate(GSBUS_MINIMUM_SAMPLE_RATE_HZ));
    }
}
