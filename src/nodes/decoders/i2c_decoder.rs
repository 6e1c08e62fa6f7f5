//! I2C decoder for the two-wire addressed bus
//!
//! Data is sampled on every SCL rising edge. Any SDA transition while SCL is
//! high is a bus condition instead of a bit: falling SDA is a (repeated)
//! start, rising SDA is a stop. A condition aborts the byte in progress and
//! the next byte is decoded as an address.

use super::types::{BitOrder, DataBuilder, Frame, FrameFlags, FrameKind, MarkerKind};
use crate::runtime::cursor::{ChannelCursor, SampleCursor};
use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::node::{Analyzer, PassSummary, ResultSink, StopReason};
use crate::runtime::sample::{BitLevel, Capture, ChannelId, SampleIndex};
use crate::{BusError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info_span, trace, warn};

/// Lowest capture rate the decoder is specified for
pub const I2C_MINIMUM_SAMPLE_RATE_HZ: u64 = 2_000_000;

/// I2C decoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cSettings {
    pub scl: ChannelId,
    pub sda: ChannelId,
    pub bit_order: BitOrder,
}

impl Default for I2cSettings {
    fn default() -> Self {
        Self {
            scl: ChannelId(0),
            sda: ChannelId(1),
            bit_order: BitOrder::MsbFirst,
        }
    }
}

impl I2cSettings {
    pub fn with_channels(mut self, scl: ChannelId, sda: ChannelId) -> Self {
        self.scl = scl;
        self.sda = sda;
        self
    }

    pub fn with_bit_order(mut self, bit_order: BitOrder) -> Self {
        self.bit_order = bit_order;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scl == self.sda {
            return Err(BusError::InvalidSetting(
                "SDA and SCL can't be assigned to the same input".to_string(),
            ));
        }
        Ok(())
    }
}

/// I2C decoder bound to one capture
pub struct I2cDecoder {
    name: String,
    settings: I2cSettings,
    capture: Capture,
}

impl I2cDecoder {
    pub fn new(settings: I2cSettings, capture: Capture) -> Result<Self> {
        settings.validate()?;
        capture.channel(settings.scl)?;
        capture.channel(settings.sda)?;
        let decoder = Self {
            name: "i2c_decoder".to_string(),
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

    pub fn settings(&self) -> &I2cSettings {
        &self.settings
    }

    fn open_cursor(&self, id: ChannelId) -> WorkResult<ChannelCursor> {
        self.capture
            .cursor(id)
            .map_err(|e| WorkError::InvalidState(e.to_string()))
    }
}

impl Analyzer for I2cDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimum_sample_rate_hz(&self) -> u64 {
        I2C_MINIMUM_SAMPLE_RATE_HZ
    }

    fn run(&mut self, sink: &mut dyn ResultSink, stop: &AtomicBool) -> WorkResult<PassSummary> {
        let span = info_span!("i2c_pass", decoder = %self.name);
        let _enter = span.enter();

        let mut pass = BytePass {
            settings: &self.settings,
            scl: self.open_cursor(self.settings.scl)?,
            sda: self.open_cursor(self.settings.sda)?,
            awaiting_address: true,
            arrows: Vec::with_capacity(8),
            units: 0,
            frames: 0,
        };

        let result = pass.decode(sink, stop);
        debug!(
            "Pass over {} ended after {} bytes, {} frames",
            self.capture, pass.units, pass.frames
        );
        PassSummary::from_loop(result, pass.units, pass.frames)
    }
}

#[derive(Debug, Clone, Copy)]
struct SampledBit {
    level: BitLevel,
    rising_edge: SampleIndex,
}

/// State of one decode pass
struct BytePass<'a> {
    settings: &'a I2cSettings,
    scl: ChannelCursor,
    sda: ChannelCursor,
    awaiting_address: bool,
    /// SCL rising edges of the byte being assembled
    arrows: Vec<SampleIndex>,
    units: u64,
    frames: u64,
}

impl BytePass<'_> {
    fn decode(&mut self, sink: &mut dyn ResultSink, stop: &AtomicBool) -> WorkResult<StopReason> {
        self.advance_to_start_bit(sink)?;
        // SCL is low after the start.
        self.scl.advance_to_next_edge()?;

        loop {
            if stop.load(Ordering::Relaxed) {
                debug!("Stop requested after {} bytes", self.units);
                return Ok(StopReason::Stopped);
            }
            self.units += 1;
            self.decode_byte(sink)?;
        }
    }

    fn advance_to_start_bit(&mut self, sink: &mut dyn ResultSink) -> WorkResult<()> {
        loop {
            let edge = self.sda.advance_to_next_edge()?;
            if self.sda.bit_level() == BitLevel::Low {
                self.scl.advance_to_abs_position(edge)?;
                if self.scl.bit_level() == BitLevel::High {
                    break;
                }
            }
        }

        debug!("First start condition at sample {}", self.sda.sample_index());
        sink.emit_marker(self.sda.sample_index(), MarkerKind::Start, self.sda.channel())
    }

    /// Assemble one byte plus its ack. A byte interrupted by a bus condition
    /// produces nothing.
    fn decode_byte(&mut self, sink: &mut dyn ResultSink) -> WorkResult<()> {
        let kind = if self.awaiting_address {
            FrameKind::Address
        } else {
            FrameKind::Data
        };

        self.arrows.clear();
        let mut byte = DataBuilder::new(self.settings.bit_order, 8);
        for _ in 0..8 {
            let Some(bit) = self.decode_bit(sink)? else {
                return Ok(());
            };
            self.arrows.push(bit.rising_edge);
            byte.add_bit(bit.level);
        }

        let last_valid_sample = self.scl.sample_index();
        let (end_sample, flags) = match self.decode_bit(sink)? {
            None => (last_valid_sample, FrameFlags::MISSING_ACK),
            Some(ack) => {
                self.awaiting_address = false;
                let flags = match ack.level {
                    BitLevel::Low => FrameFlags::ACK,
                    BitLevel::High => FrameFlags::DISPLAY_AS_WARNING,
                };
                (self.scl.sample_index(), flags)
            }
        };

        for &arrow in &self.arrows {
            sink.emit_marker(arrow, MarkerKind::UpArrow, self.scl.channel())?;
        }

        let frame = Frame {
            kind,
            start_sample: self.arrows[0],
            end_sample,
            data1: byte.value(),
            data2: 0,
            flags,
        };
        trace!("{}", frame);
        sink.emit_frame(frame)?;
        sink.commit()?;
        self.frames += 1;
        Ok(())
    }

    /// Sample one bit on the next SCL rising edge, leaving SCL low.
    /// Returns `None` when a start or stop happened while SCL was high.
    fn decode_bit(&mut self, sink: &mut dyn ResultSink) -> WorkResult<Option<SampledBit>> {
        let rising_edge = self.scl.advance_to_next_edge()?;
        self.sda.advance_to_abs_position(rising_edge)?;
        let level = self.sda.bit_level();
        let mut valid = true;

        // Nothing left on SCL but SDA still moves: the trailing SDA edges can
        // only be bus conditions. Confirm SCL is still idle before each one.
        if !self.scl.has_more_transitions() {
            while self.sda.has_more_transitions() && !self.scl.has_more_transitions() {
                self.sda.advance_to_next_edge()?;
                self.record_start_stop_bit(sink)?;
                valid = false;
            }
        }

        let falling_edge = self.scl.advance_to_next_edge()?;
        while self
            .sda
            .would_advancing_to_abs_position_cause_transition(falling_edge.saturating_sub(1))
        {
            self.sda.advance_to_next_edge()?;
            self.record_start_stop_bit(sink)?;
            valid = false;
        }

        Ok(valid.then_some(SampledBit { level, rising_edge }))
    }

    fn record_start_stop_bit(&mut self, sink: &mut dyn ResultSink) -> WorkResult<()> {
        let sample = self.sda.sample_index();
        let kind = match self.sda.bit_level() {
            BitLevel::Low => MarkerKind::Start,
            BitLevel::High => MarkerKind::Stop,
        };
        trace!("{:?} at sample {}", kind, sample);

        sink.emit_marker(sample, kind, self.sda.channel())?;
        self.awaiting_address = true;
        sink.start_new_packet()?;
        sink.commit()
    }
}
