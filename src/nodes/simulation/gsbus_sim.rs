//! GSBus bitstream synthesizer
//!
//! Drives clock, frame-sync, command and status lines so that the output
//! decodes back to the configured payload with [`GsBusDecoder`].
//!
//! [`GsBusDecoder`]: crate::nodes::decoders::gsbus_decoder::GsBusDecoder

use super::channel::{ChannelHandle, ClockGenerator, SimulationChannelGroup, adjust_target_sample};
use super::sine::{DEFAULT_WORD_RATE_HZ, SineWords};
use crate::nodes::decoders::gsbus_decoder::GsBusSettings;
use crate::nodes::decoders::types::{BitAlignment, BitOrder, EdgeDirection, WordAlignment};
use crate::runtime::sample::{BitLevel, Capture, SampleIndex};
use crate::{BusError, Result};
use tracing::{debug, trace};

/// Words fed to one data line
pub type WordSource = Box<dyn Iterator<Item = u64> + Send>;

/// Fundamental and second harmonic of the 220 Hz tone, alternating per word
pub fn default_payload(bits: u32) -> WordSource {
    Box::new(
        SineWords::tone(bits, 1)
            .zip(SineWords::tone(bits, 2))
            .flat_map(|(a, b)| [a, b]),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SerializerState {
    Init,
    LeftPadding,
    Data,
    RightPadding,
}

/// Turns a stream of words into the bit sequence of one data line, slot by
/// slot, with padding placed according to the word alignment.
pub struct WordSerializer {
    state: SerializerState,
    bit_masks: Vec<u64>,
    bit_index: usize,
    padding_bits: u32,
    padding_count: u32,
    word_alignment: WordAlignment,
    bit_alignment: BitAlignment,
    word: u64,
    words: WordSource,
}

impl WordSerializer {
    pub fn new(settings: &GsBusSettings, mut words: WordSource) -> Self {
        let bits = settings.data_bits_per_channel;
        let bit_masks = match settings.bit_order {
            BitOrder::MsbFirst => (0..bits).rev().map(|b| 1u64 << b).collect(),
            BitOrder::LsbFirst => (0..bits).map(|b| 1u64 << b).collect(),
        };
        let word = words.next().unwrap_or(0);

        Self {
            state: SerializerState::Init,
            bit_masks,
            bit_index: 0,
            padding_bits: settings.padding_bits(),
            padding_count: 0,
            word_alignment: settings.word_alignment,
            bit_alignment: settings.bit_alignment,
            word,
            words,
        }
    }

    pub fn next_bit(&mut self) -> BitLevel {
        loop {
            match self.state {
                SerializerState::Init => {
                    self.state = SerializerState::LeftPadding;
                    if self.bit_alignment == BitAlignment::ShiftedRightOne {
                        // One-bit offset, inserted once.
                        return BitLevel::Low;
                    }
                }
                SerializerState::LeftPadding => {
                    if self.word_alignment == WordAlignment::RightAligned
                        && self.padding_count < self.padding_bits
                    {
                        self.padding_count += 1;
                        return BitLevel::Low;
                    }
                    self.padding_count = 0;
                    self.state = SerializerState::Data;
                }
                SerializerState::Data => {
                    if self.bit_index == self.bit_masks.len() {
                        self.bit_index = 0;
                        self.word = self.words.next().unwrap_or(0);
                        self.state = SerializerState::RightPadding;
                    } else {
                        let level = BitLevel::from(self.word & self.bit_masks[self.bit_index] != 0);
                        self.bit_index += 1;
                        return level;
                    }
                }
                SerializerState::RightPadding => {
                    if self.word_alignment == WordAlignment::LeftAligned
                        && self.padding_count < self.padding_bits
                    {
                        self.padding_count += 1;
                        return BitLevel::Low;
                    }
                    self.padding_count = 0;
                    self.state = SerializerState::LeftPadding;
                }
            }
        }
    }
}

/// Synthesizes GSBus captures
pub struct GsBusSimulator {
    settings: GsBusSettings,
    simulation_sample_rate_hz: u64,
    frame_rate_hz: f64,
    sync_pulse_bits: u32,

    channels: SimulationChannelGroup,
    clock: ChannelHandle,
    frame: ChannelHandle,
    command: ChannelHandle,
    status: ChannelHandle,

    clock_generator: ClockGenerator,
    frame_pattern: Vec<BitLevel>,
    frame_index: usize,
    command_words: WordSerializer,
    status_words: WordSerializer,
    bits_written: u64,
}

impl GsBusSimulator {
    /// Create a simulator writing at `simulation_sample_rate_hz`, with a
    /// 24 kHz frame rate, a one-bit sync pulse and the sine payload.
    pub fn new(settings: GsBusSettings, simulation_sample_rate_hz: u64) -> Result<Self> {
        settings.validate()?;

        let bit_clock_hz = DEFAULT_WORD_RATE_HZ * f64::from(settings.bits_per_frame);
        let clock_generator = ClockGenerator::new(bit_clock_hz, simulation_sample_rate_hz)?;

        let mut channels = SimulationChannelGroup::new();
        // The first transition written is the non-valid edge.
        let clock_idle = match settings.data_valid_edge {
            EdgeDirection::Falling => BitLevel::Low,
            EdgeDirection::Rising => BitLevel::High,
        };
        let clock = channels.add(settings.clock, clock_idle);
        let frame = channels.add(settings.frame, BitLevel::Low);
        let command = channels.add(settings.command, BitLevel::Low);
        let status = channels.add(settings.status, BitLevel::Low);

        let bits = settings.data_bits_per_channel;
        let command_words = WordSerializer::new(&settings, default_payload(bits));
        // Status starts on the second harmonic so the two lines differ.
        let mut status_payload = default_payload(bits);
        status_payload.next();
        let status_words = WordSerializer::new(&settings, status_payload);

        debug!(
            "GSBus simulator: {} bits/frame, {} ch x {} bits, {:.2} samples per half bit",
            settings.bits_per_frame,
            settings.channels_per_frame,
            bits,
            clock_generator.half_period_samples()
        );

        Ok(Self {
            frame_pattern: frame_pattern(settings.bits_per_frame, 1),
            settings,
            simulation_sample_rate_hz,
            frame_rate_hz: DEFAULT_WORD_RATE_HZ,
            sync_pulse_bits: 1,
            channels,
            clock,
            frame,
            command,
            status,
            clock_generator,
            frame_index: 0,
            command_words,
            status_words,
            bits_written: 0,
        })
    }

    /// Frames per second. Call before generating.
    pub fn with_frame_rate(mut self, frame_rate_hz: f64) -> Result<Self> {
        let bit_clock_hz = frame_rate_hz * f64::from(self.settings.bits_per_frame);
        self.clock_generator = ClockGenerator::new(bit_clock_hz, self.simulation_sample_rate_hz)?;
        self.frame_rate_hz = frame_rate_hz;
        Ok(self)
    }

    /// Number of HIGH bits closing each frame on the sync line
    pub fn with_sync_pulse_bits(mut self, sync_pulse_bits: u32) -> Result<Self> {
        if sync_pulse_bits == 0 || sync_pulse_bits >= self.settings.bits_per_frame {
            return Err(BusError::InvalidSetting(format!(
                "sync pulse of {} bits does not fit a {}-bit frame",
                sync_pulse_bits, self.settings.bits_per_frame
            )));
        }
        self.sync_pulse_bits = sync_pulse_bits;
        self.frame_pattern = frame_pattern(self.settings.bits_per_frame, sync_pulse_bits);
        Ok(self)
    }

    /// Replace the words sent on the command and status lines. Call before
    /// generating.
    pub fn with_payloads(mut self, command: WordSource, status: WordSource) -> Self {
        self.command_words = WordSerializer::new(&self.settings, command);
        self.status_words = WordSerializer::new(&self.settings, status);
        self
    }

    pub fn settings(&self) -> &GsBusSettings {
        &self.settings
    }

    pub fn simulation_sample_rate_hz(&self) -> u64 {
        self.simulation_sample_rate_hz
    }

    pub fn frame_rate_hz(&self) -> f64 {
        self.frame_rate_hz
    }

    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Write bits until the channels reach `newest_sample_requested`, given
    /// at the device rate `sample_rate_hz`.
    pub fn generate(
        &mut self,
        newest_sample_requested: SampleIndex,
        sample_rate_hz: u64,
    ) -> &SimulationChannelGroup {
        let target = adjust_target_sample(
            newest_sample_requested,
            sample_rate_hz,
            self.simulation_sample_rate_hz,
        );
        while self.channels.get(self.command).current_sample_number() < target {
            self.write_bit();
        }
        trace!("Generated up to sample {} ({} bits)", target, self.bits_written);
        &self.channels
    }

    /// Write exactly `count` more bits
    pub fn generate_bits(&mut self, count: u64) -> &SimulationChannelGroup {
        for _ in 0..count {
            self.write_bit();
        }
        &self.channels
    }

    /// Write `frames` whole frames plus a few bits, so every one of them
    /// is closed by a sync edge the decoder can see.
    pub fn generate_frames(&mut self, frames: u64) -> &SimulationChannelGroup {
        self.generate_bits(frames * u64::from(self.settings.bits_per_frame) + 4)
    }

    pub fn channels(&self) -> &SimulationChannelGroup {
        &self.channels
    }

    /// Snapshot of everything written so far
    pub fn to_capture(&self) -> Result<Capture> {
        self.channels.to_capture(self.simulation_sample_rate_hz)
    }

    fn next_frame_bit(&mut self) -> BitLevel {
        let level = self.frame_pattern[self.frame_index];
        self.frame_index = (self.frame_index + 1) % self.frame_pattern.len();
        level
    }

    fn write_bit(&mut self) {
        let command = self.command_words.next_bit();
        let status = self.status_words.next_bit();
        let frame = self.next_frame_bit();

        self.channels
            .advance_all(self.clock_generator.advance_by_half_period(1.0));

        // Non-valid edge: every line changes here.
        self.channels.get_mut(self.clock).transition();
        self.channels.get_mut(self.frame).transition_if_needed(frame);
        self.channels.get_mut(self.command).transition_if_needed(command);
        self.channels.get_mut(self.status).transition_if_needed(status);

        self.channels
            .advance_all(self.clock_generator.advance_by_half_period(1.0));

        // Data valid.
        self.channels.get_mut(self.clock).transition();
        self.bits_written += 1;
    }
}

/// LOW for the frame, HIGH for its last `sync_pulse_bits` bits
fn frame_pattern(bits_per_frame: u32, sync_pulse_bits: u32) -> Vec<BitLevel> {
    let low = bits_per_frame.saturating_sub(sync_pulse_bits) as usize;
    let mut pattern = vec![BitLevel::Low; low];
    pattern.resize(bits_per_frame as usize, BitLevel::High);
    pattern
}
