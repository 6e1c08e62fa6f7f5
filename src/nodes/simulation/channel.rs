//! Simulated logic channels and the clock timing they are driven with

use crate::runtime::sample::{BitLevel, Capture, ChannelData, ChannelId, SampleIndex};
use crate::{BusError, Result};
use std::fmt;

/// A channel being written edge by edge
///
/// Only transitions are recorded, matching the run-length model decoders
/// read back through a cursor.
#[derive(Debug, Clone)]
pub struct SimulationChannel {
    id: ChannelId,
    initial: BitLevel,
    level: BitLevel,
    position: SampleIndex,
    edges: Vec<SampleIndex>,
}

impl SimulationChannel {
    pub fn new(id: ChannelId, initial: BitLevel) -> Self {
        Self {
            id,
            initial,
            level: initial,
            position: 0,
            edges: Vec::new(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn current_level(&self) -> BitLevel {
        self.level
    }

    pub fn current_sample_number(&self) -> SampleIndex {
        self.position
    }

    pub fn edges(&self) -> &[SampleIndex] {
        &self.edges
    }

    pub fn advance(&mut self, samples: u64) {
        self.position += samples;
    }

    /// Toggle the level at the current sample
    pub fn transition(&mut self) {
        self.level = !self.level;
        if self.position == 0 {
            self.initial = self.level;
        } else if self.edges.last() == Some(&self.position) {
            // Two toggles on one sample cancel out.
            self.edges.pop();
        } else {
            self.edges.push(self.position);
        }
    }

    /// Toggle only if `level` differs from the current level
    pub fn transition_if_needed(&mut self, level: BitLevel) {
        if level != self.level {
            self.transition();
        }
    }

    /// Freeze into capture data covering `num_samples` samples
    pub fn to_channel_data(&self, num_samples: u64) -> Result<ChannelData> {
        ChannelData::new(self.initial, self.edges.clone(), num_samples)
    }
}

/// Index of a channel inside a [`SimulationChannelGroup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle(usize);

/// Channels advanced together on one timeline
#[derive(Debug, Clone, Default)]
pub struct SimulationChannelGroup {
    channels: Vec<SimulationChannel>,
}

impl SimulationChannelGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: ChannelId, initial: BitLevel) -> ChannelHandle {
        self.channels.push(SimulationChannel::new(id, initial));
        ChannelHandle(self.channels.len() - 1)
    }

    pub fn get(&self, handle: ChannelHandle) -> &SimulationChannel {
        &self.channels[handle.0]
    }

    pub fn get_mut(&mut self, handle: ChannelHandle) -> &mut SimulationChannel {
        &mut self.channels[handle.0]
    }

    pub fn channels(&self) -> &[SimulationChannel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn advance_all(&mut self, samples: u64) {
        for channel in &mut self.channels {
            channel.advance(samples);
        }
    }

    /// Furthest sample written on any channel
    pub fn current_sample_number(&self) -> SampleIndex {
        self.channels
            .iter()
            .map(SimulationChannel::current_sample_number)
            .max()
            .unwrap_or(0)
    }

    /// Snapshot every channel into a capture of equal length
    pub fn to_capture(&self, sample_rate_hz: u64) -> Result<Capture> {
        let num_samples = self.current_sample_number() + 1;
        let mut capture = Capture::new(sample_rate_hz);
        for channel in &self.channels {
            capture.insert(channel.id(), channel.to_channel_data(num_samples)?);
        }
        Ok(capture)
    }
}

impl fmt::Display for SimulationChannelGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "SimulationChannelGroup[channels={}, samples={}]",
            self.channels.len(),
            self.current_sample_number()
        )
    }
}

/// Produces sample counts for a clock of a given frequency
///
/// Keeps the fractional remainder so long runs do not drift when the
/// half period is not a whole number of samples.
#[derive(Debug, Clone)]
pub struct ClockGenerator {
    half_period: f64,
    remainder: f64,
}

impl ClockGenerator {
    /// Smallest half period, in samples, that still leaves room for a
    /// quarter-period data change between clock edges.
    pub const MIN_HALF_PERIOD_SAMPLES: f64 = 4.0;

    pub fn new(frequency_hz: f64, sample_rate_hz: u64) -> Result<Self> {
        if !(frequency_hz > 0.0) {
            return Err(BusError::InvalidSetting(format!(
                "clock frequency must be positive, got {}",
                frequency_hz
            )));
        }
        let half_period = sample_rate_hz as f64 / (2.0 * frequency_hz);
        if half_period < Self::MIN_HALF_PERIOD_SAMPLES {
            return Err(BusError::InvalidSetting(format!(
                "sample rate {} Hz is too low for a {} Hz clock",
                sample_rate_hz, frequency_hz
            )));
        }
        Ok(Self {
            half_period,
            remainder: 0.0,
        })
    }

    pub fn half_period_samples(&self) -> f64 {
        self.half_period
    }

    /// Samples to advance for `multiple` half periods
    pub fn advance_by_half_period(&mut self, multiple: f64) -> u64 {
        let exact = self.half_period * multiple + self.remainder;
        let samples = exact.round().max(0.0);
        self.remainder = exact - samples;
        samples as u64
    }
}

/// Convert a target sample requested at the device rate into the
/// simulation rate, rounding up.
pub fn adjust_target_sample(
    target_sample: SampleIndex,
    sample_rate_hz: u64,
    simulation_sample_rate_hz: u64,
) -> SampleIndex {
    if sample_rate_hz == 0 || sample_rate_hz == simulation_sample_rate_hz {
        return target_sample;
    }
    let scaled = (target_sample as u128 * simulation_sample_rate_hz as u128)
        .div_ceil(sample_rate_hz as u128);
    scaled.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cursor::SampleCursor;

    #[test]
    fn test_transition_records_edges() {
        let mut ch = SimulationChannel::new(ChannelId(0), BitLevel::Low);
        ch.advance(3);
        ch.transition();
        ch.advance(2);
        ch.transition_if_needed(BitLevel::High);
        ch.transition_if_needed(BitLevel::Low);
        assert_eq!(ch.edges(), &[3, 5]);
        assert_eq!(ch.current_level(), BitLevel::Low);
    }

    #[test]
    fn test_double_transition_cancels() {
        let mut ch = SimulationChannel::new(ChannelId(0), BitLevel::Low);
        ch.advance(4);
        ch.transition();
        ch.transition();
        assert!(ch.edges().is_empty());
    }

    #[test]
    fn test_transition_at_zero_changes_initial_level() {
        let mut ch = SimulationChannel::new(ChannelId(0), BitLevel::Low);
        ch.transition();
        let data = ch.to_channel_data(10).unwrap();
        assert_eq!(data.initial_level(), BitLevel::High);
        assert!(data.edges().is_empty());
    }

    #[test]
    fn test_group_to_capture() {
        let mut group = SimulationChannelGroup::new();
        let a = group.add(ChannelId(0), BitLevel::Low);
        group.add(ChannelId(1), BitLevel::High);
        group.advance_all(5);
        group.get_mut(a).transition();
        group.advance_all(5);

        let capture = group.to_capture(1_000_000).unwrap();
        assert_eq!(capture.num_samples(), 11);
        let mut cursor = capture.cursor(ChannelId(0)).unwrap();
        assert_eq!(cursor.advance_to_next_edge(), Ok(5));
        assert_eq!(cursor.bit_level(), BitLevel::High);
    }

    #[test]
    fn test_clock_generator_spreads_remainder() {
        // 2.5 samples per half period is rejected, 12.5 is fine
        assert!(ClockGenerator::new(400_000.0, 2_000_000).is_err());
        let mut clock = ClockGenerator::new(40_000.0, 1_000_000).unwrap();
        let total: u64 = (0..8).map(|_| clock.advance_by_half_period(1.0)).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_adjust_target_sample() {
        assert_eq!(adjust_target_sample(1000, 1_000_000, 1_000_000), 1000);
        assert_eq!(adjust_target_sample(1000, 1_000_000, 100_000_000), 100_000);
        assert_eq!(adjust_target_sample(3, 2, 1), 2);
        assert_eq!(adjust_target_sample(7, 0, 50), 7);
    }
}
