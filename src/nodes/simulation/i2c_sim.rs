//! I2C bitstream synthesizer
//!
//! [`I2cBusWriter`] draws individual bus conditions and bits on SCL/SDA.
//! [`I2cSimulator`] drives it through whole transactions:
//!
//! ```text
//! Idle -> Start -> Bits -> Ack -> Bits ... -> Ack -> Stop -> Idle
//!                                               \-> Restart -> Bits
//! ```

use super::channel::{ChannelHandle, ClockGenerator, SimulationChannelGroup, adjust_target_sample};
use super::gsbus_sim::WordSource;
use super::sine::SineWords;
use crate::nodes::decoders::i2c_decoder::I2cSettings;
use crate::nodes::decoders::types::BitOrder;
use crate::runtime::sample::{BitLevel, Capture, SampleIndex};
use crate::Result;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Standard-mode SCL frequency
pub const DEFAULT_I2C_CLOCK_HZ: f64 = 100_000.0;

/// Writes SCL/SDA waveforms. Both lines idle HIGH.
///
/// SDA only changes in the middle of the SCL low phase, except for start
/// and stop conditions which change it while SCL is high.
#[derive(Debug, Clone)]
pub struct I2cBusWriter {
    channels: SimulationChannelGroup,
    scl: ChannelHandle,
    sda: ChannelHandle,
    clock: ClockGenerator,
    sample_rate_hz: u64,
}

impl I2cBusWriter {
    pub fn new(settings: &I2cSettings, clock_hz: f64, sample_rate_hz: u64) -> Result<Self> {
        settings.validate()?;
        let clock = ClockGenerator::new(clock_hz, sample_rate_hz)?;
        let mut channels = SimulationChannelGroup::new();
        let scl = channels.add(settings.scl, BitLevel::High);
        let sda = channels.add(settings.sda, BitLevel::High);
        Ok(Self {
            channels,
            scl,
            sda,
            clock,
            sample_rate_hz,
        })
    }

    fn wait(&mut self, half_periods: f64) {
        let samples = self.clock.advance_by_half_period(half_periods);
        self.channels.advance_all(samples);
    }

    fn set_scl(&mut self, level: BitLevel) {
        self.channels.get_mut(self.scl).transition_if_needed(level);
    }

    fn set_sda(&mut self, level: BitLevel) {
        self.channels.get_mut(self.sda).transition_if_needed(level);
    }

    /// Hold the current levels
    pub fn idle(&mut self, half_periods: f64) {
        self.wait(half_periods);
    }

    /// SDA falls while SCL is high, then SCL goes low. Expects an idle bus.
    pub fn start(&mut self) {
        self.wait(1.0);
        self.set_sda(BitLevel::Low);
        self.wait(1.0);
        self.set_scl(BitLevel::Low);
    }

    /// Start condition issued from the SCL low phase of a transfer
    pub fn restart(&mut self) {
        self.wait(0.5);
        self.set_sda(BitLevel::High);
        self.wait(0.5);
        self.set_scl(BitLevel::High);
        self.wait(0.5);
        self.set_sda(BitLevel::Low);
        self.wait(0.5);
        self.set_scl(BitLevel::Low);
    }

    /// One SCL pulse with `level` on SDA; SCL is low before and after.
    pub fn write_bit(&mut self, level: BitLevel) {
        self.wait(0.5);
        self.set_sda(level);
        self.wait(0.5);
        self.set_scl(BitLevel::High);
        self.wait(1.0);
        self.set_scl(BitLevel::Low);
    }

    pub fn write_byte(&mut self, byte: u8, order: BitOrder) {
        for i in 0..8 {
            let shift = match order {
                BitOrder::MsbFirst => 7 - i,
                BitOrder::LsbFirst => i,
            };
            self.write_bit(BitLevel::from((byte >> shift) & 1 == 1));
        }
    }

    /// SDA rises while SCL is high, leaving the bus idle.
    pub fn stop(&mut self) {
        self.wait(0.5);
        self.set_sda(BitLevel::Low);
        self.wait(0.5);
        self.set_scl(BitLevel::High);
        self.wait(0.5);
        self.set_sda(BitLevel::High);
        self.wait(0.5);
    }

    pub fn current_sample_number(&self) -> SampleIndex {
        self.channels.current_sample_number()
    }

    pub fn channels(&self) -> &SimulationChannelGroup {
        &self.channels
    }

    pub fn to_capture(&self) -> Result<Capture> {
        self.channels.to_capture(self.sample_rate_hz)
    }
}

/// One addressed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cTransaction {
    /// Address byte as sent on the wire, R/W bit included
    pub address_byte: u8,
    pub data: Vec<u8>,
}

impl I2cTransaction {
    pub fn write(address: u8, data: Vec<u8>) -> Self {
        Self {
            address_byte: address << 1,
            data,
        }
    }

    pub fn read(address: u8, data: Vec<u8>) -> Self {
        Self {
            address_byte: (address << 1) | 1,
            data,
        }
    }

    /// Every byte on the wire, address first
    pub fn bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() + 1);
        bytes.push(self.address_byte);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Idle,
    Start,
    Bits { byte: usize, bit: u32 },
    Ack { byte: usize },
    Stop,
    Restart,
}

/// Synthesizes I2C captures
pub struct I2cSimulator {
    settings: I2cSettings,
    writer: I2cBusWriter,
    state: BusState,
    current: Vec<u8>,

    queued: VecDeque<I2cTransaction>,
    address: u8,
    bytes_per_transaction: usize,
    payload: WordSource,
    repeated_start: bool,
    nak_last_byte: bool,

    transactions_written: u64,
}

impl I2cSimulator {
    /// Writes to address 0x50 with two bytes of 8-bit sine payload each,
    /// at 100 kHz.
    pub fn new(settings: I2cSettings, simulation_sample_rate_hz: u64) -> Result<Self> {
        let writer = I2cBusWriter::new(&settings, DEFAULT_I2C_CLOCK_HZ, simulation_sample_rate_hz)?;
        debug!(
            "I2C simulator: scl={} sda={} at {} Hz",
            settings.scl, settings.sda, simulation_sample_rate_hz
        );
        Ok(Self {
            settings,
            writer,
            state: BusState::Idle,
            current: Vec::new(),
            queued: VecDeque::new(),
            address: 0x50,
            bytes_per_transaction: 2,
            payload: Box::new(SineWords::tone(8, 1)),
            repeated_start: false,
            nak_last_byte: false,
            transactions_written: 0,
        })
    }

    /// SCL frequency. Call before generating.
    pub fn with_clock_rate(mut self, clock_hz: f64) -> Result<Self> {
        self.writer = I2cBusWriter::new(&self.settings, clock_hz, self.writer.sample_rate_hz)?;
        Ok(self)
    }

    /// 7-bit address of generated transactions
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address & 0x7F;
        self
    }

    pub fn with_bytes_per_transaction(mut self, count: usize) -> Self {
        self.bytes_per_transaction = count;
        self
    }

    /// Source of generated data bytes; only the low 8 bits are sent.
    pub fn with_payload(mut self, payload: WordSource) -> Self {
        self.payload = payload;
        self
    }

    /// Chain every other transaction to the next with a repeated start
    pub fn with_repeated_start(mut self, enabled: bool) -> Self {
        self.repeated_start = enabled;
        self
    }

    /// Answer the last byte of each transaction with NAK
    pub fn with_nak_last_byte(mut self, enabled: bool) -> Self {
        self.nak_last_byte = enabled;
        self
    }

    /// Send these before falling back to generated transactions
    pub fn with_transactions(mut self, transactions: impl IntoIterator<Item = I2cTransaction>) -> Self {
        self.queued.extend(transactions);
        self
    }

    pub fn settings(&self) -> &I2cSettings {
        &self.settings
    }

    pub fn transactions_written(&self) -> u64 {
        self.transactions_written
    }

    /// Write until the channels reach `newest_sample_requested`, given at
    /// the device rate `sample_rate_hz`.
    pub fn generate(
        &mut self,
        newest_sample_requested: SampleIndex,
        sample_rate_hz: u64,
    ) -> &SimulationChannelGroup {
        let target = adjust_target_sample(
            newest_sample_requested,
            sample_rate_hz,
            self.writer.sample_rate_hz,
        );
        while self.writer.current_sample_number() < target {
            self.step();
        }
        self.writer.channels()
    }

    /// Write `count` more complete transactions and release the bus.
    pub fn generate_transactions(&mut self, count: u64) -> &SimulationChannelGroup {
        let goal = self.transactions_written + count;
        while self.transactions_written < goal {
            self.step();
        }
        if self.state == BusState::Restart {
            self.state = BusState::Stop;
        }
        if self.state == BusState::Stop {
            self.step();
        }
        self.writer.channels()
    }

    pub fn channels(&self) -> &SimulationChannelGroup {
        self.writer.channels()
    }

    pub fn to_capture(&self) -> Result<Capture> {
        self.writer.to_capture()
    }

    fn load_transaction(&mut self) {
        let transaction = self.queued.pop_front().unwrap_or_else(|| {
            let data = self
                .payload
                .by_ref()
                .take(self.bytes_per_transaction)
                .map(|w| w as u8)
                .collect();
            I2cTransaction::write(self.address, data)
        });
        trace!("Transaction {:?}", transaction);
        self.current = transaction.bytes();
    }

    fn step(&mut self) {
        self.state = match self.state {
            BusState::Idle => {
                self.writer.idle(2.0);
                BusState::Start
            }
            BusState::Start => {
                self.load_transaction();
                self.writer.start();
                BusState::Bits { byte: 0, bit: 0 }
            }
            BusState::Restart => {
                self.load_transaction();
                self.writer.restart();
                BusState::Bits { byte: 0, bit: 0 }
            }
            BusState::Bits { byte, bit } => {
                let shift = match self.settings.bit_order {
                    BitOrder::MsbFirst => 7 - bit,
                    BitOrder::LsbFirst => bit,
                };
                let level = BitLevel::from((self.current[byte] >> shift) & 1 == 1);
                self.writer.write_bit(level);
                if bit == 7 {
                    BusState::Ack { byte }
                } else {
                    BusState::Bits { byte, bit: bit + 1 }
                }
            }
            BusState::Ack { byte } => {
                let last = byte + 1 == self.current.len();
                let ack = if last && self.nak_last_byte {
                    BitLevel::High
                } else {
                    BitLevel::Low
                };
                self.writer.write_bit(ack);

                if !last {
                    BusState::Bits {
                        byte: byte + 1,
                        bit: 0,
                    }
                } else {
                    self.transactions_written += 1;
                    if self.repeated_start && self.transactions_written % 2 == 1 {
                        BusState::Restart
                    } else {
                        BusState::Stop
                    }
                }
            }
            BusState::Stop => {
                self.writer.stop();
                BusState::Idle
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::i2c_decoder::{I2C_MINIMUM_SAMPLE_RATE_HZ, I2cDecoder};
    use crate::nodes::decoders::types::{Frame, FrameFlags, FrameKind, MarkerKind};
    use crate::runtime::node::Analyzer;
    use crate::runtime::sink::MemorySink;
    use std::sync::atomic::AtomicBool;

    fn decode(settings: &I2cSettings, capture: Capture) -> MemorySink {
        let mut decoder = I2cDecoder::new(settings.clone(), capture).unwrap();
        let mut sink = MemorySink::new();
        decoder.run(&mut sink, &AtomicBool::new(false)).unwrap();
        sink
    }

    fn values(frames: &[Frame]) -> Vec<u8> {
        frames.iter().map(|f| f.data1 as u8).collect()
    }

    #[test]
    fn test_writer_start_and_stop_edges() {
        let mut bus = I2cBusWriter::new(&I2cSettings::default(), 100_000.0, 2_000_000).unwrap();
        bus.start();
        bus.stop();
        let group = bus.channels();
        // 10 samples per half period
        assert_eq!(group.channels()[0].edges(), &[20, 30]);
        assert_eq!(group.channels()[1].edges(), &[10, 35]);
    }

    #[test]
    fn test_round_trip_generated_transactions() {
        let settings = I2cSettings::default();
        let mut sim = I2cSimulator::new(settings.clone(), I2C_MINIMUM_SAMPLE_RATE_HZ).unwrap();
        sim.generate_transactions(3);
        let sink = decode(&settings, sim.to_capture().unwrap());

        let expected_data: Vec<u8> = SineWords::tone(8, 1).take(6).map(|w| w as u8).collect();
        let frames = sink.frames();
        assert_eq!(frames.len(), 9);
        for (t, chunk) in frames.chunks(3).enumerate() {
            assert_eq!(chunk[0].kind, FrameKind::Address);
            assert_eq!(chunk[0].data1, 0xA0);
            assert_eq!(chunk[1].kind, FrameKind::Data);
            assert_eq!(values(&chunk[1..]), &expected_data[t * 2..t * 2 + 2]);
            assert!(chunk.iter().all(|f| f.flags == FrameFlags::ACK));
        }
        assert_eq!(sink.packets().len(), 3);
    }

    #[test]
    fn test_round_trip_explicit_transactions_lsb_first() {
        let settings = I2cSettings::default().with_bit_order(BitOrder::LsbFirst);
        let transactions = vec![
            I2cTransaction::write(0x21, vec![0x01, 0x80, 0xC3]),
            I2cTransaction::read(0x7F, vec![0xFF]),
            I2cTransaction::write(0x00, vec![]),
        ];
        let mut sim = I2cSimulator::new(settings.clone(), I2C_MINIMUM_SAMPLE_RATE_HZ)
            .unwrap()
            .with_transactions(transactions.clone());
        sim.generate_transactions(3);
        let sink = decode(&settings, sim.to_capture().unwrap());

        let expected: Vec<u8> = transactions.iter().flat_map(|t| t.bytes()).collect();
        assert_eq!(values(sink.frames()), expected);
        let kinds: Vec<FrameKind> = sink.frames().iter().map(|f| f.kind).collect();
        use FrameKind::{Address as A, Data as D};
        assert_eq!(kinds, vec![A, D, D, D, A, D, A]);
    }

    #[test]
    fn test_repeated_start_chains_transactions() {
        let settings = I2cSettings::default();
        let mut sim = I2cSimulator::new(settings.clone(), I2C_MINIMUM_SAMPLE_RATE_HZ)
            .unwrap()
            .with_repeated_start(true)
            .with_bytes_per_transaction(1);
        sim.generate_transactions(4);
        let sink = decode(&settings, sim.to_capture().unwrap());

        let kinds: Vec<FrameKind> = sink.frames().iter().map(|f| f.kind).collect();
        assert_eq!(kinds.len(), 8);
        for pair in kinds.chunks(2) {
            assert_eq!(pair, [FrameKind::Address, FrameKind::Data]);
        }
        let count = |kind: MarkerKind| sink.markers().iter().filter(|m| m.kind == kind).count();
        assert_eq!(count(MarkerKind::Start), 4);
        assert_eq!(count(MarkerKind::Stop), 2);
    }

    #[test]
    fn test_nak_last_byte() {
        let settings = I2cSettings::default();
        let mut sim = I2cSimulator::new(settings.clone(), I2C_MINIMUM_SAMPLE_RATE_HZ)
            .unwrap()
            .with_nak_last_byte(true)
            .with_payload(Box::new(std::iter::repeat(0x5A)));
        sim.generate_transactions(2);
        let sink = decode(&settings, sim.to_capture().unwrap());

        let flags: Vec<FrameFlags> = sink.frames().iter().map(|f| f.flags).collect();
        let ack = FrameFlags::ACK;
        let nak = FrameFlags::DISPLAY_AS_WARNING;
        assert_eq!(flags, vec![ack, ack, nak, ack, ack, nak]);
        assert_eq!(values(sink.frames()), vec![0xA0, 0x5A, 0x5A, 0xA0, 0x5A, 0x5A]);
    }

    #[test]
    fn test_generate_reaches_target() {
        let mut sim = I2cSimulator::new(I2cSettings::default(), I2C_MINIMUM_SAMPLE_RATE_HZ).unwrap();
        let group = sim.generate(5_000, 1_000_000);
        assert!(group.current_sample_number() >= 10_000);
        assert!(sim.transactions_written() > 0);
    }

    #[test]
    fn test_frames_are_ordered() {
        let settings = I2cSettings::default();
        let mut sim = I2cSimulator::new(settings.clone(), I2C_MINIMUM_SAMPLE_RATE_HZ)
            .unwrap()
            .with_bytes_per_transaction(4);
        sim.generate_transactions(5);
        let sink = decode(&settings, sim.to_capture().unwrap());

        for frame in sink.frames() {
            assert!(frame.start_sample <= frame.end_sample);
        }
        for packet in sink.packets() {
            for pair in sink.packet_frames(*packet).windows(2) {
                assert!(pair[0].end_sample < pair[1].start_sample);
            }
        }
    }
}
