//! Fixed-point sine tables used as synthetic payloads

use std::f64::consts::TAU;

/// Word rate the default payload tables are computed for
pub const DEFAULT_WORD_RATE_HZ: f64 = 24_000.0;
/// Fundamental of the default payload tables
pub const DEFAULT_TONE_HZ: f64 = 220.0;

/// One full cycle of `harmonic * frequency_hz` sampled at `word_rate_hz`,
/// scaled to a quarter of the range of a signed `bits`-wide word.
pub fn sine_table(word_rate_hz: f64, frequency_hz: f64, bits: u32, harmonic: u32) -> Vec<i64> {
    let samples_for_one_cycle = (word_rate_hz / frequency_hz) as usize;
    let max_amplitude = if bits >= 2 {
        (1i64 << (bits.min(63) - 2)) - 1
    } else {
        0
    };

    (0..samples_for_one_cycle)
        .map(|i| {
            let t = i as f64 / samples_for_one_cycle as f64;
            let value = (t * TAU * f64::from(harmonic)).sin();
            (max_amplitude as f64 * value) as i64
        })
        .collect()
}

/// Low `bits` of the two's-complement form of `value`
pub fn to_twos_complement(value: i64, bits: u32) -> u64 {
    if bits >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << bits) - 1)
    }
}

/// Endless payload cycling through a table of signed samples
#[derive(Debug, Clone)]
pub struct SineWords {
    table: Vec<i64>,
    index: usize,
    bits: u32,
}

impl SineWords {
    pub fn new(table: Vec<i64>, bits: u32) -> Self {
        Self {
            table,
            index: 0,
            bits,
        }
    }

    /// The 220 Hz tone at the given harmonic, as `bits`-wide words
    pub fn tone(bits: u32, harmonic: u32) -> Self {
        Self::new(
            sine_table(DEFAULT_WORD_RATE_HZ, DEFAULT_TONE_HZ, bits, harmonic),
            bits,
        )
    }
}

impl Iterator for SineWords {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.table.is_empty() {
            return Some(0);
        }
        let value = self.table[self.index];
        self.index = (self.index + 1) % self.table.len();
        Some(to_twos_complement(value, self.bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::types::convert_to_signed;

    #[test]
    fn test_table_length_and_amplitude() {
        let table = sine_table(24_000.0, 220.0, 24, 1);
        assert_eq!(table.len(), 109);
        let max_amplitude = (1 << 22) - 1;
        assert_eq!(table[0], 0);
        assert!(table.iter().all(|v| v.abs() <= max_amplitude));
        assert!(table.iter().any(|&v| v > max_amplitude * 9 / 10));
        assert!(table.iter().any(|&v| v < -max_amplitude * 9 / 10));
    }

    #[test]
    fn test_twos_complement_round_trip() {
        assert_eq!(to_twos_complement(-1, 8), 0xFF);
        assert_eq!(to_twos_complement(-2, 24), 0xFF_FFFE);
        assert_eq!(convert_to_signed(to_twos_complement(-12345, 24), 24), -12345);
        assert_eq!(to_twos_complement(-1, 64), u64::MAX);
    }

    #[test]
    fn test_sine_words_cycle() {
        let mut words = SineWords::new(vec![1, -1], 8);
        let got: Vec<u64> = words.by_ref().take(4).collect();
        assert_eq!(got, vec![1, 0xFF, 1, 0xFF]);
    }
}
