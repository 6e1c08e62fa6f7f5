//! Common decoder types and enums

use crate::runtime::sample::{BitLevel, ChannelId, SampleIndex};
use std::fmt;

/// Order in which the bits of a word travel on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// Clock edge on which data lines are valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeDirection {
    Rising,
    #[default]
    Falling,
}

/// Placement of the data bits inside a slot wider than the word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordAlignment {
    /// Data first, padding after
    #[default]
    LeftAligned,
    /// Padding first, data last
    RightAligned,
}

/// Timing of the data lines relative to frame sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitAlignment {
    #[default]
    NoShift,
    /// Data lags frame sync by one clock
    ShiftedRightOne,
}

/// Numeric interpretation of decoded words (presentation only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sign {
    #[default]
    Unsigned,
    Signed,
}

/// Discriminator of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// First byte after a start or restart
    Address,
    Data,
    /// GSBus sub-channel index
    Channel(u8),
    /// Slot narrower than the configured data width
    ErrorTooFewBits,
    /// Frame bit count not divisible by the channel count
    ErrorUnevenDivision,
}

impl FrameKind {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            FrameKind::ErrorTooFewBits | FrameKind::ErrorUnevenDivision
        )
    }
}

/// Frame flag bitset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FrameFlags(u8);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);
    pub const ACK: FrameFlags = FrameFlags(1 << 0);
    pub const MISSING_ACK: FrameFlags = FrameFlags(1 << 1);
    pub const DISPLAY_AS_WARNING: FrameFlags = FrameFlags(1 << 6);
    pub const DISPLAY_AS_ERROR: FrameFlags = FrameFlags(1 << 7);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = FrameFlags;

    fn bitor(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FrameFlags {
    fn bitor_assign(&mut self, rhs: FrameFlags) {
        self.0 |= rhs.0;
    }
}

/// Decoded protocol unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    pub kind: FrameKind,
    /// First sample, inclusive
    pub start_sample: SampleIndex,
    /// Last sample, inclusive
    pub end_sample: SampleIndex,
    /// Primary value (I2C byte, GSBus command word)
    pub data1: u64,
    /// Secondary value (GSBus status word)
    pub data2: u64,
    pub flags: FrameFlags,
}

impl Frame {
    /// Two's-complement view of `data1` for a `bits`-wide word.
    pub fn signed_data1(&self, bits: u32) -> i64 {
        convert_to_signed(self.data1, bits)
    }

    /// Two's-complement view of `data2` for a `bits`-wide word.
    pub fn signed_data2(&self, bits: u32) -> i64 {
        convert_to_signed(self.data2, bits)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?}[{}..={}] 0x{:X}/0x{:X} flags=0x{:02X}",
            self.kind,
            self.start_sample,
            self.end_sample,
            self.data1,
            self.data2,
            self.flags.bits()
        )
    }
}

/// Display annotation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    UpArrow,
    DownArrow,
    Start,
    Stop,
}

/// Annotation of a single sample on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    pub sample: SampleIndex,
    pub kind: MarkerKind,
    pub channel: ChannelId,
}

impl Marker {
    pub fn new(sample: SampleIndex, kind: MarkerKind, channel: ChannelId) -> Self {
        Self {
            sample,
            kind,
            channel,
        }
    }
}

/// Accumulates bits into a word according to a bit order
#[derive(Debug, Clone)]
pub struct DataBuilder {
    order: BitOrder,
    num_bits: u32,
    added: u32,
    value: u64,
}

impl DataBuilder {
    /// `num_bits` must be 1..=64
    pub fn new(order: BitOrder, num_bits: u32) -> Self {
        debug_assert!((1..=64).contains(&num_bits));
        Self {
            order,
            num_bits,
            added: 0,
            value: 0,
        }
    }

    pub fn add_bit(&mut self, bit: BitLevel) {
        if self.added >= self.num_bits {
            return;
        }
        if bit.is_high() {
            let position = match self.order {
                BitOrder::MsbFirst => self.num_bits - 1 - self.added,
                BitOrder::LsbFirst => self.added,
            };
            self.value |= 1u64 << position;
        }
        self.added += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.added == self.num_bits
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Sign-extend the low `bits` of `value`.
pub fn convert_to_signed(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}
