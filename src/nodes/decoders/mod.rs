//! Protocol decoders
//!
//! Each decoder owns a capture and its settings and implements
//! [`Analyzer`](crate::runtime::Analyzer); every pass opens fresh cursors.

pub mod gsbus_decoder;
pub mod i2c_decoder;
pub mod types;

// Re-export common types
pub use types::{
    BitAlignment, BitOrder, EdgeDirection, Frame, FrameFlags, FrameKind, Marker, MarkerKind, Sign,
    WordAlignment,
};

// Re-export decoders
pub use gsbus_decoder::{GSBUS_MINIMUM_SAMPLE_RATE_HZ, GsBusDecoder, GsBusSettings};
pub use i2c_decoder::{I2C_MINIMUM_SAMPLE_RATE_HZ, I2cDecoder, I2cSettings};
