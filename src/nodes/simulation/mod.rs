//! Waveform synthesizers
//!
//! Simulated channels record only their transitions, so a synthesizer's
//! output converts directly into a [`Capture`](crate::runtime::Capture).

pub mod channel;
pub mod gsbus_sim;
pub mod i2c_sim;
pub mod sine;

pub use channel::{ChannelHandle, ClockGenerator, SimulationChannel, SimulationChannelGroup};
pub use gsbus_sim::{GsBusSimulator, WordSerializer, WordSource, default_payload};
pub use i2c_sim::{I2cBusWriter, I2cSimulator, I2cTransaction};
pub use sine::SineWords;
