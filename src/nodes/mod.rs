//! Bus decoders and the synthesizers that feed them
//!
//! - **Decoders**: turn captured channels into frames and markers (I2C, GSBus)
//! - **Simulation**: draw waveforms for each bus that decode back to a known
//!   payload
//!
//! # Examples
//!
//! ```ignore
//! use busdecode::nodes::decoders::{GsBusDecoder, GsBusSettings};
//! use busdecode::nodes::simulation::GsBusSimulator;
//!
//! let mut sim = GsBusSimulator::new(GsBusSettings::default(), 100_000_000)?;
//! sim.generate_frames(4);
//! let decoder = GsBusDecoder::new(GsBusSettings::default(), sim.to_capture()?)?;
//! # Ok::<(), busdecode::BusError>(())
//! ```

pub mod decoders;
pub mod simulation;
