//! Core data types for captured logic channels

use crate::{BusError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Not;
use std::sync::Arc;

/// Position on the shared capture timeline
pub type SampleIndex = u64;

/// Logic level of a channel at one sample
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BitLevel {
    Low,
    High,
}

impl BitLevel {
    pub fn is_high(self) -> bool {
        self == BitLevel::High
    }
}

impl Not for BitLevel {
    type Output = BitLevel;

    fn not(self) -> BitLevel {
        match self {
            BitLevel::Low => BitLevel::High,
            BitLevel::High => BitLevel::Low,
        }
    }
}

impl From<bool> for BitLevel {
    fn from(value: bool) -> Self {
        if value { BitLevel::High } else { BitLevel::Low }
    }
}

impl fmt::Display for BitLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BitLevel::Low => write!(f, "L"),
            BitLevel::High => write!(f, "H"),
        }
    }
}

/// Identifier of a logic channel (probe) within a capture
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// All transitions of one channel over a finished capture
///
/// Stored as the level at sample 0 plus the strictly increasing positions
/// at which the level toggles. `num_samples` bounds the capture; the level
/// after the last edge holds until then.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelData {
    initial: BitLevel,
    edges: Vec<SampleIndex>,
    num_samples: u64,
}

impl ChannelData {
    /// Create channel data from an initial level and toggle positions.
    pub fn new(initial: BitLevel, edges: Vec<SampleIndex>, num_samples: u64) -> Result<Self> {
        if let Some(pair) = edges.windows(2).find(|w| w[0] >= w[1]) {
            return Err(BusError::InvalidCapture(format!(
                "edges must be strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
        if edges.first() == Some(&0) {
            return Err(BusError::InvalidCapture(
                "edge at sample 0 is indistinguishable from the initial level".to_string(),
            ));
        }
        if let Some(&last) = edges.last()
            && last >= num_samples
        {
            return Err(BusError::InvalidCapture(format!(
                "edge at {} lies outside a capture of {} samples",
                last, num_samples
            )));
        }

        Ok(Self {
            initial,
            edges,
            num_samples,
        })
    }

    pub fn initial_level(&self) -> BitLevel {
        self.initial
    }

    pub fn edges(&self) -> &[SampleIndex] {
        &self.edges
    }

    pub fn num_samples(&self) -> u64 {
        self.num_samples
    }

    /// Level at `position`. An edge at `position` is already in effect.
    pub fn level_at(&self, position: SampleIndex) -> BitLevel {
        let toggles = self.edges.partition_point(|&e| e <= position);
        if toggles % 2 == 0 {
            self.initial
        } else {
            !self.initial
        }
    }
}

/// A finished multi-channel capture sharing one timeline
#[derive(Clone, Debug, Default)]
pub struct Capture {
    sample_rate_hz: u64,
    channels: BTreeMap<ChannelId, Arc<ChannelData>>,
}

impl Capture {
    pub fn new(sample_rate_hz: u64) -> Self {
        Self {
            sample_rate_hz,
            channels: BTreeMap::new(),
        }
    }

    /// Add (or replace) a channel
    pub fn with_channel(mut self, id: ChannelId, data: ChannelData) -> Self {
        self.insert(id, data);
        self
    }

    pub fn insert(&mut self, id: ChannelId, data: ChannelData) {
        self.channels.insert(id, Arc::new(data));
    }

    pub fn sample_rate_hz(&self) -> u64 {
        self.sample_rate_hz
    }

    pub fn channel(&self, id: ChannelId) -> Result<Arc<ChannelData>> {
        self.channels
            .get(&id)
            .cloned()
            .ok_or(BusError::MissingChannel(id))
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.keys().copied()
    }

    /// Length of the longest channel
    pub fn num_samples(&self) -> u64 {
        self.channels
            .values()
            .map(|c| c.num_samples())
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Capture[rate={}Hz, channels={}, samples={}]",
            self.sample_rate_hz,
            self.channels.len(),
            self.num_samples()
        )
    }
}
