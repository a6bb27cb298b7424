//! radio bridge between an emulated transceiver chip and a simulated radio medium

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mote_radio_core::SimTime;

pub mod bridge;
pub mod channel;
pub mod framing;
pub mod rssi;
pub mod scheduler;
pub mod state;

#[cfg(test)]
mod testing;

pub use bridge::{ChipPort, RadioBridge, RadioStats};
pub use channel::{BitErrorChannel, ChannelModel, IdealChannel};
pub use framing::{FrameAssembler, FramingStrategy, TransmissionFrame};
pub use rssi::SignalStrengthFilter;
pub use scheduler::{ByteDeliveryScheduler, RadioTimer, Timeline};
pub use state::{RadioEventSink, RadioState, RadioStateMachine};

/// Configuration errors. Raised only while building a radio; once a bridge
/// exists every runtime anomaly is logged and absorbed.
#[derive(Debug, Error)]
pub enum RadioError {
    #[error("mote has no {expected:?} radio chip")]
    MissingChip { expected: RadioVariant },

    #[error("bitrate of {0} bps is too low to derive a byte period")]
    InvalidBitrate(u32),

    #[error("frame capacity {capacity} is below the {required} bytes the framing needs")]
    FrameCapacityTooSmall { capacity: usize, required: usize },

    #[error("noise floor {0} is not a finite signal strength")]
    InvalidNoiseFloor(f64),
}

/// Transceiver families with distinct framing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioVariant {
    /// Generic 802.15.4 (CC2420 style): 5-byte sync header, then the PHY length.
    Ieee802154,
    Cc2520,
    Cc1120,
}

impl RadioVariant {
    pub fn default_bitrate(&self) -> u32 {
        match self {
            RadioVariant::Ieee802154 | RadioVariant::Cc2520 => 250_000,
            RadioVariant::Cc1120 => 200_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelConfig {
    Ideal,
    BitError { noise_floor: f64, seed: Option<u64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    pub variant: RadioVariant,
    pub bitrate_bps: u32,
    pub frame_capacity: usize,
    pub cc2520_footer_len: usize,
    pub channel: ChannelConfig,
    pub initial_signal_strength: f64,
}

impl RadioConfig {
    pub fn for_variant(variant: RadioVariant) -> Self {
        Self {
            variant,
            bitrate_bps: variant.default_bitrate(),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Microseconds one byte occupies on air.
    pub fn inter_byte_delay(&self) -> Result<SimTime, RadioError> {
        let bytes_per_second = self.bitrate_bps / 8;
        if bytes_per_second == 0 {
            return Err(RadioError::InvalidBitrate(self.bitrate_bps));
        }
        Ok(mote_radio_core::types::MICROS_PER_SECOND / bytes_per_second as SimTime)
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            variant: RadioVariant::Ieee802154,
            bitrate_bps: 250_000,
            frame_capacity: mote_radio_core::types::MAX_PSDU_LEN + 15,
            cc2520_footer_len: 2,
            channel: ChannelConfig::Ideal,
            initial_signal_strength: -100.0,
        }
    }
}
