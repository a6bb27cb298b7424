//! Discrete-event simulation of motes sharing a radio medium

pub mod chip;
pub mod medium;
pub mod queue;
pub mod scenarios;
pub mod simulation;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mote_radio::{ChannelConfig, RadioConfig, RadioError};
use mote_radio_core::{MoteId, SimTime};

pub use chip::ScriptedChip;
pub use medium::{DeliveryMode, Medium, MediumConfig, MediumStats};
pub use queue::EventQueue;
pub use simulation::{SimCommand, SimEvent, Simulation, SimulationHandle};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("no mote with id {0}")]
    UnknownMote(MoteId),
    #[error("the simulation is no longer running")]
    SimulationClosed,
    #[error(transparent)]
    Radio(#[from] RadioError),
    #[error("invalid scenario: {0}")]
    Config(#[from] toml::de::Error),
}

const PRESET_NOISE_FLOOR: f64 = -100.0;
const PRESET_SEED: u64 = 1;

/// Link conditions relative to a -100 dBm noise floor.
pub struct SimulationPresets;

impl SimulationPresets {
    pub fn good_conditions() -> ScenarioConfig {
        Self::preset(-86.0)
    }

    pub fn average_conditions() -> ScenarioConfig {
        Self::preset(-92.0)
    }

    pub fn poor_conditions() -> ScenarioConfig {
        Self::preset(-96.0)
    }

    /// Barely above the noise floor; most frames are lost.
    pub fn extreme_conditions() -> ScenarioConfig {
        Self::preset(-99.0)
    }

    fn preset(link_signal_dbm: f64) -> ScenarioConfig {
        ScenarioConfig {
            radio: RadioConfig::default().with_channel(ChannelConfig::BitError {
                noise_floor: PRESET_NOISE_FLOOR,
                seed: Some(PRESET_SEED),
            }),
            link_signal_dbm,
            ..Default::default()
        }
    }
}

/// A two-mote run: one sender, one receiver, a fixed link between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub radio: RadioConfig,
    pub medium: MediumConfig,
    pub link_signal_dbm: f64,
    pub frames: usize,
    pub payload_len: usize,
    /// Time between frame starts; never shorter than a frame's airtime.
    pub frame_interval_us: SimTime,
    /// Seed for the payload contents.
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            medium: MediumConfig::default(),
            link_signal_dbm: -70.0,
            frames: 50,
            payload_len: 20,
            frame_interval_us: 10_000,
            seed: 42,
        }
    }
}

impl ScenarioConfig {
    pub fn from_toml(text: &str) -> Result<Self, SimError> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mote_radio::RadioVariant;

    #[test]
    fn test_scenario_from_toml() {
        let config = ScenarioConfig::from_toml(
            r#"
            link_signal_dbm = -95.5
            frames = 3

            [radio]
            variant = "Cc1120"
            bitrate_bps = 200000
            frame_capacity = 142
            cc2520_footer_len = 2
            initial_signal_strength = -100.0
            channel = { BitError = { noise_floor = -100.0, seed = 9 } }

            [medium]
            mode = "Byte"
            background_dbm = -100.0
            "#,
        )
        .unwrap();

        assert_eq!(config.frames, 3);
        assert_eq!(config.payload_len, 20);
        assert_eq!(config.radio.variant, RadioVariant::Cc1120);
        assert_eq!(config.medium.mode, DeliveryMode::Byte);
        assert_eq!(
            config.radio.channel,
            ChannelConfig::BitError {
                noise_floor: -100.0,
                seed: Some(9)
            }
        );
    }

    #[test]
    fn test_bad_scenario() {
        let result = ScenarioConfig::from_toml("frames = \"many\"");
        assert!(matches!(result, Err(SimError::Config(_))));
    }
}
