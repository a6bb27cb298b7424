//! Canned runs over a single link, used by the `radio_sim` binary

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use mote_radio::{RadioConfig, RadioVariant};
use mote_radio_core::{types::MAX_PSDU_LEN, RadioPacket, SimTime};

use crate::{ScenarioConfig, SimError, Simulation};

/// Status bytes a CC1120 appends after the payload.
const CC1120_STATUS: [u8; 2] = [0xEE, 0xEF];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub frames_sent: usize,
    pub frames_intact: usize,
    pub frames_corrupted: usize,
    pub frames_lost: usize,
    pub bytes_corrupted: u64,
    pub events_processed: u64,
    pub sim_time: SimTime,
    /// Last packet that arrived damaged, for display.
    pub sample_corruption: Option<(Vec<u8>, Vec<u8>)>,
}

impl ScenarioReport {
    pub fn delivery_ratio(&self) -> f64 {
        if self.frames_sent == 0 {
            return 0.0;
        }
        self.frames_intact as f64 / self.frames_sent as f64
    }
}

/// Largest payload a frame of this configuration can carry.
pub fn max_payload_len(config: &RadioConfig) -> usize {
    let footer = config.cc2520_footer_len;
    match config.variant {
        RadioVariant::Ieee802154 => MAX_PSDU_LEN.min(config.frame_capacity.saturating_sub(6)),
        RadioVariant::Cc2520 => MAX_PSDU_LEN
            .saturating_sub(footer)
            .min(config.frame_capacity.saturating_sub(6 + footer)),
        RadioVariant::Cc1120 => (u8::MAX as usize).min(config.frame_capacity.saturating_sub(3)),
    }
}

/// Wrap `payload` the way the variant's driver hands it to the chip.
pub fn packet_for(variant: RadioVariant, footer_len: usize, payload: &[u8]) -> RadioPacket {
    match variant {
        RadioVariant::Ieee802154 => RadioPacket::from_slice(payload),
        RadioVariant::Cc2520 => {
            let mut data = Vec::with_capacity(payload.len() + 1);
            data.push((payload.len() + footer_len) as u8);
            data.extend_from_slice(payload);
            data.into()
        }
        RadioVariant::Cc1120 => {
            let mut data = Vec::with_capacity(payload.len() + 1 + CC1120_STATUS.len());
            data.push(payload.len() as u8);
            data.extend_from_slice(payload);
            data.extend_from_slice(&CC1120_STATUS);
            data.into()
        }
    }
}

/// Send `config.frames` frames from one mote to another and classify what
/// the receiving chip ends up with. `on_frame` is called after each frame.
pub fn run_scenario(
    config: &ScenarioConfig,
    mut on_frame: impl FnMut(usize),
) -> Result<ScenarioReport, SimError> {
    let mut sim = Simulation::new(config.medium.clone());
    let sender = sim.add_mote(&config.radio)?;
    let receiver = sim.add_mote(&config.radio)?;
    sim.set_link(sender, receiver, config.link_signal_dbm);
    sim.set_hardware(sender, true)?;
    sim.set_hardware(receiver, true)?;

    let max_payload = max_payload_len(&config.radio);
    let payload_len = if config.payload_len > max_payload {
        warn!(
            "payload of {} bytes does not fit a {:?} frame, sending {}",
            config.payload_len, config.radio.variant, max_payload
        );
        max_payload
    } else {
        config.payload_len
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut report = ScenarioReport::default();
    let mut start: SimTime = 0;

    info!(
        "sending {} frames of {} bytes at {} dBm",
        config.frames, payload_len, config.link_signal_dbm
    );

    for frame in 0..config.frames {
        let payload: Vec<u8> = (0..payload_len).map(|_| rng.random()).collect();
        let packet = packet_for(config.radio.variant, config.radio.cc2520_footer_len, &payload);
        let received_before = sim.mote(receiver)?.chip().received_packets().len();

        let airtime_end = sim.transmit(sender, &packet, start)?;
        sim.run();
        report.frames_sent += 1;

        let received = &sim.mote(receiver)?.chip().received_packets()[received_before..];
        match received.first() {
            Some(got) if *got == packet => report.frames_intact += 1,
            Some(got) => {
                debug!("frame {frame} corrupted");
                report.frames_corrupted += 1;
                report.sample_corruption = Some((packet.data().to_vec(), got.data().to_vec()));
            }
            None => {
                debug!("frame {frame} lost");
                report.frames_lost += 1;
            }
        }
        on_frame(frame);

        let airtime = airtime_end - start;
        start = (start + config.frame_interval_us.max(airtime)).max(sim.now());
    }

    let receiver = sim.mote(receiver)?;
    report.bytes_corrupted = receiver.stats().bytes_corrupted;
    report.events_processed = sim.events_processed();
    report.sim_time = sim.now();
    info!("scenario finished: {report:?}");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeliveryMode, MediumConfig, SimulationPresets};

    fn ideal(variant: RadioVariant, mode: DeliveryMode) -> ScenarioConfig {
        ScenarioConfig {
            radio: RadioConfig::for_variant(variant),
            medium: MediumConfig {
                mode,
                ..Default::default()
            },
            frames: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_packet_for_variants() {
        let payload = [1, 2, 3];
        assert_eq!(
            packet_for(RadioVariant::Ieee802154, 2, &payload).data(),
            &[1, 2, 3]
        );
        assert_eq!(packet_for(RadioVariant::Cc2520, 2, &payload).data(), &[5, 1, 2, 3]);
        assert_eq!(
            packet_for(RadioVariant::Cc1120, 2, &payload).data(),
            &[3, 1, 2, 3, 0xEE, 0xEF]
        );
    }

    #[test]
    fn test_ideal_link_delivers_everything() {
        for variant in [RadioVariant::Ieee802154, RadioVariant::Cc2520, RadioVariant::Cc1120] {
            for mode in [DeliveryMode::Packet, DeliveryMode::Byte] {
                let mut frames = 0;
                let report = run_scenario(&ideal(variant, mode), |_| frames += 1).unwrap();
                assert_eq!(frames, 5);
                assert_eq!(report.frames_intact, 5, "{variant:?} {mode:?}");
                assert_eq!(report.bytes_corrupted, 0);
                assert!(report.sample_corruption.is_none());
            }
        }
    }

    #[test]
    fn test_oversized_payload_is_clamped() {
        let mut config = ideal(RadioVariant::Ieee802154, DeliveryMode::Packet);
        config.payload_len = 500;
        config.frames = 1;
        let report = run_scenario(&config, |_| {}).unwrap();
        assert_eq!(report.frames_intact, 1);
    }

    #[test]
    fn test_good_conditions_are_clean() {
        let report = run_scenario(&SimulationPresets::good_conditions(), |_| {}).unwrap();
        assert_eq!(report.frames_sent, 50);
        assert_eq!(report.frames_intact, 50);
    }

    #[test]
    fn test_extreme_conditions_lose_most_frames() {
        let mut config = SimulationPresets::extreme_conditions();
        config.frames = 20;
        let report = run_scenario(&config, |_| {}).unwrap();
        assert_eq!(
            report.frames_intact + report.frames_corrupted + report.frames_lost,
            20
        );
        assert!(report.delivery_ratio() < 0.5, "{report:?}");
        assert!(report.bytes_corrupted > 0);
    }
}
