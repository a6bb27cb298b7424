//! Single-timeline simulation driving a set of radio bridges

use log::{debug, info, trace};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use mote_radio::{RadioBridge, RadioConfig, RadioTimer, Timeline};
use mote_radio_core::{MoteId, RadioEvent, RadioPacket, SimTime};

use crate::chip::ScriptedChip;
use crate::medium::{Medium, MediumConfig};
use crate::queue::EventQueue;
use crate::SimError;

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Radio { mote: MoteId, timer: RadioTimer },
    ChipTransmit { mote: MoteId, byte: u8 },
    ModeChange { mote: MoteId, ready: bool },
    CpuWakeup { mote: MoteId },
    ReceptionEnd { mote: MoteId },
}

/// Requests made from outside the simulation loop, applied on its next step.
#[derive(Debug, Clone)]
pub enum SimCommand {
    SetLink { from: MoteId, to: MoteId, signal_dbm: f64 },
    SetHardware { mote: MoteId, on: bool },
    Transmit { mote: MoteId, packet: RadioPacket },
}

/// Clonable, thread-safe way to reach a running simulation.
#[derive(Clone)]
pub struct SimulationHandle {
    commands: UnboundedSender<SimCommand>,
}

impl SimulationHandle {
    pub fn send(&self, command: SimCommand) -> Result<(), SimError> {
        self.commands
            .send(command)
            .map_err(|_| SimError::SimulationClosed)
    }
}

/// One mote's view of the shared event queue.
pub(crate) struct MoteTimeline<'a> {
    queue: &'a mut EventQueue<SimEvent>,
    mote: MoteId,
}

impl<'a> MoteTimeline<'a> {
    pub(crate) fn new(queue: &'a mut EventQueue<SimEvent>, mote: MoteId) -> Self {
        Self { queue, mote }
    }
}

impl Timeline for MoteTimeline<'_> {
    fn now(&self) -> SimTime {
        self.queue.now()
    }

    fn schedule(&mut self, at: SimTime, timer: RadioTimer) {
        self.queue.schedule(
            at,
            SimEvent::Radio {
                mote: self.mote,
                timer,
            },
        );
    }

    fn request_immediate_wakeup(&mut self) {
        let now = self.queue.now();
        self.queue.schedule(now, SimEvent::CpuWakeup { mote: self.mote });
    }
}

pub struct Simulation {
    queue: EventQueue<SimEvent>,
    motes: Vec<RadioBridge<ScriptedChip>>,
    medium: Medium,
    radio_events_tx: UnboundedSender<(MoteId, RadioEvent)>,
    radio_events: UnboundedReceiver<(MoteId, RadioEvent)>,
    commands_tx: UnboundedSender<SimCommand>,
    commands: UnboundedReceiver<SimCommand>,
    events_processed: u64,
}

impl Simulation {
    pub fn new(medium: MediumConfig) -> Self {
        let (radio_events_tx, radio_events) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            queue: EventQueue::new(),
            motes: Vec::new(),
            medium: Medium::new(medium),
            radio_events_tx,
            radio_events,
            commands_tx,
            commands,
            events_processed: 0,
        }
    }

    pub fn add_mote(&mut self, config: &RadioConfig) -> Result<MoteId, SimError> {
        let chip = ScriptedChip::new(config)?;
        let mut bridge = RadioBridge::new(config, chip)?;
        let id = self.motes.len() as MoteId;
        let events = self.radio_events_tx.clone();
        bridge.set_event_sink(Box::new(move |event: RadioEvent| {
            let _ = events.send((id, event));
        }));
        self.motes.push(bridge);
        info!("added mote {id} ({:?})", config.variant);
        Ok(id)
    }

    pub fn handle(&self) -> SimulationHandle {
        SimulationHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.queue.now()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn mote(&self, id: MoteId) -> Result<&RadioBridge<ScriptedChip>, SimError> {
        self.motes
            .get(id as usize)
            .ok_or(SimError::UnknownMote(id))
    }

    pub fn set_link(&mut self, from: MoteId, to: MoteId, signal_dbm: f64) {
        self.medium.set_link(from, to, signal_dbm);
    }

    /// Link two motes in both directions.
    pub fn set_symmetric_link(&mut self, a: MoteId, b: MoteId, signal_dbm: f64) {
        self.medium.set_link(a, b, signal_dbm);
        self.medium.set_link(b, a, signal_dbm);
    }

    pub fn set_hardware(&mut self, mote: MoteId, on: bool) -> Result<(), SimError> {
        self.mote(mote)?;
        let now = self.queue.now();
        self.queue.schedule(now, SimEvent::ModeChange { mote, ready: on });
        Ok(())
    }

    /// Have the mote's chip send `packet` starting at `at`. Returns when the
    /// last byte leaves the chip.
    pub fn transmit(
        &mut self,
        mote: MoteId,
        packet: &RadioPacket,
        at: SimTime,
    ) -> Result<SimTime, SimError> {
        let air = self.mote(mote)?.encode(packet);
        self.transmit_raw(mote, &air, at)
    }

    /// Have the mote's chip send raw on-air bytes, framing included.
    pub fn transmit_raw(
        &mut self,
        mote: MoteId,
        bytes: &[u8],
        at: SimTime,
    ) -> Result<SimTime, SimError> {
        let delay = self.mote(mote)?.inter_byte_delay();
        let start = at.max(self.queue.now());
        for (i, &byte) in bytes.iter().enumerate() {
            self.queue
                .schedule(start + i as SimTime * delay, SimEvent::ChipTransmit { mote, byte });
        }
        Ok(start + bytes.len() as SimTime * delay)
    }

    /// Run one event. Returns false once nothing is left to do.
    pub fn step(&mut self) -> bool {
        self.drain_commands();
        let Some((at, event)) = self.queue.pop() else {
            return false;
        };
        trace!("{at}: {event:?}");
        self.dispatch(event);
        self.route_radio_events();
        self.events_processed += 1;
        true
    }

    pub fn run_until(&mut self, until: SimTime) {
        loop {
            self.drain_commands();
            match self.queue.peek_time() {
                Some(at) if at <= until => {
                    self.step();
                }
                _ => break,
            }
        }
        self.queue.advance_to(until);
    }

    pub fn run(&mut self) {
        while self.step() {}
        debug!(
            "simulation idle at {} after {} events",
            self.queue.now(),
            self.events_processed
        );
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!("applying {command:?}");
            let result = match command {
                SimCommand::SetLink {
                    from,
                    to,
                    signal_dbm,
                } => {
                    self.set_link(from, to, signal_dbm);
                    Ok(())
                }
                SimCommand::SetHardware { mote, on } => self.set_hardware(mote, on),
                SimCommand::Transmit { mote, packet } => {
                    let now = self.queue.now();
                    self.transmit(mote, &packet, now).map(|_| ())
                }
            };
            if let Err(e) = result {
                log::error!("dropping command: {e}");
            }
        }
    }

    fn dispatch(&mut self, event: SimEvent) {
        let background = self.medium.config().background_dbm;
        let mote = match &event {
            SimEvent::Radio { mote, .. }
            | SimEvent::ChipTransmit { mote, .. }
            | SimEvent::ModeChange { mote, .. }
            | SimEvent::CpuWakeup { mote }
            | SimEvent::ReceptionEnd { mote } => *mote,
        };
        let Some(bridge) = self.motes.get_mut(mote as usize) else {
            log::error!("event for unknown mote {mote}");
            return;
        };
        let mut timeline = MoteTimeline::new(&mut self.queue, mote);

        match event {
            SimEvent::Radio { timer, .. } => bridge.on_timer(timer, &mut timeline),
            SimEvent::ChipTransmit { byte, .. } => bridge.on_byte_transmitted(byte),
            SimEvent::ModeChange { ready, .. } => bridge.on_hardware_mode_changed(ready),
            SimEvent::CpuWakeup { .. } => bridge.chip_mut().wake_up(),
            SimEvent::ReceptionEnd { .. } => {
                if !self.medium.reception_ended(mote) {
                    return;
                }
                bridge.signal_reception_end();
                bridge.chip_mut().end_of_reception();
                bridge.set_signal_strength(background, &mut timeline);
            }
        }
    }

    fn route_radio_events(&mut self) {
        while let Ok((source, event)) = self.radio_events.try_recv() {
            self.medium
                .on_radio_event(source, event, &mut self.motes, &mut self.queue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::DeliveryMode;
    use mote_radio::{ChannelConfig, RadioVariant};

    fn two_motes(config: &RadioConfig, mode: DeliveryMode) -> Simulation {
        let mut sim = Simulation::new(MediumConfig {
            mode,
            ..Default::default()
        });
        let a = sim.add_mote(config).unwrap();
        let b = sim.add_mote(config).unwrap();
        sim.set_symmetric_link(a, b, -70.0);
        sim.set_hardware(a, true).unwrap();
        sim.set_hardware(b, true).unwrap();
        sim
    }

    fn packet_for(variant: RadioVariant) -> RadioPacket {
        match variant {
            RadioVariant::Ieee802154 => RadioPacket::from_slice(&[0x41, 0x88, 0x07, 0x10, 0x20]),
            RadioVariant::Cc2520 => RadioPacket::from_slice(&[5, 0x10, 0x20, 0x30]),
            RadioVariant::Cc1120 => RadioPacket::from_slice(&[2, 0x10, 0x20, 0xEE, 0xEF]),
        }
    }

    #[test]
    fn test_packet_crosses_the_medium() {
        for variant in [RadioVariant::Ieee802154, RadioVariant::Cc2520, RadioVariant::Cc1120] {
            let config = RadioConfig::for_variant(variant);
            let mut sim = two_motes(&config, DeliveryMode::Packet);
            let packet = packet_for(variant);

            sim.transmit(0, &packet, 100).unwrap();
            sim.run();

            let sender = sim.mote(0).unwrap();
            let receiver = sim.mote(1).unwrap();
            assert_eq!(sender.last_packet_transmitted(), Some(packet.clone()), "{variant:?}");
            assert_eq!(receiver.last_packet_received(), Some(packet.clone()), "{variant:?}");
            assert_eq!(receiver.chip().received_packets(), &[packet], "{variant:?}");
            assert_eq!(
                receiver.chip().wakeups(),
                receiver.chip().received_bytes().len() as u64
            );
            assert_eq!(receiver.state(), mote_radio::RadioState::Idle);
        }
    }

    #[test]
    fn test_byte_level_bridging() {
        let config = RadioConfig::default();
        let mut sim = two_motes(&config, DeliveryMode::Byte);
        let packet = packet_for(RadioVariant::Ieee802154);

        sim.transmit(0, &packet, 0).unwrap();
        sim.run();

        let receiver = sim.mote(1).unwrap();
        assert_eq!(receiver.chip().received_packets(), &[packet]);
        assert!(receiver.last_packet_received().is_none());
        assert_eq!(sim.medium().stats().deliveries, 0);
    }

    #[test]
    fn test_overlapping_transmissions_collide() {
        let config = RadioConfig::default();
        let mut sim = Simulation::new(MediumConfig::default());
        for _ in 0..3 {
            sim.add_mote(&config).unwrap();
        }
        sim.set_link(0, 2, -70.0);
        sim.set_link(1, 2, -70.0);
        for mote in 0..3 {
            sim.set_hardware(mote, true).unwrap();
        }
        let packet = packet_for(RadioVariant::Ieee802154);

        sim.transmit(0, &packet, 0).unwrap();
        sim.transmit(1, &packet, 64).unwrap();
        sim.run();

        let receiver = sim.mote(2).unwrap();
        assert_eq!(sim.medium().stats().collisions, 1);
        assert!(receiver.chip().received_packets().is_empty());
        assert!(receiver.chip().received_bytes().iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_long_frame_after_short_collision_stays_garbled() {
        let config = RadioConfig::default();
        let mut sim = Simulation::new(MediumConfig::default());
        for _ in 0..3 {
            sim.add_mote(&config).unwrap();
        }
        sim.set_link(0, 2, -70.0);
        sim.set_link(1, 2, -70.0);
        for mote in 0..3 {
            sim.set_hardware(mote, true).unwrap();
        }

        sim.transmit(0, &RadioPacket::from_slice(&[0x11]), 0).unwrap();
        let long = RadioPacket::from_slice(&[0x22; 50]);
        let done = sim.transmit(1, &long, 64).unwrap();

        // The short frame has fully ended at the receiver; the long one has not.
        sim.run_until(done);
        assert!(sim.mote(2).unwrap().is_interfered());

        sim.run();
        let receiver = sim.mote(2).unwrap();
        assert_eq!(sim.medium().stats().collisions, 1);
        assert!(receiver.chip().received_packets().is_empty());
        assert!(receiver.last_packet_received().is_none());
        assert_eq!(receiver.state(), mote_radio::RadioState::Idle);
        assert_eq!(receiver.chip().rssi(), Some(-100));
    }

    #[test]
    fn test_receiver_rssi_follows_link() {
        let config = RadioConfig::default();
        let mut sim = two_motes(&config, DeliveryMode::Packet);
        let packet = packet_for(RadioVariant::Ieee802154);

        let done = sim.transmit(0, &packet, 0).unwrap();
        sim.run_until(done);
        assert_eq!(sim.mote(1).unwrap().chip().rssi(), Some(-70));

        sim.run();
        let receiver = sim.mote(1).unwrap();
        assert_eq!(receiver.chip().rssi(), Some(-100));
        assert_eq!(receiver.signal_strength_average(), -100.0);
    }

    #[test]
    fn test_radio_off_mid_transmission_delivers_truncated_packet() {
        let config = RadioConfig::default();
        let mut sim = two_motes(&config, DeliveryMode::Packet);

        sim.transmit_raw(0, &[0, 0, 0], 0).unwrap();
        sim.run_until(100);
        sim.set_hardware(0, false).unwrap();
        sim.run();

        assert_eq!(
            sim.mote(0).unwrap().last_packet_transmitted(),
            Some(RadioPacket::empty())
        );
        assert!(!sim.mote(0).unwrap().is_radio_on());
        assert_eq!(
            sim.mote(1).unwrap().chip().received_packets(),
            &[RadioPacket::empty()]
        );
    }

    #[test]
    fn test_bit_errors_at_the_noise_floor() {
        let config = RadioConfig::default().with_channel(ChannelConfig::BitError {
            noise_floor: -100.0,
            seed: Some(5),
        });
        let mut sim = Simulation::new(MediumConfig::default());
        let a = sim.add_mote(&config).unwrap();
        let b = sim.add_mote(&config).unwrap();
        sim.set_link(a, b, -100.5);
        sim.set_hardware(a, true).unwrap();
        sim.set_hardware(b, true).unwrap();

        sim.transmit(a, &packet_for(RadioVariant::Ieee802154), 0).unwrap();
        sim.run();

        let receiver = sim.mote(b).unwrap();
        assert!(receiver.chip().received_packets().is_empty());
        assert!(receiver.stats().bytes_corrupted > 0);
    }

    #[test]
    fn test_commands_from_another_thread() {
        let config = RadioConfig::default();
        let mut sim = two_motes(&config, DeliveryMode::Packet);
        let handle = sim.handle();
        let packet = packet_for(RadioVariant::Ieee802154);

        let sent = packet.clone();
        std::thread::spawn(move || {
            handle
                .send(SimCommand::Transmit {
                    mote: 0,
                    packet: sent,
                })
                .unwrap();
        })
        .join()
        .unwrap();
        sim.run();

        assert_eq!(sim.mote(1).unwrap().chip().received_packets(), &[packet]);
    }

    #[test]
    fn test_unknown_mote() {
        let mut sim = Simulation::new(MediumConfig::default());
        assert!(matches!(sim.set_hardware(3, true), Err(SimError::UnknownMote(3))));
    }
}
