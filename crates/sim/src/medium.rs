//! Fixed-link radio medium: decides who hears a transmission and how loudly

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use mote_radio::{ChipPort, RadioBridge, Timeline};
use mote_radio_core::{MoteId, RadioEvent, SimTime};

use crate::queue::EventQueue;
use crate::simulation::{MoteTimeline, SimEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Forward completed packets (motes at different abstraction levels).
    Packet,
    /// Forward every transmitted byte as it is sent.
    Byte,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumConfig {
    pub mode: DeliveryMode,
    /// Signal strength a receiver reads while nothing is on the air.
    pub background_dbm: f64,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Packet,
            background_dbm: -100.0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediumStats {
    pub transmissions: u64,
    pub deliveries: u64,
    pub collisions: u64,
}

struct Reception {
    receiver: MoteId,
    ends_at: SimTime,
}

pub struct Medium {
    config: MediumConfig,
    links: BTreeMap<(MoteId, MoteId), f64>,
    active: HashMap<MoteId, Vec<Reception>>,
    /// Receptions still on the air at each receiver.
    in_flight: HashMap<MoteId, usize>,
    stats: MediumStats,
}

impl Medium {
    pub fn new(config: MediumConfig) -> Self {
        Self {
            config,
            links: BTreeMap::new(),
            active: HashMap::new(),
            in_flight: HashMap::new(),
            stats: MediumStats::default(),
        }
    }

    pub fn config(&self) -> &MediumConfig {
        &self.config
    }

    pub fn stats(&self) -> MediumStats {
        self.stats
    }

    /// Let `to` hear `from` at `signal_dbm`.
    pub fn set_link(&mut self, from: MoteId, to: MoteId, signal_dbm: f64) {
        self.links.insert((from, to), signal_dbm);
    }

    /// One reception at `receiver` is over. Returns true when it was the last
    /// one, so the receiver can go back to listening.
    pub(crate) fn reception_ended(&mut self, receiver: MoteId) -> bool {
        match self.in_flight.get_mut(&receiver) {
            Some(count) if *count > 1 => {
                *count -= 1;
                trace!("mote {receiver} still hears {count} transmissions");
                false
            }
            Some(_) => {
                self.in_flight.remove(&receiver);
                true
            }
            None => true,
        }
    }

    pub(crate) fn on_radio_event<C: ChipPort>(
        &mut self,
        source: MoteId,
        event: RadioEvent,
        motes: &mut [RadioBridge<C>],
        queue: &mut EventQueue<SimEvent>,
    ) {
        match event {
            RadioEvent::TransmissionStarted => self.start_transmission(source, motes, queue),
            RadioEvent::PacketTransmitted if self.config.mode == DeliveryMode::Packet => {
                self.forward_packet(source, motes, queue)
            }
            RadioEvent::CustomDataTransmitted if self.config.mode == DeliveryMode::Byte => {
                self.forward_byte(source, motes, queue)
            }
            RadioEvent::TransmissionFinished => self.finish_transmission(source, queue),
            _ => {}
        }
    }

    fn start_transmission<C: ChipPort>(
        &mut self,
        source: MoteId,
        motes: &mut [RadioBridge<C>],
        queue: &mut EventQueue<SimEvent>,
    ) {
        self.stats.transmissions += 1;
        let now = queue.now();
        let links: Vec<(MoteId, f64)> = self
            .links
            .range((source, MoteId::MIN)..=(source, MoteId::MAX))
            .map(|(&(_, to), &signal)| (to, signal))
            .collect();

        let mut receptions = Vec::new();
        for (receiver, signal) in links {
            let Some(bridge) = motes.get_mut(receiver as usize) else {
                continue;
            };
            if !bridge.is_radio_on() || bridge.is_transmitting() {
                trace!("mote {receiver} cannot hear mote {source}");
                continue;
            }
            if bridge.is_receiving() || bridge.is_interfered() {
                debug!("mote {source} collides at mote {receiver}");
                self.stats.collisions += 1;
                bridge.interfere_reception();
            } else {
                bridge.signal_reception_start();
            }
            let mut timeline = MoteTimeline::new(queue, receiver);
            bridge.set_signal_strength(signal, &mut timeline);
            *self.in_flight.entry(receiver).or_default() += 1;
            receptions.push(Reception {
                receiver,
                ends_at: now,
            });
        }
        self.active.insert(source, receptions);
    }

    fn forward_packet<C: ChipPort>(
        &mut self,
        source: MoteId,
        motes: &mut [RadioBridge<C>],
        queue: &mut EventQueue<SimEvent>,
    ) {
        let Some(packet) = motes
            .get(source as usize)
            .and_then(|bridge| bridge.last_packet_transmitted())
        else {
            return;
        };
        let Some(receptions) = self.active.get_mut(&source) else {
            return;
        };
        for reception in receptions.iter_mut() {
            let Some(bridge) = motes.get_mut(reception.receiver as usize) else {
                continue;
            };
            let air_len = bridge.encode(&packet).len() as SimTime;
            let mut timeline = MoteTimeline::new(queue, reception.receiver);
            let start = timeline.now();
            bridge.receive_packet(packet.clone(), &mut timeline);
            reception.ends_at = start + air_len * bridge.inter_byte_delay();
            self.stats.deliveries += 1;
        }
    }

    fn forward_byte<C: ChipPort>(
        &mut self,
        source: MoteId,
        motes: &mut [RadioBridge<C>],
        queue: &mut EventQueue<SimEvent>,
    ) {
        let Some(data) = motes
            .get(source as usize)
            .and_then(|bridge| bridge.last_custom_data_transmitted())
        else {
            return;
        };
        let Some(receptions) = self.active.get_mut(&source) else {
            return;
        };
        for reception in receptions.iter_mut() {
            if let Some(bridge) = motes.get_mut(reception.receiver as usize) {
                let mut timeline = MoteTimeline::new(queue, reception.receiver);
                let now = timeline.now();
                bridge.receive_custom_data(data.clone(), &mut timeline);
                reception.ends_at = now + bridge.inter_byte_delay();
            }
        }
    }

    fn finish_transmission(&mut self, source: MoteId, queue: &mut EventQueue<SimEvent>) {
        let Some(receptions) = self.active.remove(&source) else {
            return;
        };
        for reception in receptions {
            queue.schedule(
                reception.ends_at,
                SimEvent::ReceptionEnd {
                    mote: reception.receiver,
                },
            );
        }
    }
}
