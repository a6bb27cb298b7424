//! The radio bridge: one emulated chip on one side, the radio medium on the other

use log::{debug, error, info, warn};

use mote_radio_core::{CustomData, RadioEvent, RadioPacket, SimTime};

use crate::channel::{channel_for, ChannelModel};
use crate::framing::{strategy_for, FrameAssembler, FrameProgress};
use crate::rssi::SignalStrengthFilter;
use crate::scheduler::{ByteDeliveryScheduler, RadioTimer, Timeline};
use crate::state::{RadioEventSink, RadioState, RadioStateMachine};
use crate::{RadioConfig, RadioError, RadioVariant};

/// What the bridge needs from the emulated transceiver.
pub trait ChipPort {
    fn variant(&self) -> RadioVariant;

    /// Hand one received byte to the chip's receive path.
    fn push_received_byte(&mut self, byte: u8);

    /// Update the chip's signal strength reading (dBm).
    fn set_rssi(&mut self, rssi: i32);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RadioStats {
    pub packets_transmitted: u64,
    /// Transmissions cut short by the radio turning off.
    pub transmissions_aborted: u64,
    /// Transmissions that ended without a packet (bad framing or overflow).
    pub transmissions_abandoned: u64,
    pub packets_received: u64,
    pub bytes_delivered: u64,
    pub bytes_corrupted: u64,
}

pub struct RadioBridge<C: ChipPort> {
    chip: C,
    assembler: FrameAssembler,
    delivery: ByteDeliveryScheduler,
    signal: SignalStrengthFilter,
    channel: Box<dyn ChannelModel>,
    state: RadioStateMachine,
    last_packet_transmitted: Option<RadioPacket>,
    last_packet_received: Option<RadioPacket>,
    last_custom_data_transmitted: Option<CustomData>,
    last_custom_data_received: Option<CustomData>,
    radio_channel: Option<i32>,
    stats: RadioStats,
}

impl<C: ChipPort> RadioBridge<C> {
    pub fn new(config: &RadioConfig, chip: C) -> Result<Self, RadioError> {
        if chip.variant() != config.variant {
            return Err(RadioError::MissingChip {
                expected: config.variant,
            });
        }
        let inter_byte_delay = config.inter_byte_delay()?;
        let assembler = FrameAssembler::new(
            strategy_for(config.variant, config.cc2520_footer_len),
            config.frame_capacity,
        )?;
        let channel = channel_for(&config.channel)?;

        info!(
            "{:?} radio bridge: {} bps ({} us per byte), {:?} channel",
            config.variant, config.bitrate_bps, inter_byte_delay, config.channel
        );

        Ok(Self {
            chip,
            assembler,
            delivery: ByteDeliveryScheduler::new(inter_byte_delay),
            signal: SignalStrengthFilter::new(config.initial_signal_strength, inter_byte_delay),
            channel,
            state: RadioStateMachine::new(),
            last_packet_transmitted: None,
            last_packet_received: None,
            last_custom_data_transmitted: None,
            last_custom_data_received: None,
            radio_channel: None,
            stats: RadioStats::default(),
        })
    }

    pub fn set_event_sink(&mut self, sink: Box<dyn RadioEventSink>) {
        self.state.set_sink(sink);
    }

    // ---- chip side ----

    /// The chip put one byte on the air.
    pub fn on_byte_transmitted(&mut self, byte: u8) {
        if !self.assembler.is_open() {
            self.assembler.begin();
            self.state.start_transmission();
        }

        self.last_custom_data_transmitted = Some(CustomData::Byte(byte));
        self.state.notify(RadioEvent::CustomDataTransmitted);

        match self.assembler.push(byte) {
            FrameProgress::Pending => {}
            FrameProgress::Complete(packet) => {
                self.stats.packets_transmitted += 1;
                self.last_packet_transmitted = Some(packet);
                self.state.notify(RadioEvent::PacketTransmitted);
                self.state.finish_transmission();
                debug!("radio stats: {:?}", self.stats);
            }
            FrameProgress::Overflowed => {
                warn!("transmission overflowed the frame buffer, no packet sent");
                self.stats.transmissions_abandoned += 1;
                self.state.finish_transmission();
            }
        }
    }

    /// The chip switched between a listening mode and off.
    pub fn on_hardware_mode_changed(&mut self, ready_to_receive: bool) {
        if ready_to_receive {
            if self.assembler.is_open() {
                self.assembler.abandon();
                self.stats.transmissions_abandoned += 1;
                self.state.finish_transmission();
            }
            self.state.hardware_on();
            return;
        }

        if self.assembler.is_open() {
            warn!(
                "radio turned off after {} of {:?} frame bytes",
                self.assembler.frame().length(),
                self.frame_expected_length()
            );
            let packet = self.assembler.abort();
            self.stats.transmissions_aborted += 1;
            self.last_packet_transmitted = Some(packet);
            self.state.notify(RadioEvent::PacketTransmitted);
            self.state.finish_transmission();
        }
        self.state.hardware_off();
    }

    pub fn on_channel_changed(&mut self, channel: i32) {
        debug!("radio channel changed to {channel}");
        self.radio_channel = Some(channel);
        self.state.reset_last_event();
    }

    // ---- medium side ----

    pub fn signal_reception_start(&mut self) {
        self.state.start_reception();
    }

    pub fn signal_reception_end(&mut self) {
        self.state.finish_reception();
    }

    pub fn interfere_reception(&mut self) {
        self.last_packet_received = None;
        self.state.interfere();
    }

    /// Deliver `packet` byte by byte starting now.
    pub fn receive_packet(&mut self, packet: RadioPacket, timeline: &mut dyn Timeline) {
        let now = timeline.now();
        self.receive_packet_at(packet, now, timeline);
    }

    /// Deliver `packet` byte by byte starting at `start` (or now, if later).
    pub fn receive_packet_at(
        &mut self,
        packet: RadioPacket,
        start: SimTime,
        timeline: &mut dyn Timeline,
    ) {
        let air = self.assembler.encode(&packet);
        let interfered = self.state.is_interfered();
        let last = self.delivery.schedule_bytes(&air, start, interfered, timeline);
        if interfered {
            debug!("delivering {} garbled bytes until {}", air.len(), last);
            return;
        }
        debug!(
            "delivering {} byte packet as {} bytes until {}",
            packet.len(),
            air.len(),
            last
        );
        self.stats.packets_received += 1;
        self.last_packet_received = Some(packet);
    }

    /// Deliver one byte published by a byte-level peer.
    pub fn receive_custom_data(&mut self, data: CustomData, timeline: &mut dyn Timeline) {
        let Some(byte) = data.as_byte() else {
            error!("cannot deliver non-byte custom data {data:?}");
            return;
        };
        let interfered = self.state.is_interfered();
        self.delivery.schedule_byte(byte, interfered, timeline);
        self.last_custom_data_received = Some(data);
    }

    pub fn set_signal_strength(&mut self, value: f64, timeline: &mut dyn Timeline) {
        if self.signal.set(value) {
            let now = timeline.now();
            timeline.schedule(now, RadioTimer::SignalUpdate);
        }
    }

    /// Run a timer this bridge scheduled earlier.
    pub fn on_timer(&mut self, timer: RadioTimer, timeline: &mut dyn Timeline) {
        match timer {
            RadioTimer::DeliverByte { byte, interfered } => {
                let out = if interfered {
                    byte
                } else {
                    self.channel.transceive(byte, self.signal.average())
                };
                if out != byte {
                    self.stats.bytes_corrupted += 1;
                }
                self.stats.bytes_delivered += 1;
                self.chip.push_received_byte(out);
                timeline.request_immediate_wakeup();
            }
            RadioTimer::SignalUpdate => {
                let tick = self.signal.tick();
                self.chip.set_rssi(tick.average as i32);
                if let Some(delay) = tick.reschedule_in {
                    let at = timeline.now() + delay;
                    timeline.schedule(at, RadioTimer::SignalUpdate);
                }
            }
        }
    }

    // ---- observers ----

    pub fn last_packet_transmitted(&self) -> Option<RadioPacket> {
        self.last_packet_transmitted.clone()
    }

    pub fn last_packet_received(&self) -> Option<RadioPacket> {
        self.last_packet_received.clone()
    }

    pub fn last_custom_data_transmitted(&self) -> Option<CustomData> {
        self.last_custom_data_transmitted.clone()
    }

    pub fn last_custom_data_received(&self) -> Option<CustomData> {
        self.last_custom_data_received.clone()
    }

    /// Announced length of the frame being transmitted, once known.
    pub fn frame_expected_length(&self) -> Option<usize> {
        if self.assembler.is_open() {
            self.assembler.frame().expected_length()
        } else {
            None
        }
    }

    pub fn last_event(&self) -> RadioEvent {
        self.state.last_event()
    }

    pub fn state(&self) -> RadioState {
        self.state.state()
    }

    pub fn is_transmitting(&self) -> bool {
        self.state.is_transmitting()
    }

    pub fn is_receiving(&self) -> bool {
        self.state.is_receiving()
    }

    pub fn is_interfered(&self) -> bool {
        self.state.is_interfered()
    }

    pub fn is_radio_on(&self) -> bool {
        self.state.is_radio_on()
    }

    pub fn current_signal_strength(&self) -> f64 {
        self.signal.current()
    }

    /// The smoothed value last published to the chip.
    pub fn signal_strength_average(&self) -> f64 {
        self.signal.average()
    }

    pub fn channel(&self) -> Option<i32> {
        self.radio_channel
    }

    pub fn variant(&self) -> RadioVariant {
        self.assembler.variant()
    }

    pub fn inter_byte_delay(&self) -> SimTime {
        self.delivery.inter_byte_delay()
    }

    /// Re-encode a packet the way this radio would put it on the air.
    pub fn encode(&self, packet: &RadioPacket) -> Vec<u8> {
        self.assembler.encode(packet)
    }

    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut C {
        &mut self.chip
    }
}
