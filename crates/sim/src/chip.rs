//! A scripted stand-in for an emulated transceiver

use log::trace;

use mote_radio::framing::{strategy_for, FrameAssembler, FrameProgress};
use mote_radio::{ChipPort, RadioConfig, RadioError, RadioVariant};
use mote_radio_core::RadioPacket;

/// Records everything the bridge hands it and reassembles received frames the
/// way the chip's receive FIFO would.
pub struct ScriptedChip {
    variant: RadioVariant,
    rx_fifo: FrameAssembler,
    received_bytes: Vec<u8>,
    received_packets: Vec<RadioPacket>,
    rssi: Option<i32>,
    wakeups: u64,
}

impl ScriptedChip {
    pub fn new(config: &RadioConfig) -> Result<Self, RadioError> {
        Ok(Self {
            variant: config.variant,
            rx_fifo: FrameAssembler::new(
                strategy_for(config.variant, config.cc2520_footer_len),
                config.frame_capacity,
            )?,
            received_bytes: Vec::new(),
            received_packets: Vec::new(),
            rssi: None,
            wakeups: 0,
        })
    }

    /// Drop a partially received frame once the carrier is gone.
    pub fn end_of_reception(&mut self) {
        self.rx_fifo.abandon();
    }

    pub fn wake_up(&mut self) {
        self.wakeups += 1;
    }

    pub fn received_bytes(&self) -> &[u8] {
        &self.received_bytes
    }

    pub fn received_packets(&self) -> &[RadioPacket] {
        &self.received_packets
    }

    pub fn rssi(&self) -> Option<i32> {
        self.rssi
    }

    pub fn wakeups(&self) -> u64 {
        self.wakeups
    }
}

impl ChipPort for ScriptedChip {
    fn variant(&self) -> RadioVariant {
        self.variant
    }

    fn push_received_byte(&mut self, byte: u8) {
        self.received_bytes.push(byte);
        if let FrameProgress::Complete(packet) = self.rx_fifo.push(byte) {
            trace!("chip received {:?}", packet);
            self.received_packets.push(packet);
        }
    }

    fn set_rssi(&mut self, rssi: i32) {
        self.rssi = Some(rssi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassembles_received_frames() {
        let mut chip = ScriptedChip::new(&RadioConfig::default()).unwrap();
        for byte in [0, 0, 0, 0, 0x7A, 1, 0x99] {
            chip.push_received_byte(byte);
        }
        assert_eq!(chip.received_packets(), &[RadioPacket::from_slice(&[0x99])]);
        assert_eq!(chip.received_bytes().len(), 7);
    }

    #[test]
    fn test_end_of_reception_drops_partial_frame() {
        let mut chip = ScriptedChip::new(&RadioConfig::default()).unwrap();
        for byte in [0xFF, 0xFF, 0xFF] {
            chip.push_received_byte(byte);
        }
        chip.end_of_reception();
        for byte in [0, 0, 0, 0, 0x7A, 0] {
            chip.push_received_byte(byte);
        }
        assert_eq!(chip.received_packets(), &[RadioPacket::empty()]);
    }
}
