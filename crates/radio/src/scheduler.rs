//! Per-byte delivery scheduling on the simulation timeline

use log::trace;

use mote_radio_core::SimTime;

/// Byte value a receiver sees while its reception is interfered.
pub const INTERFERED_BYTE: u8 = 0xFF;

/// The external discrete-event scheduler, seen from one radio.
///
/// Everything the radio does in the future goes through here; nothing sleeps.
pub trait Timeline {
    fn now(&self) -> SimTime;

    /// Queue `timer` to fire at the absolute time `at`. Timers scheduled for
    /// the same instant must fire in the order they were scheduled.
    fn schedule(&mut self, at: SimTime, timer: RadioTimer);

    /// Ask for the emulated CPU to run at the next possible instant.
    fn request_immediate_wakeup(&mut self);
}

/// A radio's own timed work, handed back to `RadioBridge::on_timer` when due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioTimer {
    DeliverByte { byte: u8, interfered: bool },
    SignalUpdate,
}

/// Spaces inbound bytes at the radio's nominal byte rate.
pub struct ByteDeliveryScheduler {
    inter_byte_delay: SimTime,
}

impl ByteDeliveryScheduler {
    pub fn new(inter_byte_delay: SimTime) -> Self {
        Self { inter_byte_delay }
    }

    pub fn inter_byte_delay(&self) -> SimTime {
        self.inter_byte_delay
    }

    /// Schedule `bytes` at `start + i * delay`, never earlier than now.
    /// Returns the time the last byte is due.
    pub fn schedule_bytes(
        &mut self,
        bytes: &[u8],
        start: SimTime,
        interfered: bool,
        timeline: &mut dyn Timeline,
    ) -> SimTime {
        let start = start.max(timeline.now());
        let mut at = start;
        for (i, &byte) in bytes.iter().enumerate() {
            at = start + i as SimTime * self.inter_byte_delay;
            self.push(byte, at, interfered, timeline);
        }
        trace!(
            "scheduled {} bytes from {} to {} (interfered: {})",
            bytes.len(),
            start,
            at,
            interfered
        );
        at
    }

    /// Schedule one byte for immediate delivery.
    pub fn schedule_byte(&mut self, byte: u8, interfered: bool, timeline: &mut dyn Timeline) {
        let now = timeline.now();
        self.push(byte, now, interfered, timeline);
    }

    fn push(&mut self, byte: u8, at: SimTime, interfered: bool, timeline: &mut dyn Timeline) {
        let byte = if interfered { INTERFERED_BYTE } else { byte };
        timeline.schedule(at, RadioTimer::DeliverByte { byte, interfered });
    }
}
