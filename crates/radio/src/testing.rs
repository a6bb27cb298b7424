//! Test doubles for the scheduler and chip seams

use mote_radio_core::SimTime;

use crate::bridge::ChipPort;
use crate::scheduler::{RadioTimer, Timeline};
use crate::RadioVariant;

pub(crate) struct RecordingTimeline {
    pub now: SimTime,
    pub scheduled: Vec<(SimTime, RadioTimer)>,
    pub wakeups: usize,
}

impl RecordingTimeline {
    pub fn at(now: SimTime) -> Self {
        Self {
            now,
            scheduled: Vec::new(),
            wakeups: 0,
        }
    }

    /// Pop the earliest timer (FIFO among equal times) and advance the clock to it.
    pub fn next(&mut self) -> Option<RadioTimer> {
        let index = self
            .scheduled
            .iter()
            .enumerate()
            .min_by_key(|(i, (at, _))| (*at, *i))
            .map(|(i, _)| i)?;
        let (at, timer) = self.scheduled.remove(index);
        self.now = self.now.max(at);
        Some(timer)
    }
}

impl Timeline for RecordingTimeline {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule(&mut self, at: SimTime, timer: RadioTimer) {
        self.scheduled.push((at, timer));
    }

    fn request_immediate_wakeup(&mut self) {
        self.wakeups += 1;
    }
}

pub(crate) struct RecordingChip {
    pub variant: RadioVariant,
    pub received: Vec<u8>,
    pub rssi: Vec<i32>,
}

impl RecordingChip {
    pub fn new(variant: RadioVariant) -> Self {
        Self {
            variant,
            received: Vec::new(),
            rssi: Vec::new(),
        }
    }
}

impl ChipPort for RecordingChip {
    fn variant(&self) -> RadioVariant {
        self.variant
    }

    fn push_received_byte(&mut self, byte: u8) {
        self.received.push(byte);
    }

    fn set_rssi(&mut self, rssi: i32) {
        self.rssi.push(rssi);
    }
}
