//! Radio state tracking and event notification

use log::{debug, trace};

use mote_radio_core::RadioEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioState {
    HwOff,
    Idle,
    Transmitting,
    Receiving,
    Interfered,
}

/// Receives every event a radio raises, as it is raised.
pub trait RadioEventSink: Send {
    fn on_radio_event(&mut self, event: RadioEvent);
}

impl<F> RadioEventSink for F
where
    F: FnMut(RadioEvent) + Send,
{
    fn on_radio_event(&mut self, event: RadioEvent) {
        self(event)
    }
}

/// One radio's state plus the most recent event it raised.
pub struct RadioStateMachine {
    state: RadioState,
    last_event: RadioEvent,
    sink: Option<Box<dyn RadioEventSink>>,
}

impl RadioStateMachine {
    pub fn new() -> Self {
        Self {
            state: RadioState::Idle,
            last_event: RadioEvent::Unknown,
            sink: None,
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn RadioEventSink>) {
        self.sink = Some(sink);
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn last_event(&self) -> RadioEvent {
        self.last_event
    }

    pub fn is_transmitting(&self) -> bool {
        self.state == RadioState::Transmitting
    }

    pub fn is_receiving(&self) -> bool {
        self.state == RadioState::Receiving
    }

    pub fn is_interfered(&self) -> bool {
        self.state == RadioState::Interfered
    }

    pub fn is_radio_on(&self) -> bool {
        self.state != RadioState::HwOff
    }

    pub fn start_transmission(&mut self) {
        self.transition(RadioState::Transmitting, RadioEvent::TransmissionStarted);
    }

    pub fn finish_transmission(&mut self) {
        self.transition(RadioState::Idle, RadioEvent::TransmissionFinished);
    }

    /// Only an idle radio starts receiving; otherwise the event is still raised.
    pub fn start_reception(&mut self) {
        let next = match self.state {
            RadioState::Idle => RadioState::Receiving,
            other => other,
        };
        self.transition(next, RadioEvent::ReceptionStarted);
    }

    pub fn finish_reception(&mut self) {
        let next = match self.state {
            RadioState::Receiving | RadioState::Interfered => RadioState::Idle,
            other => other,
        };
        self.transition(next, RadioEvent::ReceptionFinished);
    }

    /// Only a listening radio is interfered; a transmitting or switched-off
    /// radio keeps its state and the event is still raised.
    pub fn interfere(&mut self) {
        let next = match self.state {
            RadioState::Idle | RadioState::Receiving | RadioState::Interfered => {
                RadioState::Interfered
            }
            other => other,
        };
        self.transition(next, RadioEvent::ReceptionInterfered);
    }

    pub fn hardware_off(&mut self) {
        self.transition(RadioState::HwOff, RadioEvent::HwOff);
    }

    pub fn hardware_on(&mut self) {
        let next = if self.state == RadioState::HwOff {
            RadioState::Idle
        } else {
            self.state
        };
        self.transition(next, RadioEvent::HwOn);
    }

    /// Raise an event that does not change state.
    pub fn notify(&mut self, event: RadioEvent) {
        self.last_event = event;
        trace!("radio event {:?} in {:?}", event, self.state);
        if let Some(sink) = self.sink.as_mut() {
            sink.on_radio_event(event);
        }
    }

    /// Forget the last event without telling anyone.
    pub fn reset_last_event(&mut self) {
        self.last_event = RadioEvent::Unknown;
    }

    fn transition(&mut self, next: RadioState, event: RadioEvent) {
        if next != self.state {
            debug!("radio {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        self.notify(event);
    }
}

impl Default for RadioStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
