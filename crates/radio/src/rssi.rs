//! Rolling average of the signal strength the medium reports

use log::trace;

use mote_radio_core::SimTime;

pub const SIGNAL_HISTORY_LEN: usize = 8;

/// The last few signal strength samples, oldest first.
#[derive(Debug, Clone)]
pub struct SignalHistory {
    samples: [f64; SIGNAL_HISTORY_LEN],
}

impl SignalHistory {
    pub fn filled(value: f64) -> Self {
        Self {
            samples: [value; SIGNAL_HISTORY_LEN],
        }
    }

    /// Drop the oldest sample and append `value`.
    pub fn shift_in(&mut self, value: f64) {
        self.samples.rotate_left(1);
        self.samples[SIGNAL_HISTORY_LEN - 1] = value;
    }

    pub fn average(&self) -> f64 {
        self.samples.iter().sum::<f64>() / SIGNAL_HISTORY_LEN as f64
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Outcome of one smoothing step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterTick {
    pub average: f64,
    /// Delay until the next step, if the window is still running.
    pub reschedule_in: Option<SimTime>,
}

/// Smooths signal strength updates over a fixed window without scheduling
/// one event per update.
///
/// The filter only ever runs one chain of ticks. Each new value restarts the
/// countdown, so the window always finishes against the latest value.
#[derive(Debug)]
pub struct SignalStrengthFilter {
    current: f64,
    history: SignalHistory,
    remaining_ticks: u8,
    average: f64,
    tick_period: SimTime,
}

impl SignalStrengthFilter {
    pub fn new(initial: f64, inter_byte_delay: SimTime) -> Self {
        Self {
            current: initial,
            history: SignalHistory::filled(initial),
            remaining_ticks: 0,
            average: initial,
            tick_period: (inter_byte_delay / 2).max(1),
        }
    }

    /// Record a new value. Returns true when a tick chain must be started now.
    pub fn set(&mut self, value: f64) -> bool {
        if value == self.current {
            return false;
        }
        self.current = value;
        let start_chain = self.remaining_ticks == 0;
        self.remaining_ticks = SIGNAL_HISTORY_LEN as u8;
        start_chain
    }

    /// Advance the window by one sample.
    pub fn tick(&mut self) -> FilterTick {
        self.history.shift_in(self.current);
        self.average = self.history.average();
        self.remaining_ticks = self.remaining_ticks.saturating_sub(1);
        trace!(
            "signal average {:.2} ({} ticks left)",
            self.average,
            self.remaining_ticks
        );
        FilterTick {
            average: self.average,
            reschedule_in: (self.remaining_ticks > 0).then_some(self.tick_period),
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn is_running(&self) -> bool {
        self.remaining_ticks > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_chain(filter: &mut SignalStrengthFilter) -> Vec<FilterTick> {
        let mut ticks = vec![filter.tick()];
        while ticks.last().unwrap().reschedule_in.is_some() {
            ticks.push(filter.tick());
        }
        ticks
    }

    #[test]
    fn test_unchanged_value_is_ignored() {
        let mut filter = SignalStrengthFilter::new(-100.0, 32);
        assert!(!filter.set(-100.0));
        assert!(!filter.is_running());
    }

    #[test]
    fn test_constant_value_converges() {
        let mut filter = SignalStrengthFilter::new(-100.0, 32);
        assert!(filter.set(-60.0));

        let ticks = run_chain(&mut filter);

        assert_eq!(ticks.len(), SIGNAL_HISTORY_LEN);
        assert_eq!(ticks.last().unwrap().average, -60.0);
        assert!(ticks.iter().all(|t| t.reschedule_in.map_or(true, |d| d == 16)));
        assert!(!filter.is_running());
    }

    #[test]
    fn test_update_during_chain_restarts_countdown() {
        let mut filter = SignalStrengthFilter::new(-100.0, 32);
        assert!(filter.set(-80.0));
        for _ in 0..5 {
            filter.tick();
        }
        assert!(!filter.set(-70.0));

        let ticks = run_chain(&mut filter);

        assert_eq!(ticks.len(), SIGNAL_HISTORY_LEN);
        assert_eq!(filter.average(), -70.0);
    }

    #[test]
    fn test_ramp_lags_behind() {
        let mut filter = SignalStrengthFilter::new(-90.0, 32);
        let mut published = Vec::new();
        for step in 1..=8 {
            filter.set(-90.0 + step as f64);
            published.push(filter.tick().average);
        }

        let last = *published.last().unwrap();
        assert!(last < -82.0);
        assert!(last > -90.0);
        assert!(published.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_history_shifts_oldest_out() {
        let mut history = SignalHistory::filled(0.0);
        history.shift_in(8.0);
        assert_eq!(history.samples()[7], 8.0);
        assert_eq!(history.average(), 1.0);
    }
}
