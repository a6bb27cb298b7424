/// Simulated time in microseconds.
pub type SimTime = u64;
pub type MoteId = u32;

pub const MICROS_PER_SECOND: SimTime = 1_000_000;

/// Largest PSDU an 802.15.4 PHY carries.
pub const MAX_PSDU_LEN: usize = 127;
