//! Physical-layer channel models applied to received bytes.
//!
//! The bit-error model treats the link as an AWGN channel carrying a 4-ary,
//! 2-bit-per-symbol constellation. A signal strength is turned into a chip
//! error probability through a precomputed table; each 4-bit symbol of a byte
//! is then spread over its 32-chip codeword, chips are flipped at random, and
//! the result is decoded back to the nearest codeword.

use std::sync::LazyLock;

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{ChannelConfig, RadioError};

/// Distance between the noise floor and a signal that is never corrupted, in dB.
pub const GOOD_SIGNAL_MARGIN: f64 = 15.0;
const TABLE_STEPS_PER_DB: f64 = 10.0;
pub const BIT_ERROR_TABLE_LEN: usize = (GOOD_SIGNAL_MARGIN * TABLE_STEPS_PER_DB) as usize + 1;

/// Bits per second carried per hertz of bandwidth.
const SPECTRAL_EFFICIENCY: f64 = 2.0;

/// Chip sequences of the sixteen 4-bit symbols; only the low 31 chips are used.
pub const SYMBOL_CODEBOOK: [u32; 16] = [
    0xD9C3_522E, 0xED9C_3522, 0x2ED9_C352, 0x22ED_9C35,
    0x522E_D9C3, 0x3522_ED9C, 0xC352_2ED9, 0x9C35_22ED,
    0x8C96_077B, 0xB8C9_6077, 0x7B8C_9607, 0x77B8_C960,
    0x077B_8C96, 0x6077_B8C9, 0x9607_7B8C, 0xC960_77B8,
];

const CHIP_MASK: u32 = 0x7FFF_FFFF;
const CHIPS_PER_SYMBOL: u32 = 31;

/// Candidate order for nearest-codeword decoding. Among equally distant
/// codewords the one visited first wins.
pub const DECODE_ORDER: [u8; 16] = [7, 6, 5, 4, 3, 2, 1, 0, 15, 14, 13, 12, 11, 10, 9, 8];

/// Byte a fully garbled reception decodes to.
pub const GARBLED_BYTE: u8 = 0xFF;

/// Bit error probability in 0.1 dB steps above the noise floor.
pub static BIT_ERROR_RATE_TABLE: LazyLock<[f64; BIT_ERROR_TABLE_LEN]> =
    LazyLock::new(build_bit_error_table);

fn build_bit_error_table() -> [f64; BIT_ERROR_TABLE_LEN] {
    let mut table = [0.0; BIT_ERROR_TABLE_LEN];
    for (step, rate) in table.iter_mut().enumerate() {
        // A reading of S+N above the floor leaves S/N = 10^(dB/10) - 1.
        let margin_db = step as f64 / TABLE_STEPS_PER_DB;
        let snr = 10f64.powf(margin_db / 10.0) - 1.0;
        let eb_n0 = snr / SPECTRAL_EFFICIENCY;
        *rate = 0.5 * erfc(eb_n0.sqrt());
    }
    table[0] = 0.5;
    table[BIT_ERROR_TABLE_LEN - 1] = 0.0;
    table
}

/// Complementary error function (Abramowitz & Stegun 7.1.26).
fn erfc(x: f64) -> f64 {
    if x < 0.0 {
        return 2.0 - erfc(-x);
    }
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    poly * (-x * x).exp()
}

/// What happens to a byte between the air and the receiving chip.
pub trait ChannelModel: Send {
    /// Pass `byte` through the channel at the given signal strength (dBm).
    fn transceive(&mut self, byte: u8, signal_strength: f64) -> u8;
}

/// Delivers every byte untouched.
#[derive(Debug, Default)]
pub struct IdealChannel;

impl ChannelModel for IdealChannel {
    fn transceive(&mut self, byte: u8, _signal_strength: f64) -> u8 {
        byte
    }
}

pub struct BitErrorChannel {
    noise_floor: f64,
    rng: StdRng,
}

impl BitErrorChannel {
    pub fn new(noise_floor: f64, seed: u64) -> Result<Self, RadioError> {
        if !noise_floor.is_finite() {
            return Err(RadioError::InvalidNoiseFloor(noise_floor));
        }
        Ok(Self {
            noise_floor,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise_floor
    }

    pub fn good_signal(&self) -> f64 {
        self.noise_floor + GOOD_SIGNAL_MARGIN
    }

    pub fn bit_error_rate(&self, signal: f64) -> f64 {
        if signal <= self.noise_floor {
            return 0.5;
        }
        if signal >= self.good_signal() {
            return 0.0;
        }
        let step = ((signal - self.noise_floor) * TABLE_STEPS_PER_DB).round() as usize;
        BIT_ERROR_RATE_TABLE[step.min(BIT_ERROR_TABLE_LEN - 1)]
    }

    pub fn corrupt_byte(&mut self, byte: u8, bit_error_rate: f64) -> u8 {
        if bit_error_rate <= 0.0 {
            return byte;
        }
        if bit_error_rate >= 0.5 {
            return GARBLED_BYTE;
        }
        let high = self.transceive_symbol(byte >> 4, bit_error_rate);
        let low = self.transceive_symbol(byte & 0x0F, bit_error_rate);
        (high << 4) | low
    }

    /// Spread `symbol` over its codeword, flip chips independently with
    /// probability `bit_error_rate` and decode the result.
    pub fn transceive_symbol(&mut self, symbol: u8, bit_error_rate: f64) -> u8 {
        let mut chips = SYMBOL_CODEBOOK[(symbol & 0x0F) as usize];
        for chip in 0..CHIPS_PER_SYMBOL {
            if self.rng.random::<f64>() < bit_error_rate {
                chips ^= 1 << chip;
            }
        }
        decode_chips(chips)
    }
}

impl ChannelModel for BitErrorChannel {
    fn transceive(&mut self, byte: u8, signal_strength: f64) -> u8 {
        let rate = self.bit_error_rate(signal_strength);
        let out = self.corrupt_byte(byte, rate);
        if out != byte {
            trace!("byte {byte:#04x} corrupted to {out:#04x} at {signal_strength:.1} dBm (ber {rate:.2e})");
        }
        out
    }
}

/// Nearest codeword by Hamming distance over the 31 meaningful chips.
pub fn decode_chips(chips: u32) -> u8 {
    let mut best_symbol = DECODE_ORDER[0];
    let mut best_distance = u32::MAX;
    for &candidate in DECODE_ORDER.iter() {
        let distance = ((chips ^ SYMBOL_CODEBOOK[candidate as usize]) & CHIP_MASK).count_ones();
        if distance < best_distance {
            best_distance = distance;
            best_symbol = candidate;
            if distance == 0 {
                break;
            }
        }
    }
    best_symbol
}

pub fn channel_for(config: &ChannelConfig) -> Result<Box<dyn ChannelModel>, RadioError> {
    match config {
        ChannelConfig::Ideal => Ok(Box::new(IdealChannel)),
        ChannelConfig::BitError { noise_floor, seed } => {
            let seed = seed.unwrap_or_else(rand::random::<u64>);
            Ok(Box::new(BitErrorChannel::new(*noise_floor, seed)?))
        }
    }
}
