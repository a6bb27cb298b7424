//! Frame reassembly from the chip's transmit byte stream, and the inverse
//! re-encoding of packets into the byte stream a receiving chip expects.

use log::{debug, error, warn};

use mote_radio_core::RadioPacket;

use crate::{RadioError, RadioVariant};

/// Synchronisation header (preamble + SFD) of an 802.15.4 O-QPSK frame.
pub const IEEE802154_SYNC: [u8; 5] = [0, 0, 0, 0, 0x7A];
const IEEE802154_HEADER_LEN: usize = IEEE802154_SYNC.len() + 1;
const IEEE802154_RESERVED_LENGTH_BIT: u8 = 0x80;

const CC2520_PREAMBLE_LEN: usize = 4;
const CC2520_SYNC: u8 = 0x7A;

const CC1120_PREAMBLE: u8 = 0xAA;
const CC1120_PREAMBLE_LEN: usize = 4;
const CC1120_SYNC_FILL: u8 = 0xDF;
const CC1120_SYNC_LEN: usize = 4;
/// Last synch word byte; the chip starts counting the frame after it.
pub const CC1120_SYNC: u8 = 0xDE;
const CC1120_LENGTH_HEADER: usize = 1;
const CC1120_FOOTER_LEN: usize = 2;

/// Fixed-capacity byte store, cleared rather than reallocated between frames.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Box<[u8]>,
    stored: usize,
}

impl FrameBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            stored: 0,
        }
    }

    /// Returns false when the buffer is full and the byte was dropped.
    pub fn push(&mut self, byte: u8) -> bool {
        match self.data.get_mut(self.stored) {
            Some(slot) => {
                *slot = byte;
                self.stored += 1;
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.stored]
    }

    pub fn len(&self) -> usize {
        self.stored
    }

    pub fn is_empty(&self) -> bool {
        self.stored == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.stored = 0;
    }
}

/// Assembly state of the frame currently being transmitted.
#[derive(Debug)]
pub struct TransmissionFrame {
    buffer: FrameBuffer,
    /// Framed bytes seen so far, including any the buffer had to drop.
    length: usize,
    expected_length: Option<usize>,
    synchronized: bool,
    /// Whether the sync marker that gates length counting has been seen.
    gate_open: bool,
    overflowed: bool,
}

impl TransmissionFrame {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: FrameBuffer::with_capacity(capacity),
            length: 0,
            expected_length: None,
            synchronized: true,
            gate_open: false,
            overflowed: false,
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.length = 0;
        self.expected_length = None;
        self.synchronized = true;
        self.gate_open = false;
        self.overflowed = false;
    }

    /// Count `byte` into the frame and return its 1-based position.
    fn append(&mut self, byte: u8) -> usize {
        self.length += 1;
        if !self.buffer.push(byte) && !self.overflowed {
            self.overflowed = true;
            warn!(
                "frame exceeds buffer capacity of {} bytes, dropping the excess",
                self.buffer.capacity()
            );
        }
        self.length
    }

    fn desynchronize(&mut self, position: usize, byte: u8) {
        if self.synchronized {
            self.synchronized = false;
            error!("bad sync sequence at byte {position}: {byte:#04x}, frame will not complete");
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn expected_length(&self) -> Option<usize> {
        self.expected_length
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn has_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn reached_expected_length(&self) -> bool {
        self.expected_length == Some(self.length)
    }
}

/// Variant-specific framing rules.
pub trait FramingStrategy: Send {
    fn variant(&self) -> RadioVariant;

    /// Bytes of a frame that are not derived from its length field.
    fn overhead(&self) -> usize;

    /// Account for one transmitted byte of an open frame.
    fn accept(&self, frame: &mut TransmissionFrame, byte: u8);

    /// Convert the assembled bytes (complete or truncated) into the published packet.
    fn to_packet(&self, frame: &[u8]) -> RadioPacket;

    /// Re-encode a packet into the on-air bytes the receiving chip expects.
    fn to_air(&self, packet: &RadioPacket) -> Vec<u8>;
}

fn slice_from(frame: &[u8], start: usize) -> &[u8] {
    &frame[start.min(frame.len())..]
}

fn length_byte(variant: RadioVariant, len: usize) -> u8 {
    u8::try_from(len).unwrap_or_else(|_| {
        warn!("{variant:?} packet of {len} bytes does not fit a length field");
        u8::MAX
    })
}

/// Generic 802.15.4 framing: sync header, 7-bit PHY length, PSDU.
pub struct Ieee802154Framing;

impl FramingStrategy for Ieee802154Framing {
    fn variant(&self) -> RadioVariant {
        RadioVariant::Ieee802154
    }

    fn overhead(&self) -> usize {
        IEEE802154_HEADER_LEN
    }

    fn accept(&self, frame: &mut TransmissionFrame, byte: u8) {
        let position = frame.append(byte);
        if position <= IEEE802154_SYNC.len() {
            if byte != IEEE802154_SYNC[position - 1] {
                frame.desynchronize(position, byte);
            }
        } else if position == IEEE802154_HEADER_LEN {
            if byte & IEEE802154_RESERVED_LENGTH_BIT != 0 {
                error!("length field {byte:#04x} has the reserved bit set, frame will not complete");
            } else {
                frame.expected_length = Some(byte as usize + IEEE802154_HEADER_LEN);
            }
        }
    }

    fn to_packet(&self, frame: &[u8]) -> RadioPacket {
        RadioPacket::from_slice(slice_from(frame, IEEE802154_HEADER_LEN))
    }

    fn to_air(&self, packet: &RadioPacket) -> Vec<u8> {
        let mut air = Vec::with_capacity(IEEE802154_HEADER_LEN + packet.len());
        air.extend_from_slice(&IEEE802154_SYNC);
        air.push(length_byte(self.variant(), packet.len()));
        air.extend_from_slice(packet.data());
        air
    }
}

/// CC2520 framing: preamble and SFD, then a length byte counting payload and
/// footer. The published packet keeps the length byte and drops the footer.
pub struct Cc2520Framing {
    footer_len: usize,
}

impl Cc2520Framing {
    pub fn new(footer_len: usize) -> Self {
        Self { footer_len }
    }
}

impl FramingStrategy for Cc2520Framing {
    fn variant(&self) -> RadioVariant {
        RadioVariant::Cc2520
    }

    fn overhead(&self) -> usize {
        CC2520_PREAMBLE_LEN + 2 + self.footer_len
    }

    fn accept(&self, frame: &mut TransmissionFrame, byte: u8) {
        let position = frame.append(byte);
        if position == CC2520_PREAMBLE_LEN + 2 {
            frame.expected_length = Some(byte as usize + CC2520_PREAMBLE_LEN + 2);
        }
    }

    fn to_packet(&self, frame: &[u8]) -> RadioPacket {
        let start = (CC2520_PREAMBLE_LEN + 1).min(frame.len());
        let end = frame.len().saturating_sub(self.footer_len).max(start);
        RadioPacket::from_slice(&frame[start..end])
    }

    fn to_air(&self, packet: &RadioPacket) -> Vec<u8> {
        let mut air = Vec::with_capacity(CC2520_PREAMBLE_LEN + 1 + packet.len() + self.footer_len);
        air.extend_from_slice(&[0; CC2520_PREAMBLE_LEN]);
        air.push(CC2520_SYNC);
        air.extend_from_slice(packet.data());
        air.resize(air.len() + self.footer_len, 0);
        air
    }
}

/// CC1120 framing: the last synch word byte opens the frame, the first byte
/// after it is the payload length.
pub struct Cc1120Framing;

impl FramingStrategy for Cc1120Framing {
    fn variant(&self) -> RadioVariant {
        RadioVariant::Cc1120
    }

    fn overhead(&self) -> usize {
        CC1120_LENGTH_HEADER + CC1120_FOOTER_LEN
    }

    fn accept(&self, frame: &mut TransmissionFrame, byte: u8) {
        if !frame.gate_open {
            frame.gate_open = byte == CC1120_SYNC;
            return;
        }
        if frame.append(byte) == 1 {
            frame.expected_length = Some(byte as usize + CC1120_LENGTH_HEADER + CC1120_FOOTER_LEN);
        }
    }

    fn to_packet(&self, frame: &[u8]) -> RadioPacket {
        RadioPacket::from_slice(frame)
    }

    fn to_air(&self, packet: &RadioPacket) -> Vec<u8> {
        let mut air = Vec::with_capacity(CC1120_PREAMBLE_LEN + CC1120_SYNC_LEN + packet.len());
        air.extend_from_slice(&[CC1120_PREAMBLE; CC1120_PREAMBLE_LEN]);
        air.extend_from_slice(&[CC1120_SYNC_FILL; CC1120_SYNC_LEN - 1]);
        air.push(CC1120_SYNC);
        air.extend_from_slice(packet.data());
        air
    }
}

pub fn strategy_for(variant: RadioVariant, cc2520_footer_len: usize) -> Box<dyn FramingStrategy> {
    match variant {
        RadioVariant::Ieee802154 => Box::new(Ieee802154Framing),
        RadioVariant::Cc2520 => Box::new(Cc2520Framing::new(cc2520_footer_len)),
        RadioVariant::Cc1120 => Box::new(Cc1120Framing),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameProgress {
    Pending,
    Complete(RadioPacket),
    /// The frame reached its announced length but bytes were dropped on the way.
    Overflowed,
}

/// Turns the chip's byte-at-a-time transmit callback into whole packets.
pub struct FrameAssembler {
    strategy: Box<dyn FramingStrategy>,
    frame: TransmissionFrame,
    open: bool,
}

impl FrameAssembler {
    pub fn new(strategy: Box<dyn FramingStrategy>, capacity: usize) -> Result<Self, RadioError> {
        let required = strategy.overhead() + 1;
        if capacity < required {
            return Err(RadioError::FrameCapacityTooSmall { capacity, required });
        }
        Ok(Self {
            strategy,
            frame: TransmissionFrame::with_capacity(capacity),
            open: false,
        })
    }

    pub fn variant(&self) -> RadioVariant {
        self.strategy.variant()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn frame(&self) -> &TransmissionFrame {
        &self.frame
    }

    /// Start a fresh frame.
    pub fn begin(&mut self) {
        self.frame.reset();
        self.open = true;
    }

    pub fn push(&mut self, byte: u8) -> FrameProgress {
        if !self.open {
            self.begin();
        }
        self.strategy.accept(&mut self.frame, byte);

        if !self.frame.reached_expected_length() || !self.frame.is_synchronized() {
            return FrameProgress::Pending;
        }
        let progress = if self.frame.has_overflowed() {
            FrameProgress::Overflowed
        } else {
            FrameProgress::Complete(self.strategy.to_packet(self.frame.bytes()))
        };
        debug!(
            "{:?} frame ended after {} bytes: {:?}",
            self.variant(),
            self.frame.length(),
            progress
        );
        self.close();
        progress
    }

    /// Close the open frame and return whatever was assembled so far.
    pub fn abort(&mut self) -> RadioPacket {
        let packet = self.strategy.to_packet(self.frame.bytes());
        self.close();
        packet
    }

    /// Close the open frame without producing a packet.
    pub fn abandon(&mut self) {
        if self.open {
            debug!(
                "abandoning {:?} frame after {} of {:?} bytes",
                self.variant(),
                self.frame.length(),
                self.frame.expected_length()
            );
        }
        self.close();
    }

    pub fn encode(&self, packet: &RadioPacket) -> Vec<u8> {
        self.strategy.to_air(packet)
    }

    fn close(&mut self) {
        self.frame.reset();
        self.open = false;
    }
}
