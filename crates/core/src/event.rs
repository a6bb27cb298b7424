use bytes::Bytes;

/// The most recent thing that happened to a radio.
///
/// Only the latest value is retained; an observer that misses a notification
/// cannot recover intermediate events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RadioEvent {
    #[default]
    Unknown,
    HwOff,
    HwOn,
    ReceptionStarted,
    ReceptionInterfered,
    ReceptionFinished,
    TransmissionStarted,
    TransmissionFinished,
    PacketTransmitted,
    CustomDataTransmitted,
}

/// Payload of the byte-level bridge between motes of the same abstraction level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomData {
    Byte(u8),
    /// Anything else a foreign radio type may publish; never understood here.
    Opaque(Bytes),
}

impl CustomData {
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            CustomData::Byte(b) => Some(*b),
            CustomData::Opaque(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_data_byte() {
        assert_eq!(CustomData::Byte(0x7a).as_byte(), Some(0x7a));
        assert_eq!(CustomData::Opaque(Bytes::from_static(b"hi")).as_byte(), None);
    }

    #[test]
    fn test_default_event_is_unknown() {
        assert_eq!(RadioEvent::default(), RadioEvent::Unknown);
    }
}
