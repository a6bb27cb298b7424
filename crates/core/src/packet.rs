use std::fmt;

use bytes::Bytes;

/// One over-the-air frame, as published by a transmitter or handed to a receiver.
///
/// The contents never change after construction; clones share the same buffer,
/// so observers can hold on to a packet without copying it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RadioPacket {
    data: Bytes,
}

impl RadioPacket {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn empty() -> Self {
        Self { data: Bytes::new() }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl AsRef<[u8]> for RadioPacket {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for RadioPacket {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for RadioPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RadioPacket[{}](", self.data.len())?;
        for (i, b) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}
