//! Shared data types for the mote radio bridge

pub mod event;
pub mod packet;
pub mod types;

pub use event::{CustomData, RadioEvent};
pub use packet::RadioPacket;
pub use types::{MoteId, SimTime};
