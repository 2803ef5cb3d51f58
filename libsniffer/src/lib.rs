//! Packet sniffer pipeline: frames read by a [`CaptureController`] are
//! decoded, appended to a [`PacketStore`] and published to observers. The
//! store can then be queried with a [`FilterSpec`], and single packets
//! rendered with the [`detail`] functions.

mod controller;
mod decoder;
pub mod detail;
pub mod filter;
mod layers;
mod observer;
mod output;
mod record;
mod store;

#[cfg(test)]
mod test_util;

pub use controller::*;
pub use decoder::*;
pub use detail::{describe, hex_dump, structured_text, summary_text, PacketDetail};
pub use filter::{FilterSpec, ProtocolFilter};
pub use layers::*;
pub use observer::*;
pub use output::*;
pub use record::*;
pub use store::PacketStore;
