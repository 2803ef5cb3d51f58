//! Building blocks shared by the packet sniffer crates: configuration,
//! timestamps, the error taxonomy, capture session context, and the
//! capture source abstraction with its pcap file implementation.

mod config;
mod context;
mod duration;
mod error;
mod file_source;
mod packet;
mod source;

pub use config::Config;
pub use context::*;
pub use duration::{Duration, MICROS_PER_SEC};
pub use error::*;
pub use file_source::*;
pub use packet::RawFrame;
pub use source::*;

pub use pcap_parser;
pub use pcap_parser::Linktype;
