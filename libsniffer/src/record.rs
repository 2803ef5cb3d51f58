use std::net::Ipv4Addr;

use libsniffer_tools::Duration;
use serde::Serialize;

use crate::decoder::DecodedFields;
use crate::layers::{Protocol, TcpFlags};

/// A successfully decoded frame, waiting for a sequence id
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub fields: DecodedFields,
    pub captured_at: Duration,
    pub elapsed_seconds: f64,
    pub link_header_len: usize,
    pub original_len: u32,
    /// Frame bytes after the link-layer header
    pub raw_frame: Vec<u8>,
}

/// One captured packet, as kept by the `PacketStore`
///
/// Records are immutable once appended; the store hands them out as `Arc`s.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketRecord {
    /// Position in arrival order, starting at 1
    pub sequence_id: u64,
    pub captured_at: Duration,
    /// Seconds since the start of the capture session
    pub elapsed_seconds: f64,
    pub source_addr: Ipv4Addr,
    pub source_text: String,
    pub dest_addr: Ipv4Addr,
    pub dest_text: String,
    pub ttl: u8,
    pub tos: u8,
    pub protocol: Protocol,
    /// 0 if not applicable
    pub source_port: u16,
    /// 0 if not applicable
    pub dest_port: u16,
    pub tcp_flags: Option<TcpFlags>,
    /// IPv4 identification field
    pub ip_ident: u16,
    pub link_header_len: usize,
    pub original_len: u32,
    raw_frame: Vec<u8>,
}

impl PacketRecord {
    pub(crate) fn new(sequence_id: u64, frame: DecodedFrame) -> PacketRecord {
        let network = &frame.fields.network;
        PacketRecord {
            sequence_id,
            captured_at: frame.captured_at,
            elapsed_seconds: frame.elapsed_seconds,
            source_addr: network.source,
            source_text: network.source.to_string(),
            dest_addr: network.destination,
            dest_text: network.destination.to_string(),
            ttl: network.ttl,
            tos: network.tos,
            protocol: network.protocol,
            source_port: frame.fields.source_port(),
            dest_port: frame.fields.dest_port(),
            tcp_flags: frame.fields.tcp_flags(),
            ip_ident: network.ident,
            link_header_len: frame.link_header_len,
            original_len: frame.original_len,
            raw_frame: frame.raw_frame,
        }
    }

    /// Captured bytes, starting at the IPv4 header
    #[inline]
    pub fn raw_frame(&self) -> &[u8] {
        &self.raw_frame
    }

    pub fn summary(&self) -> PacketSummary {
        PacketSummary {
            sequence_id: self.sequence_id,
            elapsed_seconds: self.elapsed_seconds,
            source: self.source_text.clone(),
            destination: self.dest_text.clone(),
            protocol: self.protocol,
        }
    }
}

/// Short description of a packet, published to observers after each append
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketSummary {
    pub sequence_id: u64,
    pub elapsed_seconds: f64,
    pub source: String,
    pub destination: String,
    pub protocol: Protocol,
}
