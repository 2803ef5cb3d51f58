//! On-demand rendering of a stored packet for inspection

use libsniffer_tools::{DecodeError, Layer};
use serde::Serialize;

use crate::decoder::{decode_partial, TransportFields};
use crate::layers::Protocol;
use crate::record::PacketRecord;
use crate::store::PacketStore;

const HEX_BYTES_PER_LINE: usize = 16;

/// The three renderings of a packet shown in a detail view
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketDetail {
    pub sequence_id: u64,
    pub summary: String,
    pub hex_dump: String,
    pub structured: String,
}

/// Uppercase hex bytes separated by spaces, 16 bytes per line
pub fn hex_dump(raw_frame: &[u8]) -> String {
    raw_frame
        .chunks(HEX_BYTES_PER_LINE)
        .map(|line| {
            line.iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn too_small(layer: Layer) -> String {
    format!("Error: packet too small to contain the {layer} header.\n")
}

/// Decode `raw_frame` (starting at the IPv4 header) again and describe its headers
pub fn structured_text(raw_frame: &[u8]) -> String {
    let partial = match decode_partial(raw_frame, 0) {
        Ok(partial) => partial,
        Err(DecodeError::Truncated { layer, .. }) => return too_small(layer),
        Err(DecodeError::InvalidHeaderLength(len)) => {
            return format!("Error: invalid IP header length ({len} bytes).\n")
        }
        Err(DecodeError::UnsupportedVersion(v)) => {
            return format!("Error: not an IPv4 packet (IP version {v}).\n")
        }
    };

    let ip = &partial.network;
    let network = format!(
        "IPv4 header:\n \
         - Version: {}\n \
         - Header length: {} bytes\n \
         - Total length: {}\n \
         - Protocol: {}\n\n",
        ip.version,
        ip.header_len,
        ip.total_len,
        ip.protocol.number()
    );

    let transport = match (ip.protocol, partial.transport) {
        (_, Err(DecodeError::Truncated { layer, .. })) => too_small(layer),
        (_, Err(e)) => format!("Error: {e}\n"),
        (
            _,
            Ok(TransportFields::Tcp {
                source_port,
                dest_port,
                sequence,
                flags,
            }),
        ) => format!(
            "TCP header:\n \
             - Source port: {source_port}\n \
             - Destination port: {dest_port}\n \
             - Sequence number: {sequence}\n \
             - Flags: {}\n",
            flags.names().join(" ")
        ),
        (
            _,
            Ok(TransportFields::Udp {
                source_port,
                dest_port,
                length,
            }),
        ) => format!(
            "UDP header:\n \
             - Source port: {source_port}\n \
             - Destination port: {dest_port}\n \
             - Length: {length}\n"
        ),
        (Protocol::Icmp, Ok(TransportFields::None)) => {
            "ICMP header:\n - ICMP decoding not implemented.\n".to_owned()
        }
        (proto, Ok(TransportFields::None)) => {
            format!("Protocol {} not supported for analysis.\n", proto.number())
        }
    };
    network + &transport
}

fn port_text(port: u16) -> String {
    if port == 0 {
        "-".to_owned()
    } else {
        port.to_string()
    }
}

/// Labelled fields of a record, as shown above the hex dump
pub fn summary_text(record: &PacketRecord) -> String {
    let flags = record.tcp_flags.map_or_else(|| "-".to_owned(), |f| f.compact());
    format!(
        "ID: {}\n\
         Time: {:.5}\n\
         Source: {}\n\
         Destination: {}\n\
         Protocol: {}\n\
         TTL: {}\n\
         TOS: 0x{:02X}\n\
         Source port: {}\n\
         Destination port: {}\n\
         Flags: {}\n\
         IP identification: {}\n",
        record.sequence_id,
        record.elapsed_seconds,
        record.source_text,
        record.dest_text,
        record.protocol,
        record.ttl,
        record.tos,
        port_text(record.source_port),
        port_text(record.dest_port),
        flags,
        record.ip_ident
    )
}

/// Render the packet with the given sequence id, if it exists
pub fn describe(store: &PacketStore, sequence_id: u64) -> Option<PacketDetail> {
    let record = store.get(sequence_id)?;
    Some(PacketDetail {
        sequence_id,
        summary: summary_text(&record),
        hex_dump: hex_dump(record.raw_frame()),
        structured: structured_text(record.raw_frame()),
    })
}
