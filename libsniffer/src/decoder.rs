//! IPv4 / TCP / UDP header decoding
//!
//! Every header is read through a `pnet_packet` view built over a sub-slice
//! whose length has been checked first. A frame that does not hold the bytes
//! a layer requires is reported as a `DecodeError`, never read past its end.

use std::net::Ipv4Addr;

use libsniffer_tools::{DecodeError, Layer};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;
use tracing::trace;

use crate::layers::{Protocol, TcpFlags};

pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const TCP_MIN_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

/// Fields read from the IPv4 header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkFields {
    pub version: u8,
    /// Header length in bytes (IHL * 4)
    pub header_len: usize,
    pub total_len: u16,
    pub ident: u16,
    pub ttl: u8,
    pub tos: u8,
    pub protocol: Protocol,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// Fields read from the transport header, when the protocol has one we decode
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFields {
    Tcp {
        source_port: u16,
        dest_port: u16,
        sequence: u32,
        flags: TcpFlags,
    },
    Udp {
        source_port: u16,
        dest_port: u16,
        length: u16,
    },
    /// ICMP or any other protocol: no ports
    None,
}

impl TransportFields {
    pub fn ports(&self) -> (u16, u16) {
        match *self {
            TransportFields::Tcp {
                source_port,
                dest_port,
                ..
            }
            | TransportFields::Udp {
                source_port,
                dest_port,
                ..
            } => (source_port, dest_port),
            TransportFields::None => (0, 0),
        }
    }

    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match *self {
            TransportFields::Tcp { flags, .. } => Some(flags),
            _ => None,
        }
    }
}

/// Result of a successful decode
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedFields {
    pub network: NetworkFields,
    pub transport: TransportFields,
}

impl DecodedFields {
    #[inline]
    pub fn source_port(&self) -> u16 {
        self.transport.ports().0
    }

    #[inline]
    pub fn dest_port(&self) -> u16 {
        self.transport.ports().1
    }

    #[inline]
    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        self.transport.tcp_flags()
    }
}

/// Network layer decoded, transport layer possibly not
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialDecode {
    pub network: NetworkFields,
    pub transport: Result<TransportFields, DecodeError>,
}

/// Decode a frame whose IPv4 header starts at `link_header_len`
///
/// Fails if any layer is incomplete. This is the form used by the capture
/// loop: a frame that fails here is dropped.
pub fn decode(frame: &[u8], link_header_len: usize) -> Result<DecodedFields, DecodeError> {
    let partial = decode_partial(frame, link_header_len)?;
    Ok(DecodedFields {
        network: partial.network,
        transport: partial.transport?,
    })
}

/// Decode the IPv4 header, then try the transport header
///
/// Network layer errors are returned directly; a transport layer error is
/// kept next to the network fields that were read successfully.
pub fn decode_partial(frame: &[u8], link_header_len: usize) -> Result<PartialDecode, DecodeError> {
    let data = frame.get(link_header_len..).unwrap_or(&[]);
    if data.len() < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::Truncated {
            layer: Layer::Network,
            needed: IPV4_MIN_HEADER_LEN,
            available: data.len(),
        });
    }
    let ipv4 = Ipv4Packet::new(data).ok_or(DecodeError::Truncated {
        layer: Layer::Network,
        needed: IPV4_MIN_HEADER_LEN,
        available: data.len(),
    })?;

    let version = ipv4.get_version();
    if version != 4 {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let header_len = usize::from(ipv4.get_header_length()) * 4;
    if header_len < IPV4_MIN_HEADER_LEN || header_len > data.len() {
        return Err(DecodeError::InvalidHeaderLength(header_len));
    }

    let protocol = Protocol::from_number(ipv4.get_next_level_protocol().0);
    let network = NetworkFields {
        version,
        header_len,
        total_len: ipv4.get_total_length(),
        ident: ipv4.get_identification(),
        ttl: ipv4.get_ttl(),
        tos: (ipv4.get_dscp() << 2) | ipv4.get_ecn(),
        protocol,
        source: ipv4.get_source(),
        destination: ipv4.get_destination(),
    };
    trace!(
        "IPv4 {} -> {} proto {} hlen {}",
        network.source,
        network.destination,
        protocol,
        header_len
    );

    let l4_data = data.get(header_len..).unwrap_or(&[]);
    let transport = decode_transport(protocol, l4_data);
    Ok(PartialDecode { network, transport })
}

fn decode_transport(protocol: Protocol, data: &[u8]) -> Result<TransportFields, DecodeError> {
    match protocol {
        Protocol::Tcp => {
            let truncated = DecodeError::Truncated {
                layer: Layer::Tcp,
                needed: TCP_MIN_HEADER_LEN,
                available: data.len(),
            };
            if data.len() < TCP_MIN_HEADER_LEN {
                return Err(truncated);
            }
            let tcp = TcpPacket::new(data).ok_or(truncated)?;
            // only the 8 low bits are control flags
            let flags = TcpFlags::from_bits((u16::from(tcp.get_flags()) & 0xff) as u8);
            Ok(TransportFields::Tcp {
                source_port: tcp.get_source(),
                dest_port: tcp.get_destination(),
                sequence: tcp.get_sequence(),
                flags,
            })
        }
        Protocol::Udp => {
            let truncated = DecodeError::Truncated {
                layer: Layer::Udp,
                needed: UDP_HEADER_LEN,
                available: data.len(),
            };
            if data.len() < UDP_HEADER_LEN {
                return Err(truncated);
            }
            let udp = UdpPacket::new(data).ok_or(truncated)?;
            Ok(TransportFields::Udp {
                source_port: udp.get_source(),
                dest_port: udp.get_destination(),
                length: udp.get_length(),
            })
        }
        Protocol::Icmp | Protocol::Other(_) => Ok(TransportFields::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    #[test]
    fn decode_tcp_syn() {
        let frame = ethernet(&ipv4(
            6,
            [10, 0, 0, 1],
            [10, 0, 0, 2],
            &tcp(443, 51000, TcpFlags::SYN),
        ));
        let fields = decode(&frame, 14).expect("decode");
        assert_eq!(fields.network.protocol, Protocol::Tcp);
        assert_eq!(fields.network.source, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(fields.network.destination, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(fields.network.ttl, 64);
        assert_eq!(fields.network.header_len, 20);
        assert_eq!(fields.source_port(), 443);
        assert_eq!(fields.dest_port(), 51000);
        assert_eq!(fields.tcp_flags(), Some(TcpFlags::SYN));
    }

    #[test]
    fn decode_ports_are_big_endian() {
        let frame = ethernet(&ipv4(6, [1, 1, 1, 1], [2, 2, 2, 2], &tcp(0x1234, 0xabcd, TcpFlags::ACK)));
        let fields = decode(&frame, 14).expect("decode");
        let l4 = 14 + 20;
        assert_eq!(fields.source_port(), u16::from_be_bytes([frame[l4], frame[l4 + 1]]));
        assert_eq!(fields.dest_port(), u16::from_be_bytes([frame[l4 + 2], frame[l4 + 3]]));
        assert_eq!(fields.source_port(), 0x1234);
        let flags = fields.tcp_flags().expect("flags");
        assert!(flags.contains(TcpFlags::ACK));
        assert!(!flags.contains(TcpFlags::SYN));
        assert!(!flags.contains(TcpFlags::URG));
    }

    #[test]
    fn decode_tos_and_ident() {
        let mut ip = ipv4(17, [1, 2, 3, 4], [5, 6, 7, 8], &udp(53, 3333, b"abc"));
        ip[1] = 0xb8;
        ip[4] = 0x12;
        ip[5] = 0x34;
        let fields = decode(&ip, 0).expect("decode");
        assert_eq!(fields.network.tos, 0xb8);
        assert_eq!(fields.network.ident, 0x1234);
        assert_eq!(
            fields.transport,
            TransportFields::Udp {
                source_port: 53,
                dest_port: 3333,
                length: 11,
            }
        );
        assert_eq!(fields.tcp_flags(), None);
    }

    #[test]
    fn decode_truncated_tcp() {
        let tcp_hdr = tcp(443, 51000, TcpFlags::SYN);
        let frame = ethernet(&ipv4(6, [10, 0, 0, 1], [10, 0, 0, 2], &tcp_hdr[..10]));
        assert_eq!(
            decode(&frame, 14),
            Err(DecodeError::Truncated {
                layer: Layer::Tcp,
                needed: 20,
                available: 10,
            })
        );
        let partial = decode_partial(&frame, 14).expect("network layer");
        assert_eq!(partial.network.protocol, Protocol::Tcp);
        assert!(partial.transport.is_err());
    }

    #[test]
    fn decode_truncated_udp() {
        let udp_hdr = udp(1000, 2000, b"");
        let ip = ipv4(17, [1, 2, 3, 4], [5, 6, 7, 8], &udp_hdr[..7]);
        assert!(matches!(
            decode(&ip, 0),
            Err(DecodeError::Truncated {
                layer: Layer::Udp,
                ..
            })
        ));
        let partial = decode_partial(&ip, 0).expect("network layer");
        assert_eq!(partial.network.source, Ipv4Addr::new(1, 2, 3, 4));
    }

    #[test]
    fn decode_short_frames() {
        for len in 0..(14 + IPV4_MIN_HEADER_LEN) {
            let frame = vec![0x45; len];
            assert!(matches!(
                decode(&frame, 14),
                Err(DecodeError::Truncated {
                    layer: Layer::Network,
                    ..
                })
            ));
        }
    }

    #[test]
    fn decode_invalid_header_length() {
        let mut ip = ipv4(1, [1, 1, 1, 1], [2, 2, 2, 2], &[8, 0, 0, 0]);
        ip[0] = 0x44;
        assert_eq!(decode(&ip, 0), Err(DecodeError::InvalidHeaderLength(16)));
        // IHL of 60 bytes in a 24-byte packet
        ip[0] = 0x4f;
        assert_eq!(decode(&ip, 0), Err(DecodeError::InvalidHeaderLength(60)));
    }

    #[test]
    fn decode_rejects_ipv6() {
        let mut ip = ipv4(6, [1, 1, 1, 1], [2, 2, 2, 2], &tcp(1, 2, TcpFlags::SYN));
        ip[0] = 0x60;
        assert_eq!(decode(&ip, 0), Err(DecodeError::UnsupportedVersion(6)));
    }

    #[test]
    fn decode_icmp_and_other() {
        let ip = ipv4(1, [1, 1, 1, 1], [2, 2, 2, 2], &[8, 0, 0xf7, 0xff]);
        let fields = decode(&ip, 0).expect("decode");
        assert_eq!(fields.network.protocol, Protocol::Icmp);
        assert_eq!(fields.transport, TransportFields::None);
        assert_eq!((fields.source_port(), fields.dest_port()), (0, 0));

        let ip = ipv4(47, [1, 1, 1, 1], [2, 2, 2, 2], &[]);
        let fields = decode(&ip, 0).expect("decode");
        assert_eq!(fields.network.protocol, Protocol::Other(47));
    }

    #[test]
    fn decode_with_ip_options() {
        let frame = ethernet(&ipv4_with_options(
            6,
            [10, 0, 0, 1],
            [10, 0, 0, 2],
            &[1, 1, 1, 0],
            &tcp(80, 1024, TcpFlags::SYN | TcpFlags::ACK | TcpFlags::URG),
        ));
        let fields = decode(&frame, 14).expect("decode");
        assert_eq!(fields.network.header_len, 24);
        assert_eq!(fields.source_port(), 80);
        assert_eq!(fields.tcp_flags().map(TcpFlags::compact).as_deref(), Some("SAU"));
    }

    #[test]
    fn decode_is_offset_independent() {
        let frames = vec![
            ethernet(&ipv4(6, [10, 0, 0, 1], [10, 0, 0, 2], &tcp(443, 51000, TcpFlags::SYN))),
            ethernet(&ipv4(17, [10, 0, 0, 1], [10, 0, 0, 2], &udp(1, 2, b"x"))[..25]),
            ethernet(&[0x45, 0, 0]),
            vec![0u8; 3],
            vec![],
        ];
        for frame in frames {
            let tail = frame.get(14..).unwrap_or(&[]);
            assert_eq!(decode(&frame, 14), decode(tail, 0));
        }
    }
}
