use std::fmt;

use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use serde::{Serialize, Serializer};

/// Transport protocol carried by an IPv4 packet
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Any other protocol, with its raw IP protocol number
    Other(u8),
}

impl Protocol {
    pub fn from_number(proto: u8) -> Protocol {
        match IpNextHeaderProtocol(proto) {
            IpNextHeaderProtocols::Tcp => Protocol::Tcp,
            IpNextHeaderProtocols::Udp => Protocol::Udp,
            IpNextHeaderProtocols::Icmp => Protocol::Icmp,
            _ => Protocol::Other(proto),
        }
    }

    /// IP protocol number
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => IpNextHeaderProtocols::Tcp.0,
            Protocol::Udp => IpNextHeaderProtocols::Udp.0,
            Protocol::Icmp => IpNextHeaderProtocols::Icmp.0,
            Protocol::Other(proto) => proto,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other(_) => "OTHER",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// TCP control bits
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x01);
    pub const SYN: TcpFlags = TcpFlags(0x02);
    pub const RST: TcpFlags = TcpFlags(0x04);
    pub const PSH: TcpFlags = TcpFlags(0x08);
    pub const ACK: TcpFlags = TcpFlags(0x10);
    pub const URG: TcpFlags = TcpFlags(0x20);
    pub const ECE: TcpFlags = TcpFlags(0x40);
    pub const CWR: TcpFlags = TcpFlags(0x80);

    const NAMES: [(TcpFlags, &'static str); 8] = [
        (TcpFlags::FIN, "FIN"),
        (TcpFlags::SYN, "SYN"),
        (TcpFlags::RST, "RST"),
        (TcpFlags::PSH, "PSH"),
        (TcpFlags::ACK, "ACK"),
        (TcpFlags::URG, "URG"),
        (TcpFlags::ECE, "ECE"),
        (TcpFlags::CWR, "CWR"),
    ];

    #[inline]
    pub const fn from_bits(bits: u8) -> TcpFlags {
        TcpFlags(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Three-character SYN/ACK/URG marker, e.g. `SA-`
    pub fn compact(self) -> String {
        let mark = |flag, c| if self.contains(flag) { c } else { '-' };
        [
            mark(TcpFlags::SYN, 'S'),
            mark(TcpFlags::ACK, 'A'),
            mark(TcpFlags::URG, 'U'),
        ]
        .iter()
        .collect()
    }

    /// Names of the bits set, e.g. `["SYN", "ACK"]`
    pub fn names(self) -> Vec<&'static str> {
        TcpFlags::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        f.write_str(&self.names().join(","))
    }
}
