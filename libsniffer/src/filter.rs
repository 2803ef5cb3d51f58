use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use libsniffer_tools::FilterError;

use crate::layers::Protocol;
use crate::record::PacketRecord;

/// Protocol criterion of a filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolFilter {
    #[default]
    Any,
    Tcp,
    Udp,
    Icmp,
    /// Anything but TCP, UDP and ICMP
    Other,
}

impl ProtocolFilter {
    pub fn matches(self, protocol: Protocol) -> bool {
        match self {
            ProtocolFilter::Any => true,
            ProtocolFilter::Tcp => protocol == Protocol::Tcp,
            ProtocolFilter::Udp => protocol == Protocol::Udp,
            ProtocolFilter::Icmp => protocol == Protocol::Icmp,
            ProtocolFilter::Other => matches!(protocol, Protocol::Other(_)),
        }
    }
}

impl FromStr for ProtocolFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let filter = match s.to_ascii_lowercase().as_str() {
            "" | "any" | "all" => ProtocolFilter::Any,
            "tcp" => ProtocolFilter::Tcp,
            "udp" => ProtocolFilter::Udp,
            "icmp" => ProtocolFilter::Icmp,
            "other" => ProtocolFilter::Other,
            _ => {
                return Err(FilterError::InvalidCriterion {
                    criterion: "protocol",
                    value: s.to_owned(),
                })
            }
        };
        Ok(filter)
    }
}

impl fmt::Display for ProtocolFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ProtocolFilter::Any => "any",
            ProtocolFilter::Tcp => "TCP",
            ProtocolFilter::Udp => "UDP",
            ProtocolFilter::Icmp => "ICMP",
            ProtocolFilter::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// Set of match criteria; unset criteria match every packet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub protocol: ProtocolFilter,
    pub source_ip: Option<Ipv4Addr>,
    pub dest_ip: Option<Ipv4Addr>,
    /// 0 matches any port
    pub source_port: u16,
}

impl FilterSpec {
    /// Build a filter from user input
    ///
    /// Each value is trimmed, and an empty value leaves the criterion unset.
    pub fn parse(protocol: &str, source_ip: &str, dest_ip: &str, source_port: &str) -> Result<Self, FilterError> {
        Ok(FilterSpec {
            protocol: protocol.parse()?,
            source_ip: parse_ip("source IP", source_ip)?,
            dest_ip: parse_ip("destination IP", dest_ip)?,
            source_port: parse_port(source_port)?,
        })
    }

    /// True if no criterion is set
    pub fn is_empty(&self) -> bool {
        *self == FilterSpec::default()
    }

    pub fn matches(&self, record: &PacketRecord) -> bool {
        self.protocol.matches(record.protocol)
            && self.source_ip.map_or(true, |ip| ip == record.source_addr)
            && self.dest_ip.map_or(true, |ip| ip == record.dest_addr)
            && (self.source_port == 0 || self.source_port == record.source_port)
    }
}

fn parse_ip(criterion: &'static str, value: &str) -> Result<Option<Ipv4Addr>, FilterError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| FilterError::InvalidCriterion {
            criterion,
            value: value.to_owned(),
        })
}

fn parse_port(value: &str) -> Result<u16, FilterError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| FilterError::InvalidCriterion {
        criterion: "source port",
        value: value.to_owned(),
    })
}

/// Select the records matching `spec`, keeping their order
pub fn apply(spec: &FilterSpec, snapshot: &[Arc<PacketRecord>]) -> Vec<Arc<PacketRecord>> {
    snapshot.iter().filter(|r| spec.matches(r)).cloned().collect()
}
