use std::fmt;

use pcap_parser::Linktype;

use crate::duration::Duration;

/// Length of the Ethernet II header stripped before the IP header
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Number of link-layer bytes preceding the IP header for a link type
///
/// Only Ethernet is stripped; any other or unknown link type is assumed to
/// carry the IP header first.
pub fn link_header_len(link_type: Linktype) -> usize {
    if link_type == Linktype::ETHERNET {
        ETHERNET_HEADER_LEN
    } else {
        0
    }
}

/// Lifecycle state of a capture session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    /// No device is open
    Idle,
    /// A receive loop is reading frames from the open device
    Running,
    /// The device is open but no receive loop is running
    Stopped,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CaptureState::Idle => "idle",
            CaptureState::Running => "running",
            CaptureState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Information related to the open capture device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSession {
    /// Device (interface name, or file path when replaying)
    pub device: String,
    /// The `Linktype` reported by the opened handle
    pub link_type: Linktype,
    /// Bytes stripped before the IP header, derived from `link_type`
    pub link_header_len: usize,
    /// Reference point for relative packet timestamps
    pub started_at: Duration,
}

impl CaptureSession {
    pub fn new(device: &str, link_type: Linktype, started_at: Duration) -> Self {
        CaptureSession {
            device: device.to_owned(),
            link_type,
            link_header_len: link_header_len(link_type),
            started_at,
        }
    }
}
