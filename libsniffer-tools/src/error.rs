use std::fmt;
use std::io;

use thiserror::Error;

/// Protocol layer at which decoding stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Layer {
    Network,
    Tcp,
    Udp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Layer::Network => "IPv4",
            Layer::Tcp => "TCP",
            Layer::Udp => "UDP",
        };
        f.write_str(s)
    }
}

/// Per-frame decoding failure. Never fatal to the capture loop.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is shorter than the layer being parsed requires
    #[error("{layer} header truncated: {needed} bytes needed, {available} available")]
    Truncated {
        layer: Layer,
        needed: usize,
        available: usize,
    },
    /// Declared IP header length is out of bounds
    #[error("invalid IP header length: {0} bytes")]
    InvalidHeaderLength(usize),
    #[error("unsupported IP version {0}")]
    UnsupportedVersion(u8),
}

/// Capture session failure, surfaced to the caller of the controller
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Device unavailable, unauthorized or nonexistent
    #[error("could not open capture device: {0}")]
    OpenFailed(String),
    #[error("could not list capture devices: {0}")]
    DeviceList(String),
    /// The capture handle failed while the receive loop was running
    #[error("capture handle lost: {0}")]
    HandleLost(String),
    #[error("no capture session")]
    NoSession,
}

/// Malformed filter input
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid {criterion} filter: {value:?}")]
    InvalidCriterion {
        criterion: &'static str,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Generic(&'static str),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("pcap error: {0}")]
    Pcap(String),
    #[error("CSV error: {0}")]
    Csv(String),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error::Generic(s)
    }
}
