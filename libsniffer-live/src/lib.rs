//! Live capture from network interfaces, through libpcap

use libsniffer_tools::{Config, Error};

pub use crate::backend::{CaptureOptions, PcapBackend, PcapHandle};

mod backend;

/// Build a live capture backend configured from the `live.*` configuration keys
pub fn create_backend_live(config: &Config) -> Result<PcapBackend, Error> {
    let options = CaptureOptions::from_config(config)?;
    Ok(PcapBackend::new(options))
}
