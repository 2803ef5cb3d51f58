use libsniffer_tools::pcap_parser::Linktype;
use libsniffer_tools::{
    CaptureBackend, CaptureError, CaptureHandle, Config, Duration, Error, FrameEvent, RawFrame,
};
use pcap::{Active, Capture, Device, Precision};
use tracing::{debug, error, info, trace};

const DEFAULT_SNAPLEN: i32 = 65535;
const DEFAULT_TIMEOUT_MS: i32 = 100;

/// Options applied to every device opened by a `PcapBackend`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureOptions {
    pub promisc: bool,
    pub snaplen: i32,
    /// Read timeout. Bounds how long a stop request can go unnoticed.
    pub timeout_ms: i32,
    pub immediate: bool,
    pub precision: Precision,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        CaptureOptions {
            promisc: false,
            snaplen: DEFAULT_SNAPLEN,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            immediate: true,
            precision: Precision::Micro,
        }
    }
}

impl CaptureOptions {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let defaults = CaptureOptions::default();
        let precision = match config.get("live.precision") {
            None | Some("micro") => Precision::Micro,
            Some("nano") => Precision::Nano,
            Some(_) => return Err(Error::Config("live.precision must be \"micro\" or \"nano\"".to_owned())),
        };
        let to_i32 = |key: &str, default: i32| -> Result<i32, Error> {
            match config.get_usize(key) {
                None => Ok(default),
                Some(v) => i32::try_from(v).map_err(|_| Error::Config(format!("{key} is out of range"))),
            }
        };
        Ok(CaptureOptions {
            promisc: config.get_bool("live.promisc").unwrap_or(defaults.promisc),
            snaplen: to_i32("live.snaplen", defaults.snaplen)?,
            timeout_ms: to_i32("live.timeout_ms", defaults.timeout_ms)?,
            immediate: config.get_bool("live.immediate").unwrap_or(defaults.immediate),
            precision,
        })
    }
}

/// Network interfaces, opened with libpcap
#[derive(Debug, Default)]
pub struct PcapBackend {
    options: CaptureOptions,
}

impl PcapBackend {
    pub fn new(options: CaptureOptions) -> Self {
        PcapBackend { options }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }
}

impl CaptureBackend for PcapBackend {
    type Handle = PcapHandle;

    fn list_devices(&self) -> Result<Vec<String>, CaptureError> {
        match Device::list() {
            Ok(devices) => Ok(devices.into_iter().map(|d| d.name).collect()),
            Err(e) => {
                error!("Could not list network interfaces: {e:?}\nAre you running with root privileges (CAP_NET_RAW)?");
                Err(CaptureError::DeviceList(e.to_string()))
            }
        }
    }

    fn open(&self, device: &str) -> Result<PcapHandle, CaptureError> {
        let interfaces = Device::list().map_err(|e| CaptureError::OpenFailed(format!("{device}: {e}")))?;
        let dev = interfaces
            .into_iter()
            .find(|iface| iface.name == device)
            .ok_or_else(|| CaptureError::OpenFailed(format!("{device}: no such interface")))?;

        let options = &self.options;
        let cap = Capture::from_device(dev)
            .and_then(|cap| {
                cap.promisc(options.promisc)
                    .snaplen(options.snaplen)
                    .timeout(options.timeout_ms)
                    .immediate_mode(options.immediate)
                    .precision(options.precision)
                    .open()
            })
            .map_err(|e| CaptureError::OpenFailed(format!("{device}: {e}")))?;

        // convert from `pcap` crate format to `pcap_parser` format
        let link_type = Linktype(cap.get_datalink().0);
        info!("Live mode: {} opened, link type {:?}", device, link_type);
        Ok(PcapHandle {
            cap,
            link_type,
            precision: options.precision,
            opened_at: Duration::now(),
        })
    }
}

/// An open network interface
pub struct PcapHandle {
    cap: Capture<Active>,
    link_type: Linktype,
    precision: Precision,
    opened_at: Duration,
}

impl CaptureHandle for PcapHandle {
    fn link_type(&self) -> Linktype {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<FrameEvent, CaptureError> {
        match self.cap.next_packet() {
            Ok(packet) => {
                let header = packet.header;
                let ts_sec = header.ts.tv_sec as u32;
                let ts_usec = header.ts.tv_usec as u32;
                let ts = if self.precision == Precision::Micro {
                    Duration::new(ts_sec, ts_usec)
                } else {
                    Duration::new(ts_sec, ts_usec / 1000)
                };
                trace!("Live: frame of {} bytes ({} on wire)", header.caplen, header.len);
                Ok(FrameEvent::Frame(RawFrame {
                    ts,
                    data: packet.data.to_vec(),
                    origlen: header.len,
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(FrameEvent::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(FrameEvent::Exhausted),
            Err(e) => {
                debug!("Live mode: getting next packet failed: {e:?}");
                Err(CaptureError::HandleLost(e.to_string()))
            }
        }
    }

    fn start_time(&self) -> Duration {
        self.opened_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = CaptureOptions::from_config(&Config::default()).expect("options");
        assert_eq!(options, CaptureOptions::default());
        assert_eq!(options.timeout_ms, 100);
        assert!(!options.promisc);
    }

    #[test]
    fn options_from_config() {
        let mut config = Config::default();
        config.set("live.promisc", true);
        config.set("live.snaplen", 128_i64);
        config.set("live.timeout_ms", 20_i64);
        config.set("live.precision", "nano");
        let options = CaptureOptions::from_config(&config).expect("options");
        assert!(options.promisc);
        assert_eq!(options.snaplen, 128);
        assert_eq!(options.timeout_ms, 20);
        assert_eq!(options.precision, Precision::Nano);

        config.set("live.precision", "pico");
        assert!(matches!(CaptureOptions::from_config(&config), Err(Error::Config(_))));
    }
}
