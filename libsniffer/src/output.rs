use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use libsniffer_tools::{Config, Error};
use serde::Serialize;
use tracing::{info, warn};

use crate::layers::Protocol;
use crate::observer::{Delivery, PacketObserver};
use crate::record::PacketRecord;

/// Default name of the CSV packet log
pub const PACKET_LOG_FILENAME: &str = "packet_log.csv";

const PACKET_LOG_HEADER: [&str; 9] = [
    "ID",
    "Source IP",
    "Destination IP",
    "TTL",
    "TOS",
    "Source Port",
    "Destination Port",
    "Flags",
    "Protocol",
];

/// Get the base prefix of output directory (or "." if not specified)
pub fn get_output_dir(config: &Config) -> &str {
    config.get("output_dir").unwrap_or(".")
}

/// Path of the packet log: `log_file` if set, else `packet_log.csv` in the output directory
pub fn packet_log_path(config: &Config) -> PathBuf {
    match config.get("log_file") {
        Some(path) => PathBuf::from(path),
        None => {
            let mut path = PathBuf::from(get_output_dir(config));
            path.push(PACKET_LOG_FILENAME);
            path
        }
    }
}

#[derive(Serialize)]
struct LogRow<'a> {
    id: u64,
    source: &'a str,
    destination: &'a str,
    ttl: u8,
    tos: u8,
    source_port: u16,
    dest_port: u16,
    flags: String,
    protocol: Protocol,
}

/// CSV log of accepted packets, one line per record
///
/// The file is opened in append mode, so successive captures accumulate in
/// the same log. The header line is only written to an empty file.
pub struct PacketLog {
    path: PathBuf,
    writer: Writer<File>,
}

impl PacketLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<PacketLog, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let empty = file.metadata()?.len() == 0;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if empty {
            writer
                .write_record(PACKET_LOG_HEADER)
                .map_err(|e| Error::Csv(e.to_string()))?;
            writer.flush()?;
        }
        info!("packet log: {}", path.display());
        Ok(PacketLog { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, record: &PacketRecord) -> Result<(), Error> {
        let row = LogRow {
            id: record.sequence_id,
            source: &record.source_text,
            destination: &record.dest_text,
            ttl: record.ttl,
            tos: record.tos,
            source_port: record.source_port,
            dest_port: record.dest_port,
            flags: record.tcp_flags.map_or_else(|| "-".to_owned(), |f| f.compact()),
            protocol: record.protocol,
        };
        self.writer.serialize(row).map_err(|e| Error::Csv(e.to_string()))?;
        self.writer.flush()?;
        Ok(())
    }
}

impl PacketObserver for PacketLog {
    fn name(&self) -> &'static str {
        "PacketLog"
    }

    fn on_packet(&mut self, record: &PacketRecord) -> Delivery {
        match self.write(record) {
            Ok(()) => Delivery::Keep,
            Err(e) => {
                warn!("packet log {}: write failed, logging disabled: {}", self.path.display(), e);
                Delivery::Detach
            }
        }
    }
}
