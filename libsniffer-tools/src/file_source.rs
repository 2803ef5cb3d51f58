use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, Linktype, PcapBlockOwned, PcapError};
use tracing::{debug, warn};

use crate::duration::Duration;
use crate::error::{CaptureError, Error};
use crate::packet::RawFrame;
use crate::source::{CaptureBackend, CaptureHandle, FrameEvent};

const READER_BUFFER_SIZE: usize = 65536;

const MAGIC_NANOS_LE: u32 = 0xa1b2_3c4d;
const MAGIC_NANOS_BE: u32 = 0x4d3c_b2a1;

/// Input stream of a capture file
pub type BoxedInput = Box<dyn Read + Send>;

/// Wraps an opened capture file, e.g. to decompress it
pub type InputDecoder = fn(&Path, File) -> io::Result<BoxedInput>;

fn plain_input(_path: &Path, file: File) -> io::Result<BoxedInput> {
    Ok(Box::new(file))
}

/// Capture handle replaying the frames of a legacy pcap file
///
/// Blocks are read from the input one at a time, as the receive loop asks
/// for frames. Only the file header and the first frame are read when the
/// source is created, to know the link type and the start of the capture.
pub struct PcapFileSource {
    reader: LegacyPcapReader<BoxedInput>,
    link_type: Linktype,
    nanos: bool,
    pending: Option<RawFrame>,
    first_ts: Duration,
    delivered: usize,
    exhausted: bool,
}

impl PcapFileSource {
    pub fn from_reader<R: Read + Send + 'static>(input: R) -> Result<Self, Error> {
        let reader = LegacyPcapReader::new(READER_BUFFER_SIZE, Box::new(input) as BoxedInput)
            .map_err(|e| Error::Pcap(format!("could not read pcap header: {e:?}")))?;
        let mut source = PcapFileSource {
            reader,
            link_type: Linktype::ETHERNET,
            nanos: false,
            pending: None,
            first_ts: Duration::now(),
            delivered: 0,
            exhausted: false,
        };
        source.pending = source.read_frame()?;
        if let Some(frame) = source.pending.as_ref() {
            source.first_ts = frame.ts;
        }
        Ok(source)
    }

    /// Number of frames handed out so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Read blocks until the next frame, or the end of the file
    fn read_frame(&mut self) -> Result<Option<RawFrame>, Error> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::LegacyHeader(hdr) => {
                            self.link_type = hdr.network;
                            self.nanos = hdr.magic_number == MAGIC_NANOS_LE
                                || hdr.magic_number == MAGIC_NANOS_BE;
                            debug!("Legacy pcap, link type: {:?}", hdr.network);
                            None
                        }
                        PcapBlockOwned::Legacy(b) => {
                            let caplen = b.caplen as usize;
                            let data = b.data.get(..caplen).unwrap_or(b.data);
                            let micros = if self.nanos { b.ts_usec / 1000 } else { b.ts_usec };
                            Some(RawFrame {
                                ts: Duration::new(b.ts_sec, micros),
                                data: data.to_vec(),
                                origlen: b.origlen,
                            })
                        }
                        _ => {
                            warn!("unexpected pcap-ng block in legacy pcap file, ignored");
                            None
                        }
                    };
                    self.reader.consume(offset);
                    if frame.is_some() {
                        return Ok(frame);
                    }
                }
                Err(PcapError::Eof) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(PcapError::UnexpectedEof) => {
                    warn!("Could not read complete data block.");
                    warn!("Hint: the input file may be truncated.");
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(PcapError::Incomplete(_)) => {
                    self.reader
                        .refill()
                        .map_err(|e| Error::Pcap(format!("refill failed: {e:?}")))?;
                }
                Err(e) => return Err(Error::Pcap(format!("parse error: {e:?}"))),
            }
        }
    }
}

impl CaptureHandle for PcapFileSource {
    fn link_type(&self) -> Linktype {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<FrameEvent, CaptureError> {
        let next = match self.pending.take() {
            Some(frame) => Some(frame),
            None => self
                .read_frame()
                .map_err(|e| CaptureError::HandleLost(e.to_string()))?,
        };
        match next {
            Some(frame) => {
                self.delivered += 1;
                Ok(FrameEvent::Frame(frame))
            }
            None => {
                debug!("pcap file: {} frames replayed", self.delivered);
                Ok(FrameEvent::Exhausted)
            }
        }
    }

    fn start_time(&self) -> Duration {
        self.first_ts
    }
}

/// Capture backend where devices are pcap files
pub struct FileBackend {
    decoder: InputDecoder,
}

impl Default for FileBackend {
    fn default() -> Self {
        FileBackend {
            decoder: plain_input,
        }
    }
}

impl FileBackend {
    /// Build a backend passing every opened file through `decoder`
    pub fn with_decoder(decoder: InputDecoder) -> Self {
        FileBackend { decoder }
    }
}

impl CaptureBackend for FileBackend {
    type Handle = PcapFileSource;

    fn list_devices(&self) -> Result<Vec<String>, CaptureError> {
        Ok(Vec::new())
    }

    fn open(&self, device: &str) -> Result<PcapFileSource, CaptureError> {
        let path = Path::new(device);
        let file = File::open(path).map_err(|e| CaptureError::OpenFailed(format!("{device}: {e}")))?;
        let input =
            (self.decoder)(path, file).map_err(|e| CaptureError::OpenFailed(format!("{device}: {e}")))?;
        PcapFileSource::from_reader(input).map_err(|e| CaptureError::OpenFailed(format!("{device}: {e}")))
    }
}
