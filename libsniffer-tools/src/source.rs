use pcap_parser::Linktype;

use crate::duration::Duration;
use crate::error::CaptureError;
use crate::packet::RawFrame;

/// Outcome of one read on a capture handle
#[derive(Debug)]
pub enum FrameEvent {
    /// A frame was received
    Frame(RawFrame),
    /// The read timed out without a frame; the caller may check for cancellation
    Timeout,
    /// The source will never deliver another frame (end of a capture file)
    Exhausted,
}

/// Common trait for capture devices providers (live interfaces, capture files)
pub trait CaptureBackend: Send + Sync + 'static {
    type Handle: CaptureHandle;

    /// List the names of the devices that can be opened
    fn list_devices(&self) -> Result<Vec<String>, CaptureError>;

    /// Open a device for capture
    ///
    /// Failures must be reported as `CaptureError::OpenFailed`.
    fn open(&self, device: &str) -> Result<Self::Handle, CaptureError>;
}

/// An open capture device
///
/// Closing happens on drop.
pub trait CaptureHandle: Send + 'static {
    /// Link-layer type of the frames delivered by this handle
    fn link_type(&self) -> Linktype;

    /// Wait for the next frame
    ///
    /// Implementations must return `FrameEvent::Timeout` periodically instead of
    /// blocking forever, so that the receive loop can be stopped promptly.
    fn next_frame(&mut self) -> Result<FrameEvent, CaptureError>;

    /// Reference time for relative timestamps of this capture (optional)
    ///
    /// Live devices use the time the device was opened. Replayed captures
    /// use the timestamp of their first frame.
    fn start_time(&self) -> Duration {
        Duration::now()
    }
}
