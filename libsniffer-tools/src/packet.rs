use crate::duration::Duration;

/// One frame as delivered by a capture source, link-layer header included
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    pub ts: Duration,
    pub data: Vec<u8>,
    /// Length of the frame on the wire (may exceed `data.len()` when truncated by snaplen)
    pub origlen: u32,
}

impl RawFrame {
    pub fn new(ts: Duration, data: Vec<u8>) -> Self {
        let origlen = u32::try_from(data.len()).unwrap_or(u32::MAX);
        RawFrame { ts, data, origlen }
    }

    #[inline]
    pub fn caplen(&self) -> usize {
        self.data.len()
    }
}
