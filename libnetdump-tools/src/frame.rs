use crate::link_type::LinkType;
use crate::timestamp::Timestamp;

/// One captured frame: raw bytes plus capture metadata
///
/// `data` holds exactly the captured bytes (`caplen` of them). `origlen` is
/// the length of the frame on the wire, which may be larger if the capture
/// was truncated to a snaplen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub ts: Timestamp,
    pub link_type: LinkType,
    pub origlen: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(ts: Timestamp, link_type: LinkType, data: Vec<u8>) -> Frame {
        let origlen = data.len() as u32;
        Frame {
            ts,
            link_type,
            origlen,
            data,
        }
    }

    #[inline]
    pub fn caplen(&self) -> u32 {
        self.data.len() as u32
    }

    /// True if fewer bytes were captured than were seen on the wire
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.caplen() < self.origlen
    }
}
