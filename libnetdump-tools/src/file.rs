//! Capture file variant of `CaptureHandle` (pcap and pcap-ng)

use crate::error::Error;
use crate::frame::Frame;
use crate::handle::{check_activate, check_active, CaptureHandle, HandleState, NextFrame};
use crate::input::open_input;
use crate::link_type::LinkType;
use crate::timestamp::Timestamp;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, LegacyPcapBlock, PcapBlockOwned, PcapError, PcapHeader, ToVec};
use std::cmp::min;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use tracing::{debug, trace, warn};

/// Default size of the read buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 128 * 1024;

/// Snaplen recorded in the header of written files
pub const OUTPUT_SNAPLEN: u32 = 262_144;

const MICROS: u64 = 1_000_000;
const NANOS: u64 = 1_000_000_000;

/// Per-interface information, one entry for legacy pcap files
#[derive(Clone, Copy, Debug)]
struct Interface {
    link_type: LinkType,
    units_per_sec: u64,
}

/// Owned view of a pcap block, so that the reader buffer can be released
enum Item {
    LegacyHeader(Interface),
    Section,
    Interface(Interface),
    Packet {
        if_id: u32,
        ts_high: u32,
        ts_low: u32,
        origlen: u32,
        data: Vec<u8>,
    },
    Skip,
}

/// Convert the `if_tsresol` option of a pcap-ng interface to units per second
fn ts_resolution(tsresol: u8) -> u64 {
    let exp = u32::from(tsresol & 0x7f);
    if tsresol & 0x80 == 0 {
        10u64.checked_pow(exp).unwrap_or(MICROS)
    } else {
        1u64.checked_shl(exp).unwrap_or(MICROS)
    }
}

impl Item {
    fn from_block(block: &PcapBlockOwned) -> Item {
        match block {
            PcapBlockOwned::LegacyHeader(hdr) => {
                let units_per_sec = if hdr.is_nanosecond_precision() {
                    NANOS
                } else {
                    MICROS
                };
                Item::LegacyHeader(Interface {
                    link_type: hdr.network.into(),
                    units_per_sec,
                })
            }
            PcapBlockOwned::Legacy(b) => {
                let caplen = min(b.caplen as usize, b.data.len());
                Item::Packet {
                    if_id: 0,
                    ts_high: b.ts_sec,
                    ts_low: b.ts_usec,
                    origlen: b.origlen,
                    data: b.data[..caplen].to_vec(),
                }
            }
            PcapBlockOwned::NG(Block::SectionHeader(_)) => Item::Section,
            PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => Item::Interface(Interface {
                link_type: idb.linktype.into(),
                units_per_sec: ts_resolution(idb.if_tsresol),
            }),
            PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                let caplen = min(epb.caplen as usize, epb.data.len());
                Item::Packet {
                    if_id: epb.if_id,
                    ts_high: epb.ts_high,
                    ts_low: epb.ts_low,
                    origlen: epb.origlen,
                    data: epb.data[..caplen].to_vec(),
                }
            }
            PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                // data is padded to 32 bits, origlen tells the real size
                let caplen = min(spb.origlen as usize, spb.data.len());
                Item::Packet {
                    if_id: 0,
                    ts_high: 0,
                    ts_low: 0,
                    origlen: spb.origlen,
                    data: spb.data[..caplen].to_vec(),
                }
            }
            _ => Item::Skip,
        }
    }
}

struct FileReader {
    /// Input stream, until `activate` hands it to the pcap reader
    input: Option<Box<dyn Read + Send>>,
    reader: Option<Box<dyn PcapReaderIterator>>,
    /// Current size of the read buffer
    capacity: usize,
    legacy: bool,
    interfaces: Vec<Interface>,
}

impl FileReader {
    /// Read the next block, refilling the buffer as needed. Returns `None` at end of file.
    ///
    /// Decompressors and pipes may return short reads, so the buffer is
    /// refilled until the block is complete or the input is exhausted.
    fn pull(&mut self) -> Result<Option<Item>, Error> {
        let reader = self.reader.as_mut().ok_or(Error::NotActivated)?;
        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    let item = Item::from_block(&block);
                    reader.consume(offset);
                    return Ok(Some(item));
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => {
                    if reader.reader_exhausted() {
                        warn!("Could not read complete data block, input file may be truncated");
                        return Ok(None);
                    }
                    trace!("need refill");
                    let buffered = reader.data().len();
                    reader
                        .refill()
                        .map_err(|e| Error::ReadFailed(format!("refill failed: {e:?}")))?;
                    if reader.data().len() == buffered && !reader.reader_exhausted() {
                        return Err(Error::ReadFailed(format!(
                            "data block does not fit in the read buffer ({} bytes)",
                            self.capacity
                        )));
                    }
                }
                Err(e) => {
                    let msg = format!("{e:?}");
                    if reader.reader_exhausted() {
                        warn!("Could not read complete data block, input file may be truncated ({msg})");
                        return Ok(None);
                    }
                    return Err(Error::ReadFailed(msg));
                }
            }
        }
    }

    fn timestamp(&self, iface: &Interface, ts_high: u32, ts_low: u32) -> Timestamp {
        if self.legacy {
            return Timestamp::from_fraction(ts_high, u64::from(ts_low), iface.units_per_sec);
        }
        let ts = (u64::from(ts_high) << 32) | u64::from(ts_low);
        let secs = ts / iface.units_per_sec;
        let frac = ts % iface.units_per_sec;
        Timestamp::from_fraction(secs as u32, frac, iface.units_per_sec)
    }
}

struct FileWriter {
    out: BufWriter<File>,
}

enum Inner {
    Reader(FileReader),
    Writer(FileWriter),
    Closed,
}

/// Capture file handle
///
/// A handle is either a source (built with [`FileHandle::open`]) reading pcap
/// or pcap-ng data, or a sink (built with [`FileHandle::create`]) writing
/// legacy pcap.
///
/// ## example
///
/// ```no_run
/// use libnetdump_tools::{CaptureHandle, FileHandle, NextFrame};
///
/// let mut source = FileHandle::open("capture.pcap").expect("open");
/// source.activate().expect("activate");
/// while let Ok(NextFrame::Frame(frame)) = source.next_frame() {
///     println!("{} bytes", frame.caplen());
/// }
/// ```
pub struct FileHandle {
    path: String,
    state: HandleState,
    link_type: LinkType,
    capacity: usize,
    inner: Inner,
}

impl FileHandle {
    /// Open a capture file for reading. `-` designates standard input.
    pub fn open<S: AsRef<str>>(path: S) -> Result<FileHandle, Error> {
        FileHandle::open_with_capacity(path, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn open_with_capacity<S: AsRef<str>>(
        path: S,
        capacity: usize,
    ) -> Result<FileHandle, Error> {
        let path = path.as_ref();
        let input = open_input(path)
            .map_err(|e| Error::SourceUnavailable(format!("{path}: {e}")))?;
        debug!("File source {path} opened");
        Ok(FileHandle {
            path: path.to_owned(),
            state: HandleState::Opened,
            link_type: LinkType::Other(-1),
            capacity,
            inner: Inner::Reader(FileReader {
                input: Some(input),
                reader: None,
                capacity,
                legacy: false,
                interfaces: Vec::new(),
            }),
        })
    }

    /// Create (or truncate) a pcap file to write frames of the given link type
    pub fn create<S: AsRef<str>>(path: S, link_type: LinkType) -> Result<FileHandle, Error> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| Error::SourceUnavailable(format!("{path}: {e}")))?;
        debug!("File sink {path} created (link type {link_type})");
        Ok(FileHandle {
            path: path.to_owned(),
            state: HandleState::Opened,
            link_type,
            capacity: 0,
            inner: Inner::Writer(FileWriter {
                out: BufWriter::new(file),
            }),
        })
    }

    fn activate_reader(&mut self) -> Result<(), Error> {
        let capacity = self.capacity;
        let r = match &mut self.inner {
            Inner::Reader(r) => r,
            _ => return Err(Error::Generic("not a file reader")),
        };
        let input = r
            .input
            .take()
            .ok_or_else(|| Error::ActivationFailed("input already consumed".to_owned()))?;
        let reader = pcap_parser::create_reader(capacity, input)
            .map_err(|e| Error::ActivationFailed(format!("{}: {e:?}", self.path)))?;
        r.reader = Some(reader);
        loop {
            let item = r.pull().map_err(|e| Error::ActivationFailed(e.to_string()))?;
            match item {
                Some(Item::LegacyHeader(iface)) => {
                    trace!("Legacy pcap, link type {}", iface.link_type);
                    r.legacy = true;
                    r.interfaces = vec![iface];
                    self.link_type = iface.link_type;
                    return Ok(());
                }
                Some(Item::Section) => r.interfaces.clear(),
                Some(Item::Interface(iface)) => {
                    trace!("pcap-ng, link type {}", iface.link_type);
                    r.interfaces.push(iface);
                    self.link_type = iface.link_type;
                    return Ok(());
                }
                Some(Item::Packet { .. }) => {
                    return Err(Error::ActivationFailed(format!(
                        "{}: packet found before any interface description",
                        self.path
                    )))
                }
                Some(Item::Skip) => (),
                None => {
                    return Err(Error::ActivationFailed(format!(
                        "{}: no capture header found",
                        self.path
                    )))
                }
            }
        }
    }

    fn activate_writer(&mut self) -> Result<(), Error> {
        let w = match &mut self.inner {
            Inner::Writer(w) => w,
            _ => return Err(Error::Generic("not a file writer")),
        };
        let mut hdr = PcapHeader::new();
        hdr.snaplen = OUTPUT_SNAPLEN;
        hdr.network = self.link_type.into();
        let s = hdr
            .to_vec()
            .map_err(|_| Error::ActivationFailed("Pcap header serialization failed".to_owned()))?;
        w.out
            .write_all(&s)
            .map_err(|e| Error::ActivationFailed(format!("{}: {e}", self.path)))
    }
}

impl CaptureHandle for FileHandle {
    fn name(&self) -> &str {
        &self.path
    }

    fn activate(&mut self) -> Result<(), Error> {
        check_activate(self.state)?;
        let res = match self.inner {
            Inner::Reader(_) => self.activate_reader(),
            Inner::Writer(_) => self.activate_writer(),
            Inner::Closed => Err(Error::ActivationFailed("handle is closed".to_owned())),
        };
        self.state = match res {
            Ok(()) => HandleState::Activated,
            Err(_) => HandleState::Failed,
        };
        res
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<NextFrame, Error> {
        check_active(self.state)?;
        let link_type = self.link_type;
        let r = match &mut self.inner {
            Inner::Reader(r) => r,
            _ => return Err(Error::ReadFailed(format!("{}: not opened for reading", self.path))),
        };
        loop {
            match r.pull()? {
                None => return Ok(NextFrame::EndOfStream),
                Some(Item::Packet {
                    if_id,
                    ts_high,
                    ts_low,
                    origlen,
                    data,
                }) => {
                    let iface = *r.interfaces.get(if_id as usize).ok_or_else(|| {
                        Error::ReadFailed(format!("packet references unknown interface {if_id}"))
                    })?;
                    if iface.link_type != link_type {
                        return Err(Error::ReadFailed(format!(
                            "interface {if_id} has link type {}, capture started as {link_type}",
                            iface.link_type
                        )));
                    }
                    let ts = r.timestamp(&iface, ts_high, ts_low);
                    return Ok(NextFrame::Frame(Frame {
                        ts,
                        link_type,
                        origlen,
                        data,
                    }));
                }
                Some(Item::Section) => {
                    debug!("pcap-ng: new section");
                    r.interfaces.clear();
                }
                Some(Item::Interface(iface)) => r.interfaces.push(iface),
                Some(Item::LegacyHeader(_)) | Some(Item::Skip) => (),
            }
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        check_active(self.state)?;
        let w = match &mut self.inner {
            Inner::Writer(w) => w,
            _ => return Err(Error::WriteFailed(format!("{}: not opened for writing", self.path))),
        };
        let record = LegacyPcapBlock {
            ts_sec: frame.ts.secs,
            ts_usec: frame.ts.micros,
            caplen: frame.caplen(),
            origlen: frame.origlen,
            data: &frame.data,
        };
        let s = record
            .to_vec_raw()
            .map_err(|_| Error::WriteFailed("Pcap block serialization failed".to_owned()))?;
        w.out
            .write_all(&s)
            .map_err(|e| Error::WriteFailed(format!("{}: {e}", self.path)))
    }

    fn flush(&mut self) -> Result<(), Error> {
        match &mut self.inner {
            Inner::Writer(w) => w
                .out
                .flush()
                .map_err(|e| Error::WriteFailed(format!("{}: {e}", self.path))),
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Inner::Writer(w) = &mut self.inner {
            if let Err(e) = w.out.flush() {
                warn!("{}: flushing output failed: {e}", self.path);
            }
        }
        if !matches!(self.inner, Inner::Closed) {
            debug!("Closing {}", self.path);
        }
        self.inner = Inner::Closed;
        self.state = HandleState::Closed;
    }

    fn state(&self) -> HandleState {
        self.state
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsresol_units() {
        assert_eq!(ts_resolution(6), MICROS);
        assert_eq!(ts_resolution(9), NANOS);
        assert_eq!(ts_resolution(0x80 | 10), 1024);
        assert_eq!(ts_resolution(60), MICROS);
    }
}
