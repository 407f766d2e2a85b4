//! Layer decoder
//!
//! A frame is decoded outer-to-inner: each layer decoder parses one header,
//! and returns the tag of the next protocol, which is looked up in the
//! [registry](registry) to find the next decoder. Decoding stops when a tag
//! is unknown (the rest becomes a `payload` layer) or when a header does not
//! fit in the captured bytes (the last layer is then marked incomplete).

mod ip;
mod link;
mod null;
pub mod registry;
mod sll;
mod transport;

pub use null::{NullFamilies, NullPacket};
pub use registry::{DecodeFn, Step, Tag, Truncated};
pub use sll::{SllPacket, SllPacketTypes};

use libnetdump_tools::{Frame, LinkType};
use pnet_base::MacAddr;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::debug;

/// Value of a decoded header field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue<'a> {
    U8(u8),
    U16(u16),
    U32(u32),
    /// Protocol identifiers (ethertypes), shown in hexadecimal
    Hex16(u16),
    Str(&'static str),
    Text(String),
    Mac(MacAddr),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// Undecoded bytes, borrowed from the frame
    Bytes(&'a [u8]),
}

/// Number of bytes shown when displaying raw bytes
const BYTES_PREVIEW: usize = 16;

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::U8(v) => write!(f, "{v}"),
            FieldValue::U16(v) => write!(f, "{v}"),
            FieldValue::U32(v) => write!(f, "{v}"),
            FieldValue::Hex16(v) => write!(f, "0x{v:04x}"),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Mac(m) => write!(f, "{m}"),
            FieldValue::Ipv4(a) => write!(f, "{a}"),
            FieldValue::Ipv6(a) => write!(f, "{a}"),
            FieldValue::Bytes(b) => {
                for byte in b.iter().take(BYTES_PREVIEW) {
                    write!(f, "{byte:02x}")?;
                }
                if b.len() > BYTES_PREVIEW {
                    f.write_str("..")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for FieldValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::U8(v) => serializer.serialize_u8(*v),
            FieldValue::U16(v) => serializer.serialize_u16(*v),
            FieldValue::U32(v) => serializer.serialize_u32(*v),
            FieldValue::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                serializer.serialize_str(&hex)
            }
            _ => serializer.collect_str(self),
        }
    }
}

/// One decoded protocol level
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Layer<'a> {
    pub name: &'static str,
    #[serde(serialize_with = "fields_as_map")]
    pub fields: Vec<(&'static str, FieldValue<'a>)>,
    /// The captured bytes ended inside this header
    pub incomplete: bool,
}

fn fields_as_map<S: Serializer>(
    fields: &[(&'static str, FieldValue<'_>)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (k, v) in fields {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

impl<'a> Layer<'a> {
    pub fn new(name: &'static str) -> Layer<'a> {
        Layer {
            name,
            fields: Vec::new(),
            incomplete: false,
        }
    }

    /// Append a field (builder style)
    pub fn with(mut self, name: &'static str, value: FieldValue<'a>) -> Layer<'a> {
        self.fields.push((name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue<'a>> {
        self.fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

impl fmt::Display for Layer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name)?;
        for (k, v) in &self.fields {
            write!(f, " {k}={v}")?;
        }
        if self.incomplete {
            f.write_str(" [incomplete]")?;
        }
        Ok(())
    }
}

/// Read-only projection of a frame as a list of layers, outer first
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DecodedPacket<'a> {
    pub layers: Vec<Layer<'a>>,
}

impl<'a> DecodedPacket<'a> {
    /// First layer with this name
    pub fn layer(&self, name: &str) -> Option<&Layer<'a>> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// True if decoding stopped on a truncated header
    pub fn is_incomplete(&self) -> bool {
        self.layers.last().map(|l| l.incomplete).unwrap_or(false)
    }
}

impl fmt::Display for DecodedPacket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{layer}")?;
        }
        Ok(())
    }
}

/// Per-frame decoding failure, never fatal for a capture run
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty frame")]
    EmptyFrame,
}

/// Decode a frame into its layers
///
/// The frame is not modified, and decoding the same frame twice gives the
/// same result.
pub fn decode(frame: &Frame) -> Result<DecodedPacket<'_>, DecodeError> {
    decode_data(&frame.data, frame.link_type)
}

/// Decode raw bytes captured with `link_type`
pub fn decode_data(data: &[u8], link_type: LinkType) -> Result<DecodedPacket<'_>, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }
    let mut data = data;
    let mut offset = 0;
    let mut tag = registry::start_tag(link_type, data);
    let mut layers = Vec::new();
    while let Some(decoder) = registry::lookup(tag) {
        match decoder(data, offset) {
            Ok(step) => {
                layers.push(step.layer);
                // trailing padding is not part of the inner layers
                if step.end < data.len() {
                    data = &data[..step.end];
                }
                offset = step.next_offset.min(data.len());
                tag = step.next;
            }
            Err(truncated) => {
                debug!(
                    "{}: truncated header ({} bytes needed, {} available)",
                    truncated.name, truncated.needed, truncated.available
                );
                layers.push(truncated.into_layer());
                return Ok(DecodedPacket { layers });
            }
        }
    }
    if offset < data.len() {
        layers.push(payload_layer(&data[offset..]));
    }
    Ok(DecodedPacket { layers })
}

fn payload_layer(data: &[u8]) -> Layer<'_> {
    Layer::new("payload")
        .with("length", FieldValue::U32(data.len() as u32))
        .with("data", FieldValue::Bytes(data))
}
