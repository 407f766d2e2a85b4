use super::link::header;
use super::registry::{Step, Tag, Truncated};
use super::{FieldValue, Layer};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{Ipv4Flags, Ipv4Packet};
use pnet_packet::ipv6::Ipv6Packet;

const IPV4_MIN_HEADER: usize = 20;
const IPV6_HEADER: usize = 40;
const IPV6_EXT_MIN: usize = 8;

fn ipv4_flags(flags: u8) -> FieldValue<'static> {
    let mut s = String::new();
    if flags & Ipv4Flags::DontFragment != 0 {
        s.push_str("DF");
    }
    if flags & Ipv4Flags::MoreFragments != 0 {
        if !s.is_empty() {
            s.push('+');
        }
        s.push_str("MF");
    }
    if s.is_empty() {
        s.push('-');
    }
    FieldValue::Text(s)
}

/// Header which cannot be decoded as `name`: decoding stops, and its bytes
/// are left to the payload layer
fn malformed<'a>(
    name: &'static str,
    data: &[u8],
    offset: usize,
    version: u8,
    reason: &'static str,
) -> Step<'a> {
    let layer = Layer::new(name)
        .with("version", FieldValue::U8(version))
        .with("error", FieldValue::Str(reason));
    Step {
        layer,
        next_offset: offset,
        end: data.len(),
        next: Tag::End,
    }
}

/// IPv6 extension headers cannot follow an IPv4 header
fn ipv4_next(l4_proto: u8) -> Tag {
    match l4_proto {
        p if p == IpNextHeaderProtocols::Hopopt.0
            || p == IpNextHeaderProtocols::Ipv6Route.0
            || p == IpNextHeaderProtocols::Ipv6Frag.0
            || p == IpNextHeaderProtocols::Ipv6Opts.0 =>
        {
            Tag::End
        }
        p => Tag::IpProto(p),
    }
}

pub fn decode_ipv4(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let ipv4 = Ipv4Packet::new(buf)
        .ok_or_else(|| Truncated::new("ipv4", IPV4_MIN_HEADER, buf.len()))?;
    let hlen = usize::from(ipv4.get_header_length()) * 4;
    if ipv4.get_version() != 4 {
        return Ok(malformed("ipv4", data, offset, ipv4.get_version(), "bad version"));
    }
    if hlen < IPV4_MIN_HEADER {
        return Ok(malformed("ipv4", data, offset, 4, "bad header length"));
    }
    if hlen > buf.len() {
        return Err(Truncated::new("ipv4", hlen, buf.len()));
    }

    // remove padding
    let total_length = usize::from(ipv4.get_total_length());
    let end = if total_length >= hlen && total_length < buf.len() {
        offset + total_length
    } else {
        data.len()
    };

    let l4_proto = ipv4.get_next_level_protocol().0;
    let frag_offset = ipv4.get_fragment_offset();
    let layer = Layer::new("ipv4")
        .with("src", FieldValue::Ipv4(ipv4.get_source()))
        .with("dst", FieldValue::Ipv4(ipv4.get_destination()))
        .with("ttl", FieldValue::U8(ipv4.get_ttl()))
        .with("proto", FieldValue::U8(l4_proto))
        .with("len", FieldValue::U16(ipv4.get_total_length()))
        .with("id", FieldValue::U16(ipv4.get_identification()))
        .with("flags", ipv4_flags(ipv4.get_flags()))
        .with("frag", FieldValue::U16(frag_offset));
    // non-first fragments do not start with the L4 header
    let next = if frag_offset == 0 {
        ipv4_next(l4_proto)
    } else {
        Tag::End
    };
    Ok(Step {
        layer,
        next_offset: offset + hlen,
        end,
        next,
    })
}

pub fn decode_ipv6(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let ipv6 =
        Ipv6Packet::new(buf).ok_or_else(|| Truncated::new("ipv6", IPV6_HEADER, buf.len()))?;
    if ipv6.get_version() != 6 {
        return Ok(malformed("ipv6", data, offset, ipv6.get_version(), "bad version"));
    }
    // a zero payload length is used by jumbograms, keep everything
    let payload_length = usize::from(ipv6.get_payload_length());
    let end = if payload_length > 0 && IPV6_HEADER + payload_length < buf.len() {
        offset + IPV6_HEADER + payload_length
    } else {
        data.len()
    };
    let next_header = ipv6.get_next_header().0;
    let layer = Layer::new("ipv6")
        .with("src", FieldValue::Ipv6(ipv6.get_source()))
        .with("dst", FieldValue::Ipv6(ipv6.get_destination()))
        .with("hlim", FieldValue::U8(ipv6.get_hop_limit()))
        .with("next", FieldValue::U8(next_header))
        .with("plen", FieldValue::U16(ipv6.get_payload_length()))
        .with("flow", FieldValue::U32(ipv6.get_flow_label()));
    Ok(Step {
        layer,
        next_offset: offset + IPV6_HEADER,
        end,
        next: Tag::IpProto(next_header),
    })
}

/// Options headers (hop-by-hop, routing, destination options) share the
/// same layout: next header, length in 8-octet units not counting the first
fn decode_ipv6_ext<'a>(
    name: &'static str,
    data: &'a [u8],
    offset: usize,
) -> Result<Step<'a>, Truncated> {
    let buf = header(data, offset);
    if buf.len() < IPV6_EXT_MIN {
        return Err(Truncated::new(name, IPV6_EXT_MIN, buf.len()));
    }
    let next_header = buf[0];
    let len = (usize::from(buf[1]) + 1) * 8;
    if len > buf.len() {
        return Err(Truncated::new(name, len, buf.len()));
    }
    let layer = Layer::new(name)
        .with("next", FieldValue::U8(next_header))
        .with("len", FieldValue::U16(len as u16));
    Ok(Step {
        layer,
        next_offset: offset + len,
        end: data.len(),
        next: Tag::IpProto(next_header),
    })
}

pub fn decode_ipv6_hopopts(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    decode_ipv6_ext("ipv6-hopopts", data, offset)
}

pub fn decode_ipv6_routing(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    decode_ipv6_ext("ipv6-routing", data, offset)
}

pub fn decode_ipv6_dstopts(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    decode_ipv6_ext("ipv6-dstopts", data, offset)
}

pub fn decode_ipv6_fragment(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    if buf.len() < IPV6_EXT_MIN {
        return Err(Truncated::new("ipv6-frag", IPV6_EXT_MIN, buf.len()));
    }
    let next_header = buf[0];
    let offset_flags = u16::from_be_bytes([buf[2], buf[3]]);
    let frag_offset = offset_flags >> 3;
    let more = offset_flags & 1 != 0;
    let id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let layer = Layer::new("ipv6-frag")
        .with("next", FieldValue::U8(next_header))
        .with("frag", FieldValue::U16(frag_offset))
        .with("flags", FieldValue::Str(if more { "MF" } else { "-" }))
        .with("id", FieldValue::U32(id));
    let next = if frag_offset == 0 {
        Tag::IpProto(next_header)
    } else {
        Tag::End
    };
    Ok(Step {
        layer,
        next_offset: offset + IPV6_EXT_MIN,
        end: data.len(),
        next,
    })
}
