use super::link::header;
use super::registry::{Step, Tag, Truncated};
use super::{FieldValue, Layer};
use pnet_packet::icmp::IcmpPacket;
use pnet_packet::icmpv6::Icmpv6Packet;
use pnet_packet::tcp::{TcpFlags, TcpPacket};
use pnet_packet::udp::UdpPacket;

const TCP_MIN_HEADER: usize = 20;
const UDP_HEADER: usize = 8;
const ICMP_HEADER: usize = 4;

/// Flags in tcpdump notation, `.` standing for ACK
fn tcp_flags(tcp: &TcpPacket) -> FieldValue<'static> {
    let flags = tcp.get_flags();
    let mut s = String::new();
    for (flag, c) in [
        (TcpFlags::SYN, 'S'),
        (TcpFlags::FIN, 'F'),
        (TcpFlags::PSH, 'P'),
        (TcpFlags::RST, 'R'),
        (TcpFlags::URG, 'U'),
        (TcpFlags::ECE, 'E'),
        (TcpFlags::CWR, 'W'),
        (TcpFlags::ACK, '.'),
    ] {
        if flags & flag != 0 {
            s.push(c);
        }
    }
    if s.is_empty() {
        s.push_str("none");
    }
    FieldValue::Text(s)
}

pub fn decode_tcp(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let tcp =
        TcpPacket::new(buf).ok_or_else(|| Truncated::new("tcp", TCP_MIN_HEADER, buf.len()))?;
    let hlen = usize::from(tcp.get_data_offset()) * 4;
    if hlen < TCP_MIN_HEADER {
        return Err(Truncated::new("tcp", TCP_MIN_HEADER, hlen));
    }
    if hlen > buf.len() {
        return Err(Truncated::new("tcp", hlen, buf.len()));
    }
    let layer = Layer::new("tcp")
        .with("sport", FieldValue::U16(tcp.get_source()))
        .with("dport", FieldValue::U16(tcp.get_destination()))
        .with("flags", tcp_flags(&tcp))
        .with("seq", FieldValue::U32(tcp.get_sequence()))
        .with("ack", FieldValue::U32(tcp.get_acknowledgement()))
        .with("win", FieldValue::U16(tcp.get_window()));
    Ok(Step {
        layer,
        next_offset: offset + hlen,
        end: data.len(),
        next: Tag::End,
    })
}

pub fn decode_udp(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let udp = UdpPacket::new(buf).ok_or_else(|| Truncated::new("udp", UDP_HEADER, buf.len()))?;
    let length = usize::from(udp.get_length());
    let end = if length >= UDP_HEADER && length < buf.len() {
        offset + length
    } else {
        data.len()
    };
    let layer = Layer::new("udp")
        .with("sport", FieldValue::U16(udp.get_source()))
        .with("dport", FieldValue::U16(udp.get_destination()))
        .with("len", FieldValue::U16(udp.get_length()));
    Ok(Step {
        layer,
        next_offset: offset + UDP_HEADER,
        end,
        next: Tag::End,
    })
}

pub fn decode_icmp(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let icmp =
        IcmpPacket::new(buf).ok_or_else(|| Truncated::new("icmp", ICMP_HEADER, buf.len()))?;
    let icmp_type = icmp.get_icmp_type().0;
    let mut layer = Layer::new("icmp")
        .with("type", FieldValue::U8(icmp_type))
        .with("code", FieldValue::U8(icmp.get_icmp_code().0));
    let mut next_offset = offset + ICMP_HEADER;
    // echo reply / echo request carry an identifier and a sequence number
    if (icmp_type == 0 || icmp_type == 8) && buf.len() >= ICMP_HEADER + 4 {
        layer = layer
            .with("id", FieldValue::U16(u16::from_be_bytes([buf[4], buf[5]])))
            .with("seq", FieldValue::U16(u16::from_be_bytes([buf[6], buf[7]])));
        next_offset += 4;
    }
    Ok(Step {
        layer,
        next_offset,
        end: data.len(),
        next: Tag::End,
    })
}

pub fn decode_icmpv6(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let icmpv6 = Icmpv6Packet::new(buf)
        .ok_or_else(|| Truncated::new("icmpv6", ICMP_HEADER, buf.len()))?;
    let layer = Layer::new("icmpv6")
        .with("type", FieldValue::U8(icmpv6.get_icmpv6_type().0))
        .with("code", FieldValue::U8(icmpv6.get_icmpv6_code().0));
    Ok(Step {
        layer,
        next_offset: offset + ICMP_HEADER,
        end: data.len(),
        next: Tag::End,
    })
}
