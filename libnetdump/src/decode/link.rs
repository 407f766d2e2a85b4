use super::null::NullPacket;
use super::registry::{Step, Tag, Truncated};
use super::sll::{SllPacket, SllPacketTypes};
use super::{FieldValue, Layer};
use pnet_base::MacAddr;
use pnet_packet::arp::ArpPacket;
use pnet_packet::ethernet::EthernetPacket;
use pnet_packet::vlan::VlanPacket;

/// Smallest value of the ethertype field which is not an 802.3 length
const ETHERTYPE_MIN: u16 = 0x0600;

/// Bytes starting at `offset`
#[inline]
pub(super) fn header(data: &[u8], offset: usize) -> &[u8] {
    data.get(offset..).unwrap_or(&[])
}

fn ethertype_tag(ethertype: u16) -> Tag {
    if ethertype >= ETHERTYPE_MIN {
        Tag::EtherType(ethertype)
    } else {
        Tag::End
    }
}

pub fn decode_ethernet(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let eth = EthernetPacket::new(buf).ok_or_else(|| {
        Truncated::new("ethernet", EthernetPacket::minimum_packet_size(), buf.len())
    })?;
    let ethertype = eth.get_ethertype().0;
    let mut layer = Layer::new("ethernet")
        .with("src", FieldValue::Mac(eth.get_source()))
        .with("dst", FieldValue::Mac(eth.get_destination()));
    if ethertype >= ETHERTYPE_MIN {
        layer = layer.with("ethertype", FieldValue::Hex16(ethertype));
    } else {
        // 802.3 frame, followed by LLC
        layer = layer.with("length", FieldValue::U16(ethertype));
    }
    Ok(Step {
        layer,
        next_offset: offset + EthernetPacket::minimum_packet_size(),
        end: data.len(),
        next: ethertype_tag(ethertype),
    })
}

pub fn decode_vlan(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let vlan = VlanPacket::new(buf)
        .ok_or_else(|| Truncated::new("vlan", VlanPacket::minimum_packet_size(), buf.len()))?;
    let ethertype = vlan.get_ethertype().0;
    let layer = Layer::new("vlan")
        .with("id", FieldValue::U16(vlan.get_vlan_identifier()))
        .with("pcp", FieldValue::U8(buf[0] >> 5))
        .with("ethertype", FieldValue::Hex16(ethertype));
    Ok(Step {
        layer,
        next_offset: offset + VlanPacket::minimum_packet_size(),
        end: data.len(),
        next: ethertype_tag(ethertype),
    })
}

fn sll_packet_type(t: u16) -> FieldValue<'static> {
    match t {
        SllPacketTypes::Host => FieldValue::Str("host"),
        SllPacketTypes::Broadcast => FieldValue::Str("broadcast"),
        SllPacketTypes::Multicast => FieldValue::Str("multicast"),
        SllPacketTypes::OtherHost => FieldValue::Str("otherhost"),
        SllPacketTypes::Outgoing => FieldValue::Str("outgoing"),
        _ => FieldValue::U16(t),
    }
}

pub fn decode_sll(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let sll = SllPacket::new(buf)
        .ok_or_else(|| Truncated::new("sll", SllPacket::minimum_packet_size(), buf.len()))?;
    let protocol = sll.get_protocol();
    let address = match *sll.get_address() {
        [a, b, c, d, e, f] => FieldValue::Mac(MacAddr::new(a, b, c, d, e, f)),
        _ => FieldValue::Bytes(&buf[6..6 + sll.get_address().len()]),
    };
    let layer = Layer::new("sll")
        .with("type", sll_packet_type(sll.get_packet_type()))
        .with("hatype", FieldValue::U16(sll.get_hatype()))
        .with("addr", address)
        .with("protocol", FieldValue::Hex16(protocol));
    Ok(Step {
        layer,
        next_offset: offset + SllPacket::minimum_packet_size(),
        end: data.len(),
        next: ethertype_tag(protocol),
    })
}

pub fn decode_null(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let null = NullPacket::new(buf)
        .ok_or_else(|| Truncated::new("null", NullPacket::minimum_packet_size(), buf.len()))?;
    let layer = Layer::new("null").with("family", FieldValue::U32(null.get_family()));
    Ok(Step {
        layer,
        next_offset: offset + NullPacket::minimum_packet_size(),
        end: data.len(),
        next: null.get_ethertype().map(Tag::EtherType).unwrap_or(Tag::End),
    })
}

pub fn decode_arp(data: &[u8], offset: usize) -> Result<Step<'_>, Truncated> {
    let buf = header(data, offset);
    let arp = ArpPacket::new(buf)
        .ok_or_else(|| Truncated::new("arp", ArpPacket::minimum_packet_size(), buf.len()))?;
    let operation = match arp.get_operation().0 {
        1 => FieldValue::Str("request"),
        2 => FieldValue::Str("reply"),
        op => FieldValue::U16(op),
    };
    let layer = Layer::new("arp")
        .with("op", operation)
        .with("sha", FieldValue::Mac(arp.get_sender_hw_addr()))
        .with("spa", FieldValue::Ipv4(arp.get_sender_proto_addr()))
        .with("tha", FieldValue::Mac(arp.get_target_hw_addr()))
        .with("tpa", FieldValue::Ipv4(arp.get_target_proto_addr()));
    let next_offset = offset + ArpPacket::minimum_packet_size();
    Ok(Step {
        layer,
        next_offset,
        // anything after the ARP body is padding
        end: next_offset,
        next: Tag::End,
    })
}
