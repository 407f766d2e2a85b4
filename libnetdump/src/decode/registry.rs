//! Mapping from protocol tags to layer decoders

use super::{ip, link, transport, FieldValue, Layer};
use libnetdump_tools::LinkType;
use pnet_packet::ethernet::EtherTypes;
use pnet_packet::ip::IpNextHeaderProtocols;

/// Discriminant selecting the decoder of the next layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    Link(LinkType),
    EtherType(u16),
    IpProto(u8),
    /// Nothing more can be decoded, the remaining bytes are payload
    End,
}

/// Successful decoding of one header
#[derive(Debug)]
pub struct Step<'a> {
    pub layer: Layer<'a>,
    /// Offset of the next header
    pub next_offset: usize,
    /// End of the data covered by this layer. Bytes after it (e.g. Ethernet
    /// padding) are ignored by the following layers.
    pub end: usize,
    pub next: Tag,
}

/// The captured bytes are too short for the header
#[derive(Debug)]
pub struct Truncated {
    pub name: &'static str,
    pub needed: usize,
    pub available: usize,
}

impl Truncated {
    pub fn new(name: &'static str, needed: usize, available: usize) -> Truncated {
        Truncated {
            name,
            needed,
            available,
        }
    }

    /// Layer reporting the truncation
    pub fn into_layer<'a>(self) -> Layer<'a> {
        let mut layer = Layer::new(self.name)
            .with("needed", FieldValue::U32(self.needed as u32))
            .with("available", FieldValue::U32(self.available as u32));
        layer.incomplete = true;
        layer
    }
}

/// A layer decoder: parse the header starting at `offset` in `data`
pub type DecodeFn = for<'a> fn(&'a [u8], usize) -> Result<Step<'a>, Truncated>;

static REGISTRY: &[(Tag, DecodeFn)] = &[
    (Tag::Link(LinkType::Ethernet), link::decode_ethernet),
    (Tag::Link(LinkType::LinuxSll), link::decode_sll),
    (Tag::Link(LinkType::Null), link::decode_null),
    (Tag::EtherType(EtherTypes::Vlan.0), link::decode_vlan),
    // 802.1ad service tag
    (Tag::EtherType(0x88a8), link::decode_vlan),
    (Tag::EtherType(EtherTypes::Arp.0), link::decode_arp),
    (Tag::EtherType(EtherTypes::Ipv4.0), ip::decode_ipv4),
    (Tag::EtherType(EtherTypes::Ipv6.0), ip::decode_ipv6),
    (Tag::IpProto(IpNextHeaderProtocols::Hopopt.0), ip::decode_ipv6_hopopts),
    (Tag::IpProto(IpNextHeaderProtocols::Ipv6Route.0), ip::decode_ipv6_routing),
    (Tag::IpProto(IpNextHeaderProtocols::Ipv6Frag.0), ip::decode_ipv6_fragment),
    (Tag::IpProto(IpNextHeaderProtocols::Ipv6Opts.0), ip::decode_ipv6_dstopts),
    (Tag::IpProto(IpNextHeaderProtocols::Ipv4.0), ip::decode_ipv4),
    (Tag::IpProto(IpNextHeaderProtocols::Ipv6.0), ip::decode_ipv6),
    (Tag::IpProto(IpNextHeaderProtocols::Tcp.0), transport::decode_tcp),
    (Tag::IpProto(IpNextHeaderProtocols::Udp.0), transport::decode_udp),
    (Tag::IpProto(IpNextHeaderProtocols::Icmp.0), transport::decode_icmp),
    (Tag::IpProto(IpNextHeaderProtocols::Icmpv6.0), transport::decode_icmpv6),
];

/// Find the decoder for `tag`
pub fn lookup(tag: Tag) -> Option<DecodeFn> {
    REGISTRY
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, decoder)| *decoder)
}

/// First tag to decode for a frame of type `link_type`
///
/// Link types without a link header go straight to the network layer.
pub fn start_tag(link_type: LinkType, data: &[u8]) -> Tag {
    match link_type {
        LinkType::Ethernet | LinkType::LinuxSll | LinkType::Null => Tag::Link(link_type),
        LinkType::Ipv4 => Tag::EtherType(EtherTypes::Ipv4.0),
        LinkType::Ipv6 => Tag::EtherType(EtherTypes::Ipv6.0),
        LinkType::Raw => match data.first().map(|b| b >> 4) {
            Some(4) => Tag::EtherType(EtherTypes::Ipv4.0),
            Some(6) => Tag::EtherType(EtherTypes::Ipv6.0),
            _ => Tag::End,
        },
        LinkType::Other(_) => Tag::End,
    }
}
