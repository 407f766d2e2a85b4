use pnet_macros_support::types::u16be;

#[derive(PartialEq)]
/// A structure enabling manipulation of on the wire packets
///
/// Linux "cooked" capture header (LINKTYPE_LINUX_SLL)
pub struct SllPacket<'p> {
    packet: ::pnet_macros_support::packet::PacketData<'p>,
}

/// Sll packet types, describing how the packet was addressed
#[allow(non_snake_case)]
#[allow(non_upper_case_globals)]
pub mod SllPacketTypes {
    /// Sent to us
    pub const Host: u16 = 0;
    pub const Broadcast: u16 = 1;
    pub const Multicast: u16 = 2;
    /// Sent by somebody else to somebody else
    pub const OtherHost: u16 = 3;
    /// Sent by us
    pub const Outgoing: u16 = 4;
}

impl<'a> SllPacket<'a> {
    /// Constructs a new SllPacket. If the provided buffer is less than the minimum required
    /// packet size, this will return None.
    #[inline]
    pub fn new(packet: &[u8]) -> Option<SllPacket> {
        if packet.len() >= SllPacket::minimum_packet_size() {
            use ::pnet_macros_support::packet::PacketData;
            Some(SllPacket {
                packet: PacketData::Borrowed(packet),
            })
        } else {
            None
        }
    }
    /// The minimum size (in bytes) a packet of this type can be. It's based on the total size
    /// of the fixed-size fields.
    #[inline]
    pub const fn minimum_packet_size() -> usize {
        16
    }
    #[inline]
    fn get_u16(&self, co: usize) -> u16be {
        ((self.packet[co] as u16be) << 8) | self.packet[co + 1] as u16be
    }
    /// Get the packet type field.
    #[inline]
    pub fn get_packet_type(&self) -> u16be {
        self.get_u16(0)
    }
    /// Get the ARPHRD_ type of the link-layer device
    #[inline]
    pub fn get_hatype(&self) -> u16be {
        self.get_u16(2)
    }
    /// Get the link-layer address length field.
    #[inline]
    pub fn get_halen(&self) -> u16be {
        self.get_u16(4)
    }
    /// Get the link-layer address, truncated to its length (at most 8 bytes)
    #[inline]
    pub fn get_address(&self) -> &[u8] {
        let len = std::cmp::min(self.get_halen() as usize, 8);
        &self.packet[6..6 + len]
    }
    /// Get the protocol field (an ethertype for most packets)
    #[inline]
    pub fn get_protocol(&self) -> u16be {
        self.get_u16(14)
    }
}

impl<'a> ::pnet_macros_support::packet::Packet for SllPacket<'a> {
    #[inline]
    fn packet(&self) -> &[u8] {
        &self.packet[..]
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        &self.packet[SllPacket::minimum_packet_size()..]
    }
}
