#[derive(PartialEq)]
/// A structure enabling manipulation of on the wire packets
///
/// BSD loopback header (LINKTYPE_NULL): a 4-byte address family, stored in
/// the byte order of the host which captured the packet.
pub struct NullPacket<'p> {
    packet: ::pnet_macros_support::packet::PacketData<'p>,
}

/// Address families seen in loopback captures
#[allow(non_snake_case)]
#[allow(non_upper_case_globals)]
pub mod NullFamilies {
    pub const Inet: u32 = 2;
    /// NetBSD, OpenBSD
    pub const Inet6Bsd: u32 = 24;
    /// FreeBSD, DragonFly BSD
    pub const Inet6FreeBsd: u32 = 28;
    /// Darwin
    pub const Inet6Darwin: u32 = 30;
}

impl<'a> NullPacket<'a> {
    /// Constructs a new NullPacket. If the provided buffer is less than the minimum required
    /// packet size, this will return None.
    #[inline]
    pub fn new(packet: &[u8]) -> Option<NullPacket> {
        if packet.len() >= NullPacket::minimum_packet_size() {
            use ::pnet_macros_support::packet::PacketData;
            Some(NullPacket {
                packet: PacketData::Borrowed(packet),
            })
        } else {
            None
        }
    }
    /// The minimum size (in bytes) a packet of this type can be.
    #[inline]
    pub const fn minimum_packet_size() -> usize {
        4
    }
    /// Get the address family.
    ///
    /// Families are small numbers, so the byte order is guessed: if the
    /// first two bytes are zero the value was written big-endian.
    #[inline]
    pub fn get_family(&self) -> u32 {
        let b = [
            self.packet[0],
            self.packet[1],
            self.packet[2],
            self.packet[3],
        ];
        if b[0] == 0 && b[1] == 0 {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        }
    }
    /// Get the ethertype corresponding to the address family, if known
    pub fn get_ethertype(&self) -> Option<u16> {
        match self.get_family() {
            NullFamilies::Inet => Some(0x0800),
            NullFamilies::Inet6Bsd | NullFamilies::Inet6FreeBsd | NullFamilies::Inet6Darwin => {
                Some(0x86dd)
            }
            _ => None,
        }
    }
}

impl<'a> ::pnet_macros_support::packet::Packet for NullPacket<'a> {
    #[inline]
    fn packet(&self) -> &[u8] {
        &self.packet[..]
    }
    #[inline]
    fn payload(&self) -> &[u8] {
        &self.packet[NullPacket::minimum_packet_size()..]
    }
}
