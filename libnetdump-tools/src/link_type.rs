use pcap_parser::Linktype;
use serde::Serialize;
use std::fmt;

/// How to interpret the first bytes of a captured frame
///
/// Values follow the tcpdump.org `LINKTYPE_*` registry, which is also what is
/// stored in capture file headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LinkType {
    /// BSD loopback: 4-byte address family in host byte order
    Null,
    Ethernet,
    /// Raw IP, version taken from the first nibble
    Raw,
    /// Linux "cooked" capture (SLL)
    LinuxSll,
    Ipv4,
    Ipv6,
    Other(i32),
}

impl LinkType {
    pub const fn from_raw(value: i32) -> LinkType {
        match value {
            0 => LinkType::Null,
            1 => LinkType::Ethernet,
            101 => LinkType::Raw,
            113 => LinkType::LinuxSll,
            228 => LinkType::Ipv4,
            229 => LinkType::Ipv6,
            v => LinkType::Other(v),
        }
    }

    pub const fn raw(self) -> i32 {
        match self {
            LinkType::Null => 0,
            LinkType::Ethernet => 1,
            LinkType::Raw => 101,
            LinkType::LinuxSll => 113,
            LinkType::Ipv4 => 228,
            LinkType::Ipv6 => 229,
            LinkType::Other(v) => v,
        }
    }
}

impl From<Linktype> for LinkType {
    fn from(l: Linktype) -> Self {
        LinkType::from_raw(l.0)
    }
}

impl From<LinkType> for Linktype {
    fn from(l: LinkType) -> Self {
        Linktype(l.raw())
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkType::Null => f.write_str("NULL"),
            LinkType::Ethernet => f.write_str("EN10MB"),
            LinkType::Raw => f.write_str("RAW"),
            LinkType::LinuxSll => f.write_str("LINUX_SLL"),
            LinkType::Ipv4 => f.write_str("IPV4"),
            LinkType::Ipv6 => f.write_str("IPV6"),
            LinkType::Other(v) => write!(f, "{v}"),
        }
    }
}
