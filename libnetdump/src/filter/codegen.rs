use super::parser::Term;
use super::program::{Insn, Program, ACCEPT};
use libnetdump_tools::{Error, LinkType};
use pnet_packet::ethernet::EtherTypes;
use pnet_packet::ip::IpNextHeaderProtocols;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

/// How the network layer is identified for a link type
#[derive(Clone, Copy, Debug)]
enum Selector {
    /// 16-bit ethertype at this offset
    EtherType(u32),
    /// IP version in the high nibble of the first network byte
    VersionNibble,
    /// Only one family can be carried
    Fixed(Family),
}

/// Header layout implied by a link type
#[derive(Clone, Copy, Debug)]
struct Layout {
    /// Offset of the network header
    l3: u32,
    selector: Selector,
}

impl Layout {
    fn for_link_type(link_type: LinkType) -> Result<Layout, Error> {
        let layout = match link_type {
            LinkType::Ethernet => Layout {
                l3: 14,
                selector: Selector::EtherType(12),
            },
            LinkType::LinuxSll => Layout {
                l3: 16,
                selector: Selector::EtherType(14),
            },
            // the address family is in host byte order, look at the IP header instead
            LinkType::Null => Layout {
                l3: 4,
                selector: Selector::VersionNibble,
            },
            LinkType::Raw => Layout {
                l3: 0,
                selector: Selector::VersionNibble,
            },
            LinkType::Ipv4 => Layout {
                l3: 0,
                selector: Selector::Fixed(Family::V4),
            },
            LinkType::Ipv6 => Layout {
                l3: 0,
                selector: Selector::Fixed(Family::V6),
            },
            LinkType::Other(_) => return Err(Error::UnsupportedLinkType(link_type)),
        };
        Ok(layout)
    }

    fn families(&self) -> &'static [Family] {
        match self.selector {
            Selector::Fixed(Family::V4) => &[Family::V4],
            Selector::Fixed(Family::V6) => &[Family::V6],
            _ => &[Family::V4, Family::V6],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Label(usize);

/// Jump target, resolved when the program is assembled
#[derive(Clone, Copy, Debug)]
enum PendingInsn {
    Plain(Insn),
    Ja(Label),
    Jeq { k: u32, jt: Label, jf: Label },
    Jset { k: u32, jt: Label, jf: Label },
}

#[derive(Default)]
struct Assembler {
    code: Vec<PendingInsn>,
    labels: Vec<Option<usize>>,
}

impl Assembler {
    fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Attach `label` to the next emitted instruction
    fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len());
    }

    fn emit(&mut self, insn: Insn) {
        self.code.push(PendingInsn::Plain(insn));
    }

    fn ja(&mut self, target: Label) {
        self.code.push(PendingInsn::Ja(target));
    }

    fn jeq(&mut self, k: u32, jt: Label, jf: Label) {
        self.code.push(PendingInsn::Jeq { k, jt, jf });
    }

    fn jset(&mut self, k: u32, jt: Label, jf: Label) {
        self.code.push(PendingInsn::Jset { k, jt, jf });
    }

    fn resolve(&self, label: Label) -> Result<usize, Error> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or(Error::Generic("unbound label in filter program"))
    }

    fn assemble(self) -> Result<Program, Error> {
        let mut insns = Vec::with_capacity(self.code.len());
        for pending in &self.code {
            let insn = match *pending {
                PendingInsn::Plain(insn) => insn,
                PendingInsn::Ja(t) => Insn::Ja(self.resolve(t)?),
                PendingInsn::Jeq { k, jt, jf } => Insn::Jeq {
                    k,
                    jt: self.resolve(jt)?,
                    jf: self.resolve(jf)?,
                },
                PendingInsn::Jset { k, jt, jf } => Insn::Jset {
                    k,
                    jt: self.resolve(jt)?,
                    jf: self.resolve(jf)?,
                },
            };
            insns.push(insn);
        }
        Program::new(insns).map_err(Error::Generic)
    }
}

const IPV4_PROTO: u32 = 9;
const IPV4_FRAG: u32 = 6;
const IPV6_NEXT_HEADER: u32 = 6;
const IPV6_HEADER_LEN: u32 = 40;

struct Generator {
    asm: Assembler,
    layout: Layout,
    reject: Label,
}

impl Generator {
    /// Fall through if the network layer is `family`, jump to `miss` otherwise
    fn family_test(&mut self, family: Family, miss: Label) {
        let (ethertype, version) = match family {
            Family::V4 => (EtherTypes::Ipv4.0, 0x40),
            Family::V6 => (EtherTypes::Ipv6.0, 0x60),
        };
        let hit = self.asm.label();
        match self.layout.selector {
            Selector::EtherType(offset) => {
                self.asm.emit(Insn::LdH(offset));
                self.asm.jeq(u32::from(ethertype), hit, miss);
            }
            Selector::VersionNibble => {
                self.asm.emit(Insn::LdB(self.layout.l3));
                self.asm.emit(Insn::And(0xf0));
                self.asm.jeq(version, hit, miss);
            }
            Selector::Fixed(f) if f == family => (),
            Selector::Fixed(_) => self.asm.ja(miss),
        }
        self.asm.bind(hit);
    }

    /// For each possible family, run `body`; `body` must end with jumps only.
    /// Frames of other families are rejected.
    fn per_family<F>(&mut self, families: &[Family], mut body: F)
    where
        F: FnMut(&mut Generator, Family),
    {
        let families: Vec<Family> = families
            .iter()
            .copied()
            .filter(|f| self.layout.families().contains(f))
            .collect();
        if families.is_empty() {
            let reject = self.reject;
            self.asm.ja(reject);
            return;
        }
        for (i, family) in families.iter().enumerate() {
            let miss = if i + 1 == families.len() {
                self.reject
            } else {
                self.asm.label()
            };
            self.family_test(*family, miss);
            body(self, *family);
            if miss != self.reject {
                self.asm.bind(miss);
            }
        }
    }

    fn proto_offset(&self, family: Family) -> u32 {
        match family {
            Family::V4 => self.layout.l3 + IPV4_PROTO,
            Family::V6 => self.layout.l3 + IPV6_NEXT_HEADER,
        }
    }

    fn term(&mut self, term: Term, next: Label) {
        let reject = self.reject;
        match term {
            Term::Ip => self.per_family(&[Family::V4], |g, _| g.asm.ja(next)),
            Term::Ip6 => self.per_family(&[Family::V6], |g, _| g.asm.ja(next)),
            Term::Tcp | Term::Udp => {
                let proto = if term == Term::Tcp {
                    IpNextHeaderProtocols::Tcp.0
                } else {
                    IpNextHeaderProtocols::Udp.0
                };
                self.per_family(&[Family::V4, Family::V6], |g, family| {
                    g.asm.emit(Insn::LdB(g.proto_offset(family)));
                    g.asm.jeq(u32::from(proto), next, reject);
                })
            }
            Term::Icmp => self.per_family(&[Family::V4], |g, family| {
                g.asm.emit(Insn::LdB(g.proto_offset(family)));
                g.asm
                    .jeq(u32::from(IpNextHeaderProtocols::Icmp.0), next, reject);
            }),
            Term::Port(port) => self.per_family(&[Family::V4, Family::V6], |g, family| {
                g.port_test(family, port, next)
            }),
        }
    }

    /// Transport is TCP or UDP, and either port equals `port`
    fn port_test(&mut self, family: Family, port: u16, next: Label) {
        let reject = self.reject;
        let l3 = self.layout.l3;
        let is_transport = self.asm.label();
        let try_udp = self.asm.label();
        self.asm.emit(Insn::LdB(self.proto_offset(family)));
        self.asm
            .jeq(u32::from(IpNextHeaderProtocols::Tcp.0), is_transport, try_udp);
        self.asm.bind(try_udp);
        self.asm
            .jeq(u32::from(IpNextHeaderProtocols::Udp.0), is_transport, reject);
        self.asm.bind(is_transport);

        let check_dst = self.asm.label();
        let port = u32::from(port);
        match family {
            Family::V4 => {
                // ports are only present in the first fragment
                let first_fragment = self.asm.label();
                self.asm.emit(Insn::LdH(l3 + IPV4_FRAG));
                self.asm.jset(0x1fff, reject, first_fragment);
                self.asm.bind(first_fragment);
                self.asm.emit(Insn::LdxMsh(l3));
                self.asm.emit(Insn::LdIndH(l3));
                self.asm.jeq(port, next, check_dst);
                self.asm.bind(check_dst);
                self.asm.emit(Insn::LdIndH(l3 + 2));
                self.asm.jeq(port, next, reject);
            }
            Family::V6 => {
                self.asm.emit(Insn::LdH(l3 + IPV6_HEADER_LEN));
                self.asm.jeq(port, next, check_dst);
                self.asm.bind(check_dst);
                self.asm.emit(Insn::LdH(l3 + IPV6_HEADER_LEN + 2));
                self.asm.jeq(port, next, reject);
            }
        }
    }
}

/// Generate the program testing the conjunction of `terms`
pub(super) fn generate(terms: &[Term], link_type: LinkType) -> Result<Program, Error> {
    let layout = Layout::for_link_type(link_type)?;
    if terms.is_empty() {
        return Ok(Program::accept_all());
    }
    let mut asm = Assembler::default();
    let reject = asm.label();
    let mut g = Generator {
        asm,
        layout,
        reject,
    };
    for term in terms {
        let next = g.asm.label();
        g.term(*term, next);
        g.asm.bind(next);
    }
    g.asm.emit(Insn::Ret(ACCEPT));
    g.asm.bind(reject);
    g.asm.emit(Insn::Ret(0));
    g.asm.assemble()
}
