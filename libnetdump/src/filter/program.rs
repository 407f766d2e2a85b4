//! A tiny subset of classic BPF, evaluated in userspace
//!
//! There are two registers: the accumulator `A` and the index register `X`.
//! Jump targets are absolute instruction indexes and always point forward,
//! so a program terminates after at most `len()` steps.

use std::fmt;

/// Value returned by an accepting program
pub const ACCEPT: u32 = 262_144;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insn {
    /// `A = data[k]`
    LdB(u32),
    /// `A = be16(data[k..k + 2])`
    LdH(u32),
    /// `A = be16(data[X + k..X + k + 2])`
    LdIndH(u32),
    /// `X = 4 * (data[k] & 0xf)`, the IPv4 header length
    LdxMsh(u32),
    /// `A &= k`
    And(u32),
    Ja(usize),
    Jeq { k: u32, jt: usize, jf: usize },
    /// Jump to `jt` if `A & k != 0`
    Jset { k: u32, jt: usize, jf: usize },
    /// Stop, accepting the packet if the value is not zero
    Ret(u32),
}

impl Insn {
    fn targets(&self) -> Option<(usize, usize)> {
        match *self {
            Insn::Ja(t) => Some((t, t)),
            Insn::Jeq { jt, jf, .. } | Insn::Jset { jt, jf, .. } => Some((jt, jf)),
            _ => None,
        }
    }
}

/// A validated filter program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    insns: Vec<Insn>,
}

impl Program {
    /// Wrap instructions, checking that every jump goes forward and stays in
    /// the program, and that the last instruction returns
    pub fn new(insns: Vec<Insn>) -> Result<Program, &'static str> {
        match insns.last() {
            Some(Insn::Ret(_)) => (),
            _ => return Err("filter program must end with ret"),
        }
        for (pc, insn) in insns.iter().enumerate() {
            if let Some((jt, jf)) = insn.targets() {
                if jt <= pc || jf <= pc || jt >= insns.len() || jf >= insns.len() {
                    return Err("invalid jump in filter program");
                }
            }
        }
        Ok(Program { insns })
    }

    /// Program accepting every packet
    pub fn accept_all() -> Program {
        Program {
            insns: vec![Insn::Ret(ACCEPT)],
        }
    }

    pub fn instructions(&self) -> &[Insn] {
        &self.insns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Run the program on `data`
    ///
    /// A load outside of `data` rejects the packet, like the kernel
    /// interpreter does.
    pub fn execute(&self, data: &[u8]) -> u32 {
        let mut a: u32 = 0;
        let mut x: u32 = 0;
        let mut pc = 0;
        while let Some(insn) = self.insns.get(pc) {
            pc += 1;
            match *insn {
                Insn::LdB(k) => match load_u8(data, k as usize) {
                    Some(v) => a = u32::from(v),
                    None => return 0,
                },
                Insn::LdH(k) => match load_u16(data, k as usize) {
                    Some(v) => a = u32::from(v),
                    None => return 0,
                },
                Insn::LdIndH(k) => {
                    let offset = (x as usize).checked_add(k as usize);
                    match offset.and_then(|o| load_u16(data, o)) {
                        Some(v) => a = u32::from(v),
                        None => return 0,
                    }
                }
                Insn::LdxMsh(k) => match load_u8(data, k as usize) {
                    Some(v) => x = 4 * u32::from(v & 0xf),
                    None => return 0,
                },
                Insn::And(k) => a &= k,
                Insn::Ja(t) => pc = t,
                Insn::Jeq { k, jt, jf } => pc = if a == k { jt } else { jf },
                Insn::Jset { k, jt, jf } => pc = if a & k != 0 { jt } else { jf },
                Insn::Ret(v) => return v,
            }
        }
        0
    }

    /// True if the program accepts `data`
    #[inline]
    pub fn matches(&self, data: &[u8]) -> bool {
        self.execute(data) != 0
    }
}

#[inline]
fn load_u8(data: &[u8], offset: usize) -> Option<u8> {
    data.get(offset).copied()
}

#[inline]
fn load_u16(data: &[u8], offset: usize) -> Option<u16> {
    let end = offset.checked_add(2)?;
    let b = data.get(offset..end)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Insn::LdB(k) => write!(f, "{:<8} [{k}]", "ldb"),
            Insn::LdH(k) => write!(f, "{:<8} [{k}]", "ldh"),
            Insn::LdIndH(k) => write!(f, "{:<8} [x + {k}]", "ldh"),
            Insn::LdxMsh(k) => write!(f, "{:<8} 4*([{k}]&0xf)", "ldxb"),
            Insn::And(k) => write!(f, "{:<8} #0x{k:x}", "and"),
            Insn::Ja(t) => write!(f, "{:<8} {t}", "ja"),
            Insn::Jeq { k, jt, jf } => {
                write!(f, "{:<8} {:<16} jt {jt}\tjf {jf}", "jeq", format!("#0x{k:x}"))
            }
            Insn::Jset { k, jt, jf } => {
                write!(f, "{:<8} {:<16} jt {jt}\tjf {jf}", "jset", format!("#0x{k:x}"))
            }
            Insn::Ret(v) => write!(f, "{:<8} #{v}", "ret"),
        }
    }
}

/// Disassembly, one instruction per line
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (pc, insn) in self.insns.iter().enumerate() {
            writeln!(f, "({pc:03}) {insn}")?;
        }
        Ok(())
    }
}
