//! Filter compiler
//!
//! An expression is a conjunction of terms (`tcp`, `udp`, `icmp`, `ip`,
//! `ip6`, `port N`). It is compiled once, for the link type of the source,
//! into a small bytecode [`Program`] which is then evaluated on every frame.
//!
//! ```
//! use libnetdump::filter;
//! use libnetdump_tools::LinkType;
//!
//! let f = filter::compile("tcp port 80", LinkType::Ethernet).expect("valid filter");
//! assert_eq!(f.link_type(), LinkType::Ethernet);
//! ```

mod codegen;
mod parser;
mod program;

pub use parser::{parse, Term};
pub use program::{Insn, Program, ACCEPT};

use libnetdump_tools::{Error, Frame, LinkType};
use tracing::{debug, trace};

/// Executable predicate over frames, bound to one link type
#[derive(Clone, Debug)]
pub struct CompiledFilter {
    link_type: LinkType,
    expression: String,
    program: Program,
}

impl CompiledFilter {
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Test a frame
    ///
    /// Frames captured with another link type never match: header offsets
    /// would be interpreted wrongly. Frames too short for the tested fields
    /// do not match either.
    pub fn matches(&self, frame: &Frame) -> bool {
        if frame.link_type != self.link_type {
            trace!(
                "filter bound to {} applied to a {} frame",
                self.link_type,
                frame.link_type
            );
            return false;
        }
        self.program.matches(&frame.data)
    }
}

/// Compile `expression` for frames of type `link_type`
pub fn compile(expression: &str, link_type: LinkType) -> Result<CompiledFilter, Error> {
    let terms = parse(expression)?;
    compile_terms(&terms, link_type).map(|mut f| {
        f.expression = expression.trim().to_owned();
        f
    })
}

/// Compile already parsed terms
pub fn compile_terms(terms: &[Term], link_type: LinkType) -> Result<CompiledFilter, Error> {
    let program = codegen::generate(terms, link_type)?;
    debug!(
        "compiled filter ({} terms) for {}: {} instructions",
        terms.len(),
        link_type,
        program.len()
    );
    let expression = terms
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(CompiledFilter {
        link_type,
        expression,
        program,
    })
}
