use libnetdump_tools::Error;
use std::fmt;

/// One primitive of a filter expression
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Term {
    Ip,
    Ip6,
    Tcp,
    Udp,
    Icmp,
    /// TCP or UDP, source or destination port
    Port(u16),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Ip => f.write_str("ip"),
            Term::Ip6 => f.write_str("ip6"),
            Term::Tcp => f.write_str("tcp"),
            Term::Udp => f.write_str("udp"),
            Term::Icmp => f.write_str("icmp"),
            Term::Port(p) => write!(f, "port {p}"),
        }
    }
}

fn invalid<S: Into<String>>(msg: S) -> Error {
    Error::InvalidExpression(msg.into())
}

fn parse_port(token: Option<&str>) -> Result<u16, Error> {
    let token = token.ok_or_else(|| invalid("'port' requires a port number"))?;
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(format!("'{token}' is not a port number")));
    }
    token
        .parse::<u16>()
        .map_err(|_| invalid(format!("port {token} is out of range (0-65535)")))
}

/// Split an expression into its conjoined terms
///
/// Terms are separated by whitespace, optionally joined by `and` or `&&`.
/// An empty (or blank) expression yields no terms.
pub fn parse(expression: &str) -> Result<Vec<Term>, Error> {
    let mut terms = Vec::new();
    let mut tokens = expression.split_whitespace();
    // true right after a connective, or at the start
    let mut after_and = false;
    while let Some(token) = tokens.next() {
        let term = match token {
            "and" | "&&" => {
                if terms.is_empty() || after_and {
                    return Err(invalid(format!("unexpected '{token}'")));
                }
                after_and = true;
                continue;
            }
            "ip" => Term::Ip,
            "ip6" => Term::Ip6,
            "tcp" => Term::Tcp,
            "udp" => Term::Udp,
            "icmp" => Term::Icmp,
            "port" => Term::Port(parse_port(tokens.next())?),
            _ => return Err(invalid(format!("unknown keyword '{token}'"))),
        };
        after_and = false;
        terms.push(term);
    }
    if after_and {
        return Err(invalid("expression ends with a connective"));
    }
    Ok(terms)
}
