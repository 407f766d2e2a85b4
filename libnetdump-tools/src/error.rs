use crate::link_type::LinkType;
use std::fmt;
use std::io;
use thiserror::Error;

/// Stage of a capture run in which a fatal error occurred
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Open,
    Activate,
    Filter,
    Capture,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Stage::Open => "open",
            Stage::Activate => "activate",
            Stage::Filter => "filter",
            Stage::Capture => "capture",
            Stage::Write => "write",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("activation failed: {0}")]
    ActivationFailed(String),
    #[error("invalid filter expression: {0}")]
    InvalidExpression(String),
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(LinkType),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("handle is not activated")]
    NotActivated,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Generic(&'static str),
}

impl Error {
    /// Stage to report when this error ends a run
    pub fn stage(&self) -> Stage {
        match self {
            Error::SourceUnavailable(_) => Stage::Open,
            Error::ActivationFailed(_) => Stage::Activate,
            Error::InvalidExpression(_) | Error::UnsupportedLinkType(_) => Stage::Filter,
            Error::WriteFailed(_) => Stage::Write,
            Error::ReadFailed(_) | Error::NotActivated | Error::Io(_) | Error::Generic(_) => {
                Stage::Capture
            }
        }
    }
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error::Generic(s)
    }
}
