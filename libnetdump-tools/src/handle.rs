use crate::error::Error;
use crate::frame::Frame;
use crate::link_type::LinkType;

/// Result of asking a handle for the next frame
#[derive(Debug)]
pub enum NextFrame {
    Frame(Frame),
    /// The read timeout of a live handle expired with no traffic. Not an error,
    /// the caller is expected to try again.
    TimedOut,
    /// No more frames will ever be produced
    EndOfStream,
}

/// Lifecycle of a capture handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    /// Resolved by `open`, not capturing yet
    Opened,
    Activated,
    /// `activate` failed, the handle cannot be used anymore
    Failed,
    Closed,
}

/// Common contract for packet sources and sinks (capture files, live interfaces)
///
/// A handle is obtained from the constructor of a concrete variant (its
/// `open` step), then `activate` must be called exactly once before any
/// `next_frame` or `write_frame`.
///
/// Implementations must also call `close` from `Drop`, so that resources are
/// released on every exit path. `close` is idempotent.
pub trait CaptureHandle {
    /// Name of the underlying device or file, for diagnostics
    fn name(&self) -> &str;

    /// Prepare the handle for reading or writing
    fn activate(&mut self) -> Result<(), Error>;

    /// Link type of the frames produced or accepted by this handle
    ///
    /// Fixed for the whole lifetime of the handle, and only meaningful once
    /// the handle is activated.
    fn link_type(&self) -> LinkType;

    /// Read the next frame
    fn next_frame(&mut self) -> Result<NextFrame, Error>;

    /// Append a frame, preserving its bytes, timestamp and lengths
    fn write_frame(&mut self, frame: &Frame) -> Result<(), Error>;

    /// Push buffered frames to the underlying device or file
    ///
    /// Sinks must call this before `close`: errors reported here mean frames
    /// were lost.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Release underlying resources
    fn close(&mut self);

    fn state(&self) -> HandleState;
}

/// Check that `state` allows I/O, returning the error to report otherwise
pub fn check_active(state: HandleState) -> Result<(), Error> {
    match state {
        HandleState::Activated => Ok(()),
        HandleState::Opened => Err(Error::NotActivated),
        HandleState::Failed => Err(Error::Generic("handle activation previously failed")),
        HandleState::Closed => Err(Error::Generic("handle is closed")),
    }
}

/// Check that `state` allows activation
pub fn check_activate(state: HandleState) -> Result<(), Error> {
    match state {
        HandleState::Opened => Ok(()),
        HandleState::Activated => Err(Error::ActivationFailed("already activated".to_owned())),
        HandleState::Failed => Err(Error::ActivationFailed(
            "previous activation failed".to_owned(),
        )),
        HandleState::Closed => Err(Error::ActivationFailed("handle is closed".to_owned())),
    }
}
