use crate::decode::{decode, DecodeError, DecodedPacket};
use crate::filter::{compile, CompiledFilter};
use crate::open::{create_sink, open_source};
use libnetdump_tools::{
    CaptureHandle, Config, Error, Frame, LiveOptions, NextFrame, DEFAULT_BUFFER_CAPACITY,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace};

/// Where frames come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSelector {
    Interface(String),
    /// Capture file, `-` for standard input
    File(PathBuf),
}

/// What happens to admitted frames, fixed for the whole run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Decode, and hand the result to a [`PacketHandler`]
    Print,
    /// Copy raw frames to a capture file
    Forward { path: PathBuf },
}

/// Immutable configuration of a capture run
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub source: SourceSelector,
    pub mode: Mode,
    pub filter: Option<String>,
    /// Stop after this many admitted frames
    pub count: Option<u64>,
    pub live: LiveOptions,
    /// Initial buffer size of the capture file reader
    pub buffer_capacity: usize,
}

impl CaptureConfig {
    pub fn new(source: SourceSelector, mode: Mode) -> CaptureConfig {
        CaptureConfig {
            source,
            mode,
            filter: None,
            count: None,
            live: LiveOptions::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn with_filter<S: Into<String>>(mut self, expression: S) -> CaptureConfig {
        self.filter = Some(expression.into());
        self
    }

    pub fn with_count(mut self, count: u64) -> CaptureConfig {
        self.count = Some(count);
        self
    }

    /// Apply tunables (`buffer_initial_capacity`, `live.*`) from a configuration file
    pub fn with_tunables(mut self, config: &Config) -> CaptureConfig {
        if let Some(capacity) = config.get_usize("buffer_initial_capacity") {
            self.buffer_capacity = capacity;
        }
        self.live = LiveOptions::from_config(config);
        self
    }
}

/// Lifecycle of a [`CaptureLoop`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    /// Source and sink activated, filter compiled
    Activated,
    Running,
    Stopped,
    Failed,
}

/// Why a run ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    CountReached,
    Cancelled,
}

/// Statistics of a finished run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_read: u64,
    /// Frames which passed the filter, and were decoded or forwarded
    pub frames_admitted: u64,
    pub frames_filtered: u64,
    /// Admitted frames which could not be fully decoded
    pub decode_errors: u64,
    pub stop: StopReason,
}

impl RunSummary {
    fn new() -> RunSummary {
        RunSummary {
            frames_read: 0,
            frames_admitted: 0,
            frames_filtered: 0,
            decode_errors: 0,
            stop: StopReason::EndOfStream,
        }
    }
}

/// Consumer of decoded packets, in [`Mode::Print`]
pub trait PacketHandler {
    /// Called for every admitted frame. `index` starts at 1.
    ///
    /// Returning an error ends the run.
    fn handle_packet(
        &mut self,
        index: u64,
        frame: &Frame,
        packet: &DecodedPacket,
    ) -> Result<(), Error>;

    /// Called instead of `handle_packet` when nothing could be decoded
    fn handle_decode_error(
        &mut self,
        _index: u64,
        _frame: &Frame,
        _error: &DecodeError,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Destination of admitted frames
enum Output<'h> {
    Print(&'h mut dyn PacketHandler),
    Forward(Box<dyn CaptureHandle>),
}

impl Output<'_> {
    fn flush(&mut self) -> Result<(), Error> {
        match self {
            Output::Forward(sink) => sink.flush(),
            Output::Print(_) => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Output::Forward(sink) = self {
            sink.close();
        }
    }
}

/// Runs source, filter, decoder and sink together
pub struct CaptureLoop {
    config: CaptureConfig,
    state: LoopState,
}

impl CaptureLoop {
    pub fn new(config: CaptureConfig) -> CaptureLoop {
        CaptureLoop {
            config,
            state: LoopState::Idle,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Open the configured source, and run until it ends, the frame count is
    /// reached, or `running` becomes false
    ///
    /// `handler` is only used in [`Mode::Print`].
    pub fn run(
        &mut self,
        handler: &mut dyn PacketHandler,
        running: &AtomicBool,
    ) -> Result<RunSummary, Error> {
        if self.state != LoopState::Idle {
            return Err(Error::Generic("capture loop can only run once"));
        }
        let source = match open_source(&self.config) {
            Ok(source) => source,
            Err(e) => {
                self.state = LoopState::Failed;
                return Err(e);
            }
        };
        self.run_with_source(source, handler, running)
    }

    /// Same as [`run`](Self::run), with an already opened (not activated) source
    pub fn run_with_source(
        &mut self,
        mut source: Box<dyn CaptureHandle>,
        handler: &mut dyn PacketHandler,
        running: &AtomicBool,
    ) -> Result<RunSummary, Error> {
        if self.state != LoopState::Idle {
            source.close();
            return Err(Error::Generic("capture loop can only run once"));
        }
        let result = self
            .setup(source.as_mut(), handler)
            .and_then(|(filter, mut output)| {
                self.state = LoopState::Activated;
                debug!("Capture loop activated on {}", source.name());
                let r = self
                    .capture(source.as_mut(), filter.as_ref(), &mut output, running)
                    .and_then(|summary| output.flush().map(|()| summary));
                output.close();
                r
            });
        source.close();
        match result {
            Ok(summary) => {
                self.state = LoopState::Stopped;
                info!(
                    "Capture stopped ({:?}): {} frames read, {} admitted, {} filtered out",
                    summary.stop,
                    summary.frames_read,
                    summary.frames_admitted,
                    summary.frames_filtered
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = LoopState::Failed;
                debug!("Capture failed ({} stage): {e}", e.stage());
                Err(e)
            }
        }
    }

    /// Activate the source, compile the filter, and create the sink
    fn setup<'h>(
        &self,
        source: &mut dyn CaptureHandle,
        handler: &'h mut dyn PacketHandler,
    ) -> Result<(Option<CompiledFilter>, Output<'h>), Error> {
        source.activate()?;
        let link_type = source.link_type();
        let filter = match self.config.filter.as_deref() {
            Some(expression) => Some(compile(expression, link_type)?),
            None => None,
        };
        let output = match &self.config.mode {
            Mode::Print => Output::Print(handler),
            Mode::Forward { path } => {
                let mut sink = create_sink(path, link_type)?;
                sink.activate()?;
                Output::Forward(sink)
            }
        };
        Ok((filter, output))
    }

    fn capture(
        &mut self,
        source: &mut dyn CaptureHandle,
        filter: Option<&CompiledFilter>,
        output: &mut Output,
        running: &AtomicBool,
    ) -> Result<RunSummary, Error> {
        self.state = LoopState::Running;
        let mut summary = RunSummary::new();
        if self.config.count == Some(0) {
            summary.stop = StopReason::CountReached;
            return Ok(summary);
        }
        loop {
            if !running.load(Ordering::SeqCst) {
                summary.stop = StopReason::Cancelled;
                break;
            }
            let frame = match source.next_frame()? {
                NextFrame::Frame(frame) => frame,
                NextFrame::TimedOut => continue,
                NextFrame::EndOfStream => {
                    summary.stop = StopReason::EndOfStream;
                    break;
                }
            };
            summary.frames_read += 1;
            if let Some(filter) = filter {
                if !filter.matches(&frame) {
                    trace!("frame {} rejected by filter", summary.frames_read);
                    summary.frames_filtered += 1;
                    continue;
                }
            }
            summary.frames_admitted += 1;
            let index = summary.frames_admitted;
            match output {
                Output::Forward(sink) => sink.write_frame(&frame)?,
                Output::Print(handler) => match decode(&frame) {
                    Ok(packet) => {
                        if packet.is_incomplete() {
                            debug!("frame {index}: truncated");
                            summary.decode_errors += 1;
                        }
                        handler.handle_packet(index, &frame, &packet)?;
                    }
                    Err(e) => {
                        debug!("frame {index}: {e}");
                        summary.decode_errors += 1;
                        handler.handle_decode_error(index, &frame, &e)?;
                    }
                },
            }
            if let Some(count) = self.config.count {
                if summary.frames_admitted >= count {
                    summary.stop = StopReason::CountReached;
                    break;
                }
            }
        }
        Ok(summary)
    }
}
